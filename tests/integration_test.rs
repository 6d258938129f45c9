/// Integration tests for energy-analysis
/// These tests verify individual components without requiring a device
use serial_test::serial;

#[cfg(test)]
mod config_tests {
    use super::*;
    use energy_analysis::config::Config;

    #[tokio::test]
    #[serial]
    async fn test_config_loading_from_yaml() {
        let config_str = r#"
device:
  base_url: "http://192.168.1.50"
  request_timeout_secs: 5

analysis:
  redraw_debounce_ms: 250
  date: "2024-03-01"

chart:
  width: 120
  labels:
    grid_connection: "Netzanschluss"
"#;

        let temp_file = std::env::temp_dir().join(format!(
            "test-config-energy-analysis-{}.yaml",
            std::process::id()
        ));
        std::fs::write(&temp_file, config_str).unwrap();

        let config = Config::load(&temp_file).unwrap();
        assert_eq!(config.device.base_url, "http://192.168.1.50");
        assert_eq!(config.device.request_timeout_secs, 5);
        assert_eq!(config.device.events_path, "/events");
        assert_eq!(config.analysis.redraw_debounce_ms, 250);
        assert_eq!(
            config.analysis.date,
            chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(config.analysis.retry.initial_delay_ms, 100);
        assert_eq!(config.chart.width, 120);
        assert_eq!(config.chart.status_y_max, 1500.0);
        assert_eq!(config.chart.labels.grid_connection, "Netzanschluss");
        assert_eq!(config.chart.labels.power, "Power");

        std::fs::remove_file(&temp_file).ok();
    }

    #[tokio::test]
    #[serial]
    async fn test_config_env_var_override() {
        std::env::set_var("ENERGY_ANALYSIS_DEVICE_URL", "http://wallbox.local");

        let config_str = r#"
device:
  base_url: "$(ENERGY_ANALYSIS_DEVICE_URL)"
"#;

        let temp_file =
            std::env::temp_dir().join(format!("test-config-env-{}.yaml", std::process::id()));
        std::fs::write(&temp_file, config_str).unwrap();

        let config = Config::load(&temp_file).unwrap();
        assert_eq!(config.device.base_url, "http://wallbox.local");

        std::fs::remove_file(&temp_file).ok();
        std::env::remove_var("ENERGY_ANALYSIS_DEVICE_URL");
    }

    #[tokio::test]
    #[serial]
    async fn test_shipped_config_loads() {
        std::env::set_var("DEVICE_URL", "http://10.0.0.2");

        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/config.yaml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.device.base_url, "http://10.0.0.2");
        assert_eq!(config.analysis.retry.max_attempts, 30);

        std::env::remove_var("DEVICE_URL");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::load("/nonexistent/energy-analysis.yaml").is_err());
    }
}

#[cfg(test)]
mod protocol_tests {
    use energy_analysis::events::{parse_frame, FrameDecoder};
    use energy_analysis::DeviceEvent;

    #[test]
    fn test_split_frames_decode_to_events() {
        let mut decoder = FrameDecoder::default();

        let first = decoder
            .push(b"{\"topic\":\"charge_manager/state\",\"payload\":{\"chargers\":[{\"uid\":3,");
        assert!(first.is_empty());

        let lines = decoder.push(b"\"name\":\"Carport\"}]}}\n");
        assert_eq!(lines.len(), 1);

        match parse_frame(&lines[0]).unwrap() {
            Some(DeviceEvent::ChargeManagerState(chargers)) => {
                assert_eq!(chargers.len(), 1);
                assert_eq!(chargers[0].uid, 3);
                assert_eq!(chargers[0].name, "Carport");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
