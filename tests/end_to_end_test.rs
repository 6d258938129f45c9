/// End-to-end tests against a mock device
/// The device's REST API and event feed are served by mockito
use energy_analysis::{
    chart::{ChartOptions, ChartWrapper, PlotFactory, TextPlot, View},
    clock::SystemClock,
    config::DeviceConfig,
    events::event_stream,
    AnalysisSettings, DeviceClient, EnergyAnalysis,
};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn chart(id: &str) -> ChartWrapper<TextPlot> {
    let factory: PlotFactory<TextPlot> = Box::new(TextPlot::new);
    ChartWrapper::new(
        ChartOptions {
            id: id.to_string(),
            y_min: None,
            y_max: None,
            aspect_ratio: 3.0,
            width: 96,
            visible: true,
            power_label: "Power".to_string(),
        },
        factory,
    )
}

fn page(fields: usize, power: f64) -> String {
    let values: Vec<serde_json::Value> = (0..288)
        .flat_map(|_| {
            let mut slot = vec![json!(0); fields];
            slot[1] = json!(power);
            slot
        })
        .collect();

    serde_json::Value::Array(values).to_string()
}

#[tokio::test]
async fn test_device_history_and_events_reach_the_chart() {
    let mut server = Server::new_async().await;

    let feed = server
        .mock("GET", "/events")
        .with_status(200)
        .with_body(concat!(
            "{\"topic\":\"charge_manager/state\",\"payload\":{\"chargers\":",
            "[{\"uid\":3,\"name\":\"Carport\"}]}}\n",
            "{\"topic\":\"meter/values\",\"payload\":{\"power\":815.0}}\n",
        ))
        .expect_at_least(1)
        .create_async()
        .await;

    let grid = server
        .mock("PUT", "/energy_manager/history_energy_manager_5min")
        .with_status(200)
        .with_body(page(8, 250.0))
        .expect(1)
        .create_async()
        .await;

    let wallbox = server
        .mock("PUT", "/energy_manager/history_wallbox_5min")
        .match_body(Matcher::PartialJson(json!({ "uid": 3 })))
        .with_status(200)
        .with_body(page(2, 11_000.0))
        .expect(1)
        .create_async()
        .await;

    let client = DeviceClient::new(&DeviceConfig {
        base_url: server.url(),
        request_timeout_secs: 5,
        events_path: "/events".to_string(),
        reconnect_delay_ms: 50,
    })
    .unwrap();

    let mut analysis = EnergyAnalysis::new(
        Arc::new(client.clone()),
        SystemClock,
        AnalysisSettings::default(),
        chart("em_energy_analysis_chart"),
        chart("em_energy_analysis_status_chart"),
    );

    let events = event_stream(client, Duration::from_millis(50));
    let _ = tokio::time::timeout(Duration::from_secs(2), analysis.run(events)).await;

    feed.assert_async().await;
    grid.assert_async().await;
    wallbox.assert_async().await;

    assert_eq!(analysis.chart().view(), View::Chart);
    assert_eq!(analysis.status_chart().view(), View::Chart);
    assert_eq!(analysis.grid_power(), Some(815.0));

    let labels: Vec<String> = analysis
        .chart()
        .plot()
        .unwrap()
        .series()
        .iter()
        .map(|s| s.label.clone())
        .collect();
    assert_eq!(labels, vec!["Power Grid connection", "Power Carport"]);

    let rendered = analysis.chart().plot().unwrap().render();
    assert!(rendered.contains("max 11000 W"));
}

#[tokio::test]
async fn test_device_errors_leave_chart_loading() {
    let mut server = Server::new_async().await;

    let _feed = server
        .mock("GET", "/events")
        .with_status(503)
        .create_async()
        .await;

    let grid = server
        .mock("PUT", "/energy_manager/history_energy_manager_5min")
        .with_status(500)
        .with_body("history unavailable")
        .expect_at_least(2)
        .create_async()
        .await;

    let client = DeviceClient::new(&DeviceConfig {
        base_url: server.url(),
        request_timeout_secs: 5,
        events_path: "/events".to_string(),
        reconnect_delay_ms: 100,
    })
    .unwrap();

    let mut analysis = EnergyAnalysis::new(
        Arc::new(client.clone()),
        SystemClock,
        AnalysisSettings::default(),
        chart("em_energy_analysis_chart"),
        chart("em_energy_analysis_status_chart"),
    );

    let events = event_stream(client, Duration::from_millis(100));
    let _ = tokio::time::timeout(Duration::from_secs(1), analysis.run(events)).await;

    grid.assert_async().await;
    assert_eq!(analysis.chart().view(), View::Loading);
    assert!(analysis.retry_pending());
}
