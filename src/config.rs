use crate::error::{AppError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub chart: ChartConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_events_path")]
    pub events_path: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_redraw_debounce_ms")]
    pub redraw_debounce_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Day shown at startup; today when unset
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_chart_width")]
    pub width: u32,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f64,
    #[serde(default = "default_resize_poll_ms")]
    pub resize_poll_ms: u64,
    #[serde(default = "default_status_y_min")]
    pub status_y_min: f64,
    #[serde(default = "default_status_y_max")]
    pub status_y_max: f64,
    #[serde(default)]
    pub labels: Labels,
}

/// Display strings used when building chart series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Labels {
    #[serde(default = "default_grid_label")]
    pub grid_connection: String,
    #[serde(default = "default_power_label")]
    pub power: String,
    #[serde(default = "default_no_data_label")]
    pub no_data: String,
    #[serde(default = "default_loading_label")]
    pub loading: String,
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_events_path() -> String {
    "/events".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}

fn default_redraw_debounce_ms() -> u64 {
    100
}

fn default_retry_initial_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

fn default_retry_max_attempts() -> u32 {
    30
}

fn default_chart_width() -> u32 {
    96
}

fn default_aspect_ratio() -> f64 {
    3.0
}

fn default_resize_poll_ms() -> u64 {
    500
}

fn default_status_y_min() -> f64 {
    0.0
}

fn default_status_y_max() -> f64 {
    1500.0
}

fn default_grid_label() -> String {
    "Grid connection".to_string()
}

fn default_power_label() -> String {
    "Power".to_string()
}

fn default_no_data_label() -> String {
    "No data available".to_string()
}

fn default_loading_label() -> String {
    "Loading...".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            redraw_debounce_ms: default_redraw_debounce_ms(),
            retry: RetryConfig::default(),
            date: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_retry_initial_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
            max_attempts: default_retry_max_attempts(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: default_chart_width(),
            aspect_ratio: default_aspect_ratio(),
            resize_poll_ms: default_resize_poll_ms(),
            status_y_min: default_status_y_min(),
            status_y_max: default_status_y_max(),
            labels: Labels::default(),
        }
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            grid_connection: default_grid_label(),
            power: default_power_label(),
            no_data: default_no_data_label(),
            loading: default_loading_label(),
        }
    }
}

impl AnalysisConfig {
    pub fn redraw_debounce(&self) -> Duration {
        Duration::from_millis(self.redraw_debounce_ms)
    }
}

impl DeviceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // Expand environment variables in the format $(VAR_NAME)
        let expanded = expand_env_vars(content);

        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let base_url = self.device.base_url.trim();
        if base_url.is_empty() {
            return Err(AppError::Config(
                "device.base_url cannot be empty".to_string(),
            ));
        }

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "device.base_url must be an http(s) URL, got {}",
                base_url
            )));
        }

        if !self.device.events_path.starts_with('/') {
            return Err(AppError::Config(
                "device.events_path must start with '/'".to_string(),
            ));
        }

        if self.device.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "device.request_timeout_secs cannot be 0".to_string(),
            ));
        }

        let retry = &self.analysis.retry;
        if retry.initial_delay_ms == 0 {
            return Err(AppError::Config(
                "analysis.retry.initial_delay_ms cannot be 0".to_string(),
            ));
        }

        if retry.max_delay_ms < retry.initial_delay_ms {
            return Err(AppError::Config(
                "analysis.retry.max_delay_ms must be >= initial_delay_ms".to_string(),
            ));
        }

        if retry.max_attempts == 0 {
            return Err(AppError::Config(
                "analysis.retry.max_attempts cannot be 0".to_string(),
            ));
        }

        if self.chart.aspect_ratio.is_nan() || self.chart.aspect_ratio <= 0.0 {
            return Err(AppError::Config(
                "chart.aspect_ratio must be positive".to_string(),
            ));
        }

        if self.chart.status_y_max <= self.chart.status_y_min {
            return Err(AppError::Config(
                "chart.status_y_max must be greater than status_y_min".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand environment variables in the format $(VAR_NAME)
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    let re = match regex::Regex::new(r"\$\(([A-Z_][A-Z0-9_]*)\)") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(content) {
        let full_match = &cap[0];
        let var_name = &cap[1];

        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(full_match, &value);
        }
    }

    result
}
