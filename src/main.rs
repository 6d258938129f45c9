use energy_analysis::{
    chart::{dataset::assemble_day, ChartOptions, ChartWrapper, PlotFactory, ResizeSource, TextPlot},
    clock::{Clock, SystemClock},
    config::Config,
    events::event_stream,
    model::{DayKey, SourceId},
    AnalysisSettings, DeviceClient, EnergyAnalysis, HistoryCache,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charts go to stdout, logs to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "energy_analysis=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting energy-analysis");

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
    let config = Config::load(&config_path)?;
    info!("Configuration loaded from: {}", config_path);

    let client = DeviceClient::new(&config.device)?;
    info!("Device at {}", client.base_url());

    if std::env::args().any(|arg| arg == "--once") {
        return print_day(&client, &config).await;
    }

    let fallback_width = config.chart.width;
    let mut chart = ChartWrapper::new(
        chart_options(&config, "em_energy_analysis_chart", true, None, None),
        text_plot_factory(&config),
    );
    chart.watch_resize(ResizeSource::polling(
        Duration::from_millis(config.chart.resize_poll_ms),
        move || terminal_width(fallback_width),
    ));

    let status_chart = ChartWrapper::new(
        chart_options(
            &config,
            "em_energy_analysis_status_chart",
            std::env::args().any(|arg| arg == "--status"),
            Some(config.chart.status_y_min),
            Some(config.chart.status_y_max),
        ),
        text_plot_factory(&config),
    );

    let mut analysis = EnergyAnalysis::new(
        Arc::new(client.clone()),
        SystemClock,
        AnalysisSettings::from_config(&config),
        chart,
        status_chart,
    );

    let events = event_stream(client, config.device.reconnect_delay());

    tokio::select! {
        _ = analysis.run(events) => {}
        _ = shutdown_signal() => {}
    }

    info!("Shutdown complete");
    Ok(())
}

fn chart_options(
    config: &Config,
    id: &str,
    visible: bool,
    y_min: Option<f64>,
    y_max: Option<f64>,
) -> ChartOptions {
    ChartOptions {
        id: id.to_string(),
        y_min,
        y_max,
        aspect_ratio: config.chart.aspect_ratio,
        width: terminal_width(config.chart.width),
        visible,
        power_label: config.chart.labels.power.clone(),
    }
}

fn text_plot_factory(config: &Config) -> PlotFactory<TextPlot> {
    let loading = config.chart.labels.loading.clone();
    let no_data = config.chart.labels.no_data.clone();

    Box::new(move |options, size| {
        TextPlot::new(options, size)
            .with_labels(&loading, &no_data)
            .echoing()
    })
}

/// COLUMNS as exported by the shell, else `fallback`
fn terminal_width(fallback: u32) -> u32 {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

/// Fetch the configured day for the energy manager, print it and exit
async fn print_day(client: &DeviceClient, config: &Config) -> anyhow::Result<()> {
    let today = SystemClock.today();
    let date = config.analysis.date.unwrap_or(today);
    let mut cache = HistoryCache::new();

    let record = cache
        .get_or_fetch(client, SourceId::EnergyManager, date, today)
        .await?;
    info!(
        day = %DayKey::from_date(date),
        empty = record.is_empty(),
        "fetched energy manager day"
    );

    let dataset = assemble_day(&cache, &[], date, &config.chart.labels.grid_connection);

    let mut chart = ChartWrapper::new(
        chart_options(config, "em_energy_analysis_chart", true, None, None),
        text_plot_factory(config),
    );
    chart.set_data(Some(Arc::new(dataset)));

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
