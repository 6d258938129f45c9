use super::dataset::ChartDataset;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, trace};

// https://seaborn.pydata.org/tutorial/color_palettes.html#qualitative-color-palettes
// sns.color_palette("tab10")
pub const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStyle {
    pub label: String,
    pub stroke: &'static str,
    pub width: u32,
    /// Unit appended to legend values
    pub unit: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartOptions {
    pub id: String,
    /// Soft lower bound of the y scale
    pub y_min: Option<f64>,
    /// Soft upper bound of the y scale
    pub y_max: Option<f64>,
    pub aspect_ratio: f64,
    pub width: u32,
    /// Shown before the first visibility transition
    pub visible: bool,
    pub power_label: String,
}

impl ChartOptions {
    pub fn size_for_width(&self, width: u32) -> Size {
        Size {
            width,
            height: (width as f64 / self.aspect_ratio).floor() as u32,
        }
    }
}

/// A charting backend. Series index 0 is the time axis.
pub trait Plot {
    fn add_series(&mut self, style: SeriesStyle);
    fn del_series(&mut self, index: usize);
    fn set_data(&mut self, dataset: &ChartDataset);
    fn set_size(&mut self, size: Size);
    /// Loading or no-data overlay; `View::Chart` once data is set
    fn set_view(&mut self, _view: View) {}
}

pub type PlotFactory<P> = Box<dyn FnMut(&ChartOptions, Size) -> P + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Loading,
    NoData,
    Chart,
}

/// Where container width changes come from
pub enum ResizeSource {
    /// Pushed by an observer
    Observer(watch::Receiver<u32>),
    /// Probed on a fixed period
    Polling {
        ticker: Interval,
        probe: Box<dyn FnMut() -> u32 + Send>,
        last: u32,
    },
}

impl ResizeSource {
    pub fn polling(period: Duration, probe: impl FnMut() -> u32 + Send + 'static) -> Self {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        ResizeSource::Polling {
            ticker,
            probe: Box::new(probe),
            last: 0,
        }
    }

    /// Use the observer when one is available, otherwise poll
    pub fn detect(
        observer: Option<watch::Receiver<u32>>,
        period: Duration,
        probe: impl FnMut() -> u32 + Send + 'static,
    ) -> Self {
        match observer {
            Some(rx) => ResizeSource::Observer(rx),
            None => Self::polling(period, probe),
        }
    }

    pub async fn next_width(&mut self) -> u32 {
        match self {
            ResizeSource::Observer(rx) => {
                if rx.changed().await.is_err() {
                    // observer gone, no more resizes
                    return std::future::pending().await;
                }
                *rx.borrow_and_update()
            }
            ResizeSource::Polling {
                ticker,
                probe,
                last,
            } => loop {
                ticker.tick().await;
                let width = probe();
                if width != *last {
                    *last = width;
                    return width;
                }
            },
        }
    }
}

/// Wraps a plot: builds it on first visibility, parks data while hidden and
/// keeps the plot's series in step with the dataset columns
pub struct ChartWrapper<P: Plot> {
    options: ChartOptions,
    factory: PlotFactory<P>,
    plot: Option<P>,
    series_count: usize,
    pending: Option<Option<Arc<ChartDataset>>>,
    visible: bool,
    view: View,
    size: Size,
    resize: Option<ResizeSource>,
}

impl<P: Plot> ChartWrapper<P> {
    pub fn new(options: ChartOptions, factory: PlotFactory<P>) -> Self {
        let size = options.size_for_width(options.width);
        let visible = options.visible;

        let mut wrapper = Self {
            options,
            factory,
            plot: None,
            series_count: 1,
            pending: None,
            visible: false,
            view: View::Loading,
            size,
            resize: None,
        };

        if visible {
            wrapper.show();
        }

        wrapper
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn plot(&self) -> Option<&P> {
        self.plot.as_ref()
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn show(&mut self) {
        self.visible = true;

        if self.plot.is_none() {
            debug!(chart = %self.options.id, size = ?self.size, "creating plot");
            self.plot = Some((self.factory)(&self.options, self.size));
            self.series_count = 1;
        }

        if let Some(data) = self.pending.take() {
            self.render(data);
        } else if self.view != View::Chart {
            if let Some(plot) = self.plot.as_mut() {
                plot.set_view(self.view);
            }
        }
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn set_loading(&mut self) {
        trace!(chart = %self.options.id, "loading");
        self.view = View::Loading;

        if self.visible {
            if let Some(plot) = self.plot.as_mut() {
                plot.set_view(View::Loading);
            }
        }
    }

    pub fn set_data(&mut self, data: Option<Arc<ChartDataset>>) {
        if self.plot.is_none() || !self.visible {
            self.pending = Some(data);
            return;
        }

        self.pending = None;
        self.render(data);
    }

    fn render(&mut self, data: Option<Arc<ChartDataset>>) {
        let Some(plot) = self.plot.as_mut() else {
            self.pending = Some(data);
            return;
        };

        let dataset = match data {
            Some(dataset) if dataset.has_data() => dataset,
            _ => {
                self.view = View::NoData;
                plot.set_view(View::NoData);
                return;
            }
        };

        self.view = View::Chart;

        while self.series_count > 1 {
            self.series_count -= 1;
            plot.del_series(self.series_count);
        }

        while self.series_count < dataset.column_count() {
            let name = &dataset.names[self.series_count - 1];
            let label = if name.is_empty() {
                self.options.power_label.clone()
            } else {
                format!("{} {}", self.options.power_label, name)
            };

            plot.add_series(SeriesStyle {
                label,
                stroke: PALETTE[(self.series_count - 1) % PALETTE.len()],
                width: 2,
                unit: "W",
            });

            self.series_count += 1;
        }

        plot.set_data(&dataset);
    }

    pub fn resize(&mut self, width: u32) {
        let size = self.options.size_for_width(width);

        if size.width == 0 || size.height == 0 {
            return;
        }

        self.size = size;

        if let Some(plot) = self.plot.as_mut() {
            plot.set_size(size);
        }
    }

    pub fn watch_resize(&mut self, source: ResizeSource) {
        self.resize = Some(source);
    }

    /// Next observed width; never resolves without a resize source
    pub async fn next_resize(&mut self) -> u32 {
        match self.resize.as_mut() {
            Some(source) => source.next_width().await,
            None => std::future::pending().await,
        }
    }
}
