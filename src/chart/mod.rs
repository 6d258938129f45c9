pub mod adapter;
pub mod dataset;
pub mod text;

pub use adapter::{
    ChartOptions, ChartWrapper, Plot, PlotFactory, ResizeSource, SeriesStyle, Size, View, PALETTE,
};
pub use dataset::{ChartDataset, DatasetCache, DatasetKind};
pub use text::TextPlot;
