pub mod analysis;
pub mod api;
pub mod chart;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod model;

// Re-export commonly used items
pub use analysis::{AnalysisSettings, EnergyAnalysis};
pub use api::DeviceClient;
pub use config::Config;
pub use error::{AppError, Result};
pub use events::DeviceEvent;
pub use history::{HistoryCache, HistoryFetcher};
pub use model::{ChangeEvent, Charger, DayKey, DayRecord, SlotIndex, SourceId};
