pub mod cache;
pub mod debounce;
pub mod fetcher;
pub mod merge;

pub use cache::{ChargerRoster, HistoryCache};
pub use debounce::{Debouncer, PendingTimer};
pub use fetcher::{fetch_day, DayFetch, HistoryFetcher};
pub use merge::{merge, InFlight, MergeOutcome};
