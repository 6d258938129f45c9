use crate::history::HistoryCache;
use crate::model::{Charger, DayKey, Stamp, SLOTS_PER_DAY, SLOT_SECONDS};
use chrono::{Local, NaiveDate, NaiveTime, TimeZone};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Column-oriented chart data: slot timestamps plus one column per series
#[derive(Debug, Clone, PartialEq)]
pub struct ChartDataset {
    /// Cache stamp current when this dataset was built
    pub stamp: Stamp,
    pub names: Vec<String>,
    /// Unix seconds of each slot start
    pub timestamps: Vec<i64>,
    pub series: Vec<Vec<Option<f64>>>,
}

impl ChartDataset {
    pub fn has_data(&self) -> bool {
        !self.series.is_empty()
    }

    /// Timestamp column included
    pub fn column_count(&self) -> usize {
        1 + self.series.len()
    }
}

/// Unix seconds of local midnight starting `date`
pub fn day_start_timestamp(date: NaiveDate) -> i64 {
    let midnight = date.and_time(NaiveTime::MIN);

    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| midnight.and_utc().timestamp())
}

pub fn slot_timestamps(date: NaiveDate) -> Vec<i64> {
    let base = day_start_timestamp(date);
    (0..SLOTS_PER_DAY as i64)
        .map(|slot| base + slot * SLOT_SECONDS)
        .collect()
}

/// Grid power plus every non-empty charger series for `date`
pub fn assemble_day(
    cache: &HistoryCache,
    chargers: &[Charger],
    date: NaiveDate,
    grid_label: &str,
) -> ChartDataset {
    let key = DayKey::from_date(date);
    let mut dataset = ChartDataset {
        stamp: cache.latest_stamp(),
        names: Vec::new(),
        timestamps: slot_timestamps(date),
        series: Vec::new(),
    };

    if let Some(day) = cache.energy_manager_day(&key).filter(|d| !d.empty) {
        dataset.names.push(grid_label.to_string());
        dataset.series.push(day.grid_series());
    }

    for charger in chargers {
        if let Some(day) = cache.wallbox_day(charger.uid, &key).filter(|d| !d.empty) {
            dataset.names.push(charger.name.clone());
            dataset.series.push(day.power_series());
        }
    }

    dataset
}

/// Grid power only, for the status page
pub fn assemble_status(cache: &HistoryCache, date: NaiveDate) -> ChartDataset {
    let key = DayKey::from_date(date);
    let mut dataset = ChartDataset {
        stamp: cache.latest_stamp(),
        names: Vec::new(),
        timestamps: slot_timestamps(date),
        series: Vec::new(),
    };

    if let Some(day) = cache.energy_manager_day(&key).filter(|d| !d.empty) {
        dataset.names.push(String::new());
        dataset.series.push(day.grid_series());
    }

    dataset
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// Grid and all chargers
    Day,
    /// Grid only
    Status,
}

/// Assembled datasets per day, rebuilt only when a contributing day record
/// is newer than the dataset
#[derive(Debug)]
pub struct DatasetCache {
    kind: DatasetKind,
    entries: HashMap<DayKey, Arc<ChartDataset>>,
    rebuilds: u64,
}

impl DatasetCache {
    pub fn new(kind: DatasetKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
            rebuilds: 0,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// How many datasets were assembled so far
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    fn is_stale(
        &self,
        dataset: &ChartDataset,
        cache: &HistoryCache,
        chargers: &[Charger],
        key: &DayKey,
    ) -> bool {
        if let Some(day) = cache.energy_manager_day(key) {
            if day.stamp > dataset.stamp {
                return true;
            }
        }

        if self.kind == DatasetKind::Status {
            return false;
        }

        chargers.iter().any(|charger| {
            cache
                .wallbox_day(charger.uid, key)
                .is_some_and(|day| day.stamp > dataset.stamp)
        })
    }

    pub fn get(
        &mut self,
        cache: &HistoryCache,
        chargers: &[Charger],
        date: NaiveDate,
        grid_label: &str,
    ) -> Arc<ChartDataset> {
        let key = DayKey::from_date(date);

        if let Some(dataset) = self.entries.get(&key) {
            if !self.is_stale(dataset, cache, chargers, &key) {
                return Arc::clone(dataset);
            }
        }

        let dataset = Arc::new(match self.kind {
            DatasetKind::Day => assemble_day(cache, chargers, date, grid_label),
            DatasetKind::Status => assemble_status(cache, date),
        });
        self.rebuilds += 1;

        debug!(
            kind = ?self.kind,
            day = %key,
            series = dataset.series.len(),
            "assembled chart dataset"
        );

        self.entries.insert(key, Arc::clone(&dataset));
        dataset
    }
}
