use super::fetcher::{fetch_day, DayFetch, HistoryFetcher};
use crate::error::Result;
use crate::model::{Charger, DayKey, DayRecord, EnergyManagerDay, SourceId, Stamp, WallboxDay};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, info};

/// Hands out strictly increasing freshness stamps
#[derive(Debug, Default)]
pub struct StampClock {
    last: Stamp,
}

impl StampClock {
    pub fn next(&mut self) -> Stamp {
        self.last += 1;
        self.last
    }

    pub fn latest(&self) -> Stamp {
        self.last
    }
}

/// Day pages per source. Entries are never expired by age; a day is only
/// replaced by a merge or dropped with [`HistoryCache::clear_wallboxes`].
#[derive(Debug, Default)]
pub struct HistoryCache {
    wallbox: HashMap<u32, HashMap<DayKey, WallboxDay>>,
    energy_manager: HashMap<DayKey, EnergyManagerDay>,
    stamps: StampClock,
}

impl HistoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, source: SourceId, key: &DayKey) -> bool {
        match source {
            SourceId::Wallbox(uid) => self.wallbox_day(uid, key).is_some(),
            SourceId::EnergyManager => self.energy_manager.contains_key(key),
        }
    }

    pub fn wallbox_day(&self, uid: u32, key: &DayKey) -> Option<&WallboxDay> {
        self.wallbox.get(&uid).and_then(|days| days.get(key))
    }

    pub fn energy_manager_day(&self, key: &DayKey) -> Option<&EnergyManagerDay> {
        self.energy_manager.get(key)
    }

    pub(crate) fn wallbox_day_mut(&mut self, uid: u32, key: &DayKey) -> Option<&mut WallboxDay> {
        self.wallbox.get_mut(&uid).and_then(|days| days.get_mut(key))
    }

    pub(crate) fn energy_manager_day_mut(&mut self, key: &DayKey) -> Option<&mut EnergyManagerDay> {
        self.energy_manager.get_mut(key)
    }

    /// Snapshot of a cached day
    pub fn lookup(&self, source: SourceId, key: &DayKey) -> Option<DayRecord> {
        match source {
            SourceId::Wallbox(uid) => self.wallbox_day(uid, key).cloned().map(DayRecord::Wallbox),
            SourceId::EnergyManager => self
                .energy_manager_day(key)
                .cloned()
                .map(DayRecord::EnergyManager),
        }
    }

    /// Store a fetched day under a fresh stamp, replacing any previous entry.
    /// A record whose kind does not match `source` is dropped.
    pub fn insert(&mut self, source: SourceId, key: DayKey, mut record: DayRecord) -> Stamp {
        let stamp = self.stamps.next();
        record.set_stamp(stamp);

        match (source, record) {
            (SourceId::Wallbox(uid), DayRecord::Wallbox(day)) => {
                self.wallbox.entry(uid).or_default().insert(key, day);
            }
            (SourceId::EnergyManager, DayRecord::EnergyManager(day)) => {
                self.energy_manager.insert(key, day);
            }
            (source, _) => {
                debug!(source = %source, "record kind does not match source, dropping");
            }
        }

        stamp
    }

    pub(crate) fn next_stamp(&mut self) -> Stamp {
        self.stamps.next()
    }

    /// Most recent stamp handed out by this cache
    pub fn latest_stamp(&self) -> Stamp {
        self.stamps.latest()
    }

    pub fn clear_wallboxes(&mut self) {
        let days: usize = self.wallbox.values().map(HashMap::len).sum();
        self.wallbox.clear();
        info!(days, "cleared wallbox history cache");
    }

    pub fn wallbox_day_count(&self) -> usize {
        self.wallbox.values().map(HashMap::len).sum()
    }

    /// Cached day, or fetch and store it. Future days yield an empty record
    /// that is not stored.
    pub async fn get_or_fetch<F: HistoryFetcher + ?Sized>(
        &mut self,
        fetcher: &F,
        source: SourceId,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<DayRecord> {
        let key = DayKey::from_date(date);

        if let Some(record) = self.lookup(source, &key) {
            return Ok(record);
        }

        match fetch_day(fetcher, source, date, today).await? {
            DayFetch::Future => Ok(DayRecord::no_data(source)),
            DayFetch::Loaded(record) => {
                self.insert(source, key.clone(), record);
                Ok(self
                    .lookup(source, &key)
                    .unwrap_or_else(|| DayRecord::no_data(source)))
            }
        }
    }
}

/// Known chargers in charge manager order
#[derive(Debug, Default, Clone)]
pub struct ChargerRoster {
    chargers: Vec<Charger>,
}

impl ChargerRoster {
    pub fn chargers(&self) -> &[Charger] {
        &self.chargers
    }

    pub fn uids(&self) -> impl Iterator<Item = u32> + '_ {
        self.chargers.iter().map(|c| c.uid)
    }

    /// Replace the roster, ignoring chargers with uid 0. Returns true when
    /// the set of (uid, name) pairs changed.
    pub fn update(&mut self, chargers: Vec<Charger>) -> bool {
        let chargers: Vec<Charger> = chargers.into_iter().filter(|c| c.uid > 0).collect();

        if chargers == self.chargers {
            return false;
        }

        self.chargers = chargers;
        true
    }
}
