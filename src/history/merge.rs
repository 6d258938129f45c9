use super::cache::HistoryCache;
use crate::error::Result;
use crate::model::{ChangeEvent, DayKey, SourceId, FLAG_NO_DATA, GENERAL_CHANNELS};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The day was cached and one slot was written. `changed` is false when
    /// the slot already held the event's data.
    Patched {
        source: SourceId,
        date: NaiveDate,
        changed: bool,
    },
    /// The day is not cached; the event alone cannot rebuild it
    NeedsFetch { source: SourceId, date: NaiveDate },
}

/// Apply a single-slot change event to the cache
pub fn merge(cache: &mut HistoryCache, event: &ChangeEvent) -> Result<MergeOutcome> {
    let date = event.date()?;
    let slot = event.slot()?.get();
    let source = event.source();
    let key = DayKey::from_date(date);

    if !cache.contains(source, &key) {
        debug!(source = %source, %date, "change event for uncached day");
        return Ok(MergeOutcome::NeedsFetch { source, date });
    }

    let has_data = event.flags() & FLAG_NO_DATA == 0;

    let changed = match event {
        ChangeEvent::Wallbox(change) => {
            let Some(day) = cache.wallbox_day_mut(change.uid, &key) else {
                return Ok(MergeOutcome::NeedsFetch { source, date });
            };

            let changed = day.flags[slot] != change.flags || day.power[slot] != change.power;
            day.flags[slot] = change.flags;
            day.power[slot] = change.power;

            if has_data {
                day.empty = false;
            }

            changed
        }
        ChangeEvent::EnergyManager(change) => {
            let Some(day) = cache.energy_manager_day_mut(&key) else {
                return Ok(MergeOutcome::NeedsFetch { source, date });
            };

            let mut general = [None; GENERAL_CHANNELS];
            for (dst, src) in general.iter_mut().zip(change.power_general.iter()) {
                *dst = *src;
            }

            let changed = day.flags[slot] != change.flags
                || day.power_grid[slot] != change.power_grid
                || day.power_general[slot] != general;
            day.flags[slot] = change.flags;
            day.power_grid[slot] = change.power_grid;
            day.power_general[slot] = general;

            if has_data {
                day.empty = false;
            }

            changed
        }
    };

    if changed {
        let stamp = cache.next_stamp();
        match event {
            ChangeEvent::Wallbox(change) => {
                if let Some(day) = cache.wallbox_day_mut(change.uid, &key) {
                    day.stamp = stamp;
                }
            }
            ChangeEvent::EnergyManager(_) => {
                if let Some(day) = cache.energy_manager_day_mut(&key) {
                    day.stamp = stamp;
                }
            }
        }
    }

    trace!(source = %source, %date, slot, changed, "merged change event");

    Ok(MergeOutcome::Patched {
        source,
        date,
        changed,
    })
}

/// Tracks day fetches in progress and holds back change events for those
/// days until the fetch settles
#[derive(Debug, Default)]
pub struct InFlight {
    pending: HashMap<(SourceId, DayKey), Vec<ChangeEvent>>,
}

impl InFlight {
    /// Mark a fetch as started. Returns false if one is already running.
    pub fn begin(&mut self, source: SourceId, key: DayKey) -> bool {
        if self.pending.contains_key(&(source, key.clone())) {
            return false;
        }

        self.pending.insert((source, key), Vec::new());
        true
    }

    /// Queue the event if its day is being fetched. Returns the event back
    /// when no fetch is running for it.
    pub fn defer(&mut self, event: ChangeEvent) -> Option<ChangeEvent> {
        let key = match event.date() {
            Ok(date) => DayKey::from_date(date),
            Err(_) => return Some(event),
        };

        match self.pending.get_mut(&(event.source(), key)) {
            Some(queue) => {
                queue.push(event);
                None
            }
            None => Some(event),
        }
    }

    /// Finish a fetch and hand back the events that arrived meanwhile
    pub fn settle(&mut self, source: SourceId, key: &DayKey) -> Vec<ChangeEvent> {
        self.pending
            .remove(&(source, key.clone()))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
