use crate::error::{AppError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of 5-minute slots in a day
pub const SLOTS_PER_DAY: usize = 288;
pub const SLOT_MINUTES: u32 = 5;
pub const SLOT_SECONDS: i64 = 300;

/// Flag bit set on slots the device has no samples for
pub const FLAG_NO_DATA: u8 = 0x80;

/// General-purpose power channels reported by the energy manager
pub const GENERAL_CHANNELS: usize = 6;

/// Fields per slot in the flat history payloads
pub const WALLBOX_FIELDS: usize = 2;
pub const ENERGY_MANAGER_FIELDS: usize = 2 + GENERAL_CHANNELS;

/// Freshness stamp, strictly increasing per cache
pub type Stamp = u64;

/// Cache index for one calendar day, e.g. `2024-3-1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DayKey(String);

impl DayKey {
    pub fn from_date(date: NaiveDate) -> Self {
        DayKey(format!("{}-{}-{}", date.year(), date.month(), date.day()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<NaiveDate> for DayKey {
    fn from(date: NaiveDate) -> Self {
        DayKey::from_date(date)
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a 5-minute bucket within a day, always `< SLOTS_PER_DAY`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(usize);

impl SlotIndex {
    pub fn new(index: usize) -> Option<Self> {
        (index < SLOTS_PER_DAY).then_some(SlotIndex(index))
    }

    pub fn from_time(hour: u32, minute: u32) -> Result<Self> {
        if hour >= 24 || minute >= 60 {
            return Err(AppError::InvalidSlot { hour, minute });
        }

        Ok(SlotIndex(((hour * 60 + minute) / SLOT_MINUTES) as usize))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceId {
    Wallbox(u32),
    EnergyManager,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Wallbox(uid) => write!(f, "wallbox:{}", uid),
            SourceId::EnergyManager => f.write_str("energy_manager"),
        }
    }
}

/// A charger known to the charge manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charger {
    pub uid: u32,
    pub name: String,
}

fn slot_has_data(flags: u8) -> bool {
    flags & FLAG_NO_DATA == 0
}

/// 5-minute history of one wallbox for one day
#[derive(Debug, Clone, PartialEq)]
pub struct WallboxDay {
    pub stamp: Stamp,
    pub empty: bool,
    /// bit 0-2 = charger state, bit 7 = no data
    pub flags: Box<[u8; SLOTS_PER_DAY]>,
    /// W
    pub power: Box<[Option<f64>; SLOTS_PER_DAY]>,
}

impl WallboxDay {
    pub fn no_data() -> Self {
        Self {
            stamp: 0,
            empty: true,
            flags: Box::new([FLAG_NO_DATA; SLOTS_PER_DAY]),
            power: Box::new([None; SLOTS_PER_DAY]),
        }
    }

    pub fn has_data(&self, slot: SlotIndex) -> bool {
        slot_has_data(self.flags[slot.get()])
    }

    pub fn charger_state(&self, slot: SlotIndex) -> Option<u8> {
        self.has_data(slot).then(|| self.flags[slot.get()] & 0x07)
    }

    /// Power per slot with no-data slots blanked out
    pub fn power_series(&self) -> Vec<Option<f64>> {
        self.flags
            .iter()
            .zip(self.power.iter())
            .map(|(flags, power)| if slot_has_data(*flags) { *power } else { None })
            .collect()
    }

    pub fn refresh_empty(&mut self) {
        self.empty = !self.flags.iter().any(|f| slot_has_data(*f));
    }
}

/// 5-minute history of the energy manager for one day
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyManagerDay {
    pub stamp: Stamp,
    pub empty: bool,
    /// bit 0 = 1p/3p, bit 1-2 = input, bit 3 = output, bit 7 = no data
    pub flags: Box<[u8; SLOTS_PER_DAY]>,
    /// W
    pub power_grid: Box<[Option<f64>; SLOTS_PER_DAY]>,
    /// W
    pub power_general: Box<[[Option<f64>; GENERAL_CHANNELS]; SLOTS_PER_DAY]>,
}

impl EnergyManagerDay {
    pub fn no_data() -> Self {
        Self {
            stamp: 0,
            empty: true,
            flags: Box::new([FLAG_NO_DATA; SLOTS_PER_DAY]),
            power_grid: Box::new([None; SLOTS_PER_DAY]),
            power_general: Box::new([[None; GENERAL_CHANNELS]; SLOTS_PER_DAY]),
        }
    }

    pub fn has_data(&self, slot: SlotIndex) -> bool {
        slot_has_data(self.flags[slot.get()])
    }

    pub fn phases_three(&self, slot: SlotIndex) -> Option<bool> {
        self.has_data(slot).then(|| self.flags[slot.get()] & 0x01 != 0)
    }

    /// `input` is 0 or 1
    pub fn input_active(&self, slot: SlotIndex, input: u8) -> Option<bool> {
        if input > 1 {
            return None;
        }

        self.has_data(slot).then(|| self.flags[slot.get()] & (0x02 << input) != 0)
    }

    pub fn output_active(&self, slot: SlotIndex) -> Option<bool> {
        self.has_data(slot).then(|| self.flags[slot.get()] & 0x08 != 0)
    }

    pub fn grid_series(&self) -> Vec<Option<f64>> {
        self.flags
            .iter()
            .zip(self.power_grid.iter())
            .map(|(flags, power)| if slot_has_data(*flags) { *power } else { None })
            .collect()
    }

    pub fn refresh_empty(&mut self) {
        self.empty = !self.flags.iter().any(|f| slot_has_data(*f));
    }
}

/// A cached day of either source kind
#[derive(Debug, Clone, PartialEq)]
pub enum DayRecord {
    Wallbox(WallboxDay),
    EnergyManager(EnergyManagerDay),
}

impl DayRecord {
    pub fn no_data(source: SourceId) -> Self {
        match source {
            SourceId::Wallbox(_) => DayRecord::Wallbox(WallboxDay::no_data()),
            SourceId::EnergyManager => DayRecord::EnergyManager(EnergyManagerDay::no_data()),
        }
    }

    pub fn stamp(&self) -> Stamp {
        match self {
            DayRecord::Wallbox(day) => day.stamp,
            DayRecord::EnergyManager(day) => day.stamp,
        }
    }

    pub fn set_stamp(&mut self, stamp: Stamp) {
        match self {
            DayRecord::Wallbox(day) => day.stamp = stamp,
            DayRecord::EnergyManager(day) => day.stamp = stamp,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DayRecord::Wallbox(day) => day.empty,
            DayRecord::EnergyManager(day) => day.empty,
        }
    }

    pub fn flags(&self) -> &[u8; SLOTS_PER_DAY] {
        match self {
            DayRecord::Wallbox(day) => &day.flags,
            DayRecord::EnergyManager(day) => &day.flags,
        }
    }
}

/// One updated wallbox slot pushed by the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallboxChange {
    pub uid: u32,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub flags: u8,
    pub power: Option<f64>,
}

/// One updated energy manager slot pushed by the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyManagerChange {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub flags: u8,
    pub power_grid: Option<f64>,
    #[serde(default)]
    pub power_general: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Wallbox(WallboxChange),
    EnergyManager(EnergyManagerChange),
}

impl ChangeEvent {
    pub fn source(&self) -> SourceId {
        match self {
            ChangeEvent::Wallbox(change) => SourceId::Wallbox(change.uid),
            ChangeEvent::EnergyManager(_) => SourceId::EnergyManager,
        }
    }

    fn parts(&self) -> (i32, u32, u32, u32, u32) {
        match self {
            ChangeEvent::Wallbox(c) => (c.year, c.month, c.day, c.hour, c.minute),
            ChangeEvent::EnergyManager(c) => (c.year, c.month, c.day, c.hour, c.minute),
        }
    }

    pub fn flags(&self) -> u8 {
        match self {
            ChangeEvent::Wallbox(change) => change.flags,
            ChangeEvent::EnergyManager(change) => change.flags,
        }
    }

    pub fn date(&self) -> Result<NaiveDate> {
        let (year, month, day, _, _) = self.parts();
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            AppError::InvalidEvent(format!("no such date {}-{}-{}", year, month, day))
        })
    }

    pub fn slot(&self) -> Result<SlotIndex> {
        let (_, _, _, hour, minute) = self.parts();
        SlotIndex::from_time(hour, minute)
    }
}
