use crate::error::{AppError, Result};
use crate::model::{
    DayRecord, EnergyManagerDay, SourceId, WallboxDay, ENERGY_MANAGER_FIELDS, FLAG_NO_DATA,
    GENERAL_CHANNELS, SLOTS_PER_DAY, WALLBOX_FIELDS,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

/// Retrieves raw day pages of 5-minute history from the device
#[async_trait]
pub trait HistoryFetcher: Send + Sync {
    /// Flat `[flags, power]` pairs, one per slot
    async fn fetch_wallbox_day(&self, uid: u32, date: NaiveDate) -> Result<Vec<Option<f64>>>;

    /// Flat `[flags, grid, general0..general5]` tuples, one per slot
    async fn fetch_energy_manager_day(&self, date: NaiveDate) -> Result<Vec<Option<f64>>>;
}

#[async_trait]
impl<T: HistoryFetcher + ?Sized> HistoryFetcher for Arc<T> {
    async fn fetch_wallbox_day(&self, uid: u32, date: NaiveDate) -> Result<Vec<Option<f64>>> {
        (**self).fetch_wallbox_day(uid, date).await
    }

    async fn fetch_energy_manager_day(&self, date: NaiveDate) -> Result<Vec<Option<f64>>> {
        (**self).fetch_energy_manager_day(date).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DayFetch {
    /// The day lies ahead of `today`; nothing was requested
    Future,
    Loaded(DayRecord),
}

/// Fetch and decode one day of one source
pub async fn fetch_day<F: HistoryFetcher + ?Sized>(
    fetcher: &F,
    source: SourceId,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<DayFetch> {
    if date > today {
        debug!(source = %source, %date, "requested day is in the future, skipping fetch");
        return Ok(DayFetch::Future);
    }

    let record = match source {
        SourceId::Wallbox(uid) => {
            let payload = fetcher.fetch_wallbox_day(uid, date).await?;
            DayRecord::Wallbox(decode_wallbox_day(&payload)?)
        }
        SourceId::EnergyManager => {
            let payload = fetcher.fetch_energy_manager_day(date).await?;
            DayRecord::EnergyManager(decode_energy_manager_day(&payload)?)
        }
    };

    debug!(
        source = %source,
        %date,
        empty = record.is_empty(),
        "fetched day"
    );

    Ok(DayFetch::Loaded(record))
}

fn check_len(payload: &[Option<f64>], fields: usize) -> Result<()> {
    let expected = SLOTS_PER_DAY * fields;

    if payload.len() != expected {
        return Err(AppError::Payload(format!(
            "expected {} values, got {}",
            expected,
            payload.len()
        )));
    }

    Ok(())
}

/// Anything that is not a byte-sized integer counts as "no data"
fn decode_flags(value: Option<f64>) -> u8 {
    match value {
        Some(v) if v.fract() == 0.0 && (0.0..=255.0).contains(&v) => v as u8,
        _ => FLAG_NO_DATA,
    }
}

pub fn decode_wallbox_day(payload: &[Option<f64>]) -> Result<WallboxDay> {
    check_len(payload, WALLBOX_FIELDS)?;

    let mut day = WallboxDay::no_data();

    for (slot, chunk) in payload.chunks_exact(WALLBOX_FIELDS).enumerate() {
        day.flags[slot] = decode_flags(chunk[0]);
        day.power[slot] = chunk[1];
    }

    day.refresh_empty();
    Ok(day)
}

pub fn decode_energy_manager_day(payload: &[Option<f64>]) -> Result<EnergyManagerDay> {
    check_len(payload, ENERGY_MANAGER_FIELDS)?;

    let mut day = EnergyManagerDay::no_data();

    for (slot, chunk) in payload.chunks_exact(ENERGY_MANAGER_FIELDS).enumerate() {
        day.flags[slot] = decode_flags(chunk[0]);
        day.power_grid[slot] = chunk[1];
        day.power_general[slot].copy_from_slice(&chunk[2..2 + GENERAL_CHANNELS]);
    }

    day.refresh_empty();
    Ok(day)
}
