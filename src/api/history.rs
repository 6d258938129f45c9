use super::client::DeviceClient;
use crate::error::Result;
use crate::history::HistoryFetcher;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct WallboxDayRequest {
    uid: u32,
    year: i32,
    month: u32,
    day: u32,
}

#[derive(Debug, Serialize)]
struct EnergyManagerDayRequest {
    year: i32,
    month: u32,
    day: u32,
}

#[async_trait]
impl HistoryFetcher for DeviceClient {
    async fn fetch_wallbox_day(&self, uid: u32, date: NaiveDate) -> Result<Vec<Option<f64>>> {
        let request = WallboxDayRequest {
            uid,
            year: date.year(),
            month: date.month(),
            day: date.day(),
        };

        self.put("energy_manager/history_wallbox_5min", &request)
            .await
    }

    async fn fetch_energy_manager_day(&self, date: NaiveDate) -> Result<Vec<Option<f64>>> {
        let request = EnergyManagerDayRequest {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        };

        self.put("energy_manager/history_energy_manager_5min", &request)
            .await
    }
}
