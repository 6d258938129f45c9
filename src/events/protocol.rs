use crate::error::Result;
use crate::model::{ChangeEvent, Charger, EnergyManagerChange, WallboxChange};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub const TOPIC_CHARGE_MANAGER_STATE: &str = "charge_manager/state";
pub const TOPIC_WALLBOX_CHANGED: &str = "energy_manager/history_wallbox_5min_changed";
pub const TOPIC_ENERGY_MANAGER_CHANGED: &str = "energy_manager/history_energy_manager_5min_changed";
pub const TOPIC_METER_VALUES: &str = "meter/values";

/// One frame of the device's event feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct ChargeManagerState {
    #[serde(default)]
    chargers: Vec<Charger>,
}

#[derive(Debug, Clone, Deserialize)]
struct MeterValues {
    power: Option<f64>,
}

/// Events the analysis reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    ChargeManagerState(Vec<Charger>),
    Change(ChangeEvent),
    MeterValues { power: Option<f64> },
}

/// Decode one frame. Frames on topics we don't follow yield `None`.
pub fn parse_frame(text: &str) -> Result<Option<DeviceEvent>> {
    let frame: Frame = serde_json::from_str(text)?;

    let event = match frame.topic.as_str() {
        TOPIC_CHARGE_MANAGER_STATE => {
            let state: ChargeManagerState = serde_json::from_value(frame.payload)?;
            DeviceEvent::ChargeManagerState(state.chargers)
        }
        TOPIC_WALLBOX_CHANGED => {
            let change: WallboxChange = serde_json::from_value(frame.payload)?;
            DeviceEvent::Change(ChangeEvent::Wallbox(change))
        }
        TOPIC_ENERGY_MANAGER_CHANGED => {
            let change: EnergyManagerChange = serde_json::from_value(frame.payload)?;
            DeviceEvent::Change(ChangeEvent::EnergyManager(change))
        }
        TOPIC_METER_VALUES => {
            let values: MeterValues = serde_json::from_value(frame.payload)?;
            DeviceEvent::MeterValues {
                power: values.power,
            }
        }
        _ => return Ok(None),
    };

    Ok(Some(event))
}

/// Longest frame accepted before the decoder gives up on it
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Splits a byte stream into newline-delimited frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Dropping the rest of an oversized frame up to its newline
    discarding: bool,
}

impl FrameDecoder {
    /// Append a chunk and return every complete, non-blank line. Lines that
    /// are not UTF-8 or longer than [`MAX_FRAME_LEN`] are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let line = match String::from_utf8(line) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "skipping non-utf8 frame");
                    continue;
                }
            };
            let line = line.trim();

            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }

        if self.buffer.len() > MAX_FRAME_LEN {
            warn!(len = self.buffer.len(), "skipping oversized frame");
            self.buffer.clear();
            self.discarding = true;
        }

        lines
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}
