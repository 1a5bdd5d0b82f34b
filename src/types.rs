use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::Dialect;

/// Placeholder reported before the device shares its hardware address
pub const EMPTY_MAC: &str = "00:00:00:00:00:00";

/// Quietest attenuation the receivers accept (dB)
pub const MIN_ATTENUATION: i32 = -90;

/// Loudest attenuation exposed (dB)
pub const MAX_ATTENUATION: i32 = 0;

/// Zone number, starting at 1
pub type ZoneNumber = u8;

/// Input slot number, starting at 1
pub type InputSlot = u32;

/// Convert attenuation in dB (-90 to 0) to a volume level (0-100)
pub fn attenuation_to_volume(attenuation: i32) -> u8 {
    let attenuation = attenuation.clamp(MIN_ATTENUATION, MAX_ATTENUATION);
    ((90.0 + attenuation as f64) / 90.0 * 100.0).round() as u8
}

/// Convert a volume level (0-100) to attenuation in dB (-90 to 0)
pub fn volume_to_attenuation(volume: u8) -> i32 {
    let volume = volume.min(100);
    (volume as f64 / 100.0 * 90.0).round() as i32 - 90
}

/// Point-in-time copy of everything known about one zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub number: ZoneNumber,
    pub power: bool,
    pub volume: u8,
    pub attenuation: i32,
    pub mute: bool,
    pub input_number: Option<InputSlot>,
    pub input_name: String,
    /// Raw values keyed by zone-relative code
    pub raw: BTreeMap<String, String>,
}

/// Point-in-time copy of everything known about the receiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvrSnapshot {
    pub model: String,
    pub dialect: Option<Dialect>,
    pub mac_address: String,
    pub connected: bool,
    pub powered: bool,
    pub initialised: bool,
    pub inputs: BTreeMap<InputSlot, String>,
    pub zones: Vec<ZoneSnapshot>,
    /// Raw values keyed by device-global code
    pub raw: BTreeMap<String, String>,
}
