use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use crate::avr::{EngineState, Shared};
use crate::commands::{Code, ZoneCode};
use crate::error::{AnthemError, Result};
use crate::model::{Dialect, VolumeScale};
use crate::store::{AttributeStore, InputDirectory};
use crate::types::{
    attenuation_to_volume, volume_to_attenuation, InputSlot, ZoneNumber, ZoneSnapshot,
    MAX_ATTENUATION, MIN_ATTENUATION,
};

/// Stored attributes of one zone
#[derive(Debug, Default)]
pub(crate) struct ZoneState {
    pub(crate) values: AttributeStore<ZoneCode>,
}

impl ZoneState {
    pub(crate) fn power(&self) -> bool {
        self.values.boolean(ZoneCode::Power)
    }

    pub(crate) fn mute(&self) -> bool {
        self.values.boolean(ZoneCode::Mute)
    }

    pub(crate) fn volume(&self, dialect: Dialect) -> u8 {
        match dialect.volume_scale() {
            VolumeScale::Attenuation => attenuation_to_volume(self.attenuation(dialect)),
            VolumeScale::Percent(code) => self
                .values
                .integer(code)
                .map_or(0, |v| v.clamp(0, 100) as u8),
        }
    }

    pub(crate) fn attenuation(&self, dialect: Dialect) -> i32 {
        match dialect {
            Dialect::Mdx => volume_to_attenuation(self.volume(dialect)),
            Dialect::X20 | Dialect::X40 => self.values.integer(ZoneCode::Volume).map_or(
                MIN_ATTENUATION,
                |v| v.clamp(MIN_ATTENUATION as i64, MAX_ATTENUATION as i64) as i32,
            ),
        }
    }

    pub(crate) fn input_number(&self) -> Option<InputSlot> {
        self.values
            .integer(ZoneCode::Input)
            .and_then(|v| InputSlot::try_from(v).ok())
    }

    pub(crate) fn snapshot(
        &self,
        number: ZoneNumber,
        dialect: Dialect,
        inputs: &InputDirectory,
    ) -> ZoneSnapshot {
        let input_number = self.input_number();
        ZoneSnapshot {
            number,
            power: self.power(),
            volume: self.volume(dialect),
            attenuation: self.attenuation(dialect),
            mute: self.mute(),
            input_number,
            input_name: input_number
                .and_then(|slot| inputs.name(slot))
                .unwrap_or("Unknown")
                .to_string(),
            raw: self
                .values
                .iter()
                .map(|(code, value)| (code.as_str().to_string(), value.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }
}

/// Handle for reading and controlling one zone
///
/// A `Zone` does not keep the receiver alive: once the [`crate::Avr`] is
/// dropped, reads return defaults and writes fail with `ConnectionClosed`.
#[derive(Clone)]
pub struct Zone {
    avr: Weak<Shared>,
    number: ZoneNumber,
}

impl Zone {
    pub(crate) fn new(avr: &Arc<Shared>, number: ZoneNumber) -> Self {
        Self {
            avr: Arc::downgrade(avr),
            number,
        }
    }

    /// Zone number, starting at 1
    pub fn number(&self) -> ZoneNumber {
        self.number
    }

    fn read<T>(&self, default: T, f: impl FnOnce(&EngineState, &ZoneState) -> T) -> T {
        let Some(shared) = self.avr.upgrade() else {
            return default;
        };
        let state = shared.state.lock();
        match state.zones.get(&self.number) {
            Some(zone) => f(&*state, zone),
            None => default,
        }
    }

    fn write(&self, f: impl FnOnce(&mut EngineState) -> Result<()>) -> Result<()> {
        let shared = self.avr.upgrade().ok_or(AnthemError::ConnectionClosed)?;
        let mut state = shared.state.lock();
        if !state.zones.contains_key(&self.number) {
            return Err(AnthemError::UnknownZone(self.number));
        }
        f(&mut *state)
    }

    fn code(&self, code: ZoneCode) -> String {
        code.for_zone(self.number)
    }

    /// Raw value last reported for a zone attribute
    pub fn raw(&self, code: ZoneCode) -> String {
        self.read(String::new(), |_, zone| zone.values.get(code).to_string())
    }

    /// Get a snapshot of everything known about the zone
    pub fn snapshot(&self) -> Option<ZoneSnapshot> {
        self.read(None, |state, zone| {
            Some(zone.snapshot(self.number, state.dialect(), &state.inputs))
        })
    }

    // ========== Power ==========

    /// Whether the zone is on
    pub fn power(&self) -> bool {
        self.read(false, |_, zone| zone.power())
    }

    /// Switch the zone on or off
    ///
    /// The power state is queried right after, since the receiver does not
    /// always report it on its own.
    pub fn set_power(&self, on: bool) -> Result<()> {
        self.write(|state| {
            state.send_command(&format!("{}{}", self.code(ZoneCode::Power), on as u8))?;
            state.send_query(&self.code(ZoneCode::Power))
        })
    }

    // ========== Volume ==========

    /// Volume level from 0 to 100
    pub fn volume(&self) -> u8 {
        self.read(0, |state, zone| zone.volume(state.dialect()))
    }

    /// Set volume, 0 to 100
    pub fn set_volume(&self, volume: u8) -> Result<()> {
        if volume > 100 {
            return Err(AnthemError::invalid("volume", volume));
        }
        self.write(|state| {
            let command = match state.dialect() {
                Dialect::X20 => format!(
                    "{}{}",
                    self.code(ZoneCode::Volume),
                    volume_to_attenuation(volume)
                ),
                Dialect::X40 => format!("{}{}", self.code(ZoneCode::PercentVolume), volume),
                Dialect::Mdx => format!("{}{}", self.code(ZoneCode::Volume), volume),
            };
            tracing::debug!("Setting zone {} volume to {}", self.number, volume);
            state.send_command(&command)
        })
    }

    /// Attenuation in dB, from -90 to 0
    pub fn attenuation(&self) -> i32 {
        self.read(MIN_ATTENUATION, |state, zone| zone.attenuation(state.dialect()))
    }

    /// Set attenuation in dB
    pub fn set_attenuation(&self, attenuation: i32) -> Result<()> {
        if !(MIN_ATTENUATION..=MAX_ATTENUATION).contains(&attenuation) {
            return Err(AnthemError::invalid("attenuation", attenuation));
        }
        self.write(|state| {
            let value = match state.dialect() {
                Dialect::Mdx => attenuation_to_volume(attenuation) as i32,
                Dialect::X20 | Dialect::X40 => attenuation,
            };
            tracing::debug!("Setting zone {} attenuation to {}", self.number, attenuation);
            state.send_command(&format!("{}{}", self.code(ZoneCode::Volume), value))
        })
    }

    /// Volume as a fraction from 0.0 to 1.0
    pub fn volume_as_percentage(&self) -> f64 {
        self.volume() as f64 / 100.0
    }

    /// Set volume as a fraction between 0.0 and 1.0
    pub fn set_volume_as_percentage(&self, fraction: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(AnthemError::invalid("volume percentage", fraction));
        }
        self.set_volume((fraction * 100.0).round() as u8)
    }

    // ========== Mute ==========

    /// Whether the zone is muted
    pub fn mute(&self) -> bool {
        self.read(false, |_, zone| zone.mute())
    }

    /// Mute or unmute the zone
    ///
    /// Mute is queried right after: the receiver does not always report it
    /// back, e.g. after a power on with no volume change.
    pub fn set_mute(&self, mute: bool) -> Result<()> {
        self.write(|state| {
            state.send_command(&format!("{}{}", self.code(ZoneCode::Mute), mute as u8))?;
            state.send_query(&self.code(ZoneCode::Mute))
        })
    }

    // ========== Input Selection ==========

    /// Slot number of the selected input
    pub fn input_number(&self) -> Option<InputSlot> {
        self.read(None, |_, zone| zone.input_number())
    }

    /// Select an input slot
    pub fn set_input_number(&self, slot: InputSlot) -> Result<()> {
        self.write(|state| select_input(state, self.number, slot))
    }

    /// Name of the selected input, "Unknown" until inputs are enumerated
    pub fn input_name(&self) -> String {
        self.read("Unknown".to_string(), |state, zone| {
            zone.input_number()
                .and_then(|slot| state.inputs.name(slot))
                .unwrap_or("Unknown")
                .to_string()
        })
    }

    /// Select an input by the name configured on the receiver
    pub fn set_input_name(&self, name: &str) -> Result<()> {
        self.write(|state| {
            let slot = state
                .inputs
                .slot(name)
                .ok_or_else(|| AnthemError::UnknownInput(name.to_string()))?;
            select_input(state, self.number, slot)
        })
    }

    // ========== Room Correction ==========

    /// Anthem Room Correction state
    ///
    /// On x40 models this is a per-input setting and reflects the input
    /// currently selected in this zone.
    pub fn arc(&self) -> bool {
        self.read(false, |state, zone| match state.dialect() {
            Dialect::X20 => zone.values.boolean(ZoneCode::Arc),
            Dialect::X40 => zone
                .input_number()
                .and_then(|slot| state.input_arc.get(&slot))
                .is_some_and(|value| value == "1"),
            Dialect::Mdx => false,
        })
    }

    /// Turn Anthem Room Correction on or off
    pub fn set_arc(&self, enabled: bool) -> Result<()> {
        self.write(|state| {
            let dialect = state.dialect();
            match dialect {
                Dialect::X20 if self.number == 1 => {
                    state.send_command(&format!("{}{}", self.code(ZoneCode::Arc), enabled as u8))
                }
                Dialect::X40 => {
                    let slot = state
                        .zones
                        .get(&self.number)
                        .and_then(ZoneState::input_number)
                        .ok_or_else(|| AnthemError::invalid("current input", "unknown"))?;
                    state.send_command(&format!("IS{}ARC{}", slot, enabled as u8))?;
                    state.send_query(&format!("IS{}ARC", slot))
                }
                _ => Err(AnthemError::Unsupported {
                    feature: "Zone ARC",
                    dialect,
                }),
            }
        })
    }
}

fn select_input(state: &mut EngineState, zone: ZoneNumber, slot: InputSlot) -> Result<()> {
    if !(1..=99).contains(&slot) {
        return Err(AnthemError::invalid("input number", slot));
    }
    tracing::debug!("Switching zone {} input to {}", zone, slot);
    state.send_command(&format!("{}{}", ZoneCode::Input.for_zone(zone), slot))?;
    state.send_query(&ZoneCode::Input.for_zone(zone))
}
