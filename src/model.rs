use serde::{Deserialize, Serialize};
use std::fmt;

use crate::commands::{DeviceCode, ZoneCode};

/// Protocol dialect spoken by a model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// MRX x20, AVM 60 and other legacy receivers
    X20,
    /// MRX x40, AVM 70/90: matrix dialect with per-input settings
    X40,
    /// MDX/MDA multi-zone amplifiers
    Mdx,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::X20 => write!(f, "x20"),
            Dialect::X40 => write!(f, "x40"),
            Dialect::Mdx => write!(f, "MDX"),
        }
    }
}

/// How a zone's volume is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeScale {
    /// `VOL` carries attenuation in dB (-90 to 0)
    Attenuation,
    /// The given code carries a 0-100 percentage
    Percent(ZoneCode),
}

/// One audio listening mode: number on the wire and display name
pub type ListeningMode = (u8, &'static str);

const X20_LISTENING_MODES: &[ListeningMode] = &[
    (0, "None"),
    (1, "AnthemLogic Cinema"),
    (2, "AnthemLogic Music"),
    (3, "PLII Movie"),
    (4, "PLII Music"),
    (5, "Neo Cinema"),
    (6, "Neo Music"),
    (7, "All Channel"),
    (8, "All Channel Mono"),
    (9, "Mono"),
    (10, "Mono-Academy"),
    (11, "Mono (L)"),
    (12, "Mono (R)"),
    (13, "High Blend"),
    (14, "Dolby Surround"),
];

const X40_LISTENING_MODES: &[ListeningMode] = &[
    (0, "None"),
    (1, "AnthemLogic Cinema"),
    (2, "AnthemLogic Music"),
    (3, "Dolby Surround"),
    (4, "DTS neural:X"),
    (5, "DTS Virtual:X"),
    (6, "All Channel Stereo"),
    (7, "Mono"),
    (8, "All Channel Mono"),
];

/// Models that only offer the first eight listening modes
const RESTRICTED_MODE_MODELS: &[&str] = &["MRX 520"];
const RESTRICTED_MODE_COUNT: usize = 8;

const X40_ONLY: &[DeviceCode] = &[
    DeviceCode::WifiMac,
    DeviceCode::EthernetMac,
    DeviceCode::PanelBrightnessX40,
    DeviceCode::TxStatusX40,
];

const X20_ONLY: &[DeviceCode] = &[
    DeviceCode::MacAddress,
    DeviceCode::TxStatus,
    DeviceCode::StandbyControl,
    DeviceCode::PanelBrightness,
];

const MDX_IGNORED: &[DeviceCode] = &[
    DeviceCode::WifiMac,
    DeviceCode::EthernetMac,
    DeviceCode::PanelBrightnessX40,
    DeviceCode::TxStatusX40,
    DeviceCode::TxStatus,
    DeviceCode::StandbyControl,
    DeviceCode::PanelBrightness,
    DeviceCode::VideoInputResolution,
    DeviceCode::HorizontalResolution,
    DeviceCode::VerticalResolution,
    DeviceCode::AudioInputChannels,
    DeviceCode::AudioInputFormat,
    DeviceCode::AudioInputBitrate,
    DeviceCode::AudioInputSampleRate,
    DeviceCode::AudioInputName,
    DeviceCode::AudioInputRateName,
    DeviceCode::ListeningMode,
    DeviceCode::DynamicRange,
    DeviceCode::DialogNormalization,
];

const MDX8_INPUTS: &[u32] = &[1, 2, 3, 4, 9];

/// Outbound traffic sent once when a dialect is first resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identification {
    Query(&'static str),
    Command(&'static str),
}

impl Dialect {
    /// Pick the dialect from a reported model string
    pub fn classify(model: &str) -> Self {
        let model = model.trim();
        if model.starts_with("MDX") || model.starts_with("MDA") {
            Dialect::Mdx
        } else if ["40", "70", "90"].iter().any(|marker| model.contains(marker)) {
            Dialect::X40
        } else {
            Dialect::X20
        }
    }

    /// Device codes that are never valid for this dialect
    pub fn ignored_commands(self) -> &'static [DeviceCode] {
        match self {
            Dialect::X20 => X40_ONLY,
            Dialect::X40 => X20_ONLY,
            Dialect::Mdx => MDX_IGNORED,
        }
    }

    /// Whether the zone code exists for the given zone in this dialect
    pub fn supports_zone_code(self, code: ZoneCode, zone: u8) -> bool {
        match (self, code) {
            (Dialect::X20, ZoneCode::PercentVolume) => false,
            (Dialect::X20, ZoneCode::Arc) => zone == 1,
            (Dialect::X40, ZoneCode::Arc) => false,
            (Dialect::Mdx, ZoneCode::PercentVolume | ZoneCode::Arc) => false,
            _ => true,
        }
    }

    /// How zone volume is expressed on the wire
    pub fn volume_scale(self) -> VolumeScale {
        match self {
            Dialect::X20 => VolumeScale::Attenuation,
            Dialect::X40 => VolumeScale::Percent(ZoneCode::PercentVolume),
            Dialect::Mdx => VolumeScale::Percent(ZoneCode::Volume),
        }
    }

    /// Queries and commands used to learn the hardware address
    pub fn identification(self) -> &'static [Identification] {
        match self {
            Dialect::X20 => &[
                Identification::Command("ECH1"),
                Identification::Query("IDN"),
            ],
            Dialect::X40 => &[
                Identification::Query("EMAC"),
                Identification::Query("WMAC"),
            ],
            Dialect::Mdx => &[Identification::Query("IDN")],
        }
    }

    /// Query asking for the name of an input slot
    pub fn input_name_query(self, slot: u32) -> String {
        match self {
            Dialect::X40 => format!("IS{}IN", slot),
            Dialect::X20 | Dialect::Mdx => format!("ISN{:02}", slot),
        }
    }

    /// Listening mode table for the dialect
    pub fn listening_modes(self) -> &'static [ListeningMode] {
        match self {
            Dialect::X20 => X20_LISTENING_MODES,
            Dialect::X40 => X40_LISTENING_MODES,
            Dialect::Mdx => &[],
        }
    }

    /// Code holding the front panel brightness, if any
    pub fn panel_brightness_code(self) -> Option<DeviceCode> {
        match self {
            Dialect::X20 => Some(DeviceCode::PanelBrightness),
            Dialect::X40 => Some(DeviceCode::PanelBrightnessX40),
            Dialect::Mdx => None,
        }
    }

    /// Code holding the tx status, if any
    pub fn tx_status_code(self) -> Option<DeviceCode> {
        match self {
            Dialect::X20 => Some(DeviceCode::TxStatus),
            Dialect::X40 => Some(DeviceCode::TxStatusX40),
            Dialect::Mdx => None,
        }
    }
}

/// Everything derived from the model string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProfile {
    pub model: String,
    pub dialect: Dialect,
    pub zone_count: u8,
    /// Valid input slots when the model does not use a dense range
    pub input_slots: Option<&'static [u32]>,
    pub listening_modes: &'static [ListeningMode],
}

impl ModelProfile {
    /// Derive dialect, zone layout and restrictions from a model string
    pub fn resolve(model: &str) -> Self {
        let dialect = Dialect::classify(model);
        let trimmed = model.trim();

        let (zone_count, input_slots) = match dialect {
            Dialect::Mdx if trimmed.contains("16") => (8, None),
            Dialect::Mdx if trimmed.ends_with(" 8") => {
                let slots = trimmed.starts_with("MDX").then_some(MDX8_INPUTS);
                (4, slots)
            }
            _ => (2, None),
        };

        let mut listening_modes = dialect.listening_modes();
        if RESTRICTED_MODE_MODELS.iter().any(|m| trimmed.contains(m)) {
            listening_modes = &listening_modes[..RESTRICTED_MODE_COUNT.min(listening_modes.len())];
        }

        Self {
            model: model.to_string(),
            dialect,
            zone_count,
            input_slots,
            listening_modes,
        }
    }

    /// Whether the model never answers queries for `code`
    pub fn is_ignored(&self, code: DeviceCode) -> bool {
        self.dialect.ignored_commands().contains(&code)
    }

    /// Input slots to enumerate when the device reports `count` inputs
    pub fn input_slots_up_to(&self, count: u32) -> Vec<u32> {
        match self.input_slots {
            Some(slots) => slots.iter().copied().filter(|s| *s <= count).collect(),
            None => (1..=count).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_dialects() {
        assert_eq!(Dialect::classify("MRX 520"), Dialect::X20);
        assert_eq!(Dialect::classify("MRX 1120"), Dialect::X20);
        assert_eq!(Dialect::classify("AVM 60"), Dialect::X20);
        assert_eq!(Dialect::classify("MRX 540"), Dialect::X40);
        assert_eq!(Dialect::classify("MRX 740"), Dialect::X40);
        assert_eq!(Dialect::classify("MRX 1140"), Dialect::X40);
        assert_eq!(Dialect::classify("AVM 70"), Dialect::X40);
        assert_eq!(Dialect::classify("AVM 90"), Dialect::X40);
        assert_eq!(Dialect::classify("MDX 8"), Dialect::Mdx);
        assert_eq!(Dialect::classify("MDA 16"), Dialect::Mdx);
    }

    #[test]
    fn test_zone_counts() {
        let cases = [
            ("MRX 520", 2),
            ("MRX 720", 2),
            ("MRX 1120", 2),
            ("MRX 740", 2),
            ("AVM 90", 2),
            ("MDX 8", 4),
            ("MDA 8", 4),
            ("MDX 16", 8),
            ("MDA 16", 8),
        ];
        for (model, zones) in cases {
            assert_eq!(ModelProfile::resolve(model).zone_count, zones, "{}", model);
        }
    }

    #[test]
    fn test_mdx8_restricts_inputs() {
        let profile = ModelProfile::resolve("MDX 8");
        assert_eq!(profile.input_slots_up_to(12), vec![1, 2, 3, 4, 9]);
        assert_eq!(profile.input_slots_up_to(3), vec![1, 2, 3]);
        assert_eq!(ModelProfile::resolve("MDA 8").input_slots, None);
        assert_eq!(ModelProfile::resolve("MRX 740").input_slots_up_to(3), vec![1, 2, 3]);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        assert_eq!(ModelProfile::resolve("MDX 16"), ModelProfile::resolve("MDX 16"));
    }

    #[test]
    fn test_ignored_sets_are_the_other_dialect() {
        let x20 = ModelProfile::resolve("MRX 720");
        assert!(x20.is_ignored(DeviceCode::EthernetMac));
        assert!(!x20.is_ignored(DeviceCode::MacAddress));

        let x40 = ModelProfile::resolve("MRX 740");
        assert!(x40.is_ignored(DeviceCode::MacAddress));
        assert!(!x40.is_ignored(DeviceCode::EthernetMac));

        let mdx = ModelProfile::resolve("MDX 16");
        assert!(mdx.is_ignored(DeviceCode::ListeningMode));
        assert!(!mdx.is_ignored(DeviceCode::MacAddress));
    }

    #[test]
    fn test_listening_mode_lists() {
        assert_eq!(ModelProfile::resolve("MRX 720").listening_modes.len(), 15);
        assert_eq!(ModelProfile::resolve("MRX 520").listening_modes.len(), 8);
        assert_eq!(ModelProfile::resolve("MRX 740").listening_modes.len(), 9);
        assert!(ModelProfile::resolve("MDX 8").listening_modes.is_empty());
    }

    #[test]
    fn test_input_name_queries() {
        assert_eq!(Dialect::X20.input_name_query(3), "ISN03");
        assert_eq!(Dialect::Mdx.input_name_query(12), "ISN12");
        assert_eq!(Dialect::X40.input_name_query(3), "IS3IN");
    }
}
