use std::fmt;

/// A fixed, enumerated command code
pub trait Code: Copy + Eq + fmt::Debug + 'static {
    /// Every code, ordered by [`Code::index`]
    const ALL: &'static [Self];

    /// The wire spelling of the code
    fn as_str(self) -> &'static str;

    /// Dense position of the code in [`Code::ALL`]
    fn index(self) -> usize;

    /// The table entry describing this code
    fn descriptor(self) -> &'static CommandDescriptor<Self>;
}

/// Metadata for one command code
#[derive(Debug)]
pub struct CommandDescriptor<C> {
    pub code: C,
    pub description: &'static str,
    /// Raw value to display text, empty when the value is free-form
    pub values: &'static [(&'static str, &'static str)],
}

impl<C> CommandDescriptor<C> {
    /// Display text for a raw value, if the code is enumerated
    pub fn text(&self, raw: &str) -> Option<&'static str> {
        self.values
            .iter()
            .find(|(value, _)| *value == raw)
            .map(|(_, text)| *text)
    }
}

/// Codes that apply to the device as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceCode {
    Region,
    Model,
    SoftwareVersion,
    BuildDate,
    HardwareVersion,
    InputCount,
    VideoInputResolution,
    HorizontalResolution,
    VerticalResolution,
    AudioInputChannels,
    AudioInputFormat,
    AudioInputBitrate,
    AudioInputSampleRate,
    AudioInputName,
    AudioInputRateName,
    ListeningMode,
    DynamicRange,
    DialogNormalization,
    MacAddress,
    TxStatus,
    StandbyControl,
    PanelBrightness,
    WifiMac,
    EthernetMac,
    PanelBrightnessX40,
    TxStatusX40,
}

impl DeviceCode {
    /// Whether a report of this code proves the device is switched on
    pub fn implies_power(self) -> bool {
        use DeviceCode::*;
        matches!(
            self,
            InputCount
                | VideoInputResolution
                | HorizontalResolution
                | VerticalResolution
                | AudioInputChannels
                | AudioInputFormat
                | AudioInputBitrate
                | AudioInputSampleRate
                | AudioInputName
                | AudioInputRateName
                | ListeningMode
                | DynamicRange
                | DialogNormalization
        )
    }

    /// Codes that carry the hardware address
    pub fn is_hardware_address(self) -> bool {
        matches!(
            self,
            DeviceCode::MacAddress | DeviceCode::EthernetMac | DeviceCode::WifiMac
        )
    }
}

impl Code for DeviceCode {
    const ALL: &'static [Self] = &[
        DeviceCode::Region,
        DeviceCode::Model,
        DeviceCode::SoftwareVersion,
        DeviceCode::BuildDate,
        DeviceCode::HardwareVersion,
        DeviceCode::InputCount,
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
        DeviceCode::MacAddress,
        DeviceCode::TxStatus,
        DeviceCode::StandbyControl,
        DeviceCode::PanelBrightness,
        DeviceCode::WifiMac,
        DeviceCode::EthernetMac,
        DeviceCode::PanelBrightnessX40,
        DeviceCode::TxStatusX40,
    ];

    fn as_str(self) -> &'static str {
        match self {
            DeviceCode::Region => "IDR",
            DeviceCode::Model => "IDM",
            DeviceCode::SoftwareVersion => "IDS",
            DeviceCode::BuildDate => "IDB",
            DeviceCode::HardwareVersion => "IDH",
            DeviceCode::InputCount => "ICN",
            DeviceCode::VideoInputResolution => "Z1VIR",
            DeviceCode::HorizontalResolution => "Z1IRH",
            DeviceCode::VerticalResolution => "Z1IRV",
            DeviceCode::AudioInputChannels => "Z1AIC",
            DeviceCode::AudioInputFormat => "Z1AIF",
            DeviceCode::AudioInputBitrate => "Z1BRT",
            DeviceCode::AudioInputSampleRate => "Z1SRT",
            DeviceCode::AudioInputName => "Z1AIN",
            DeviceCode::AudioInputRateName => "Z1AIR",
            DeviceCode::ListeningMode => "Z1ALM",
            DeviceCode::DynamicRange => "Z1DYN",
            DeviceCode::DialogNormalization => "Z1DIA",
            DeviceCode::MacAddress => "IDN",
            DeviceCode::TxStatus => "ECH",
            DeviceCode::StandbyControl => "SIP",
            DeviceCode::PanelBrightness => "FPB",
            DeviceCode::WifiMac => "WMAC",
            DeviceCode::EthernetMac => "EMAC",
            DeviceCode::PanelBrightnessX40 => "GCFPB",
            DeviceCode::TxStatusX40 => "GCTXS",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn descriptor(self) -> &'static CommandDescriptor<Self> {
        &DEVICE_COMMANDS[self.index()]
    }
}

const OFF_ON: &[(&str, &str)] = &[("0", "Off"), ("1", "On")];

/// Device-global command table, ordered like [`DeviceCode::ALL`]
pub static DEVICE_COMMANDS: [CommandDescriptor<DeviceCode>; 26] = [
    CommandDescriptor {
        code: DeviceCode::Region,
        description: "Region",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::Model,
        description: "Model",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::SoftwareVersion,
        description: "Software version",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::BuildDate,
        description: "Software build date",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::HardwareVersion,
        description: "Hardware version",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::InputCount,
        description: "Active input count",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::VideoInputResolution,
        description: "Video input resolution",
        values: &[
            ("0", "No video"),
            ("1", "Other"),
            ("2", "1080p60"),
            ("3", "1080p50"),
            ("4", "1080p24"),
            ("5", "1080i60"),
            ("6", "1080i50"),
            ("7", "720p60"),
            ("8", "720p50"),
            ("9", "576p50"),
            ("10", "576i50"),
            ("11", "480p60"),
            ("12", "480i60"),
            ("13", "3D"),
            ("14", "4K"),
        ],
    },
    CommandDescriptor {
        code: DeviceCode::HorizontalResolution,
        description: "Active horizontal video resolution (pixels)",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::VerticalResolution,
        description: "Active vertical video resolution (pixels)",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::AudioInputChannels,
        description: "Audio input channels",
        values: &[
            ("0", "No audio"),
            ("1", "Other"),
            ("2", "Mono (center channel)"),
            ("3", "2 channel"),
            ("4", "5.1 channel"),
            ("5", "6.1 channel"),
            ("6", "7.1 channel"),
            ("7", "Atmos"),
        ],
    },
    CommandDescriptor {
        code: DeviceCode::AudioInputFormat,
        description: "Audio input format",
        values: &[
            ("0", "No audio"),
            ("1", "Analog"),
            ("2", "PCM"),
            ("3", "Dolby"),
            ("4", "DSD"),
            ("5", "DTS"),
            ("6", "Atmos"),
        ],
    },
    CommandDescriptor {
        code: DeviceCode::AudioInputBitrate,
        description: "Audio input bitrate (kbps)",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::AudioInputSampleRate,
        description: "Audio input sampling rate (kHz)",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::AudioInputName,
        description: "Audio input name",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::AudioInputRateName,
        description: "Audio input rate name",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::ListeningMode,
        description: "Audio listening mode",
        values: &[
            ("00", "None"),
            ("01", "AnthemLogic Cinema"),
            ("02", "AnthemLogic Music"),
            ("03", "PLII Movie"),
            ("04", "PLII Music"),
            ("05", "Neo Cinema"),
            ("06", "Neo Music"),
            ("07", "All Channel"),
            ("08", "All Channel Mono"),
            ("09", "Mono"),
            ("10", "Mono-Academy"),
            ("11", "Mono (L)"),
            ("12", "Mono (R)"),
            ("13", "High Blend"),
            ("14", "Dolby Surround"),
            ("15", "Neo Cinema"),
            ("16", "Neo Music"),
        ],
    },
    CommandDescriptor {
        code: DeviceCode::DynamicRange,
        description: "Dolby digital dynamic range",
        values: &[("0", "Normal"), ("1", "Reduced"), ("2", "Late Night")],
    },
    CommandDescriptor {
        code: DeviceCode::DialogNormalization,
        description: "Dolby digital dialog normalization (dB)",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::MacAddress,
        description: "MAC address",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::TxStatus,
        description: "Tx status",
        values: OFF_ON,
    },
    CommandDescriptor {
        code: DeviceCode::StandbyControl,
        description: "Standby IP control",
        values: OFF_ON,
    },
    CommandDescriptor {
        code: DeviceCode::PanelBrightness,
        description: "Front panel brightness",
        values: &[("0", "Off"), ("1", "Low"), ("2", "Medium"), ("3", "High")],
    },
    CommandDescriptor {
        code: DeviceCode::WifiMac,
        description: "Wi-Fi MAC address",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::EthernetMac,
        description: "Ethernet MAC address",
        values: &[],
    },
    CommandDescriptor {
        code: DeviceCode::PanelBrightnessX40,
        description: "Front panel brightness",
        values: &[("0", "Off"), ("1", "Low"), ("2", "Medium"), ("3", "High")],
    },
    CommandDescriptor {
        code: DeviceCode::TxStatusX40,
        description: "Tx status",
        values: &[("0", "Off"), ("1", "IP On"), ("2", "IP and RS232 on")],
    },
];

/// Codes that are sent per zone as `Z<n><code>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ZoneCode {
    Power,
    Volume,
    PercentVolume,
    Mute,
    Input,
    Arc,
}

impl ZoneCode {
    /// Wire code for this attribute in the given zone, e.g. `Z2MUT`
    pub fn for_zone(self, zone: u8) -> String {
        format!("Z{}{}", zone, self.as_str())
    }
}

impl Code for ZoneCode {
    const ALL: &'static [Self] = &[
        ZoneCode::Power,
        ZoneCode::Volume,
        ZoneCode::PercentVolume,
        ZoneCode::Mute,
        ZoneCode::Input,
        ZoneCode::Arc,
    ];

    fn as_str(self) -> &'static str {
        match self {
            ZoneCode::Power => "POW",
            ZoneCode::Volume => "VOL",
            ZoneCode::PercentVolume => "PVOL",
            ZoneCode::Mute => "MUT",
            ZoneCode::Input => "INP",
            ZoneCode::Arc => "ARC",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn descriptor(self) -> &'static CommandDescriptor<Self> {
        &ZONE_COMMANDS[self.index()]
    }
}

/// Zone-relative command table, ordered like [`ZoneCode::ALL`]
pub static ZONE_COMMANDS: [CommandDescriptor<ZoneCode>; 6] = [
    CommandDescriptor {
        code: ZoneCode::Power,
        description: "Power",
        values: OFF_ON,
    },
    CommandDescriptor {
        code: ZoneCode::Volume,
        description: "Volume",
        values: &[],
    },
    CommandDescriptor {
        code: ZoneCode::PercentVolume,
        description: "Volume percentage",
        values: &[],
    },
    CommandDescriptor {
        code: ZoneCode::Mute,
        description: "Mute",
        values: &[("0", "Unmuted"), ("1", "Muted")],
    },
    CommandDescriptor {
        code: ZoneCode::Input,
        description: "Current input",
        values: &[],
    },
    CommandDescriptor {
        code: ZoneCode::Arc,
        description: "ARC",
        values: OFF_ON,
    },
];

/// Codes that are answered whatever the power state, queried on connect
pub(crate) const CORE_QUERIES: &[&str] = &["Z1POW", "IDM"];

/// Find the code a message starts with, returning it and the raw value.
///
/// The longest matching code wins, so a code can never be shadowed by a
/// shorter one that happens to be its prefix.
pub fn match_prefix<C: Code>(message: &str) -> Option<(C, &str)> {
    C::ALL
        .iter()
        .copied()
        .filter(|code| message.starts_with(code.as_str()))
        .max_by_key(|code| code.as_str().len())
        .map(|code| (code, &message[code.as_str().len()..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_ordered_by_code_index() {
        for (i, code) in DeviceCode::ALL.iter().enumerate() {
            assert_eq!(code.index(), i);
            assert_eq!(DEVICE_COMMANDS[i].code, *code);
        }
        for (i, code) in ZoneCode::ALL.iter().enumerate() {
            assert_eq!(code.index(), i);
            assert_eq!(ZONE_COMMANDS[i].code, *code);
        }
    }

    #[test]
    fn codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in DeviceCode::ALL {
            assert!(seen.insert(code.as_str()), "duplicate {}", code.as_str());
        }
    }

    #[test]
    fn match_splits_code_and_value() {
        assert_eq!(
            match_prefix::<DeviceCode>("IDMMRX 740"),
            Some((DeviceCode::Model, "MRX 740"))
        );
        assert_eq!(
            match_prefix::<ZoneCode>("VOL-42"),
            Some((ZoneCode::Volume, "-42"))
        );
        assert_eq!(
            match_prefix::<ZoneCode>("PVOL51"),
            Some((ZoneCode::PercentVolume, "51"))
        );
        assert_eq!(match_prefix::<DeviceCode>("XYZ1"), None);
    }

    #[test]
    fn empty_value_still_matches() {
        assert_eq!(
            match_prefix::<DeviceCode>("IDN"),
            Some((DeviceCode::MacAddress, ""))
        );
    }

    #[test]
    fn enumerated_values_have_text() {
        assert_eq!(DeviceCode::ListeningMode.descriptor().text("06"), Some("Neo Music"));
        assert_eq!(ZoneCode::Mute.descriptor().text("1"), Some("Muted"));
        assert_eq!(DeviceCode::Model.descriptor().text("1"), None);
    }

    #[test]
    fn zone_codes_are_prefixed_with_zone_number() {
        assert_eq!(ZoneCode::Mute.for_zone(2), "Z2MUT");
        assert_eq!(ZoneCode::PercentVolume.for_zone(1), "Z1PVOL");
    }
}
