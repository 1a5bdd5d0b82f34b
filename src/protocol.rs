/// TCP port the receivers listen on
pub const DEFAULT_PORT: u16 = 14999;

const DELIMITER: u8 = b';';

/// Longest partial message kept while waiting for a delimiter
const MAX_PENDING: usize = 64 * 1024;

/// Format a query for a code
pub fn query(code: &str) -> String {
    format!("{}?;", code)
}

/// Format a command (code followed by its value)
pub fn command(body: &str) -> String {
    format!("{};", body)
}

/// Splits the inbound byte stream into messages.
///
/// Bytes are buffered until a delimiter arrives; anything after the last
/// delimiter stays buffered for the next read.
#[derive(Debug, Default)]
pub struct Framer {
    buffer: Vec<u8>,
}

impl Framer {
    /// Empty framer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes and return every complete fragment in order.
    ///
    /// Empty fragments (a bare `;`) are returned as empty strings.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(data);

        let messages = match self.buffer.iter().rposition(|&b| b == DELIMITER) {
            Some(last) => {
                let rest = self.buffer.split_off(last + 1);
                let complete = std::mem::replace(&mut self.buffer, rest);
                complete[..last]
                    .split(|&b| b == DELIMITER)
                    .map(|fragment| {
                        String::from_utf8_lossy(fragment)
                            .trim_matches(|c| c == '\r' || c == '\n')
                            .to_string()
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        if self.buffer.len() > MAX_PENDING {
            tracing::warn!(
                "Dropping {} bytes received without a delimiter",
                self.buffer.len()
            );
            self.buffer.clear();
        }
        messages
    }

    /// Bytes received after the last delimiter
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop any partial message, e.g. after a reconnect
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Error reports the device sends instead of a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// `!I` - unknown command
    InvalidCommand,
    /// `!R` - value out of range
    OutOfRange,
    /// `!E` - valid command that cannot run right now
    CannotExecute,
    /// `!Z` - command addressed to a zone that is off
    ZoneOff,
}

impl DeviceError {
    /// Split an error report into its kind and the offending command
    pub fn parse(message: &str) -> Option<(Self, &str)> {
        let kind = match message.get(..2)? {
            "!I" => DeviceError::InvalidCommand,
            "!R" => DeviceError::OutOfRange,
            "!E" => DeviceError::CannotExecute,
            "!Z" => DeviceError::ZoneOff,
            _ => return None,
        };
        Some((kind, &message[2..]))
    }

    pub(crate) fn log(self, command: &str) {
        match self {
            DeviceError::InvalidCommand => tracing::warn!("Invalid command: {}", command),
            DeviceError::OutOfRange => tracing::warn!("Out-of-range command: {}", command),
            DeviceError::CannotExecute => {
                tracing::debug!("Cannot execute recognized command: {}", command)
            }
            DeviceError::ZoneOff => {
                tracing::debug!("Ignoring command for powered-off zone: {}", command)
            }
        }
    }
}

/// Split `Z<n><rest>` into the zone number and the zone-relative part
pub fn split_zone_prefix(message: &str) -> Option<(u8, &str)> {
    let bytes = message.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'Z' || !bytes[1].is_ascii_digit() {
        return None;
    }
    Some((bytes[1] - b'0', &message[2..]))
}

/// Reports about one input slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMessage<'a> {
    /// `ISN01Turntable` (x20) or `IS1INTurntable` (x40)
    Name { slot: u32, name: &'a str },
    /// `IS2ARC1` (x40 per-input room correction)
    Arc { slot: u32, value: &'a str },
}

impl<'a> InputMessage<'a> {
    /// Parse an input name or ARC report
    pub fn parse(message: &'a str) -> Option<Self> {
        if let Some(rest) = message.strip_prefix("ISN") {
            let slot = rest.get(..2)?.parse().ok()?;
            return Some(InputMessage::Name {
                slot,
                name: &rest[2..],
            });
        }

        let rest = message.strip_prefix("IS")?;
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        let slot = rest[..digits].parse().ok()?;
        let tail = &rest[digits..];

        if let Some(name) = tail.strip_prefix("IN") {
            Some(InputMessage::Name { slot, name })
        } else if let Some(value) = tail.strip_prefix("ARC") {
            Some(InputMessage::Arc { slot, value })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_and_command_format() {
        assert_eq!(query("Z1VOL"), "Z1VOL?;");
        assert_eq!(command("Z1VOL-50"), "Z1VOL-50;");
    }

    #[test]
    fn test_framer_splits_batch() {
        let mut framer = Framer::new();
        let messages = framer.push(b"IDMMRX 740;Z2PVOL51;");
        assert_eq!(messages, vec!["IDMMRX 740", "Z2PVOL51"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_framer_keeps_partial() {
        let mut framer = Framer::new();
        assert_eq!(framer.push(b"Z1POW1;Z1V"), vec!["Z1POW1"]);
        assert_eq!(framer.pending(), b"Z1V");
        assert!(framer.push(b"OL-4").is_empty());
        assert_eq!(framer.push(b"2;"), vec!["Z1VOL-42"]);
    }

    #[test]
    fn test_framer_drops_oversized_partial() {
        let mut framer = Framer::new();
        let garbage = vec![b'x'; MAX_PENDING + 1];
        assert!(framer.push(&garbage).is_empty());
        assert!(framer.pending().is_empty());

        // A tail after a delimiter counts too
        let mut batch = b"Z1POW1;".to_vec();
        batch.extend(std::iter::repeat(b'y').take(MAX_PENDING + 1));
        assert_eq!(framer.push(&batch), vec!["Z1POW1"]);
        assert!(framer.pending().is_empty());

        // Framing recovers at the next message
        assert_eq!(framer.push(b"IDMMRX 740;"), vec!["IDMMRX 740"]);
    }

    #[test]
    fn test_framer_reports_bare_delimiter() {
        let mut framer = Framer::new();
        assert_eq!(framer.push(b";"), vec![""]);
        assert_eq!(framer.push(b"Z1MUT1;;"), vec!["Z1MUT1", ""]);
    }

    #[test]
    fn test_framer_strips_line_endings() {
        let mut framer = Framer::new();
        assert_eq!(framer.push(b"Z1POW1;\r\nZ1MUT0;"), vec!["Z1POW1", "Z1MUT0"]);
    }

    #[test]
    fn test_device_errors() {
        assert_eq!(
            DeviceError::parse("!IZ1XYZ"),
            Some((DeviceError::InvalidCommand, "Z1XYZ"))
        );
        assert_eq!(
            DeviceError::parse("!ZZ2POW1"),
            Some((DeviceError::ZoneOff, "Z2POW1"))
        );
        assert_eq!(DeviceError::parse("!Q"), None);
        assert_eq!(DeviceError::parse("!"), None);
        assert_eq!(DeviceError::parse("Z1POW1"), None);
    }

    #[test]
    fn test_zone_prefix() {
        assert_eq!(split_zone_prefix("Z2MUT1"), Some((2, "MUT1")));
        assert_eq!(split_zone_prefix("ZX"), None);
        assert_eq!(split_zone_prefix("IDM"), None);
    }

    #[test]
    fn test_input_messages() {
        assert_eq!(
            InputMessage::parse("ISN01Turntable"),
            Some(InputMessage::Name { slot: 1, name: "Turntable" })
        );
        assert_eq!(
            InputMessage::parse("IS12INBlu-ray"),
            Some(InputMessage::Name { slot: 12, name: "Blu-ray" })
        );
        assert_eq!(
            InputMessage::parse("IS2ARC1"),
            Some(InputMessage::Arc { slot: 2, value: "1" })
        );
        assert_eq!(InputMessage::parse("ISNx1Name"), None);
        assert_eq!(InputMessage::parse("IS3IRH1920"), None);
        assert_eq!(InputMessage::parse("IDM"), None);
    }
}
