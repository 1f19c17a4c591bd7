//! `fqdn` is a module providing the client FQDN option payload encoding
//! and parsing capabilities.
//!
//! The option carries a fully qualified domain name together with the
//! flags negotiating which party performs the DNS updates. The DHCPv4
//! variant (option 81, <https://www.rfc-editor.org/rfc/rfc4702.html>)
//! follows the flags with two deprecated RCODE bytes; the DHCPv6 variant
//! (option 39, <https://www.rfc-editor.org/rfc/rfc4704.html>) does not.
//! Both variants are handled here, selected with the
//! [`FqdnPayload::V4`] and [`FqdnPayload::V6`] layout markers.

use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

use super::buffer::{ReceiveBuffer, TransmitBuffer};

/// Represents errors returned by the FQDN payload processing functions.
#[derive(Debug, Error, PartialEq)]
pub enum FqdnError {
    /// An error returned when the flags string holds an unknown letter.
    #[error("unknown FQDN flag {letter:?}; the supported flags are N, E, O and S")]
    UnknownFlag {
        /// The rejected letter.
        letter: char,
    },
    /// An error returned when a domain name label exceeds 63 bytes and
    /// can't be carried in the DNS wire format.
    #[error("domain name label {label:?} is longer than 63 bytes")]
    LabelTooLong {
        /// The rejected label.
        label: String,
    },
    /// An error returned when the option data ends prematurely.
    #[error("FQDN option data is truncated")]
    Truncated,
}

/// A structure representing the FQDN option flags byte.
///
/// Each flag contributes a fixed bit value: N=8, E=4, O=2, S=1. The flags
/// are independent, so the byte is a sum of the set flags and the order
/// in which they were requested does not matter.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FqdnFlags {
    flags: u8,
}

impl FqdnFlags {
    /// The server should not perform any DNS updates.
    pub const N: u8 = 8;
    /// The domain name is carried in the canonical DNS wire format.
    pub const E: u8 = 4;
    /// The server overrode the client's S flag preference.
    pub const O: u8 = 2;
    /// The server should perform the forward (A/AAAA) DNS update.
    pub const S: u8 = 1;

    /// Creates the flags from a raw byte value.
    pub fn new(flags: u8) -> FqdnFlags {
        FqdnFlags { flags }
    }

    /// Returns the raw byte value.
    pub fn bits(&self) -> u8 {
        self.flags
    }

    /// Checks if the N flag is set.
    pub fn has_n(&self) -> bool {
        self.flags & Self::N != 0
    }

    /// Checks if the E flag is set.
    pub fn has_e(&self) -> bool {
        self.flags & Self::E != 0
    }

    /// Checks if the O flag is set.
    pub fn has_o(&self) -> bool {
        self.flags & Self::O != 0
    }

    /// Checks if the S flag is set.
    pub fn has_s(&self) -> bool {
        self.flags & Self::S != 0
    }
}

impl FromStr for FqdnFlags {
    type Err = FqdnError;

    /// Parses the flags from a string of letters, e.g. `SE`.
    ///
    /// The letters can appear in any order. An empty string yields the
    /// zero flags byte.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut flags = 0;
        for letter in text.chars() {
            flags |= match letter {
                'N' => Self::N,
                'E' => Self::E,
                'O' => Self::O,
                'S' => Self::S,
                letter => return Err(FqdnError::UnknownFlag { letter }),
            };
        }
        Ok(FqdnFlags::new(flags))
    }
}

impl Display for FqdnFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bit, letter) in [(Self::N, 'N'), (Self::E, 'E'), (Self::O, 'O'), (Self::S, 'S')] {
            if self.flags & bit != 0 {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

/// An enum selecting the FQDN option payload layout.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FqdnPayload {
    /// DHCPv4 option 81 layout with the two deprecated RCODE bytes.
    V4,
    /// DHCPv6 option 39 layout without the RCODE bytes.
    V6,
}

/// A structure representing the decoded FQDN option payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Fqdn {
    /// The flags byte.
    pub flags: FqdnFlags,
    /// The carried domain name with the labels joined with dots.
    pub domain_name: String,
}

impl Fqdn {
    /// Creates a new payload instance.
    pub fn new(flags: FqdnFlags, domain_name: &str) -> Fqdn {
        Fqdn {
            flags,
            domain_name: domain_name.to_string(),
        }
    }

    /// Returns the encoded option payload.
    ///
    /// When the E flag is set the domain name is encoded as a sequence
    /// of labels, each preceded by a single byte holding its length.
    /// A name with a trailing dot is fully qualified and gets the root
    /// label terminator; a name without it is a partial name and does
    /// not. Without the E flag the name is carried verbatim.
    ///
    /// # Errors
    ///
    /// It returns the [`FqdnError::LabelTooLong`] error when a label
    /// can't be represented in the DNS wire format.
    pub fn encode(&self, layout: FqdnPayload) -> Result<Vec<u8>, FqdnError> {
        let mut buffer = TransmitBuffer::new();
        buffer.write_u8(self.flags.bits());
        if layout == FqdnPayload::V4 {
            // RCODE1 and RCODE2 are deprecated but must be present.
            buffer.write_u8(0);
            buffer.write_u8(0);
        }
        if self.flags.has_e() {
            buffer.write_bytes(&wire_encode_name(&self.domain_name)?);
        } else {
            buffer.write_bytes(self.domain_name.as_bytes());
        }
        Ok(buffer.into_vec())
    }

    /// Attempts to parse the payload from the option data.
    ///
    /// The E flag in the decoded flags byte selects how the rest of the
    /// data is interpreted, mirroring [`Fqdn::encode`].
    pub fn decode(data: &[u8], layout: FqdnPayload) -> Result<Fqdn, FqdnError> {
        let buffer = ReceiveBuffer::new(data);
        let flags = FqdnFlags::new(buffer.read_u8(0).map_err(|_| FqdnError::Truncated)?);
        let name_pos = match layout {
            FqdnPayload::V4 => 3,
            FqdnPayload::V6 => 1,
        };
        if data.len() < name_pos {
            return Err(FqdnError::Truncated);
        }
        let name_data = &data[name_pos..];
        let domain_name = if flags.has_e() {
            wire_decode_name(name_data)?
        } else {
            String::from_utf8_lossy(name_data).to_string()
        };
        Ok(Fqdn { flags, domain_name })
    }
}

/// Encodes a domain name into the DNS wire format.
///
/// Each label is preceded by a single byte giving its length. The name
/// `four.example.com` becomes `\x04four\x07example\x03com`. An empty
/// trailing label, present when the name ends with a dot, produces the
/// zero length root terminator.
pub fn wire_encode_name(name: &str) -> Result<Vec<u8>, FqdnError> {
    let mut buffer = TransmitBuffer::new();
    for label in name.split('.') {
        if label.len() > 63 {
            return Err(FqdnError::LabelTooLong {
                label: label.to_string(),
            });
        }
        buffer.write_u8(label.len() as u8);
        buffer.write_bytes(label.as_bytes());
    }
    Ok(buffer.into_vec())
}

/// Decodes a domain name from the DNS wire format.
///
/// It is an inverse of [`wire_encode_name`]: the labels are joined with
/// dots and the root terminator, when present, becomes a trailing dot.
pub fn wire_decode_name(data: &[u8]) -> Result<String, FqdnError> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let len = data[pos] as usize;
        pos += 1;
        if pos + len > data.len() {
            return Err(FqdnError::Truncated);
        }
        labels.push(String::from_utf8_lossy(&data[pos..pos + len]).to_string());
        pos += len;
    }
    Ok(labels.join("."))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{wire_decode_name, wire_encode_name, Fqdn, FqdnError, FqdnFlags, FqdnPayload};

    #[test]
    fn flags_from_letters() {
        let flags = FqdnFlags::from_str("NEOS").unwrap();
        assert_eq!(flags.bits(), 15);
        assert!(flags.has_n());
        assert!(flags.has_e());
        assert!(flags.has_o());
        assert!(flags.has_s());
    }

    #[test]
    fn flags_composition_is_commutative() {
        let so = FqdnFlags::from_str("SO").unwrap();
        let os = FqdnFlags::from_str("OS").unwrap();
        assert_eq!(so, os);
        assert_eq!(so.bits(), 3);
    }

    #[test]
    fn flags_empty() {
        let flags = FqdnFlags::from_str("").unwrap();
        assert_eq!(flags.bits(), 0);
    }

    #[test]
    fn flags_unknown_letter() {
        let flags = FqdnFlags::from_str("SX");
        assert_eq!(
            flags.unwrap_err().to_string(),
            "unknown FQDN flag 'X'; the supported flags are N, E, O and S"
        );
    }

    #[test]
    fn flags_display() {
        assert_eq!(FqdnFlags::new(5).to_string(), "ES");
    }

    #[test]
    fn encode_v4_plain_name() {
        let fqdn = Fqdn::new(FqdnFlags::from_str("S").unwrap(), "four.example.com");
        let data = fqdn.encode(FqdnPayload::V4).unwrap();
        assert_eq!(data[0], 1);
        assert_eq!(data[1..3], [0, 0]);
        assert_eq!(&data[3..], "four.example.com".as_bytes());
    }

    #[test]
    fn encode_v4_wire_name() {
        let fqdn = Fqdn::new(FqdnFlags::from_str("SE").unwrap(), "four.example.com");
        let data = fqdn.encode(FqdnPayload::V4).unwrap();
        assert_eq!(data[0], 5);
        assert_eq!(data[1..3], [0, 0]);
        assert_eq!(
            &data[3..],
            b"\x04four\x07example\x03com" as &[u8]
        );
    }

    #[test]
    fn encode_v6_wire_name() {
        let fqdn = Fqdn::new(FqdnFlags::from_str("SE").unwrap(), "four.example.com");
        let data = fqdn.encode(FqdnPayload::V6).unwrap();
        assert_eq!(data[0], 5);
        assert_eq!(
            &data[1..],
            b"\x04four\x07example\x03com" as &[u8]
        );
    }

    #[test]
    fn encode_fully_qualified_name_terminated() {
        let encoded = wire_encode_name("example.com.").unwrap();
        assert_eq!(encoded, b"\x07example\x03com\x00");
    }

    #[test]
    fn encode_too_long_label() {
        let name = format!("{}.example.com", "a".repeat(64));
        assert!(matches!(
            wire_encode_name(&name).unwrap_err(),
            FqdnError::LabelTooLong { .. }
        ));
    }

    #[test]
    fn decode_wire_name() {
        let name = wire_decode_name(b"\x04four\x07example\x03com").unwrap();
        assert_eq!(name, "four.example.com");
    }

    #[test]
    fn decode_truncated_wire_name() {
        let name = wire_decode_name(b"\x04fo");
        assert_eq!(name.unwrap_err(), FqdnError::Truncated);
    }

    #[test]
    fn round_trip_v4() {
        for letters in ["", "S", "SE", "NEOS"] {
            let fqdn = Fqdn::new(FqdnFlags::from_str(letters).unwrap(), "host.example.org");
            let data = fqdn.encode(FqdnPayload::V4).unwrap();
            assert_eq!(Fqdn::decode(&data, FqdnPayload::V4).unwrap(), fqdn);
        }
    }

    #[test]
    fn round_trip_v6() {
        let fqdn = Fqdn::new(FqdnFlags::from_str("E").unwrap(), "host.example.org");
        let data = fqdn.encode(FqdnPayload::V6).unwrap();
        assert_eq!(Fqdn::decode(&data, FqdnPayload::V6).unwrap(), fqdn);
    }

    #[test]
    fn decode_empty_data() {
        assert_eq!(
            Fqdn::decode(&[], FqdnPayload::V6).unwrap_err(),
            FqdnError::Truncated
        );
    }
}
