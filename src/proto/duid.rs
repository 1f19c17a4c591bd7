//! `duid` is a module providing the DHCP Unique Identifier encoding and
//! parsing capabilities.
//!
//! The DUID formats have been described in <https://www.rfc-editor.org/rfc/rfc8415.html>,
//! section 11. Two formats are supported:
//!
//! - DUID-LLT (type 1) - link layer address plus time,
//! - DUID-LL (type 3) - link layer address only.
//!
//! The DUID-EN (type 2) format based on the vendor assigned enterprise
//! number is not supported and not planned to be supported.
//!
//! A test scenario typically specifies a DUID as a colon-delimited
//! hexadecimal string, e.g. `00:03:00:01:ff:ff:ff:ff:ff:01`. The first
//! two bytes select the format. The equivalent form without the colons
//! is accepted too.

use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

use super::buffer::{BufferError, ReceiveBuffer, TransmitBuffer};

/// DUID-LLT type code.
const DUID_TYPE_LLT: u16 = 1;
/// DUID-EN type code.
const DUID_TYPE_EN: u16 = 2;
/// DUID-LL type code.
const DUID_TYPE_LL: u16 = 3;

/// Represents errors returned by the DUID parsing functions.
#[derive(Debug, Error, PartialEq)]
pub enum DuidError {
    /// An error returned when the specified string is not a valid
    /// hexadecimal string.
    #[error("DUID value {value:?} is not a valid hexadecimal string")]
    InvalidHexString {
        /// The specified DUID string.
        value: String,
    },
    /// An error returned when the DUID carries an unsupported type code.
    ///
    /// The enterprise number based DUID-EN yields this error too because
    /// its support is not planned.
    #[error("unsupported DUID type {duid_type} in {value:?}; use DUID-LLT (1) or DUID-LL (3)")]
    UnsupportedType {
        /// The type code carried in the identifier.
        duid_type: u16,
        /// The specified DUID string.
        value: String,
    },
    /// An error returned when the identifier is shorter than its fixed
    /// header fields.
    #[error("DUID value {value:?} is truncated")]
    Truncated {
        /// The specified DUID string.
        value: String,
    },
}

/// An enum representing a DHCP Unique Identifier.
#[derive(Clone, Debug, PartialEq)]
pub enum Duid {
    /// Link layer address plus time (DUID-LLT).
    LinkLayerTime {
        /// Hardware type, typically 1 for Ethernet.
        hardware_type: u16,
        /// Seconds since the DUID epoch, modulo 2^32.
        time: u32,
        /// Link layer address.
        link_layer_address: Vec<u8>,
    },
    /// Link layer address only (DUID-LL).
    LinkLayer {
        /// Hardware type, typically 1 for Ethernet.
        hardware_type: u16,
        /// Link layer address.
        link_layer_address: Vec<u8>,
    },
}

impl Duid {
    /// Creates a new DUID-LL instance from an Ethernet address.
    pub fn new_link_layer(link_layer_address: Vec<u8>) -> Duid {
        Duid::LinkLayer {
            hardware_type: 1,
            link_layer_address,
        }
    }

    /// Creates a new DUID-LLT instance from an Ethernet address and a
    /// DUID timestamp.
    pub fn new_link_layer_time(link_layer_address: Vec<u8>, time: u32) -> Duid {
        Duid::LinkLayerTime {
            hardware_type: 1,
            time,
            link_layer_address,
        }
    }

    /// Returns the encoded identifier.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = TransmitBuffer::new();
        match self {
            Duid::LinkLayerTime {
                hardware_type,
                time,
                link_layer_address,
            } => {
                buffer.write_u16(DUID_TYPE_LLT);
                buffer.write_u16(*hardware_type);
                buffer.write_u32(*time);
                buffer.write_bytes(link_layer_address);
            }
            Duid::LinkLayer {
                hardware_type,
                link_layer_address,
            } => {
                buffer.write_u16(DUID_TYPE_LL);
                buffer.write_u16(*hardware_type);
                buffer.write_bytes(link_layer_address);
            }
        }
        buffer.into_vec()
    }

    /// Attempts to parse the identifier from its wire representation.
    ///
    /// # Parameters
    ///
    /// - `data` is the option data carrying the identifier
    ///
    /// # Result
    ///
    /// It returns the parsed identifier, the [`DuidError::UnsupportedType`]
    /// error for the type codes other than 1 and 3, or the
    /// [`DuidError::Truncated`] error when the data ends before the fixed
    /// fields of the selected format.
    pub fn decode(data: &[u8]) -> Result<Duid, DuidError> {
        let value = || hex::encode(data);
        let buffer = ReceiveBuffer::new(data);
        let map_err = |_: BufferError| DuidError::Truncated { value: value() };
        let duid_type = buffer.read_u16(0).map_err(map_err)?;
        match duid_type {
            DUID_TYPE_LLT => Ok(Duid::LinkLayerTime {
                hardware_type: buffer.read_u16(2).map_err(map_err)?,
                time: buffer.read_u32(4).map_err(map_err)?,
                link_layer_address: buffer.read_vec(8, data.len() - 8).map_err(map_err)?,
            }),
            DUID_TYPE_LL => Ok(Duid::LinkLayer {
                hardware_type: buffer.read_u16(2).map_err(map_err)?,
                link_layer_address: buffer.read_vec(4, data.len() - 4).map_err(map_err)?,
            }),
            duid_type => Err(DuidError::UnsupportedType {
                duid_type,
                value: value(),
            }),
        }
    }
}

impl FromStr for Duid {
    type Err = DuidError;

    /// Parses the identifier from a hexadecimal string.
    ///
    /// Both the colon-delimited and the plain form are accepted:
    /// `00:03:00:01:ff:ff:ff:ff:ff:01` is the same identifier as
    /// `00030001ffffffffff01`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let data = hex::decode(text.replace(':', "")).map_err(|_| DuidError::InvalidHexString {
            value: text.to_string(),
        })?;
        match Duid::decode(&data) {
            // The type code was read from the binary form; report the
            // original text in the error instead.
            Err(DuidError::UnsupportedType { duid_type, .. }) => {
                Err(DuidError::UnsupportedType {
                    duid_type,
                    value: text.to_string(),
                })
            }
            Err(DuidError::Truncated { .. }) => Err(DuidError::Truncated {
                value: text.to_string(),
            }),
            other => other,
        }
    }
}

impl Display for Duid {
    /// Formats the identifier as a colon-delimited hexadecimal string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.encode();
        let mut hex: Vec<String> = Vec::new();
        encoded.iter().for_each(|byte| {
            hex.push(format!("{:02x}", byte));
        });
        write!(f, "{}", hex.join(":"))
    }
}
