//! `dhcp` is a module holding the DHCPv4 and DHCPv6 message building and
//! parsing logic.
//!
//! The option code namespaces of the two protocol versions are disjoint,
//! so each version has its own registry, encoder and parser in the
//! [`v4`] and [`v6`] submodules. The pieces shared by both versions live
//! here: the option name resolution and the error types.

use thiserror::Error;

use crate::proto::{buffer::BufferError, duid::DuidError, fqdn::FqdnError};

pub mod v4;
pub mod v6;

/// Represents errors returned by the option registries and encoders.
#[derive(Debug, Error, PartialEq)]
pub enum OptionError {
    /// An error returned when an option name has no registered code.
    #[error("unknown option name {name:?}")]
    UnknownOption {
        /// The unresolved option name.
        name: String,
    },
    /// An error returned when an option is recognized but no encoder
    /// can produce its payload from the exchange context.
    ///
    /// Silently skipping such an option would corrupt a conformance
    /// test, hence the hard failure.
    #[error("unsupported option {name:?}: no encoder for this option")]
    UnsupportedOption {
        /// The unsupported option name.
        name: String,
    },
    /// An error returned when an included option needs a context value
    /// the scenario has not set.
    #[error("option {option:?} requires the {value} context value to be set")]
    MissingContextValue {
        /// The included option name.
        option: String,
        /// The missing context value name.
        value: String,
    },
    /// An error returned when a context value can't be encoded into the
    /// included option.
    #[error("invalid value {value:?} for option {option:?}")]
    InvalidContextValue {
        /// The included option name.
        option: String,
        /// The rejected value.
        value: String,
    },
    /// An error in the DUID value carried by an option.
    #[error(transparent)]
    Duid(#[from] DuidError),
    /// An error in the FQDN value carried by an option.
    #[error(transparent)]
    Fqdn(#[from] FqdnError),
}

/// Represents errors returned by the message assembly and parsing.
#[derive(Debug, Error, PartialEq)]
pub enum MessageError {
    /// An error returned when a message type name is not recognized.
    #[error("invalid message type {name:?}")]
    InvalidMessageType {
        /// The unrecognized message type name.
        name: String,
    },
    /// An error returned when the received data is shorter than the
    /// fixed portion of the message.
    #[error("received message too short: {length} byte(s)")]
    TooShort {
        /// The received data length.
        length: usize,
    },
    /// An error returned when a DHCPv4 message lacks the magic cookie
    /// preceding the options.
    #[error("no magic cookie at the options position")]
    MissingMagicCookie,
    /// An error returned when an option length field points past the
    /// end of the message.
    #[error("truncated option {code} at position {position}")]
    TruncatedOption {
        /// The code of the truncated option.
        code: u16,
        /// The position at which the option starts.
        position: usize,
    },
    /// An error while reading the fixed message fields.
    #[error(transparent)]
    Buffer(#[from] BufferError),
    /// An error in one of the carried options.
    #[error(transparent)]
    Option(#[from] OptionError),
}

/// Resolves an option name or a numeric code to the integer code.
///
/// A purely numeric string is already a code and passes through without
/// a registry lookup. Anything else is resolved against the specified
/// registry.
///
/// # Parameters
///
/// - `name_or_code` is an option name like `IA_NA` or a code like `3`
/// - `registry` is the per-version table of the name to code mappings
///
/// # Errors
///
/// It returns the [`OptionError::UnknownOption`] error when the name has
/// no mapping in the registry.
pub(crate) fn resolve_code(
    name_or_code: &str,
    registry: &[(&str, u16)],
) -> Result<u16, OptionError> {
    if let Ok(code) = name_or_code.parse::<u16>() {
        return Ok(code);
    }
    registry
        .iter()
        .find(|(name, _)| *name == name_or_code)
        .map(|(_, code)| *code)
        .ok_or_else(|| OptionError::UnknownOption {
            name: name_or_code.to_string(),
        })
}

/// Returns a textual description of an option, e.g. `IA_NA[3]`.
///
/// The description is used in the assertion failures, so a failed check
/// names the option in both the symbolic and numeric form. An option
/// absent from the registry is described as `unknown[code]`.
pub(crate) fn describe_option(code: u16, registry: &[(&str, u16)]) -> String {
    let name = registry
        .iter()
        .find(|(_, option_code)| *option_code == code)
        .map(|(name, _)| *name)
        .unwrap_or("unknown");
    format!("{}[{}]", name, code)
}
