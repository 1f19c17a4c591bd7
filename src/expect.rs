//! `expect` is a module providing the response assertion helpers used
//! by the conformance scenarios.
//!
//! The helpers inspect the messages decoded by the exchange drivers and
//! verify the presence, the absence and the field values of the options
//! and suboptions. Both sides of every value comparison are stringified
//! first, because the scenarios state their expectations as text while
//! the wire carries integers, addresses and byte strings. A failure is
//! descriptive: it names the option, the inspected field, the received
//! values and the expectation.
//!
//! The exclusion checks are first class: expecting an option (or a
//! value) to be absent is different from not checking it, and a
//! forbidden value showing up fails the step.

use thiserror::Error;

use crate::proto::dhcp::v6::{
    self, ReceivedMessage as V6Message, ReceivedOption as V6Option, OPTION_CODE_IA_ADDRESS,
    OPTION_CODE_IA_NA, OPTION_CODE_IA_PD, OPTION_CODE_IA_PREFIX, OPTION_CODE_STATUS_CODE,
    STATUS_CODE_SUCCESS,
};
use crate::proto::dhcp::{v4, OptionError};

/// Represents the assertion failures raised by the response checks.
#[derive(Debug, Error, PartialEq)]
pub enum ExpectError {
    /// An expected option is absent from the message.
    #[error("expected option {descr} not present in the message")]
    OptionMissing {
        /// The textual option description.
        descr: String,
    },
    /// An option expected to be absent is present.
    #[error("unexpected option {descr} found in the message")]
    OptionPresent {
        /// The textual option description.
        descr: String,
    },
    /// An expected suboption is absent from its parent option.
    #[error("expected sub-option {subopt_descr} not present in the option {descr}")]
    SuboptionMissing {
        /// The textual parent option description.
        descr: String,
        /// The textual suboption description.
        subopt_descr: String,
    },
    /// A suboption expected to be absent is present in its parent.
    #[error("not expected sub-option {subopt_descr} is present in the option {descr}")]
    SuboptionPresent {
        /// The textual parent option description.
        descr: String,
        /// The textual suboption description.
        subopt_descr: String,
    },
    /// The inspected option carries no such field.
    #[error("within option {descr} there is no {field} value")]
    NoSuchField {
        /// The textual option description.
        descr: String,
        /// The inspected field name.
        field: String,
    },
    /// The inspected field differs from the expected value.
    #[error("invalid {descr} option, received {field}: {received}, but expected {expected}")]
    ValueMismatch {
        /// The textual option description.
        descr: String,
        /// The inspected field name.
        field: String,
        /// The received values, comma separated.
        received: String,
        /// The expected value.
        expected: String,
    },
    /// The inspected field carries a forbidden value.
    #[error("received value of {field}: {received} should not be equal to {expected}")]
    ValueExcluded {
        /// The inspected field name.
        field: String,
        /// The received values, comma separated.
        received: String,
        /// The excluded value.
        expected: String,
    },
    /// A container carries no status code although a non-success status
    /// was expected.
    ///
    /// An absent status code implies Success, so expecting any other
    /// status with no status option sent is a failure.
    #[error("status code missing so it is Success by default, but expected {expected}")]
    StatusCodeMissing {
        /// The expected status code.
        expected: u16,
    },
    /// The inspected message header field is not supported.
    #[error("message field {field:?} is not supported")]
    UnknownMessageField {
        /// The requested field name.
        field: String,
    },
    /// An error resolving an option name.
    #[error(transparent)]
    Option(#[from] OptionError),
}

/// The response checks over a received DHCPv6 message.
pub struct V6Response<'a> {
    message: &'a V6Message,
}

impl<'a> V6Response<'a> {
    /// Wraps a received message for checking.
    pub fn new(message: &'a V6Message) -> V6Response<'a> {
        V6Response { message }
    }

    /// Checks the presence of an option.
    ///
    /// # Parameters
    ///
    /// - `name_or_code` is the checked option name or code
    /// - `expected` selects between the presence check (`true`) and the
    ///   absence check (`false`)
    pub fn include_option(
        &self,
        name_or_code: &str,
        expected: bool,
    ) -> Result<Vec<&V6Option>, ExpectError> {
        let code = v6::option_code(name_or_code)?;
        let options = self.message.options(code);
        if expected && options.is_empty() {
            return Err(ExpectError::OptionMissing {
                descr: v6::option_descr(code),
            });
        }
        if !expected && !options.is_empty() {
            return Err(ExpectError::OptionPresent {
                descr: v6::option_descr(code),
            });
        }
        Ok(options)
    }

    /// Checks the presence of a suboption within a parent option.
    ///
    /// Only the suboptions nested directly in the specified parent are
    /// considered, so a status code inside an IA_NA never satisfies a
    /// check against an IA_PD.
    pub fn include_suboption(
        &self,
        parent_name_or_code: &str,
        name_or_code: &str,
        expected: bool,
    ) -> Result<Vec<&V6Option>, ExpectError> {
        let parent_code = v6::option_code(parent_name_or_code)?;
        let code = v6::option_code(name_or_code)?;
        let suboptions = self.message.suboptions(parent_code, code);
        if expected && suboptions.is_empty() {
            return Err(ExpectError::SuboptionMissing {
                descr: v6::option_descr(parent_code),
                subopt_descr: v6::option_descr(code),
            });
        }
        if !expected && !suboptions.is_empty() {
            return Err(ExpectError::SuboptionPresent {
                descr: v6::option_descr(parent_code),
                subopt_descr: v6::option_descr(code),
            });
        }
        Ok(suboptions)
    }

    /// Checks the value of an option field.
    ///
    /// # Parameters
    ///
    /// - `name_or_code` is the checked option name or code
    /// - `expect` selects between the equality check (`true`) and the
    ///   exclusion check (`false`)
    /// - `field` is the inspected field name
    /// - `expected_value` is the compared value; both sides are
    ///   stringified before the comparison
    ///
    /// All instances of the option are inspected; the equality check
    /// passes when any instance matches, the exclusion check fails when
    /// any instance matches.
    pub fn option_content(
        &self,
        name_or_code: &str,
        expect: bool,
        field: &str,
        expected_value: &str,
    ) -> Result<Vec<String>, ExpectError> {
        let code = v6::option_code(name_or_code)?;
        let options = self.include_option(name_or_code, true)?;
        let received: Vec<String> = options
            .iter()
            .filter_map(|option| option.field(field))
            .collect();
        if received.is_empty() {
            return Err(ExpectError::NoSuchField {
                descr: v6::option_descr(code),
                field: field.to_string(),
            });
        }
        compare_values(&received, expect, field, expected_value, &v6::option_descr(code))?;
        Ok(received)
    }

    /// Checks the value of a suboption field within a parent option.
    ///
    /// See [`V6Response::option_content`] for the comparison rules and
    /// [`V6Response::include_suboption`] for the scoping rules.
    pub fn suboption_content(
        &self,
        parent_name_or_code: &str,
        name_or_code: &str,
        expect: bool,
        field: &str,
        expected_value: &str,
    ) -> Result<Vec<String>, ExpectError> {
        let code = v6::option_code(name_or_code)?;
        let suboptions = self.include_suboption(parent_name_or_code, name_or_code, true)?;
        let received: Vec<String> = suboptions
            .iter()
            .filter_map(|option| option.field(field))
            .collect();
        if received.is_empty() {
            return Err(ExpectError::NoSuchField {
                descr: v6::option_descr(code),
                field: field.to_string(),
            });
        }
        compare_values(&received, expect, field, expected_value, &v6::option_descr(code))?;
        Ok(received)
    }

    /// Returns the status of a container option.
    ///
    /// If the container carries no status code suboption the implicit
    /// status is Success (0), as the protocol specifies. The IA_NA and
    /// IA_PD checks both go through here, so the defaulting can't
    /// diverge between them.
    pub fn container_status(&self, parent_code: u16) -> Option<u16> {
        let suboptions = self
            .message
            .suboptions(parent_code, OPTION_CODE_STATUS_CODE);
        match suboptions.last() {
            Some(status) => status
                .field("statuscode")
                .and_then(|text| text.parse().ok()),
            None => Some(STATUS_CODE_SUCCESS),
        }
    }

    /// Checks the status and the leased address of the IA_NA option.
    ///
    /// # Parameters
    ///
    /// - `address` is the expected IA address
    /// - `status_code` is the expected status; an absent status code
    ///   suboption satisfies the Success expectation only
    /// - `expect` selects between the equality and the exclusion check
    ///   for the address
    pub fn check_ia_na(
        &self,
        address: &str,
        status_code: u16,
        expect: bool,
    ) -> Result<(), ExpectError> {
        self.check_ia(
            OPTION_CODE_IA_NA,
            OPTION_CODE_IA_ADDRESS,
            "addr",
            address,
            status_code,
            expect,
        )
    }

    /// Checks the status and the delegated prefix of the IA_PD option.
    ///
    /// See [`V6Response::check_ia_na`]; the prefix length is checked
    /// additionally when specified.
    pub fn check_ia_pd(
        &self,
        prefix: &str,
        prefix_length: Option<u8>,
        status_code: u16,
        expect: bool,
    ) -> Result<(), ExpectError> {
        self.check_ia(
            OPTION_CODE_IA_PD,
            OPTION_CODE_IA_PREFIX,
            "prefix",
            prefix,
            status_code,
            expect,
        )?;
        if status_code == STATUS_CODE_SUCCESS {
            if let Some(prefix_length) = prefix_length {
                self.suboption_content(
                    "IA_PD",
                    "IA-Prefix",
                    expect,
                    "plen",
                    &prefix_length.to_string(),
                )?;
            }
        }
        Ok(())
    }

    /// The shared IA_NA and IA_PD checking path.
    fn check_ia(
        &self,
        parent_code: u16,
        child_code: u16,
        field: &str,
        value: &str,
        status_code: u16,
        expect: bool,
    ) -> Result<(), ExpectError> {
        self.include_option(&parent_code.to_string(), true)?;
        let has_status = !self
            .message
            .suboptions(parent_code, OPTION_CODE_STATUS_CODE)
            .is_empty();
        if has_status {
            self.suboption_content(
                &parent_code.to_string(),
                &OPTION_CODE_STATUS_CODE.to_string(),
                true,
                "statuscode",
                &status_code.to_string(),
            )?;
        } else if status_code != STATUS_CODE_SUCCESS {
            return Err(ExpectError::StatusCodeMissing {
                expected: status_code,
            });
        }
        if status_code == STATUS_CODE_SUCCESS {
            self.suboption_content(
                &parent_code.to_string(),
                &child_code.to_string(),
                expect,
                field,
                value,
            )?;
        }
        Ok(())
    }
}

/// The response checks over a received DHCPv4 message.
pub struct V4Response<'a> {
    message: &'a v4::ReceivedMessage,
}

impl<'a> V4Response<'a> {
    /// Wraps a received message for checking.
    pub fn new(message: &'a v4::ReceivedMessage) -> V4Response<'a> {
        V4Response { message }
    }

    /// Checks the value of a fixed header field.
    ///
    /// The supported fields are `yiaddr`, `ciaddr`, `siaddr`, `giaddr`,
    /// `chaddr`, `sname` and `file`. Both sides are stringified before
    /// the comparison.
    pub fn message_content(
        &self,
        field: &str,
        expect: bool,
        expected_value: &str,
    ) -> Result<String, ExpectError> {
        let header = self.message.header();
        let received = match field {
            "yiaddr" => header.yiaddr.to_string(),
            "ciaddr" => header.ciaddr.to_string(),
            "siaddr" => header.siaddr.to_string(),
            "giaddr" => header.giaddr.to_string(),
            "chaddr" => header.chaddr.to_string(),
            "sname" => header.sname.clone(),
            "file" => header.file.clone(),
            field => {
                return Err(ExpectError::UnknownMessageField {
                    field: field.to_string(),
                })
            }
        };
        compare_values(
            std::slice::from_ref(&received),
            expect,
            field,
            expected_value,
            "message",
        )?;
        Ok(received)
    }

    /// Checks the presence of an option.
    pub fn include_option(
        &self,
        name_or_code: &str,
        expected: bool,
    ) -> Result<Vec<&v4::ReceivedOption>, ExpectError> {
        let code = v4::option_code(name_or_code)?;
        let options = self.message.options(code);
        if expected && options.is_empty() {
            return Err(ExpectError::OptionMissing {
                descr: v4::option_descr(code),
            });
        }
        if !expected && !options.is_empty() {
            return Err(ExpectError::OptionPresent {
                descr: v4::option_descr(code),
            });
        }
        Ok(options)
    }

    /// Checks the value of an option field.
    ///
    /// Most options expose the single `value` field with their natural
    /// textual form; the FQDN option additionally exposes `fqdn` and
    /// `flags`. See [`V6Response::option_content`] for the comparison
    /// rules.
    pub fn option_content(
        &self,
        name_or_code: &str,
        expect: bool,
        field: &str,
        expected_value: &str,
    ) -> Result<Vec<String>, ExpectError> {
        let code = v4::option_code(name_or_code)?;
        let options = self.include_option(name_or_code, true)?;
        let received: Vec<String> = options
            .iter()
            .filter_map(|option| option.field(field))
            .flatten()
            .collect();
        if received.is_empty() {
            return Err(ExpectError::NoSuchField {
                descr: v4::option_descr(code),
                field: field.to_string(),
            });
        }
        compare_values(&received, expect, field, expected_value, &v4::option_descr(code))?;
        Ok(received)
    }
}

/// Applies the equality or the exclusion comparison to the collected
/// values.
fn compare_values(
    received: &[String],
    expect: bool,
    field: &str,
    expected_value: &str,
    descr: &str,
) -> Result<(), ExpectError> {
    let matched = received.iter().any(|value| value == expected_value);
    if expect && !matched {
        return Err(ExpectError::ValueMismatch {
            descr: descr.to_string(),
            field: field.to_string(),
            received: received.join(","),
            expected: expected_value.to_string(),
        });
    }
    if !expect && matched {
        return Err(ExpectError::ValueExcluded {
            field: field.to_string(),
            received: received.join(","),
            expected: expected_value.to_string(),
        });
    }
    Ok(())
}
