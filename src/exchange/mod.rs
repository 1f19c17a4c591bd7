//! `exchange` is a module orchestrating a single conformance test step:
//! accumulate the client options, build a message, send it, wait for the
//! replies and hand them to the response assertions.
//!
//! The two protocol versions have their own step drivers in the [`v4`]
//! and [`v6`] submodules because their message structures and option
//! vocabularies differ. The rules deciding whether the collected
//! replies satisfy the step expectation are shared and live here.
//!
//! The state in a driver is scoped to one step: the option accumulators
//! drain into the built message and the received set is replaced
//! wholesale by the next exchange, so nothing stale can leak into a new
//! assertion. The only state crossing a step boundary is the named
//! saved-option sets the test author populates explicitly.

use thiserror::Error;

use crate::proto::dhcp::{MessageError, OptionError};

pub mod v4;
pub mod v6;

/// Represents errors returned by the exchange drivers.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// An error returned when the expected message did not arrive
    /// within the listen window.
    #[error("expected message {expected} not received (got {received})")]
    ExpectedMessageMissing {
        /// The expected message type name.
        expected: String,
        /// The received message type names, or `no response`.
        received: String,
    },
    /// An error returned when a reply arrived although none was
    /// expected.
    #[error("received message {received} was not expected")]
    UnexpectedMessage {
        /// The received message type names.
        received: String,
    },
    /// An error returned when there is no built message to be sent.
    #[error("no message has been built for this step")]
    NothingToSend,
    /// An error returned when a saved option set does not exist.
    #[error("there is no set no. {set} in the saved options")]
    NoSavedOptions {
        /// The requested set number.
        set: usize,
    },
    /// An error returned when an option to be saved or copied is absent
    /// from the received message.
    #[error("received message does not contain option {descr}")]
    OptionNotReceived {
        /// The textual option description.
        descr: String,
    },
    /// An error in the message being built or parsed.
    #[error(transparent)]
    Message(#[from] MessageError),
    /// An error in one of the included options.
    #[error(transparent)]
    Option(#[from] OptionError),
    /// A transport error.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Evaluates the step expectation against the collected replies.
///
/// # Parameters
///
/// - `received` are the type names of the replies collected within the
///   listen window
/// - `expected` is the expected message type name, or `None` when the
///   step expects silence
/// - `must_be_present` selects between the presence and the absence
///   expectation; it is ignored when `expected` is `None`
///
/// # Result
///
/// The rules are:
///
/// - silence expected: any reply fails the step,
/// - presence expected: at least one reply of the expected type must
///   have arrived,
/// - absence expected: any reply fails the step; this guards the
///   exclusion scenarios, e.g. no answer to a DECLINE.
///
/// An elapsed window by itself is never an error; it merely leaves the
/// reply list empty for these rules to judge.
pub(crate) fn evaluate_presence(
    received: &[String],
    expected: Option<&str>,
    must_be_present: bool,
) -> Result<(), ExchangeError> {
    let received_names = || received.join(" ");
    match expected {
        None => {
            if !received.is_empty() {
                return Err(ExchangeError::UnexpectedMessage {
                    received: received_names(),
                });
            }
        }
        Some(expected) => {
            if must_be_present {
                if received.is_empty() {
                    return Err(ExchangeError::ExpectedMessageMissing {
                        expected: expected.to_string(),
                        received: "no response".to_string(),
                    });
                }
                if !received.iter().any(|name| name == expected) {
                    return Err(ExchangeError::ExpectedMessageMissing {
                        expected: expected.to_string(),
                        received: received_names(),
                    });
                }
            } else if !received.is_empty() {
                return Err(ExchangeError::UnexpectedMessage {
                    received: received_names(),
                });
            }
        }
    }
    Ok(())
}
