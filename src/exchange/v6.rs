//! `exchange::v6` is a module driving a single DHCPv6 conformance test
//! step.
//!
//! A step follows a fixed sequence: the scenario sets the context values
//! and includes the client options, the driver assembles the message,
//! sends it through the channel, collects the replies arriving within
//! the listen window and checks the step expectation. The decoded
//! replies stay available for the response assertions until the next
//! exchange replaces them.

use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::str::FromStr;

use anvil_lib::clock;
use anvil_lib::session::SessionConfig;
use log::{debug, info, warn};

use crate::exchange::{evaluate_presence, ExchangeError};
use crate::proto::dhcp::v6::{
    option_code, option_descr, EncodedOption, Message, MessageType, OptionValue, ReceivedMessage,
    OPTION_CODE_CLIENT_ID, OPTION_CODE_CLIENT_LINK_LAYER_ADDR, OPTION_CODE_ELAPSED_TIME,
    OPTION_CODE_FQDN, OPTION_CODE_IA_ADDRESS, OPTION_CODE_IA_NA, OPTION_CODE_IA_PD,
    OPTION_CODE_IA_PREFIX, OPTION_CODE_INTERFACE_ID, OPTION_CODE_LQ_QUERY, OPTION_CODE_ORO,
    OPTION_CODE_PREFERENCE, OPTION_CODE_RAPID_COMMIT, OPTION_CODE_REMOTE_ID,
    OPTION_CODE_SERVER_ID, OPTION_CODE_STATUS_CODE, OPTION_CODE_SUBSCRIBER_ID,
    OPTION_CODE_USER_CLASS, OPTION_CODE_VENDOR_CLASS, OPTION_CODE_VENDOR_SPECIFIC_INFO,
};
use crate::proto::dhcp::OptionError;
use crate::proto::duid::Duid;
use crate::proto::fqdn::{Fqdn, FqdnFlags};
use crate::transport::UdpChannel;

/// A structure holding the mutable context values of the exchanges.
///
/// The values parameterize the options included in the client messages.
/// A scenario overrides the defaults before including an option, e.g.
/// sets the `iaid` before including an `IA-NA`. The values persist
/// between the steps of one scenario; the per-step state lives in the
/// [`Exchange`] itself.
#[derive(Clone, Debug)]
pub struct Values {
    /// The client identifier.
    pub duid: Duid,
    /// The server identifier, saved from an earlier response or set by
    /// the scenario.
    pub server_duid: Option<Duid>,
    /// The transaction id; generated at the message build when unset
    /// and persisted for the rest of the exchange.
    pub transaction_id: Option<u32>,
    /// The IA_NA identity association id.
    pub iaid: u32,
    /// The IA_PD identity association id.
    pub iapd_iaid: u32,
    /// The renew time.
    pub t1: u32,
    /// The rebind time.
    pub t2: u32,
    /// The preferred lifetime of the requested leases.
    pub preferred_lifetime: u32,
    /// The valid lifetime of the requested leases.
    pub valid_lifetime: u32,
    /// The address placed in an included IA address.
    pub ia_address: Ipv6Addr,
    /// The prefix placed in an included IA prefix.
    pub prefix: Ipv6Addr,
    /// The length of the prefix placed in an included IA prefix.
    pub prefix_length: u8,
    /// The elapsed time value, in hundredths of a second.
    pub elapsed_time: u16,
    /// The preference value.
    pub preference: u8,
    /// The status code placed in an included status code option.
    pub status_code: u16,
    /// The status message placed in an included status code option.
    pub status_message: String,
    /// The vendor enterprise number.
    pub enterprise_number: u32,
    /// The FQDN option flags; must be set before including an `fqdn`.
    pub fqdn_flags: Option<FqdnFlags>,
    /// The FQDN option domain name.
    pub fqdn_domain: String,
    /// The relay interface identifier.
    pub interface_id: String,
    /// The relay link address.
    pub link_address: Ipv6Addr,
    /// The relay peer address.
    pub peer_address: Ipv6Addr,
    /// The relay remote identifier as a colon-delimited hex string.
    pub remote_id: String,
    /// The relay subscriber identifier as a colon-delimited hex string.
    pub subscriber_id: String,
    /// The vendor class data; `None` produces an empty vendor class.
    pub vendor_class_data: Option<String>,
    /// The user class data; `None` produces an empty user class.
    pub user_class_data: Option<String>,
    /// The leasequery type: 1 by address, 2 by client id.
    pub lq_query_type: u8,
    /// The leasequery link address.
    pub lq_query_address: Ipv6Addr,
}

impl Default for Values {
    fn default() -> Self {
        Self {
            // The identifier commonly used by the scenarios.
            duid: Duid::from_str("00:03:00:01:f6:f5:f4:f3:f2:01").unwrap(),
            server_duid: None,
            transaction_id: None,
            iaid: 1,
            iapd_iaid: 1,
            t1: 0,
            t2: 0,
            preferred_lifetime: 0,
            valid_lifetime: 0,
            ia_address: Ipv6Addr::UNSPECIFIED,
            prefix: Ipv6Addr::UNSPECIFIED,
            prefix_length: 0,
            elapsed_time: 0,
            preference: 0,
            status_code: 0,
            status_message: String::new(),
            enterprise_number: 4491,
            fqdn_flags: None,
            fqdn_domain: String::new(),
            interface_id: "port1234".to_string(),
            link_address: "2001:db8:1::1000".parse().unwrap(),
            peer_address: "fe80::1".parse().unwrap(),
            remote_id: String::new(),
            subscriber_id: String::new(),
            vendor_class_data: None,
            user_class_data: None,
            lq_query_type: 1,
            lq_query_address: Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// A DHCPv6 test step driver.
pub struct Exchange {
    config: SessionConfig,
    /// The mutable context values parameterizing the included options.
    pub values: Values,
    oro: Vec<u16>,
    client_options: Vec<EncodedOption>,
    relay_options: Vec<EncodedOption>,
    ia_na_options: Vec<EncodedOption>,
    ia_pd_options: Vec<EncodedOption>,
    vendor_options: Vec<EncodedOption>,
    saved_options: HashMap<usize, Vec<EncodedOption>>,
    pending: Option<Vec<u8>>,
    received: Vec<ReceivedMessage>,
}

impl Exchange {
    /// Creates a step driver for the specified session.
    pub fn new(config: SessionConfig) -> Exchange {
        Exchange {
            config,
            values: Values::default(),
            oro: Vec::new(),
            client_options: Vec::new(),
            relay_options: Vec::new(),
            ia_na_options: Vec::new(),
            ia_pd_options: Vec::new(),
            vendor_options: Vec::new(),
            saved_options: HashMap::new(),
            pending: None,
            received: Vec::new(),
        }
    }

    /// Begins a new test step.
    ///
    /// The option accumulators, the pending message, the received
    /// replies and the pinned transaction id are dropped. The saved
    /// option sets and the context values survive, as they parameterize
    /// the whole scenario.
    pub fn next_step(&mut self) {
        self.oro.clear();
        self.client_options.clear();
        self.relay_options.clear();
        self.ia_na_options.clear();
        self.ia_pd_options.clear();
        self.vendor_options.clear();
        self.pending = None;
        self.received.clear();
        self.values.transaction_id = None;
    }

    /// Adds an option code to the option request accumulator.
    ///
    /// The accumulated codes become an `oro` option when the next
    /// message is built.
    pub fn request_option(&mut self, name_or_code: &str) -> Result<(), OptionError> {
        let code = option_code(name_or_code)?;
        self.oro.push(code);
        Ok(())
    }

    /// Includes an option built from the context values.
    ///
    /// # Parameters
    ///
    /// - `name` is the option name from the scenario vocabulary, e.g.
    ///   `client-id`, `IA-NA` or `fqdn`
    ///
    /// # Errors
    ///
    /// A name with no registered code yields the
    /// [`OptionError::UnknownOption`] error. A registered name with no
    /// encoder branch yields [`OptionError::UnsupportedOption`]: the
    /// option can't be silently dropped because a missing option would
    /// corrupt the conformance scenario.
    pub fn include_option(&mut self, name: &str) -> Result<(), OptionError> {
        let option = match name {
            "client-id" => EncodedOption::new(
                OPTION_CODE_CLIENT_ID,
                &OptionValue::Duid(self.values.duid.clone()),
            )?,
            "empty-client-id" => EncodedOption::from_raw(OPTION_CODE_CLIENT_ID, Vec::new()),
            "wrong-client-id" => {
                // A mismatching identifier built from a random address.
                let mac: [u8; 6] = rand::random();
                EncodedOption::new(
                    OPTION_CODE_CLIENT_ID,
                    &OptionValue::Duid(Duid::new_link_layer_time(
                        mac.to_vec(),
                        clock::duid_time_now(),
                    )),
                )?
            }
            "server-id" => match &self.values.server_duid {
                Some(duid) => {
                    EncodedOption::new(OPTION_CODE_SERVER_ID, &OptionValue::Duid(duid.clone()))?
                }
                None => EncodedOption::from_raw(OPTION_CODE_SERVER_ID, Vec::new()),
            },
            "IA-NA" => EncodedOption::new(
                OPTION_CODE_IA_NA,
                &OptionValue::IaNa {
                    iaid: self.values.iaid,
                    t1: self.values.t1,
                    t2: self.values.t2,
                    options: std::mem::take(&mut self.ia_na_options),
                },
            )?,
            "IA-PD" => EncodedOption::new(
                OPTION_CODE_IA_PD,
                &OptionValue::IaPd {
                    iaid: self.values.iapd_iaid,
                    t1: self.values.t1,
                    t2: self.values.t2,
                    options: std::mem::take(&mut self.ia_pd_options),
                },
            )?,
            "IA_Address" => {
                let option = EncodedOption::new(
                    OPTION_CODE_IA_ADDRESS,
                    &OptionValue::IaAddress {
                        address: self.values.ia_address,
                        preferred_lifetime: self.values.preferred_lifetime,
                        valid_lifetime: self.values.valid_lifetime,
                        options: Vec::new(),
                    },
                )?;
                self.ia_na_options.push(option);
                return Ok(());
            }
            "IA_Prefix" => {
                let option = EncodedOption::new(
                    OPTION_CODE_IA_PREFIX,
                    &OptionValue::IaPrefix {
                        preferred_lifetime: self.values.preferred_lifetime,
                        valid_lifetime: self.values.valid_lifetime,
                        prefix_length: self.values.prefix_length,
                        prefix: self.values.prefix,
                        options: Vec::new(),
                    },
                )?;
                self.ia_pd_options.push(option);
                return Ok(());
            }
            "option-request" => EncodedOption::new(
                OPTION_CODE_ORO,
                &OptionValue::OptionRequest(std::mem::take(&mut self.oro)),
            )?,
            "rapid-commit" => {
                EncodedOption::new(OPTION_CODE_RAPID_COMMIT, &OptionValue::RapidCommit)?
            }
            "elapsed-time" => EncodedOption::new(
                OPTION_CODE_ELAPSED_TIME,
                &OptionValue::ElapsedTime(self.values.elapsed_time),
            )?,
            "preference" => EncodedOption::new(
                OPTION_CODE_PREFERENCE,
                &OptionValue::Preference(self.values.preference),
            )?,
            "status-code" => EncodedOption::new(
                OPTION_CODE_STATUS_CODE,
                &OptionValue::StatusCode {
                    code: self.values.status_code,
                    message: self.values.status_message.clone(),
                },
            )?,
            "fqdn" => {
                let flags = self.values.fqdn_flags.ok_or(OptionError::MissingContextValue {
                    option: "fqdn".to_string(),
                    value: "fqdn_flags".to_string(),
                })?;
                EncodedOption::new(
                    OPTION_CODE_FQDN,
                    &OptionValue::Fqdn(Fqdn::new(flags, &self.values.fqdn_domain)),
                )?
            }
            "vendor-class" => EncodedOption::new(
                OPTION_CODE_VENDOR_CLASS,
                &OptionValue::VendorClass {
                    enterprise_number: self.values.enterprise_number,
                    data: self
                        .values
                        .vendor_class_data
                        .iter()
                        .map(|data| data.as_bytes().to_vec())
                        .collect(),
                },
            )?,
            "user-class" => EncodedOption::new(
                OPTION_CODE_USER_CLASS,
                &OptionValue::UserClass(
                    self.values
                        .user_class_data
                        .iter()
                        .map(|data| data.as_bytes().to_vec())
                        .collect(),
                ),
            )?,
            "vendor-specific-info" => EncodedOption::new(
                OPTION_CODE_VENDOR_SPECIFIC_INFO,
                &OptionValue::VendorSpecific {
                    enterprise_number: self.values.enterprise_number,
                    options: std::mem::take(&mut self.vendor_options),
                },
            )?,
            "lq-query" => EncodedOption::new(
                OPTION_CODE_LQ_QUERY,
                &OptionValue::LqQuery {
                    query_type: self.values.lq_query_type,
                    link_address: self.values.lq_query_address,
                    options: std::mem::take(&mut self.client_options),
                },
            )?,
            name => {
                // The name must at least resolve in the registry;
                // otherwise it is unknown rather than unsupported.
                option_code(name)?;
                return Err(OptionError::UnsupportedOption {
                    name: name.to_string(),
                });
            }
        };
        self.client_options.push(option);
        Ok(())
    }

    /// Includes an option built from an explicit semantic value.
    ///
    /// This is the generic encoding path for the options the context
    /// driven [`Exchange::include_option`] has no branch for.
    pub fn include_value(
        &mut self,
        name_or_code: &str,
        value: &OptionValue,
    ) -> Result<(), OptionError> {
        let code = option_code(name_or_code)?;
        let option = EncodedOption::new(code, value)?;
        self.client_options.push(option);
        Ok(())
    }

    /// Includes a relay option carried in the relay-forward wrappers.
    ///
    /// # Parameters
    ///
    /// - `name` is the relay option name: `interface-id`, `remote-id`,
    ///   `subscriber-id` or `client-link-layer-addr`
    pub fn include_relay_option(&mut self, name: &str) -> Result<(), OptionError> {
        let option = match name {
            "interface-id" => EncodedOption::new(
                OPTION_CODE_INTERFACE_ID,
                &OptionValue::InterfaceId(self.values.interface_id.as_bytes().to_vec()),
            )?,
            "remote-id" => EncodedOption::new(
                OPTION_CODE_REMOTE_ID,
                &OptionValue::RemoteId {
                    enterprise_number: self.values.enterprise_number,
                    id: decode_colon_hex(&self.values.remote_id, "remote-id")?,
                },
            )?,
            "subscriber-id" => EncodedOption::new(
                OPTION_CODE_SUBSCRIBER_ID,
                &OptionValue::SubscriberId(decode_colon_hex(
                    &self.values.subscriber_id,
                    "subscriber-id",
                )?),
            )?,
            "client-link-layer-addr" => {
                let (hardware_type, address) = match self.values.duid.clone() {
                    Duid::LinkLayer {
                        hardware_type,
                        link_layer_address,
                    }
                    | Duid::LinkLayerTime {
                        hardware_type,
                        link_layer_address,
                        ..
                    } => (hardware_type, link_layer_address),
                };
                EncodedOption::new(
                    OPTION_CODE_CLIENT_LINK_LAYER_ADDR,
                    &OptionValue::ClientLinkLayerAddr {
                        hardware_type,
                        address,
                    },
                )?
            }
            name => {
                option_code(name)?;
                return Err(OptionError::UnsupportedOption {
                    name: name.to_string(),
                });
            }
        };
        self.relay_options.push(option);
        Ok(())
    }

    /// Adds a vendor suboption to be wrapped by the next
    /// `vendor-specific-info` option.
    pub fn add_vendor_suboption(&mut self, code: u16, data: Vec<u8>) {
        self.vendor_options.push(EncodedOption::from_raw(code, data));
    }

    /// Builds a message of the specified type from the accumulated
    /// options.
    ///
    /// The transaction id comes from the context when pinned there and
    /// is generated otherwise; either way the chosen id is persisted
    /// back into the context, so a follow-up message of the same
    /// exchange can correlate with it. The accumulated option request
    /// codes become an `oro` option preceding the other options.
    ///
    /// # Errors
    ///
    /// It returns the [`crate::proto::dhcp::MessageError::InvalidMessageType`]
    /// error for an unrecognized message name.
    pub fn build(&mut self, message_name: &str) -> Result<(), ExchangeError> {
        let message_type = MessageType::from_name(message_name)?;
        let transaction_id = self
            .values
            .transaction_id
            .unwrap_or_else(|| rand::random::<u32>() & 0xffffff);
        self.values.transaction_id = Some(transaction_id);

        let mut message = Message::new(message_type, transaction_id);
        if !self.oro.is_empty() {
            let oro = std::mem::take(&mut self.oro);
            message.add_option(EncodedOption::new(
                OPTION_CODE_ORO,
                &OptionValue::OptionRequest(oro),
            )?);
        }
        for option in self.client_options.drain(..) {
            message.add_option(option);
        }
        self.pending = Some(message.encode());
        debug!(
            "built {} with transaction id {:#x}",
            message_name, transaction_id
        );
        Ok(())
    }

    /// Encapsulates the pending message in the relay-forward wrappers.
    ///
    /// The link address, the peer address and the accumulated relay
    /// options come from the context. The relay option accumulator is
    /// drained.
    pub fn encapsulate_relay_forward(&mut self, levels: usize) -> Result<(), ExchangeError> {
        let inner = self.pending.take().ok_or(ExchangeError::NothingToSend)?;
        let relay_options = std::mem::take(&mut self.relay_options);
        self.pending = Some(Message::encapsulate_relay_forward(
            &inner,
            levels,
            &self.values.link_address,
            &self.values.peer_address,
            &relay_options,
        ));
        Ok(())
    }

    /// Returns the pending encoded message, e.g. for a byte level check.
    pub fn pending(&self) -> Option<&[u8]> {
        self.pending.as_deref()
    }

    /// Sends the pending message and waits for the expected reply.
    ///
    /// # Parameters
    ///
    /// - `channel` is the datagram channel to the tested server
    /// - `expected` is the expected message type name, or `None` when
    ///   the step expects silence
    /// - `must_be_present` selects between the presence and the absence
    ///   expectation
    ///
    /// # Result
    ///
    /// Every reply collected within the listen window (scaled for the
    /// deployment type) is parsed and kept for the subsequent response
    /// assertions. The replies not correlated with the sent transaction
    /// id are discarded, except the relay replies which carry no
    /// transaction id of their own.
    pub fn send_and_wait(
        &mut self,
        channel: &UdpChannel,
        expected: Option<&str>,
        must_be_present: bool,
    ) -> Result<&[ReceivedMessage], ExchangeError> {
        if let Some(name) = expected {
            MessageType::from_name(name)?;
        }
        let payload = self.pending.take().ok_or(ExchangeError::NothingToSend)?;
        let datagrams = channel.exchange(&payload, self.config.wait_interval())?;
        self.absorb_replies(datagrams);
        self.expect(expected, must_be_present)?;
        Ok(&self.received)
    }

    /// Replaces the received set with the parsed datagrams.
    fn absorb_replies(&mut self, datagrams: Vec<Vec<u8>>) {
        self.received.clear();
        let transaction_id = self.values.transaction_id;
        for datagram in datagrams {
            match ReceivedMessage::parse(&datagram) {
                Ok(message) => {
                    let correlated = message
                        .message_type()
                        .map(|message_type| message_type.is_relay())
                        .unwrap_or(false)
                        || transaction_id
                            .map_or(true, |xid| message.transaction_id() == xid);
                    if correlated {
                        info!("received {} ({} byte(s))", message.type_name(), datagram.len());
                        self.received.push(message);
                    } else {
                        debug!(
                            "ignoring {} with a foreign transaction id {:#x}",
                            message.type_name(),
                            message.transaction_id()
                        );
                    }
                }
                Err(error) => warn!("ignoring an unparseable datagram: {}", error),
            }
        }
    }

    /// Checks the step expectation against the received set.
    fn expect(&self, expected: Option<&str>, must_be_present: bool) -> Result<(), ExchangeError> {
        let received: Vec<String> = self
            .received
            .iter()
            .map(|message| message.type_name())
            .collect();
        evaluate_presence(&received, expected, must_be_present)
    }

    /// Returns the replies received in this step.
    pub fn received(&self) -> &[ReceivedMessage] {
        &self.received
    }

    /// Returns the last received reply.
    pub fn last_response(&self) -> Option<&ReceivedMessage> {
        self.received.last()
    }

    /// Saves an option from the last response into a named set.
    ///
    /// The saved sets survive the step boundaries; the scenario adds
    /// them back into a later message with
    /// [`Exchange::add_saved_options`].
    pub fn save_option(&mut self, name_or_code: &str, set: usize) -> Result<(), ExchangeError> {
        let code = option_code(name_or_code)?;
        let option = self
            .last_response()
            .and_then(|message| message.option(code))
            .ok_or_else(|| ExchangeError::OptionNotReceived {
                descr: option_descr(code),
            })?;
        let saved = EncodedOption::from_raw(option.code, option.data.clone());
        self.saved_options.entry(set).or_default().push(saved);
        Ok(())
    }

    /// Adds the saved options to the next message.
    ///
    /// # Parameters
    ///
    /// - `set` selects one saved set; `None` adds all of them
    /// - `erase` drops the added options from the saved sets
    pub fn add_saved_options(
        &mut self,
        set: Option<usize>,
        erase: bool,
    ) -> Result<(), ExchangeError> {
        match set {
            Some(set) => {
                let options = self
                    .saved_options
                    .get_mut(&set)
                    .ok_or(ExchangeError::NoSavedOptions { set })?;
                if erase {
                    self.client_options.append(options);
                } else {
                    self.client_options.extend(options.iter().cloned());
                }
            }
            None => {
                for options in self.saved_options.values_mut() {
                    if erase {
                        self.client_options.append(options);
                    } else {
                        self.client_options.extend(options.iter().cloned());
                    }
                }
            }
        }
        Ok(())
    }

    /// Copies an option from the first received reply into the next
    /// message.
    ///
    /// It is the usual way of carrying a server id or a leased IA from
    /// an ADVERTISE into the REQUEST.
    pub fn copy_option(&mut self, name_or_code: &str) -> Result<(), ExchangeError> {
        let code = option_code(name_or_code)?;
        let option = self
            .received
            .first()
            .and_then(|message| message.option(code))
            .ok_or_else(|| ExchangeError::OptionNotReceived {
                descr: option_descr(code),
            })?;
        self.client_options
            .push(EncodedOption::from_raw(option.code, option.data.clone()));
        Ok(())
    }
}

/// Decodes a colon-delimited hex string context value.
fn decode_colon_hex(text: &str, option: &str) -> Result<Vec<u8>, OptionError> {
    hex::decode(text.replace(':', "")).map_err(|_| OptionError::InvalidContextValue {
        option: option.to_string(),
        value: text.to_string(),
    })
}
