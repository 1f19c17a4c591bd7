//! `exchange::v4` is a module driving a single DHCPv4 conformance test
//! step.
//!
//! The driver mirrors [`crate::exchange::v6`] for the DHCPv4 message
//! structure: the fixed BOOTP header fields come from the context
//! values, the `message-type` option is derived from the message name
//! and the parameter request list accumulates like the v6 option
//! request. A legacy optionless BOOTP request is supported too.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use anvil_lib::session::SessionConfig;
use log::{debug, info, warn};

use crate::exchange::{evaluate_presence, ExchangeError};
use crate::proto::bootp::{HAddr, FLAG_BROADCAST};
use crate::proto::dhcp::v4::{
    option_code, option_descr, EncodedOption, Message, MessageType, OptionValue, ReceivedMessage,
    OPTION_CODE_PARAM_REQUEST_LIST,
};
use crate::proto::dhcp::OptionError;
use crate::proto::fqdn::{Fqdn, FqdnFlags};
use crate::transport::UdpChannel;

/// A structure holding the mutable context values of the exchanges.
///
/// See [`crate::exchange::v6::Values`] for the lifecycle; the fields
/// here parameterize the BOOTP header and the DHCPv4 options.
#[derive(Clone, Debug)]
pub struct Values {
    /// The client hardware address.
    pub chaddr: HAddr,
    /// The client identifier; the hardware address is used when unset.
    pub client_id: Option<HAddr>,
    /// The transaction id; generated at the message build when unset
    /// and persisted for the rest of the exchange.
    pub transaction_id: Option<u32>,
    /// The relay agent address field.
    pub giaddr: Ipv4Addr,
    /// The client address field, filled for the renewals.
    pub ciaddr: Ipv4Addr,
    /// The seconds elapsed field.
    pub secs: u16,
    /// The relay hops field.
    pub hops: u8,
    /// Whether the broadcast bit is set in the flags field.
    pub broadcast: bool,
    /// The address placed in an included `requested-address` option.
    pub requested_address: Option<Ipv4Addr>,
    /// The address placed in an included `server-id` option.
    pub server_address: Option<Ipv4Addr>,
    /// The host name placed in an included `hostname` option.
    pub hostname: String,
    /// The FQDN option flags; must be set before including an `fqdn`.
    pub fqdn_flags: Option<FqdnFlags>,
    /// The FQDN option domain name.
    pub fqdn_domain: String,
}

impl Default for Values {
    fn default() -> Self {
        Self {
            // The hardware address commonly used by the scenarios.
            chaddr: HAddr::from_mac("ff:01:02:03:ff:04").unwrap(),
            client_id: None,
            transaction_id: None,
            giaddr: Ipv4Addr::UNSPECIFIED,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            secs: 0,
            hops: 0,
            broadcast: false,
            requested_address: None,
            server_address: None,
            hostname: String::new(),
            fqdn_flags: None,
            fqdn_domain: String::new(),
        }
    }
}

/// A DHCPv4 test step driver.
pub struct Exchange {
    config: SessionConfig,
    /// The mutable context values parameterizing the built messages.
    pub values: Values,
    parameter_request_list: Vec<u8>,
    client_options: Vec<EncodedOption>,
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
            parameter_request_list: Vec::new(),
            client_options: Vec::new(),
            saved_options: HashMap::new(),
            pending: None,
            received: Vec::new(),
        }
    }

    /// Begins a new test step.
    ///
    /// See [`crate::exchange::v6::Exchange::next_step`] for the scoping
    /// rules: only the saved option sets and the context values survive.
    pub fn next_step(&mut self) {
        self.parameter_request_list.clear();
        self.client_options.clear();
        self.pending = None;
        self.received.clear();
        self.values.transaction_id = None;
    }

    /// Adds an option code to the parameter request list accumulator.
    ///
    /// The accumulated codes become a `param-request-list` option when
    /// the next message is built.
    pub fn request_option(&mut self, name_or_code: &str) -> Result<(), OptionError> {
        let code = option_code(name_or_code)?;
        self.parameter_request_list.push(code as u8);
        Ok(())
    }

    /// Includes an option built from the context values.
    ///
    /// # Errors
    ///
    /// A name with no registered code yields the
    /// [`OptionError::UnknownOption`] error; a registered name with no
    /// encoder branch yields [`OptionError::UnsupportedOption`] rather
    /// than being silently dropped.
    pub fn include_option(&mut self, name: &str) -> Result<(), OptionError> {
        let option = match name {
            "client-id" => {
                let haddr = self
                    .values
                    .client_id
                    .clone()
                    .unwrap_or_else(|| self.values.chaddr.clone());
                EncodedOption::new(61, &OptionValue::ClientId(haddr))?
            }
            "requested-address" => {
                let address =
                    self.values
                        .requested_address
                        .ok_or(OptionError::MissingContextValue {
                            option: "requested-address".to_string(),
                            value: "requested_address".to_string(),
                        })?;
                EncodedOption::new(50, &OptionValue::Address(address))?
            }
            "server-id" => {
                let address =
                    self.values
                        .server_address
                        .ok_or(OptionError::MissingContextValue {
                            option: "server-id".to_string(),
                            value: "server_address".to_string(),
                        })?;
                EncodedOption::new(54, &OptionValue::Address(address))?
            }
            "hostname" => EncodedOption::new(12, &OptionValue::Text(self.values.hostname.clone()))?,
            "fqdn" => {
                let flags = self.values.fqdn_flags.ok_or(OptionError::MissingContextValue {
                    option: "fqdn".to_string(),
                    value: "fqdn_flags".to_string(),
                })?;
                EncodedOption::new(
                    81,
                    &OptionValue::Fqdn(Fqdn::new(flags, &self.values.fqdn_domain)),
                )?
            }
            name => {
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
    pub fn include_value(
        &mut self,
        name_or_code: &str,
        value: &OptionValue,
    ) -> Result<(), OptionError> {
        let code = option_code(name_or_code)?;
        let option = EncodedOption::new(code as u8, value)?;
        self.client_options.push(option);
        Ok(())
    }

    /// Builds a message of the specified type from the accumulated
    /// options.
    ///
    /// The fixed header fields come from the context values. The name
    /// `BOOTP_REQUEST` builds a legacy request without the message type
    /// option and with the broadcast bit forced, as the BOOTP clients
    /// behave. See [`crate::exchange::v6::Exchange::build`] for the
    /// transaction id handling.
    pub fn build(&mut self, message_name: &str) -> Result<(), ExchangeError> {
        let mut message = if message_name == "BOOTP_REQUEST" {
            self.values.broadcast = true;
            Message::new_bootp()
        } else {
            Message::new(MessageType::from_name(message_name)?)
        };

        let transaction_id = self
            .values
            .transaction_id
            .unwrap_or_else(rand::random::<u32>);
        self.values.transaction_id = Some(transaction_id);

        message.header.xid = transaction_id;
        message.header.chaddr = self.values.chaddr.clone();
        message.header.giaddr = self.values.giaddr;
        message.header.ciaddr = self.values.ciaddr;
        message.header.secs = self.values.secs;
        message.header.hops = self.values.hops;
        if self.values.broadcast {
            message.header.flags |= FLAG_BROADCAST;
        }

        if !self.parameter_request_list.is_empty() {
            let codes = std::mem::take(&mut self.parameter_request_list);
            message.add_option(EncodedOption::new(
                OPTION_CODE_PARAM_REQUEST_LIST,
                &OptionValue::ParameterRequestList(codes),
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

    /// Returns the pending encoded message, e.g. for a byte level check.
    pub fn pending(&self) -> Option<&[u8]> {
        self.pending.as_deref()
    }

    /// Sends the pending message and waits for the expected reply.
    ///
    /// See [`crate::exchange::v6::Exchange::send_and_wait`]; the v4
    /// replies are correlated through the `xid` header field.
    pub fn send_and_wait(
        &mut self,
        channel: &UdpChannel,
        expected: Option<&str>,
        must_be_present: bool,
    ) -> Result<&[ReceivedMessage], ExchangeError> {
        if let Some(name) = expected {
            if name != "BOOTP_REPLY" {
                MessageType::from_name(name)?;
            }
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
                    let correlated =
                        transaction_id.map_or(true, |xid| message.header().xid == xid);
                    if correlated {
                        info!("received {} ({} byte(s))", message.type_name(), datagram.len());
                        self.received.push(message);
                    } else {
                        debug!(
                            "ignoring {} with a foreign transaction id {:#x}",
                            message.type_name(),
                            message.header().xid
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

#[cfg(test)]
mod tests {
    use anvil_lib::session::SessionConfig;

    use super::Exchange;
    use crate::proto::bootp::{FLAGS_POS, MAGIC_COOKIE_POS, OPTIONS_POS, XID_POS};
    use crate::proto::dhcp::v4::{EncodedOption, Message, MessageType, OptionValue};
    use crate::proto::dhcp::OptionError;

    fn new_exchange() -> Exchange {
        Exchange::new(SessionConfig::default())
    }

    #[test]
    fn build_discover() {
        let mut exchange = new_exchange();
        exchange.values.transaction_id = Some(0x01020304);
        exchange.request_option("subnet-mask").unwrap();
        exchange.request_option("6").unwrap();
        exchange.include_option("client-id").unwrap();
        exchange.build("DISCOVER").unwrap();

        let pending = exchange.pending().unwrap();
        let xid_pos = XID_POS as usize;
        assert_eq!(pending[xid_pos..xid_pos + 4], [1, 2, 3, 4]);
        let options_pos = OPTIONS_POS as usize;
        // message-type, then the parameter request list, then client-id.
        assert_eq!(pending[options_pos..options_pos + 3], [53, 1, 1]);
        assert_eq!(pending[options_pos + 3..options_pos + 7], [55, 2, 1, 6]);
        assert_eq!(pending[options_pos + 7..options_pos + 9], [61, 7]);
        assert_eq!(*pending.last().unwrap(), 255);
    }

    #[test]
    fn build_bootp_request() {
        let mut exchange = new_exchange();
        exchange.values.transaction_id = Some(5);
        exchange.build("BOOTP_REQUEST").unwrap();

        let pending = exchange.pending().unwrap();
        // The broadcast bit is forced and no message type is present.
        let flags_pos = FLAGS_POS as usize;
        assert_eq!(pending[flags_pos..flags_pos + 2], [0x80, 0]);
        let cookie_pos = MAGIC_COOKIE_POS as usize;
        assert_eq!(pending[cookie_pos..cookie_pos + 4], [99, 130, 83, 99]);
        assert_eq!(pending[cookie_pos + 4], 255);
    }

    #[test]
    fn build_invalid_message_type() {
        let mut exchange = new_exchange();
        let error = exchange.build("SOLICIT").unwrap_err();
        assert_eq!(error.to_string(), "invalid message type \"SOLICIT\"");
    }

    #[test]
    fn include_unknown_and_unsupported_options() {
        let mut exchange = new_exchange();
        assert_eq!(
            exchange.include_option("bogus").unwrap_err(),
            OptionError::UnknownOption {
                name: "bogus".to_string(),
            }
        );
        // `routers` resolves but only a server can send it.
        assert_eq!(
            exchange.include_option("routers").unwrap_err(),
            OptionError::UnsupportedOption {
                name: "routers".to_string(),
            }
        );
    }

    #[test]
    fn include_value_encodes_any_registered_option() {
        let mut exchange = new_exchange();
        exchange
            .include_value("hostname", &OptionValue::Text("client-7".to_string()))
            .unwrap();
        exchange.values.transaction_id = Some(1);
        exchange.build("DISCOVER").unwrap();
        let pending = exchange.pending().unwrap();
        let options_pos = OPTIONS_POS as usize;
        assert_eq!(pending[options_pos + 3..options_pos + 5], [12, 8]);
        assert_eq!(
            &pending[options_pos + 5..options_pos + 13],
            b"client-7" as &[u8]
        );
    }

    #[test]
    fn include_requested_address_needs_value() {
        let mut exchange = new_exchange();
        let error = exchange.include_option("requested-address").unwrap_err();
        assert!(matches!(error, OptionError::MissingContextValue { .. }));

        exchange.values.requested_address = Some("192.0.2.100".parse().unwrap());
        assert!(exchange.include_option("requested-address").is_ok());
    }

    #[test]
    fn absorb_discards_foreign_transaction_ids() {
        let mut exchange = new_exchange();
        exchange.values.transaction_id = Some(0x1111);

        let mut matching = Message::new(MessageType::Offer);
        matching.header.xid = 0x1111;
        let mut foreign = Message::new(MessageType::Offer);
        foreign.header.xid = 0x2222;

        exchange.absorb_replies(vec![matching.encode(), foreign.encode()]);
        assert_eq!(exchange.received().len(), 1);
        assert_eq!(exchange.received()[0].header().xid, 0x1111);
    }

    #[test]
    fn expectation_checked_against_received() {
        let mut exchange = new_exchange();
        exchange.values.transaction_id = Some(7);
        let mut offer = Message::new(MessageType::Offer);
        offer.header.xid = 7;
        exchange.absorb_replies(vec![offer.encode()]);

        assert!(exchange.expect(Some("OFFER"), true).is_ok());
        assert!(exchange.expect(Some("ACK"), true).is_err());
        assert!(exchange.expect(None, true).is_err());
    }

    #[test]
    fn copy_option_from_response() {
        let mut exchange = new_exchange();
        exchange.values.transaction_id = Some(7);
        let mut offer = Message::new(MessageType::Offer);
        offer.header.xid = 7;
        offer.add_option(
            EncodedOption::new(54, &OptionValue::Address("192.0.2.1".parse().unwrap()))
                .unwrap(),
        );
        exchange.absorb_replies(vec![offer.encode()]);

        exchange.copy_option("server-id").unwrap();
        exchange.build("REQUEST").unwrap();
        let pending = exchange.pending().unwrap();
        let options_pos = OPTIONS_POS as usize;
        // message-type first, then the copied server-id.
        assert_eq!(
            pending[options_pos + 3..options_pos + 9],
            [54, 4, 192, 0, 2, 1]
        );
    }

    #[test]
    fn save_option_survives_step_boundary() {
        let mut exchange = new_exchange();
        exchange.values.transaction_id = Some(7);
        let mut offer = Message::new(MessageType::Offer);
        offer.header.xid = 7;
        offer.add_option(
            EncodedOption::new(54, &OptionValue::Address("192.0.2.1".parse().unwrap()))
                .unwrap(),
        );
        exchange.absorb_replies(vec![offer.encode()]);
        exchange.save_option("server-id", 0).unwrap();

        exchange.next_step();
        exchange.add_saved_options(Some(0), true).unwrap();
        exchange.build("REQUEST").unwrap();
        let pending = exchange.pending().unwrap();
        let options_pos = OPTIONS_POS as usize;
        assert_eq!(
            pending[options_pos + 3..options_pos + 9],
            [54, 4, 192, 0, 2, 1]
        );

        // The erased set is now empty but still exists.
        exchange.next_step();
        exchange.add_saved_options(Some(0), true).unwrap();
        exchange.build("REQUEST").unwrap();
        let pending = exchange.pending().unwrap();
        assert_eq!(pending.len(), OPTIONS_POS as usize + 4);
    }
}
