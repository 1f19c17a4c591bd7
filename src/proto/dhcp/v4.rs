//! `dhcp::v4` is a module providing the DHCPv4 message building and
//! parsing capabilities.
//!
//! The DHCPv4 protocol described in <https://www.ietf.org/rfc/rfc2131.html>
//! has been built on top of the BOOTP protocol. It reuses its message
//! structures extending them with the DHCP options carrying additional
//! configuration data. This module internally calls the
//! [`crate::proto::bootp`] module to encode and parse the fixed fields
//! of the DHCPv4 messages and deals with the options itself.

use std::net::Ipv4Addr;

use crate::proto::bootp::{HAddr, Header, OpCode, MAGIC_COOKIE, MAGIC_COOKIE_POS, OPTIONS_POS};
use crate::proto::buffer::{ReceiveBuffer, TransmitBuffer};
use crate::proto::dhcp::{describe_option, resolve_code, MessageError, OptionError};
use crate::proto::fqdn::{Fqdn, FqdnPayload};

/// `pad` option code.
pub const OPTION_CODE_PAD: u8 = 0;
/// `subnet-mask` option code.
pub const OPTION_CODE_SUBNET_MASK: u8 = 1;
/// `routers` option code.
pub const OPTION_CODE_ROUTERS: u8 = 3;
/// `dns-servers` option code.
pub const OPTION_CODE_DNS_SERVERS: u8 = 6;
/// `hostname` option code.
pub const OPTION_CODE_HOSTNAME: u8 = 12;
/// `broadcast-address` option code.
pub const OPTION_CODE_BROADCAST_ADDRESS: u8 = 28;
/// `requested-address` option code.
pub const OPTION_CODE_REQUESTED_ADDRESS: u8 = 50;
/// `lease-time` option code.
pub const OPTION_CODE_LEASE_TIME: u8 = 51;
/// `message-type` option code.
pub const OPTION_CODE_DHCP_MESSAGE_TYPE: u8 = 53;
/// `server-id` option code.
pub const OPTION_CODE_SERVER_ID: u8 = 54;
/// `param-request-list` option code.
pub const OPTION_CODE_PARAM_REQUEST_LIST: u8 = 55;
/// `renewal-time` option code.
pub const OPTION_CODE_RENEWAL_TIME: u8 = 58;
/// `rebinding-time` option code.
pub const OPTION_CODE_REBINDING_TIME: u8 = 59;
/// `client-id` option code.
pub const OPTION_CODE_CLIENT_ID: u8 = 61;
/// `fqdn` option code.
pub const OPTION_CODE_FQDN: u8 = 81;
/// `end` option code.
pub const OPTION_CODE_END: u8 = 255;

/// DHCPv4 option codes indexed by name.
pub(crate) const REGISTRY: &[(&str, u16)] = &[
    ("subnet-mask", 1),
    ("time-offset", 2),
    ("routers", 3),
    ("time-servers", 4),
    ("dns-servers", 6),
    ("hostname", 12),
    ("domain-name", 15),
    ("interface-mtu", 26),
    ("broadcast-address", 28),
    ("vendor-specific", 43),
    ("requested-address", 50),
    ("lease-time", 51),
    ("message-type", 53),
    ("server-id", 54),
    ("param-request-list", 55),
    ("renewal-time", 58),
    ("rebinding-time", 59),
    ("vendor-class-id", 60),
    ("client-id", 61),
    ("fqdn", 81),
    ("relay-agent-info", 82),
];

/// Resolves a DHCPv4 option name or a numeric code to the integer code.
///
/// The DHCPv4 option codes are single bytes, so a larger number can't
/// denote any option and is rejected as unknown. See
/// [`crate::proto::dhcp::resolve_code`] for the resolution rules.
pub fn option_code(name_or_code: &str) -> Result<u16, OptionError> {
    let code = resolve_code(name_or_code, REGISTRY)?;
    if code > u8::MAX.into() {
        return Err(OptionError::UnknownOption {
            name: name_or_code.to_string(),
        });
    }
    Ok(code)
}

/// Returns a textual description of a DHCPv4 option, e.g. `message-type[53]`.
pub fn option_descr(code: u16) -> String {
    describe_option(code, REGISTRY)
}

/// An enum representing the DHCPv4 message types.
///
/// The types and their codes are carried in the `message-type` option (53)
/// and registered in <https://www.rfc-editor.org/rfc/rfc2131.html> and the
/// leasequery extensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MessageType {
    /// A client query looking for the available servers (1).
    Discover,
    /// A server answer with an offered address (2).
    Offer,
    /// A client query requesting the offered address (3).
    Request,
    /// A client notification that the address is already in use (4).
    Decline,
    /// A server answer confirming the lease (5).
    Ack,
    /// A server answer refusing the lease (6).
    Nak,
    /// A client notification releasing the leased address (7).
    Release,
    /// A client query for configuration without an address (8).
    Inform,
    /// A query about an existing lease (10).
    LeaseQuery,
    /// A leasequery answer for an unassigned address (11).
    LeaseUnassigned,
    /// A leasequery answer for an unknown address (12).
    LeaseUnknown,
    /// A leasequery answer for an active lease (13).
    LeaseActive,
}

impl MessageType {
    /// Attempts to convert a message type name to an enum value.
    ///
    /// The names follow the test scenario convention: `DISCOVER`,
    /// `REQUEST` etc.
    ///
    /// # Errors
    ///
    /// It returns the [`MessageError::InvalidMessageType`] error for an
    /// unrecognized name.
    pub fn from_name(name: &str) -> Result<MessageType, MessageError> {
        match name {
            "DISCOVER" => Ok(MessageType::Discover),
            "OFFER" => Ok(MessageType::Offer),
            "REQUEST" => Ok(MessageType::Request),
            "DECLINE" => Ok(MessageType::Decline),
            "ACK" => Ok(MessageType::Ack),
            "NAK" => Ok(MessageType::Nak),
            "RELEASE" => Ok(MessageType::Release),
            "INFORM" => Ok(MessageType::Inform),
            "LEASEQUERY" => Ok(MessageType::LeaseQuery),
            "LEASEUNASSIGNED" => Ok(MessageType::LeaseUnassigned),
            "LEASEUNKNOWN" => Ok(MessageType::LeaseUnknown),
            "LEASEACTIVE" => Ok(MessageType::LeaseActive),
            name => Err(MessageError::InvalidMessageType {
                name: name.to_string(),
            }),
        }
    }

    /// Returns the message type name.
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Discover => "DISCOVER",
            MessageType::Offer => "OFFER",
            MessageType::Request => "REQUEST",
            MessageType::Decline => "DECLINE",
            MessageType::Ack => "ACK",
            MessageType::Nak => "NAK",
            MessageType::Release => "RELEASE",
            MessageType::Inform => "INFORM",
            MessageType::LeaseQuery => "LEASEQUERY",
            MessageType::LeaseUnassigned => "LEASEUNASSIGNED",
            MessageType::LeaseUnknown => "LEASEUNKNOWN",
            MessageType::LeaseActive => "LEASEACTIVE",
        }
    }

    /// Converts a raw message type code to an enum value.
    pub fn from_code(code: u8) -> Option<MessageType> {
        match code {
            1 => Some(MessageType::Discover),
            2 => Some(MessageType::Offer),
            3 => Some(MessageType::Request),
            4 => Some(MessageType::Decline),
            5 => Some(MessageType::Ack),
            6 => Some(MessageType::Nak),
            7 => Some(MessageType::Release),
            8 => Some(MessageType::Inform),
            10 => Some(MessageType::LeaseQuery),
            11 => Some(MessageType::LeaseUnassigned),
            12 => Some(MessageType::LeaseUnknown),
            13 => Some(MessageType::LeaseActive),
            _ => None,
        }
    }
}

impl From<MessageType> for u8 {
    fn from(message_type: MessageType) -> u8 {
        match message_type {
            MessageType::Discover => 1,
            MessageType::Offer => 2,
            MessageType::Request => 3,
            MessageType::Decline => 4,
            MessageType::Ack => 5,
            MessageType::Nak => 6,
            MessageType::Release => 7,
            MessageType::Inform => 8,
            MessageType::LeaseQuery => 10,
            MessageType::LeaseUnassigned => 11,
            MessageType::LeaseUnknown => 12,
            MessageType::LeaseActive => 13,
        }
    }
}

/// An enum representing a semantic DHCPv4 option value.
///
/// Every category of the option payloads has its own variant, so the
/// encoder is a single exhaustive `match` instead of a chain of the
/// name comparisons.
#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    /// A message type carried in option 53.
    MessageType(MessageType),
    /// A single IPv4 address.
    Address(Ipv4Addr),
    /// A list of IPv4 addresses.
    Addresses(Vec<Ipv4Addr>),
    /// A text value.
    Text(String),
    /// A one byte number.
    Byte(u8),
    /// A two byte number in the network byte order.
    Word(u16),
    /// A four byte number in the network byte order.
    DoubleWord(u32),
    /// An opaque sequence of bytes.
    Bytes(Vec<u8>),
    /// A client FQDN payload carried in option 81.
    Fqdn(Fqdn),
    /// A list of the requested option codes carried in option 55.
    ParameterRequestList(Vec<u8>),
    /// A client identifier: the hardware type byte followed by the
    /// hardware address.
    ClientId(HAddr),
}

/// A structure representing an encoded DHCPv4 option.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedOption {
    /// Option code.
    pub code: u8,
    /// Encoded option payload, without the code and length bytes.
    pub data: Vec<u8>,
}

impl EncodedOption {
    /// Encodes a semantic value into an option.
    ///
    /// # Parameters
    ///
    /// - `code` is the option code
    /// - `value` is the semantic value to be encoded
    ///
    /// # Errors
    ///
    /// It returns an error when the FQDN payload can't be encoded.
    pub fn new(code: u8, value: &OptionValue) -> Result<EncodedOption, OptionError> {
        let mut buffer = TransmitBuffer::new();
        match value {
            OptionValue::MessageType(message_type) => buffer.write_u8((*message_type).into()),
            OptionValue::Address(address) => buffer.write_ipv4(address),
            OptionValue::Addresses(addresses) => {
                for address in addresses {
                    buffer.write_ipv4(address)
                }
            }
            OptionValue::Text(text) => buffer.write_bytes(text.as_bytes()),
            OptionValue::Byte(value) => buffer.write_u8(*value),
            OptionValue::Word(value) => buffer.write_u16(*value),
            OptionValue::DoubleWord(value) => buffer.write_u32(*value),
            OptionValue::Bytes(data) => buffer.write_bytes(data),
            OptionValue::Fqdn(fqdn) => buffer.write_bytes(&fqdn.encode(FqdnPayload::V4)?),
            OptionValue::ParameterRequestList(codes) => buffer.write_bytes(codes),
            OptionValue::ClientId(haddr) => {
                buffer.write_u8(u8::from(haddr.htype()));
                buffer.write_bytes(haddr.data());
            }
        }
        Ok(EncodedOption {
            code,
            data: buffer.into_vec(),
        })
    }

    /// Creates an option from an already encoded payload.
    ///
    /// It is used when an option received from the server is copied
    /// verbatim into the next message.
    pub fn from_raw(code: u8, data: Vec<u8>) -> EncodedOption {
        EncodedOption { code, data }
    }
}

/// A structure representing an outbound DHCPv4 message.
///
/// The message consists of the BOOTP fixed header and an ordered list of
/// the options. The `message-type` option is always emitted first, then
/// the remaining options in the insertion order, mirroring the order in
/// which a test scenario includes them.
#[derive(Clone, Debug)]
pub struct Message {
    /// The fixed header shared with BOOTP.
    pub header: Header,
    options: Vec<EncodedOption>,
}

impl Message {
    /// Creates a message of the specified type.
    pub fn new(message_type: MessageType) -> Message {
        let mut message = Message::new_bootp();
        // Encoding a message type never fails.
        message.options.push(
            EncodedOption::new(
                OPTION_CODE_DHCP_MESSAGE_TYPE,
                &OptionValue::MessageType(message_type),
            )
            .unwrap(),
        );
        message
    }

    /// Creates a legacy BOOTP request without the message type option.
    pub fn new_bootp() -> Message {
        Message {
            header: Header::default(),
            options: Vec::new(),
        }
    }

    /// Appends an option to the message.
    pub fn add_option(&mut self, option: EncodedOption) {
        self.options.push(option);
    }

    /// Returns the encoded message.
    ///
    /// The options are preceded by the magic cookie and followed by the
    /// `end` option.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = TransmitBuffer::new();
        self.header.encode(&mut buffer);
        buffer.write_bytes(&MAGIC_COOKIE);
        for option in &self.options {
            buffer.write_u8(option.code);
            buffer.write_u8(option.data.len() as u8);
            buffer.write_bytes(&option.data);
        }
        buffer.write_u8(OPTION_CODE_END);
        buffer.into_vec()
    }
}

/// A structure representing an inbound DHCPv4 option.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedOption {
    /// Option code.
    pub code: u8,
    /// Unparsed option payload.
    pub data: Vec<u8>,
}

/// A structure representing a received DHCPv4 message.
///
/// The message is parsed upfront: the fixed header and the option list
/// are recovered from the wire data by [`ReceivedMessage::parse`] and
/// the later lookups only inspect the recovered structures. A message
/// without the magic cookie is a legacy BOOTP reply and has an empty
/// option list.
#[derive(Clone, Debug)]
pub struct ReceivedMessage {
    header: Header,
    options: Vec<ReceivedOption>,
}

impl ReceivedMessage {
    /// Attempts to parse a received message.
    ///
    /// # Parameters
    ///
    /// - `data` is the received datagram payload
    ///
    /// # Errors
    ///
    /// It returns the [`MessageError::TooShort`] error when the data does
    /// not hold the fixed header and the [`MessageError::TruncatedOption`]
    /// error when an option length points past the end of the data.
    pub fn parse(data: &[u8]) -> Result<ReceivedMessage, MessageError> {
        let buffer = ReceiveBuffer::new(data);
        if buffer.len() < MAGIC_COOKIE_POS as usize {
            return Err(MessageError::TooShort {
                length: buffer.len(),
            });
        }
        let header = Header::decode(&buffer)?;
        let mut options = Vec::new();
        if data.len() >= OPTIONS_POS as usize {
            if data[MAGIC_COOKIE_POS as usize..OPTIONS_POS as usize] != MAGIC_COOKIE {
                return Err(MessageError::MissingMagicCookie);
            }
            let mut pos = OPTIONS_POS as usize;
            while pos < data.len() {
                let code = data[pos];
                if code == OPTION_CODE_END {
                    break;
                }
                if code == OPTION_CODE_PAD {
                    pos += 1;
                    continue;
                }
                if pos + 2 > data.len() {
                    return Err(MessageError::TruncatedOption {
                        code: code.into(),
                        position: pos,
                    });
                }
                let len = data[pos + 1] as usize;
                if pos + 2 + len > data.len() {
                    return Err(MessageError::TruncatedOption {
                        code: code.into(),
                        position: pos,
                    });
                }
                options.push(ReceivedOption {
                    code,
                    data: data[pos + 2..pos + 2 + len].to_vec(),
                });
                pos += 2 + len;
            }
        }
        Ok(ReceivedMessage { header, options })
    }

    /// Returns the fixed header of the message.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the message type carried in option 53.
    ///
    /// A legacy BOOTP reply has no message type option and yields `None`.
    pub fn message_type(&self) -> Option<MessageType> {
        self.option(OPTION_CODE_DHCP_MESSAGE_TYPE.into())
            .and_then(|option| option.data.first().copied())
            .and_then(MessageType::from_code)
    }

    /// Returns the message type name used in the exchange assertions.
    ///
    /// A reply with the boot reply opcode and no message type option is
    /// reported as `BOOTP_REPLY`. An unregistered type code is reported
    /// as `UNKNOWN-TYPE`.
    pub fn type_name(&self) -> String {
        match self.message_type() {
            Some(message_type) => message_type.name().to_string(),
            None => match self.option(OPTION_CODE_DHCP_MESSAGE_TYPE.into()) {
                Some(_) => "UNKNOWN-TYPE".to_string(),
                None if self.header.opcode == OpCode::BootReply => "BOOTP_REPLY".to_string(),
                None => "UNKNOWN-TYPE".to_string(),
            },
        }
    }

    /// Finds an option by its code.
    ///
    /// # Result
    ///
    /// It returns the last instance of the option or `None` when the
    /// message does not carry it. The absence is a normal outcome the
    /// caller asserts on, not an error.
    pub fn option(&self, code: u16) -> Option<&ReceivedOption> {
        self.options
            .iter()
            .rev()
            .find(|option| u16::from(option.code) == code)
    }

    /// Finds all instances of an option.
    pub fn options(&self, code: u16) -> Vec<&ReceivedOption> {
        self.options
            .iter()
            .filter(|option| u16::from(option.code) == code)
            .collect()
    }
}

impl ReceivedOption {
    /// Returns the textual representations of the option payload.
    ///
    /// The payload is interpreted according to the registered option
    /// format: an address list yields the dotted-quad forms, a number
    /// yields its decimal form, an unregistered option yields the
    /// uppercase hexadecimal form. The textual form is what the
    /// response assertions compare against.
    pub fn text_values(&self) -> Vec<String> {
        match self.code {
            OPTION_CODE_SUBNET_MASK
            | OPTION_CODE_ROUTERS
            | OPTION_CODE_DNS_SERVERS
            | OPTION_CODE_BROADCAST_ADDRESS
            | OPTION_CODE_REQUESTED_ADDRESS
            | OPTION_CODE_SERVER_ID
            | 4 => self
                .data
                .chunks_exact(4)
                .map(|chunk| Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]).to_string())
                .collect(),
            OPTION_CODE_DHCP_MESSAGE_TYPE => self
                .data
                .first()
                .map(|code| vec![code.to_string()])
                .unwrap_or_default(),
            OPTION_CODE_LEASE_TIME | OPTION_CODE_RENEWAL_TIME | OPTION_CODE_REBINDING_TIME | 2 => {
                let buffer = ReceiveBuffer::new(&self.data);
                buffer
                    .read_u32(0)
                    .map(|value| vec![value.to_string()])
                    .unwrap_or_default()
            }
            26 => {
                let buffer = ReceiveBuffer::new(&self.data);
                buffer
                    .read_u16(0)
                    .map(|value| vec![value.to_string()])
                    .unwrap_or_default()
            }
            OPTION_CODE_HOSTNAME | 15 | 60 => {
                vec![String::from_utf8_lossy(&self.data).to_string()]
            }
            OPTION_CODE_PARAM_REQUEST_LIST => {
                self.data.iter().map(|code| code.to_string()).collect()
            }
            _ => vec![hex::encode_upper(&self.data)],
        }
    }

    /// Returns a named field of the option payload.
    ///
    /// The field names follow the test scenario convention: the FQDN
    /// option exposes `fqdn` and `flags`, the client identifier exposes
    /// `value` with the colon-delimited form. Other options expose
    /// `value` resolving to [`ReceivedOption::text_values`].
    pub fn field(&self, field: &str) -> Option<Vec<String>> {
        match (self.code, field) {
            (OPTION_CODE_FQDN, "fqdn") => Fqdn::decode(&self.data, FqdnPayload::V4)
                .ok()
                .map(|fqdn| vec![fqdn.domain_name]),
            (OPTION_CODE_FQDN, "flags") => Fqdn::decode(&self.data, FqdnPayload::V4)
                .ok()
                .map(|fqdn| vec![fqdn.flags.bits().to_string()]),
            (OPTION_CODE_CLIENT_ID, "value") => Some(vec![self
                .data
                .iter()
                .map(|byte| format!("{:02x}", byte))
                .collect::<Vec<_>>()
                .join(":")]),
            (_, "value") => Some(self.text_values()),
            _ => None,
        }
    }
}
