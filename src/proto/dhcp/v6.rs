//! `dhcp::v6` is a module providing the DHCPv6 message building and
//! parsing capabilities.
//!
//! The DHCPv6 protocol has been described in <https://www.rfc-editor.org/rfc/rfc8415.html>.
//! Unlike DHCPv4, the protocol has no fixed header beyond the message
//! type and the transaction id; everything else is carried in the
//! options. Several options are containers nesting other options: an
//! IA_NA wraps the leased addresses, an IA_PD wraps the delegated
//! prefixes and both wrap the status codes qualifying the lease. The
//! nesting positions are declared once in [`container_payload_offset`]
//! and shared by the encoder and the parser, so the two paths can't
//! drift apart.

use std::net::Ipv6Addr;

use crate::proto::buffer::{ReceiveBuffer, TransmitBuffer};
use crate::proto::dhcp::{describe_option, resolve_code, MessageError, OptionError};
use crate::proto::duid::Duid;
use crate::proto::fqdn::{wire_encode_name, Fqdn, FqdnPayload};

/// `client-id` option code.
pub const OPTION_CODE_CLIENT_ID: u16 = 1;
/// `server-id` option code.
pub const OPTION_CODE_SERVER_ID: u16 = 2;
/// `IA_NA` option code.
pub const OPTION_CODE_IA_NA: u16 = 3;
/// `IA_TA` option code.
pub const OPTION_CODE_IA_TA: u16 = 4;
/// `IA_address` option code.
pub const OPTION_CODE_IA_ADDRESS: u16 = 5;
/// `oro` (option request) option code.
pub const OPTION_CODE_ORO: u16 = 6;
/// `preference` option code.
pub const OPTION_CODE_PREFERENCE: u16 = 7;
/// `elapsed-time` option code.
pub const OPTION_CODE_ELAPSED_TIME: u16 = 8;
/// `relay-msg` option code.
pub const OPTION_CODE_RELAY_MSG: u16 = 9;
/// `unicast` option code.
pub const OPTION_CODE_UNICAST: u16 = 12;
/// `status-code` option code.
pub const OPTION_CODE_STATUS_CODE: u16 = 13;
/// `rapid-commit` option code.
pub const OPTION_CODE_RAPID_COMMIT: u16 = 14;
/// `user-class` option code.
pub const OPTION_CODE_USER_CLASS: u16 = 15;
/// `vendor-class` option code.
pub const OPTION_CODE_VENDOR_CLASS: u16 = 16;
/// `vendor-specific-info` option code.
pub const OPTION_CODE_VENDOR_SPECIFIC_INFO: u16 = 17;
/// `interface-id` option code.
pub const OPTION_CODE_INTERFACE_ID: u16 = 18;
/// `dns-servers` option code.
pub const OPTION_CODE_DNS_SERVERS: u16 = 23;
/// `IA_PD` option code.
pub const OPTION_CODE_IA_PD: u16 = 25;
/// `IA-Prefix` option code.
pub const OPTION_CODE_IA_PREFIX: u16 = 26;
/// `remote-id` option code.
pub const OPTION_CODE_REMOTE_ID: u16 = 37;
/// `subscriber-id` option code.
pub const OPTION_CODE_SUBSCRIBER_ID: u16 = 38;
/// `fqdn` option code.
pub const OPTION_CODE_FQDN: u16 = 39;
/// `lq-query` option code.
pub const OPTION_CODE_LQ_QUERY: u16 = 44;
/// `lq-client-data` option code.
pub const OPTION_CODE_LQ_CLIENT_DATA: u16 = 45;
/// `client-link-layer-addr` option code.
pub const OPTION_CODE_CLIENT_LINK_LAYER_ADDR: u16 = 79;

/// The `Success` status code. It is implied when a container carries no
/// status code option at all.
pub const STATUS_CODE_SUCCESS: u16 = 0;

/// DHCPv6 option codes indexed by name, for options and sub-options.
pub(crate) const REGISTRY: &[(&str, u16)] = &[
    ("client-id", 1),
    ("server-id", 2),
    ("IA_NA", 3),
    ("IA_TA", 4),
    ("IA_address", 5),
    ("option-request", 6),
    ("preference", 7),
    ("elapsed-time", 8),
    ("relay-msg", 9),
    ("unicast", 12),
    ("status-code", 13),
    ("rapid-commit", 14),
    ("user-class", 15),
    ("vendor-class", 16),
    ("vendor-specific-info", 17),
    ("interface-id", 18),
    ("sip-server-dns", 21),
    ("sip-server-addr", 22),
    ("dns-servers", 23),
    ("domain-search", 24),
    ("IA_PD", 25),
    ("IA-Prefix", 26),
    ("nis-servers", 27),
    ("nisp-servers", 28),
    ("nis-domain-name", 29),
    ("nisp-domain-name", 30),
    ("sntp-servers", 31),
    ("information-refresh-time", 32),
    ("remote-id", 37),
    ("subscriber-id", 38),
    ("fqdn", 39),
    ("lq-query", 44),
    ("lq-client-data", 45),
    ("client-arch-type", 61),
    ("erp-local-domain-name", 65),
    ("client-link-layer-addr", 79),
];

/// Resolves a DHCPv6 option name or a numeric code to the integer code.
///
/// See [`crate::proto::dhcp::resolve_code`] for the resolution rules.
pub fn option_code(name_or_code: &str) -> Result<u16, OptionError> {
    resolve_code(name_or_code, REGISTRY)
}

/// Returns a textual description of a DHCPv6 option, e.g. `IA_NA[3]`.
pub fn option_descr(code: u16) -> String {
    describe_option(code, REGISTRY)
}

/// Returns the position of the nested option list within a container
/// option payload, or `None` for a non-container option.
///
/// This table is the single declaration of which options hold children
/// and where. The encoder writes the container fixed fields up to the
/// returned offset and the children after it; the parser descends into
/// the payload at the same offset. The `relay-msg` option is absent here
/// on purpose: it wraps a complete message rather than an option list
/// and is handled separately.
pub fn container_payload_offset(code: u16) -> Option<usize> {
    match code {
        // IAID, T1 and T2 precede the nested options.
        OPTION_CODE_IA_NA | OPTION_CODE_IA_PD => Some(12),
        // IAID only.
        OPTION_CODE_IA_TA => Some(4),
        // Address and the two lifetimes.
        OPTION_CODE_IA_ADDRESS => Some(24),
        // The two lifetimes, the prefix length and the prefix.
        OPTION_CODE_IA_PREFIX => Some(25),
        // Enterprise number.
        OPTION_CODE_VENDOR_SPECIFIC_INFO => Some(4),
        // Query type and link address.
        OPTION_CODE_LQ_QUERY => Some(17),
        // Nested client options start immediately.
        OPTION_CODE_LQ_CLIENT_DATA => Some(0),
        _ => None,
    }
}

/// An enum representing the DHCPv6 message types.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MessageType {
    /// A client query looking for the available servers (1).
    Solicit,
    /// A server answer with the offered leases (2).
    Advertise,
    /// A client query requesting the advertised leases (3).
    Request,
    /// A client query verifying its leases after a link change (4).
    Confirm,
    /// A client query extending its leases at the leasing server (5).
    Renew,
    /// A client query extending its leases at any server (6).
    Rebind,
    /// A server answer concluding an exchange (7).
    Reply,
    /// A client notification releasing the leases (8).
    Release,
    /// A client notification that a lease is already in use (9).
    Decline,
    /// A server demand to restart the configuration exchange (10).
    Reconfigure,
    /// A client query for configuration without leases (11).
    InformationRequest,
    /// A relay agent wrapper carrying a client message (12).
    RelayForward,
    /// A server wrapper carrying an answer through the relays (13).
    RelayReply,
    /// A query about the existing leases (14).
    Leasequery,
    /// A leasequery answer (15).
    LeasequeryReply,
    /// A marker concluding a bulk leasequery exchange (16).
    LeasequeryDone,
    /// A follow-up record of a bulk leasequery answer (17).
    LeasequeryData,
}

impl MessageType {
    /// Attempts to convert a message type name to an enum value.
    ///
    /// The names follow the test scenario convention: `SOLICIT`,
    /// `ADVERTISE`, `INFOREQUEST`, `LEASEQUERY-REPLY` etc.
    ///
    /// # Errors
    ///
    /// It returns the [`MessageError::InvalidMessageType`] error for an
    /// unrecognized name.
    pub fn from_name(name: &str) -> Result<MessageType, MessageError> {
        match name {
            "SOLICIT" => Ok(MessageType::Solicit),
            "ADVERTISE" => Ok(MessageType::Advertise),
            "REQUEST" => Ok(MessageType::Request),
            "CONFIRM" => Ok(MessageType::Confirm),
            "RENEW" => Ok(MessageType::Renew),
            "REBIND" => Ok(MessageType::Rebind),
            "REPLY" => Ok(MessageType::Reply),
            "RELEASE" => Ok(MessageType::Release),
            "DECLINE" => Ok(MessageType::Decline),
            "RECONFIGURE" => Ok(MessageType::Reconfigure),
            "INFOREQUEST" => Ok(MessageType::InformationRequest),
            "RELAYFORWARD" => Ok(MessageType::RelayForward),
            "RELAYREPLY" => Ok(MessageType::RelayReply),
            "LEASEQUERY" => Ok(MessageType::Leasequery),
            "LEASEQUERY-REPLY" => Ok(MessageType::LeasequeryReply),
            "LEASEQUERY-DONE" => Ok(MessageType::LeasequeryDone),
            "LEASEQUERY-DATA" => Ok(MessageType::LeasequeryData),
            name => Err(MessageError::InvalidMessageType {
                name: name.to_string(),
            }),
        }
    }

    /// Returns the message type name.
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Solicit => "SOLICIT",
            MessageType::Advertise => "ADVERTISE",
            MessageType::Request => "REQUEST",
            MessageType::Confirm => "CONFIRM",
            MessageType::Renew => "RENEW",
            MessageType::Rebind => "REBIND",
            MessageType::Reply => "REPLY",
            MessageType::Release => "RELEASE",
            MessageType::Decline => "DECLINE",
            MessageType::Reconfigure => "RECONFIGURE",
            MessageType::InformationRequest => "INFOREQUEST",
            MessageType::RelayForward => "RELAYFORWARD",
            MessageType::RelayReply => "RELAYREPLY",
            MessageType::Leasequery => "LEASEQUERY",
            MessageType::LeasequeryReply => "LEASEQUERY-REPLY",
            MessageType::LeasequeryDone => "LEASEQUERY-DONE",
            MessageType::LeasequeryData => "LEASEQUERY-DATA",
        }
    }

    /// Converts a raw message type code to an enum value.
    pub fn from_code(code: u8) -> Option<MessageType> {
        match code {
            1 => Some(MessageType::Solicit),
            2 => Some(MessageType::Advertise),
            3 => Some(MessageType::Request),
            4 => Some(MessageType::Confirm),
            5 => Some(MessageType::Renew),
            6 => Some(MessageType::Rebind),
            7 => Some(MessageType::Reply),
            8 => Some(MessageType::Release),
            9 => Some(MessageType::Decline),
            10 => Some(MessageType::Reconfigure),
            11 => Some(MessageType::InformationRequest),
            12 => Some(MessageType::RelayForward),
            13 => Some(MessageType::RelayReply),
            14 => Some(MessageType::Leasequery),
            15 => Some(MessageType::LeasequeryReply),
            16 => Some(MessageType::LeasequeryDone),
            17 => Some(MessageType::LeasequeryData),
            _ => None,
        }
    }

    /// Checks if the message is a relay agent wrapper.
    ///
    /// The relay wrappers replace the transaction id with the hop count
    /// and the two relay addresses, so they are framed differently.
    pub fn is_relay(&self) -> bool {
        matches!(self, MessageType::RelayForward | MessageType::RelayReply)
    }
}

/// An enum representing a semantic DHCPv6 option value.
///
/// Every category of the option payloads has its own variant, so the
/// encoder is a single exhaustive `match` instead of a chain of the
/// name comparisons. The container variants accept the already encoded
/// children and concatenate them after their own fixed fields.
#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    /// A DUID carried in the `client-id` and `server-id` options.
    Duid(Duid),
    /// An identity association for the non-temporary addresses.
    IaNa {
        /// Identity association id.
        iaid: u32,
        /// Renew time.
        t1: u32,
        /// Rebind time.
        t2: u32,
        /// Nested options, typically the IA addresses.
        options: Vec<EncodedOption>,
    },
    /// An identity association for the delegated prefixes.
    IaPd {
        /// Identity association id.
        iaid: u32,
        /// Renew time.
        t1: u32,
        /// Rebind time.
        t2: u32,
        /// Nested options, typically the IA prefixes.
        options: Vec<EncodedOption>,
    },
    /// A leased address nested in an identity association.
    IaAddress {
        /// The leased address.
        address: Ipv6Addr,
        /// Preferred lifetime in seconds.
        preferred_lifetime: u32,
        /// Valid lifetime in seconds.
        valid_lifetime: u32,
        /// Nested options, typically a status code.
        options: Vec<EncodedOption>,
    },
    /// A delegated prefix nested in an identity association.
    IaPrefix {
        /// Preferred lifetime in seconds.
        preferred_lifetime: u32,
        /// Valid lifetime in seconds.
        valid_lifetime: u32,
        /// The delegated prefix length.
        prefix_length: u8,
        /// The delegated prefix.
        prefix: Ipv6Addr,
        /// Nested options, typically a status code.
        options: Vec<EncodedOption>,
    },
    /// A list of the requested option codes.
    OptionRequest(Vec<u16>),
    /// A server preference value.
    Preference(u8),
    /// Time since the client began the exchange, in hundredths of a second.
    ElapsedTime(u16),
    /// A server address the client may unicast to.
    Unicast(Ipv6Addr),
    /// A status qualifying the enclosing message or container.
    StatusCode {
        /// The numeric status.
        code: u16,
        /// A human readable explanation.
        message: String,
    },
    /// A request to conclude the exchange in two messages.
    RapidCommit,
    /// A user class list; every instance is length-prefixed on the wire.
    UserClass(Vec<Vec<u8>>),
    /// A vendor class with the enterprise number.
    VendorClass {
        /// The vendor enterprise number.
        enterprise_number: u32,
        /// The class data instances, each length-prefixed on the wire.
        data: Vec<Vec<u8>>,
    },
    /// Vendor specific options behind the enterprise number.
    VendorSpecific {
        /// The vendor enterprise number.
        enterprise_number: u32,
        /// The nested vendor options.
        options: Vec<EncodedOption>,
    },
    /// A relay interface identifier.
    InterfaceId(Vec<u8>),
    /// A list of IPv6 addresses (DNS servers, SNTP servers and alike).
    Addresses(Vec<Ipv6Addr>),
    /// A list of domain names in the DNS wire format.
    DomainList(Vec<String>),
    /// A client FQDN payload.
    Fqdn(Fqdn),
    /// A relay remote identifier behind the enterprise number.
    RemoteId {
        /// The vendor enterprise number.
        enterprise_number: u32,
        /// The opaque identifier.
        id: Vec<u8>,
    },
    /// A relay subscriber identifier.
    SubscriberId(Vec<u8>),
    /// A client link layer address relay option.
    ClientLinkLayerAddr {
        /// Hardware type, typically 1 for Ethernet.
        hardware_type: u16,
        /// The link layer address.
        address: Vec<u8>,
    },
    /// A leasequery.
    LqQuery {
        /// Query type: 1 by address, 2 by client id.
        query_type: u8,
        /// The link address scoping the query.
        link_address: Ipv6Addr,
        /// The query options.
        options: Vec<EncodedOption>,
    },
    /// An encoded message wrapped in the `relay-msg` option.
    RelayMessage(Vec<u8>),
    /// An opaque payload for the options with no dedicated variant.
    Raw(Vec<u8>),
}

/// A structure representing an encoded DHCPv6 option.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedOption {
    /// Option code.
    pub code: u16,
    /// Encoded option payload, without the code and length words.
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
    /// It returns an error when a carried FQDN or domain name can't be
    /// encoded.
    pub fn new(code: u16, value: &OptionValue) -> Result<EncodedOption, OptionError> {
        let mut buffer = TransmitBuffer::new();
        match value {
            OptionValue::Duid(duid) => buffer.write_bytes(&duid.encode()),
            OptionValue::IaNa {
                iaid,
                t1,
                t2,
                options,
            }
            | OptionValue::IaPd {
                iaid,
                t1,
                t2,
                options,
            } => {
                buffer.write_u32(*iaid);
                buffer.write_u32(*t1);
                buffer.write_u32(*t2);
                write_options(&mut buffer, options);
            }
            OptionValue::IaAddress {
                address,
                preferred_lifetime,
                valid_lifetime,
                options,
            } => {
                buffer.write_ipv6(address);
                buffer.write_u32(*preferred_lifetime);
                buffer.write_u32(*valid_lifetime);
                write_options(&mut buffer, options);
            }
            OptionValue::IaPrefix {
                preferred_lifetime,
                valid_lifetime,
                prefix_length,
                prefix,
                options,
            } => {
                buffer.write_u32(*preferred_lifetime);
                buffer.write_u32(*valid_lifetime);
                buffer.write_u8(*prefix_length);
                buffer.write_ipv6(prefix);
                write_options(&mut buffer, options);
            }
            OptionValue::OptionRequest(codes) => {
                for code in codes {
                    buffer.write_u16(*code);
                }
            }
            OptionValue::Preference(value) => buffer.write_u8(*value),
            OptionValue::ElapsedTime(value) => buffer.write_u16(*value),
            OptionValue::Unicast(address) => buffer.write_ipv6(address),
            OptionValue::StatusCode { code, message } => {
                buffer.write_u16(*code);
                buffer.write_bytes(message.as_bytes());
            }
            OptionValue::RapidCommit => {}
            OptionValue::UserClass(instances) => {
                for instance in instances {
                    buffer.write_u16(instance.len() as u16);
                    buffer.write_bytes(instance);
                }
            }
            OptionValue::VendorClass {
                enterprise_number,
                data,
            } => {
                buffer.write_u32(*enterprise_number);
                for instance in data {
                    buffer.write_u16(instance.len() as u16);
                    buffer.write_bytes(instance);
                }
            }
            OptionValue::VendorSpecific {
                enterprise_number,
                options,
            } => {
                buffer.write_u32(*enterprise_number);
                write_options(&mut buffer, options);
            }
            OptionValue::InterfaceId(id) => buffer.write_bytes(id),
            OptionValue::Addresses(addresses) => {
                for address in addresses {
                    buffer.write_ipv6(address);
                }
            }
            OptionValue::DomainList(domains) => {
                for domain in domains {
                    // The search list carries fully qualified names, so
                    // the root terminator is always present.
                    let mut name = domain.clone();
                    if !name.ends_with('.') {
                        name.push('.');
                    }
                    buffer.write_bytes(&wire_encode_name(&name)?);
                }
            }
            OptionValue::Fqdn(fqdn) => buffer.write_bytes(&fqdn.encode(FqdnPayload::V6)?),
            OptionValue::RemoteId {
                enterprise_number,
                id,
            } => {
                buffer.write_u32(*enterprise_number);
                buffer.write_bytes(id);
            }
            OptionValue::SubscriberId(id) => buffer.write_bytes(id),
            OptionValue::ClientLinkLayerAddr {
                hardware_type,
                address,
            } => {
                buffer.write_u16(*hardware_type);
                buffer.write_bytes(address);
            }
            OptionValue::LqQuery {
                query_type,
                link_address,
                options,
            } => {
                buffer.write_u8(*query_type);
                buffer.write_ipv6(link_address);
                write_options(&mut buffer, options);
            }
            OptionValue::RelayMessage(message) => buffer.write_bytes(message),
            OptionValue::Raw(data) => buffer.write_bytes(data),
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
    pub fn from_raw(code: u16, data: Vec<u8>) -> EncodedOption {
        EncodedOption { code, data }
    }
}

/// Appends the encoded options to the buffer in the wire format.
fn write_options(buffer: &mut TransmitBuffer, options: &[EncodedOption]) {
    for option in options {
        buffer.write_u16(option.code);
        buffer.write_u16(option.data.len() as u16);
        buffer.write_bytes(&option.data);
    }
}

/// A structure representing an outbound DHCPv6 message.
#[derive(Clone, Debug)]
pub struct Message {
    message_type: MessageType,
    transaction_id: u32,
    options: Vec<EncodedOption>,
}

impl Message {
    /// Creates a message of the specified type.
    ///
    /// # Parameters
    ///
    /// - `message_type` is the type of the created message
    /// - `transaction_id` is the transaction id; only the lower 24 bits
    ///   are carried on the wire
    pub fn new(message_type: MessageType, transaction_id: u32) -> Message {
        Message {
            message_type,
            transaction_id: transaction_id & 0xffffff,
            options: Vec::new(),
        }
    }

    /// Returns the message type.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Returns the transaction id.
    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    /// Appends an option to the message.
    pub fn add_option(&mut self, option: EncodedOption) {
        self.options.push(option);
    }

    /// Returns the encoded message.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = TransmitBuffer::new();
        let type_and_xid = (u32::from(u8::from(self.message_type)) << 24) | self.transaction_id;
        buffer.write_u32(type_and_xid);
        write_options(&mut buffer, &self.options);
        buffer.into_vec()
    }

    /// Encapsulates an encoded message in the relay-forward wrappers.
    ///
    /// # Parameters
    ///
    /// - `inner` is the encoded client message
    /// - `levels` is the number of the nested relay wrappers, at least 1
    /// - `link_address` and `peer_address` fill the relay agent fields
    /// - `relay_options` are appended at every level before the
    ///   `relay-msg` option, e.g. an `interface-id`
    ///
    /// The innermost wrapper carries the client message; every next
    /// level wraps the previous wrapper, incrementing the hop count.
    pub fn encapsulate_relay_forward(
        inner: &[u8],
        levels: usize,
        link_address: &Ipv6Addr,
        peer_address: &Ipv6Addr,
        relay_options: &[EncodedOption],
    ) -> Vec<u8> {
        let mut message = inner.to_vec();
        for hop_count in 0..levels {
            let mut buffer = TransmitBuffer::new();
            buffer.write_u8(u8::from(MessageType::RelayForward));
            buffer.write_u8(hop_count as u8);
            buffer.write_ipv6(link_address);
            buffer.write_ipv6(peer_address);
            write_options(&mut buffer, relay_options);
            buffer.write_u16(OPTION_CODE_RELAY_MSG);
            buffer.write_u16(message.len() as u16);
            buffer.write_bytes(&message);
            message = buffer.into_vec();
        }
        message
    }
}

impl From<MessageType> for u8 {
    fn from(message_type: MessageType) -> u8 {
        match message_type {
            MessageType::Solicit => 1,
            MessageType::Advertise => 2,
            MessageType::Request => 3,
            MessageType::Confirm => 4,
            MessageType::Renew => 5,
            MessageType::Rebind => 6,
            MessageType::Reply => 7,
            MessageType::Release => 8,
            MessageType::Decline => 9,
            MessageType::Reconfigure => 10,
            MessageType::InformationRequest => 11,
            MessageType::RelayForward => 12,
            MessageType::RelayReply => 13,
            MessageType::Leasequery => 14,
            MessageType::LeasequeryReply => 15,
            MessageType::LeasequeryDone => 16,
            MessageType::LeasequeryData => 17,
        }
    }
}

/// A structure representing an inbound DHCPv6 option.
///
/// Every option extracted from a container carries the code of its
/// immediate parent, so a suboption lookup can be scoped to the right
/// container instance: a status code nested in an IA_NA is never
/// returned when the IA_PD suboptions are inspected.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedOption {
    /// Option code.
    pub code: u16,
    /// Unparsed option payload.
    pub data: Vec<u8>,
    /// The code of the immediate parent for a nested option, `None` for
    /// a top level option.
    pub parent: Option<u16>,
}

/// A structure representing a received DHCPv6 message.
///
/// The parser walks the flat top level option chain and, for the
/// container options declared in [`container_payload_offset`],
/// recursively extracts the nested options tagging each with its
/// immediate parent code.
#[derive(Clone, Debug)]
pub struct ReceivedMessage {
    message_type_code: u8,
    transaction_id: u32,
    options: Vec<ReceivedOption>,
    suboptions: Vec<ReceivedOption>,
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
    /// not hold the fixed fields and the [`MessageError::TruncatedOption`]
    /// error when an option length points past the end of the message.
    pub fn parse(data: &[u8]) -> Result<ReceivedMessage, MessageError> {
        if data.is_empty() {
            return Err(MessageError::TooShort { length: 0 });
        }
        let message_type_code = data[0];
        let is_relay = MessageType::from_code(message_type_code)
            .map(|message_type| message_type.is_relay())
            .unwrap_or(false);
        let (transaction_id, options_pos) = if is_relay {
            // hop-count (1), link-address (16), peer-address (16).
            (0, 34)
        } else {
            if data.len() < 4 {
                return Err(MessageError::TooShort { length: data.len() });
            }
            let buffer = ReceiveBuffer::new(data);
            (buffer.read_u32(0)? & 0xffffff, 4)
        };
        if data.len() < options_pos {
            return Err(MessageError::TooShort { length: data.len() });
        }
        let mut options = Vec::new();
        let mut suboptions = Vec::new();
        parse_options(
            &data[options_pos..],
            options_pos,
            None,
            &mut options,
            &mut suboptions,
        )?;
        Ok(ReceivedMessage {
            message_type_code,
            transaction_id,
            options,
            suboptions,
        })
    }

    /// Returns the message type.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_code(self.message_type_code)
    }

    /// Returns the message type name used in the exchange assertions.
    ///
    /// An unregistered type code is reported as `UNKNOWN-TYPE`.
    pub fn type_name(&self) -> String {
        self.message_type()
            .map(|message_type| message_type.name().to_string())
            .unwrap_or_else(|| "UNKNOWN-TYPE".to_string())
    }

    /// Returns the transaction id, or 0 for a relay wrapper.
    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    /// Finds a top level option by its code.
    ///
    /// # Result
    ///
    /// It returns the last instance of the option or `None` when the
    /// message does not carry it. The absence is a normal outcome the
    /// caller asserts on, not an error.
    pub fn option(&self, code: u16) -> Option<&ReceivedOption> {
        self.options.iter().rev().find(|option| option.code == code)
    }

    /// Finds all top level instances of an option.
    pub fn options(&self, code: u16) -> Vec<&ReceivedOption> {
        self.options
            .iter()
            .filter(|option| option.code == code)
            .collect()
    }

    /// Finds the suboptions with the specified code nested directly in
    /// the parent options with the specified code.
    ///
    /// # Parameters
    ///
    /// - `parent_code` is the code of the enclosing container option
    /// - `code` is the code of the looked up suboption
    ///
    /// # Result
    ///
    /// It returns only the suboptions whose immediate parent has the
    /// `parent_code`; an empty vector means the parent carries no such
    /// suboption.
    pub fn suboptions(&self, parent_code: u16, code: u16) -> Vec<&ReceivedOption> {
        self.suboptions
            .iter()
            .filter(|option| option.code == code && option.parent == Some(parent_code))
            .collect()
    }

    /// Returns the message wrapped in the `relay-msg` option.
    ///
    /// It is used to unwrap the server answer from a relay-reply before
    /// the usual option checks are applied to it.
    pub fn relayed_message(&self) -> Result<Option<ReceivedMessage>, MessageError> {
        match self.option(OPTION_CODE_RELAY_MSG) {
            Some(option) => ReceivedMessage::parse(&option.data).map(Some),
            None => Ok(None),
        }
    }
}

/// Parses a wire format option list, descending into the containers.
///
/// The extracted options land in `options` for the top level calls and
/// in `suboptions`, tagged with the immediate parent code, for the
/// nested calls.
fn parse_options(
    data: &[u8],
    base_pos: usize,
    parent: Option<u16>,
    options: &mut Vec<ReceivedOption>,
    suboptions: &mut Vec<ReceivedOption>,
) -> Result<(), MessageError> {
    let mut pos = 0;
    while pos < data.len() {
        if pos + 4 > data.len() {
            return Err(MessageError::TruncatedOption {
                code: 0,
                position: base_pos + pos,
            });
        }
        let buffer = ReceiveBuffer::new(data);
        let code = buffer.read_u16(pos as u32)?;
        let len = buffer.read_u16(pos as u32 + 2)? as usize;
        if pos + 4 + len > data.len() {
            return Err(MessageError::TruncatedOption {
                code,
                position: base_pos + pos,
            });
        }
        let payload = &data[pos + 4..pos + 4 + len];
        let option = ReceivedOption {
            code,
            data: payload.to_vec(),
            parent,
        };
        if parent.is_none() {
            options.push(option);
        } else {
            suboptions.push(option);
        }
        if let Some(offset) = container_payload_offset(code) {
            if payload.len() >= offset {
                parse_options(
                    &payload[offset..],
                    base_pos + pos + 4 + offset,
                    Some(code),
                    options,
                    suboptions,
                )?;
            }
        }
        pos += 4 + len;
    }
    Ok(())
}

impl ReceivedOption {
    /// Returns a named field of the option payload in the textual form.
    ///
    /// The field names follow the test scenario convention: `addr` for
    /// an IA address, `plen` and `prefix` for an IA prefix, `statuscode`
    /// and `statusmsg` for a status code, `duid` for the identifiers.
    /// The textual form is what the response assertions compare against.
    /// An unknown field yields `None`.
    pub fn field(&self, field: &str) -> Option<String> {
        let buffer = ReceiveBuffer::new(&self.data);
        match (self.code, field) {
            (OPTION_CODE_CLIENT_ID | OPTION_CODE_SERVER_ID, "duid") => {
                Duid::decode(&self.data).ok().map(|duid| duid.to_string())
            }
            (OPTION_CODE_IA_NA | OPTION_CODE_IA_PD, "iaid") => {
                buffer.read_u32(0).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_IA_NA | OPTION_CODE_IA_PD, "T1") => {
                buffer.read_u32(4).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_IA_NA | OPTION_CODE_IA_PD, "T2") => {
                buffer.read_u32(8).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_IA_ADDRESS, "addr") => {
                buffer.read_ipv6(0).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_IA_ADDRESS, "preflft") => {
                buffer.read_u32(16).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_IA_ADDRESS, "validlft") => {
                buffer.read_u32(20).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_IA_PREFIX, "preflft") => {
                buffer.read_u32(0).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_IA_PREFIX, "validlft") => {
                buffer.read_u32(4).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_IA_PREFIX, "plen") => {
                buffer.read_u8(8).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_IA_PREFIX, "prefix") => {
                buffer.read_ipv6(9).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_STATUS_CODE, "statuscode") => {
                buffer.read_u16(0).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_STATUS_CODE, "statusmsg") => {
                Some(String::from_utf8_lossy(&self.data[2.min(self.data.len())..]).to_string())
            }
            (OPTION_CODE_PREFERENCE, "prefval") => {
                buffer.read_u8(0).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_ELAPSED_TIME, "elapsedtime") => {
                buffer.read_u16(0).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_UNICAST, "srvaddr") => {
                buffer.read_ipv6(0).ok().map(|value| value.to_string())
            }
            (OPTION_CODE_INTERFACE_ID, "ifaceid") => {
                Some(String::from_utf8_lossy(&self.data).to_string())
            }
            (OPTION_CODE_FQDN, "fqdn") => Fqdn::decode(&self.data, FqdnPayload::V6)
                .ok()
                .map(|fqdn| fqdn.domain_name),
            (OPTION_CODE_FQDN, "flags") => Fqdn::decode(&self.data, FqdnPayload::V6)
                .ok()
                .map(|fqdn| fqdn.flags.bits().to_string()),
            (OPTION_CODE_VENDOR_SPECIFIC_INFO, "enterprisenum") => {
                buffer.read_u32(0).ok().map(|value| value.to_string())
            }
            // Address list options share the layout; the field name
            // matches the scenario vocabulary per option.
            (OPTION_CODE_DNS_SERVERS, "addresses")
            | (22 | 27 | 28 | 31, "addresses") => Some(
                self.data
                    .chunks_exact(16)
                    .map(|chunk| {
                        let mut octets = [0u8; 16];
                        octets.copy_from_slice(chunk);
                        Ipv6Addr::from(octets).to_string()
                    })
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            (_, "data") => Some(hex::encode(&self.data)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv6Addr;
    use std::str::FromStr;

    use crate::proto::dhcp::v6::{
        container_payload_offset, option_code, option_descr, EncodedOption, Message, MessageType,
        OptionValue, ReceivedMessage, OPTION_CODE_CLIENT_ID, OPTION_CODE_IA_ADDRESS,
        OPTION_CODE_IA_NA, OPTION_CODE_IA_PD, OPTION_CODE_IA_PREFIX, OPTION_CODE_RELAY_MSG,
        OPTION_CODE_STATUS_CODE,
    };
    use crate::proto::dhcp::{MessageError, OptionError};
    use crate::proto::duid::Duid;
    use crate::proto::tests::common::TestPacket;

    #[test]
    fn resolve_option_name() {
        assert_eq!(option_code("IA_NA"), Ok(3));
        assert_eq!(option_code("status-code"), Ok(13));
        assert_eq!(option_code("25"), Ok(25));
        assert_eq!(
            option_code("no-such-option"),
            Err(OptionError::UnknownOption {
                name: "no-such-option".to_string(),
            })
        );
    }

    #[test]
    fn describe_options() {
        assert_eq!(option_descr(3), "IA_NA[3]");
        assert_eq!(option_descr(13), "status-code[13]");
    }

    #[test]
    fn message_type_names_round_trip() {
        for name in [
            "SOLICIT",
            "ADVERTISE",
            "REQUEST",
            "RENEW",
            "REPLY",
            "RELEASE",
            "RELAYREPLY",
            "LEASEQUERY-DONE",
        ] {
            let message_type = MessageType::from_name(name).unwrap();
            assert_eq!(message_type.name(), name);
            assert_eq!(
                MessageType::from_code(message_type.into()),
                Some(message_type)
            );
        }
    }

    #[test]
    fn message_type_invalid_name() {
        assert_eq!(
            MessageType::from_name("OFFER").unwrap_err(),
            MessageError::InvalidMessageType {
                name: "OFFER".to_string(),
            }
        );
    }

    #[test]
    fn container_offsets_match_the_rfc_layout() {
        assert_eq!(container_payload_offset(OPTION_CODE_IA_NA), Some(12));
        assert_eq!(container_payload_offset(OPTION_CODE_IA_PD), Some(12));
        assert_eq!(container_payload_offset(OPTION_CODE_IA_ADDRESS), Some(24));
        assert_eq!(container_payload_offset(OPTION_CODE_IA_PREFIX), Some(25));
        assert_eq!(container_payload_offset(OPTION_CODE_CLIENT_ID), None);
        assert_eq!(container_payload_offset(OPTION_CODE_RELAY_MSG), None);
    }

    #[test]
    fn encode_solicit_with_empty_ia_na() {
        let duid = Duid::from_str("00:03:00:01:ff:ff:ff:ff:ff:01").unwrap();
        let mut message = Message::new(MessageType::Solicit, 0x123456);
        message.add_option(
            EncodedOption::new(OPTION_CODE_CLIENT_ID, &OptionValue::Duid(duid)).unwrap(),
        );
        message.add_option(
            EncodedOption::new(
                OPTION_CODE_IA_NA,
                &OptionValue::IaNa {
                    iaid: 1,
                    t1: 0,
                    t2: 0,
                    options: Vec::new(),
                },
            )
            .unwrap(),
        );
        let data = message.encode();
        assert_eq!(
            data,
            vec![
                1, 0x12, 0x34, 0x56, // SOLICIT, transaction id
                0, 1, 0, 10, // client-id, length
                0, 3, 0, 1, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01, // DUID-LL
                0, 3, 0, 12, // IA_NA, length
                0, 0, 0, 1, // iaid
                0, 0, 0, 0, // T1
                0, 0, 0, 0, // T2
            ]
        );
    }

    #[test]
    fn transaction_id_masked_to_24_bits() {
        let message = Message::new(MessageType::Request, 0xaabbccdd);
        assert_eq!(message.transaction_id(), 0xbbccdd);
    }

    #[test]
    fn parse_advertise() {
        let test_packet = TestPacket::new_valid_advertise_packet();
        let message = ReceivedMessage::parse(test_packet.get()).unwrap();
        assert_eq!(message.message_type(), Some(MessageType::Advertise));
        assert_eq!(message.type_name(), "ADVERTISE");
        assert_eq!(message.transaction_id(), 0x123456);

        assert!(message.option(OPTION_CODE_CLIENT_ID).is_some());
        let ia_na = message.option(OPTION_CODE_IA_NA);
        assert!(ia_na.is_some());
        assert_eq!(ia_na.unwrap().field("iaid").unwrap(), "1");

        let addresses = message.suboptions(OPTION_CODE_IA_NA, OPTION_CODE_IA_ADDRESS);
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].field("addr").unwrap(), "2001:db8:1::5");
        assert_eq!(addresses[0].field("validlft").unwrap(), "7200");
        assert_eq!(addresses[0].field("preflft").unwrap(), "3600");
    }

    #[test]
    fn suboption_scoped_to_parent() {
        // A message with both an IA_NA and an IA_PD, each nesting its own
        // status code with a different value.
        let ia_na_status = EncodedOption::new(
            OPTION_CODE_STATUS_CODE,
            &OptionValue::StatusCode {
                code: 2,
                message: "no addresses".to_string(),
            },
        )
        .unwrap();
        let ia_pd_status = EncodedOption::new(
            OPTION_CODE_STATUS_CODE,
            &OptionValue::StatusCode {
                code: 6,
                message: "no prefixes".to_string(),
            },
        )
        .unwrap();
        let mut message = Message::new(MessageType::Reply, 7);
        message.add_option(
            EncodedOption::new(
                OPTION_CODE_IA_NA,
                &OptionValue::IaNa {
                    iaid: 1,
                    t1: 0,
                    t2: 0,
                    options: vec![ia_na_status],
                },
            )
            .unwrap(),
        );
        message.add_option(
            EncodedOption::new(
                OPTION_CODE_IA_PD,
                &OptionValue::IaPd {
                    iaid: 1,
                    t1: 0,
                    t2: 0,
                    options: vec![ia_pd_status],
                },
            )
            .unwrap(),
        );

        let parsed = ReceivedMessage::parse(&message.encode()).unwrap();
        let na_status = parsed.suboptions(OPTION_CODE_IA_NA, OPTION_CODE_STATUS_CODE);
        assert_eq!(na_status.len(), 1);
        assert_eq!(na_status[0].field("statuscode").unwrap(), "2");

        let pd_status = parsed.suboptions(OPTION_CODE_IA_PD, OPTION_CODE_STATUS_CODE);
        assert_eq!(pd_status.len(), 1);
        assert_eq!(pd_status[0].field("statuscode").unwrap(), "6");
        assert_eq!(pd_status[0].field("statusmsg").unwrap(), "no prefixes");
    }

    #[test]
    fn status_code_nested_in_ia_address() {
        let status = EncodedOption::new(
            OPTION_CODE_STATUS_CODE,
            &OptionValue::StatusCode {
                code: 0,
                message: String::new(),
            },
        )
        .unwrap();
        let ia_address = EncodedOption::new(
            OPTION_CODE_IA_ADDRESS,
            &OptionValue::IaAddress {
                address: "2001:db8:1::5".parse().unwrap(),
                preferred_lifetime: 3600,
                valid_lifetime: 7200,
                options: vec![status],
            },
        )
        .unwrap();
        let mut message = Message::new(MessageType::Reply, 7);
        message.add_option(
            EncodedOption::new(
                OPTION_CODE_IA_NA,
                &OptionValue::IaNa {
                    iaid: 1,
                    t1: 1000,
                    t2: 2000,
                    options: vec![ia_address],
                },
            )
            .unwrap(),
        );

        let parsed = ReceivedMessage::parse(&message.encode()).unwrap();
        // The status code's immediate parent is the IA address, not the
        // IA_NA wrapping it.
        assert_eq!(
            parsed
                .suboptions(OPTION_CODE_IA_ADDRESS, OPTION_CODE_STATUS_CODE)
                .len(),
            1
        );
        assert!(parsed
            .suboptions(OPTION_CODE_IA_NA, OPTION_CODE_STATUS_CODE)
            .is_empty());
    }

    #[test]
    fn encode_ia_prefix_round_trip() {
        let ia_prefix = EncodedOption::new(
            OPTION_CODE_IA_PREFIX,
            &OptionValue::IaPrefix {
                preferred_lifetime: 3600,
                valid_lifetime: 7200,
                prefix_length: 56,
                prefix: "2001:db8:8::".parse().unwrap(),
                options: Vec::new(),
            },
        )
        .unwrap();
        let mut message = Message::new(MessageType::Reply, 9);
        message.add_option(
            EncodedOption::new(
                OPTION_CODE_IA_PD,
                &OptionValue::IaPd {
                    iaid: 0x2137,
                    t1: 1000,
                    t2: 2000,
                    options: vec![ia_prefix],
                },
            )
            .unwrap(),
        );

        let parsed = ReceivedMessage::parse(&message.encode()).unwrap();
        let prefixes = parsed.suboptions(OPTION_CODE_IA_PD, OPTION_CODE_IA_PREFIX);
        assert_eq!(prefixes.len(), 1);
        assert_eq!(prefixes[0].field("prefix").unwrap(), "2001:db8:8::");
        assert_eq!(prefixes[0].field("plen").unwrap(), "56");
        assert_eq!(prefixes[0].field("preflft").unwrap(), "3600");
        assert_eq!(prefixes[0].field("validlft").unwrap(), "7200");
    }

    #[test]
    fn relay_forward_encapsulation() {
        let mut inner = Message::new(MessageType::Solicit, 0x99);
        inner.add_option(
            EncodedOption::new(
                OPTION_CODE_CLIENT_ID,
                &OptionValue::Duid(Duid::new_link_layer(vec![1, 2, 3, 4, 5, 6])),
            )
            .unwrap(),
        );
        let link_address: Ipv6Addr = "2001:db8:1::1000".parse().unwrap();
        let peer_address: Ipv6Addr = "fe80::1".parse().unwrap();
        let relayed = Message::encapsulate_relay_forward(
            &inner.encode(),
            2,
            &link_address,
            &peer_address,
            &[EncodedOption::from_raw(18, b"port1234".to_vec())],
        );

        // The outermost layer carries the highest hop count.
        assert_eq!(relayed[0], 12);
        assert_eq!(relayed[1], 1);
        let outer = ReceivedMessage::parse(&relayed).unwrap();
        assert_eq!(outer.message_type(), Some(MessageType::RelayForward));
        let middle = outer.relayed_message().unwrap().unwrap();
        assert_eq!(middle.message_type(), Some(MessageType::RelayForward));
        let innermost = middle.relayed_message().unwrap().unwrap();
        assert_eq!(innermost.message_type(), Some(MessageType::Solicit));
        assert_eq!(innermost.transaction_id(), 0x99);
        assert!(innermost.option(OPTION_CODE_CLIENT_ID).is_some());
    }

    #[test]
    fn parse_empty_message() {
        assert_eq!(
            ReceivedMessage::parse(&[]).unwrap_err(),
            MessageError::TooShort { length: 0 }
        );
    }

    #[test]
    fn parse_truncated_option() {
        // REPLY with a client-id option declaring 10 bytes and carrying 2.
        let data = vec![7, 0, 0, 1, 0, 1, 0, 10, 0, 3];
        assert_eq!(
            ReceivedMessage::parse(&data).unwrap_err(),
            MessageError::TruncatedOption {
                code: 1,
                position: 4,
            }
        );
    }

    #[test]
    fn duid_field_textual_form() {
        let mut message = Message::new(MessageType::Advertise, 5);
        message.add_option(
            EncodedOption::new(
                OPTION_CODE_CLIENT_ID,
                &OptionValue::Duid(Duid::from_str("00:03:00:01:ff:ff:ff:ff:ff:01").unwrap()),
            )
            .unwrap(),
        );
        let parsed = ReceivedMessage::parse(&message.encode()).unwrap();
        assert_eq!(
            parsed.option(OPTION_CODE_CLIENT_ID).unwrap().field("duid"),
            Some("00:03:00:01:ff:ff:ff:ff:ff:01".to_string())
        );
    }

    #[test]
    fn encode_list_options() {
        let addresses = EncodedOption::new(
            23,
            &OptionValue::Addresses(vec![
                "2001:db8::53".parse().unwrap(),
                "2001:db8::54".parse().unwrap(),
            ]),
        )
        .unwrap();
        assert_eq!(addresses.data.len(), 32);

        let domains = EncodedOption::new(
            24,
            &OptionValue::DomainList(vec!["example.com".to_string()]),
        )
        .unwrap();
        // The search list names carry the root terminator.
        assert_eq!(domains.data, b"\x07example\x03com\x00");

        let unicast = EncodedOption::new(
            12,
            &OptionValue::Unicast("2001:db8::1".parse().unwrap()),
        )
        .unwrap();
        assert_eq!(unicast.data.len(), 16);

        let raw = EncodedOption::new(200, &OptionValue::Raw(vec![1, 2, 3])).unwrap();
        assert_eq!(raw.data, vec![1, 2, 3]);
    }

    #[test]
    fn decode_address_list_field() {
        let mut message = Message::new(MessageType::Reply, 5);
        message.add_option(
            EncodedOption::new(
                23,
                &OptionValue::Addresses(vec![
                    "2001:db8::53".parse().unwrap(),
                    "2001:db8::54".parse().unwrap(),
                ]),
            )
            .unwrap(),
        );
        let parsed = ReceivedMessage::parse(&message.encode()).unwrap();
        assert_eq!(
            parsed.option(23).unwrap().field("addresses").unwrap(),
            "2001:db8::53,2001:db8::54"
        );
    }

    #[test]
    fn unknown_field_is_none() {
        let mut message = Message::new(MessageType::Advertise, 5);
        message.add_option(EncodedOption::from_raw(7, vec![1]));
        let parsed = ReceivedMessage::parse(&message.encode()).unwrap();
        let preference = parsed.option(7).unwrap();
        assert_eq!(preference.field("prefval"), Some("1".to_string()));
        assert_eq!(preference.field("bogus"), None);
    }
}
