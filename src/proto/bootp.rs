//! `bootp` is a module providing the BOOTP fixed header encoding and
//! parsing capabilities.
//!
//! The BOOTP protocol has been described in the <https://www.rfc-editor.org/rfc/rfc951.html>.
//! The protocol allows a client machine to request an IPv4 address assignment from a server
//! by sending a BOOTREQUEST message over UDP. The DHCPv4 protocol was designed on top of the
//! BOOTP, reusing its fields and extending it with the DHCPv4 options carrying additional
//! client configuration. See <https://www.ietf.org/rfc/rfc2131.html> for the details.
//!
//! This module handles the fixed portion of the messages shared by both
//! protocols. The [`super::dhcp::v4`] module builds and parses the complete
//! DHCPv4 messages, including the options following the fixed header.

use std::{
    fmt::{self, Display},
    net::Ipv4Addr,
};

use super::buffer::{BufferError, ClampedNumber, ReceiveBuffer, TransmitBuffer};

/// `opcode` position.
pub const OPCODE_POS: u32 = 0;
/// `htype` position.
pub const HTYPE_POS: u32 = 1;
/// `hlen` position.
pub const HLEN_POS: u32 = 2;
/// Ethernet hardware address length (MAC address length).
pub const HLEN_ETHERNET: usize = 6;
/// `hops` position.
pub const HOPS_POS: u32 = 3;
/// `xid` position.
pub const XID_POS: u32 = 4;
/// `secs` position.
pub const SECS_POS: u32 = 8;
/// `flags` position. BOOTP defined this field as unused.
pub const FLAGS_POS: u32 = 10;
/// `ciaddr` position.
pub const CIADDR_POS: u32 = 12;
/// `yiaddr` position.
pub const YIADDR_POS: u32 = 16;
/// `siaddr` position.
pub const SIADDR_POS: u32 = 20;
/// `giaddr` position.
pub const GIADDR_POS: u32 = 24;
/// `chaddr` position.
pub const CHADDR_POS: u32 = 28;
/// `chaddr` maximum length.
pub const CHADDR_MAX_LEN: usize = 16;
/// `sname` position.
pub const SNAME_POS: u32 = 44;
/// `sname` maximum length.
pub const SNAME_MAX_LEN: usize = 64;
/// `file` position.
pub const FILE_POS: u32 = 108;
/// `file` maximum length.
pub const FILE_MAX_LEN: usize = 128;
/// Position of the `vend` field holding the magic cookie in DHCPv4.
pub const MAGIC_COOKIE_POS: u32 = 236;
/// The DHCP magic cookie preceding the options.
pub const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
/// Position of the first DHCPv4 option, right after the magic cookie.
pub const OPTIONS_POS: u32 = 240;
/// The broadcast bit in the `flags` field.
pub const FLAG_BROADCAST: u16 = 0x8000;

/// An enum representing the bootp message types.
///
/// If the parsed message type is neither [`OpCode::BootRequest`] nor
/// [`OpCode::BootReply`] it is set to [`OpCode::Invalid`] with the actual
/// code as an enum parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OpCode {
    /// A request sent to the server.
    BootRequest,
    /// A reply returned by the server to the client.
    BootReply,
    /// An invalid opcode value received in the parsed BOOTP message.
    Invalid(u8),
}

impl From<u8> for OpCode {
    /// Converts to this type from the `opcode` in the parsed message.
    ///
    /// Valid raw values are:
    /// - `1` for `bootrequest`
    /// - `2` for `bootreply`
    ///
    /// All other values are invalid and converted to [`OpCode::Invalid`].
    fn from(raw_code: u8) -> Self {
        match raw_code {
            1 => OpCode::BootRequest,
            2 => OpCode::BootReply,
            x => OpCode::Invalid(x),
        }
    }
}

impl From<&OpCode> for u8 {
    fn from(opcode: &OpCode) -> Self {
        match opcode {
            OpCode::BootRequest => 1,
            OpCode::BootReply => 2,
            OpCode::Invalid(x) => *x,
        }
    }
}

/// An enum representing hardware types.
///
/// The most widely used hardware type is Ethernet. Thus, this is the only
/// type having its own item in this enum. All other types are represented
/// by the catch-all [`HType::Other`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HType {
    /// Ethernet hardware type (1).
    Ethernet,
    /// All hardware types other than Ethernet.
    Other(u8),
}

impl From<u8> for HType {
    fn from(raw_code: u8) -> Self {
        match raw_code {
            1 => HType::Ethernet,
            x => HType::Other(x),
        }
    }
}

impl From<&HType> for u8 {
    fn from(htype: &HType) -> Self {
        match htype {
            HType::Ethernet => 1,
            HType::Other(x) => *x,
        }
    }
}

/// A structure representing a hardware address.
///
/// The length of the hardware address depends on the hardware type. Thus,
/// this structure includes both the buffer with an actual address and the
/// hardware type.
#[derive(Clone, Debug, PartialEq)]
pub struct HAddr {
    htype: HType,
    data: Vec<u8>,
}

impl HAddr {
    /// Creates a hardware address instance from a hardware type and a buffer.
    ///
    /// # Parameters
    ///
    /// - `htype` is a hardware type
    /// - `data` is a variable length buffer holding the harware address
    pub fn new(htype: HType, data: Vec<u8>) -> HAddr {
        HAddr { htype, data }
    }

    /// Creates an Ethernet hardware address from a colon-delimited string.
    ///
    /// # Parameters
    ///
    /// - `text` is a MAC address like `ff:01:02:03:ff:04`
    ///
    /// # Result
    ///
    /// It returns `None` when the string is not a valid colon-delimited
    /// hexadecimal string.
    pub fn from_mac(text: &str) -> Option<HAddr> {
        let data = hex::decode(text.replace(':', "")).ok()?;
        Some(HAddr::new(HType::Ethernet, data))
    }

    /// Checks if the hardware address is invalid.
    ///
    /// Currently supported checks are:
    ///
    /// - `ethernet` hardware address must be 6 bytes long.
    ///
    pub fn invalid(&self) -> bool {
        match self.htype {
            HType::Ethernet => self.data.len() != HLEN_ETHERNET,
            HType::Other(_) => false,
        }
    }

    /// Returns the hardware type.
    pub fn htype(&self) -> &HType {
        &self.htype
    }

    /// Returns the hardware address.
    pub fn data(&self) -> &Vec<u8> {
        &self.data
    }
}

impl Display for HAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hex: Vec<String> = Vec::new();
        self.data.iter().for_each(|byte| {
            hex.push(format!("{:02x}", byte));
        });
        write!(f, "{}", hex.join(":"))
    }
}

/// A structure representing the fixed portion of a BOOTP message.
///
/// The same 236 byte structure begins every BOOTP and DHCPv4 message.
/// The header is assembled for the outbound messages with [`Header::encode`]
/// and recovered from the received messages with [`Header::decode`]. The
/// two functions are inverses of each other, with an exception of the
/// `chaddr` field which the decoder truncates to the clamped `hlen`.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    /// Message operation code.
    pub opcode: OpCode,
    /// Number of the relay agents that forwarded the message.
    pub hops: u8,
    /// Transaction id correlating a reply with the query.
    pub xid: u32,
    /// Seconds elapsed since the client began the exchange.
    pub secs: u16,
    /// The flags field. Only the broadcast bit is defined.
    pub flags: u16,
    /// Client address, filled when the client renews its lease.
    pub ciaddr: Ipv4Addr,
    /// Address the server offers to the client.
    pub yiaddr: Ipv4Addr,
    /// Address of the next server to use in the bootstrap.
    pub siaddr: Ipv4Addr,
    /// Address of the relay agent closest to the client.
    pub giaddr: Ipv4Addr,
    /// Client hardware address.
    pub chaddr: HAddr,
    /// Server host name.
    pub sname: String,
    /// Boot file name.
    pub file: String,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            opcode: OpCode::BootRequest,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: HAddr::new(HType::Ethernet, vec![0; HLEN_ETHERNET]),
            sname: String::new(),
            file: String::new(),
        }
    }
}

impl Header {
    /// Checks if the broadcast bit is set in the flags field.
    pub fn is_broadcast(&self) -> bool {
        self.flags & FLAG_BROADCAST != 0
    }

    /// Appends the encoded header to the transmit buffer.
    ///
    /// The variable length fields are padded with zeros to their fixed
    /// sizes, so the options appended after the header always begin at
    /// the position defined by [`MAGIC_COOKIE_POS`]. The magic cookie is
    /// not part of the header; the caller appends it together with the
    /// options.
    pub fn encode(&self, buffer: &mut TransmitBuffer) {
        buffer.write_u8(u8::from(&self.opcode));
        buffer.write_u8(u8::from(self.chaddr.htype()));
        buffer.write_u8(self.chaddr.data().len().min(CHADDR_MAX_LEN) as u8);
        buffer.write_u8(self.hops);
        buffer.write_u32(self.xid);
        buffer.write_u16(self.secs);
        buffer.write_u16(self.flags);
        buffer.write_ipv4(&self.ciaddr);
        buffer.write_ipv4(&self.yiaddr);
        buffer.write_ipv4(&self.siaddr);
        buffer.write_ipv4(&self.giaddr);
        buffer.write_padded(self.chaddr.data(), CHADDR_MAX_LEN);
        buffer.write_padded(self.sname.as_bytes(), SNAME_MAX_LEN);
        buffer.write_padded(self.file.as_bytes(), FILE_MAX_LEN);
    }

    /// Attempts to parse the header from a receive buffer.
    ///
    /// # Parameters
    ///
    /// - `buffer` is a buffer positioned at the beginning of the message
    ///
    /// # Result
    ///
    /// It returns the parsed header or the [`BufferError`] when the
    /// buffer is shorter than the fixed header. An out of range `hlen`
    /// is clamped to the 1 to 16 range before the `chaddr` is read, so a
    /// malformed length never causes an invalid read.
    pub fn decode(buffer: &ReceiveBuffer) -> Result<Header, BufferError> {
        let opcode = OpCode::from(buffer.read_u8(OPCODE_POS)?);
        let htype = HType::from(buffer.read_u8(HTYPE_POS)?);
        let hlen = ClampedNumber::new(1, CHADDR_MAX_LEN as u8, buffer.read_u8(HLEN_POS)?);
        let chaddr = HAddr::new(htype, buffer.read_vec(CHADDR_POS, usize::from(hlen.get()))?);
        Ok(Header {
            opcode,
            hops: buffer.read_u8(HOPS_POS)?,
            xid: buffer.read_u32(XID_POS)?,
            secs: buffer.read_u16(SECS_POS)?,
            flags: buffer.read_u16(FLAGS_POS)?,
            ciaddr: buffer.read_ipv4(CIADDR_POS)?,
            yiaddr: buffer.read_ipv4(YIADDR_POS)?,
            siaddr: buffer.read_ipv4(SIADDR_POS)?,
            giaddr: buffer.read_ipv4(GIADDR_POS)?,
            chaddr,
            sname: buffer.read_null_terminated(SNAME_POS, SNAME_MAX_LEN)?,
            file: buffer.read_null_terminated(FILE_POS, FILE_MAX_LEN)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use crate::proto::bootp::*;
    use crate::proto::buffer::{ReceiveBuffer, TransmitBuffer};
    use crate::proto::tests::common::TestPacket;

    #[test]
    fn display_hardware_address() {
        let haddr = HAddr::new(HType::Ethernet, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!("01:02:03:04:05:06", haddr.to_string())
    }

    #[test]
    fn display_empty_hardware_address() {
        let haddr = HAddr::new(HType::Ethernet, vec![]);
        assert_eq!("", haddr.to_string())
    }

    #[test]
    fn hardware_address_from_mac() {
        let haddr = HAddr::from_mac("ff:01:02:03:ff:04");
        assert!(haddr.is_some());
        let haddr = haddr.unwrap();
        assert!(!haddr.invalid());
        assert_eq!(*haddr.data(), vec![0xff, 1, 2, 3, 0xff, 4]);
    }

    #[test]
    fn hardware_address_from_invalid_mac() {
        assert!(HAddr::from_mac("not a mac").is_none());
    }

    #[test]
    fn decode_valid_packet() {
        let test_packet = TestPacket::new_valid_bootp_packet();
        let buffer = ReceiveBuffer::new(test_packet.get());

        let header = Header::decode(&buffer);
        assert!(header.is_ok());
        let header = header.unwrap();
        assert_eq!(header.opcode, OpCode::BootReply);
        assert_eq!(header.hops, 1);
        assert_eq!(header.xid, 0x43557883);
        assert_eq!(header.secs, 1);
        assert!(header.is_broadcast());
        assert_eq!(header.ciaddr, Ipv4Addr::new(192, 0, 2, 22));
        assert_eq!(header.yiaddr, Ipv4Addr::new(192, 0, 2, 23));
        assert_eq!(header.siaddr, Ipv4Addr::new(10, 15, 23, 12));
        assert_eq!(header.giaddr, Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(header.sname, "foo");
        assert_eq!(header.file, "/tmp/boot");
        assert!(!header.chaddr.invalid());
        assert_eq!(*header.chaddr.htype(), HType::Ethernet);
        assert_eq!(*header.chaddr.data(), vec![45, 32, 89, 43, 12, 22])
    }

    #[test]
    fn decode_invalid_opcode() {
        let test_packet = TestPacket::new_valid_bootp_packet().set(OPCODE_POS, &[5]);
        let buffer = ReceiveBuffer::new(test_packet.get());
        let header = Header::decode(&buffer).unwrap();
        assert_eq!(header.opcode, OpCode::Invalid(5));
    }

    #[test]
    fn decode_other_htype() {
        let test_packet = TestPacket::new_valid_bootp_packet()
            .set(HTYPE_POS, &[2])
            .set(HLEN_POS, &[4])
            .set(CHADDR_POS, &[1, 2, 3, 4]);

        let buffer = ReceiveBuffer::new(test_packet.get());
        let header = Header::decode(&buffer).unwrap();
        let chaddr = &header.chaddr;
        assert!(!chaddr.invalid());
        assert_eq!(*chaddr.htype(), HType::Other(2));
        assert_eq!(*chaddr.data(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn decode_too_high_hlen() {
        let test_packet = TestPacket::new_valid_bootp_packet().set(HLEN_POS, &[20]).set(
            CHADDR_POS,
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16],
        );

        let buffer = ReceiveBuffer::new(test_packet.get());
        let header = Header::decode(&buffer).unwrap();
        let chaddr = &header.chaddr;
        assert!(chaddr.invalid());
        assert_eq!(*chaddr.htype(), HType::Ethernet);
        assert_eq!(
            *chaddr.data(),
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]
        );
    }

    #[test]
    fn decode_zero_hlen() {
        let test_packet = TestPacket::new_valid_bootp_packet().set(HLEN_POS, &[0]);

        let buffer = ReceiveBuffer::new(test_packet.get());
        let header = Header::decode(&buffer).unwrap();
        let chaddr = &header.chaddr;
        assert!(chaddr.invalid());
        assert_eq!(*chaddr.data(), vec![45]);
    }

    #[test]
    fn decode_truncated_packet() {
        let data = vec![1, 1, 6, 0];
        let buffer = ReceiveBuffer::new(&data);
        assert!(Header::decode(&buffer).is_err());
    }

    #[test]
    fn encode_default_header() {
        let mut buffer = TransmitBuffer::new();
        Header::default().encode(&mut buffer);
        let data = buffer.into_vec();
        assert_eq!(data.len() as u32, MAGIC_COOKIE_POS);
        assert_eq!(data[OPCODE_POS as usize], 1);
        assert_eq!(data[HTYPE_POS as usize], 1);
        assert_eq!(data[HLEN_POS as usize], 6);
    }

    #[test]
    fn encode_decode_round_trip() {
        let header = Header {
            opcode: OpCode::BootRequest,
            hops: 2,
            xid: 0x12345678,
            secs: 30,
            flags: FLAG_BROADCAST,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::new(10, 0, 0, 1),
            giaddr: Ipv4Addr::new(192, 0, 2, 1),
            chaddr: HAddr::from_mac("ff:01:02:03:ff:04").unwrap(),
            sname: "srv".to_string(),
            file: "/boot/image".to_string(),
        };
        let mut buffer = TransmitBuffer::new();
        header.encode(&mut buffer);
        let data = buffer.into_vec();

        let decoded = Header::decode(&ReceiveBuffer::new(&data)).unwrap();
        assert_eq!(decoded, header);
    }
}
