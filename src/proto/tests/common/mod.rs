//! `common` is a module holding the wire format fixtures shared by the
//! protocol tests.

use crate::proto::dhcp::v4::{MessageType, OPTION_CODE_DHCP_MESSAGE_TYPE};

const VALID_BOOTP_PACKET: &[u8] = &[
    2, // op (1 byte) = BOOTREPLY
    1, // htype (1 byte) = Ethernet
    6, // hlen (1 byte)
    1, // hops (1 byte)
    67, 85, 120, 131, // xid (4 bytes)
    0, 1, // secs (2 bytes) = 1 s
    128, 0, // flags (2 bytes) = broadcast
    192, 0, 2, 22, // ciaddr (4 bytes)
    192, 0, 2, 23, // yiaddr (4 bytes)
    10, 15, 23, 12, // siaddr (4 bytes)
    192, 0, 2, 1, // giaddr (4 bytes)
    45, 32, 89, 43, 12, 22, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // chaddr (16 bytes)
    102, 111, 111, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, // sname (64 bytes) = foo
    47, 116, 109, 112, 47, 98, 111, 111, 116, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, // file (128 bytes) = /tmp/boot
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, // vend (64 bytes)
];

const VALID_DHCP_PACKET: &[u8] = &[
    1, // op (1 byte) = BOOTREQUEST
    1, // htype (1 byte) = Ethernet
    6, // hlen (1 byte)
    1, // hops (1 byte)
    0, 0, 0, 5, // xid (4 bytes)
    0, 3, // secs (2 bytes)
    0, 0, // flags (2 bytes)
    0, 0, 0, 0, // ciaddr (4 bytes)
    0, 0, 0, 0, // yiaddr (4 bytes)
    0, 0, 0, 0, // siaddr (4 bytes)
    127, 0, 0, 1, // giaddr (4 bytes)
    0, 12, 1, 2, 3, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // chaddr (16 bytes)
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, // sname (64 bytes)
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, // file (128 bytes)
    99, 130, 83, 99, // magic cookie (4 bytes)
    53, 1, 1, // option 53: DHCPDISCOVER
    55, 7, 1, 28, 2, 3, 15, 6, 12, // option 55: Parameter Request List
    61, 7, 1, 0, 12, 1, 2, 3, 9, // option 61: Client Identifier
    255, // option 255: END
];

const BASE_DHCP_PACKET: &[u8] = &[
    1, // op (1 byte) = BOOTREQUEST
    1, // htype (1 byte) = Ethernet
    6, // hlen (1 byte)
    1, // hops (1 byte)
    0, 0, 0, 5, // xid (4 bytes)
    0, 3, // secs (2 bytes)
    0, 0, // flags (2 bytes)
    0, 0, 0, 0, // ciaddr (4 bytes)
    0, 0, 0, 0, // yiaddr (4 bytes)
    0, 0, 0, 0, // siaddr (4 bytes)
    127, 0, 0, 1, // giaddr (4 bytes)
    0, 12, 1, 2, 3, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // chaddr (16 bytes)
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, // sname (64 bytes)
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, // file (128 bytes)
    99, 130, 83, 99, // magic cookie (4 bytes)
];

/// An ADVERTISE with a client-id, a server-id and an IA_NA nesting a
/// single IA address 2001:db8:1::5.
const VALID_ADVERTISE_PACKET: &[u8] = &[
    2, 0x12, 0x34, 0x56, // ADVERTISE, transaction id
    0, 1, 0, 10, // option 1: client-id
    0, 3, 0, 1, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01, // DUID-LL
    0, 2, 0, 14, // option 2: server-id
    0, 1, 0, 1, 0x52, 0x7b, 0xa8, 0xf0, 0x08, 0x00, 0x27, 0x58, 0xf1, 0xe8, // DUID-LLT
    0, 3, 0, 40, // option 3: IA_NA
    0, 0, 0, 1, // iaid
    0, 0, 0x0e, 0x10, // T1 (3600)
    0, 0, 0x1c, 0x20, // T2 (7200)
    0, 5, 0, 24, // option 5: IA address
    0x20, 0x01, 0x0d, 0xb8, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5, // 2001:db8:1::5
    0, 0, 0x0e, 0x10, // preferred lifetime (3600)
    0, 0, 0x1c, 0x20, // valid lifetime (7200)
];

/// A byte level packet fixture.
///
/// The fixture holds one of the canned packets and allows overwriting
/// the bytes at a fixed position or appending new bytes, so a test can
/// derive a malformed or extended variant from a valid packet.
#[derive(Debug)]
pub struct TestPacket {
    data: Vec<u8>,
}

impl TestPacket {
    /// Creates a valid BOOTP reply without options.
    pub fn new_valid_bootp_packet() -> Self {
        Self {
            data: VALID_BOOTP_PACKET.to_vec(),
        }
    }

    /// Creates a valid DHCPv4 DISCOVER.
    pub fn new_valid_dhcp_packet() -> Self {
        Self {
            data: VALID_DHCP_PACKET.to_vec(),
        }
    }

    /// Creates a DHCPv4 packet ending right after the magic cookie.
    pub fn new_base_dhcp_packet() -> Self {
        Self {
            data: BASE_DHCP_PACKET.to_vec(),
        }
    }

    /// Creates a DHCPv4 packet carrying only the message type option.
    pub fn new_dhcp_packet_with_message_type(message_type: MessageType) -> Self {
        Self::new_base_dhcp_packet().append(&[
            OPTION_CODE_DHCP_MESSAGE_TYPE,
            1,
            message_type.into(),
        ])
    }

    /// Creates a valid DHCPv6 ADVERTISE with a leased address.
    pub fn new_valid_advertise_packet() -> Self {
        Self {
            data: VALID_ADVERTISE_PACKET.to_vec(),
        }
    }

    /// Returns the packet bytes.
    pub fn get(&self) -> &[u8] {
        &self.data
    }

    /// Overwrites the bytes at the specified position.
    pub fn set(self, pos: u32, new_data: &[u8]) -> TestPacket {
        let pos_converted = pos as usize;
        let mut data = self.data;
        data[pos_converted..pos_converted + new_data.len()].copy_from_slice(new_data);
        TestPacket { data }
    }

    /// Appends the bytes at the end of the packet.
    pub fn append(self, new_data: &[u8]) -> TestPacket {
        let mut data = self.data;
        data.extend_from_slice(new_data);
        TestPacket { data }
    }
}
