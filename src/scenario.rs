//! `scenario` is a module providing the canned conformance exchanges.
//!
//! A canned scenario strings the exchange steps into a complete lease
//! acquisition flow and fails on the first unmet expectation: a missing
//! reply, a missing option or a field differing from the expectation.
//! Two flows are provided: the four message DHCPv4 exchange (DISCOVER,
//! OFFER, REQUEST, ACK) followed by a renewal, and the four message
//! DHCPv6 exchange (SOLICIT, ADVERTISE, REQUEST, REPLY) followed by a
//! renewal. A DNS verification step supports the DDNS scenarios.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use anvil_lib::session::SessionConfig;
use log::info;
use thiserror::Error;

use crate::exchange::{v4, v6, ExchangeError};
use crate::expect::{ExpectError, V4Response, V6Response};
use crate::proto::dhcp::v6::{
    OPTION_CODE_IA_ADDRESS, OPTION_CODE_IA_NA, STATUS_CODE_SUCCESS,
};
use crate::proto::dhcp::OptionError;
use crate::proto::dns;
use crate::transport::UdpChannel;

/// Represents errors concluding a canned scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// An exchange step failed.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    /// A response assertion failed.
    #[error(transparent)]
    Expect(#[from] ExpectError),
    /// An error in one of the included options.
    #[error(transparent)]
    Option(#[from] OptionError),
    /// The server answered without leasing anything.
    #[error("the server reply carries no lease")]
    NoLease,
    /// The DNS verification was requested without a configured DNS
    /// server address.
    #[error("no DNS server address in the session configuration")]
    NoDnsServer,
    /// The DNS response can't be decoded.
    #[error(transparent)]
    Dns(#[from] dns::DnsError),
    /// The DNS server did not answer within the listen window.
    #[error("no DNS response received")]
    NoDnsResponse,
    /// The DNS answer section contradicts the expectation.
    #[error("expected {expected} DNS answer(s), received {received}")]
    DnsAnswerMismatch {
        /// The expectation: `some` or `none`.
        expected: String,
        /// The received answer count.
        received: usize,
    },
}

/// Opens the DHCPv4 channel described by the session configuration.
fn open_v4_channel(config: &SessionConfig) -> Result<UdpChannel, ScenarioError> {
    let local = SocketAddr::new(IpAddr::V4(config.client_addr_v4), config.client_port_v4);
    let peer = SocketAddr::new(IpAddr::V4(config.server_addr_v4), config.server_port_v4);
    Ok(UdpChannel::open(local, peer).map_err(ExchangeError::Io)?)
}

/// Opens the DHCPv6 channel described by the session configuration.
fn open_v6_channel(config: &SessionConfig) -> Result<UdpChannel, ScenarioError> {
    let local = SocketAddr::new(IpAddr::V6(config.client_addr_v6), config.client_port_v6);
    let peer = SocketAddr::new(IpAddr::V6(config.server_addr_v6), config.server_port_v6);
    Ok(UdpChannel::open(local, peer).map_err(ExchangeError::Io)?)
}

/// Runs the DISCOVER, OFFER, REQUEST, ACK exchange with a renewal.
///
/// The offered address is requested back and must be acknowledged both
/// in the initial exchange and in the renewing REQUEST. When the
/// session configuration carries an expected pool address the offer
/// must match it.
///
/// # Result
///
/// It returns the acknowledged address.
pub fn dora(config: &SessionConfig) -> Result<Ipv4Addr, ScenarioError> {
    let channel = open_v4_channel(config)?;
    let mut exchange = v4::Exchange::new(config.clone());

    // DISCOVER / OFFER.
    exchange.include_option("client-id")?;
    exchange.build("DISCOVER")?;
    exchange.send_and_wait(&channel, Some("OFFER"), true)?;
    let offer = exchange.last_response().ok_or(ScenarioError::NoLease)?;
    let offered = offer.header().yiaddr;
    if offered.is_unspecified() {
        return Err(ScenarioError::NoLease);
    }
    if let Some(expected) = config.expected_address_v4 {
        V4Response::new(offer).message_content("yiaddr", true, &expected.to_string())?;
    }
    info!("offered address: {}", offered);

    // REQUEST / ACK. The transaction id persists within the exchange.
    exchange.copy_option("server-id")?;
    exchange.values.requested_address = Some(offered);
    exchange.include_option("client-id")?;
    exchange.include_option("requested-address")?;
    exchange.build("REQUEST")?;
    exchange.send_and_wait(&channel, Some("ACK"), true)?;
    let ack = exchange.last_response().ok_or(ScenarioError::NoLease)?;
    V4Response::new(ack).message_content("yiaddr", true, &offered.to_string())?;

    // A renewing REQUEST must be acknowledged with the same address.
    exchange.next_step();
    exchange.values.ciaddr = offered;
    exchange.values.requested_address = Some(offered);
    exchange.include_option("client-id")?;
    exchange.include_option("requested-address")?;
    exchange.build("REQUEST")?;
    exchange.send_and_wait(&channel, Some("ACK"), true)?;
    let ack = exchange.last_response().ok_or(ScenarioError::NoLease)?;
    V4Response::new(ack).message_content("yiaddr", true, &offered.to_string())?;

    info!("acknowledged address: {}", offered);
    Ok(offered)
}

/// Runs the SOLICIT, ADVERTISE, REQUEST, REPLY exchange with a renewal.
///
/// The advertised lease is requested back and the reply must carry it
/// with the Success status; an absent status code suboption counts as
/// Success. When the session configuration carries an expected pool
/// address the advertised lease must match it.
///
/// # Result
///
/// It returns the leased address.
pub fn sarr(config: &SessionConfig) -> Result<Ipv6Addr, ScenarioError> {
    let channel = open_v6_channel(config)?;
    let mut exchange = v6::Exchange::new(config.clone());

    // SOLICIT / ADVERTISE.
    exchange.include_option("client-id")?;
    exchange.include_option("IA-NA")?;
    exchange.build("SOLICIT")?;
    exchange.send_and_wait(&channel, Some("ADVERTISE"), true)?;
    let advertise = exchange.last_response().ok_or(ScenarioError::NoLease)?;
    let response = V6Response::new(advertise);
    response.include_option("client-id", true)?;
    response.include_option("server-id", true)?;
    let leased = advertise
        .suboptions(OPTION_CODE_IA_NA, OPTION_CODE_IA_ADDRESS)
        .first()
        .and_then(|option| option.field("addr"))
        .ok_or(ScenarioError::NoLease)?;
    if let Some(expected) = config.expected_address_v6 {
        response.check_ia_na(&expected.to_string(), STATUS_CODE_SUCCESS, true)?;
    }
    info!("advertised address: {}", leased);

    // REQUEST / REPLY.
    exchange.copy_option("server-id")?;
    exchange.copy_option("IA_NA")?;
    exchange.include_option("client-id")?;
    exchange.build("REQUEST")?;
    exchange.send_and_wait(&channel, Some("REPLY"), true)?;
    let reply = exchange.last_response().ok_or(ScenarioError::NoLease)?;
    V6Response::new(reply).check_ia_na(&leased, STATUS_CODE_SUCCESS, true)?;

    // RENEW / REPLY with the same lease.
    exchange.copy_option("server-id")?;
    exchange.copy_option("IA_NA")?;
    exchange.include_option("client-id")?;
    exchange.build("RENEW")?;
    exchange.send_and_wait(&channel, Some("REPLY"), true)?;
    let reply = exchange.last_response().ok_or(ScenarioError::NoLease)?;
    V6Response::new(reply).check_ia_na(&leased, STATUS_CODE_SUCCESS, true)?;

    info!("leased address: {}", leased);
    leased.parse().map_err(|_| ScenarioError::NoLease)
}

/// Queries the DNS server and checks the answer section.
///
/// # Parameters
///
/// - `config` supplies the DNS server address and the listen window
/// - `name` is the queried name
/// - `record_type` is the queried record type, e.g.
///   [`dns::RECORD_TYPE_A`]
/// - `expect_answers` is `true` when the name must resolve and `false`
///   when the answer section must be empty, e.g. after a RELEASE
///   deregistered the name
///
/// # Result
///
/// It returns the answer records, possibly empty.
pub fn verify_dns(
    config: &SessionConfig,
    name: &str,
    record_type: u16,
    expect_answers: bool,
) -> Result<Vec<dns::Record>, ScenarioError> {
    let server = config.dns_addr.ok_or(ScenarioError::NoDnsServer)?;
    let local: SocketAddr = match server {
        IpAddr::V4(_) => "0.0.0.0:0".parse().unwrap(),
        IpAddr::V6(_) => "[::]:0".parse().unwrap(),
    };
    let channel = UdpChannel::open(local, SocketAddr::new(server, config.dns_port))
        .map_err(ExchangeError::Io)?;

    let query = dns::Query::new(rand::random(), name, record_type);
    let replies = channel
        .exchange(&query.encode()?, config.wait_interval())
        .map_err(ExchangeError::Io)?;
    let reply = replies.first().ok_or(ScenarioError::NoDnsResponse)?;
    let response = dns::Response::parse(reply)?;

    if expect_answers && response.answers.is_empty() {
        return Err(ScenarioError::DnsAnswerMismatch {
            expected: "some".to_string(),
            received: 0,
        });
    }
    if !expect_answers && !response.answers.is_empty() {
        return Err(ScenarioError::DnsAnswerMismatch {
            expected: "none".to_string(),
            received: response.answers.len(),
        });
    }
    Ok(response.answers)
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;
    use std::thread;

    use anvil_lib::session::SessionConfig;

    use super::{dora, sarr, verify_dns};
    use crate::proto::dhcp::v4;
    use crate::proto::dhcp::v6;
    use crate::proto::dns::RECORD_TYPE_A;

    /// Builds a session configuration talking to a local responder.
    fn local_config(server_port: u16) -> SessionConfig {
        serde_json::from_str::<SessionConfig>(&format!(
            r#"{{
                "client_addr_v4": "127.0.0.1",
                "server_addr_v4": "127.0.0.1",
                "client_port_v4": 0,
                "server_port_v4": {server_port},
                "client_addr_v6": "::1",
                "server_addr_v6": "::1",
                "client_port_v6": 0,
                "server_port_v6": {server_port},
                "wait_interval_ms": 500
            }}"#
        ))
        .unwrap()
    }

    /// A minimal DHCPv4 responder: answers a DISCOVER with an OFFER of
    /// 192.0.2.100 and any REQUEST with an ACK of the requested address.
    fn run_v4_responder(exchanges: usize) -> u16 {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        thread::spawn(move || {
            let mut buffer = [0; 4096];
            for _ in 0..exchanges {
                let (length, source) = socket.recv_from(&mut buffer).unwrap();
                let query = v4::ReceivedMessage::parse(&buffer[..length]).unwrap();
                let (message_type, yiaddr) = match query.message_type().unwrap() {
                    v4::MessageType::Discover => {
                        (v4::MessageType::Offer, "192.0.2.100".parse().unwrap())
                    }
                    v4::MessageType::Request => {
                        let requested = query
                            .option(50)
                            .map(|option| option.text_values()[0].parse().unwrap())
                            .unwrap();
                        (v4::MessageType::Ack, requested)
                    }
                    other => panic!("unexpected query type {:?}", other),
                };
                let mut reply = v4::Message::new(message_type);
                reply.header.opcode = crate::proto::bootp::OpCode::BootReply;
                reply.header.xid = query.header().xid;
                reply.header.yiaddr = yiaddr;
                reply.header.chaddr = query.header().chaddr.clone();
                reply.add_option(
                    v4::EncodedOption::new(
                        54,
                        &v4::OptionValue::Address("127.0.0.1".parse().unwrap()),
                    )
                    .unwrap(),
                );
                socket.send_to(&reply.encode(), source).unwrap();
            }
        });
        port
    }

    /// A minimal DHCPv6 responder: leases 2001:db8:1::5 to any query,
    /// answering a SOLICIT with an ADVERTISE and anything else with a
    /// REPLY.
    fn run_v6_responder(exchanges: usize) -> u16 {
        let socket = UdpSocket::bind("[::1]:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        thread::spawn(move || {
            let mut buffer = [0; 4096];
            for _ in 0..exchanges {
                let (length, source) = socket.recv_from(&mut buffer).unwrap();
                let query = v6::ReceivedMessage::parse(&buffer[..length]).unwrap();
                let message_type = match query.message_type().unwrap() {
                    v6::MessageType::Solicit => v6::MessageType::Advertise,
                    _ => v6::MessageType::Reply,
                };
                let mut reply = v6::Message::new(message_type, query.transaction_id());
                // Echo the client id and announce our server id.
                let client_id = query.option(1).unwrap();
                reply.add_option(v6::EncodedOption::from_raw(1, client_id.data.clone()));
                reply.add_option(v6::EncodedOption::from_raw(
                    2,
                    vec![0, 3, 0, 1, 1, 2, 3, 4, 5, 6],
                ));
                let ia_address = v6::EncodedOption::new(
                    5,
                    &v6::OptionValue::IaAddress {
                        address: "2001:db8:1::5".parse().unwrap(),
                        preferred_lifetime: 3600,
                        valid_lifetime: 7200,
                        options: Vec::new(),
                    },
                )
                .unwrap();
                reply.add_option(
                    v6::EncodedOption::new(
                        3,
                        &v6::OptionValue::IaNa {
                            iaid: 1,
                            t1: 1800,
                            t2: 2880,
                            options: vec![ia_address],
                        },
                    )
                    .unwrap(),
                );
                socket.send_to(&reply.encode(), source).unwrap();
            }
        });
        port
    }

    #[test]
    fn dora_acquires_the_offered_address() {
        let port = run_v4_responder(3);
        let mut config = local_config(port);
        config.expected_address_v4 = Some("192.0.2.100".parse().unwrap());
        let address = dora(&config).unwrap();
        assert_eq!(address.to_string(), "192.0.2.100");
    }

    #[test]
    fn dora_fails_on_unexpected_pool_address() {
        let port = run_v4_responder(1);
        let mut config = local_config(port);
        config.expected_address_v4 = Some("192.0.2.1".parse().unwrap());
        assert!(dora(&config).is_err());
    }

    #[test]
    fn sarr_acquires_the_advertised_address() {
        let port = run_v6_responder(3);
        let mut config = local_config(port);
        config.expected_address_v6 = Some("2001:db8:1::5".parse().unwrap());
        let address = sarr(&config).unwrap();
        assert_eq!(address.to_string(), "2001:db8:1::5");
    }

    #[test]
    fn verify_dns_checks_the_answer_section() {
        // A DNS responder answering with an empty answer section.
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        thread::spawn(move || {
            let mut buffer = [0; 1024];
            let (length, source) = socket.recv_from(&mut buffer).unwrap();
            // Echo the id and the question, flip the response bit.
            let mut reply = buffer[..length].to_vec();
            reply[2] = 0x81;
            reply[3] = 0x00;
            socket.send_to(&reply, source).unwrap();
        });

        let mut config = local_config(1);
        config.dns_addr = Some("127.0.0.1".parse().unwrap());
        config.dns_port = port;

        let answers =
            verify_dns(&config, "released.example.com", RECORD_TYPE_A, false).unwrap();
        assert!(answers.is_empty());
    }

    #[test]
    fn verify_dns_requires_a_configured_server() {
        let config = local_config(1);
        let error = verify_dns(&config, "host.example.com", RECORD_TYPE_A, true).unwrap_err();
        assert_eq!(
            error.to_string(),
            "no DNS server address in the session configuration"
        );
    }
}
