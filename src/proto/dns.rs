//! `dns` is a module providing a minimal DNS message encoding and
//! parsing capability for the DDNS verification steps.
//!
//! A conformance scenario checks that the tested server registered (or
//! removed) the client's FQDN by querying the DNS server directly: after
//! an exchange with the FQDN option the name must resolve, after a
//! RELEASE the answer section must come back empty. Only the parts of
//! <https://www.rfc-editor.org/rfc/rfc1035.html> needed for such checks
//! are implemented: building a single-question query and reading the
//! header and the answer records of a response.

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

use super::buffer::{ReceiveBuffer, TransmitBuffer};
use super::fqdn::{wire_encode_name, FqdnError};

/// The `A` record type.
pub const RECORD_TYPE_A: u16 = 1;
/// The `PTR` record type.
pub const RECORD_TYPE_PTR: u16 = 12;
/// The `AAAA` record type.
pub const RECORD_TYPE_AAAA: u16 = 28;
/// The `IN` record class.
pub const RECORD_CLASS_IN: u16 = 1;
/// The recursion desired flag bit.
const FLAG_RECURSION_DESIRED: u16 = 0x0100;

/// Represents errors returned by the DNS message processing functions.
#[derive(Debug, Error, PartialEq)]
pub enum DnsError {
    /// An error returned when the message ends prematurely.
    #[error("DNS message is truncated at position {position}")]
    Truncated {
        /// The position at which the read failed.
        position: usize,
    },
    /// An error returned when a compressed name forms a pointer loop.
    #[error("DNS name compression pointer loop at position {position}")]
    PointerLoop {
        /// The position of the offending pointer.
        position: usize,
    },
    /// An error in the queried name.
    #[error(transparent)]
    Name(#[from] FqdnError),
}

/// A structure representing a DNS query.
#[derive(Clone, Debug)]
pub struct Query {
    /// The query id correlating the response with the query.
    pub id: u16,
    /// The queried name.
    pub name: String,
    /// The queried record type, e.g. [`RECORD_TYPE_A`].
    pub record_type: u16,
}

impl Query {
    /// Creates a query for the specified name and record type.
    pub fn new(id: u16, name: &str, record_type: u16) -> Query {
        Query {
            id,
            name: name.to_string(),
            record_type,
        }
    }

    /// Returns the encoded query.
    ///
    /// The query carries a single question with the `IN` class and the
    /// recursion desired flag set.
    pub fn encode(&self) -> Result<Vec<u8>, DnsError> {
        let mut buffer = TransmitBuffer::new();
        buffer.write_u16(self.id);
        buffer.write_u16(FLAG_RECURSION_DESIRED);
        buffer.write_u16(1); // qdcount
        buffer.write_u16(0); // ancount
        buffer.write_u16(0); // nscount
        buffer.write_u16(0); // arcount
        let mut name = self.name.clone();
        if !name.ends_with('.') {
            name.push('.');
        }
        buffer.write_bytes(&wire_encode_name(&name)?);
        buffer.write_u16(self.record_type);
        buffer.write_u16(RECORD_CLASS_IN);
        Ok(buffer.into_vec())
    }
}

/// A structure representing a record of the response answer section.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// The record owner name.
    pub name: String,
    /// The record type.
    pub record_type: u16,
    /// The time to live in seconds.
    pub ttl: u32,
    /// The textual form of the record data: the address form for the
    /// `A` and `AAAA` records, the target name for the `PTR` records,
    /// the hexadecimal form otherwise.
    pub rdata: String,
}

/// A structure representing a parsed DNS response.
#[derive(Clone, Debug)]
pub struct Response {
    /// The query id echoed by the server.
    pub id: u16,
    /// The response code from the header flags.
    pub rcode: u8,
    /// The answer section records.
    pub answers: Vec<Record>,
}

impl Response {
    /// Attempts to parse a received response.
    ///
    /// The question section is skipped; the answer section records are
    /// decoded including the compressed owner names. An empty answer
    /// section is a valid outcome the caller asserts on.
    pub fn parse(data: &[u8]) -> Result<Response, DnsError> {
        let buffer = ReceiveBuffer::new(data);
        let truncated = |position: usize| DnsError::Truncated { position };
        let id = buffer.read_u16(0).map_err(|_| truncated(0))?;
        let flags = buffer.read_u16(2).map_err(|_| truncated(2))?;
        let qdcount = buffer.read_u16(4).map_err(|_| truncated(4))?;
        let ancount = buffer.read_u16(6).map_err(|_| truncated(6))?;

        let mut pos = 12;
        for _ in 0..qdcount {
            pos = skip_name(data, pos)?;
            pos += 4; // qtype and qclass
        }

        let mut answers = Vec::new();
        for _ in 0..ancount {
            let (name, after_name) = decode_name(data, pos)?;
            pos = after_name;
            let record_type = buffer.read_u16(pos as u32).map_err(|_| truncated(pos))?;
            let ttl = buffer.read_u32(pos as u32 + 4).map_err(|_| truncated(pos))?;
            let rdlength = buffer
                .read_u16(pos as u32 + 8)
                .map_err(|_| truncated(pos))? as usize;
            pos += 10;
            if pos + rdlength > data.len() {
                return Err(truncated(pos));
            }
            let rdata = decode_rdata(data, pos, rdlength, record_type)?;
            pos += rdlength;
            answers.push(Record {
                name,
                record_type,
                ttl,
                rdata,
            });
        }
        Ok(Response {
            id,
            rcode: (flags & 0x000f) as u8,
            answers,
        })
    }
}

/// Decodes the record data into its textual form.
fn decode_rdata(
    data: &[u8],
    pos: usize,
    rdlength: usize,
    record_type: u16,
) -> Result<String, DnsError> {
    let rdata = &data[pos..pos + rdlength];
    let text = match record_type {
        RECORD_TYPE_A if rdlength == 4 => {
            Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]).to_string()
        }
        RECORD_TYPE_AAAA if rdlength == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(rdata);
            Ipv6Addr::from(octets).to_string()
        }
        RECORD_TYPE_PTR => decode_name(data, pos)?.0,
        _ => hex::encode(rdata),
    };
    Ok(text)
}

/// Skips over a possibly compressed name returning the position of the
/// data following it.
fn skip_name(data: &[u8], mut pos: usize) -> Result<usize, DnsError> {
    loop {
        let len = *data.get(pos).ok_or(DnsError::Truncated { position: pos })?;
        if len == 0 {
            return Ok(pos + 1);
        }
        if len & 0xc0 == 0xc0 {
            // A compression pointer ends the name.
            return Ok(pos + 2);
        }
        pos += 1 + len as usize;
    }
}

/// Decodes a possibly compressed name.
///
/// # Result
///
/// It returns the name with the labels joined with dots and the position
/// of the data following the name in the message.
fn decode_name(data: &[u8], start: usize) -> Result<(String, usize), DnsError> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = start;
    let mut after = None;
    let mut jumps = 0;
    loop {
        let len = *data.get(pos).ok_or(DnsError::Truncated { position: pos })?;
        if len == 0 {
            break Ok((labels.join("."), after.unwrap_or(pos + 1)));
        }
        if len & 0xc0 == 0xc0 {
            let next = *data
                .get(pos + 1)
                .ok_or(DnsError::Truncated { position: pos })?;
            let target = ((len as usize & 0x3f) << 8) | next as usize;
            after.get_or_insert(pos + 2);
            jumps += 1;
            // A message holds less than 2^6 pointers, anything more is a loop.
            if jumps > 64 {
                return Err(DnsError::PointerLoop { position: pos });
            }
            pos = target;
            continue;
        }
        let end = pos + 1 + len as usize;
        if end > data.len() {
            return Err(DnsError::Truncated { position: pos });
        }
        labels.push(String::from_utf8_lossy(&data[pos + 1..end]).to_string());
        pos = end;
    }
}

#[cfg(test)]
mod tests {
    use super::{Query, Response, RECORD_TYPE_A, RECORD_TYPE_AAAA};

    #[test]
    fn encode_query() {
        let query = Query::new(0x1234, "host.example.com", RECORD_TYPE_A);
        let data = query.encode().unwrap();
        assert_eq!(data[0..2], [0x12, 0x34]);
        // Recursion desired, one question.
        assert_eq!(data[2..4], [0x01, 0x00]);
        assert_eq!(data[4..6], [0, 1]);
        // The question name is fully qualified.
        assert_eq!(
            &data[12..30],
            b"\x04host\x07example\x03com\x00" as &[u8]
        );
        // A, IN.
        assert_eq!(data[30..34], [0, 1, 0, 1]);
    }

    /// Builds a response to a `host.example.com` query with the given
    /// answer records, each referring to the question name through a
    /// compression pointer.
    fn build_response(rcode: u8, answers: &[(u16, &[u8])]) -> Vec<u8> {
        let mut data = vec![
            0x12, 0x34, // id
            0x81, rcode, // flags: response, recursion available, rcode
            0, 1, // qdcount
            0, answers.len() as u8, // ancount
            0, 0, // nscount
            0, 0, // arcount
        ];
        data.extend_from_slice(b"\x04host\x07example\x03com\x00");
        data.extend_from_slice(&[0, 1, 0, 1]);
        for (record_type, rdata) in answers {
            data.extend_from_slice(&[0xc0, 0x0c]); // pointer to the question name
            data.extend_from_slice(&record_type.to_be_bytes());
            data.extend_from_slice(&[0, 1]); // class IN
            data.extend_from_slice(&[0, 0, 0x0e, 0x10]); // ttl 3600
            data.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
            data.extend_from_slice(rdata);
        }
        data
    }

    #[test]
    fn parse_response_with_answer() {
        let data = build_response(0, &[(RECORD_TYPE_A, &[192, 0, 2, 100])]);
        let response = Response::parse(&data).unwrap();
        assert_eq!(response.id, 0x1234);
        assert_eq!(response.rcode, 0);
        assert_eq!(response.answers.len(), 1);
        let answer = &response.answers[0];
        assert_eq!(answer.name, "host.example.com");
        assert_eq!(answer.record_type, RECORD_TYPE_A);
        assert_eq!(answer.ttl, 3600);
        assert_eq!(answer.rdata, "192.0.2.100");
    }

    #[test]
    fn parse_response_with_aaaa_answer() {
        let mut rdata = [0u8; 16];
        rdata[0] = 0x20;
        rdata[1] = 0x01;
        rdata[2] = 0x0d;
        rdata[3] = 0xb8;
        rdata[15] = 5;
        let data = build_response(0, &[(RECORD_TYPE_AAAA, &rdata)]);
        let response = Response::parse(&data).unwrap();
        assert_eq!(response.answers[0].rdata, "2001:db8::5");
    }

    #[test]
    fn parse_response_without_answers() {
        // The answer section must decode as empty, e.g. after a RELEASE
        // removed the registered name.
        let data = build_response(3, &[]);
        let response = Response::parse(&data).unwrap();
        assert_eq!(response.rcode, 3);
        assert!(response.answers.is_empty());
    }

    #[test]
    fn parse_truncated_response() {
        let data = build_response(0, &[(RECORD_TYPE_A, &[192, 0, 2, 100])]);
        let response = Response::parse(&data[..data.len() - 2]);
        assert!(response.is_err());
    }
}
