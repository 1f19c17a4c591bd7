//! `buffer` is a module that provides mechanics for manipulating the data
//! in the processed packets.
//!
//! The [`ReceiveBuffer`] reads the formatted data from the packets returned
//! by the tested server. The [`TransmitBuffer`] appends the formatted data
//! to the outbound packets. Both use the network byte order.

use std::{
    io::{self, BufRead, Cursor, Read},
    net::{Ipv4Addr, Ipv6Addr},
    str::from_utf8,
    vec,
};
use thiserror::Error;

type Result<T> = std::result::Result<T, BufferError>;

/// Represents errors returned by the functions processing the buffers.
#[derive(Debug, Error, PartialEq)]
pub enum BufferError {
    /// An error returned upon an attempt to read from the buffer when the
    /// read position is out of bounds or when the buffer is too short.
    #[error("out of bounds buffer read attempt at position: {read_position:?}, read length: {read_length:?}, buffer length: {buffer_length:?}")]
    ReadOutOfBounds {
        /// The read start offset in the buffer.
        read_position: u32,
        /// The read length.
        read_length: usize,
        /// The total buffer length.
        buffer_length: usize,
    },
    /// An error returned upon an attempt to read a string from the buffer,
    /// when the string is not a valid UTF-8 string.
    #[error("error converting packet data into a utf8 string at position: {read_position:?}, read length: {read_length:?}")]
    ReadUtf8Conversion {
        /// The read start offset in the buffer.
        read_position: u32,
        /// The read length.
        read_length: usize,
    },
    #[error("unknown error while reading from the packet buffer")]
    /// An unknown IO error during the buffer read.
    Unknown,
}

/// Wraps a number ensuring it is within a desired range.
///
/// Some numbers in the parsed packets must be within certain ranges. For example,
/// the `hlen` in a `bootp` packet must be in the range of 1 to 16. If the number
/// is out of range (e.g., `hlen` greater than 16), it must be "clamped". Using an
/// out of range number would cause parsing errors and pose a risk of invalid memory
/// access. Thus, any number greater than the maximum is set to the maximum. Any number
/// lower than the minimum is set to the minimum. A number within the range is left
/// unchanged.
#[derive(Clone, Debug)]
pub struct ClampedNumber<T: PartialOrd> {
    actual: T,
    clamped: T,
}

impl<T: PartialOrd + Copy> ClampedNumber<T> {
    /// Instantiates the number with clamping.
    pub fn new(min: T, max: T, actual: T) -> ClampedNumber<T> {
        let clamped = match actual {
            actual if actual < min => min,
            actual if actual > max => max,
            _ => actual,
        };
        ClampedNumber::<T> { actual, clamped }
    }

    /// Returns the clamped number (the number in range).
    pub fn get(&self) -> T {
        self.clamped
    }

    /// Checks if the original number was out of range and had to be clamped.
    pub fn out_of_range(&self) -> bool {
        self.clamped != self.actual
    }
}

/// Represents a buffer holding received data.
///
/// It provides the functions to read the formatted data from the buffer. It allows
/// for reading the data using a random access index. It means that the data can
/// be accessed selectively, without a need to parse the entire packet. Depending
/// on the packet structure, the data can be read as 1, 2 or 4 byte numbers with a
/// conversion from network to host byte order. The data can also be read as variable
/// length slices or strings.
///
/// The caller must know the positions of the desired data fields. The functions reading
/// the data seek to the specified positions. If the specified position or the read
/// data length are out of bounds the [`BufferError::ReadOutOfBounds`] error is returned.
#[derive(Clone, Debug)]
pub struct ReceiveBuffer<'a> {
    buffer: &'a [u8],
}

impl<'a> ReceiveBuffer<'a> {
    /// Instantiates a buffer from a data slice.
    pub fn new(data: &'a [u8]) -> ReceiveBuffer<'a> {
        ReceiveBuffer { buffer: data }
    }

    /// Returns the total buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Checks if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Attempts to read an array of bytes from the buffer.
    ///
    /// # Parameters
    ///
    /// - `N` is a number of bytes to read
    /// - `pos` is a read start position, where 0 is the first byte in the buffer
    ///
    /// # Result
    ///
    /// It returns a result with an array of bytes. If the position is out of bounds or
    /// the length spans beyond the end of the buffer it returns the [`BufferError::ReadOutOfBounds`]
    /// error.
    fn read<const N: usize>(&self, pos: u32) -> Result<[u8; N]> {
        let mut cursor = Cursor::new(self.buffer);
        cursor.set_position(u64::from(pos));
        let mut buf: [u8; N] = [0; N];
        cursor
            .read_exact(&mut buf)
            .map(|_| buf)
            .map_err(|err| match err.kind() {
                io::ErrorKind::UnexpectedEof => BufferError::ReadOutOfBounds {
                    read_position: pos,
                    read_length: N,
                    buffer_length: self.buffer.len(),
                },
                _ => BufferError::Unknown,
            })
    }

    /// Attempts to read a vector of bytes from the buffer.
    ///
    /// This function variant reads variable length data from the buffer.
    /// If the number of bytes between the `pos` and the end of the buffer
    /// is lower than `len`, the function reads the remaining bytes until
    /// the end of the buffer. It means that the actual data length can be
    /// lower than the specified length value.
    ///
    /// # Parameters
    ///
    /// - `pos` is a read start position, where 0 is the first byte in the buffer
    /// - `len` is a number of bytes to read
    ///
    /// # Result
    ///
    /// It returns a vector of bytes that can be shorter than the desired
    /// length. If the `pos` is out of bounds, it returns the [`BufferError::ReadOutOfBounds`]
    /// error.
    pub fn read_vec(&self, pos: u32, len: usize) -> Result<Vec<u8>> {
        // We must not read from outside of the buffer.
        if pos >= self.buffer.len() as u32 {
            return Err(BufferError::ReadOutOfBounds {
                read_position: pos,
                read_length: len,
                buffer_length: self.buffer.len(),
            });
        }
        let mut len = len;
        if pos as usize + len > self.buffer.len() {
            // The buffer is not long enough. Let's read until the end of the buffer.
            len = self.buffer.len() - pos as usize;
        }
        let mut cursor = Cursor::new(self.buffer);
        cursor.set_position(u64::from(pos));
        let mut buf: Vec<u8> = vec![0; len];
        cursor
            .read_exact(&mut buf)
            .map(|_| buf)
            .map_err(|err| match err.kind() {
                io::ErrorKind::UnexpectedEof => BufferError::ReadOutOfBounds {
                    read_position: pos,
                    read_length: len,
                    buffer_length: self.buffer.len(),
                },
                _ => BufferError::Unknown,
            })
    }

    /// Attempts to read from a buffer into a string.
    ///
    /// This function is applicable for reading the null-terminated strings from a
    /// buffer when the strings also have maximum length specified in the protocol.
    /// For example, the `sname` field in the `bootp` protocol can hold a null-terminated
    /// string that has a maximum length of 64 bytes.
    ///
    /// In practice, the strings sometimes lack the null character at the end. In these
    /// cases, the function reads all `max_len` bytes or all bytes until the end of the
    /// buffer.
    ///
    /// # Parameters
    ///
    /// - `pos` is a read start position, where 0 is the first byte in the buffer
    /// - `max_len` is a maximum number of bytes to read (if null character is not found)
    ///
    /// # Result
    ///
    /// It returns a string converted from UTF-8. If such the conversion fails it returns the
    /// [`BufferError::ReadUtf8Conversion`] error. If the `pos` is out of bounds, it returns
    /// the [`BufferError::ReadOutOfBounds`].
    pub fn read_null_terminated(&self, pos: u32, max_len: usize) -> Result<String> {
        // We must not read from outside of the buffer.
        if pos >= self.buffer.len() as u32 {
            return Err(BufferError::ReadOutOfBounds {
                read_position: pos,
                read_length: max_len,
                buffer_length: self.buffer.len(),
            });
        }
        let mut cursor = Cursor::new(self.buffer);
        cursor.set_position(u64::from(pos));
        let mut buf = Vec::<u8>::new();
        // Read until we hit null (zero).
        match cursor.read_until(0, &mut buf) {
            Ok(bytes_read) => {
                if bytes_read > max_len {
                    buf.resize(max_len, 0);
                } else if *buf.last().unwrap_or(&0xff) == 0 {
                    buf.resize(buf.len() - 1, 0)
                }
                match from_utf8(&buf) {
                    Ok(s) => Ok(s.to_owned()),
                    Err(_) => Err(BufferError::ReadUtf8Conversion {
                        read_position: pos,
                        read_length: max_len,
                    }),
                }
            }
            Err(_) => Err(BufferError::Unknown),
        }
    }

    /// Attempts to read a u8 number from the buffer.
    ///
    /// # Parameters
    ///
    /// - `pos` is a read start position
    ///
    /// # Result
    ///
    /// It returns a byte read from the buffer. If the specified position is out
    /// of bounds the [`BufferError::ReadOutOfBounds`] is returned.
    pub fn read_u8(&self, pos: u32) -> Result<u8> {
        self.read::<1>(pos).map(|buf| buf[0])
    }

    /// Attempts to read a u16 number from the buffer.
    ///
    /// # Parameters
    ///
    /// - `pos` is a read start position, where 0 is the first byte in the buffer
    ///
    /// # Result
    ///
    /// It returns two bytes converted from the network to host byte order.
    /// If the specified position is out of bounds the [`BufferError::ReadOutOfBounds`]
    /// is returned.
    pub fn read_u16(&self, pos: u32) -> Result<u16> {
        self.read::<2>(pos).map(u16::from_be_bytes)
    }

    /// Attempts to read a u32 number from the buffer.
    ///
    /// # Parameters
    ///
    /// - `pos` is a read start position, where 0 is the first byte in the buffer
    ///
    /// # Result
    ///
    /// It returns four bytes converted from the network to host byte order.
    /// If the specified position is out of bounds the [`BufferError::ReadOutOfBounds`]
    /// is returned.
    pub fn read_u32(&self, pos: u32) -> Result<u32> {
        self.read::<4>(pos).map(u32::from_be_bytes)
    }

    /// Attempts to read an IPv4 address from the buffer.
    ///
    /// # Parameters
    ///
    /// - `pos` is a read start position, where 0 is the first byte in the buffer
    ///
    /// It reads 4 bytes and converts them to an IPv4 address. If the specified
    /// position is out of bounds the [`BufferError::ReadOutOfBounds`] is returned.
    pub fn read_ipv4(&self, pos: u32) -> Result<Ipv4Addr> {
        self.read::<4>(pos)
            .map(|buf| Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]))
    }

    /// Attempts to read an IPv6 address from the buffer.
    ///
    /// # Parameters
    ///
    /// - `pos` is a read start position, where 0 is the first byte in the buffer
    ///
    /// It reads 16 bytes and converts them to an IPv6 address. If the specified
    /// position is out of bounds the [`BufferError::ReadOutOfBounds`] is returned.
    pub fn read_ipv6(&self, pos: u32) -> Result<Ipv6Addr> {
        self.read::<16>(pos).map(Ipv6Addr::from)
    }
}

/// Represents a buffer holding data to be transmitted.
///
/// The buffer grows as the formatted data is appended at its end. Unlike
/// the reads from the [`ReceiveBuffer`], the writes are infallible because
/// the buffer allocates the required space. The numbers are converted from
/// the host to network byte order.
#[derive(Clone, Debug, Default)]
pub struct TransmitBuffer {
    buffer: Vec<u8>,
}

impl TransmitBuffer {
    /// Instantiates an empty buffer.
    pub fn new() -> TransmitBuffer {
        TransmitBuffer::default()
    }

    /// Returns the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Checks if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Appends a u8 number to the buffer.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Appends a u16 number to the buffer in the network byte order.
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a u32 number to the buffer in the network byte order.
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a slice of bytes to the buffer.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Appends an IPv4 address to the buffer.
    pub fn write_ipv4(&mut self, addr: &Ipv4Addr) {
        self.buffer.extend_from_slice(&addr.octets());
    }

    /// Appends an IPv6 address to the buffer.
    pub fn write_ipv6(&mut self, addr: &Ipv6Addr) {
        self.buffer.extend_from_slice(&addr.octets());
    }

    /// Appends a slice of bytes padded with zeros to a fixed length.
    ///
    /// This function is applicable for the fixed length fields like the
    /// `chaddr`, `sname` or `file` in the `bootp` packets. When the data
    /// is longer than the field it is truncated to the field length.
    ///
    /// # Parameters
    ///
    /// - `data` is the data to be written
    /// - `field_len` is the fixed field length
    pub fn write_padded(&mut self, data: &[u8], field_len: usize) {
        let len = data.len().min(field_len);
        self.buffer.extend_from_slice(&data[..len]);
        self.buffer.resize(self.buffer.len() + field_len - len, 0);
    }

    /// Consumes the buffer returning the underlying data.
    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }
}
