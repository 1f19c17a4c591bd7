//! `transport` is a module providing the datagram channel used by the
//! message exchanges.
//!
//! The channel is deliberately simple: one send, one listen window, no
//! retries. A conformance step sends a single query and collects every
//! datagram arriving within the window, because a single query can
//! legitimately yield multiple answers (e.g. the replies relayed by
//! multiple relay agents). Deciding whether the collected answers are
//! the expected ones is the exchange layer's job; an empty collection
//! is not an error here.

use std::{
    io,
    net::{SocketAddr, UdpSocket},
    time::{Duration, Instant},
};

use log::debug;

/// The receive buffer size, large enough for any UDP datagram.
const RECV_BUFFER_SIZE: usize = 65535;

/// A channel exchanging datagrams with the tested server.
#[derive(Debug)]
pub struct UdpChannel {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpChannel {
    /// Opens a channel between the specified addresses.
    ///
    /// # Parameters
    ///
    /// - `local` is the source address and port of the sent datagrams
    /// - `peer` is the address and port of the tested server
    ///
    /// # Errors
    ///
    /// It returns an IO error when the local address can't be bound,
    /// e.g. when the port requires elevated privileges.
    pub fn open(local: SocketAddr, peer: SocketAddr) -> io::Result<UdpChannel> {
        let socket = UdpSocket::bind(local)?;
        if let SocketAddr::V4(_) = peer {
            // The initial v4 exchanges go to the broadcast address.
            socket.set_broadcast(true)?;
        }
        Ok(UdpChannel { socket, peer })
    }

    /// Returns the address of the tested server.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Sends a datagram and collects the replies arriving in the window.
    ///
    /// # Parameters
    ///
    /// - `payload` is the datagram to be sent
    /// - `window` is the listen window length; the exchange layer scales
    ///   it for the slow deployments before calling
    ///
    /// # Result
    ///
    /// It returns every datagram received within the window, in the
    /// arrival order. The window elapsing is a normal outcome: the
    /// returned vector is simply empty, and the caller's presence
    /// assertion decides whether that is a failure.
    pub fn exchange(&self, payload: &[u8], window: Duration) -> io::Result<Vec<Vec<u8>>> {
        self.socket.send_to(payload, self.peer)?;
        debug!(
            "sent {} byte(s) to {}, listening for {:?}",
            payload.len(),
            self.peer,
            window
        );

        let mut replies = Vec::new();
        let mut buffer = vec![0; RECV_BUFFER_SIZE];
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.socket.set_read_timeout(Some(remaining))?;
            match self.socket.recv_from(&mut buffer) {
                Ok((length, source)) => {
                    debug!("received {} byte(s) from {}", length, source);
                    replies.push(buffer[..length].to_vec());
                }
                Err(error)
                    if error.kind() == io::ErrorKind::WouldBlock
                        || error.kind() == io::ErrorKind::TimedOut =>
                {
                    break;
                }
                Err(error) => return Err(error),
            }
        }
        debug!("collected {} repl(ies) within the window", replies.len());
        Ok(replies)
    }
}
