//! TCP socket channel.
//!
//! Host tools that speak the download protocol over a network bridge
//! connect here instead of a UART or USB endpoint.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;

use emmcprg_core::{ByteChannel, ChannelProfile, TransportError};
use tracing::{debug, trace};

/// Outbound bytes are buffered up to this size before a write.
const TX_CHUNK: usize = 4096;

/// Non-blocking socket channel.
pub struct TcpChannel {
    stream: TcpStream,
    profile: ChannelProfile,
    tx: Vec<u8>,
    /// Peer closed the connection or a write failed.
    closed: bool,
}

impl TcpChannel {
    pub fn new(stream: TcpStream, profile: ChannelProfile) -> Result<Self, TransportError> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        debug!(peer = ?stream.peer_addr().ok(), kind = ?profile.kind, "Channel opened");
        Ok(Self {
            stream,
            profile,
            tx: Vec::with_capacity(TX_CHUNK),
            closed: false,
        })
    }

    /// Push buffered output to the socket.
    fn flush_tx(&mut self) -> Result<(), TransportError> {
        let mut written = 0;
        while written < self.tx.len() {
            match self.stream.write(&self.tx[written..]) {
                Ok(0) => {
                    self.closed = true;
                    return Err(TransportError::Disconnected);
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::yield_now(),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.closed = true;
                    return Err(TransportError::WriteFailed(e.to_string()));
                }
            }
        }
        trace!(bytes = written, "Flushed");
        self.tx.clear();
        Ok(())
    }
}

impl ByteChannel for TcpChannel {
    fn profile(&self) -> ChannelProfile {
        self.profile
    }

    fn has_data(&mut self) -> bool {
        // Output is flushed whenever the engine looks for input, which it
        // does between frames and while transmitting.
        if !self.tx.is_empty() && self.flush_tx().is_err() {
            return true;
        }
        if self.closed {
            return true;
        }
        let mut peeked = [0u8; 1];
        match self.stream.peek(&mut peeked) {
            Ok(0) => {
                self.closed = true;
                true
            }
            Ok(_) => true,
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(_) => true,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        match self.stream.read(buf) {
            Ok(0) => {
                self.closed = true;
                Err(TransportError::Disconnected)
            }
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(0),
            Err(e) => Err(TransportError::ReadFailed(e.to_string())),
        }
    }

    fn send_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        self.tx.push(byte);
        if self.tx.len() >= TX_CHUNK {
            self.flush_tx()?;
        }
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.tx.extend_from_slice(bytes);
        if self.tx.len() >= TX_CHUNK {
            self.flush_tx()?;
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), TransportError> {
        self.flush_tx()?;
        self.stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    fn pair() -> (TcpChannel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (
            TcpChannel::new(server, ChannelProfile::serial()).unwrap(),
            client,
        )
    }

    fn wait_for_data(channel: &mut TcpChannel) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !channel.has_data() {
            assert!(Instant::now() < deadline, "no data arrived");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_read_nothing_pending() {
        let (mut channel, _client) = pair();
        assert!(!channel.has_data());
        let mut buf = [0u8; 16];
        assert_eq!(channel.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_round_trip() {
        let (mut channel, mut client) = pair();
        client.write_all(&[0x7E, 0x09, 0x7E]).unwrap();
        wait_for_data(&mut channel);

        let mut buf = [0u8; 16];
        let mut got = Vec::new();
        while got.len() < 3 {
            let n = channel.read(&mut buf).unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, vec![0x7E, 0x09, 0x7E]);

        channel.send(&[0x7E, 0x0A]).unwrap();
        channel.send_byte(0x7E).unwrap();
        channel.drain().unwrap();

        let mut reply = [0u8; 3];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(reply, [0x7E, 0x0A, 0x7E]);
    }

    #[test]
    fn test_peer_close_is_disconnect() {
        let (mut channel, client) = pair();
        drop(client);
        wait_for_data(&mut channel);
        let mut buf = [0u8; 4];
        assert!(matches!(
            channel.read(&mut buf),
            Err(TransportError::Disconnected)
        ));
    }
}
