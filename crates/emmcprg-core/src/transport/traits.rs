//! Byte channel abstraction.
//!
//! Defines the `ByteChannel` trait the engine reads frames from and
//! writes replies to, allowing different implementations (socket, mock,
//! UART or USB glue on a target).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::constants::BULK_PACKET_SIZE;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Channel disconnected")]
    Disconnected,

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Physical channel family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Character UART.
    Serial,
    /// Packetised bulk endpoint (USB).
    Bulk,
}

/// Properties of a channel that change how frames are checked and sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelProfile {
    pub kind: ChannelKind,
    /// Verify inbound CRCs by default.
    pub crc_check: bool,
    /// Channel preserves frame boundaries, so outbound bytes are not
    /// stuffed. Delimiters are still sent.
    pub framing_transparent: bool,
    /// Frames whose wire length is a multiple of this get two extra
    /// delimiters to force a short packet.
    pub packet_granularity: Option<usize>,
}

impl ChannelProfile {
    pub const fn serial() -> Self {
        Self {
            kind: ChannelKind::Serial,
            crc_check: true,
            framing_transparent: false,
            packet_granularity: None,
        }
    }

    pub const fn bulk() -> Self {
        Self {
            kind: ChannelKind::Bulk,
            crc_check: false,
            framing_transparent: false,
            packet_granularity: Some(BULK_PACKET_SIZE),
        }
    }

    pub const fn for_kind(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Serial => Self::serial(),
            ChannelKind::Bulk => Self::bulk(),
        }
    }
}

/// Abstract byte channel.
///
/// Reads never block: `read` returns `Ok(0)` when nothing is pending.
pub trait ByteChannel {
    /// Static properties of this channel.
    fn profile(&self) -> ChannelProfile;

    /// Whether bytes are waiting to be read.
    fn has_data(&mut self) -> bool;

    /// Read whatever is pending into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Queue one byte for transmission.
    fn send_byte(&mut self, byte: u8) -> Result<(), TransportError>;

    /// Queue a run of bytes.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        for &b in bytes {
            self.send_byte(b)?;
        }
        Ok(())
    }

    /// Block until everything queued has left the device.
    fn drain(&mut self) -> Result<(), TransportError>;
}
