//! Event system for front-end decoupling.
//!
//! Allows a CLI, simulator or test harness to follow the engine without
//! tight coupling to the protocol logic.

use std::fmt;

use crate::protocol::ResponseCode;
use crate::session::LogicalImage;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Frame direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Rx, // Host -> Target
    Tx, // Target -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Rx => write!(f, "RX"),
            PacketDirection::Tx => write!(f, "TX"),
        }
    }
}

/// Why a frame was dropped without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    BadLength,
    BadCrc,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::BadLength => write!(f, "bad length"),
            DropReason::BadCrc => write!(f, "bad CRC"),
        }
    }
}

/// Events emitted by the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Frame sent or received.
    Packet {
        direction: PacketDirection,
        opcode: u8,
        length: usize,
    },
    /// Inbound frame dropped.
    FrameDropped { reason: DropReason, length: usize },
    /// Bytes lost because every packet record was busy.
    WindowOverrun { bytes: usize },
    /// Hello accepted.
    Handshake {
        host_version: u8,
        features: u8,
        sector_addresses: bool,
    },
    /// A logical image was selected for programming.
    ImageSelected { image: LogicalImage, offset: u32 },
    /// Session closed.
    Closed,
    /// Command rejected with an error frame.
    Nak {
        opcode: u8,
        code: ResponseCode,
        message: String,
    },
    /// Data written to the card.
    Written {
        image: LogicalImage,
        sector: u32,
        count: u32,
    },
    /// Log message sent to the host.
    Log { level: LogLevel, message: String },
    /// Target reset requested by the host.
    Reset,
    /// Engine stopped for good.
    Halted { reason: String },
}

/// Observer trait for receiving engine events.
///
/// Implement this trait in your front end to receive updates.
pub trait EngineObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &EngineEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl EngineObserver for NullObserver {
    fn on_event(&self, _event: &EngineEvent) {
        // Do nothing
    }
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl EngineObserver for TracingObserver {
    fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::Packet {
                direction,
                opcode,
                length,
            } => {
                tracing::trace!(
                    dir = %direction,
                    opcode = %format!("0x{:02X}", opcode),
                    len = length,
                    "Frame"
                );
            }
            EngineEvent::FrameDropped { reason, length } => {
                tracing::warn!(reason = %reason, len = length, "Frame dropped");
            }
            EngineEvent::WindowOverrun { bytes } => {
                tracing::warn!(bytes = bytes, "Window overrun");
            }
            EngineEvent::Handshake {
                host_version,
                features,
                sector_addresses,
            } => {
                tracing::info!(
                    host_version = host_version,
                    features = %format!("0x{:02X}", features),
                    sector_addresses = sector_addresses,
                    "Handshake complete"
                );
            }
            EngineEvent::ImageSelected { image, offset } => {
                tracing::info!(image = %image, offset = offset, "Image selected");
            }
            EngineEvent::Closed => {
                tracing::info!("Session closed");
            }
            EngineEvent::Nak {
                opcode,
                code,
                message,
            } => {
                tracing::warn!(
                    opcode = %format!("0x{:02X}", opcode),
                    code = %code,
                    "NAK: {}",
                    message
                );
            }
            EngineEvent::Written {
                image,
                sector,
                count,
            } => {
                tracing::debug!(image = %image, sector = sector, count = count, "Write");
            }
            EngineEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            EngineEvent::Reset => {
                tracing::info!("Target reset");
            }
            EngineEvent::Halted { reason } => {
                tracing::error!(reason = %reason, "Engine halted");
            }
        }
    }
}
