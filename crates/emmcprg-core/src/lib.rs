//! emmcprg-core: eMMC download protocol engine in Rust.
//!
//! This crate implements the target side of the streaming download
//! protocol used to program an eMMC card (user area, two boot areas and
//! up to four general purpose partitions) over a serial or bulk channel.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, opcodes, response codes, request parsing
//! - **Framing**: HDLC deframer, packet pool, CRC-16, reply buffer
//! - **Transport**: Byte channel abstraction (mock, host glue)
//! - **Storage**: Block device abstraction and in-memory card
//! - **Session**: Session flags, storage controller, MBR/EBR locator
//! - **Engine**: Dispatcher, driving loop and command handlers
//! - **Events**: Observer pattern for front-end decoupling
//!
//! # Example
//!
//! ```no_run
//! use emmcprg_core::{Engine, EngineConfig, MemoryDevice, MockChannel, Status};
//!
//! let channel = MockChannel::serial();
//! let device = MemoryDevice::default();
//! let mut engine = Engine::new(channel, device, EngineConfig::default());
//!
//! loop {
//!     if let Status::Halted(reason) = engine.run_once().expect("channel failed") {
//!         println!("halted: {reason}");
//!         break;
//!     }
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod extension;
pub mod framing;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod transport;
pub mod watchdog;

// Re-exports for convenience
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Halt, HandlerError, Status};
pub use events::{EngineEvent, EngineObserver, LogLevel, NullObserver, TracingObserver};
pub use extension::{Extension, ExtensionReply, MAX_EXTENSIONS};
pub use protocol::{Command, ResponseCode};
pub use session::{LogicalImage, MultiImageMode, OpenMode, StorageController};
pub use storage::{Area, BlockDevice, DeviceInfo, DriverStatus, MemoryDevice, StorageError};
pub use transport::{ByteChannel, ChannelKind, ChannelProfile, MockChannel, TransportError};
pub use watchdog::{NullWatchdog, Watchdog};
