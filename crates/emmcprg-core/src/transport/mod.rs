//! Transport layer module.

pub mod mock;
pub mod traits;

pub use mock::MockChannel;
pub use traits::{ByteChannel, ChannelKind, ChannelProfile, TransportError};
