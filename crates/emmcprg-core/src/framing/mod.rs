//! Framing layer: deframing, packet pool, CRC and reply construction.

pub mod crc;
pub mod hdlc;
pub mod pool;
pub mod reply;

pub use hdlc::{Deframer, Feed, FeedSummary, decode_frames, encode_frame};
pub use pool::{PacketId, PacketPool, PacketRecord, PoolError, SlotState};
pub use reply::{ReplyBuffer, ReplyOverrun};
