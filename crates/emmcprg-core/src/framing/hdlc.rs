//! HDLC-style byte stuffing.
//!
//! Frames are delimited by [`HDLC_END`]. Inside a frame, [`HDLC_ESC`]
//! marks the next byte as XORed with [`HDLC_ESC_MASK`].

use tracing::trace;

use super::pool::{PacketId, PacketPool};
use crate::protocol::constants::*;

/// Outcome of feeding a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Byte stored (or counted) in the in-fill record.
    Stored,
    /// Escape marker seen.
    Escape,
    /// Frame completed and queued for dispatch.
    Queued(PacketId),
    /// Frame delimiter ended a frame too short or too long to queue.
    Discarded { length: usize },
    /// No record available, byte dropped.
    Overrun,
}

/// Totals for a batch of input bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedSummary {
    pub bytes: usize,
    pub queued: usize,
    pub discarded: usize,
    pub overruns: usize,
}

impl FeedSummary {
    fn record(&mut self, feed: Feed) {
        match feed {
            Feed::Queued(_) => self.queued += 1,
            Feed::Discarded { .. } => self.discarded += 1,
            Feed::Overrun => self.overruns += 1,
            Feed::Stored | Feed::Escape => {}
        }
    }
}

/// Receive-side frame assembler.
#[derive(Debug, Default)]
pub struct Deframer {
    current: Option<PacketId>,
    escaped: bool,
    bytes_received: u32,
}

impl Deframer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes seen since construction, including dropped ones.
    pub fn bytes_received(&self) -> u32 {
        self.bytes_received
    }

    /// Record currently being filled, if any.
    pub fn current(&self) -> Option<PacketId> {
        self.current
    }

    fn ensure_current<const N: usize>(&mut self, pool: &mut PacketPool<N>) -> Option<PacketId> {
        if self.current.is_none() {
            self.current = pool.acquire();
        }
        self.current
    }

    /// Feed one byte.
    ///
    /// A record is taken from the pool before the byte is inspected, so
    /// with the pool exhausted every byte (delimiters included) is dropped.
    pub fn feed_byte<const N: usize>(&mut self, pool: &mut PacketPool<N>, byte: u8) -> Feed {
        self.bytes_received = self.bytes_received.wrapping_add(1);

        let Some(id) = self.ensure_current(pool) else {
            return Feed::Overrun;
        };

        match byte {
            HDLC_END => {
                self.escaped = false;
                self.finish_frame(pool, id)
            }
            HDLC_ESC => {
                self.escaped = true;
                Feed::Escape
            }
            _ => {
                let b = if self.escaped { byte ^ HDLC_ESC_MASK } else { byte };
                self.escaped = false;
                pool.record_mut(id).push(b);
                Feed::Stored
            }
        }
    }

    fn finish_frame<const N: usize>(&mut self, pool: &mut PacketPool<N>, id: PacketId) -> Feed {
        let length = pool.record(id).len();
        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&length) {
            // Keep the record for the next frame.
            pool.record_mut(id).clear();
            return Feed::Discarded { length };
        }
        match pool.enqueue(id) {
            Ok(()) => {
                trace!(packet = id.index(), len = length, "Frame queued");
                self.current = None;
                Feed::Queued(id)
            }
            Err(_) => {
                // The in-fill record is always Filling, but never leak it.
                pool.record_mut(id).clear();
                Feed::Discarded { length }
            }
        }
    }

    /// Feed a run of bytes one at a time.
    pub fn feed_bytes<const N: usize>(
        &mut self,
        pool: &mut PacketPool<N>,
        bytes: &[u8],
    ) -> FeedSummary {
        let mut summary = FeedSummary::default();
        for &b in bytes {
            summary.record(self.feed_byte(pool, b));
        }
        summary.bytes = bytes.len();
        summary
    }

    /// Feed a run of bytes, copying four at a time while no word holds a
    /// delimiter or escape byte. Produces exactly the same result as
    /// [`Deframer::feed_bytes`].
    pub fn feed<const N: usize>(&mut self, pool: &mut PacketPool<N>, bytes: &[u8]) -> FeedSummary {
        let mut summary = FeedSummary::default();
        let mut words = bytes.chunks_exact(4);

        for word in words.by_ref() {
            let special = word.iter().any(|&b| b == HDLC_END || b == HDLC_ESC);
            match self.current {
                Some(id) if !special => {
                    self.bytes_received = self.bytes_received.wrapping_add(4);
                    let record = pool.record_mut(id);
                    if self.escaped {
                        record.push(word[0] ^ HDLC_ESC_MASK);
                        record.extend(&word[1..]);
                        self.escaped = false;
                    } else {
                        record.extend(word);
                    }
                }
                _ => {
                    for &b in word {
                        summary.record(self.feed_byte(pool, b));
                    }
                }
            }
        }
        for &b in words.remainder() {
            summary.record(self.feed_byte(pool, b));
        }

        summary.bytes = bytes.len();
        summary
    }
}

/// Stuff `payload` into `out`, escaping delimiter and escape bytes.
/// No frame delimiters are added.
pub fn stuff_into(payload: &[u8], out: &mut Vec<u8>) {
    for &b in payload {
        if b == HDLC_END || b == HDLC_ESC {
            out.push(HDLC_ESC);
            out.push(b ^ HDLC_ESC_MASK);
        } else {
            out.push(b);
        }
    }
}

/// Build a complete wire frame: leading delimiter, stuffed payload and
/// trailing delimiter. Used by host-side tooling and tests.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() * 2 + 2);
    out.push(HDLC_END);
    stuff_into(payload, &mut out);
    out.push(HDLC_END);
    out
}

/// Split a captured byte stream into unstuffed frames. Empty frames
/// (back-to-back delimiters) are skipped.
pub fn decode_frames(stream: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    let mut current = Vec::new();
    let mut escaped = false;
    for &b in stream {
        match b {
            HDLC_END => {
                if !current.is_empty() {
                    frames.push(std::mem::take(&mut current));
                }
                escaped = false;
            }
            HDLC_ESC => escaped = true,
            _ => {
                current.push(if escaped { b ^ HDLC_ESC_MASK } else { b });
                escaped = false;
            }
        }
    }
    frames
}
