//! Channel side of the engine: receive pool, deframer and reply
//! transmission.
//!
//! Wraps the byte channel so every frame sent is also published to the
//! observer.

use std::sync::Arc;

use tracing::{trace, warn};

use crate::events::{EngineEvent, EngineObserver, LogLevel, PacketDirection};
use crate::framing::{Deframer, FeedSummary, PacketId, PacketPool, ReplyBuffer};
use crate::protocol::ResponseCode;
use crate::protocol::constants::*;
use crate::transport::{ByteChannel, ChannelProfile, TransportError};

/// Log text sent when input was dropped for lack of a packet record.
pub const WINDOW_OVERRUN_MESSAGE: &str = "ERR: Window overrun detected...";

const RX_CHUNK: usize = 256;

pub struct Link<C: ByteChannel, O: EngineObserver> {
    channel: C,
    profile: ChannelProfile,
    pool: PacketPool,
    deframer: Deframer,
    /// Reply under construction. Log and error frames reuse it.
    pub reply: ReplyBuffer,
    observer: Arc<O>,
    poll_during_transmit: bool,
    /// Bytes dropped since the last overrun report.
    overrun_bytes: usize,
    rx: [u8; RX_CHUNK],
}

impl<C: ByteChannel, O: EngineObserver> Link<C, O> {
    pub fn new(channel: C, observer: Arc<O>, poll_during_transmit: bool) -> Self {
        let profile = channel.profile();
        Self {
            channel,
            profile,
            pool: PacketPool::new(),
            deframer: Deframer::new(),
            reply: ReplyBuffer::new(),
            observer,
            poll_during_transmit,
            overrun_bytes: 0,
            rx: [0; RX_CHUNK],
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn profile(&self) -> ChannelProfile {
        self.profile
    }

    pub fn pool(&self) -> &PacketPool {
        &self.pool
    }

    pub fn bytes_received(&self) -> u32 {
        self.deframer.bytes_received()
    }

    /// Move every pending input byte into the packet pool.
    ///
    /// Overruns are only counted here; [`Link::report_overruns`] tells the
    /// host once no reply is being transmitted.
    pub fn receive(&mut self) -> Result<FeedSummary, TransportError> {
        let mut total = FeedSummary::default();
        while self.channel.has_data() {
            let n = self.channel.read(&mut self.rx)?;
            if n == 0 {
                break;
            }
            let summary = self.deframer.feed(&mut self.pool, &self.rx[..n]);
            total.bytes += summary.bytes;
            total.queued += summary.queued;
            total.discarded += summary.discarded;
            total.overruns += summary.overruns;
        }
        if total.overruns > 0 {
            self.overrun_bytes += total.overruns;
        }
        Ok(total)
    }

    /// Send one log frame for all input dropped since the last report.
    pub fn report_overruns(&mut self) -> Result<(), TransportError> {
        if self.overrun_bytes == 0 {
            return Ok(());
        }
        let bytes = std::mem::take(&mut self.overrun_bytes);
        self.observer
            .on_event(&EngineEvent::WindowOverrun { bytes });
        self.send_log(WINDOW_OVERRUN_MESSAGE)
    }

    /// Take the oldest waiting frame, copying it into `frame`.
    ///
    /// Returns the record and the frame length as counted by the
    /// deframer, which may exceed what was copied for oversized frames.
    pub fn dequeue(&mut self, frame: &mut [u8]) -> Option<(PacketId, usize)> {
        let id = self.pool.dequeue()?;
        let record = self.pool.record(id);
        let bytes = record.bytes();
        let copied = bytes.len().min(frame.len());
        frame[..copied].copy_from_slice(&bytes[..copied]);
        Some((id, record.len()))
    }

    /// Return a processed record to the free pool.
    pub fn release(&mut self, id: PacketId) {
        if let Err(e) = self.pool.release(id) {
            warn!(error = %e, "Packet record not released");
        }
    }

    /// Append the CRC to the reply and transmit it.
    pub fn send_reply(&mut self) -> Result<(), TransportError> {
        self.reply.append_crc();
        self.transmit()
    }

    /// Send a log frame.
    pub fn send_log(&mut self, message: &str) -> Result<(), TransportError> {
        self.observer.on_event(&EngineEvent::Log {
            level: LogLevel::Info,
            message: message.to_string(),
        });
        self.reply.log_frame(message);
        self.send_reply()
    }

    /// Send a log frame carrying `message`, then an error frame.
    pub fn send_error(&mut self, code: ResponseCode, message: &str) -> Result<(), TransportError> {
        self.send_log(message)?;
        self.reply.error_frame(code, message);
        self.send_reply()
    }

    /// Put the reply buffer on the wire.
    ///
    /// The channel is polled before the frame, every
    /// [`TX_POLL_INTERVAL`] bytes and before the closing delimiter.
    fn transmit(&mut self) -> Result<(), TransportError> {
        let stuff = !self.profile.framing_transparent;
        let mut wire_len = 0usize;

        self.poll_while_sending()?;
        self.channel.send_byte(HDLC_END)?;
        wire_len += 1;

        for i in 0..self.reply.len() {
            if i % TX_POLL_INTERVAL == TX_POLL_INTERVAL - 1 {
                self.poll_while_sending()?;
            }
            let b = self.reply.as_bytes()[i];
            if stuff && (b == HDLC_END || b == HDLC_ESC) {
                self.channel.send_byte(HDLC_ESC)?;
                self.channel.send_byte(b ^ HDLC_ESC_MASK)?;
                wire_len += 2;
            } else {
                self.channel.send_byte(b)?;
                wire_len += 1;
            }
        }

        self.poll_while_sending()?;
        self.channel.send_byte(HDLC_END)?;
        wire_len += 1;

        // Force a short packet on channels that cannot signal end of data.
        if let Some(granularity) = self.profile.packet_granularity
            && wire_len % granularity == 0
        {
            self.channel.send_byte(HDLC_END)?;
            self.channel.send_byte(HDLC_END)?;
            wire_len += 2;
        }

        let opcode = self.reply.opcode().unwrap_or_default();
        trace!(opcode = opcode, wire_len = wire_len, "Frame sent");
        self.observer.on_event(&EngineEvent::Packet {
            direction: PacketDirection::Tx,
            opcode,
            length: self.reply.len(),
        });
        Ok(())
    }

    fn poll_while_sending(&mut self) -> Result<(), TransportError> {
        if self.poll_during_transmit {
            self.receive()?;
        }
        Ok(())
    }

    /// Block until every transmitted byte has left the channel.
    pub fn drain(&mut self) -> Result<(), TransportError> {
        self.channel.drain()
    }
}
