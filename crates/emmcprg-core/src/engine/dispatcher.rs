//! Command dispatcher and driving loop.

use std::sync::Arc;

use tracing::{debug, error, instrument, trace, warn};

use super::handlers::{HandleResult, HandlerContext, handle_command};
use super::link::Link;
use crate::config::EngineConfig;
use crate::error::{Halt, HandlerError, Status};
use crate::events::{DropReason, EngineEvent, EngineObserver, PacketDirection, TracingObserver};
use crate::extension::{Extension, ExtensionError, ExtensionReply, ExtensionTable};
use crate::framing::FeedSummary;
use crate::framing::crc::verify_stepped;
use crate::protocol::constants::*;
use crate::protocol::{Command, ResponseCode};
use crate::session::{SessionState, StorageController};
use crate::storage::BlockDevice;
use crate::transport::{ByteChannel, TransportError};
use crate::watchdog::{NullWatchdog, Suspended, Watchdog};

/// Log text sent when an inbound CRC does not match.
pub const CRC_INVALID_MESSAGE: &str = "ERR: CRC invalid";
const REPLY_OVERRUN_MESSAGE: &str = "Internal error - reply_buffer overrun";

/// Download protocol engine.
///
/// Owns the channel, the storage controller and all session state.
/// Single threaded: drive it by calling [`Engine::run_once`] in a loop.
pub struct Engine<C: ByteChannel, D: BlockDevice, O: EngineObserver> {
    link: Link<C, O>,
    /// Frame being dispatched, copied out of its packet record.
    frame: [u8; MAX_PACKET_SIZE],
    session: SessionState,
    storage: StorageController<D>,
    extensions: ExtensionTable,
    extension_reply: ExtensionReply,
    observer: Arc<O>,
    watchdog: Arc<dyn Watchdog>,
    crc_check: bool,
    halted: Option<Halt>,
}

impl<C: ByteChannel, D: BlockDevice> Engine<C, D, TracingObserver> {
    /// Create an engine with the default tracing observer.
    pub fn new(channel: C, device: D, config: EngineConfig) -> Self {
        Self::with_observer(channel, device, config, Arc::new(TracingObserver))
    }
}

impl<C: ByteChannel, D: BlockDevice, O: EngineObserver> Engine<C, D, O> {
    /// Create an engine with a custom observer.
    pub fn with_observer(channel: C, device: D, config: EngineConfig, observer: Arc<O>) -> Self {
        let crc_check = config.crc_enabled(&channel.profile());
        let watchdog: Arc<dyn Watchdog> = Arc::new(NullWatchdog);
        debug!(
            channel = ?channel.profile().kind,
            crc_check = crc_check,
            "Engine created"
        );
        Self {
            link: Link::new(channel, observer.clone(), config.poll_during_transmit),
            frame: [0; MAX_PACKET_SIZE],
            session: SessionState::new(config.require_partition_table),
            storage: StorageController::new(device, watchdog.clone()),
            extensions: ExtensionTable::new(),
            extension_reply: ExtensionReply::new(),
            observer,
            watchdog,
            crc_check,
            halted: None,
        }
    }

    /// Use the board's watchdog instead of none.
    pub fn with_watchdog(mut self, watchdog: Arc<dyn Watchdog>) -> Self {
        self.storage.set_watchdog(watchdog.clone());
        self.watchdog = watchdog;
        self
    }

    /// Register an extension for opcodes above the built-in range.
    pub fn register_extension(
        &mut self,
        extension: Box<dyn Extension>,
    ) -> Result<usize, ExtensionError> {
        self.extensions.register(extension)
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn storage(&self) -> &StorageController<D> {
        &self.storage
    }

    pub fn channel(&self) -> &C {
        self.link.channel()
    }

    pub fn channel_mut(&mut self) -> &mut C {
        self.link.channel_mut()
    }

    /// Bytes received on the channel since the engine was created.
    pub fn bytes_received(&self) -> u32 {
        self.link.bytes_received()
    }

    pub fn crc_check(&self) -> bool {
        self.crc_check
    }

    /// Terminal condition, once reached.
    pub fn halted(&self) -> Option<Halt> {
        self.halted
    }

    /// Move pending input into the packet pool and report any overrun.
    pub fn poll_input(&mut self) -> Result<FeedSummary, TransportError> {
        let summary = self.link.receive()?;
        if summary.bytes > 0 {
            trace!(
                bytes = summary.bytes,
                queued = summary.queued,
                "Input polled"
            );
        }
        self.link.report_overruns()?;
        Ok(summary)
    }

    /// One iteration of the driving loop: poll the channel with the
    /// watchdog suspended, then process every waiting frame.
    pub fn run_once(&mut self) -> Result<Status, TransportError> {
        if let Some(halt) = self.halted {
            return Ok(Status::Halted(halt));
        }
        {
            let watchdog = self.watchdog.clone();
            let _wd = Suspended::new(&*watchdog);
            self.poll_input()?;
        }
        self.process()
    }

    /// Drive the engine until it halts.
    #[instrument(skip(self))]
    pub fn run(&mut self) -> Result<Halt, TransportError> {
        loop {
            if let Status::Halted(halt) = self.run_once()? {
                return Ok(halt);
            }
        }
    }

    /// Process every frame on the waiting queue.
    pub fn process(&mut self) -> Result<Status, TransportError> {
        if let Some(halt) = self.halted {
            return Ok(Status::Halted(halt));
        }
        self.link.receive()?;

        let mut processed = 0;
        while let Some((id, length)) = self.link.dequeue(&mut self.frame) {
            let outcome = self.process_frame(length);
            self.link.release(id);
            processed += 1;

            if let Some(halt) = outcome? {
                error!(reason = %halt, "Engine halted");
                self.observer.on_event(&EngineEvent::Halted {
                    reason: halt.to_string(),
                });
                self.halted = Some(halt);
                return Ok(Status::Halted(halt));
            }
            self.link.report_overruns()?;
        }

        Ok(if processed == 0 {
            Status::Idle
        } else {
            Status::Processed(processed)
        })
    }

    /// Validate and dispatch the frame in `self.frame`.
    fn process_frame(&mut self, length: usize) -> Result<Option<Halt>, TransportError> {
        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&length) {
            debug!(len = length, "Frame length out of range");
            self.observer.on_event(&EngineEvent::FrameDropped {
                reason: DropReason::BadLength,
                length,
            });
            return Ok(None);
        }

        if self.crc_check && !self.verify_crc(length)? {
            warn!(len = length, "Frame CRC invalid");
            self.observer.on_event(&EngineEvent::FrameDropped {
                reason: DropReason::BadCrc,
                length,
            });
            self.link.send_log(CRC_INVALID_MESSAGE)?;
            return Ok(None);
        }
        let len = length - CRC_SIZE;
        let frame = &self.frame[..len];
        let opcode = frame[0];

        self.observer.on_event(&EngineEvent::Packet {
            direction: PacketDirection::Rx,
            opcode,
            length: len,
        });

        if opcode > LAST_COMMAND {
            if let Some(slot) = self.extensions.dispatch(frame, &mut self.extension_reply) {
                debug!(opcode = opcode, slot = slot, "Command handled by extension");
                if self.extension_reply.is_empty() {
                    return Ok(None);
                }
                if let Err(e) = self.link.reply.load(self.extension_reply.as_bytes()) {
                    error!(error = %e, "Extension reply too large");
                    self.link
                        .send_error(ResponseCode::Failed, REPLY_OVERRUN_MESSAGE)?;
                    return Ok(Some(Halt::ReplyOverrun));
                }
                self.link.send_reply()?;
                return Ok(None);
            }
        }

        let command = Command::from_opcode(opcode)
            .filter(|c| self.session.handshake_done || c.allowed_before_handshake())
            .unwrap_or(Command::Invalid);
        trace!(opcode = opcode, command = ?command, "Dispatch");

        let mut ctx = HandlerContext {
            link: &mut self.link,
            session: &mut self.session,
            storage: &mut self.storage,
            extensions: &mut self.extensions,
            observer: &*self.observer,
            watchdog: &*self.watchdog,
        };

        match handle_command(command, frame, &mut ctx) {
            Ok(HandleResult::Reply) => {
                ctx.link.send_reply()?;
                Ok(None)
            }
            Ok(HandleResult::Done) => Ok(None),
            Ok(HandleResult::Halt(halt)) => Ok(Some(halt)),
            Err(HandlerError::Nak { code, message }) => {
                warn!(opcode = opcode, code = %code, "NAK: {}", message);
                ctx.emit(EngineEvent::Nak {
                    opcode,
                    code,
                    message: message.clone(),
                });
                ctx.link.send_error(code, &message)?;
                Ok(None)
            }
            Err(HandlerError::Overrun(e)) => {
                error!(opcode = opcode, error = %e, "Reply buffer overrun");
                ctx.link
                    .send_error(ResponseCode::Failed, REPLY_OVERRUN_MESSAGE)?;
                Ok(Some(Halt::ReplyOverrun))
            }
            Err(HandlerError::Transport(e)) => Err(e),
        }
    }

    /// Check the trailing CRC, polling the channel between steps.
    fn verify_crc(&mut self, length: usize) -> Result<bool, TransportError> {
        let link = &mut self.link;
        let mut poll_error = None;
        let valid = verify_stepped(&self.frame[..length], || {
            if poll_error.is_none()
                && let Err(e) = link.receive()
            {
                poll_error = Some(e);
            }
        });
        match poll_error {
            Some(e) => Err(e),
            None => Ok(valid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::storage::MemoryDevice;
    use crate::transport::MockChannel;
    use crate::watchdog::CountingWatchdog;

    fn engine(mock: &MockChannel) -> Engine<MockChannel, MemoryDevice, NullObserver> {
        Engine::with_observer(
            mock.clone(),
            MemoryDevice::new(256, 16),
            EngineConfig::default(),
            Arc::new(NullObserver),
        )
    }

    #[test]
    fn test_idle_without_input() {
        let mock = MockChannel::serial();
        let mut engine = engine(&mock);
        assert_eq!(engine.run_once().unwrap(), Status::Idle);
        assert!(mock.sent().is_empty());
    }

    #[test]
    fn test_poll_runs_with_watchdog_suspended() {
        let mock = MockChannel::serial();
        let watchdog = Arc::new(CountingWatchdog::new());
        let mut engine = engine(&mock).with_watchdog(watchdog.clone());

        assert_eq!(engine.run_once().unwrap(), Status::Idle);
        assert_eq!(watchdog.suspends(), 1);
        assert_eq!(watchdog.outstanding(), 0);

        engine.run_once().unwrap();
        assert_eq!(watchdog.suspends(), 2);
        assert_eq!(watchdog.outstanding(), 0);
    }

    #[test]
    fn test_crc_follows_channel_and_config() {
        assert!(engine(&MockChannel::serial()).crc_check());
        assert!(!engine(&MockChannel::bulk()).crc_check());

        let config = EngineConfig {
            crc_check: Some(true),
            ..Default::default()
        };
        let bulk = Engine::with_observer(
            MockChannel::bulk(),
            MemoryDevice::default(),
            config,
            Arc::new(NullObserver),
        );
        assert!(bulk.crc_check());
    }

    #[test]
    fn test_nop_before_handshake_is_invalid() {
        let mock = MockChannel::serial();
        let mut engine = engine(&mock);
        mock.push_request(&[CMD_NOP, 1, 2]);
        assert_eq!(engine.run_once().unwrap(), Status::Processed(1));

        let frames = mock.take_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][0], CMD_LOG);
        assert_eq!(frames[1][0], CMD_ERROR);
        assert_eq!(&frames[1][1..5], &5u32.to_le_bytes());
        assert_eq!(&frames[1][5..frames[1].len() - 2], b"Invalid Command");
    }

    #[test]
    fn test_bad_crc_dropped_with_log() {
        let mock = MockChannel::serial();
        let mut engine = engine(&mock);
        mock.push_frame(&[CMD_NOP, 1, 2, 0x00, 0x00]);
        engine.run_once().unwrap();

        let frames = mock.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][0], CMD_LOG);
        assert!(frames[0][1..].starts_with(CRC_INVALID_MESSAGE.as_bytes()));
    }

    #[test]
    fn test_short_frame_ignored() {
        let mock = MockChannel::serial();
        let mut engine = engine(&mock);
        mock.push_frame(&[CMD_NOP, 1]);
        assert_eq!(engine.run_once().unwrap(), Status::Idle);
        assert!(mock.sent().is_empty());
    }

    #[test]
    fn test_zero_opcode_is_invalid() {
        let mock = MockChannel::bulk();
        let mut engine = engine(&mock);
        mock.push_frame(&[0x00, 0xAA, 0xBB]);
        engine.run_once().unwrap();
        let frames = mock.take_frames();
        assert_eq!(frames.last().unwrap()[0], CMD_ERROR);
    }

    #[test]
    fn test_halt_is_sticky() {
        let mock = MockChannel::serial();
        let mut engine = engine(&mock);
        engine.halted = Some(Halt::Reset);
        mock.push_request(&[CMD_NOP]);
        assert_eq!(engine.run_once().unwrap(), Status::Halted(Halt::Reset));
        assert!(mock.sent().is_empty());
        assert!(mock.pending_input() > 0);
    }

    #[test]
    fn test_disconnect_surfaces_error() {
        let mock = MockChannel::serial();
        let mut engine = engine(&mock);
        mock.push_request(&[CMD_NOP]);
        mock.disconnect();
        assert!(matches!(
            engine.run_once(),
            Err(TransportError::Disconnected)
        ));
    }
}
