//! Command handlers - one function per built-in command.
//!
//! This module is split into submodules by functionality:
//! - `control`: handshake, sync, reset and the always-rejected commands
//! - `session`: open, close, security mode and partition table
//! - `storage`: read, write, erase and partition info

mod control;
mod session;
mod storage;

use crate::error::{Halt, HandlerError};
use crate::events::{EngineEvent, EngineObserver};
use crate::extension::ExtensionTable;
use crate::protocol::Command;
use crate::session::{SessionState, StorageController};
use crate::storage::BlockDevice;
use crate::transport::ByteChannel;
use crate::watchdog::Watchdog;

use super::link::Link;

use control::{
    handle_hello, handle_invalid, handle_nop, handle_power_off, handle_reset, handle_simple_write,
};
use session::{handle_close, handle_open, handle_open_multi, handle_partition_table, handle_security_mode};
use storage::{handle_erase, handle_partition_info, handle_read, handle_stream_write};

/// Result of handling a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleResult {
    /// The reply buffer holds a reply to send.
    Reply,
    /// Everything the command needed has been sent already.
    Done,
    /// The engine must stop.
    Halt(Halt),
}

/// Handler context containing all resources a command may touch.
pub struct HandlerContext<'a, C: ByteChannel, D: BlockDevice, O: EngineObserver> {
    pub link: &'a mut Link<C, O>,
    pub session: &'a mut SessionState,
    pub storage: &'a mut StorageController<D>,
    pub extensions: &'a mut ExtensionTable,
    pub observer: &'a O,
    pub watchdog: &'a dyn Watchdog,
}

impl<C: ByteChannel, D: BlockDevice, O: EngineObserver> HandlerContext<'_, C, D, O> {
    pub(crate) fn emit(&self, event: EngineEvent) {
        self.observer.on_event(&event);
    }
}

/// Run the handler for `command` on `frame` (opcode first, CRC stripped).
pub fn handle_command<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    command: Command,
    frame: &[u8],
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    match command {
        Command::Hello => handle_hello(frame, ctx),
        Command::Read => handle_read(frame, ctx),
        Command::SimpleWrite => handle_simple_write(frame, ctx),
        Command::StreamWrite => handle_stream_write(frame, ctx),
        Command::Nop => handle_nop(frame, ctx),
        Command::Reset => handle_reset(frame, ctx),
        Command::PowerOff => handle_power_off(frame, ctx),
        Command::Open => handle_open(frame, ctx),
        Command::Close => handle_close(frame, ctx),
        Command::SecurityMode => handle_security_mode(frame, ctx),
        Command::PartitionTable => handle_partition_table(frame, ctx),
        Command::OpenMulti => handle_open_multi(frame, ctx),
        Command::Erase => handle_erase(frame, ctx),
        Command::PartitionInfo => handle_partition_info(frame, ctx),
        Command::Invalid => handle_invalid(frame, ctx),
    }
}
