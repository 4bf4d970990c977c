//! Control handlers (hello, nop, reset) and the commands this target
//! always refuses.

use tracing::{debug, info};

use crate::error::{Halt, HandlerError};
use crate::events::{EngineEvent, EngineObserver};
use crate::framing::{ReplyBuffer, ReplyOverrun};
use crate::protocol::constants::*;
use crate::protocol::{HelloRequest, RequestError, ResponseCode};
use crate::storage::BlockDevice;
use crate::transport::ByteChannel;

use super::{HandleResult, HandlerContext};

/// Anything the command table does not serve.
pub fn handle_invalid<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    frame: &[u8],
    _ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    debug!(opcode = frame.first().copied().unwrap_or_default(), "Invalid command");
    Err(HandlerError::nak(ResponseCode::InvalidCommand, "Invalid Command"))
}

/// Hello - negotiate the session and unlock every other command.
pub fn handle_hello<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    frame: &[u8],
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    let request = HelloRequest::parse(frame).map_err(|e| match e {
        RequestError::BadMagic => {
            HandlerError::nak(ResponseCode::InvalidCommand, "Invalid magic number")
        }
        RequestError::UnsupportedVersion(_) => {
            HandlerError::nak(ResponseCode::InvalidCommand, "Invalid protocol version")
        }
        _ => HandlerError::nak(
            ResponseCode::InvalidLength,
            "Parameter Request Packet Length Error",
        ),
    })?;
    debug!(
        max_version = request.max_version,
        min_version = request.min_version,
        features = request.features,
        "Hello"
    );

    let Some(name) = ctx.storage.device_name() else {
        return Err(HandlerError::nak(
            ResponseCode::WrongIid,
            "Unrecognized flash device",
        ));
    };
    let name = &name.as_bytes()[..name.len().min(u8::MAX as usize)];
    let features = request.features & SUPPORTED_FEATURES;

    let reply = &mut ctx.link.reply;
    reply.begin(CMD_HELLO_RSP);
    reply.put_slice(TARGET_MAGIC)?;
    reply.put_u8(PROTOCOL_VERSION)?;
    reply.put_u8(MIN_PROTOCOL_VERSION)?;
    reply.put_u32(MAX_DATA_LENGTH as u32)?;
    reply.put_u32(FLASH_BASE)?;
    reply.put_u8(name.len() as u8)?;
    reply.put_slice(name)?;
    reply.put_u16(NUMBER_OF_PACKETS as u16)?;
    put_sector_layout(reply)?;
    reply.put_u8(features)?;

    ctx.session.handshake_done = true;
    ctx.session.sector_addresses = features & FEATURE_SECTOR_ADDRESSES != 0;
    ctx.emit(EngineEvent::Handshake {
        host_version: request.max_version,
        features,
        sector_addresses: ctx.session.sector_addresses,
    });

    ctx.link.send_reply()?;
    ctx.extensions.notify_handshake();
    Ok(HandleResult::Done)
}

/// Sector table of the hello reply: a block count followed by one size
/// per block. The geometry is nominal; hosts only use it for progress.
fn put_sector_layout(reply: &mut ReplyBuffer) -> Result<(), ReplyOverrun> {
    let mut blocks = SECTOR_LAYOUT_BLOCKS;
    let mut pages = SECTOR_LAYOUT_PAGES;
    while blocks > MAX_SECTOR_ENTRIES {
        blocks >>= 1;
        pages <<= 1;
    }
    let block_size = pages * SECTOR_LAYOUT_PAGE_SIZE;

    reply.put_u16(blocks as u16)?;
    for _ in 0..blocks {
        reply.put_u32(block_size)?;
    }
    Ok(())
}

/// Nop/sync - echo the payload back.
pub fn handle_nop<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    frame: &[u8],
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    ctx.link.reply.begin(CMD_NOP_RSP);
    ctx.link.reply.put_slice(&frame[1..])?;
    Ok(HandleResult::Reply)
}

/// Reset - acknowledge, flush the channel and hand over to the board for
/// a hardware reset.
pub fn handle_reset<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    _frame: &[u8],
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    if ctx.session.is_open() {
        return Err(HandlerError::nak(
            ResponseCode::OutOfSequence,
            "Cannot reset before close",
        ));
    }

    ctx.link.reply.begin(CMD_RESET_RSP);
    ctx.link.send_reply()?;
    ctx.link.drain()?;
    ctx.watchdog.resume();

    info!("Reset requested by host");
    ctx.emit(EngineEvent::Reset);
    Ok(HandleResult::Halt(Halt::Reset))
}

pub fn handle_power_off<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    _frame: &[u8],
    _ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    Err(HandlerError::nak(
        ResponseCode::PowerOffNotSupported,
        "Power off not supported",
    ))
}

/// Simple write can only clear bits, which block storage cannot do.
pub fn handle_simple_write<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    _frame: &[u8],
    _ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    Err(HandlerError::nak(
        ResponseCode::InvalidCommand,
        "Simple write not allowed",
    ))
}
