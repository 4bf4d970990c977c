//! Session handlers (open, open multi, close, security mode, partition
//! table).

use tracing::{debug, info, warn};

use crate::error::HandlerError;
use crate::events::{EngineEvent, EngineObserver};
use crate::protocol::constants::*;
use crate::protocol::{ModeRequest, ResponseCode};
use crate::session::{ActiveOpen, MultiImageMode, OpenMode};
use crate::storage::BlockDevice;
use crate::transport::ByteChannel;

use super::{HandleResult, HandlerContext};

const ALREADY_OPEN_SAME_MODE: &str = "Already opened, ignoring open in same mode";

fn parse_mode(frame: &[u8]) -> Result<ModeRequest<'_>, HandlerError> {
    ModeRequest::parse(frame)
        .map_err(|_| HandlerError::nak(ResponseCode::InvalidLength, "Invalid packet length"))
}

fn different_mode() -> HandlerError {
    HandlerError::nak(ResponseCode::OutOfSequence, "Already opened in different mode")
}

/// Open (legacy) - only factory mode is accepted.
pub fn handle_open<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    frame: &[u8],
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    let request = parse_mode(frame)?;

    match ctx.session.open {
        ActiveOpen::None => {}
        ActiveOpen::Legacy(mode) if mode as u8 == request.mode => {
            ctx.link.send_log(ALREADY_OPEN_SAME_MODE)?;
            ctx.link.reply.begin(CMD_OPEN_RSP);
            return Ok(HandleResult::Reply);
        }
        _ => return Err(different_mode()),
    }

    let open_failed = || HandlerError::nak(ResponseCode::Failed, "Open failed");
    let mode = match OpenMode::try_from(request.mode) {
        Ok(OpenMode::Factory) => OpenMode::Factory,
        Ok(other) => {
            debug!(mode = ?other, "Open mode not supported on block storage");
            return Err(open_failed());
        }
        Err(value) => {
            debug!(mode = value, "Unknown open mode");
            return Err(open_failed());
        }
    };

    // Only the mode is recorded; no image is selected, so writes that
    // follow are acknowledged without reaching the card.
    ctx.session.open = ActiveOpen::Legacy(mode);
    info!(mode = ?mode, "Opened");

    ctx.link.reply.begin(CMD_OPEN_RSP);
    Ok(HandleResult::Reply)
}

/// Open multi-image - select the logical image for the following writes.
pub fn handle_open_multi<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    frame: &[u8],
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    if ctx.session.security_mode.is_none() {
        return Err(HandlerError::nak(
            ResponseCode::OutOfSequence,
            "No security mode received before open multi",
        ));
    }
    if !ctx.session.partition_table_received {
        return Err(HandlerError::nak(
            ResponseCode::OutOfSequence,
            "No partition table received before open multi",
        ));
    }
    let request = parse_mode(frame)?;

    match ctx.session.open {
        ActiveOpen::None => {}
        ActiveOpen::MultiImage(mode) if mode as u8 == request.mode => {
            ctx.link.send_log(ALREADY_OPEN_SAME_MODE)?;
            ctx.link.reply.begin(CMD_OPEN_MULTI_RSP);
            ctx.link.reply.put_u8(OPEN_MULTI_SUCCESS)?;
            return Ok(HandleResult::Reply);
        }
        _ => return Err(different_mode()),
    }

    let open_failed = || HandlerError::nak(ResponseCode::Failed, "Open multi failed, unknown error");
    let mode = MultiImageMode::try_from(request.mode).map_err(|value| {
        debug!(mode = value, "Unknown image");
        open_failed()
    })?;
    if !request.payload.is_empty() {
        debug!(len = request.payload.len(), "Ignoring open multi payload");
    }

    let (image, offset) = ctx.storage.select_image(mode).map_err(|e| {
        warn!(mode = ?mode, error = %e, "Open multi failed");
        open_failed()
    })?;

    ctx.session.open = ActiveOpen::MultiImage(mode);
    info!(mode = ?mode, image = %image, offset = offset, "Opened image");
    ctx.emit(EngineEvent::ImageSelected { image, offset });

    ctx.link.reply.begin(CMD_OPEN_MULTI_RSP);
    ctx.link.reply.put_u8(OPEN_MULTI_SUCCESS)?;
    Ok(HandleResult::Reply)
}

/// Close - end the open session and drop the image selection.
pub fn handle_close<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    _frame: &[u8],
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    if !ctx.session.is_open() {
        return Err(HandlerError::nak(
            ResponseCode::OutOfSequence,
            "Cannot close when not previously opened",
        ));
    }

    info!(open = %ctx.session.open, "Closed");
    ctx.session.close();
    // The image does not outlive the session; writes after close are dropped.
    ctx.storage.deselect();
    ctx.emit(EngineEvent::Closed);

    ctx.link.reply.begin(CMD_CLOSE_RSP);
    Ok(HandleResult::Reply)
}

/// Security mode - recorded, never refused.
pub fn handle_security_mode<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    frame: &[u8],
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    let request = parse_mode(frame)?;
    debug!(mode = request.mode, "Security mode");
    ctx.session.security_mode = Some(request.mode);

    ctx.link.reply.begin(CMD_SECURITY_MODE_RSP);
    Ok(HandleResult::Reply)
}

/// Partition table - accepted as long as it fits. The table itself is not
/// applied; block storage carries its own.
pub fn handle_partition_table<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    frame: &[u8],
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    if ctx.session.security_mode.is_none() {
        return Err(HandlerError::nak(
            ResponseCode::OutOfSequence,
            "No security mode received before partition table",
        ));
    }
    let request = parse_mode(frame)?;
    if request.payload.len() > MAX_PARTITION_TABLE_SIZE {
        return Err(HandlerError::nak(
            ResponseCode::InvalidLength,
            "Partition table length exceeded",
        ));
    }

    debug!(
        override_flag = request.mode,
        len = request.payload.len(),
        "Partition table accepted"
    );
    ctx.session.partition_table_received = true;

    ctx.link.reply.begin(CMD_PARTITION_TABLE_RSP);
    ctx.link.reply.put_u8(PARTITION_TABLE_ACCEPTED)?;
    Ok(HandleResult::Reply)
}
