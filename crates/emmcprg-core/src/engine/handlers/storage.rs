//! Storage handlers (read, stream write, erase, partition info).

use tracing::{debug, warn};

use crate::error::HandlerError;
use crate::events::{EngineEvent, EngineObserver};
use crate::protocol::constants::*;
use crate::protocol::{PartitionInfoRequest, RequestError, ResponseCode, StreamWrite};
use crate::storage::BlockDevice;
use crate::transport::ByteChannel;

use super::{HandleResult, HandlerContext};

/// Read - return up to one packet of data from the card.
#[cfg(feature = "read")]
pub fn handle_read<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    frame: &[u8],
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    use crate::protocol::ReadRequest;

    let request = ReadRequest::parse(frame).map_err(|e| match e {
        RequestError::TooLarge(_) => {
            HandlerError::nak(ResponseCode::InvalidLength, "Packet too large")
        }
        _ => HandlerError::nak(ResponseCode::InvalidLength, "Invalid packet length"),
    })?;

    ctx.link.reply.begin(CMD_READ_RSP);
    ctx.link.reply.put_u32(request.address)?;
    let out = ctx.link.reply.reserve(request.length as usize)?;
    ctx.storage
        .read(request.address, out, ctx.session.sector_addresses)
        .map_err(|e| {
            warn!(address = request.address, error = %e, "Read failed");
            HandlerError::nak(ResponseCode::Failed, "Read unsuccessful")
        })?;
    Ok(HandleResult::Reply)
}

#[cfg(not(feature = "read"))]
pub fn handle_read<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    _frame: &[u8],
    _ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    Err(HandlerError::nak(
        ResponseCode::InvalidCommand,
        "Feature not compiled in",
    ))
}

/// Stream write - program data at an address of the selected image.
pub fn handle_stream_write<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    frame: &[u8],
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    let request = StreamWrite::parse(frame)
        .map_err(|_| HandlerError::nak(ResponseCode::EarlyEnd, "Packet too short"))?;

    match ctx
        .storage
        .write(request.address, request.data, ctx.session.sector_addresses)
    {
        Ok(Some((sector, count))) => ctx.emit(EngineEvent::Written {
            image: ctx.storage.image(),
            sector,
            count,
        }),
        Ok(None) => debug!(len = request.data.len(), "No image selected, data dropped"),
        Err(e) => {
            warn!(address = request.address, error = %e, "Write failed");
            return Err(HandlerError::nak(ResponseCode::Failed, "Write unsuccessful"));
        }
    }

    ctx.link.reply.begin(CMD_STREAM_WRITE_RSP);
    ctx.link.reply.put_u32(request.address)?;
    Ok(HandleResult::Reply)
}

/// Erase - blank the selected image.
pub fn handle_erase<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    _frame: &[u8],
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    if !ctx.session.is_open() {
        return Err(HandlerError::nak(
            ResponseCode::OutOfSequence,
            "Cannot erase when not previously opened",
        ));
    }

    ctx.storage.erase().map_err(|e| {
        warn!(error = %e, "Erase failed");
        HandlerError::nak(ResponseCode::Failed, "Erase failed")
    })?;

    ctx.link.reply.begin(CMD_ERASE_RSP);
    Ok(HandleResult::Reply)
}

/// Partition info - run the optional sub-command, then report the
/// selected image's device info.
pub fn handle_partition_info<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    frame: &[u8],
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<HandleResult, HandlerError> {
    let request = PartitionInfoRequest::parse(frame).map_err(|e| match e {
        RequestError::BadMagic => HandlerError::nak(
            ResponseCode::InvalidCommand,
            "GPP/Info command failed. Invalid Magic Number",
        ),
        RequestError::BadCrc { .. } => HandlerError::nak(
            ResponseCode::InvalidCommand,
            "GPP/Info command failed. Invalid CRC",
        ),
        _ => HandlerError::nak(ResponseCode::InvalidLength, "Invalid packet length"),
    })?;

    match request.sub_command {
        PARTITION_INFO_CREATE_GPP => create_gpp(&request, ctx)?,
        PARTITION_INFO_SET_ACTIVE_BOOT => {
            ctx.storage.set_active_boot().map_err(|e| {
                warn!(error = %e, "Set active boot failed");
                HandlerError::nak(ResponseCode::Failed, "Set active boot partition failed")
            })?;
            ctx.link.send_log("Set active boot partition successfully")?;
        }
        PARTITION_INFO_ZERO_OUT => {
            let (start, count) = (request.words[0], request.words[1]);
            ctx.link
                .send_log(&format!("zeroout start {}, len {}", start, count))?;
            ctx.link
                .send_log(&format!("zeroing out {} bytes at a time", MAX_DATA_LENGTH))?;
            ctx.storage.zero_out(start, count).map_err(|e| {
                warn!(start = start, count = count, error = %e, "Zero out failed");
                HandlerError::nak(ResponseCode::Failed, "Zeroing out failed")
            })?;
            ctx.link.send_log("Zeroed out successfully")?;
        }
        other => debug!(sub_command = other, "Partition info only"),
    }

    let info = ctx.storage.partition_info().map_err(|e| {
        warn!(error = %e, "Partition info failed");
        HandlerError::nak(ResponseCode::Failed, "Partition info failed")
    })?;

    ctx.link.reply.begin(CMD_PARTITION_INFO_RSP);
    if let Some(info) = info {
        ctx.link.reply.put_slice(&info.to_bytes())?;
    }
    Ok(HandleResult::Reply)
}

#[cfg(feature = "gpp")]
fn create_gpp<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    request: &PartitionInfoRequest,
    ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<(), HandlerError> {
    let [a, b, c, d, rest @ ..] = request.words;
    if rest.iter().any(|&size| size != 0) {
        warn!(sizes = ?rest, "Sizes past the fourth partition ignored");
    }

    if let Err(e) = ctx.storage.create_gpp([a, b, c, d]) {
        warn!(error = %e, "GPP creation failed");
        ctx.link.send_log(&e.to_string())?;
        return Err(HandlerError::nak(ResponseCode::Failed, "GPP creation failed"));
    }
    Ok(())
}

#[cfg(not(feature = "gpp"))]
fn create_gpp<C: ByteChannel, D: BlockDevice, O: EngineObserver>(
    _request: &PartitionInfoRequest,
    _ctx: &mut HandlerContext<'_, C, D, O>,
) -> Result<(), HandlerError> {
    Err(HandlerError::nak(
        ResponseCode::InvalidCommand,
        "Feature not compiled in",
    ))
}
