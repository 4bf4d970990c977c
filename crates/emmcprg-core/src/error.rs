//! Handler errors and terminal engine conditions.

use std::fmt;

use thiserror::Error;

use crate::framing::ReplyOverrun;
use crate::protocol::ResponseCode;
use crate::transport::TransportError;

/// Condition after which the engine never processes another frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// The host asked for a reset. The reply has been drained and the
    /// board layer must now reset the target.
    Reset,
    /// A reply did not fit the reply buffer.
    ReplyOverrun,
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Halt::Reset => write!(f, "target reset requested"),
            Halt::ReplyOverrun => write!(f, "reply buffer overrun"),
        }
    }
}

/// Outcome of one pass of the driving loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No frame was waiting.
    Idle,
    /// Number of frames taken off the waiting queue.
    Processed(usize),
    /// The engine stopped for good.
    Halted(Halt),
}

/// Why a command handler did not produce its normal reply.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Rejected; the host gets a log frame and an error frame.
    #[error("{code}: {message}")]
    Nak {
        code: ResponseCode,
        message: String,
    },

    /// Reply construction ran out of space. Fatal.
    #[error(transparent)]
    Overrun(#[from] ReplyOverrun),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl HandlerError {
    pub fn nak(code: ResponseCode, message: impl Into<String>) -> Self {
        HandlerError::Nak {
            code,
            message: message.into(),
        }
    }
}
