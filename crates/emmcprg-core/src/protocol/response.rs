//! Response codes carried in error frames.
//!
//! The target reports failures with a closed set of codes. Each code
//! travels as a little-endian `u32` after the error opcode.

use std::fmt;

/// Response code reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ResponseCode {
    Ack = 0x00,
    InvalidDestination = 0x02,
    InvalidLength = 0x03,
    EarlyEnd = 0x04,
    InvalidCommand = 0x05,
    Failed = 0x07,
    WrongIid = 0x08,
    BadVpp = 0x09,
    VerifyFailed = 0x0A,
    InvalidSecurityCode = 0x0C,
    CantPowerDown = 0x0D,
    NandNotSupported = 0x0E,
    OutOfSequence = 0x0F,
    CloseFailed = 0x10,
    BadFeatureBits = 0x11,
    NoSpace = 0x12,
    InvalidSecurityMode = 0x13,
    MultiImageNotSupported = 0x14,
    PowerOffNotSupported = 0x15,
}

impl ResponseCode {
    const ALL: [ResponseCode; 19] = [
        ResponseCode::Ack,
        ResponseCode::InvalidDestination,
        ResponseCode::InvalidLength,
        ResponseCode::EarlyEnd,
        ResponseCode::InvalidCommand,
        ResponseCode::Failed,
        ResponseCode::WrongIid,
        ResponseCode::BadVpp,
        ResponseCode::VerifyFailed,
        ResponseCode::InvalidSecurityCode,
        ResponseCode::CantPowerDown,
        ResponseCode::NandNotSupported,
        ResponseCode::OutOfSequence,
        ResponseCode::CloseFailed,
        ResponseCode::BadFeatureBits,
        ResponseCode::NoSpace,
        ResponseCode::InvalidSecurityMode,
        ResponseCode::MultiImageNotSupported,
        ResponseCode::PowerOffNotSupported,
    ];

    /// Wire value.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Look up a code from its wire value. Reserved values return `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    pub fn is_ack(self) -> bool {
        self == ResponseCode::Ack
    }

    /// Short name as used in host tool logs.
    pub fn name(self) -> &'static str {
        match self {
            ResponseCode::Ack => "ACK",
            ResponseCode::InvalidDestination => "NAK_INVALID_DEST",
            ResponseCode::InvalidLength => "NAK_INVALID_LEN",
            ResponseCode::EarlyEnd => "NAK_EARLY_END",
            ResponseCode::InvalidCommand => "NAK_INVALID_CMD",
            ResponseCode::Failed => "NAK_FAILED",
            ResponseCode::WrongIid => "NAK_WRONG_IID",
            ResponseCode::BadVpp => "NAK_BAD_VPP",
            ResponseCode::VerifyFailed => "NAK_VERIFY_FAILED",
            ResponseCode::InvalidSecurityCode => "NAK_INVALID_SEC_CODE",
            ResponseCode::CantPowerDown => "NAK_CANT_POWER_DOWN",
            ResponseCode::NandNotSupported => "NAK_NAND_NOT_SUPP",
            ResponseCode::OutOfSequence => "NAK_CMD_OUT_SEQ",
            ResponseCode::CloseFailed => "NAK_CLOSE_FAILED",
            ResponseCode::BadFeatureBits => "NAK_BAD_FEATURE_BITS",
            ResponseCode::NoSpace => "NAK_NO_SPACE",
            ResponseCode::InvalidSecurityMode => "NAK_INVALID_SEC_MODE",
            ResponseCode::MultiImageNotSupported => "NAK_MIBOOT_NOT_SUPP",
            ResponseCode::PowerOffNotSupported => "NAK_PWROFF_NOT_SUPP",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.code())
    }
}
