//! Block storage abstraction.
//!
//! Defines the `BlockDevice` trait for the card driver, allowing
//! different implementations (file-backed images, RAM, a real SD/MMC
//! controller).

use std::fmt;

use thiserror::Error;

use crate::protocol::constants::{BLOCK_SIZE, DEVICE_NAME};

/// Physical area of the card, addressed by driver partition index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Area {
    User,
    Boot1,
    Boot2,
    Gpp1,
    Gpp2,
    Gpp3,
    Gpp4,
}

impl Area {
    pub const ALL: [Area; 7] = [
        Area::User,
        Area::Boot1,
        Area::Boot2,
        Area::Gpp1,
        Area::Gpp2,
        Area::Gpp3,
        Area::Gpp4,
    ];

    /// Driver partition index. Index 3 (RPMB) is never opened.
    pub const fn index(self) -> u8 {
        match self {
            Area::User => 0,
            Area::Boot1 => 1,
            Area::Boot2 => 2,
            Area::Gpp1 => 4,
            Area::Gpp2 => 5,
            Area::Gpp3 => 6,
            Area::Gpp4 => 7,
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Area::User => write!(f, "user"),
            Area::Boot1 => write!(f, "boot1"),
            Area::Boot2 => write!(f, "boot2"),
            Area::Gpp1 => write!(f, "gpp1"),
            Area::Gpp2 => write!(f, "gpp2"),
            Area::Gpp3 => write!(f, "gpp3"),
            Area::Gpp4 => write!(f, "gpp4"),
        }
    }
}

/// Status codes reported by the card driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DriverStatus {
    Unknown = 1,
    CmdTimeout,
    Timeout,
    CmdCrcFail,
    DataCrcFail,
    CmdSent,
    ProgDone,
    CardReady,
    InvalidTxState,
    SetBlockSize,
    SdioR5Resp,
    Dma,
    ReadFifo,
    WriteFifo,
    Erase,
    Sdio,
    SdioRead,
    SdioWrite,
    Switch,
    InvalidParam,
    CardUndetected,
    FeatureUnsupported,
    SecureCommandInProgress,
    ReadSecCmdNotAllowed,
    AbortReadSecCmd,
    CardInit,
    CardRemoved,
    PwrOnWriteProt,
    WpViolation,
    SpsModeUsed,
    DmlInit,
    SpsGetEvent,
    SpsWritingDescriptor,
}

impl DriverStatus {
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Driver name of the status, as printed in host logs.
    pub fn name(self) -> &'static str {
        match self {
            DriverStatus::Unknown => "SDCC_ERR_UNKNOWN",
            DriverStatus::CmdTimeout => "SDCC_ERR_CMD_TIMEOUT",
            DriverStatus::Timeout => "SDCC_ERR_TIMEOUT",
            DriverStatus::CmdCrcFail => "SDCC_ERR_CMD_CRC_FAIL",
            DriverStatus::DataCrcFail => "SDCC_ERR_DATA_CRC_FAIL",
            DriverStatus::CmdSent => "SDCC_ERR_CMD_SENT",
            DriverStatus::ProgDone => "SDCC_ERR_PROG_DONE",
            DriverStatus::CardReady => "SDCC_ERR_CARD_READY",
            DriverStatus::InvalidTxState => "SDCC_ERR_INVALID_TX_STATE",
            DriverStatus::SetBlockSize => "SDCC_ERR_SET_BLKSZ",
            DriverStatus::SdioR5Resp => "SDCC_ERR_SDIO_R5_RESP",
            DriverStatus::Dma => "SDCC_ERR_DMA",
            DriverStatus::ReadFifo => "SDCC_ERR_READ_FIFO",
            DriverStatus::WriteFifo => "SDCC_ERR_WRITE_FIFO",
            DriverStatus::Erase => "SDCC_ERR_ERASE",
            DriverStatus::Sdio => "SDCC_ERR_SDIO",
            DriverStatus::SdioRead => "SDCC_ERR_SDIO_READ",
            DriverStatus::SdioWrite => "SDCC_ERR_SDIO_WRITE",
            DriverStatus::Switch => "SDCC_ERR_SWITCH",
            DriverStatus::InvalidParam => "SDCC_ERR_INVALID_PARAM",
            DriverStatus::CardUndetected => "SDCC_ERR_CARD_UNDETECTED",
            DriverStatus::FeatureUnsupported => "SDCC_ERR_FEATURE_UNSUPPORTED",
            DriverStatus::SecureCommandInProgress => "SDCC_ERR_SECURE_COMMAND_IN_PROGRESS",
            DriverStatus::ReadSecCmdNotAllowed => "SDCC_ERR_READ_SEC_CMD_NOT_ALLOWED",
            DriverStatus::AbortReadSecCmd => "SDCC_ERR_ABORT_READ_SEC_CMD",
            DriverStatus::CardInit => "SDCC_ERR_CARD_INIT",
            DriverStatus::CardRemoved => "SDCC_ERR_CARD_REMOVED",
            DriverStatus::PwrOnWriteProt => "SDCC_ERR_PWR_ON_WRITE_PROT",
            DriverStatus::WpViolation => "SDCC_ERR_WP_VIOLATION",
            DriverStatus::SpsModeUsed => "SDCC_ERR_SPS_MODE_USED",
            DriverStatus::DmlInit => "SDCC_ERR_DML_INIT",
            DriverStatus::SpsGetEvent => "SDCC_ERR_SPS_GET_EVENT",
            DriverStatus::SpsWritingDescriptor => "SDCC_ERR_SPS_WRITING_DESCRIPTOR",
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Driver error on {area}: {status}")]
    Driver { area: Area, status: DriverStatus },

    #[error("Area {0} not available")]
    Unavailable(Area),

    #[error("Sector range {start}+{count} outside {area} ({size} sectors)")]
    OutOfRange {
        area: Area,
        start: u32,
        count: u32,
        size: u32,
    },
}

impl StorageError {
    /// Driver status behind this error, if the driver reported one.
    pub fn status(&self) -> Option<DriverStatus> {
        match self {
            StorageError::Driver { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Card and area information reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub card_size_in_sectors: u32,
    pub block_len: u32,
    pub write_protect_group_size: u32,
    pub num_phy_partitions: u8,
    pub is_bootable: bool,
    pub manufacturer_id: u16,
    pub oem_id: u16,
    pub product_name: [u8; 6],
    pub product_rev: u8,
    pub serial_num: u32,
}

impl DeviceInfo {
    pub const SIZE: usize = 29;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.card_size_in_sectors.to_le_bytes());
        buf[4..8].copy_from_slice(&self.block_len.to_le_bytes());
        buf[8..12].copy_from_slice(&self.write_protect_group_size.to_le_bytes());
        buf[12] = self.num_phy_partitions;
        buf[13] = self.is_bootable as u8;
        buf[14..16].copy_from_slice(&self.manufacturer_id.to_le_bytes());
        buf[16..18].copy_from_slice(&self.oem_id.to_le_bytes());
        buf[18..24].copy_from_slice(&self.product_name);
        buf[24] = self.product_rev;
        buf[25..29].copy_from_slice(&self.serial_num.to_le_bytes());
        buf
    }
}

/// Abstract card driver.
///
/// Sector counts are in [`BLOCK_SIZE`] units and buffers are always
/// `count * BLOCK_SIZE` bytes long.
pub trait BlockDevice {
    /// Opaque per-area handle, cached by the session for its lifetime.
    type Handle: Copy + fmt::Debug;

    /// Open a physical area.
    fn open(&mut self, area: Area) -> Result<Self::Handle, StorageError>;

    fn read(
        &mut self,
        handle: Self::Handle,
        start_sector: u32,
        count: u32,
        buf: &mut [u8],
    ) -> Result<(), StorageError>;

    fn write(
        &mut self,
        handle: Self::Handle,
        start_sector: u32,
        count: u32,
        data: &[u8],
    ) -> Result<(), StorageError>;

    /// Erase sectors `start_sector..=end_sector`.
    fn erase(
        &mut self,
        handle: Self::Handle,
        start_sector: u32,
        end_sector: u32,
    ) -> Result<(), StorageError>;

    fn device_info(&mut self, handle: Self::Handle) -> Result<DeviceInfo, StorageError>;

    /// Make the handle's area the one the card boots from.
    fn set_active_boot(&mut self, handle: Self::Handle) -> Result<(), StorageError>;

    /// Partition the card into up to four general purpose areas.
    fn configure_gpp(&mut self, handle: Self::Handle, sizes: [u32; 4])
    -> Result<(), StorageError>;

    /// Name reported in the hello reply, `None` for an unrecognised part.
    fn device_name(&self) -> Option<&str> {
        Some(DEVICE_NAME)
    }
}

/// Number of whole sectors needed to hold `bytes`.
pub const fn sectors_for(bytes: usize) -> u32 {
    bytes.div_ceil(BLOCK_SIZE) as u32
}
