//! Protocol constants for the eMMC download protocol.
//!
//! Values match the host tools shipped for the streaming download
//! protocol (`QCOM fast download protocol`).

// ============================================================================
// Framing
// ============================================================================

/// Frame delimiter.
pub const HDLC_END: u8 = 0x7E;
/// Escape marker, the following byte is XORed with [`HDLC_ESC_MASK`].
pub const HDLC_ESC: u8 = 0x7D;
pub const HDLC_ESC_MASK: u8 = 0x20;

// ============================================================================
// Size Constants
// ============================================================================

/// Largest data payload carried by a single command.
pub const MAX_DATA_LENGTH: usize = 1024;
/// Largest unstuffed frame: data plus opcode, address and CRC fields.
pub const MAX_PACKET_SIZE: usize = MAX_DATA_LENGTH + 7;
/// Smallest frame worth queuing (opcode + CRC).
pub const MIN_PACKET_SIZE: usize = 3;
/// Number of packet records in the receive pool (window size).
pub const NUMBER_OF_PACKETS: usize = 2;
pub const REPLY_BUFFER_SIZE: usize = 2048;
pub const CRC_SIZE: usize = 2;

/// Storage sector size in bytes.
pub const BLOCK_SIZE: usize = 0x200;

/// Inbound CRC is computed in steps of this many bytes.
pub const CRC_STEP: usize = 128;
/// Transmit polls the channel after each run of this many bytes.
pub const TX_POLL_INTERVAL: usize = 32;

/// Bulk channels flush a short packet after a frame of this granularity.
pub const BULK_PACKET_SIZE: usize = 64;

/// Sectors written per zero-out step.
pub const ZERO_OUT_CHUNK_SECTORS: u32 = 2;

// ============================================================================
// Opcodes (Host -> Target requests, Target -> Host replies)
// ============================================================================

pub const CMD_HELLO: u8 = 0x01;
pub const CMD_HELLO_RSP: u8 = 0x02;
pub const CMD_READ: u8 = 0x03;
pub const CMD_READ_RSP: u8 = 0x04;
pub const CMD_SIMPLE_WRITE: u8 = 0x05;
pub const CMD_SIMPLE_WRITE_RSP: u8 = 0x06;
pub const CMD_STREAM_WRITE: u8 = 0x07;
pub const CMD_STREAM_WRITE_RSP: u8 = 0x08;
pub const CMD_NOP: u8 = 0x09;
pub const CMD_NOP_RSP: u8 = 0x0A;
pub const CMD_RESET: u8 = 0x0B;
pub const CMD_RESET_RSP: u8 = 0x0C;
pub const CMD_ERROR: u8 = 0x0D;
pub const CMD_LOG: u8 = 0x0E;
pub const CMD_UNLOCK: u8 = 0x0F;
pub const CMD_UNLOCK_RSP: u8 = 0x10;
pub const CMD_POWER_OFF: u8 = 0x11;
pub const CMD_POWER_OFF_RSP: u8 = 0x12;
pub const CMD_OPEN: u8 = 0x13;
pub const CMD_OPEN_RSP: u8 = 0x14;
pub const CMD_CLOSE: u8 = 0x15;
pub const CMD_CLOSE_RSP: u8 = 0x16;
pub const CMD_SECURITY_MODE: u8 = 0x17;
pub const CMD_SECURITY_MODE_RSP: u8 = 0x18;
pub const CMD_PARTITION_TABLE: u8 = 0x19;
pub const CMD_PARTITION_TABLE_RSP: u8 = 0x1A;
pub const CMD_OPEN_MULTI: u8 = 0x1B;
pub const CMD_OPEN_MULTI_RSP: u8 = 0x1C;
pub const CMD_ERASE: u8 = 0x1D;
pub const CMD_ERASE_RSP: u8 = 0x1E;
pub const CMD_GET_ECC: u8 = 0x1F;
pub const CMD_GET_ECC_RSP: u8 = 0x20;
pub const CMD_SET_ECC: u8 = 0x21;
pub const CMD_SET_ECC_RSP: u8 = 0x22;
pub const CMD_PARTITION_INFO: u8 = 0x23;
pub const CMD_PARTITION_INFO_RSP: u8 = 0x24;

/// First opcode served by the built-in command table.
pub const FIRST_COMMAND: u8 = CMD_HELLO;
/// Last opcode served by the built-in command table. Higher opcodes are
/// offered to the extension table.
pub const LAST_COMMAND: u8 = CMD_PARTITION_INFO;

// ============================================================================
// Hello negotiation
// ============================================================================

pub const HOST_MAGIC: &[u8; 32] = b"QCOM fast download protocol host";
pub const TARGET_MAGIC: &[u8; 32] = b"QCOM fast download protocol targ";

/// Protocol version advertised by the target.
pub const PROTOCOL_VERSION: u8 = 5;
/// Oldest host protocol version accepted.
pub const MIN_PROTOCOL_VERSION: u8 = 2;

/// Minimum length of a hello request.
pub const HELLO_MIN_LENGTH: usize = 36;

/// Flash base address reported in the hello reply.
pub const FLASH_BASE: u32 = 0;
/// Default device name reported in the hello reply.
pub const DEVICE_NAME: &str = "eMMC";

/// Sector layout advertised in the hello reply, halved until the table
/// fits in [`MAX_SECTOR_ENTRIES`] entries.
pub const SECTOR_LAYOUT_BLOCKS: u32 = 0x800;
pub const SECTOR_LAYOUT_PAGES: u32 = 0x40;
pub const SECTOR_LAYOUT_PAGE_SIZE: u32 = 0x800;
pub const MAX_SECTOR_ENTRIES: u32 = 200;

// Feature bits
pub const FEATURE_UNCOMPRESSED_DLOAD: u8 = 0x01;
pub const FEATURE_NAND_BOOTABLE_IMAGE: u8 = 0x02;
pub const FEATURE_NAND_BOOTLOADER: u8 = 0x04;
pub const FEATURE_NAND_MULTI_IMAGE: u8 = 0x08;
pub const FEATURE_SECTOR_ADDRESSES: u8 = 0x10;

/// Feature bits the target grants when requested.
pub const SUPPORTED_FEATURES: u8 =
    FEATURE_UNCOMPRESSED_DLOAD | FEATURE_NAND_MULTI_IMAGE | FEATURE_SECTOR_ADDRESSES;

// ============================================================================
// Open / partition table
// ============================================================================

/// Largest partition table accepted by the partition table command.
pub const MAX_PARTITION_TABLE_SIZE: usize = 512;

// Partition table / open multi status bytes
pub const PARTITION_TABLE_ACCEPTED: u8 = 0x00;
pub const PARTITION_TABLE_DIFFERS: u8 = 0x01;
pub const PARTITION_TABLE_FORMAT_INVALID: u8 = 0x02;
pub const PARTITION_TABLE_ERASE_FAILED: u8 = 0x03;
pub const PARTITION_TABLE_UNKNOWN_ERROR: u8 = 0x04;

pub const OPEN_MULTI_SUCCESS: u8 = 0x00;
pub const OPEN_MULTI_LENGTH_EXCEEDED: u8 = 0x01;
pub const OPEN_MULTI_PAYLOAD_NOT_ALLOWED: u8 = 0x02;
pub const OPEN_MULTI_PAYLOAD_REQUIRED: u8 = 0x03;
pub const OPEN_MULTI_UNKNOWN_ERROR: u8 = 0x04;
pub const OPEN_MULTI_UNKNOWN_PARTITION: u8 = 0x05;

// ============================================================================
// Partition info command
// ============================================================================

pub const PARTITION_INFO_LENGTH: usize = 38;
pub const PARTITION_INFO_MAGIC: u16 = 0xDEAD;
/// Number of size words carried by the partition info command.
pub const PARTITION_INFO_WORDS: usize = 8;

pub const PARTITION_INFO_CREATE_GPP: u8 = 1;
pub const PARTITION_INFO_SET_ACTIVE_BOOT: u8 = 2;
pub const PARTITION_INFO_ZERO_OUT: u8 = 3;

// ============================================================================
// Legacy partition table (MBR / EBR)
// ============================================================================

/// Offsets of the four primary entries within a boot record.
pub const MBR_ENTRY_OFFSETS: [usize; 4] = [0x1BE, 0x1CE, 0x1DE, 0x1EE];
pub const MBR_ENTRY_STATUS: usize = 0;
pub const MBR_ENTRY_TYPE: usize = 4;
pub const MBR_ENTRY_START: usize = 8;
/// Status byte of a bootable ("active") entry.
pub const MBR_ACTIVE: u8 = 0x80;

pub const PARTITION_TYPE_EXTENDED: u8 = 0x05;
pub const PARTITION_TYPE_FAT32: u8 = 0x0B;
pub const PARTITION_TYPE_FAT32_LBA: u8 = 0x0C;
pub const PARTITION_TYPE_FAT16_LBA: u8 = 0x0E;

/// Partition types tried, in order, when remapping the FAT image.
pub const FAT_PARTITION_TYPES: [u8; 3] = [
    PARTITION_TYPE_FAT32,
    PARTITION_TYPE_FAT32_LBA,
    PARTITION_TYPE_FAT16_LBA,
];

/// Longest extended partition chain followed before giving up.
pub const MAX_EBR_CHAIN: usize = 255;
