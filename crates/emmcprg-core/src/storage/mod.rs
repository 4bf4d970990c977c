//! Storage layer module.

pub mod memory;
pub mod traits;

pub use memory::{MemoryDevice, OpKind, StorageOp};
pub use traits::{Area, BlockDevice, DeviceInfo, DriverStatus, StorageError, sectors_for};
