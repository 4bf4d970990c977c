//! Session module: protocol state, storage controller and partition
//! locator.

pub mod controller;
pub mod locator;
pub mod state;

pub use controller::{ControllerError, LogicalImage, StorageController};
pub use locator::{LOCATE_FAIL, locate_partition};
pub use state::{ActiveOpen, MultiImageMode, OpenMode, SessionState};
