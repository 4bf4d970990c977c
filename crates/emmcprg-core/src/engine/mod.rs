//! Engine module: dispatcher, channel link and command handlers.

mod dispatcher;
pub mod handlers;
pub mod link;

pub use dispatcher::{CRC_INVALID_MESSAGE, Engine};
pub use handlers::{HandleResult, HandlerContext};
pub use link::{Link, WINDOW_OVERRUN_MESSAGE};
