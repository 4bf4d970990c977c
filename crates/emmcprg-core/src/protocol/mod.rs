//! Protocol module - wire definitions for the download protocol.

pub mod command;
pub mod constants;
pub mod request;
pub mod response;

pub use command::Command;
pub use constants::*;
pub use request::{
    HelloRequest, ModeRequest, PartitionInfoRequest, ReadRequest, RequestError, StreamWrite,
};
pub use response::ResponseCode;
