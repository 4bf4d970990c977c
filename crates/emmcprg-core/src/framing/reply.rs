//! Reply buffer and outbound frame construction.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use super::crc::crc16;
use crate::protocol::constants::*;
use crate::protocol::ResponseCode;

/// A write would run past the end of the reply buffer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Reply buffer overrun: {needed} bytes needed, {available} available")]
pub struct ReplyOverrun {
    pub needed: usize,
    pub available: usize,
}

/// Fixed-size buffer holding one outbound frame before stuffing.
///
/// Every `put_*` is bounds checked. Two bytes are always kept in reserve
/// for the CRC appended by [`ReplyBuffer::append_crc`].
pub struct ReplyBuffer {
    data: [u8; REPLY_BUFFER_SIZE],
    length: usize,
}

impl ReplyBuffer {
    /// Bytes available for opcode and payload.
    pub const PAYLOAD_CAPACITY: usize = REPLY_BUFFER_SIZE - CRC_SIZE;

    pub const fn new() -> Self {
        Self {
            data: [0; REPLY_BUFFER_SIZE],
            length: 0,
        }
    }

    /// Start a new reply with `opcode`.
    pub fn begin(&mut self, opcode: u8) {
        self.length = 0;
        self.data[0] = opcode;
        self.length = 1;
    }

    pub fn clear(&mut self) {
        self.length = 0;
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.length]
    }

    /// Opcode of the reply being built.
    pub fn opcode(&self) -> Option<u8> {
        self.as_bytes().first().copied()
    }

    /// Reserve `len` bytes and return them for in-place filling.
    pub fn reserve(&mut self, len: usize) -> Result<&mut [u8], ReplyOverrun> {
        let available = Self::PAYLOAD_CAPACITY - self.length;
        if len > available {
            return Err(ReplyOverrun {
                needed: len,
                available,
            });
        }
        let start = self.length;
        self.length += len;
        Ok(&mut self.data[start..start + len])
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), ReplyOverrun> {
        self.reserve(1)?[0] = value;
        Ok(())
    }

    pub fn put_u16(&mut self, value: u16) -> Result<(), ReplyOverrun> {
        LittleEndian::write_u16(self.reserve(2)?, value);
        Ok(())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<(), ReplyOverrun> {
        LittleEndian::write_u32(self.reserve(4)?, value);
        Ok(())
    }

    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<(), ReplyOverrun> {
        self.reserve(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Replace the contents with a complete reply (extension replies).
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), ReplyOverrun> {
        self.clear();
        self.put_slice(bytes)
    }

    /// Append the little-endian CRC over the current contents.
    /// The reserve kept by `put_*` guarantees room for it.
    pub fn append_crc(&mut self) {
        let crc = crc16(self.as_bytes());
        LittleEndian::write_u16(&mut self.data[self.length..self.length + CRC_SIZE], crc);
        self.length += CRC_SIZE;
    }

    /// Build a log frame: `[0x0E][text]['\n']`.
    pub fn log_frame(&mut self, message: &str) {
        self.begin(CMD_LOG);
        let room = Self::PAYLOAD_CAPACITY - self.length - 1;
        let text = &message.as_bytes()[..message.len().min(room)];
        let _ = self.put_slice(text);
        let _ = self.put_u8(b'\n');
    }

    /// Build an error frame: `[0x0D][code u32][text]`.
    pub fn error_frame(&mut self, code: ResponseCode, message: &str) {
        self.begin(CMD_ERROR);
        let _ = self.put_u32(code.code());
        let room = Self::PAYLOAD_CAPACITY - self.length;
        let text = &message.as_bytes()[..message.len().min(room)];
        let _ = self.put_slice(text);
    }
}

impl Default for ReplyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::crc::verify_stepped;

    #[test]
    fn test_put_little_endian() {
        let mut reply = ReplyBuffer::new();
        reply.begin(CMD_STREAM_WRITE_RSP);
        reply.put_u32(0x1234_5678).unwrap();
        reply.put_u16(0xABCD).unwrap();
        assert_eq!(
            reply.as_bytes(),
            &[0x08, 0x78, 0x56, 0x34, 0x12, 0xCD, 0xAB]
        );
    }

    #[test]
    fn test_append_crc() {
        let mut reply = ReplyBuffer::new();
        reply.begin(CMD_CLOSE_RSP);
        reply.append_crc();
        assert_eq!(reply.len(), 3);
        assert!(verify_stepped(reply.as_bytes(), || {}));
    }

    #[test]
    fn test_overrun_keeps_crc_reserve() {
        let mut reply = ReplyBuffer::new();
        reply.begin(CMD_NOP_RSP);
        assert!(reply.put_slice(&[0; ReplyBuffer::PAYLOAD_CAPACITY - 1]).is_ok());
        assert_eq!(
            reply.put_u8(0),
            Err(ReplyOverrun {
                needed: 1,
                available: 0
            })
        );
        reply.append_crc();
        assert_eq!(reply.len(), REPLY_BUFFER_SIZE);
    }

    #[test]
    fn test_log_frame() {
        let mut reply = ReplyBuffer::new();
        reply.log_frame("ERR: CRC invalid");
        assert_eq!(reply.as_bytes(), b"\x0EERR: CRC invalid\n");
    }

    #[test]
    fn test_error_frame() {
        let mut reply = ReplyBuffer::new();
        reply.error_frame(ResponseCode::InvalidCommand, "Invalid Command");
        assert_eq!(&reply.as_bytes()[..5], &[0x0D, 0x05, 0, 0, 0]);
        assert_eq!(&reply.as_bytes()[5..], b"Invalid Command");
    }
}
