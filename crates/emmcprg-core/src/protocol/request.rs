//! Typed views of request payloads.
//!
//! All parsers take the effective frame (opcode first, trailing CRC
//! already stripped).

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use thiserror::Error;

use super::constants::*;
use crate::framing::crc::crc16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Packet too short: expected at least {expected}, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("Invalid packet length: expected {expected}, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("Invalid magic number")]
    BadMagic,
    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("Payload of {0} bytes too large")]
    TooLarge(usize),
    #[error("Invalid CRC: expected 0x{expected:04X}, got 0x{actual:04X}")]
    BadCrc { expected: u16, actual: u16 },
    #[error("Truncated payload")]
    Truncated,
}

impl From<std::io::Error> for RequestError {
    fn from(_: std::io::Error) -> Self {
        RequestError::Truncated
    }
}

fn require_len(frame: &[u8], expected: usize) -> Result<(), RequestError> {
    if frame.len() < expected {
        return Err(RequestError::TooShort {
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}

fn exact_len(frame: &[u8], expected: usize) -> Result<(), RequestError> {
    if frame.len() != expected {
        return Err(RequestError::WrongLength {
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}

/// Hello request: `[0x01][magic:32][max ver][min ver][features...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloRequest {
    pub max_version: u8,
    pub min_version: u8,
    /// First feature byte. Additional feature bytes are ignored.
    pub features: u8,
}

impl HelloRequest {
    /// Checks run in host-visible order: magic, version, then length.
    pub fn parse(frame: &[u8]) -> Result<Self, RequestError> {
        match frame.get(1..33) {
            Some(magic) if magic == HOST_MAGIC => {}
            _ => return Err(RequestError::BadMagic),
        }
        if let Some(&min_version) = frame.get(34) {
            if min_version < MIN_PROTOCOL_VERSION {
                return Err(RequestError::UnsupportedVersion(min_version));
            }
        }
        require_len(frame, HELLO_MIN_LENGTH)?;

        Ok(Self {
            max_version: frame[33],
            min_version: frame[34],
            features: frame[35],
        })
    }
}

/// Simple read request: `[0x03][addr u32][len u16]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub address: u32,
    pub length: u16,
}

impl ReadRequest {
    pub const SIZE: usize = 7;

    pub fn parse(frame: &[u8]) -> Result<Self, RequestError> {
        exact_len(frame, Self::SIZE)?;
        let mut cursor = Cursor::new(&frame[1..]);
        let address = cursor.read_u32::<LittleEndian>()?;
        let length = cursor.read_u16::<LittleEndian>()?;
        if length as usize > MAX_DATA_LENGTH {
            return Err(RequestError::TooLarge(length as usize));
        }
        Ok(Self { address, length })
    }
}

/// Stream write request: `[0x07][addr u32][data...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamWrite<'a> {
    pub address: u32,
    pub data: &'a [u8],
}

impl<'a> StreamWrite<'a> {
    pub const HEADER_SIZE: usize = 5;

    pub fn parse(frame: &'a [u8]) -> Result<Self, RequestError> {
        require_len(frame, Self::HEADER_SIZE)?;
        let mut cursor = Cursor::new(&frame[1..Self::HEADER_SIZE]);
        let address = cursor.read_u32::<LittleEndian>()?;
        Ok(Self {
            address,
            data: &frame[Self::HEADER_SIZE..],
        })
    }
}

/// Requests carrying a mode byte and an optional payload: open,
/// security mode, partition table and open multi-image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRequest<'a> {
    pub mode: u8,
    pub payload: &'a [u8],
}

impl<'a> ModeRequest<'a> {
    pub fn parse(frame: &'a [u8]) -> Result<Self, RequestError> {
        require_len(frame, 2)?;
        Ok(Self {
            mode: frame[1],
            payload: &frame[2..],
        })
    }
}

/// Partition info request:
/// `[0x23][sub][words u32 x 8][magic u16][crc u16]`.
///
/// The CRC covers the sub-command, size words and magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionInfoRequest {
    pub sub_command: u8,
    pub words: [u32; PARTITION_INFO_WORDS],
}

impl PartitionInfoRequest {
    pub fn parse(frame: &[u8]) -> Result<Self, RequestError> {
        exact_len(frame, PARTITION_INFO_LENGTH)?;
        let mut cursor = Cursor::new(&frame[1..]);
        let sub_command = cursor.read_u8()?;
        let mut words = [0u32; PARTITION_INFO_WORDS];
        for word in words.iter_mut() {
            *word = cursor.read_u32::<LittleEndian>()?;
        }
        let magic = cursor.read_u16::<LittleEndian>()?;
        let crc = cursor.read_u16::<LittleEndian>()?;

        if magic != PARTITION_INFO_MAGIC {
            return Err(RequestError::BadMagic);
        }
        let expected = crc16(&frame[1..PARTITION_INFO_LENGTH - 2]);
        if crc != expected {
            return Err(RequestError::BadCrc {
                expected,
                actual: crc,
            });
        }
        Ok(Self { sub_command, words })
    }

    /// Build the wire form, used by host tools and tests.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PARTITION_INFO_LENGTH);
        buf.push(CMD_PARTITION_INFO);
        buf.push(self.sub_command);
        for &w in &self.words {
            buf.extend_from_slice(&w.to_le_bytes());
        }
        buf.extend_from_slice(&PARTITION_INFO_MAGIC.to_le_bytes());
        let crc = crc16(&buf[1..]);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello(min_version: u8, features: u8) -> Vec<u8> {
        let mut frame = vec![CMD_HELLO];
        frame.extend_from_slice(HOST_MAGIC);
        frame.push(PROTOCOL_VERSION);
        frame.push(min_version);
        frame.push(features);
        frame
    }

    #[test]
    fn test_hello_parse() {
        let req = HelloRequest::parse(&hello(2, 0x10)).unwrap();
        assert_eq!(req.min_version, 2);
        assert_eq!(req.max_version, PROTOCOL_VERSION);
        assert_eq!(req.features, 0x10);
    }

    #[test]
    fn test_hello_extra_feature_bytes() {
        let mut frame = hello(3, 0x01);
        frame.extend_from_slice(&[0xFF, 0xFF]);
        assert_eq!(HelloRequest::parse(&frame).unwrap().features, 0x01);
    }

    #[test]
    fn test_hello_bad_magic() {
        let mut frame = hello(2, 0);
        frame[5] = b'X';
        assert_eq!(HelloRequest::parse(&frame), Err(RequestError::BadMagic));
        assert_eq!(HelloRequest::parse(&[CMD_HELLO]), Err(RequestError::BadMagic));
    }

    #[test]
    fn test_hello_old_version() {
        assert_eq!(
            HelloRequest::parse(&hello(1, 0)),
            Err(RequestError::UnsupportedVersion(1))
        );
    }

    #[test]
    fn test_hello_too_short() {
        let frame = hello(2, 0);
        assert!(matches!(
            HelloRequest::parse(&frame[..35]),
            Err(RequestError::TooShort { expected: 36, .. })
        ));
    }

    #[test]
    fn test_read_parse() {
        let frame = [CMD_READ, 0x00, 0x02, 0x00, 0x00, 0x00, 0x04];
        let req = ReadRequest::parse(&frame).unwrap();
        assert_eq!(req.address, 0x200);
        assert_eq!(req.length, 0x400);
    }

    #[test]
    fn test_read_limits() {
        let frame = [CMD_READ, 0, 0, 0, 0, 0x01, 0x04];
        assert_eq!(ReadRequest::parse(&frame), Err(RequestError::TooLarge(0x401)));
        assert!(matches!(
            ReadRequest::parse(&frame[..6]),
            Err(RequestError::WrongLength { expected: 7, actual: 6 })
        ));
    }

    #[test]
    fn test_stream_write_parse() {
        let frame = [CMD_STREAM_WRITE, 0x10, 0, 0, 0, 0xAA, 0xBB];
        let req = StreamWrite::parse(&frame).unwrap();
        assert_eq!(req.address, 0x10);
        assert_eq!(req.data, &[0xAA, 0xBB]);

        let empty = StreamWrite::parse(&frame[..5]).unwrap();
        assert!(empty.data.is_empty());
        assert!(StreamWrite::parse(&frame[..4]).is_err());
    }

    #[test]
    fn test_partition_info_roundtrip() {
        let req = PartitionInfoRequest {
            sub_command: PARTITION_INFO_ZERO_OUT,
            words: [100, 8, 0, 0, 0, 0, 0, 0],
        };
        let bytes = req.to_bytes();
        assert_eq!(bytes.len(), PARTITION_INFO_LENGTH);
        assert_eq!(PartitionInfoRequest::parse(&bytes), Ok(req));
    }

    #[test]
    fn test_partition_info_bad_magic_and_crc() {
        let req = PartitionInfoRequest {
            sub_command: 1,
            words: [1; 8],
        };
        let mut bytes = req.to_bytes();
        bytes[36] ^= 0xFF;
        assert!(matches!(
            PartitionInfoRequest::parse(&bytes),
            Err(RequestError::BadCrc { .. })
        ));

        let mut bytes = req.to_bytes();
        bytes[34] = 0x00;
        assert_eq!(PartitionInfoRequest::parse(&bytes), Err(RequestError::BadMagic));
    }
}
