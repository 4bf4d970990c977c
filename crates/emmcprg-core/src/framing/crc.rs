//! CRC-16 used on every frame.
//!
//! Reflected CCITT polynomial, initial value `0xFFFF`, final XOR
//! `0xFFFF`, transmitted little-endian after the payload.

use crc::{CRC_16_IBM_SDLC, Crc};

use crate::protocol::constants::{CRC_SIZE, CRC_STEP};

/// CRC-16 calculator for frame integrity.
pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// CRC over a complete buffer.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Verify the trailing little-endian CRC of `frame`.
///
/// The payload is digested in [`CRC_STEP`] byte steps and `between_steps`
/// runs before each step, so a slow CRC never starves the receive path.
pub fn verify_stepped<F: FnMut()>(frame: &[u8], mut between_steps: F) -> bool {
    if frame.len() < CRC_SIZE {
        return false;
    }
    let (payload, trailer) = frame.split_at(frame.len() - CRC_SIZE);
    let mut digest = CRC16.digest();
    for chunk in payload.chunks(CRC_STEP) {
        between_steps();
        digest.update(chunk);
    }
    digest.finalize() == u16::from_le_bytes([trailer[0], trailer[1]])
}

/// Append the little-endian CRC of `data` to it.
pub fn append_crc(data: &mut Vec<u8>) {
    let crc = crc16(data);
    data.extend_from_slice(&crc.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc16(b"123456789"), 0x906E);
    }

    #[test]
    fn test_verify_appended() {
        let mut frame = b"\x09hello".to_vec();
        append_crc(&mut frame);
        assert!(verify_stepped(&frame, || {}));

        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert!(!verify_stepped(&frame, || {}));
    }

    #[test]
    fn test_stepping_polls_between_chunks() {
        let mut frame = vec![0x5A; 300];
        append_crc(&mut frame);
        let mut polls = 0;
        assert!(verify_stepped(&frame, || polls += 1));
        // 300 bytes in 128 byte steps
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_verify_too_short() {
        assert!(!verify_stepped(&[0x01], || {}));
    }
}
