//! Command table.
//!
//! Every opcode in the built-in range maps to one [`Command`]. Reply
//! opcodes, retired commands and ECC commands resolve to
//! [`Command::Invalid`].

use super::constants::*;

/// Built-in commands served by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Hello,
    Read,
    SimpleWrite,
    StreamWrite,
    Nop,
    Reset,
    PowerOff,
    Open,
    Close,
    SecurityMode,
    PartitionTable,
    OpenMulti,
    Erase,
    PartitionInfo,
    /// Reply opcodes and commands the target does not implement.
    Invalid,
}

impl Command {
    /// Resolve an opcode within the built-in range.
    ///
    /// Returns `None` for opcodes outside `FIRST_COMMAND..=LAST_COMMAND`,
    /// which the dispatcher offers to the extension table first.
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        if !(FIRST_COMMAND..=LAST_COMMAND).contains(&opcode) {
            return None;
        }
        Some(match opcode {
            CMD_HELLO => Command::Hello,
            CMD_READ => Command::Read,
            CMD_SIMPLE_WRITE => Command::SimpleWrite,
            CMD_STREAM_WRITE => Command::StreamWrite,
            CMD_NOP => Command::Nop,
            CMD_RESET => Command::Reset,
            CMD_POWER_OFF => Command::PowerOff,
            CMD_OPEN => Command::Open,
            CMD_CLOSE => Command::Close,
            CMD_SECURITY_MODE => Command::SecurityMode,
            CMD_PARTITION_TABLE => Command::PartitionTable,
            CMD_OPEN_MULTI => Command::OpenMulti,
            CMD_ERASE => Command::Erase,
            CMD_PARTITION_INFO => Command::PartitionInfo,
            _ => Command::Invalid,
        })
    }

    /// Whether the command may run before the hello handshake.
    pub fn allowed_before_handshake(self) -> bool {
        self == Command::Hello
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_opcodes() {
        assert_eq!(Command::from_opcode(0x01), Some(Command::Hello));
        assert_eq!(Command::from_opcode(0x07), Some(Command::StreamWrite));
        assert_eq!(Command::from_opcode(0x1B), Some(Command::OpenMulti));
        assert_eq!(Command::from_opcode(0x23), Some(Command::PartitionInfo));
    }

    #[test]
    fn test_reply_opcodes_are_invalid() {
        for opcode in (FIRST_COMMAND + 1..=LAST_COMMAND).step_by(2) {
            assert_eq!(
                Command::from_opcode(opcode),
                Some(Command::Invalid),
                "opcode 0x{:02X}",
                opcode
            );
        }
    }

    #[test]
    fn test_unimplemented_requests() {
        assert_eq!(Command::from_opcode(CMD_UNLOCK), Some(Command::Invalid));
        assert_eq!(Command::from_opcode(CMD_GET_ECC), Some(Command::Invalid));
        assert_eq!(Command::from_opcode(CMD_SET_ECC), Some(Command::Invalid));
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(Command::from_opcode(0x00), None);
        assert_eq!(Command::from_opcode(0x24), None);
        assert_eq!(Command::from_opcode(0xFF), None);
    }
}
