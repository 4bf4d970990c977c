//! Extension points for opcodes beyond the built-in command table.
//!
//! Up to [`MAX_EXTENSIONS`] extensions may be registered. Each is offered
//! frames whose opcode lies above the built-in range and is told when the
//! hello handshake completes.

use thiserror::Error;
use tracing::debug;

/// Number of extension slots.
pub const MAX_EXTENSIONS: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExtensionError {
    #[error("All {MAX_EXTENSIONS} extension slots are in use")]
    TableFull,
}

/// Scratch reply handed to an extension.
#[derive(Debug, Default)]
pub struct ExtensionReply {
    bytes: Vec<u8>,
}

impl ExtensionReply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reply frame (opcode first, no CRC).
    pub fn set(&mut self, bytes: &[u8]) {
        self.bytes.clear();
        self.bytes.extend_from_slice(bytes);
    }

    pub fn push(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

/// External command handler.
pub trait Extension {
    /// Offered a frame (opcode first, CRC stripped) the built-in table does
    /// not serve. Return `true` to claim it; anything left in `reply` is
    /// sent back to the host.
    fn on_command(&mut self, frame: &[u8], reply: &mut ExtensionReply) -> bool;

    /// Called once the hello handshake has been answered.
    fn on_handshake(&mut self) {}
}

/// Fixed table of registered extensions.
#[derive(Default)]
pub struct ExtensionTable {
    slots: [Option<Box<dyn Extension>>; MAX_EXTENSIONS],
}

impl ExtensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension in the first free slot.
    pub fn register(&mut self, extension: Box<dyn Extension>) -> Result<usize, ExtensionError> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.is_none())
            .ok_or(ExtensionError::TableFull)?;
        *slot = Some(extension);
        debug!(slot = index, "Extension registered");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offer `frame` to each extension in slot order. Stops at the first
    /// that claims it. Returns `None` if nobody did.
    pub fn dispatch(&mut self, frame: &[u8], reply: &mut ExtensionReply) -> Option<usize> {
        for (index, ext) in self.slots.iter_mut().enumerate() {
            let Some(ext) = ext else { continue };
            reply.clear();
            if ext.on_command(frame, reply) {
                return Some(index);
            }
        }
        reply.clear();
        None
    }

    /// Notify every extension of a completed handshake.
    pub fn notify_handshake(&mut self) {
        for ext in self.slots.iter_mut().flatten() {
            ext.on_handshake();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Echo {
        opcode: u8,
        handshakes: Arc<Mutex<usize>>,
    }

    impl Extension for Echo {
        fn on_command(&mut self, frame: &[u8], reply: &mut ExtensionReply) -> bool {
            if frame[0] != self.opcode {
                return false;
            }
            reply.set(frame);
            true
        }

        fn on_handshake(&mut self) {
            *self.handshakes.lock().unwrap() += 1;
        }
    }

    fn echo(opcode: u8) -> (Box<dyn Extension>, Arc<Mutex<usize>>) {
        let count = Arc::new(Mutex::new(0));
        (
            Box::new(Echo {
                opcode,
                handshakes: count.clone(),
            }),
            count,
        )
    }

    #[test]
    fn test_register_until_full() {
        let mut table = ExtensionTable::new();
        for i in 0..MAX_EXTENSIONS {
            assert_eq!(table.register(echo(0x40).0), Ok(i));
        }
        assert_eq!(table.register(echo(0x40).0), Err(ExtensionError::TableFull));
        assert_eq!(table.len(), MAX_EXTENSIONS);
    }

    #[test]
    fn test_first_claim_wins() {
        let mut table = ExtensionTable::new();
        table.register(echo(0x40).0).unwrap();
        table.register(echo(0x41).0).unwrap();
        table.register(echo(0x41).0).unwrap();

        let mut reply = ExtensionReply::new();
        assert_eq!(table.dispatch(&[0x41, 0xAA], &mut reply), Some(1));
        assert_eq!(reply.as_bytes(), &[0x41, 0xAA]);

        assert_eq!(table.dispatch(&[0x50], &mut reply), None);
        assert!(reply.is_empty());
    }

    #[test]
    fn test_handshake_notifies_all() {
        let mut table = ExtensionTable::new();
        let (a, ca) = echo(0x40);
        let (b, cb) = echo(0x41);
        table.register(a).unwrap();
        table.register(b).unwrap();
        table.notify_handshake();
        assert_eq!(*ca.lock().unwrap(), 1);
        assert_eq!(*cb.lock().unwrap(), 1);
    }
}
