//! In-memory byte channel for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{ByteChannel, ChannelProfile, TransportError};
use crate::framing::crc::append_crc;
use crate::framing::hdlc::{decode_frames, encode_frame};

#[derive(Debug, Default)]
struct MockState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    drains: usize,
    connected: bool,
    /// Bytes handed out per `read` call, `None` for everything pending.
    read_chunk: Option<usize>,
}

/// Mock channel for driving the engine in tests.
///
/// Clones share state, so a test keeps one handle while the engine owns
/// another.
#[derive(Debug, Clone)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
    profile: ChannelProfile,
}

impl MockChannel {
    pub fn new(profile: ChannelProfile) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                connected: true,
                ..Default::default()
            })),
            profile,
        }
    }

    pub fn serial() -> Self {
        Self::new(ChannelProfile::serial())
    }

    pub fn bulk() -> Self {
        Self::new(ChannelProfile::bulk())
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only means another test thread panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue raw bytes for the engine to read.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes.iter().copied());
    }

    /// Queue `payload` as a stuffed, delimited frame.
    pub fn push_frame(&self, payload: &[u8]) {
        self.push_bytes(&encode_frame(payload));
    }

    /// Queue `payload` with its CRC appended, as a host tool sends it.
    pub fn push_request(&self, payload: &[u8]) {
        let mut frame = payload.to_vec();
        append_crc(&mut frame);
        self.push_frame(&frame);
    }

    /// Limit how many bytes each `read` returns.
    pub fn set_read_chunk(&self, chunk: Option<usize>) {
        self.lock().read_chunk = chunk;
    }

    pub fn pending_input(&self) -> usize {
        self.lock().rx.len()
    }

    /// Raw transmitted bytes.
    pub fn sent(&self) -> Vec<u8> {
        self.lock().tx.clone()
    }

    /// Take and decode everything transmitted so far.
    pub fn take_frames(&self) -> Vec<Vec<u8>> {
        let tx = std::mem::take(&mut self.lock().tx);
        decode_frames(&tx)
    }

    pub fn clear_sent(&self) {
        self.lock().tx.clear();
    }

    pub fn drain_count(&self) -> usize {
        self.lock().drains
    }

    pub fn disconnect(&self) {
        self.lock().connected = false;
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::serial()
    }
}

impl ByteChannel for MockChannel {
    fn profile(&self) -> ChannelProfile {
        self.profile
    }

    fn has_data(&mut self) -> bool {
        !self.lock().rx.is_empty()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        let limit = state.read_chunk.unwrap_or(usize::MAX).min(buf.len());
        let n = limit.min(state.rx.len());
        for (slot, b) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }

    fn send_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        state.tx.push(byte);
        Ok(())
    }

    fn drain(&mut self) -> Result<(), TransportError> {
        self.lock().drains += 1;
        Ok(())
    }
}
