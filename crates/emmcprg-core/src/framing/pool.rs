//! Fixed pool of packet records.
//!
//! Records live in an arena and are addressed by [`PacketId`]. Each record
//! is in exactly one state at a time: free, filling (owned by the
//! deframer), waiting (queued for dispatch) or processing (owned by the
//! dispatcher). Transitions that would put a record in two places at once
//! are rejected with a [`PoolError`].

use heapless::Deque;
use thiserror::Error;

use crate::protocol::constants::{MAX_PACKET_SIZE, NUMBER_OF_PACKETS};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("Packet {id} is {actual:?}, expected {expected:?}")]
    WrongState {
        id: usize,
        expected: SlotState,
        actual: SlotState,
    },
    #[error("Packet {0} out of range")]
    OutOfRange(usize),
}

/// Index of a record in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketId(usize);

impl PacketId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Ownership state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Filling,
    Waiting,
    Processing,
}

/// Fixed-capacity frame buffer.
///
/// `length` keeps counting past capacity so oversized frames can be
/// rejected by length instead of being silently truncated.
#[derive(Clone)]
pub struct PacketRecord {
    data: [u8; MAX_PACKET_SIZE],
    length: usize,
}

impl PacketRecord {
    pub const fn new() -> Self {
        Self {
            data: [0; MAX_PACKET_SIZE],
            length: 0,
        }
    }

    /// Append a byte, counting it even when past capacity.
    pub fn push(&mut self, byte: u8) {
        if self.length < MAX_PACKET_SIZE {
            self.data[self.length] = byte;
        }
        self.length = self.length.saturating_add(1);
    }

    /// Append a run of bytes known to fit.
    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }

    /// Counted length, possibly larger than the stored bytes.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Stored bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.length.min(MAX_PACKET_SIZE)]
    }

    pub fn clear(&mut self) {
        self.length = 0;
    }
}

impl Default for PacketRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PacketRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketRecord")
            .field("length", &self.length)
            .finish()
    }
}

/// Arena of `N` packet records with a free list and a waiting FIFO.
pub struct PacketPool<const N: usize = NUMBER_OF_PACKETS> {
    records: [PacketRecord; N],
    states: [SlotState; N],
    free: Deque<PacketId, N>,
    waiting: Deque<PacketId, N>,
}

impl<const N: usize> PacketPool<N> {
    pub fn new() -> Self {
        let mut free = Deque::new();
        for i in 0..N {
            // Capacity is N, so every slot fits.
            let _ = free.push_back(PacketId(i));
        }
        Self {
            records: std::array::from_fn(|_| PacketRecord::new()),
            states: [SlotState::Free; N],
            free,
            waiting: Deque::new(),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Take a record from the free list. The record starts empty.
    pub fn acquire(&mut self) -> Option<PacketId> {
        let id = self.free.pop_front()?;
        self.states[id.0] = SlotState::Filling;
        self.records[id.0].clear();
        Some(id)
    }

    /// Queue a filled record for dispatch.
    pub fn enqueue(&mut self, id: PacketId) -> Result<(), PoolError> {
        self.expect_state(id, SlotState::Filling)?;
        self.states[id.0] = SlotState::Waiting;
        // A record can only be waiting once, so the queue never overflows.
        let _ = self.waiting.push_back(id);
        Ok(())
    }

    /// Take the oldest waiting record for processing.
    pub fn dequeue(&mut self) -> Option<PacketId> {
        let id = self.waiting.pop_front()?;
        self.states[id.0] = SlotState::Processing;
        Some(id)
    }

    /// Return a processed (or abandoned in-fill) record to the free list.
    pub fn release(&mut self, id: PacketId) -> Result<(), PoolError> {
        let state = self.state(id)?;
        if state != SlotState::Processing && state != SlotState::Filling {
            return Err(PoolError::WrongState {
                id: id.0,
                expected: SlotState::Processing,
                actual: state,
            });
        }
        self.states[id.0] = SlotState::Free;
        let _ = self.free.push_back(id);
        Ok(())
    }

    pub fn state(&self, id: PacketId) -> Result<SlotState, PoolError> {
        self.states
            .get(id.0)
            .copied()
            .ok_or(PoolError::OutOfRange(id.0))
    }

    pub fn record(&self, id: PacketId) -> &PacketRecord {
        &self.records[id.0]
    }

    pub fn record_mut(&mut self, id: PacketId) -> &mut PacketRecord {
        &mut self.records[id.0]
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    fn expect_state(&self, id: PacketId, expected: SlotState) -> Result<(), PoolError> {
        let actual = self.state(id)?;
        if actual != expected {
            return Err(PoolError::WrongState {
                id: id.0,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

impl<const N: usize> Default for PacketPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_until_empty() {
        let mut pool: PacketPool<2> = PacketPool::new();
        assert!(pool.acquire().is_some());
        assert!(pool.acquire().is_some());
        assert!(pool.acquire().is_none());
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn test_fifo_order() {
        let mut pool: PacketPool<2> = PacketPool::new();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        pool.enqueue(b).unwrap();
        pool.enqueue(a).unwrap();

        assert_eq!(pool.dequeue(), Some(b));
        assert_eq!(pool.dequeue(), Some(a));
        assert_eq!(pool.dequeue(), None);
    }

    #[test]
    fn test_lifecycle_states() {
        let mut pool: PacketPool<2> = PacketPool::new();
        let id = pool.acquire().unwrap();
        assert_eq!(pool.state(id), Ok(SlotState::Filling));
        pool.enqueue(id).unwrap();
        assert_eq!(pool.state(id), Ok(SlotState::Waiting));
        pool.dequeue().unwrap();
        assert_eq!(pool.state(id), Ok(SlotState::Processing));
        pool.release(id).unwrap();
        assert_eq!(pool.state(id), Ok(SlotState::Free));
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_double_release_rejected() {
        let mut pool: PacketPool<2> = PacketPool::new();
        let id = pool.acquire().unwrap();
        pool.release(id).unwrap();
        assert!(matches!(
            pool.release(id),
            Err(PoolError::WrongState {
                actual: SlotState::Free,
                ..
            })
        ));
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_release_waiting_rejected() {
        let mut pool: PacketPool<2> = PacketPool::new();
        let id = pool.acquire().unwrap();
        pool.enqueue(id).unwrap();
        assert!(pool.release(id).is_err());
        assert!(pool.enqueue(id).is_err());
    }

    #[test]
    fn test_record_counts_past_capacity() {
        let mut record = PacketRecord::new();
        for _ in 0..MAX_PACKET_SIZE + 3 {
            record.push(0xAA);
        }
        assert_eq!(record.len(), MAX_PACKET_SIZE + 3);
        assert_eq!(record.bytes().len(), MAX_PACKET_SIZE);
    }

    #[test]
    fn test_acquire_clears_record() {
        let mut pool: PacketPool<1> = PacketPool::new();
        let id = pool.acquire().unwrap();
        pool.record_mut(id).push(1);
        pool.release(id).unwrap();
        let id = pool.acquire().unwrap();
        assert!(pool.record(id).is_empty());
    }
}
