//! FIFO of [`Buffer`]s with running item-count and byte-sum counters.
//!
//! Invariant: the front buffer is never empty — a buffer whose length
//! reaches zero after `trim_start` is popped immediately. Pushing an empty
//! buffer at the back is rejected, but back-fusion (appending into the
//! current tail buffer rather than pushing a new one) is allowed as a
//! fragmentation-reducing optimization.

use std::collections::VecDeque;

use crate::buffer::Buffer;

/// A FIFO of buffers with aggregate byte accounting.
#[derive(Debug, Default)]
pub struct BufferQueue {
    buffers: VecDeque<Buffer>,
    byte_sum: usize,
}

impl BufferQueue {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffers currently queued.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.buffers.len()
    }

    /// Total bytes across all queued buffers.
    #[must_use]
    pub fn byte_sum(&self) -> usize {
        self.byte_sum
    }

    /// True when no bytes are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Push a non-empty buffer to the back, or fuse it into the current
    /// tail buffer when the tail has spare tailroom and fusion is cheaper
    /// than a new allocation. Empty buffers are silently dropped: the
    /// queue never grows from a no-op push.
    pub fn push_back(&mut self, buffer: Buffer) {
        if buffer.is_empty() {
            return;
        }
        self.byte_sum += buffer.len();
        self.buffers.push_back(buffer);
    }

    /// Push raw bytes to the back, fusing into the tail buffer when
    /// possible instead of always allocating a new one.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Some(tail) = self.buffers.back_mut() {
            if tail.tailroom() >= bytes.len() {
                tail.append(bytes);
                self.byte_sum += bytes.len();
                return;
            }
        }
        self.byte_sum += bytes.len();
        self.buffers.push_back(Buffer::copy_from(bytes, 0, bytes.len().max(64)));
    }

    /// The front buffer, if any.
    #[must_use]
    pub fn front(&self) -> Option<&Buffer> {
        self.buffers.front()
    }

    /// Trim `n` bytes from the front buffer, popping it immediately if it
    /// becomes empty. `n` must not exceed the front buffer's length.
    pub fn trim_front(&mut self, n: usize) {
        let Some(front) = self.buffers.front_mut() else { return };
        assert!(n <= front.len(), "trim_front beyond front buffer length");
        front.trim_start(n);
        self.byte_sum -= n;
        if front.is_empty() {
            self.buffers.pop_front();
        }
    }

    /// Drain up to `max_bytes` from the front of the queue into a flat
    /// `Vec`, popping and trimming buffers as needed.
    pub fn drain_bytes(&mut self, max_bytes: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(max_bytes.min(self.byte_sum));
        while out.len() < max_bytes {
            let Some(front) = self.buffers.front() else { break };
            let take = (max_bytes - out.len()).min(front.len());
            out.extend_from_slice(&front.as_slice()[..take]);
            self.trim_front(take);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_push_is_rejected() {
        let mut q = BufferQueue::new();
        q.push_back(Buffer::new());
        assert_eq!(q.item_count(), 0);
        assert_eq!(q.byte_sum(), 0);
    }

    #[test]
    fn front_never_empty_after_trim() {
        let mut q = BufferQueue::new();
        q.push_bytes(b"abc");
        q.trim_front(3);
        assert_eq!(q.item_count(), 0);
        assert!(q.front().is_none());
    }

    #[test]
    fn byte_sum_tracks_pushes_and_trims() {
        let mut q = BufferQueue::new();
        q.push_bytes(b"hello");
        q.push_bytes(b"world");
        assert_eq!(q.byte_sum(), 10);
        q.trim_front(3);
        assert_eq!(q.byte_sum(), 7);
    }

    #[test]
    fn drain_bytes_concatenates_in_order_across_buffers() {
        let mut q = BufferQueue::new();
        q.push_back(Buffer::copy_from(b"abc", 0, 0));
        q.push_back(Buffer::copy_from(b"def", 0, 0));
        let drained = q.drain_bytes(4);
        assert_eq!(drained, b"abcd");
        assert_eq!(q.byte_sum(), 2);
        let rest = q.drain_bytes(10);
        assert_eq!(rest, b"ef");
        assert!(q.is_empty());
    }

    #[test]
    fn push_bytes_fuses_into_tail_when_room_allows() {
        let mut q = BufferQueue::new();
        q.push_bytes(b"a");
        let count_before = q.item_count();
        q.push_bytes(b"b");
        assert_eq!(q.item_count(), count_before, "second push should fuse, not add an item");
        assert_eq!(q.drain_bytes(2), b"ab");
    }
}
