//! Per-instance FIFO of filled chunks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use pr_ir::Sample;

use crate::chunk::FrameChunk;

/// A lock-protected queue shared by one producer and the mixer.
///
/// Producers lock once per chunk, not per frame. The depth is mirrored in an
/// atomic so readiness can be computed without taking every lock.
#[derive(Debug)]
pub struct ChunkQueue<T> {
    chunks: Mutex<VecDeque<FrameChunk<T>>>,
    depth: AtomicUsize,
    complete: AtomicBool,
}

impl<T: Sample> ChunkQueue<T> {
    pub fn new() -> Self {
        Self {
            chunks: Mutex::new(VecDeque::new()),
            depth: AtomicUsize::new(0),
            complete: AtomicBool::new(false),
        }
    }

    pub fn enqueue(&self, chunk: FrameChunk<T>) {
        let mut chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);
        chunks.push_back(chunk);
        self.depth.store(chunks.len(), Ordering::Release);
    }

    /// Remove the oldest chunk.
    ///
    /// Panics if the queue is empty: callers must check readiness first.
    pub fn dequeue(&self) -> FrameChunk<T> {
        let mut chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(chunk) = chunks.pop_front() else {
            panic!("dequeue from an empty chunk queue");
        };
        self.depth.store(chunks.len(), Ordering::Release);
        chunk
    }

    /// Number of queued chunks.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Mark that no further chunks will arrive. Must follow the final enqueue.
    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Complete with nothing left to mix. Such a queue never blocks a round.
    ///
    /// Reads the flag before the depth: a queue that reports complete has
    /// already enqueued its last chunk.
    pub fn is_drained(&self) -> bool {
        self.is_complete() && self.depth() == 0
    }
}

impl<T: Sample> Default for ChunkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
