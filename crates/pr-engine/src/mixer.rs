//! Cross-instance chunk mixer.
//!
//! Each instance fills chunks through its own [`ChunkProducer`] at whatever
//! rate its emulator runs. The consumer waits until every live queue has at
//! least one chunk, then mixes one chunk from each queue per round.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

use arrayvec::ArrayVec;
use pr_ir::{AudioFrame, Sample};

use crate::chunk::FrameChunk;
use crate::chunk_queue::ChunkQueue;

/// At most one queue per MIDI channel.
pub const MAX_INSTANCES: usize = 16;

/// Frames per chunk, about two seconds at 32 kHz.
pub const DEFAULT_CHUNK_FRAMES: usize = 64 * 1024;

struct Slot<T> {
    queue: ChunkQueue<T>,
    claimed: AtomicBool,
}

/// Mixes N chunk queues into one stream.
pub struct Mixer<T> {
    slots: ArrayVec<Slot<T>, MAX_INSTANCES>,
    chunk_frames: usize,
    signal: Mutex<()>,
    work: Condvar,
}

impl<T: Sample> Mixer<T> {
    /// Create a mixer with `instances` queues.
    ///
    /// Panics if `instances` is outside `1..=MAX_INSTANCES` or
    /// `chunk_frames` is zero.
    pub fn new(instances: usize, chunk_frames: usize) -> Self {
        assert!(
            (1..=MAX_INSTANCES).contains(&instances),
            "instance count {instances} outside 1..={MAX_INSTANCES}"
        );
        assert!(chunk_frames > 0, "chunk size must be non-zero");
        let slots = (0..instances)
            .map(|_| Slot {
                queue: ChunkQueue::new(),
                claimed: AtomicBool::new(false),
            })
            .collect();
        Self {
            slots,
            chunk_frames,
            signal: Mutex::new(()),
            work: Condvar::new(),
        }
    }

    pub fn instances(&self) -> usize {
        self.slots.len()
    }

    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames
    }

    /// Take the producer end of queue `queue_id`.
    ///
    /// Panics if the id is out of range or the queue already has a producer.
    pub fn producer(&self, queue_id: usize) -> ChunkProducer<'_, T> {
        let slot = &self.slots[queue_id];
        assert!(
            !slot.claimed.swap(true, Ordering::AcqRel),
            "queue {queue_id} already has a producer"
        );
        ChunkProducer {
            mixer: self,
            queue_id,
            chunk: Some(FrameChunk::with_capacity(self.chunk_frames)),
        }
    }

    /// Number of rounds that can be mixed right now.
    ///
    /// The minimum queue depth over all queues, skipping queues that are
    /// complete and empty. Zero when no queue has anything left.
    pub fn ready_chunk_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !slot.queue.is_drained())
            .map(|slot| slot.queue.depth())
            .min()
            .unwrap_or(0)
    }

    /// True once every queue is complete and empty.
    pub fn is_finished(&self) -> bool {
        self.slots.iter().all(|slot| slot.queue.is_drained())
    }

    /// Block until a round is ready or the job is finished.
    pub fn wait_for_work(&self) {
        let guard = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = self
            .work
            .wait_while(guard, |_| self.ready_chunk_count() == 0 && !self.is_finished())
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Mix one round into `out`, replacing its contents.
    ///
    /// Dequeues one chunk from every queue that is not drained. The output
    /// length is the longest chunk; shorter chunks only cover a prefix.
    /// Returns the number of frames written.
    ///
    /// Call only when [`Mixer::ready_chunk_count`] is non-zero (or the job
    /// is finished, which yields zero frames).
    pub fn mix_frames(&self, out: &mut Vec<AudioFrame<T>>) -> usize {
        out.clear();

        let mut chunks: ArrayVec<FrameChunk<T>, MAX_INSTANCES> = ArrayVec::new();
        for (queue_id, slot) in self.slots.iter().enumerate() {
            if slot.queue.is_drained() {
                tracing::trace!(queue_id, "skipping finished queue with no data");
                continue;
            }
            chunks.push(slot.queue.dequeue());
        }

        let len = chunks.iter().map(FrameChunk::len).max().unwrap_or(0);
        out.resize(len, AudioFrame::silence());
        for chunk in &chunks {
            chunk.mix_into(out);
        }
        len
    }

    fn enqueue(&self, queue_id: usize, chunk: FrameChunk<T>) {
        self.slots[queue_id].queue.enqueue(chunk);
        self.notify();
    }

    fn complete(&self, queue_id: usize, last: FrameChunk<T>) {
        let queue = &self.slots[queue_id].queue;
        if !last.is_empty() {
            queue.enqueue(last);
        }
        queue.mark_complete();
        self.notify();
    }

    fn notify(&self) {
        // Taking the lock orders this wakeup after the consumer's predicate
        // check, so the wakeup cannot be lost.
        let _guard = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
        self.work.notify_one();
    }

    /// Log every queue's depth and state.
    pub fn log_queues(&self) {
        for (queue_id, slot) in self.slots.iter().enumerate() {
            tracing::debug!(
                queue_id,
                depth = slot.queue.depth(),
                complete = slot.queue.is_complete(),
                "queue state"
            );
        }
    }
}

/// The producer end of one mixer queue.
///
/// Dropping a producer without calling [`ChunkProducer::mark_complete`]
/// completes it anyway, so a worker that unwinds cannot stall the mixer.
pub struct ChunkProducer<'a, T: Sample> {
    mixer: &'a Mixer<T>,
    queue_id: usize,
    chunk: Option<FrameChunk<T>>,
}

impl<T: Sample> ChunkProducer<'_, T> {
    pub fn queue_id(&self) -> usize {
        self.queue_id
    }

    /// Append a frame, handing the chunk to the queue once it fills.
    pub fn submit_frame(&mut self, frame: AudioFrame<T>) {
        let Some(chunk) = self.chunk.as_mut() else {
            return;
        };
        if chunk.push(frame) {
            let fresh = FrameChunk::with_capacity(self.mixer.chunk_frames);
            if let Some(full) = self.chunk.replace(fresh) {
                self.mixer.enqueue(self.queue_id, full);
            }
        }
    }

    /// Flush the partial chunk and mark this queue finished.
    pub fn mark_complete(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(last) = self.chunk.take() {
            self.mixer.complete(self.queue_id, last);
        }
    }
}

impl<T: Sample> Drop for ChunkProducer<'_, T> {
    fn drop(&mut self) {
        self.finish();
    }
}
