//! Single-producer single-consumer frame ring for live playback.
//!
//! A ring of capacity `C` holds at most `C - 1` frames: one slot stays free
//! so that full and empty are distinguishable from the cursors alone. The
//! storage and cursors come from `ringbuf`, whose cursor updates use
//! acquire/release ordering.

use pr_ir::{AudioFrame, Sample};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Owner of a ring before it is split into its two ends.
pub struct RingBuffer<T: Sample> {
    capacity: usize,
    inner: HeapRb<AudioFrame<T>>,
}

impl<T: Sample> RingBuffer<T> {
    /// Create a ring with `capacity` slots.
    ///
    /// Panics if `capacity < 2`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "ring capacity must be at least 2");
        Self {
            capacity,
            inner: HeapRb::new(capacity - 1),
        }
    }

    pub fn split(self) -> (RingProducer<T>, RingConsumer<T>) {
        let (prod, cons) = self.inner.split();
        (
            RingProducer {
                capacity: self.capacity,
                inner: prod,
            },
            RingConsumer {
                capacity: self.capacity,
                inner: cons,
            },
        )
    }
}

/// Write end, owned by the stepping loop.
pub struct RingProducer<T: Sample> {
    capacity: usize,
    inner: HeapProd<AudioFrame<T>>,
}

impl<T: Sample> RingProducer<T> {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn writable(&self) -> usize {
        self.inner.vacant_len()
    }

    pub fn readable(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Push one frame. Returns `false` if the ring is full.
    pub fn push(&mut self, frame: AudioFrame<T>) -> bool {
        self.inner.try_push(frame).is_ok()
    }
}

/// Read end, owned by the audio callback.
pub struct RingConsumer<T: Sample> {
    capacity: usize,
    inner: HeapCons<AudioFrame<T>>,
}

impl<T: Sample> RingConsumer<T> {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn readable(&self) -> usize {
        self.inner.occupied_len()
    }

    pub fn writable(&self) -> usize {
        self.inner.vacant_len()
    }

    pub fn pop(&mut self) -> Option<AudioFrame<T>> {
        self.inner.try_pop()
    }

    /// Pop up to `dest.len()` frames and mix them onto `dest`.
    ///
    /// Returns the number of frames consumed. Never blocks or allocates.
    pub fn read_mix(&mut self, dest: &mut [AudioFrame<T>]) -> usize {
        let count = dest.len().min(self.readable());
        for slot in &mut dest[..count] {
            if let Some(frame) = self.inner.try_pop() {
                slot.mix(frame);
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring_has_capacity_minus_one_writable() {
        let (prod, cons) = RingBuffer::<i16>::new(8).split();
        assert_eq!(prod.capacity(), 8);
        assert_eq!(prod.writable(), 7);
        assert_eq!(cons.readable(), 0);
    }

    #[test]
    fn full_ring_rejects_push() {
        let (mut prod, cons) = RingBuffer::<i16>::new(4).split();
        for i in 0..3 {
            assert!(prod.push(AudioFrame::new(i, i)));
        }
        assert_eq!(prod.writable(), 0);
        assert!(!prod.push(AudioFrame::new(9, 9)));
        assert_eq!(cons.readable(), 3);
    }

    #[test]
    fn readable_plus_writable_is_constant() {
        let (mut prod, mut cons) = RingBuffer::<i32>::new(5).split();
        let ops: [(usize, usize); 6] = [(3, 0), (0, 2), (3, 0), (0, 4), (2, 1), (0, 5)];
        for (pushes, pops) in ops {
            for _ in 0..pushes {
                prod.push(AudioFrame::new(1, 1));
            }
            for _ in 0..pops {
                cons.pop();
            }
            assert_eq!(prod.readable() + prod.writable(), 4);
            assert_eq!(cons.readable() + cons.writable(), 4);
        }
    }

    #[test]
    fn read_mix_accumulates_and_wraps() {
        let (mut prod, mut cons) = RingBuffer::<i16>::new(4).split();
        for round in 0..5i16 {
            prod.push(AudioFrame::new(round, -round));
            prod.push(AudioFrame::new(round, -round));
            let mut dest = [AudioFrame::new(100, 100); 3];
            assert_eq!(cons.read_mix(&mut dest), 2);
            assert_eq!(dest[0], AudioFrame::new(100 + round, 100 - round));
            assert_eq!(dest[2], AudioFrame::new(100, 100));
        }
    }

    #[test]
    fn fifo_across_threads() {
        let (mut prod, mut cons) = RingBuffer::<i32>::new(16).split();
        let writer = std::thread::spawn(move || {
            for i in 0..10_000 {
                while !prod.push(AudioFrame::new(i, i)) {
                    std::hint::spin_loop();
                }
            }
        });
        let mut expected = 0;
        while expected < 10_000 {
            if let Some(frame) = cons.pop() {
                assert_eq!(frame.left, expected);
                expected += 1;
            }
        }
        writer.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "at least 2")]
    fn rejects_tiny_capacity() {
        RingBuffer::<i16>::new(1);
    }
}
