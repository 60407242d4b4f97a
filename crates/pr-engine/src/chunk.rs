//! Fixed-capacity frame buffers handed from a producer to the mixer.

use pr_ir::{AudioFrame, Sample};

/// A block of frames with a fixed capacity.
///
/// Not `Clone`: a chunk has exactly one owner at a time (the producer while
/// filling, then its queue, then the mixer).
#[derive(Debug)]
pub struct FrameChunk<T> {
    frames: Vec<AudioFrame<T>>,
    capacity: usize,
}

impl<T: Sample> FrameChunk<T> {
    /// Allocate an empty chunk holding up to `capacity` frames.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "chunk capacity must be non-zero");
        Self {
            frames: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame. Returns `true` once the chunk is full.
    ///
    /// Panics if the chunk is already full.
    pub fn push(&mut self, frame: AudioFrame<T>) -> bool {
        assert!(!self.is_full(), "push into a full chunk");
        self.frames.push(frame);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frames(&self) -> &[AudioFrame<T>] {
        &self.frames
    }

    /// Mix this chunk's frames onto the front of `out`.
    pub fn mix_into(&self, out: &mut [AudioFrame<T>]) {
        for (dst, &src) in out.iter_mut().zip(&self.frames) {
            dst.mix(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_to_capacity() {
        let mut chunk = FrameChunk::<i16>::with_capacity(3);
        assert!(chunk.is_empty());
        assert!(!chunk.push(AudioFrame::new(1, 1)));
        assert!(!chunk.push(AudioFrame::new(2, 2)));
        assert!(chunk.push(AudioFrame::new(3, 3)));
        assert!(chunk.is_full());
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.frames()[2], AudioFrame::new(3, 3));
    }

    #[test]
    #[should_panic(expected = "full chunk")]
    fn push_past_capacity_panics() {
        let mut chunk = FrameChunk::<i16>::with_capacity(1);
        chunk.push(AudioFrame::silence());
        chunk.push(AudioFrame::silence());
    }

    #[test]
    fn mix_into_saturates() {
        let mut chunk = FrameChunk::<i16>::with_capacity(2);
        chunk.push(AudioFrame::new(30000, -30000));
        let mut out = vec![AudioFrame::new(10000, -10000), AudioFrame::new(5, 5)];
        chunk.mix_into(&mut out);
        assert_eq!(out[0], AudioFrame::new(i16::MAX, i16::MIN));
        assert_eq!(out[1], AudioFrame::new(5, 5));
    }
}
