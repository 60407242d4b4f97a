//! Live playback: one stepping loop per instance, each feeding its own
//! frame ring, plus the MIDI routing in front of them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pr_ir::{AudioFrame, Sample};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::emulator::Emulator;
use crate::ring_buffer::{RingConsumer, RingProducer};

/// One step may emit two frames when oversampling.
pub const STEP_HEADROOM: usize = 2;

/// How long a stepping loop sleeps when its ring is full.
const FULL_BACKOFF: Duration = Duration::from_millis(1);

/// Byte queue capacity per instance.
pub const DEFAULT_MIDI_QUEUE: usize = 4096;

/// Receive end of one instance's MIDI byte queue.
pub struct MidiInput {
    inner: HeapCons<u8>,
}

impl MidiInput {
    fn drain_into<E: Emulator>(&mut self, emulator: &mut E) {
        while let Some(byte) = self.inner.try_pop() {
            emulator.post_midi(byte);
        }
    }
}

/// Routes incoming MIDI messages to instances.
///
/// Channel messages go to instance `channel % n`. System messages go to
/// every instance.
pub struct MidiRouter {
    outputs: Vec<HeapProd<u8>>,
}

impl MidiRouter {
    /// Create a router for `instances` instances and their input ends.
    pub fn new(instances: usize, queue_capacity: usize) -> (Self, Vec<MidiInput>) {
        let (outputs, inputs): (Vec<_>, Vec<_>) = (0..instances)
            .map(|_| {
                let (prod, cons) = HeapRb::<u8>::new(queue_capacity).split();
                (prod, MidiInput { inner: cons })
            })
            .unzip();
        (Self { outputs }, inputs)
    }

    pub fn instances(&self) -> usize {
        self.outputs.len()
    }

    /// Route one complete message, status byte first.
    pub fn route(&mut self, message: &[u8]) {
        let Some(&status) = message.first() else {
            return;
        };
        if status < 0x80 {
            tracing::warn!(byte = status, "dropping MIDI data without a status byte");
            return;
        }
        if status >= 0xF0 {
            self.broadcast(message);
        } else {
            let instance = (status & 0x0F) as usize % self.outputs.len();
            self.send(instance, message);
        }
    }

    /// Send raw bytes to every instance.
    pub fn broadcast(&mut self, bytes: &[u8]) {
        for instance in 0..self.outputs.len() {
            self.send(instance, bytes);
        }
    }

    /// Messages are queued whole or not at all.
    fn send(&mut self, instance: usize, bytes: &[u8]) {
        let output = &mut self.outputs[instance];
        if output.vacant_len() < bytes.len() {
            tracing::warn!(instance, len = bytes.len(), "MIDI queue full, dropping message");
            return;
        }
        output.push_slice(bytes);
    }
}

/// A live stepping loop for one emulator.
pub struct LiveInstance<E, T: Sample> {
    emulator: E,
    output: RingProducer<T>,
    midi: MidiInput,
    stop: Arc<AtomicBool>,
}

impl<E: Emulator, T: Sample> LiveInstance<E, T> {
    pub fn new(emulator: E, output: RingProducer<T>, midi: MidiInput, stop: Arc<AtomicBool>) -> Self {
        Self {
            emulator,
            output,
            midi,
            stop,
        }
    }

    /// Step until `stop` is set, then hand the emulator back.
    ///
    /// Sleeps briefly whenever the ring has room for fewer frames than a
    /// single step can emit.
    pub fn run(mut self) -> E {
        while !self.stop.load(Ordering::Relaxed) {
            self.midi.drain_into(&mut self.emulator);

            if self.output.writable() < STEP_HEADROOM {
                thread::sleep(FULL_BACKOFF);
                continue;
            }

            let output = &mut self.output;
            self.emulator.step(&mut |raw| {
                output.push(AudioFrame::normalize(raw));
            });
        }
        self.emulator
    }
}

/// Mix the frames every instance has ready into `out`.
///
/// Takes the same count from each ring (the smallest readable count) and
/// zero-fills the rest of `out`. Never blocks or allocates. Returns the
/// number of mixed frames.
pub fn mix_available<T: Sample>(inputs: &mut [RingConsumer<T>], out: &mut [AudioFrame<T>]) -> usize {
    out.fill(AudioFrame::silence());
    let available = inputs
        .iter()
        .map(RingConsumer::readable)
        .min()
        .unwrap_or(0)
        .min(out.len());
    for input in inputs.iter_mut() {
        input.read_mix(&mut out[..available]);
    }
    available
}
