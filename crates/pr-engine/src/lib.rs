//! Render engine for polyrender.
//!
//! Drives emulator instances through their tracks at simulated time and
//! mixes their output, either offline through chunk queues or live through
//! per-instance frame rings.

mod chunk;
mod chunk_queue;
mod emulator;
mod live;
mod mixer;
mod render;
mod ring_buffer;
mod tone;

pub use chunk::FrameChunk;
pub use chunk_queue::ChunkQueue;
pub use emulator::{Emulator, EmulatorError, EmulatorOptions, SystemReset};
pub use live::{mix_available, LiveInstance, MidiInput, MidiRouter, DEFAULT_MIDI_QUEUE, STEP_HEADROOM};
pub use mixer::{ChunkProducer, Mixer, DEFAULT_CHUNK_FRAMES, MAX_INSTANCES};
pub use render::{
    run_reset, run_reset_steps, EndBehavior, InstanceRenderer, RenderProgress, RenderStats, RESET_STEPS,
};
pub use ring_buffer::{RingBuffer, RingConsumer, RingProducer};
pub use tone::{ToneEmulator, BASE_FREQUENCY};
