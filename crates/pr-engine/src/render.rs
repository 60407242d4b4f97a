//! Per-instance timing engine.
//!
//! Converts event deltas to simulated nanoseconds at the current tempo,
//! steps the emulator until each event is due, then forwards the event's
//! bytes. Every frame the emulator emits is normalized and submitted to
//! this instance's mixer queue.

use core::fmt;
use core::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use pr_ir::{ticks_to_ns, AudioFrame, Sample, SmfData, Track, UnknownName, DEFAULT_TEMPO_US};

use crate::emulator::{Emulator, SystemReset};
use crate::mixer::ChunkProducer;

/// Steps run after posting a system reset, with output discarded.
pub const RESET_STEPS: u64 = 24_000_000;

/// Steps between cancel checks while stepping toward the next event.
const CANCEL_POLL_STEPS: u64 = 1 << 16;

/// What to do after the last event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EndBehavior {
    /// Stop immediately
    #[default]
    Cut,
    /// Keep stepping until the output has been silent for 100 ms
    Release,
}

impl EndBehavior {
    pub const fn name(self) -> &'static str {
        match self {
            EndBehavior::Cut => "cut",
            EndBehavior::Release => "release",
        }
    }
}

impl fmt::Display for EndBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EndBehavior {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cut" => Ok(EndBehavior::Cut),
            "release" => Ok(EndBehavior::Release),
            _ => Err(UnknownName(s.into())),
        }
    }
}

/// Post `mode`'s reset sequence and let the emulator settle.
pub fn run_reset<E: Emulator>(emulator: &mut E, mode: SystemReset) {
    run_reset_steps(emulator, mode, RESET_STEPS);
}

/// [`run_reset`] with an explicit settle length.
pub fn run_reset_steps<E: Emulator>(emulator: &mut E, mode: SystemReset, steps: u64) {
    if mode == SystemReset::None {
        return;
    }
    emulator.post_system_reset(mode);
    let mut discard = |_: AudioFrame<i32>| {};
    for _ in 0..steps {
        emulator.step(&mut discard);
    }
}

/// Counters read by the monitor while an instance renders.
#[derive(Debug, Default)]
pub struct RenderProgress {
    total_events: usize,
    events_processed: AtomicUsize,
    frames: AtomicU64,
    elapsed_us: AtomicU64,
    done: AtomicBool,
}

impl RenderProgress {
    pub fn new(total_events: usize) -> Self {
        Self {
            total_events,
            ..Self::default()
        }
    }

    pub fn total_events(&self) -> usize {
        self.total_events
    }

    pub fn events_processed(&self) -> usize {
        self.events_processed.load(Ordering::Relaxed)
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn percent(&self) -> f64 {
        if self.total_events == 0 {
            return 100.0;
        }
        100.0 * self.events_processed() as f64 / self.total_events as f64
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Wall time the instance took, once it is done.
    pub fn elapsed(&self) -> Option<Duration> {
        self.is_done()
            .then(|| Duration::from_micros(self.elapsed_us.load(Ordering::Relaxed)))
    }
}

/// Summary of one finished instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderStats {
    pub frames: u64,
    pub simulated_ns: u64,
    pub elapsed: Duration,
}

/// Tracks the silence run and forwards frames to the mixer.
struct FrameOutput<'p, 'm, T: Sample> {
    producer: &'p mut ChunkProducer<'m, T>,
    silent_frames: usize,
    frames: u64,
}

impl<T: Sample> FrameOutput<'_, '_, T> {
    fn accept(&mut self, raw: AudioFrame<i32>) {
        if raw.is_silence() {
            self.silent_frames += 1;
        } else {
            self.silent_frames = 0;
        }
        self.frames += 1;
        self.producer.submit_frame(AudioFrame::normalize(raw));
    }
}

/// Drives one emulator through one track.
pub struct InstanceRenderer<'a> {
    data: &'a SmfData,
    track: &'a Track,
    end: EndBehavior,
    progress: &'a RenderProgress,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> InstanceRenderer<'a> {
    /// `track` must reference `data.bytes`.
    pub fn new(data: &'a SmfData, track: &'a Track, progress: &'a RenderProgress) -> Self {
        Self {
            data,
            track,
            end: EndBehavior::Cut,
            progress,
            cancel: None,
        }
    }

    pub fn end_behavior(mut self, end: EndBehavior) -> Self {
        self.end = end;
        self
    }

    /// Stop early, leaving the rest of the track unrendered, once `flag` is set.
    pub fn cancel_on(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Render the whole track, then complete `producer`'s queue.
    ///
    /// A cancelled render still completes the queue.
    pub fn render<E: Emulator, T: Sample>(
        &self,
        emulator: &mut E,
        mut producer: ChunkProducer<'_, T>,
    ) -> RenderStats {
        let start = Instant::now();
        let bytes = self.data.bytes.as_slice();
        let division = self.data.header.division as u64;
        let ns_per_step = emulator.ns_per_step();
        let mut us_per_qn = DEFAULT_TEMPO_US;
        let mut simulated_ns = 0u64;
        let mut steps = 0u64;

        let mut out = FrameOutput {
            producer: &mut producer,
            silent_frames: 0,
            frames: 0,
        };

        'events: for event in &self.track.events {
            if self.cancelled() {
                break;
            }
            let due = simulated_ns + ticks_to_ns(event.delta_time as u64, us_per_qn, division);
            while simulated_ns < due {
                emulator.step(&mut |raw| out.accept(raw));
                simulated_ns += ns_per_step;
                steps += 1;
                if steps % CANCEL_POLL_STEPS == 0 && self.cancelled() {
                    break 'events;
                }
            }

            if let Some(tempo) = event.tempo_us(bytes) {
                us_per_qn = tempo as u64;
            }

            if !event.is_meta() {
                if let Some(status) = event.wire_status() {
                    emulator.post_midi(status);
                }
                emulator.post_midi_bytes(event.payload(bytes));
            }

            self.progress.events_processed.fetch_add(1, Ordering::Relaxed);
        }

        if self.end == EndBehavior::Release && !self.cancelled() {
            let window = emulator.output_frequency() as usize / 10;
            while out.silent_frames < window && !self.cancelled() {
                emulator.step(&mut |raw| out.accept(raw));
                simulated_ns += ns_per_step;
            }
        }

        let frames = out.frames;
        producer.mark_complete();

        let elapsed = start.elapsed();
        self.progress.frames.store(frames, Ordering::Relaxed);
        self.progress
            .elapsed_us
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.progress.done.store(true, Ordering::Release);

        if self.cancelled() {
            tracing::warn!(frames, simulated_ns, "instance cancelled");
        } else {
            tracing::debug!(frames, simulated_ns, ?elapsed, "instance finished");
        }
        RenderStats {
            frames,
            simulated_ns,
            elapsed,
        }
    }
}
