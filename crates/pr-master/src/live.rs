//! Live playback: each instance steps on its own thread into its own frame
//! ring, and the audio device callback mixes whatever the rings hold.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pr_audio::CpalOutput;
use pr_engine::{run_reset, Emulator, LiveInstance, MidiRouter, RingBuffer, DEFAULT_MIDI_QUEUE};
use pr_ir::{ticks_to_us, AudioFormat, RomImages, Sample, SmfData, DEFAULT_TEMPO_US};

use crate::job::init_instance;
use crate::options::LiveOptions;
use crate::RenderError;

/// A running set of live instances behind one audio output.
///
/// Dropping the player stops the stepping threads and the stream.
pub struct LivePlayer {
    router: MidiRouter,
    output: CpalOutput,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl LivePlayer {
    /// Start `options.instances` emulators of type `E` and begin playback.
    pub fn start<E: Emulator + 'static>(options: &LiveOptions) -> Result<Self, RenderError> {
        options.validate()?;
        let roms = crate::resolve_roms(&options.roms)?;
        match options.format {
            AudioFormat::S16 => Self::start_with::<E, i16>(options, &roms),
            AudioFormat::S32 => Self::start_with::<E, i32>(options, &roms),
            AudioFormat::F32 => Self::start_with::<E, f32>(options, &roms),
        }
    }

    fn start_with<E: Emulator + 'static, T: Sample>(
        options: &LiveOptions,
        roms: &RomImages,
    ) -> Result<Self, RenderError> {
        let emulator_options = options.emulator_options();
        let emulators = (0..options.instances)
            .map(|instance| init_instance::<E>(instance, &emulator_options, roms))
            .collect::<Result<Vec<_>, _>>()?;
        let sample_rate = emulators.first().map_or(0, Emulator::output_frequency);

        let (router, inputs) = MidiRouter::new(options.instances, DEFAULT_MIDI_QUEUE);
        let mut player = Self {
            router,
            output: CpalOutput::new(sample_rate)?,
            stop: Arc::new(AtomicBool::new(false)),
            threads: Vec::with_capacity(options.instances),
        };

        let mut consumers = Vec::with_capacity(options.instances);
        for (instance, (mut emulator, midi)) in emulators.into_iter().zip(inputs).enumerate() {
            let (producer, consumer) = RingBuffer::<T>::new(options.ring_frames()).split();
            consumers.push(consumer);

            let stop = player.stop.clone();
            let reset = options.reset;
            let thread = thread::Builder::new()
                .name(format!("live-{instance:02}"))
                .spawn(move || {
                    run_reset(&mut emulator, reset);
                    tracing::debug!(instance, "stepping loop started");
                    LiveInstance::new(emulator, producer, midi, stop).run();
                })?;
            player.threads.push(thread);
        }

        player.output.build_stream(consumers, options.callback_frames())?;
        player.output.start()?;
        tracing::info!(instances = options.instances, sample_rate, "live playback started");
        Ok(player)
    }

    /// Router feeding every instance's MIDI input.
    pub fn router(&mut self) -> &mut MidiRouter {
        &mut self.router
    }

    /// Post every event of `data` at its wall-clock time. Blocks until the
    /// last event has been sent.
    pub fn play_smf(&mut self, data: &SmfData) {
        let track = data.merge_tracks();
        let bytes = data.bytes.as_slice();
        let division = data.header.division as u64;
        let mut us_per_qn = DEFAULT_TEMPO_US;
        let mut due_us = 0u64;
        let mut message = Vec::new();
        let start = Instant::now();

        for event in &track.events {
            due_us += ticks_to_us(event.delta_time as u64, us_per_qn, division);
            let due = start + Duration::from_micros(due_us);
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }

            if let Some(tempo) = event.tempo_us(bytes) {
                us_per_qn = tempo as u64;
            }
            if event.is_meta() {
                continue;
            }
            match event.wire_status() {
                Some(status) => {
                    message.clear();
                    message.push(status);
                    message.extend_from_slice(event.payload(bytes));
                    self.router.route(&message);
                }
                None => self.router.broadcast(event.payload(bytes)),
            }
        }
    }

    /// Stop the stream and the stepping threads.
    pub fn stop(mut self) -> Result<(), RenderError> {
        self.output.stop()?;
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for (instance, thread) in self.threads.drain(..).enumerate() {
            if thread.join().is_err() {
                tracing::error!(instance, "stepping thread panicked");
            }
        }
    }
}

impl Drop for LivePlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
