//! Offline render job: N render workers, one mixer thread, and the calling
//! thread as progress monitor.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use pr_engine::{
    run_reset, Emulator, EmulatorOptions, InstanceRenderer, Mixer, RenderProgress, RenderStats,
};
use pr_formats::{FrameSink, RawWriter, WavWriter};
use pr_ir::{split_track_modulo, AudioFormat, RomImages, Sample, SmfData};

use crate::options::{OutputTarget, RenderOptions};
use crate::RenderError;

const MONITOR_POLL: Duration = Duration::from_millis(50);

/// What a finished job produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderReport {
    pub frames: u64,
    pub sample_rate: u32,
    pub instances: Vec<RenderStats>,
    pub elapsed: Duration,
}

impl RenderReport {
    /// Rendered length in seconds of output audio.
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Render the MIDI file at `input` to `output` with emulator type `E`.
pub fn render_file<E: Emulator>(
    input: &Path,
    output: &OutputTarget,
    options: &RenderOptions,
) -> Result<RenderReport, RenderError> {
    options.validate()?;

    let data = pr_formats::load_smf(input)?;
    pr_formats::log_track_stats(&data);
    let roms = crate::resolve_roms(&options.roms)?;
    let emulators = prepare_instances::<E>(options, &roms)?;

    match options.format {
        AudioFormat::S16 => write_output::<E, i16>(&data, output, options, emulators),
        AudioFormat::S32 => write_output::<E, i32>(&data, output, options, emulators),
        AudioFormat::F32 => write_output::<E, f32>(&data, output, options, emulators),
    }
}

fn write_output<E: Emulator, T: Sample>(
    data: &SmfData,
    output: &OutputTarget,
    options: &RenderOptions,
    emulators: Vec<E>,
) -> Result<RenderReport, RenderError> {
    let sample_rate = emulators.first().map_or(0, Emulator::output_frequency);
    match output {
        OutputTarget::Wav(path) => {
            let mut sink = WavWriter::<BufWriter<File>, T>::create(path, sample_rate)?;
            render_with(data, options, emulators, &mut sink)
        }
        OutputTarget::Stdout => {
            let mut sink = RawWriter::<_, T>::new(BufWriter::new(io::stdout()));
            render_with(data, options, emulators, &mut sink)
        }
    }
}

/// Initialize, load, reset and configure one emulator per instance.
fn prepare_instances<E: Emulator>(
    options: &RenderOptions,
    roms: &RomImages,
) -> Result<Vec<E>, RenderError> {
    let emulator_options = options.emulator_options();
    (0..options.instances)
        .map(|instance| {
            let mut emulator = init_instance::<E>(instance, &emulator_options, roms)?;
            tracing::info!(instance, reset = %options.reset, "running system reset");
            run_reset(&mut emulator, options.reset);
            Ok(emulator)
        })
        .collect()
}

pub(crate) fn init_instance<E: Emulator>(
    instance: usize,
    options: &EmulatorOptions,
    roms: &RomImages,
) -> Result<E, RenderError> {
    let fail = |source| RenderError::Emulator { instance, source };
    let mut emulator = E::init(options).map_err(fail)?;
    emulator.load_roms(roms).map_err(fail)?;
    emulator.reset();
    Ok(emulator)
}

/// Render `data` through `emulators` (one per instance, already prepared)
/// into `sink`, and finish the sink.
pub fn render_with<E: Emulator, T: Sample, S: FrameSink<T> + Send>(
    data: &SmfData,
    options: &RenderOptions,
    emulators: Vec<E>,
    sink: &mut S,
) -> Result<RenderReport, RenderError> {
    let instances = emulators.len();
    if !(1..=pr_engine::MAX_INSTANCES).contains(&instances) {
        return Err(RenderError::InvalidInstances(instances));
    }
    let sample_rate = emulators[0].output_frequency();

    let tracks = split_track_modulo(&data.merge_tracks(), instances);
    let progress: Vec<RenderProgress> = tracks.iter().map(|t| RenderProgress::new(t.len())).collect();
    let mixer = Mixer::<T>::new(instances, options.chunk_frames);
    let frames_mixed = AtomicU64::new(0);
    let cancel = AtomicBool::new(false);
    let start = Instant::now();

    let (stats, mixed) = thread::scope(|s| {
        let workers: Vec<_> = emulators
            .into_iter()
            .zip(tracks.iter().zip(&progress))
            .enumerate()
            .map(|(instance, (mut emulator, (track, progress)))| {
                let producer = mixer.producer(instance);
                let renderer = InstanceRenderer::new(data, track, progress)
                    .end_behavior(options.end)
                    .cancel_on(&cancel);
                s.spawn(move || renderer.render(&mut emulator, producer))
            })
            .collect();

        let mix_out = s.spawn(|| -> io::Result<()> {
            let mut buffer = Vec::with_capacity(mixer.chunk_frames());
            while !mixer.is_finished() {
                mixer.wait_for_work();
                let frames = mixer.mix_frames(&mut buffer);
                if frames > 0 {
                    if let Err(e) = sink.write_frames(&buffer) {
                        tracing::error!(error = %e, "output write failed, cancelling render");
                        cancel.store(true, Ordering::Relaxed);
                        return Err(e);
                    }
                    frames_mixed.fetch_add(frames as u64, Ordering::Relaxed);
                }
            }
            sink.finish()
        });

        let mut last_report = Instant::now();
        while !(workers.iter().all(|w| w.is_finished()) && mix_out.is_finished()) {
            thread::sleep(MONITOR_POLL);
            if last_report.elapsed() >= options.progress_interval {
                log_progress(frames_mixed.load(Ordering::Relaxed), &progress);
                mixer.log_queues();
                last_report = Instant::now();
            }
        }

        let stats = workers
            .into_iter()
            .enumerate()
            .map(|(instance, worker)| {
                worker
                    .join()
                    .map_err(|_| RenderError::Panicked(format!("render #{instance:02}")))
            })
            .collect::<Result<Vec<_>, _>>();
        let mixed = mix_out
            .join()
            .map_err(|_| RenderError::Panicked("mixer".into()));
        (stats, mixed)
    });
    let stats = stats?;
    mixed??;

    let elapsed = start.elapsed();
    for (instance, stat) in stats.iter().enumerate() {
        tracing::info!(
            instance,
            "#{instance:02} took {:.2}s",
            stat.elapsed.as_secs_f64()
        );
    }
    tracing::info!("done in {:.2}s", elapsed.as_secs_f64());

    Ok(RenderReport {
        frames: frames_mixed.into_inner(),
        sample_rate,
        instances: stats,
        elapsed,
    })
}

fn log_progress(frames: u64, progress: &[RenderProgress]) {
    tracing::info!(frames, "rendered {frames} frames");
    for (instance, p) in progress.iter().enumerate() {
        tracing::info!(
            instance,
            "#{instance:02} {:6.2}% [{} / {}]",
            p.percent(),
            p.events_processed(),
            p.total_events()
        );
    }
}
