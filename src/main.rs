//! polyrender - render Standard MIDI Files through parallel emulator
//! instances, offline to WAV/raw or live to the default audio device.
//!
//! Usage:
//!   polyrender render -o out.wav song.mid
//!   polyrender render --stdout -f f32 -n 4 song.mid > out.raw
//!   polyrender play song.mid

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pr_master::{
    AudioFormat, EndBehavior, LiveOptions, LivePlayer, OutputTarget, RenderOptions, RomSelection,
    SystemReset, ToneEmulator,
};

/// How long live playback keeps running after the last event.
const LIVE_TAIL: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "polyrender", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a MIDI file to a WAV file or raw samples on stdout
    Render(RenderArgs),
    /// Play a MIDI file on the default audio device
    Play(PlayArgs),
}

#[derive(Args, Debug)]
struct EmulatorArgs {
    /// Number of emulator instances (1-16). Channels are spread across them.
    #[arg(short = 'n', long, default_value_t = 1)]
    instances: usize,

    /// Output sample format: s16, s32 or f32
    #[arg(short, long, default_value = "s16")]
    format: AudioFormat,

    /// System reset sent before playback: none, gs or gm
    #[arg(short, long, default_value = "none")]
    reset: SystemReset,

    /// Directory holding the ROM set
    #[arg(short = 'd', long)]
    rom_directory: Option<PathBuf>,

    /// ROM set short name (mk2, st, mk1, cm300, jv880, scb55, rlp3237, sc155, sc155mk2)
    #[arg(long)]
    romset: Option<String>,

    /// Halve the output frequency
    #[arg(long)]
    disable_oversampling: bool,
}

impl EmulatorArgs {
    fn roms(&self) -> RomSelection {
        RomSelection {
            dir: self.rom_directory.clone(),
            family: self.romset.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Input MIDI file
    input: PathBuf,

    /// Write a WAV file
    #[arg(short, long, conflicts_with = "stdout")]
    output: Option<PathBuf>,

    /// Write raw interleaved samples to stdout, no header
    #[arg(long)]
    stdout: bool,

    /// What happens after the last event: cut or release
    #[arg(long, default_value = "cut")]
    end: EndBehavior,

    /// Frames per mixer chunk
    #[arg(long, default_value_t = pr_engine::DEFAULT_CHUNK_FRAMES)]
    chunk_frames: usize,

    #[command(flatten)]
    emulator: EmulatorArgs,
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Input MIDI file
    input: PathBuf,

    /// Audio buffer as <page_size>[:<page_count>], in samples
    #[arg(short, long, value_parser = parse_buffer_size, default_value = "512:32")]
    buffer_size: (usize, usize),

    #[command(flatten)]
    emulator: EmulatorArgs,
}

fn parse_buffer_size(s: &str) -> Result<(usize, usize), String> {
    let (size, count) = match s.split_once(':') {
        Some((size, count)) => (size, Some(count)),
        None => (s, None),
    };
    let size = size
        .parse()
        .map_err(|e| format!("invalid page size `{size}`: {e}"))?;
    let count = match count {
        Some(count) => count
            .parse()
            .map_err(|e| format!("invalid page count `{count}`: {e}"))?,
        None => 32,
    };
    Ok((size, count))
}

fn main() -> Result<()> {
    // Logs go to stderr so raw audio on stdout stays clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Render(args) => render(args),
        Command::Play(args) => play(args),
    }
}

fn render(args: RenderArgs) -> Result<()> {
    let output = match (args.output, args.stdout) {
        (Some(path), false) => OutputTarget::Wav(path),
        (None, true) => OutputTarget::Stdout,
        _ => bail!("choose an output: -o <file> or --stdout"),
    };
    let options = RenderOptions {
        instances: args.emulator.instances,
        format: args.emulator.format,
        end: args.end,
        reset: args.emulator.reset,
        roms: args.emulator.roms(),
        oversampling: !args.emulator.disable_oversampling,
        chunk_frames: args.chunk_frames,
        ..RenderOptions::default()
    };

    let report = pr_master::render_file::<ToneEmulator>(&args.input, &output, &options)
        .with_context(|| format!("failed to render {}", args.input.display()))?;
    tracing::info!(
        frames = report.frames,
        sample_rate = report.sample_rate,
        "rendered {:.2}s of audio",
        report.duration_secs()
    );
    Ok(())
}

fn play(args: PlayArgs) -> Result<()> {
    let (page_size, page_num) = args.buffer_size;
    let options = LiveOptions {
        instances: args.emulator.instances,
        format: args.emulator.format,
        reset: args.emulator.reset,
        roms: args.emulator.roms(),
        oversampling: !args.emulator.disable_oversampling,
        page_size,
        page_num,
    };

    let data = pr_formats::load_smf(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let mut player =
        LivePlayer::start::<ToneEmulator>(&options).context("failed to start live playback")?;

    tracing::info!("playing {}", args.input.display());
    player.play_smf(&data);
    thread::sleep(LIVE_TAIL);
    player.stop().context("failed to stop audio output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn buffer_size_forms() {
        assert_eq!(parse_buffer_size("1024"), Ok((1024, 32)));
        assert_eq!(parse_buffer_size("256:8"), Ok((256, 8)));
        assert!(parse_buffer_size("x:8").is_err());
        assert!(parse_buffer_size("256:").is_err());
    }

    #[test]
    fn render_arguments_parse() {
        let cli = Cli::try_parse_from([
            "polyrender", "render", "-n", "4", "-f", "f32", "--end", "release", "-r", "gs", "--stdout",
            "song.mid",
        ])
        .unwrap();
        let Command::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.emulator.instances, 4);
        assert_eq!(args.emulator.format, AudioFormat::F32);
        assert_eq!(args.end, EndBehavior::Release);
        assert_eq!(args.emulator.reset, SystemReset::Gs);
        assert!(args.stdout);
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["polyrender", "render", "-f", "u8", "-o", "x.wav", "a.mid"]).is_err());
    }
}
