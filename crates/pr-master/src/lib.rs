//! Headless controller for polyrender.
//!
//! Ties the parser, ROM loader, engine and sinks together into two entry
//! points the CLI shares: an offline render job and a live player.

mod job;
mod live;
mod options;

use std::path::Path;

use pr_engine::{EmulatorError, MAX_INSTANCES};

// Re-export common types so callers don't need pr-ir/pr-engine directly.
pub use pr_audio::AudioError;
pub use pr_engine::{EndBehavior, SystemReset, ToneEmulator};
pub use pr_formats::{RomError, SmfError};
pub use pr_ir::{AudioFormat, RomFamily, RomImages};

pub use job::{render_file, render_with, RenderReport};
pub use live::LivePlayer;
pub use options::{LiveOptions, OutputTarget, RenderOptions, RomSelection};

/// Anything that can stop a render job or the live player.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("instance count {0} outside 1..={MAX_INSTANCES}")]
    InvalidInstances(usize),
    #[error("{0} must be at least {1}")]
    InvalidSize(&'static str, usize),
    #[error("failed to parse MIDI file: {0}")]
    Smf(#[from] SmfError),
    #[error("failed to load ROMs: {0}")]
    Rom(#[from] RomError),
    #[error("instance #{instance:02}: {source}")]
    Emulator {
        instance: usize,
        #[source]
        source: EmulatorError,
    },
    #[error("output: {0}")]
    Io(#[from] std::io::Error),
    #[error("audio output: {0}")]
    Audio(#[from] AudioError),
    #[error("{0} thread panicked")]
    Panicked(String),
}

/// Pick the ROM set for a job.
///
/// With a directory, the family is the explicit name if given, otherwise
/// detected from the files present. Without one, an empty image bundle for
/// the named family (or SC-55mk2) is returned, which only ROM-less
/// emulators accept.
pub fn resolve_roms(selection: &RomSelection) -> Result<RomImages, RenderError> {
    let family = match selection.family.as_deref() {
        Some(name) => Some(parse_family(name)?),
        None => None,
    };

    let Some(dir) = selection.dir.as_deref() else {
        let family = family.unwrap_or(RomFamily::Mk2);
        tracing::info!(family = %family, "no ROM directory given, running without ROM images");
        return Ok(RomImages::empty(family));
    };

    let family = match family {
        Some(family) => family,
        None => detect(dir)?,
    };
    tracing::info!(family = %family, dir = %dir.display(), "loading ROM set");
    Ok(pr_formats::load_roms(family, dir)?)
}

fn parse_family(name: &str) -> Result<RomFamily, RomError> {
    name.parse()
        .map_err(|_| RomError::UnknownFamily(name.to_owned()))
}

fn detect(dir: &Path) -> Result<RomFamily, RomError> {
    let family = pr_formats::detect_family(dir)?;
    tracing::info!(family = %family, "detected ROM set");
    Ok(family)
}
