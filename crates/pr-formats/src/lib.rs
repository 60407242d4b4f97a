//! File formats for polyrender.
//!
//! Parses Standard MIDI Files into the IR, loads and unscrambles hardware
//! ROM sets, and serializes rendered frames as WAV or raw PCM.

mod rom;
mod smf;
mod vlq;
mod wav;

use std::path::PathBuf;

pub use rom::{detect_family, family_files, load_roms, unscramble, ROM1_SIZE, ROM2_SIZE, ROMSM_SIZE};
pub use smf::{load_smf, log_track_stats, parse_smf};
pub use vlq::{decode_vlq, encode_vlq, VlqError, VLQ_MAX_BYTES, VLQ_MAX_VALUE};
pub use wav::{FrameSink, RawWriter, WavWriter};

/// Error type for MIDI file parsing. Every variant is fatal.
#[derive(Debug, thiserror::Error)]
pub enum SmfError {
    #[error("chunk at offset {offset} declares {declared} bytes but only {available} remain")]
    TruncatedChunk {
        offset: usize,
        declared: usize,
        available: usize,
    },
    #[error("malformed chunk framing at offset {offset}: {message}")]
    Framing { offset: usize, message: String },
    #[error("read of {wanted} byte(s) at offset {offset} runs past track end {end}")]
    TrackOverrun {
        offset: usize,
        wanted: usize,
        end: usize,
    },
    #[error("variable-length quantity at offset {offset} exceeds 4 bytes")]
    MalformedVarint { offset: usize },
    #[error("data byte at offset {offset} with no running status")]
    MissingStatus { offset: usize },
    #[error("file has no MThd header chunk")]
    MissingHeader,
    #[error("header division is zero")]
    ZeroDivision,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a ROM set failed to load.
#[derive(Debug, thiserror::Error)]
pub enum RomError {
    #[error("no known ROM set found in {}", .0.display())]
    NotDetected(PathBuf),
    #[error("unknown ROM set name `{0}`")]
    UnknownFamily(String),
    #[error("missing required ROM file(s): {}", display_paths(.0))]
    MissingFiles(Vec<PathBuf>),
    #[error("{}: expected {expected} bytes, read {actual}", .file.display())]
    ShortRead {
        file: PathBuf,
        expected: usize,
        actual: usize,
    },
    #[error("{}: unexpected size {actual} bytes", .file.display())]
    WrongSize { file: PathBuf, actual: usize },
    #[error("I/O error reading {}: {source}", .file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
