//! The emulator contract the render engine drives.

use core::fmt;
use core::str::FromStr;

use pr_ir::{AudioFrame, RomImages, UnknownName};

/// Options applied when an emulator instance is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmulatorOptions {
    /// Run the PCM stage at twice the base rate
    pub oversampling: bool,
}

impl Default for EmulatorOptions {
    fn default() -> Self {
        Self { oversampling: true }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmulatorError {
    #[error("emulator initialization failed: {0}")]
    Init(String),
    #[error("ROM set rejected: {0}")]
    Roms(String),
}

/// A system reset message posted before rendering starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SystemReset {
    #[default]
    None,
    /// Roland GS reset
    Gs,
    /// General MIDI system on
    Gm,
}

const GS_RESET: [u8; 11] = [0xF0, 0x41, 0x10, 0x42, 0x12, 0x40, 0x00, 0x7F, 0x00, 0x41, 0xF7];
const GM_RESET: [u8; 6] = [0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7];

impl SystemReset {
    /// The SysEx sequence for this reset, if any.
    pub fn sysex(self) -> Option<&'static [u8]> {
        match self {
            SystemReset::None => None,
            SystemReset::Gs => Some(&GS_RESET),
            SystemReset::Gm => Some(&GM_RESET),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SystemReset::None => "none",
            SystemReset::Gs => "gs",
            SystemReset::Gm => "gm",
        }
    }
}

impl fmt::Display for SystemReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SystemReset {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SystemReset::None),
            "gs" => Ok(SystemReset::Gs),
            "gm" => Ok(SystemReset::Gm),
            _ => Err(UnknownName(s.into())),
        }
    }
}

/// A time-stepped synthesizer emulator.
///
/// One call to [`Emulator::step`] advances the hardware by one minimal
/// cycle, [`Emulator::ns_per_step`] nanoseconds of simulated time, and may
/// emit zero, one or two raw frames.
pub trait Emulator: Send + Sized {
    fn init(options: &EmulatorOptions) -> Result<Self, EmulatorError>;

    /// Install decoded ROM images.
    fn load_roms(&mut self, roms: &RomImages) -> Result<(), EmulatorError>;

    fn reset(&mut self);

    fn post_midi(&mut self, byte: u8);

    fn post_midi_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.post_midi(byte);
        }
    }

    /// Queue the reset sequence for `mode`. Does not step.
    fn post_system_reset(&mut self, mode: SystemReset) {
        if let Some(sysex) = mode.sysex() {
            self.post_midi_bytes(sysex);
        }
    }

    /// Advance one cycle, handing any produced frames to `emit`.
    fn step<F: FnMut(AudioFrame<i32>)>(&mut self, emit: &mut F);

    fn ns_per_step(&self) -> u64;

    /// Frames per second produced by `step`.
    fn output_frequency(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_sequences() {
        assert_eq!(SystemReset::None.sysex(), None);
        let gs = SystemReset::Gs.sysex().unwrap();
        assert_eq!(gs.len(), 11);
        assert_eq!((gs[0], gs[10]), (0xF0, 0xF7));
        assert_eq!(SystemReset::Gm.sysex().unwrap(), &[0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7]);
    }

    #[test]
    fn parses_names() {
        for mode in [SystemReset::None, SystemReset::Gs, SystemReset::Gm] {
            assert_eq!(mode.name().parse::<SystemReset>(), Ok(mode));
        }
        assert!("xg".parse::<SystemReset>().is_err());
    }
}
