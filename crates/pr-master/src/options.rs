//! Job configuration, validated once before any thread starts.

use std::path::PathBuf;
use std::time::Duration;

use pr_engine::{
    EmulatorOptions, EndBehavior, SystemReset, DEFAULT_CHUNK_FRAMES, MAX_INSTANCES, STEP_HEADROOM,
};
use pr_ir::AudioFormat;

use crate::RenderError;

/// Where the ROM set comes from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RomSelection {
    pub dir: Option<PathBuf>,
    /// Short family name, e.g. `mk2`. Detected from `dir` when absent.
    pub family: Option<String>,
}

/// Destination of an offline render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputTarget {
    /// A WAV file, header finalized once rendering ends.
    Wav(PathBuf),
    /// Headerless interleaved samples on stdout.
    Stdout,
}

/// Settings for one offline render job.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderOptions {
    pub instances: usize,
    pub format: AudioFormat,
    pub end: EndBehavior,
    pub reset: SystemReset,
    pub roms: RomSelection,
    pub oversampling: bool,
    pub chunk_frames: usize,
    pub progress_interval: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            instances: 1,
            format: AudioFormat::S16,
            end: EndBehavior::Cut,
            reset: SystemReset::None,
            roms: RomSelection::default(),
            oversampling: true,
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            progress_interval: Duration::from_secs(1),
        }
    }
}

impl RenderOptions {
    pub fn validate(&self) -> Result<(), RenderError> {
        check_instances(self.instances)?;
        if self.chunk_frames == 0 {
            return Err(RenderError::InvalidSize("chunk size in frames", 1));
        }
        Ok(())
    }

    pub(crate) fn emulator_options(&self) -> EmulatorOptions {
        EmulatorOptions {
            oversampling: self.oversampling,
        }
    }
}

/// Settings for live playback.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveOptions {
    pub instances: usize,
    pub format: AudioFormat,
    pub reset: SystemReset,
    pub roms: RomSelection,
    pub oversampling: bool,
    /// Samples per audio page. Rounded down to an even count.
    pub page_size: usize,
    pub page_num: usize,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            instances: 1,
            format: AudioFormat::S16,
            reset: SystemReset::None,
            roms: RomSelection::default(),
            oversampling: true,
            page_size: 512,
            page_num: 32,
        }
    }
}

impl LiveOptions {
    pub fn validate(&self) -> Result<(), RenderError> {
        check_instances(self.instances)?;
        if self.page_size < 4 {
            return Err(RenderError::InvalidSize("page size", 4));
        }
        if self.page_num < 1 {
            return Err(RenderError::InvalidSize("page count", 1));
        }
        // The ring keeps one slot free; the stepping loop needs headroom above that.
        if self.ring_frames() <= STEP_HEADROOM {
            return Err(RenderError::InvalidSize("ring frames", STEP_HEADROOM + 1));
        }
        Ok(())
    }

    /// Frames per instance ring: `page_size * page_num` samples, two per frame.
    pub fn ring_frames(&self) -> usize {
        self.page_size / 2 * self.page_num
    }

    /// Frames mixed per pass inside the device callback.
    pub fn callback_frames(&self) -> usize {
        self.page_size / 4
    }

    pub(crate) fn emulator_options(&self) -> EmulatorOptions {
        EmulatorOptions {
            oversampling: self.oversampling,
        }
    }
}

fn check_instances(instances: usize) -> Result<(), RenderError> {
    if (1..=MAX_INSTANCES).contains(&instances) {
        Ok(())
    } else {
        Err(RenderError::InvalidInstances(instances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let render = RenderOptions::default();
        render.validate().unwrap();
        assert_eq!(render.chunk_frames, 64 * 1024);
        assert_eq!(render.format, AudioFormat::S16);

        let live = LiveOptions::default();
        live.validate().unwrap();
        assert_eq!(live.ring_frames(), 8192);
        assert_eq!(live.callback_frames(), 128);
    }

    #[test]
    fn instance_count_is_bounded() {
        for instances in [0, MAX_INSTANCES + 1] {
            let options = RenderOptions {
                instances,
                ..RenderOptions::default()
            };
            assert!(matches!(
                options.validate(),
                Err(RenderError::InvalidInstances(n)) if n == instances
            ));
        }
        let options = RenderOptions {
            instances: MAX_INSTANCES,
            ..RenderOptions::default()
        };
        options.validate().unwrap();
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let options = RenderOptions {
            chunk_frames: 0,
            ..RenderOptions::default()
        };
        assert!(matches!(options.validate(), Err(RenderError::InvalidSize(..))));
    }

    #[test]
    fn odd_page_size_rounds_down() {
        let options = LiveOptions {
            page_size: 513,
            page_num: 2,
            ..LiveOptions::default()
        };
        assert_eq!(options.ring_frames(), 512);
    }

    #[test]
    fn ring_must_leave_step_headroom() {
        let tiny = LiveOptions {
            page_size: 4,
            page_num: 1,
            ..LiveOptions::default()
        };
        assert_eq!(tiny.ring_frames(), 2);
        assert!(matches!(
            tiny.validate(),
            Err(RenderError::InvalidSize("ring frames", 3))
        ));

        let smallest = LiveOptions {
            page_size: 6,
            page_num: 1,
            ..LiveOptions::default()
        };
        assert_eq!(smallest.ring_frames(), STEP_HEADROOM + 1);
        smallest.validate().unwrap();
    }
}
