//! Stereo audio frames and the sample formats they can carry.

use core::fmt;
use core::str::FromStr;

/// A stereo audio frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct AudioFrame<T> {
    pub left: T,
    pub right: T,
}

impl<T: Sample> AudioFrame<T> {
    pub const CHANNELS: u16 = 2;

    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    /// Create a silent frame.
    pub fn silence() -> Self {
        Self::default()
    }

    /// Mix another frame into this one.
    pub fn mix(&mut self, other: AudioFrame<T>) {
        self.left = self.left.mix(other.left);
        self.right = self.right.mix(other.right);
    }

    /// Convert a raw emulator frame into this sample type.
    pub fn normalize(raw: AudioFrame<i32>) -> Self {
        Self {
            left: T::from_raw(raw.left),
            right: T::from_raw(raw.right),
        }
    }
}

impl AudioFrame<i32> {
    /// Emulators never output exact zeroes while idle; anything inside this
    /// band on both channels counts as silence.
    pub const SILENCE_THRESHOLD: i32 = 0x4000;

    pub fn is_silence(&self) -> bool {
        let band = -Self::SILENCE_THRESHOLD..=Self::SILENCE_THRESHOLD;
        band.contains(&self.left) && band.contains(&self.right)
    }
}

/// A sample type an output stream can be rendered in.
pub trait Sample: Copy + Default + PartialEq + Send + Sync + fmt::Debug + 'static {
    /// The runtime tag for this sample type.
    const FORMAT: AudioFormat;

    /// Add two samples. Integer formats saturate, floats add plainly.
    fn mix(self, other: Self) -> Self;

    /// Scale a raw 32-bit emulator sample into this format.
    fn from_raw(raw: i32) -> Self;

    /// Convert to a float in roughly [-1, 1] for device output.
    fn to_f32(self) -> f32;

    /// Append the little-endian encoding of this sample.
    fn extend_le(self, out: &mut alloc::vec::Vec<u8>);
}

impl Sample for i16 {
    const FORMAT: AudioFormat = AudioFormat::S16;

    fn mix(self, other: Self) -> Self {
        self.saturating_add(other)
    }

    fn from_raw(raw: i32) -> Self {
        (raw >> 15).clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    fn to_f32(self) -> f32 {
        self as f32 / 32768.0
    }

    fn extend_le(self, out: &mut alloc::vec::Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Sample for i32 {
    const FORMAT: AudioFormat = AudioFormat::S32;

    fn mix(self, other: Self) -> Self {
        self.saturating_add(other)
    }

    fn from_raw(raw: i32) -> Self {
        ((raw as i64) << 1).clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }

    fn to_f32(self) -> f32 {
        self as f32 / 2_147_483_648.0
    }

    fn extend_le(self, out: &mut alloc::vec::Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Sample for f32 {
    const FORMAT: AudioFormat = AudioFormat::F32;

    fn mix(self, other: Self) -> Self {
        self + other
    }

    fn from_raw(raw: i32) -> Self {
        const DIV_REC: f32 = 1.0 / 536_870_912.0;
        raw as f32 * DIV_REC
    }

    fn to_f32(self) -> f32 {
        self
    }

    fn extend_le(self, out: &mut alloc::vec::Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

/// Output sample format, chosen once per job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    #[default]
    S16,
    S32,
    F32,
}

impl AudioFormat {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            AudioFormat::S16 => 2,
            AudioFormat::S32 | AudioFormat::F32 => 4,
        }
    }

    pub const fn bytes_per_frame(self) -> usize {
        2 * self.bytes_per_sample()
    }

    pub const fn is_float(self) -> bool {
        matches!(self, AudioFormat::F32)
    }

    pub const fn name(self) -> &'static str {
        match self {
            AudioFormat::S16 => "s16",
            AudioFormat::S32 => "s32",
            AudioFormat::F32 => "f32",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an unrecognized name passed to a `FromStr` impl in this crate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownName(pub alloc::string::String);

impl fmt::Display for UnknownName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown name `{}`", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for UnknownName {}

impl FromStr for AudioFormat {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s16" => Ok(AudioFormat::S16),
            "s32" => Ok(AudioFormat::S32),
            "f32" => Ok(AudioFormat::F32),
            other => Err(UnknownName(other.into())),
        }
    }
}
