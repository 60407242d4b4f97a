//! A small reference synthesizer implementing [`Emulator`].
//!
//! A bank of sine voices with an exponential release, stepped at the same
//! cycle granularity as the hardware family it stands in for. Needs no ROM
//! images, which makes the full render pipeline runnable anywhere.

use heapless::Vec as HVec;
use pr_ir::{AudioFrame, RomFamily, RomImages};

use crate::emulator::{Emulator, EmulatorError, EmulatorOptions, SystemReset};

/// Base output rate before oversampling.
pub const BASE_FREQUENCY: u32 = 32_000;

const MAX_VOICES: usize = 32;
const NS_PER_SECOND: u64 = 1_000_000_000;

/// Peak amplitude of a full-velocity voice in raw units (2^29 is unity).
const VOICE_PEAK: f32 = 0.15 * (1u32 << 29) as f32;

/// Per-frame gain multiplier while releasing, at the base rate.
const RELEASE_DECAY: f32 = 0.9985;

/// Releasing voices below this gain are freed.
const RELEASE_FLOOR: f32 = 1.0e-4;

const CC_ALL_SOUND_OFF: u8 = 120;
const CC_ALL_NOTES_OFF: u8 = 123;

#[derive(Clone, Copy, Debug)]
struct Voice {
    channel: u8,
    note: u8,
    phase: f32,
    increment: f32,
    gain: f32,
    releasing: bool,
}

/// Reference emulator.
pub struct ToneEmulator {
    family: RomFamily,
    frequency: u32,
    accumulator: u64,
    voices: HVec<Voice, MAX_VOICES>,
    running_status: Option<u8>,
    message: HVec<u8, 2>,
    in_sysex: bool,
    sysex: HVec<u8, 16>,
    release_decay: f32,
}

impl ToneEmulator {
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    fn dispatch(&mut self, status: u8) {
        let channel = status & 0x0F;
        let first = self.message.first().copied().unwrap_or(0);
        let second = self.message.get(1).copied().unwrap_or(0);
        match status & 0xF0 {
            0x90 if second > 0 => self.note_on(channel, first, second),
            0x80 | 0x90 => self.note_off(channel, first),
            0xB0 if first == CC_ALL_SOUND_OFF => self.voices.retain(|v| v.channel != channel),
            0xB0 if first == CC_ALL_NOTES_OFF => {
                for voice in self.voices.iter_mut().filter(|v| v.channel == channel) {
                    voice.releasing = true;
                }
            }
            _ => {}
        }
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        let hz = 440.0 * ((note as f32 - 69.0) / 12.0).exp2();
        let voice = Voice {
            channel,
            note,
            phase: 0.0,
            increment: hz / self.frequency as f32,
            gain: velocity as f32 / 127.0,
            releasing: false,
        };
        if self.voices.push(voice).is_err() {
            // Steal the oldest voice.
            self.voices.remove(0);
            let _ = self.voices.push(voice);
        }
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.channel == channel && v.note == note && !v.releasing)
        {
            voice.releasing = true;
        }
    }

    fn end_sysex(&mut self) {
        self.in_sysex = false;
        let is_reset = [SystemReset::Gs, SystemReset::Gm]
            .into_iter()
            .filter_map(SystemReset::sysex)
            .any(|seq| seq[1..seq.len() - 1] == self.sysex[..]);
        if is_reset {
            tracing::debug!("tone emulator received system reset");
            self.voices.clear();
        }
        self.sysex.clear();
    }

    fn render_frame(&mut self) -> AudioFrame<i32> {
        let mut sum = 0.0f32;
        for voice in self.voices.iter_mut() {
            sum += (voice.phase * core::f32::consts::TAU).sin() * voice.gain;
            voice.phase += voice.increment;
            if voice.phase >= 1.0 {
                voice.phase -= 1.0;
            }
            if voice.releasing {
                voice.gain *= self.release_decay;
            }
        }
        self.voices.retain(|v| !(v.releasing && v.gain < RELEASE_FLOOR));

        let sample = (sum * VOICE_PEAK) as i32;
        AudioFrame::new(sample, sample)
    }
}

impl Emulator for ToneEmulator {
    fn init(options: &EmulatorOptions) -> Result<Self, EmulatorError> {
        let frequency = if options.oversampling {
            BASE_FREQUENCY * 2
        } else {
            BASE_FREQUENCY
        };
        // Keep the release time independent of the output rate.
        let release_decay = RELEASE_DECAY.powf(BASE_FREQUENCY as f32 / frequency as f32);
        Ok(Self {
            family: RomFamily::Mk2,
            frequency,
            accumulator: 0,
            voices: HVec::new(),
            running_status: None,
            message: HVec::new(),
            in_sysex: false,
            sysex: HVec::new(),
            release_decay,
        })
    }

    fn load_roms(&mut self, roms: &RomImages) -> Result<(), EmulatorError> {
        self.family = roms.family;
        Ok(())
    }

    fn reset(&mut self) {
        self.accumulator = 0;
        self.voices.clear();
        self.running_status = None;
        self.message.clear();
        self.in_sysex = false;
        self.sysex.clear();
    }

    fn post_midi(&mut self, byte: u8) {
        match byte {
            // Realtime bytes may appear anywhere, even inside sysex.
            0xF8..=0xFF => {}
            0xF0 => {
                self.in_sysex = true;
                self.sysex.clear();
                self.running_status = None;
            }
            0xF7 => {
                if self.in_sysex {
                    self.end_sysex();
                }
            }
            0x80..=0xEF => {
                self.in_sysex = false;
                self.running_status = Some(byte);
                self.message.clear();
            }
            0xF1..=0xF6 => {
                self.in_sysex = false;
                self.running_status = None;
            }
            _ if self.in_sysex => {
                // Long dumps overflow the buffer and simply never match.
                let _ = self.sysex.push(byte);
            }
            _ => {
                let Some(status) = self.running_status else {
                    return;
                };
                let _ = self.message.push(byte);
                let needed = if matches!(status & 0xF0, 0xC0 | 0xD0) { 1 } else { 2 };
                if self.message.len() == needed {
                    self.dispatch(status);
                    self.message.clear();
                }
            }
        }
    }

    fn step<F: FnMut(AudioFrame<i32>)>(&mut self, emit: &mut F) {
        self.accumulator += self.family.ns_per_step() * self.frequency as u64;
        while self.accumulator >= NS_PER_SECOND {
            self.accumulator -= NS_PER_SECOND;
            let frame = self.render_frame();
            emit(frame);
        }
    }

    fn ns_per_step(&self) -> u64 {
        self.family.ns_per_step()
    }

    fn output_frequency(&self) -> u32 {
        self.frequency
    }
}
