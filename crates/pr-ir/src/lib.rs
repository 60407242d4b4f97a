//! Core types for polyrender.
//!
//! This crate defines the data model shared by the parser, the render
//! engine and the output sinks: MIDI events and tracks, stereo frames in
//! each supported sample format, and hardware ROM families.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod event;
mod frame;
mod romset;
mod timing;
mod track;

pub use event::{ByteSpan, Event, META_END_OF_TRACK, META_TEMPO};
pub use frame::{AudioFormat, AudioFrame, Sample, UnknownName};
pub use romset::{RomFamily, RomImages};
pub use timing::{ticks_to_ns, ticks_to_us, DEFAULT_TEMPO_US};
pub use track::{split_track_modulo, SmfData, SmfHeader, Track, CHANNEL_COUNT};
