//! Event types for parsed MIDI tracks.

/// Meta event type for a tempo change.
pub const META_TEMPO: u8 = 0x51;
/// Meta event type for the end-of-track marker.
pub const META_END_OF_TRACK: u8 = 0x2F;

/// A half-open byte range into the file's raw byte buffer.
///
/// Events never copy their payload; they carry one of these and resolve it
/// against the owning file's bytes on demand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ByteSpan {
    pub start: usize,
    pub end: usize,
}

impl ByteSpan {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn empty() -> Self {
        Self { start: 0, end: 0 }
    }

    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Resolve this span against a byte buffer.
    pub fn get<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[self.start..self.end]
    }
}

/// A single MIDI event within a track.
///
/// Total order is `(timestamp, seq_id)`; see [`Event::sort_key`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Event {
    /// Creation order within the source track. Tie-break for equal timestamps.
    pub seq_id: u64,
    /// Absolute time in ticks from track start
    pub timestamp: u64,
    /// Ticks since the previous event (or since track start for the first)
    pub delta_time: u32,
    /// MIDI status byte (running status already resolved)
    pub status: u8,
    /// Payload bytes following the status byte
    pub data: ByteSpan,
}

impl Event {
    pub fn sort_key(&self) -> (u64, u64) {
        (self.timestamp, self.seq_id)
    }

    /// MIDI channel for channel messages. Meaningless for system events.
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    /// System events (meta, sysex) have no channel and reach every instance.
    pub fn is_system(&self) -> bool {
        self.status >= 0xF0
    }

    pub fn is_meta(&self) -> bool {
        self.status == 0xFF
    }

    pub fn is_sysex(&self) -> bool {
        self.status == 0xF0 || self.status == 0xF7
    }

    /// Meta event type byte, if this is a meta event with a payload.
    pub fn meta_type(&self, bytes: &[u8]) -> Option<u8> {
        if self.is_meta() && !self.data.is_empty() {
            Some(bytes[self.data.start])
        } else {
            None
        }
    }

    pub fn is_tempo(&self, bytes: &[u8]) -> bool {
        self.meta_type(bytes) == Some(META_TEMPO)
    }

    pub fn is_end_of_track(&self, bytes: &[u8]) -> bool {
        self.meta_type(bytes) == Some(META_END_OF_TRACK)
    }

    /// Tempo in microseconds per quarter note.
    ///
    /// Meta span layout is `type, len, b0, b1, b2`; returns `None` if the
    /// event is not a well-formed 3-byte tempo event.
    pub fn tempo_us(&self, bytes: &[u8]) -> Option<u32> {
        if !self.is_tempo(bytes) || self.data.len() < 5 || bytes[self.data.start + 1] != 3 {
            return None;
        }
        let p = &bytes[self.data.start + 2..self.data.start + 5];
        Some((p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32)
    }

    /// Raw payload bytes of this event.
    pub fn payload<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        self.data.get(bytes)
    }

    /// Status byte to send ahead of the payload on a MIDI input.
    ///
    /// `F7` escape events carry raw bytes with no status of their own.
    pub fn wire_status(&self) -> Option<u8> {
        (self.status != 0xF7).then_some(self.status)
    }
}
