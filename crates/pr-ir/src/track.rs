//! Tracks, parsed files, and the merge/split passes that prepare tracks for
//! multi-instance rendering.

use alloc::vec::Vec;

use crate::event::Event;

/// Number of MIDI channels, and the hard upper bound on instances.
pub const CHANNEL_COUNT: usize = 16;

/// File-level fields from the `MThd` chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SmfHeader {
    pub format: u16,
    pub ntrks: u16,
    /// Ticks per quarter note
    pub division: u16,
}

/// An ordered sequence of events.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Track {
    pub events: Vec<Event>,
}

impl Track {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Timestamp of the last event, in ticks.
    pub fn duration_ticks(&self) -> u64 {
        self.events.last().map_or(0, |e| e.timestamp)
    }

    /// Recompute delta times from absolute timestamps.
    ///
    /// The first event's delta equals its own timestamp.
    pub fn set_deltas_from_timestamps(&mut self) {
        let mut prev = 0u64;
        for event in &mut self.events {
            event.delta_time = u32::try_from(event.timestamp - prev).unwrap_or(u32::MAX);
            prev = event.timestamp;
        }
    }
}

/// A parsed Standard MIDI File.
///
/// Owns the raw bytes; every event's payload span points into `bytes`.
/// Read-only once parsed.
#[derive(Clone, Debug, Default)]
pub struct SmfData {
    pub header: SmfHeader,
    pub bytes: Vec<u8>,
    pub tracks: Vec<Track>,
}

impl SmfData {
    pub fn event_count(&self) -> usize {
        self.tracks.iter().map(Track::len).sum()
    }

    /// Combine every track into one track ordered by `(timestamp, seq_id)`.
    ///
    /// The sort is stable, so events with equal keys keep their
    /// concatenation order.
    pub fn merge_tracks(&self) -> Track {
        let mut merged = Track {
            events: Vec::with_capacity(self.event_count()),
        };
        for track in &self.tracks {
            merged.events.extend_from_slice(&track.events);
        }
        merged.events.sort_by_key(Event::sort_key);
        merged.set_deltas_from_timestamps();
        merged
    }
}

/// Partition a merged track across `n` instances by `channel % n`.
///
/// System events (status >= 0xF0) are copied into every result track so
/// tempo, resets and sysex stay consistent across instances.
///
/// Panics if `n` is zero.
pub fn split_track_modulo(merged: &Track, n: usize) -> Vec<Track> {
    assert!(n > 0, "cannot split a track across zero instances");

    let mut result: Vec<Track> = (0..n).map(|_| Track::new()).collect();
    for event in &merged.events {
        if event.is_system() {
            for dest in &mut result {
                dest.events.push(*event);
            }
        } else {
            result[event.channel() as usize % n].events.push(*event);
        }
    }

    for track in &mut result {
        track.set_deltas_from_timestamps();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ByteSpan;

    fn ev(seq_id: u64, timestamp: u64, status: u8) -> Event {
        Event {
            seq_id,
            timestamp,
            delta_time: 0,
            status,
            data: ByteSpan::new(seq_id as usize, seq_id as usize + 1),
        }
    }

    fn file(tracks: Vec<Vec<Event>>) -> SmfData {
        SmfData {
            header: SmfHeader { format: 1, ntrks: tracks.len() as u16, division: 96 },
            bytes: Vec::new(),
            tracks: tracks.into_iter().map(|events| Track { events }).collect(),
        }
    }

    #[test]
    fn merge_keeps_equal_timestamps_in_encounter_order() {
        // Three events at tick 10 across two tracks.
        let a = ev(0, 10, 0x90);
        let b = ev(1, 10, 0x91);
        let c = ev(1, 10, 0x92);
        let data = file(vec![vec![ev(0, 0, 0xFF), b], vec![a, c]]);

        let merged = data.merge_tracks();
        let at_ten: Vec<u8> = merged
            .events
            .iter()
            .filter(|e| e.timestamp == 10)
            .map(|e| e.status)
            .collect();
        assert_eq!(at_ten, vec![0x90, 0x91, 0x92]);
    }

    #[test]
    fn merge_orders_by_timestamp_then_seq() {
        let data = file(vec![
            vec![ev(0, 5, 0x90), ev(1, 20, 0x80)],
            vec![ev(0, 0, 0xFF), ev(1, 10, 0x91)],
        ]);
        let merged = data.merge_tracks();
        let stamps: Vec<u64> = merged.events.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![0, 5, 10, 20]);
        let deltas: Vec<u32> = merged.events.iter().map(|e| e.delta_time).collect();
        assert_eq!(deltas, vec![0, 5, 5, 10]);
    }

    #[test]
    fn first_delta_equals_timestamp() {
        let data = file(vec![vec![ev(0, 7, 0x90)], vec![ev(0, 3, 0x91)]]);
        let merged = data.merge_tracks();
        assert_eq!(merged.events[0].delta_time, 3);
        assert_eq!(merged.events[1].delta_time, 4);
    }

    #[test]
    fn split_routes_channels_and_broadcasts_system_events() {
        let merged = Track {
            events: vec![
                ev(0, 0, 0xFF),
                ev(1, 0, 0x90),
                ev(2, 4, 0x91),
                ev(3, 8, 0x92),
                ev(4, 8, 0xF0),
                ev(5, 12, 0x83),
            ],
        };
        let split = split_track_modulo(&merged, 2);
        assert_eq!(split.len(), 2);

        let statuses = |t: &Track| t.events.iter().map(|e| e.status).collect::<Vec<_>>();
        assert_eq!(statuses(&split[0]), vec![0xFF, 0x90, 0x92, 0xF0]);
        assert_eq!(statuses(&split[1]), vec![0xFF, 0x91, 0xF0, 0x83]);

        let deltas = |t: &Track| t.events.iter().map(|e| e.delta_time).collect::<Vec<_>>();
        assert_eq!(deltas(&split[0]), vec![0, 0, 8, 0]);
        assert_eq!(deltas(&split[1]), vec![0, 4, 4, 4]);
    }

    #[test]
    fn split_preserves_channel_multiset() {
        let mut events = Vec::new();
        for i in 0..64u64 {
            let status = if i % 9 == 0 { 0xFF } else { 0x90 | (i % 16) as u8 };
            events.push(ev(i, i * 3, status));
        }
        let merged = Track { events };

        for n in 1..=16 {
            let split = split_track_modulo(&merged, n);

            let mut channel_events: Vec<u64> = split
                .iter()
                .flat_map(|t| t.events.iter().filter(|e| !e.is_system()).map(|e| e.seq_id))
                .collect();
            channel_events.sort_unstable();
            let mut expected: Vec<u64> = merged
                .events
                .iter()
                .filter(|e| !e.is_system())
                .map(|e| e.seq_id)
                .collect();
            expected.sort_unstable();
            assert_eq!(channel_events, expected);

            for track in &split {
                let system: Vec<&Event> = track.events.iter().filter(|e| e.is_system()).collect();
                let expected: Vec<&Event> =
                    merged.events.iter().filter(|e| e.is_system()).collect();
                assert_eq!(system.len(), expected.len());
                for (got, want) in system.iter().zip(expected) {
                    assert_eq!(got.seq_id, want.seq_id);
                    assert_eq!(got.status, want.status);
                    assert_eq!(got.data, want.data);
                    assert_eq!(got.timestamp, want.timestamp);
                }
            }
        }
    }

    #[test]
    #[should_panic]
    fn split_into_zero_panics() {
        split_track_modulo(&Track::new(), 0);
    }
}
