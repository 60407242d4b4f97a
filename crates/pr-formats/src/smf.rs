//! Standard MIDI File parser.
//!
//! Chunk and header framing is read with `binrw`; track bodies are walked
//! by hand because every event records byte offsets into the file buffer
//! instead of copying its payload.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use binrw::{BinRead, BinReaderExt};
use pr_ir::{ByteSpan, Event, SmfData, SmfHeader, Track};

use crate::vlq::{decode_vlq, VlqError};
use crate::SmfError;

#[derive(BinRead, Debug)]
#[br(big)]
struct ChunkHeader {
    tag: [u8; 4],
    length: u32,
}

#[derive(BinRead, Debug)]
#[br(big)]
struct HeaderFields {
    format: u16,
    ntrks: u16,
    division: u16,
}

const CHUNK_HEADER_LEN: usize = 8;
const HEADER_FIELDS_LEN: usize = 6;

/// Read and parse a MIDI file from disk.
pub fn load_smf(path: impl AsRef<Path>) -> Result<SmfData, SmfError> {
    let bytes = fs::read(path.as_ref())?;
    parse_smf(bytes)
}

/// Parse a MIDI file, taking ownership of its bytes.
pub fn parse_smf(bytes: Vec<u8>) -> Result<SmfData, SmfError> {
    let mut header = None;
    let mut tracks = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let chunk = read_chunk_header(&bytes, offset)?;
        let body_start = offset + CHUNK_HEADER_LEN;
        let body_end = body_start + chunk.length as usize;
        if body_end > bytes.len() {
            return Err(SmfError::TruncatedChunk {
                offset,
                declared: chunk.length as usize,
                available: bytes.len() - body_start,
            });
        }

        match &chunk.tag {
            b"MThd" => {
                if (chunk.length as usize) < HEADER_FIELDS_LEN {
                    return Err(SmfError::TruncatedChunk {
                        offset,
                        declared: chunk.length as usize,
                        available: HEADER_FIELDS_LEN,
                    });
                }
                let fields = read_header_fields(&bytes, body_start)?;
                if fields.division == 0 {
                    return Err(SmfError::ZeroDivision);
                }
                if fields.division & 0x8000 != 0 {
                    tracing::warn!(
                        "SMPTE division {:#06x} is not supported; treating it as ticks per quarter note",
                        fields.division
                    );
                }
                header = Some(SmfHeader {
                    format: fields.format,
                    ntrks: fields.ntrks,
                    division: fields.division,
                });
            }
            b"MTrk" => {
                tracks.push(parse_track(&bytes, body_start, body_end)?);
            }
            tag => {
                tracing::warn!(
                    "skipping unknown chunk {:?} at offset {}",
                    String::from_utf8_lossy(tag),
                    offset
                );
            }
        }

        offset = body_end;
    }

    let header = header.ok_or(SmfError::MissingHeader)?;
    if tracks.len() != header.ntrks as usize {
        tracing::warn!(
            "header declares {} tracks but {} were found",
            header.ntrks,
            tracks.len()
        );
    }

    Ok(SmfData { header, bytes, tracks })
}

/// Log the number of events in each track.
pub fn log_track_stats(data: &SmfData) {
    for (i, track) in data.tracks.iter().enumerate() {
        tracing::info!("Track {:02}: {} events", i, track.len());
    }
}

fn read_chunk_header(bytes: &[u8], offset: usize) -> Result<ChunkHeader, SmfError> {
    let mut cursor = framed(bytes, offset, CHUNK_HEADER_LEN)?;
    cursor
        .read_be::<ChunkHeader>()
        .map_err(|e| SmfError::Framing { offset, message: e.to_string() })
}

fn read_header_fields(bytes: &[u8], offset: usize) -> Result<HeaderFields, SmfError> {
    let mut cursor = framed(bytes, offset, HEADER_FIELDS_LEN)?;
    cursor
        .read_be::<HeaderFields>()
        .map_err(|e| SmfError::Framing { offset, message: e.to_string() })
}

/// A cursor over exactly `len` bytes at `offset`, or a truncation error.
fn framed(bytes: &[u8], offset: usize, len: usize) -> Result<Cursor<&[u8]>, SmfError> {
    let available = bytes.len() - offset;
    if available < len {
        return Err(SmfError::TruncatedChunk { offset, declared: len, available });
    }
    Ok(Cursor::new(&bytes[offset..offset + len]))
}

/// Cursor over one track body. Every read is bounded by the declared end.
struct TrackReader<'a> {
    bytes: &'a [u8],
    offset: usize,
    end: usize,
}

impl<'a> TrackReader<'a> {
    fn new(bytes: &'a [u8], start: usize, end: usize) -> Self {
        Self { bytes, offset: start, end }
    }

    fn at_end(&self) -> bool {
        self.offset >= self.end
    }

    fn overrun(&self, wanted: usize) -> SmfError {
        SmfError::TrackOverrun {
            offset: self.offset,
            wanted,
            end: self.end,
        }
    }

    fn peek_u8(&self) -> Result<u8, SmfError> {
        if self.offset < self.end {
            Ok(self.bytes[self.offset])
        } else {
            Err(self.overrun(1))
        }
    }

    fn read_u8(&mut self) -> Result<u8, SmfError> {
        let b = self.peek_u8()?;
        self.offset += 1;
        Ok(b)
    }

    /// Skip `count` bytes and return the span they occupied.
    fn take(&mut self, count: usize) -> Result<ByteSpan, SmfError> {
        if count > self.end - self.offset {
            return Err(self.overrun(count));
        }
        let span = ByteSpan::new(self.offset, self.offset + count);
        self.offset += count;
        Ok(span)
    }

    fn read_vlq(&mut self) -> Result<u32, SmfError> {
        match decode_vlq(&self.bytes[self.offset..self.end]) {
            Ok((value, used)) => {
                self.offset += used;
                Ok(value)
            }
            Err(VlqError::Truncated) => Err(self.overrun(1)),
            Err(VlqError::TooLong) => Err(SmfError::MalformedVarint { offset: self.offset }),
        }
    }
}

fn parse_track(bytes: &[u8], start: usize, end: usize) -> Result<Track, SmfError> {
    let mut reader = TrackReader::new(bytes, start, end);
    let mut track = Track::new();
    let mut running_status: Option<u8> = None;
    let mut total_time = 0u64;
    let mut next_seq = 0u64;

    while !reader.at_end() {
        let delta_time = reader.read_vlq()?;
        total_time += delta_time as u64;

        let head = reader.peek_u8()?;
        let status = if head & 0x80 != 0 {
            reader.offset += 1;
            head
        } else {
            // Data byte: reuse the previous status and leave the byte in place
            // as the first parameter.
            running_status.ok_or(SmfError::MissingStatus { offset: reader.offset })?
        };

        let data = match status & 0xF0 {
            0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => {
                running_status = Some(status);
                reader.take(2)?
            }
            0xC0 | 0xD0 => {
                running_status = Some(status);
                reader.take(1)?
            }
            _ => {
                // Meta and sysex cancel running status.
                running_status = None;
                match status {
                    0xFF => {
                        let first = reader.offset;
                        reader.read_u8()?;
                        let len = reader.read_vlq()?;
                        reader.take(len as usize)?;
                        ByteSpan::new(first, reader.offset)
                    }
                    0xF0 | 0xF7 => {
                        let len = reader.read_vlq()?;
                        reader.take(len as usize)?
                    }
                    other => {
                        tracing::warn!(
                            "unhandled {:#04x} message at offset {}; ignoring",
                            other,
                            reader.offset - 1
                        );
                        continue;
                    }
                }
            }
        };

        track.events.push(Event {
            seq_id: next_seq,
            timestamp: total_time,
            delta_time,
            status,
            data,
        });
        next_seq += 1;
    }

    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vlq::encode_vlq;

    fn header_chunk(format: u16, ntrks: u16, division: u16) -> Vec<u8> {
        let mut out = b"MThd".to_vec();
        out.extend(6u32.to_be_bytes());
        out.extend(format.to_be_bytes());
        out.extend(ntrks.to_be_bytes());
        out.extend(division.to_be_bytes());
        out
    }

    fn track_chunk(body: &[u8]) -> Vec<u8> {
        let mut out = b"MTrk".to_vec();
        out.extend((body.len() as u32).to_be_bytes());
        out.extend(body);
        out
    }

    fn file(division: u16, bodies: &[&[u8]]) -> Vec<u8> {
        let mut out = header_chunk(1, bodies.len() as u16, division);
        for body in bodies {
            out.extend(track_chunk(body));
        }
        out
    }

    #[test]
    fn parses_header_and_channel_events() {
        let body = [
            0x00, 0x90, 0x3C, 0x64, // note on
            0x83, 0x60, 0x80, 0x3C, 0x00, // note off after 480 ticks
            0x00, 0xC1, 0x05, // program change
            0x00, 0xFF, 0x2F, 0x00, // end of track
        ];
        let data = parse_smf(file(480, &[&body])).unwrap();

        assert_eq!(data.header, SmfHeader { format: 1, ntrks: 1, division: 480 });
        let events = &data.tracks[0].events;
        assert_eq!(events.len(), 4);

        assert_eq!(events[0].status, 0x90);
        assert_eq!(events[0].payload(&data.bytes), &[0x3C, 0x64]);
        assert_eq!(events[1].timestamp, 480);
        assert_eq!(events[1].delta_time, 480);
        assert_eq!(events[1].payload(&data.bytes), &[0x3C, 0x00]);
        assert_eq!(events[2].payload(&data.bytes), &[0x05]);
        assert!(events[3].is_end_of_track(&data.bytes));
        assert_eq!(events[3].timestamp, 480);

        let seqs: Vec<u64> = events.iter().map(|e| e.seq_id).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[test]
    fn running_status_reuses_previous_status() {
        let body = [
            0x00, 0x91, 0x40, 0x50, //
            0x10, 0x43, 0x50, // running status note on
            0x10, 0x40, 0x00, //
        ];
        let data = parse_smf(file(96, &[&body])).unwrap();
        let events = &data.tracks[0].events;
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.status == 0x91));
        assert_eq!(events[1].payload(&data.bytes), &[0x43, 0x50]);
        assert_eq!(events[2].timestamp, 32);
    }

    #[test]
    fn tempo_meta_spans_type_length_and_payload() {
        let body = [0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, 0x00, 0xFF, 0x2F, 0x00];
        let data = parse_smf(file(96, &[&body])).unwrap();
        let tempo = &data.tracks[0].events[0];
        assert_eq!(tempo.tempo_us(&data.bytes), Some(500_000));
        assert_eq!(tempo.data.len(), 5);
    }

    #[test]
    fn sysex_uses_declared_length() {
        let mut body = vec![0x00, 0xF0];
        encode_vlq(5, &mut body);
        body.extend([0x7E, 0x7F, 0x09, 0x01, 0xF7]);
        body.extend([0x00, 0x90, 0x3C, 0x64]);
        let data = parse_smf(file(96, &[&body])).unwrap();
        let events = &data.tracks[0].events;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, 0xF0);
        assert_eq!(events[0].payload(&data.bytes), &[0x7E, 0x7F, 0x09, 0x01, 0xF7]);
        assert_eq!(events[1].status, 0x90);
    }

    #[test]
    fn unsupported_system_message_is_skipped() {
        let body = [0x00, 0xF8, 0x00, 0x90, 0x3C, 0x64];
        let data = parse_smf(file(96, &[&body])).unwrap();
        let events = &data.tracks[0].events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, 0x90);
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let mut bytes = header_chunk(0, 1, 96);
        bytes.extend(b"XFIH");
        bytes.extend(2u32.to_be_bytes());
        bytes.extend([0xAA, 0xBB]);
        bytes.extend(track_chunk(&[0x00, 0xFF, 0x2F, 0x00]));
        let data = parse_smf(bytes).unwrap();
        assert_eq!(data.tracks.len(), 1);
    }

    #[test]
    fn read_past_track_end_is_fatal() {
        // Note on declared inside a 3-byte track: second data byte is outside.
        let mut bytes = header_chunk(0, 1, 96);
        bytes.extend(b"MTrk");
        bytes.extend(3u32.to_be_bytes());
        bytes.extend([0x00, 0x90, 0x3C, 0x64]);
        assert!(matches!(parse_smf(bytes), Err(SmfError::TrackOverrun { .. })));
    }

    #[test]
    fn truncated_chunk_is_fatal() {
        let mut bytes = header_chunk(0, 1, 96);
        bytes.extend(b"MTrk");
        bytes.extend(100u32.to_be_bytes());
        bytes.extend([0x00, 0xFF, 0x2F, 0x00]);
        assert!(matches!(parse_smf(bytes), Err(SmfError::TruncatedChunk { .. })));
    }

    #[test]
    fn malformed_delta_is_fatal() {
        let body = [0x81, 0x80, 0x80, 0x80, 0x00, 0x90, 0x3C, 0x64];
        assert!(matches!(
            parse_smf(file(96, &[&body])),
            Err(SmfError::MalformedVarint { .. })
        ));
    }

    #[test]
    fn data_byte_without_status_is_fatal() {
        let body = [0x00, 0x3C, 0x64];
        assert!(matches!(
            parse_smf(file(96, &[&body])),
            Err(SmfError::MissingStatus { .. })
        ));
    }

    #[test]
    fn missing_header_is_fatal() {
        let bytes = track_chunk(&[0x00, 0xFF, 0x2F, 0x00]);
        assert!(matches!(parse_smf(bytes), Err(SmfError::MissingHeader)));
    }

    #[test]
    fn zero_division_is_fatal() {
        assert!(matches!(parse_smf(file(0, &[])), Err(SmfError::ZeroDivision)));
    }

    #[test]
    fn seq_ids_restart_per_track() {
        let a = [0x00, 0x90, 0x3C, 0x64, 0x00, 0x80, 0x3C, 0x00];
        let b = [0x00, 0x91, 0x3C, 0x64];
        let data = parse_smf(file(96, &[&a, &b])).unwrap();
        assert_eq!(data.tracks[0].events[1].seq_id, 1);
        assert_eq!(data.tracks[1].events[0].seq_id, 0);
    }
}
