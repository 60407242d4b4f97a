//! Streaming WAV and raw PCM output.
//!
//! The WAV header is written up front with zero sizes and rewritten by
//! [`FrameSink::finish`] once the frame count is known.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::Path;

use pr_ir::{AudioFormat, AudioFrame, Sample};

const PCM_HEADER_LEN: u64 = 44;
const FLOAT_HEADER_LEN: u64 = 58;

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;

/// Destination for rendered frames.
pub trait FrameSink<T: Sample> {
    fn write_frames(&mut self, frames: &[AudioFrame<T>]) -> io::Result<()>;

    /// Flush and finalize. Safe to call more than once.
    fn finish(&mut self) -> io::Result<()>;
}

impl<T: Sample> FrameSink<T> for Vec<AudioFrame<T>> {
    fn write_frames(&mut self, frames: &[AudioFrame<T>]) -> io::Result<()> {
        self.extend_from_slice(frames);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Little-endian interleaved samples into `out`.
fn encode_frames<T: Sample>(frames: &[AudioFrame<T>], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(frames.len() * T::FORMAT.bytes_per_frame());
    for frame in frames {
        frame.left.extend_le(out);
        frame.right.extend_le(out);
    }
}

/// A WAV file writer for one sample format.
pub struct WavWriter<W: Write + Seek, T: Sample> {
    inner: W,
    sample_rate: u32,
    frames_written: u64,
    scratch: Vec<u8>,
    _sample: PhantomData<T>,
}

impl<T: Sample> WavWriter<BufWriter<File>, T> {
    pub fn create(path: &Path, sample_rate: u32) -> io::Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), sample_rate)
    }
}

impl<W: Write + Seek, T: Sample> WavWriter<W, T> {
    /// Write a placeholder header and return a writer positioned at the
    /// start of the data chunk.
    pub fn new(mut inner: W, sample_rate: u32) -> io::Result<Self> {
        write_header(&mut inner, T::FORMAT, sample_rate, 0)?;
        Ok(Self {
            inner,
            sample_rate,
            frames_written: 0,
            scratch: Vec::new(),
            _sample: PhantomData,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Header length for this writer's format.
    pub fn header_len() -> u64 {
        match T::FORMAT {
            AudioFormat::F32 => FLOAT_HEADER_LEN,
            AudioFormat::S16 | AudioFormat::S32 => PCM_HEADER_LEN,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Seek, T: Sample> FrameSink<T> for WavWriter<W, T> {
    fn write_frames(&mut self, frames: &[AudioFrame<T>]) -> io::Result<()> {
        encode_frames(frames, &mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        self.frames_written += frames.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        let end = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(0))?;
        write_header(&mut self.inner, T::FORMAT, self.sample_rate, self.frames_written)?;
        self.inner.seek(SeekFrom::Start(end))?;
        self.inner.flush()
    }
}

/// Headerless interleaved samples, for piping to stdout.
pub struct RawWriter<W: Write, T: Sample> {
    inner: W,
    scratch: Vec<u8>,
    _sample: PhantomData<T>,
}

impl<W: Write, T: Sample> RawWriter<W, T> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            scratch: Vec::new(),
            _sample: PhantomData,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write, T: Sample> FrameSink<T> for RawWriter<W, T> {
    fn write_frames(&mut self, frames: &[AudioFrame<T>]) -> io::Result<()> {
        encode_frames(frames, &mut self.scratch);
        self.inner.write_all(&self.scratch)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn write_header(
    w: &mut impl Write,
    format: AudioFormat,
    sample_rate: u32,
    frames: u64,
) -> io::Result<()> {
    let block_align = format.bytes_per_frame() as u16;
    let bits_per_sample = 8 * format.bytes_per_sample() as u16;
    let data_bytes = frames.saturating_mul(block_align as u64);
    let data_size = u32::try_from(data_bytes).unwrap_or_else(|_| {
        tracing::warn!("WAV data exceeds 4 GiB, header sizes are clamped");
        u32::MAX
    });
    let frame_count = u32::try_from(frames).unwrap_or(u32::MAX);

    if format.is_float() {
        write_riff_header(w, data_size.saturating_add(50))?;
        write_fmt_chunk(w, 18, WAVE_FORMAT_IEEE_FLOAT, sample_rate, block_align, bits_per_sample)?;
        // cbSize
        w.write_all(&0u16.to_le_bytes())?;
        w.write_all(b"fact")?;
        w.write_all(&4u32.to_le_bytes())?;
        w.write_all(&frame_count.to_le_bytes())?;
    } else {
        write_riff_header(w, data_size.saturating_add(36))?;
        write_fmt_chunk(w, 16, WAVE_FORMAT_PCM, sample_rate, block_align, bits_per_sample)?;
    }

    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())
}

fn write_riff_header(w: &mut impl Write, riff_size: u32) -> io::Result<()> {
    w.write_all(b"RIFF")?;
    w.write_all(&riff_size.to_le_bytes())?;
    w.write_all(b"WAVE")
}

fn write_fmt_chunk(
    w: &mut impl Write,
    chunk_size: u32,
    format_tag: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
) -> io::Result<()> {
    w.write_all(b"fmt ")?;
    w.write_all(&chunk_size.to_le_bytes())?;
    w.write_all(&format_tag.to_le_bytes())?;
    w.write_all(&AudioFrame::<i16>::CHANNELS.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&(sample_rate * block_align as u32).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&bits_per_sample.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn u16_at(b: &[u8], pos: usize) -> u16 {
        u16::from_le_bytes([b[pos], b[pos + 1]])
    }

    fn u32_at(b: &[u8], pos: usize) -> u32 {
        u32::from_le_bytes([b[pos], b[pos + 1], b[pos + 2], b[pos + 3]])
    }

    #[test]
    fn s16_header_and_data() {
        let mut w = WavWriter::<_, i16>::new(Cursor::new(Vec::new()), 32000).unwrap();
        w.write_frames(&[AudioFrame::new(1, -1), AudioFrame::new(0x1234, 0)])
            .unwrap();
        w.write_frames(&[AudioFrame::new(i16::MAX, i16::MIN)]).unwrap();
        w.finish().unwrap();
        assert_eq!(w.frames_written(), 3);
        let b = w.into_inner().into_inner();

        assert_eq!(b.len(), 44 + 12);
        assert_eq!(&b[0..4], b"RIFF");
        assert_eq!(u32_at(&b, 4), 36 + 12);
        assert_eq!(&b[8..12], b"WAVE");
        assert_eq!(&b[12..16], b"fmt ");
        assert_eq!(u32_at(&b, 16), 16);
        assert_eq!(u16_at(&b, 20), 1);
        assert_eq!(u16_at(&b, 22), 2);
        assert_eq!(u32_at(&b, 24), 32000);
        assert_eq!(u32_at(&b, 28), 32000 * 4);
        assert_eq!(u16_at(&b, 32), 4);
        assert_eq!(u16_at(&b, 34), 16);
        assert_eq!(&b[36..40], b"data");
        assert_eq!(u32_at(&b, 40), 12);
        assert_eq!(u16_at(&b, 44), 1);
        assert_eq!(u16_at(&b, 46), 0xFFFF);
        assert_eq!(u16_at(&b, 48), 0x1234);
    }

    #[test]
    fn s32_uses_pcm_header() {
        let mut w = WavWriter::<_, i32>::new(Cursor::new(Vec::new()), 64000).unwrap();
        w.write_frames(&[AudioFrame::new(7, 8)]).unwrap();
        w.finish().unwrap();
        let b = w.into_inner().into_inner();
        assert_eq!(b.len(), 44 + 8);
        assert_eq!(u16_at(&b, 20), 1);
        assert_eq!(u16_at(&b, 32), 8);
        assert_eq!(u16_at(&b, 34), 32);
        assert_eq!(u32_at(&b, 40), 8);
        assert_eq!(u32_at(&b, 44), 7);
    }

    #[test]
    fn f32_header_has_fact_chunk() {
        let mut w = WavWriter::<_, f32>::new(Cursor::new(Vec::new()), 32000).unwrap();
        w.write_frames(&[AudioFrame::new(0.5, -0.5); 5]).unwrap();
        w.finish().unwrap();
        let b = w.into_inner().into_inner();

        assert_eq!(WavWriter::<Cursor<Vec<u8>>, f32>::header_len(), 58);
        assert_eq!(b.len(), 58 + 40);
        assert_eq!(u32_at(&b, 4), 50 + 40);
        assert_eq!(u32_at(&b, 16), 18);
        assert_eq!(u16_at(&b, 20), 3);
        assert_eq!(u16_at(&b, 34), 32);
        assert_eq!(u16_at(&b, 36), 0);
        assert_eq!(&b[38..42], b"fact");
        assert_eq!(u32_at(&b, 42), 4);
        assert_eq!(u32_at(&b, 46), 5);
        assert_eq!(&b[50..54], b"data");
        assert_eq!(u32_at(&b, 54), 40);
        assert_eq!(&b[58..62], &0.5f32.to_le_bytes());
    }

    #[test]
    fn placeholder_header_before_finish() {
        let mut w = WavWriter::<_, i16>::new(Cursor::new(Vec::new()), 32000).unwrap();
        w.write_frames(&[AudioFrame::new(1, 1)]).unwrap();
        let b = w.into_inner().into_inner();
        assert_eq!(u32_at(&b, 40), 0);
        assert_eq!(u32_at(&b, 4), 36);
    }

    #[test]
    fn finish_twice_keeps_layout() {
        let mut w = WavWriter::<_, i16>::new(Cursor::new(Vec::new()), 32000).unwrap();
        w.write_frames(&[AudioFrame::new(1, 1)]).unwrap();
        w.finish().unwrap();
        w.write_frames(&[AudioFrame::new(2, 2)]).unwrap();
        w.finish().unwrap();
        let b = w.into_inner().into_inner();
        assert_eq!(b.len(), 44 + 8);
        assert_eq!(u32_at(&b, 40), 8);
        assert_eq!(u16_at(&b, 48), 2);
    }

    #[test]
    fn raw_writer_has_no_header() {
        let mut w = RawWriter::<_, i16>::new(Vec::new());
        w.write_frames(&[AudioFrame::new(1, 2)]).unwrap();
        w.finish().unwrap();
        assert_eq!(w.into_inner(), vec![1, 0, 2, 0]);
    }

    #[test]
    fn vec_sink_collects_frames() {
        let mut sink: Vec<AudioFrame<f32>> = Vec::new();
        sink.write_frames(&[AudioFrame::new(0.25, 0.5)]).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink, vec![AudioFrame::new(0.25, 0.5)]);
    }
}
