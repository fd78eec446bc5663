//! Mock producer for testing without a VM or IVSHMEM device.

use super::header::{StreamFormat, StreamHeader, HEADER_MAGIC};
use super::reader::next_index;
use super::region::MemoryRegion;
use crate::format::{encode_into, SampleSize};

/// Byte offset of chunk 0 in regions written by [`MockProducer`].
pub const MOCK_CHUNK_OFFSET: u8 = 64;

/// A mock producer that writes a valid shared-memory ring into a [`MemoryRegion`].
///
/// This allows testing the full bridge without a virtual machine or audio
/// driver, making it suitable for CI environments. The chunk size in bytes is
/// fixed at construction, as with the real driver.
///
/// # Example
///
/// ```
/// use shm_audio_bridge::source::{MockProducer, RingReader, ReaderPoll};
///
/// let mut producer = MockProducer::stereo_48k(480);
/// let mut reader = RingReader::new(producer.region());
/// assert!(matches!(reader.poll(), ReaderPoll::Resynced { .. }));
///
/// // 10ms of a 440Hz sine wave, then 10ms of silence
/// producer.push_sine(440.0, 0.5);
/// producer.push_silence();
///
/// assert!(matches!(reader.poll(), ReaderPoll::Chunk(_)));
/// assert!(matches!(reader.poll(), ReaderPoll::Chunk(_)));
/// assert_eq!(reader.poll(), ReaderPoll::Idle);
/// ```
pub struct MockProducer {
    region: MemoryRegion,
    header: StreamHeader,
    slots: u16,
    phase: f64,
    scratch: Vec<u8>,
}

impl MockProducer {
    /// Creates a producer with `max_chunks` slots of `chunk_frames` frames in `format`.
    ///
    /// The header is published immediately with a valid magic and write index 0.
    pub fn new(format: StreamFormat, chunk_frames: usize, max_chunks: u16) -> Self {
        let chunk_size = chunk_frames * format.frame_bytes();
        let region_len = usize::from(MOCK_CHUNK_OFFSET) + chunk_size * usize::from(max_chunks);

        let producer = Self {
            region: MemoryRegion::new(region_len),
            header: StreamHeader {
                magic: HEADER_MAGIC,
                write_index: 0,
                chunk_offset: MOCK_CHUNK_OFFSET,
                max_chunks,
                chunk_size: chunk_size as u32,
                format,
            },
            slots: max_chunks,
            phase: 0.0,
            scratch: vec![0; chunk_size],
        };
        producer.write_header();
        producer
    }

    /// Creates a 48kHz, 16-bit stereo producer with 16 slots.
    pub fn stereo_48k(chunk_frames: usize) -> Self {
        Self::new(
            StreamFormat {
                rate_code: 1,
                sample_size: 16,
                channels: 2,
                channel_map: 0x0003,
            },
            chunk_frames,
            16,
        )
    }

    /// Another handle to the region being written.
    pub fn region(&self) -> MemoryRegion {
        self.region.clone()
    }

    /// The header as last published.
    pub fn header(&self) -> StreamHeader {
        self.header
    }

    /// The advertised stream format.
    pub fn format(&self) -> StreamFormat {
        self.header.format
    }

    /// Whole frames that fit in one chunk in the current format.
    pub fn chunk_frames(&self) -> usize {
        match self.header.format.frame_bytes() {
            0 => 0,
            frame_bytes => self.header.chunk_size as usize / frame_bytes,
        }
    }

    /// Writes one chunk of interleaved samples into the next slot and publishes it.
    ///
    /// `interleaved` is truncated or padded with silence to fill the chunk.
    /// Formats the encoder does not know are written as silence.
    pub fn push_samples(&mut self, interleaved: &[f32]) {
        self.scratch.fill(0);
        if let Some(size) = SampleSize::from_bits(self.header.format.sample_size) {
            encode_into(interleaved, size, &mut self.scratch);
        }

        let index = next_index(self.header.write_index, self.slots);
        self.region
            .write(self.header.chunk_start(index), &self.scratch);
        self.publish(index);
    }

    /// Writes one chunk of silence.
    pub fn push_silence(&mut self) {
        self.push_samples(&[]);
    }

    /// Writes one chunk of a sine wave, the same on every channel.
    ///
    /// The phase carries over between calls, so consecutive chunks form one
    /// continuous tone.
    pub fn push_sine(&mut self, frequency: f64, amplitude: f32) {
        let channels = usize::from(self.header.format.channels);
        let rate = match self.header.format.sample_rate() {
            0 => 48_000.0,
            rate => f64::from(rate),
        };
        let step = 2.0 * std::f64::consts::PI * frequency / rate;

        let mut samples = Vec::with_capacity(self.chunk_frames() * channels);
        for _ in 0..self.chunk_frames() {
            let value = (self.phase.sin() as f32) * amplitude;
            samples.extend(std::iter::repeat(value).take(channels));
            self.phase = (self.phase + step) % (2.0 * std::f64::consts::PI);
        }
        self.push_samples(&samples);
    }

    /// Changes the advertised format; later chunks are encoded in it.
    pub fn set_format(&mut self, format: StreamFormat) {
        self.header.format = format;
        self.write_header();
    }

    /// Advertises `max_chunks` slots without resizing the region.
    ///
    /// Lets tests point the reader at chunks past the end of the region.
    pub fn set_max_chunks(&mut self, max_chunks: u16) {
        self.header.max_chunks = max_chunks;
        self.write_header();
    }

    /// Advertises `chunk_size` bytes per chunk without resizing the region.
    ///
    /// Lets tests present a corrupt header to the reader.
    pub fn set_chunk_size(&mut self, chunk_size: u32) {
        self.header.chunk_size = chunk_size;
        self.write_header();
    }

    /// Sets the write index without writing chunk data.
    pub fn publish(&mut self, write_index: u16) {
        self.header.write_index = write_index;
        self.write_header();
    }

    /// Clears the magic, as a producer does while shutting down.
    pub fn invalidate(&mut self) {
        self.header.magic = 0;
        self.write_header();
    }

    /// Restores the magic with a new write index, as a restarted producer does.
    pub fn restart(&mut self, write_index: u16) {
        self.header.magic = HEADER_MAGIC;
        self.header.write_index = write_index;
        self.write_header();
    }

    fn write_header(&self) {
        self.region.write(0, &self.header.to_bytes());
    }
}
