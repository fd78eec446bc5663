//! PCM sample decoding.
//!
//! The producer writes signed little-endian integer PCM. Decoding normalizes
//! each sample to `f32` by dividing by the full-scale value of its bit depth,
//! so the most negative code maps to exactly `-1.0`.

/// Full scale of 16-bit samples (2^15).
const SCALE_16: f32 = 32_768.0;
/// Full scale of 24-bit samples (2^23).
const SCALE_24: f32 = 8_388_608.0;
/// Full scale of 32-bit samples (2^31).
const SCALE_32: f64 = 2_147_483_648.0;

/// Supported PCM sample widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSize {
    /// 16-bit signed integer.
    S16,
    /// 24-bit signed integer, packed in 3 bytes.
    S24,
    /// 32-bit signed integer.
    S32,
}

impl SampleSize {
    /// Maps a bit count from the stream header to a sample size.
    ///
    /// Returns `None` for widths the decoder cannot handle.
    #[must_use]
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            16 => Some(Self::S16),
            24 => Some(Self::S24),
            32 => Some(Self::S32),
            _ => None,
        }
    }

    /// Bytes used by one sample.
    #[must_use]
    pub fn bytes(self) -> usize {
        match self {
            Self::S16 => 2,
            Self::S24 => 3,
            Self::S32 => 4,
        }
    }
}

/// Decodes one 24-bit little-endian sample, sign-extending bit 23.
#[inline]
fn s24_to_i32(bytes: &[u8]) -> i32 {
    // Place the 3 bytes in the top of an i32, then shift back down arithmetically
    i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8
}

/// Decodes raw PCM bytes into normalized `f32` samples.
///
/// Decodes `min(src.len() / size.bytes(), dst.len())` samples and returns that
/// count. Trailing bytes that do not form a whole sample are ignored. Never
/// allocates.
pub fn decode_into(src: &[u8], size: SampleSize, dst: &mut [f32]) -> usize {
    let width = size.bytes();
    let count = (src.len() / width).min(dst.len());
    let src = src[..count * width].chunks_exact(width);

    match size {
        SampleSize::S16 => {
            for (out, raw) in dst.iter_mut().zip(src) {
                *out = f32::from(i16::from_le_bytes([raw[0], raw[1]])) / SCALE_16;
            }
        }
        SampleSize::S24 => {
            for (out, raw) in dst.iter_mut().zip(src) {
                *out = s24_to_i32(raw) as f32 / SCALE_24;
            }
        }
        SampleSize::S32 => {
            for (out, raw) in dst.iter_mut().zip(src) {
                let value = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                *out = (f64::from(value) / SCALE_32) as f32;
            }
        }
    }

    count
}

/// Encodes normalized `f32` samples as little-endian PCM.
///
/// Values are clamped to `[-1.0, 1.0]` and rounded to the nearest code.
/// Encodes `min(src.len(), dst.len() / size.bytes())` samples and returns that
/// count. Used by [`MockProducer`](crate::source::MockProducer) and tests.
pub fn encode_into(src: &[f32], size: SampleSize, dst: &mut [u8]) -> usize {
    let width = size.bytes();
    let count = src.len().min(dst.len() / width);

    for (&sample, out) in src.iter().zip(dst.chunks_exact_mut(width)).take(count) {
        let sample = f64::from(sample.clamp(-1.0, 1.0));
        match size {
            SampleSize::S16 => {
                let code = (sample * f64::from(SCALE_16)).round().clamp(-32_768.0, 32_767.0) as i16;
                out.copy_from_slice(&code.to_le_bytes());
            }
            SampleSize::S24 => {
                let code = (sample * f64::from(SCALE_24))
                    .round()
                    .clamp(-8_388_608.0, 8_388_607.0) as i32;
                out.copy_from_slice(&code.to_le_bytes()[..3]);
            }
            SampleSize::S32 => {
                let code = (sample * SCALE_32)
                    .round()
                    .clamp(-2_147_483_648.0, 2_147_483_647.0) as i32;
                out.copy_from_slice(&code.to_le_bytes());
            }
        }
    }

    count
}
