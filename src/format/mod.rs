//! Audio format handling.
//!
//! This module turns raw producer chunks into sink-ready audio:
//! - Sample decoding (16/24/32-bit PCM → `f32`)
//! - Channel demultiplexing by speaker bitmask
//! - Sample rate conversion (resampling)
//! - Format negotiation tying the above together

mod channel_map;
mod decode;
mod negotiate;
mod resample;

pub use channel_map::{ChannelRouting, CANONICAL_CHANNELS, CHANNEL_NAMES};
pub use decode::{decode_into, encode_into, SampleSize};
pub use negotiate::{ActiveFormat, ChunkDecoder, Delivery, FormatNegotiator, Negotiation};
pub use resample::{ResampleOutput, Resampler, ResamplerFactory, RubatoFactory, RubatoResampler};
