//! Channel demultiplexing by speaker-position bitmask.
//!
//! The stream's channel map is a bitmask over the canonical speaker order
//! below. The k-th set bit (counting from bit 0) names the output slot of the
//! k-th interleaved channel. Bits above the last canonical slot are ignored.

use crate::sink::OutputPlanes;

/// Number of canonical output slots.
pub const CANONICAL_CHANNELS: usize = 11;

/// Display names of the canonical output slots, in bit order.
pub const CHANNEL_NAMES: [&str; CANONICAL_CHANNELS] = [
    "Front Left",
    "Front Right",
    "Front Center",
    "LFE / Subwoofer",
    "Rear Left",
    "Rear Right",
    "Front-Left Center",
    "Front-Right Center",
    "Rear Center",
    "Side Left",
    "Side Right",
];

/// Precomputed assignment of stream channels to output slots.
///
/// Build one per format change with [`ChannelRouting::new`]; the same
/// `(channel_map, channels)` pair always produces the same routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRouting {
    stream_channels: usize,
    slot_of_channel: [Option<u8>; CANONICAL_CHANNELS],
    channel_of_slot: [Option<u8>; CANONICAL_CHANNELS],
}

impl ChannelRouting {
    /// Computes the routing for `channels` interleaved channels under `channel_map`.
    ///
    /// Stream channels beyond the number of set bits (or beyond the canonical
    /// slots) are left unrouted and will be discarded.
    #[must_use]
    pub fn new(channel_map: u16, channels: usize) -> Self {
        let mut slot_of_channel = [None; CANONICAL_CHANNELS];
        let mut channel_of_slot = [None; CANONICAL_CHANNELS];

        let mut bit = 0;
        for channel in 0..channels.min(CANONICAL_CHANNELS) {
            // Resume scanning where the previous channel's bit was found
            while bit < CANONICAL_CHANNELS && (channel_map >> bit) & 1 == 0 {
                bit += 1;
            }
            if bit == CANONICAL_CHANNELS {
                break;
            }
            slot_of_channel[channel] = Some(bit as u8);
            channel_of_slot[bit] = Some(channel as u8);
            bit += 1;
        }

        Self {
            stream_channels: channels,
            slot_of_channel,
            channel_of_slot,
        }
    }

    /// Output slot receiving stream channel `channel`, if any.
    pub fn slot_for(&self, channel: usize) -> Option<usize> {
        self.slot_of_channel
            .get(channel)
            .copied()
            .flatten()
            .map(usize::from)
    }

    /// Stream channel feeding output slot `slot`, if any.
    pub fn channel_for(&self, slot: usize) -> Option<usize> {
        self.channel_of_slot
            .get(slot)
            .copied()
            .flatten()
            .map(usize::from)
    }

    /// Number of stream channels that reach an output slot.
    pub fn routed_channels(&self) -> usize {
        self.slot_of_channel.iter().flatten().count()
    }

    /// Copies `outputs.frames()` frames of `interleaved` into the routed slots.
    ///
    /// Slots without a stream channel are filled with silence. `interleaved`
    /// must hold at least `outputs.frames()` frames of the stream's channels;
    /// frames past its end are left silent.
    pub fn demux(&self, interleaved: &[f32], outputs: &mut OutputPlanes) {
        let channels = self.stream_channels.max(1);

        for slot in 0..CANONICAL_CHANNELS {
            let plane = outputs.plane_mut(slot);
            plane.fill(0.0);
            if let Some(channel) = self.channel_for(slot) {
                for (out, frame) in plane.iter_mut().zip(interleaved.chunks_exact(channels)) {
                    *out = frame[channel];
                }
            }
        }
    }
}

impl Default for ChannelRouting {
    /// Stereo on front-left/front-right.
    fn default() -> Self {
        Self::new(0x0003, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_map() {
        let routing = ChannelRouting::new(0x0003, 2);
        assert_eq!(routing.slot_for(0), Some(0));
        assert_eq!(routing.slot_for(1), Some(1));
        assert_eq!(routing.routed_channels(), 2);
    }

    #[test]
    fn test_three_channels_leave_lfe_unmapped() {
        let routing = ChannelRouting::new(0x0007, 3);
        assert_eq!(routing.slot_for(2), Some(2));
        assert_eq!(routing.channel_for(3), None);
    }

    #[test]
    fn test_sparse_map_skips_clear_bits() {
        // 5.1 with side speakers: FL FR FC LFE SL SR
        let routing = ChannelRouting::new(0x060F, 6);
        let slots: Vec<_> = (0..6).map(|k| routing.slot_for(k)).collect();
        assert_eq!(
            slots,
            vec![Some(0), Some(1), Some(2), Some(3), Some(9), Some(10)]
        );
        assert_eq!(routing.channel_for(4), None);
        assert_eq!(routing.channel_for(9), Some(4));
    }

    #[test]
    fn test_more_channels_than_bits() {
        let routing = ChannelRouting::new(0x0001, 2);
        assert_eq!(routing.slot_for(0), Some(0));
        assert_eq!(routing.slot_for(1), None);
        assert_eq!(routing.routed_channels(), 1);
    }

    #[test]
    fn test_high_bits_ignored() {
        let routing = ChannelRouting::new(0xF800 | 0x0001, 3);
        assert_eq!(routing.slot_for(0), Some(0));
        assert_eq!(routing.slot_for(1), None);
        assert_eq!(routing.slot_for(2), None);
    }

    #[test]
    fn test_routing_is_deterministic() {
        for map in [0x0003u16, 0x0007, 0x003F, 0x060F, 0x07FF] {
            assert_eq!(ChannelRouting::new(map, 8), ChannelRouting::new(map, 8));
        }
    }

    #[test]
    fn test_demux_places_channels_and_silences_rest() {
        let routing = ChannelRouting::new(0x0007, 3);
        let interleaved = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let mut outputs = OutputPlanes::new(4);
        outputs.set_frames(2);
        outputs.plane_mut(3).fill(9.0);

        routing.demux(&interleaved, &mut outputs);

        assert_eq!(outputs.plane(0), &[0.1, 0.4]);
        assert_eq!(outputs.plane(1), &[0.2, 0.5]);
        assert_eq!(outputs.plane(2), &[0.3, 0.6]);
        assert_eq!(outputs.plane(3), &[0.0, 0.0]);
        assert_eq!(outputs.plane(10), &[0.0, 0.0]);
    }

    #[test]
    fn test_channel_names_cover_every_slot() {
        assert_eq!(CHANNEL_NAMES.len(), CANONICAL_CHANNELS);
        assert_eq!(CHANNEL_NAMES[3], "LFE / Subwoofer");
    }
}
