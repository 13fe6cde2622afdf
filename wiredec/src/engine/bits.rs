//! Bit recovery: turning sampled levels into timed logical bits.
//!
//! Two timing models are provided. [`BitClock`] covers protocols with a
//! known nominal bit rate measured from a frame-local reference point,
//! such as a UART start bit. [`EdgeSync`] covers self-clocked lines
//! that resynchronize on observed edges, such as CAN, and detects when
//! an edge lands too far from a bit boundary to be trusted.

use crate::engine::capture::SamplePosition;

/// A recovered logical bit with its sample span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bit {
    pub level: bool,
    pub ss: SamplePosition,
    pub es: SamplePosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    #[default]
    LsbFirst,
    MsbFirst,
}

/// Packs up to 16 recovered bit levels into an integer.
pub fn pack_bits(levels: &[bool], order: BitOrder) -> u16 {
    match order {
        BitOrder::LsbFirst => levels
            .iter()
            .enumerate()
            .fold(0, |acc, (i, &b)| acc | (u16::from(b) << i)),
        BitOrder::MsbFirst => levels.iter().fold(0, |acc, &b| (acc << 1) | u16::from(b)),
    }
}

/// Fixed-rate bit timing anchored at a frame reference sample.
///
/// Bit `n` is sampled at `frame_start + (bit_width - 1) * point + n *
/// bit_width`, where `point` is the intra-bit sample position as a
/// fraction. With the conventional mid-bit point of 0.5 this lands in
/// the middle of each bit.
#[derive(Debug, Clone, Copy)]
pub struct BitClock {
    pub bit_width: f64,
    pub sample_point: f64,
    pub frame_start: SamplePosition,
}

impl BitClock {
    pub fn new(bit_width: f64, sample_point: f64, frame_start: SamplePosition) -> Self {
        Self {
            bit_width,
            sample_point,
            frame_start,
        }
    }

    /// Absolute sample at which to read bit `n` of the frame.
    pub fn sample_point_of(&self, n: u32) -> SamplePosition {
        let offset = (self.bit_width - 1.0) * self.sample_point + n as f64 * self.bit_width;

        self.frame_start + offset.ceil() as u64
    }

    /// Span covered by bit `n`, used for annotation extents.
    pub fn bit_span(&self, n: u32) -> (SamplePosition, SamplePosition) {
        let half = self.bit_width / 2.0;
        let point = self.sample_point_of(n);

        (
            point.saturating_sub(half.floor() as u64),
            point + half.ceil() as u64,
        )
    }
}

/// Tolerance for edge placement, as a fraction of a bit width.
const SYNC_TOLERANCE: f64 = 0.25;

/// Edge-resynchronized bit timing for self-clocked lines.
///
/// The clock phase is re-anchored on every observed edge. When a new
/// edge arrives, [`EdgeSync::classify`] maps it to the integral number
/// of bit periods since the anchor; an edge further than the tolerance
/// from any boundary means the recovered clock can no longer be
/// trusted and the caller must flush and restart from that edge.
#[derive(Debug, Clone, Copy)]
pub struct EdgeSync {
    pub bit_width: f64,
    pub sample_point: f64,
    anchor: SamplePosition,
    anchor_bit: u32,
}

impl EdgeSync {
    pub fn new(bit_width: f64, sample_point: f64, start: SamplePosition) -> Self {
        Self {
            bit_width,
            sample_point,
            anchor: start,
            anchor_bit: 0,
        }
    }

    /// Re-anchors the clock phase at an observed edge.
    pub fn edge_seen(&mut self, pos: SamplePosition, bitnum: u32) {
        self.anchor = pos;
        self.anchor_bit = bitnum;
    }

    /// Absolute sample at which to read bit `n`.
    pub fn sample_point_of(&self, n: u32) -> SamplePosition {
        let bits_from_anchor = n.saturating_sub(self.anchor_bit) as f64;
        let offset = self.sample_point * self.bit_width + bits_from_anchor * self.bit_width;

        self.anchor + offset as u64
    }

    /// Maps an edge position to the bit index it begins.
    ///
    /// Returns `None` when the edge is more than the tolerance away
    /// from every bit boundary, which signals loss of synchronization.
    pub fn classify(&self, pos: SamplePosition) -> Option<u32> {
        if pos < self.anchor {
            return None;
        }

        let periods = (pos - self.anchor) as f64 / self.bit_width;
        let nearest = periods.round();

        if (periods - nearest).abs() <= SYNC_TOLERANCE {
            Some(self.anchor_bit + nearest as u32)
        } else {
            None
        }
    }
}

#[test]
fn pack_orders() {
    let bits = [true, false, false, true, false, false, false, false];

    assert_eq!(pack_bits(&bits, BitOrder::LsbFirst), 0x09);
    assert_eq!(pack_bits(&bits, BitOrder::MsbFirst), 0x90);
}

#[test]
fn pack_round_trip() {
    for value in 0..=255u16 {
        let lsb: Vec<bool> = (0..8).map(|i| (value >> i) & 1 != 0).collect();
        let msb: Vec<bool> = (0..8).rev().map(|i| (value >> i) & 1 != 0).collect();

        assert_eq!(pack_bits(&lsb, BitOrder::LsbFirst), value);
        assert_eq!(pack_bits(&msb, BitOrder::MsbFirst), value);
    }
}

#[test]
fn clock_sample_points() {
    // 10 samples per bit, mid-bit sampling, frame starting at 100.
    let clock = BitClock::new(10.0, 0.5, 100);

    assert_eq!(clock.sample_point_of(0), 105);
    assert_eq!(clock.sample_point_of(1), 115);
    assert_eq!(clock.sample_point_of(8), 185);
}

#[test]
fn clock_bit_span() {
    let clock = BitClock::new(10.0, 0.5, 100);
    let (ss, es) = clock.bit_span(0);

    assert_eq!(ss, 100);
    assert_eq!(es, 110);
}

#[test]
fn edge_sync_classifies_boundaries() {
    let mut sync = EdgeSync::new(10.0, 0.5, 1000);

    assert_eq!(sync.classify(1000), Some(0));
    assert_eq!(sync.classify(1021), Some(2));
    assert_eq!(sync.classify(1048), Some(5));
    // 1035 is equidistant between boundaries; outside tolerance.
    assert_eq!(sync.classify(1036), None);

    sync.edge_seen(1050, 5);
    assert_eq!(sync.classify(1060), Some(6));
}

#[test]
fn edge_sync_sample_point_follows_anchor() {
    let mut sync = EdgeSync::new(10.0, 0.5, 0);

    assert_eq!(sync.sample_point_of(0), 5);
    assert_eq!(sync.sample_point_of(3), 35);

    // After drifting by one sample the points track the new anchor.
    sync.edge_seen(31, 3);
    assert_eq!(sync.sample_point_of(3), 36);
    assert_eq!(sync.sample_point_of(4), 46);
}
