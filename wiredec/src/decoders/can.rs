//! CAN decoder (classic 2.0A/2.0B frames).
//!
//! The bus is self-clocked: the decoder anchors its bit clock at the
//! SOF edge and re-anchors on every dominant edge. An edge that lands
//! too far from a bit boundary means synchronization is lost; the
//! frame in progress is flushed with a warning and the offending edge
//! is treated as a new start of frame. Stuff bits are stripped from
//! SOF through the CRC sequence, and the CRC-15 is verified against
//! the received sequence. CAN FD frames are reported and skipped.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use log::Level;

use crate::engine::assemble::{StuffRemover, StuffVerdict};
use crate::engine::bits::EdgeSync;
use crate::engine::capture::{Capture, Cond, Cursor, SamplePosition};
use crate::engine::sink::{Annotation, Sink, Spanned};
use crate::log_or_err;
use crate::utils::crc::{CRC_15_CAN_ALG, Crc};
use crate::utils::errors::{CanError, ConfigError};

pub const ANN_DATA: u32 = 0;
pub const ANN_SOF: u32 = 1;
pub const ANN_EOF: u32 = 2;
pub const ANN_ID: u32 = 3;
pub const ANN_EXT_ID: u32 = 4;
pub const ANN_FULL_ID: u32 = 5;
pub const ANN_IDE: u32 = 6;
pub const ANN_RESERVED: u32 = 7;
pub const ANN_RTR: u32 = 8;
pub const ANN_SRR: u32 = 9;
pub const ANN_DLC: u32 = 10;
pub const ANN_CRC_SEQ: u32 = 11;
pub const ANN_CRC_DELIM: u32 = 12;
pub const ANN_ACK_SLOT: u32 = 13;
pub const ANN_ACK_DELIM: u32 = 14;
pub const ANN_STUFF_BIT: u32 = 15;
pub const ANN_WARNING: u32 = 16;
pub const ANN_BIT: u32 = 17;

const CRC_15: Crc = Crc::new(&CRC_15_CAN_ALG);

/// Payload length for a DLC value. Values above 8 only occur in FD
/// frames but the table keeps the classic decoder total.
const fn dlc2len(dlc: u8) -> usize {
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64][dlc as usize]
}

#[derive(Debug, Clone)]
pub struct CanOptions {
    pub channel: Option<usize>,
    pub bitrate: f64,
    /// Intra-bit sample position in percent.
    pub sample_point: f64,
}

impl Default for CanOptions {
    fn default() -> Self {
        Self {
            channel: None,
            bitrate: 1_000_000.0,
            sample_point: 70.0,
        }
    }
}

impl CanOptions {
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut opts = Self::default();

        for (key, value) in pairs {
            let bad = || ConfigError::InvalidOption {
                option: key.clone(),
                value: value.clone(),
            };

            match key.as_str() {
                "channel" => opts.channel = Some(value.parse().map_err(|_| bad())?),
                "bitrate" => opts.bitrate = value.parse().map_err(|_| bad())?,
                "sample_point" => {
                    let point: f64 = value.parse().map_err(|_| bad())?;
                    if !(1.0..=99.0).contains(&point) {
                        return Err(bad());
                    }
                    opts.sample_point = point;
                }
                _ => return Err(ConfigError::UnknownOption(key.clone())),
            }
        }

        Ok(opts)
    }
}

/// A fully recovered classic CAN frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    pub id: u32,
    pub extended: bool,
    pub remote: bool,
    pub dlc: u8,
    pub data: Vec<u8>,
    pub crc: u16,
    pub crc_ok: bool,
}

// Sentinel for "DLC not seen yet", large enough that bitnum
// comparisons against it and its +17 never fire.
const NO_DATABIT: usize = usize::MAX / 2;

#[derive(Debug)]
struct FrameBuild {
    bits: Vec<(bool, SamplePosition)>,
    stuff: StuffRemover,
    crc_reg: u32,
    extended: bool,
    remote: bool,
    ident: u32,
    fullid: u32,
    dlc: u8,
    dlc_start: usize,
    last_databit: usize,
    byte_positions: Vec<SamplePosition>,
    frame_bytes: Vec<u8>,
    crc_read: u16,
    crc_ok: bool,
    ss_packet: SamplePosition,
    ss_block: SamplePosition,
    ss_bit12: SamplePosition,
}

impl FrameBuild {
    fn new(sof: SamplePosition) -> Self {
        Self {
            bits: Vec::new(),
            stuff: StuffRemover::new(),
            crc_reg: CRC_15.init(),
            extended: false,
            remote: false,
            ident: 0,
            fullid: 0,
            dlc: 0,
            dlc_start: NO_DATABIT,
            last_databit: NO_DATABIT,
            byte_positions: Vec::new(),
            frame_bytes: Vec::new(),
            crc_read: 0,
            crc_ok: false,
            ss_packet: sof,
            ss_block: sof,
            ss_bit12: sof,
        }
    }
}

enum Step {
    Continue,
    Done,
    /// Frame abandoned (FD); hunt for the next SOF.
    Abort,
}

#[derive(Debug)]
pub struct CanDecoder {
    opts: CanOptions,
    pub fail_level: Level,
}

struct Session<'a> {
    capture: &'a Capture,
    channel: usize,
    bit_width: f64,
    /// Sample point offset into a bit, in samples.
    point: f64,
    fail_level: Level,
    anns: Vec<Annotation>,
    records: Vec<Spanned<CanFrame>>,
    frame: FrameBuild,
}

impl CanDecoder {
    pub fn new(opts: CanOptions) -> Self {
        Self {
            opts,
            fail_level: Level::Error,
        }
    }

    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
    }

    pub fn decode(&self, capture: &Capture, sink: &mut impl Sink<CanFrame>) -> Result<()> {
        let Some(samplerate) = capture.samplerate() else {
            anyhow::bail!(ConfigError::SamplerateMissing);
        };
        let Some(channel) = self.opts.channel else {
            anyhow::bail!(ConfigError::ChannelMissing("CAN RX"));
        };
        if channel >= 8 {
            anyhow::bail!(ConfigError::ChannelOutOfRange {
                index: channel,
                width: 8,
            });
        }

        let bit_width = samplerate / self.opts.bitrate;
        let mut session = Session {
            capture,
            channel,
            bit_width,
            point: bit_width * self.opts.sample_point / 100.0,
            fail_level: self.fail_level,
            anns: Vec::new(),
            records: Vec::new(),
            frame: FrameBuild::new(0),
        };

        session.run()?;

        session.anns.sort_by_key(|a| a.ss);
        for ann in session.anns {
            sink.annotate(ann);
        }
        for record in session.records {
            sink.record(record);
        }

        Ok(())
    }
}

impl Session<'_> {
    fn bit_span(&self, pos: SamplePosition) -> (SamplePosition, SamplePosition) {
        (
            pos.saturating_sub(self.point as u64),
            pos + (self.bit_width - self.point) as u64,
        )
    }

    fn put_bit(&mut self, pos: SamplePosition, class: u32, texts: Vec<String>) {
        let (ss, es) = self.bit_span(pos);
        self.anns.push(Annotation::new(ss, es, class, texts));
    }

    fn put_block(&mut self, es_pos: SamplePosition, class: u32, texts: Vec<String>) {
        let (ss, _) = self.bit_span(self.frame.ss_block);
        let (_, es) = self.bit_span(es_pos);
        self.anns.push(Annotation::new(ss, es, class, texts));
    }

    fn run(&mut self) -> Result<()> {
        let mut cursor = Cursor::new(self.capture);

        'frames: loop {
            // Bus idle until the first dominant level: start of frame.
            let Some(m) = cursor.wait(&[Cond::Low(self.channel)]) else {
                return Ok(());
            };

            let mut sof = m.pos;
            'restart: loop {
                let mut sync = EdgeSync::new(self.bit_width, self.point / self.bit_width, sof);
                self.frame = FrameBuild::new(sof);
                let mut curbit: u32 = 0;

                loop {
                    let target = sync.sample_point_of(curbit);
                    let skip = target.saturating_sub(cursor.pos()).max(1);
                    let Some(m) = cursor.wait(&[Cond::Skip(skip), Cond::Falling(self.channel)])
                    else {
                        self.flush_truncated()?;
                        return Ok(());
                    };

                    if m.matched(1) {
                        match sync.classify(m.pos) {
                            Some(bitnum) => sync.edge_seen(m.pos, bitnum),
                            None => {
                                let (ss, es) = self.bit_span(m.pos);
                                self.anns.push(Annotation::new(
                                    ss,
                                    es,
                                    ANN_WARNING,
                                    vec!["Synchronization lost".into(), "Sync lost".into()],
                                ));
                                log_or_err!(self, Level::Warn, anyhow!(CanError::SyncLost(m.pos)));
                                cursor.seek(m.pos);
                                sof = m.pos;
                                continue 'restart;
                            }
                        }
                    }

                    if m.matched(0) {
                        let level = self.capture.level(m.pos, self.channel);
                        match self.handle_bit(level, m.pos)? {
                            Step::Continue => curbit += 1,
                            Step::Done | Step::Abort => continue 'frames,
                        }
                    }
                }
            }
        }
    }

    fn flush_truncated(&mut self) -> Result<()> {
        if self.frame.bits.is_empty() {
            return Ok(());
        }

        let got = self.frame.bits.len();
        let (ss, _) = self.bit_span(self.frame.ss_packet);
        self.anns.push(Annotation::new(
            ss,
            self.capture.len(),
            ANN_WARNING,
            vec!["Frame truncated at end of capture".into(), "Trunc".into()],
        ));
        log_or_err!(self, Level::Warn, anyhow!(CanError::TruncatedFrame(got)));

        Ok(())
    }

    fn bit_value(&self, bitnum: usize) -> bool {
        self.frame.bits[bitnum].0
    }

    fn pack(&self, range: std::ops::Range<usize>) -> u32 {
        self.frame.bits[range]
            .iter()
            .fold(0, |acc, &(b, _)| (acc << 1) | b as u32)
    }

    fn handle_bit(&mut self, level: bool, pos: SamplePosition) -> Result<Step> {
        self.frame.bits.push((level, pos));
        let bitnum = self.frame.bits.len() - 1;

        // Stuffing covers SOF through the CRC sequence. The run
        // tracker is fed either way so it stays aligned.
        let stuffing_active = self.frame.bits.len() <= self.frame.last_databit + 17;
        match self.frame.stuff.feed(level) {
            StuffVerdict::Stuffed if stuffing_active => {
                self.frame.bits.pop();
                self.put_bit(pos, ANN_STUFF_BIT, vec![(level as u8).to_string()]);
                return Ok(Step::Continue);
            }
            StuffVerdict::Error if stuffing_active => {
                self.put_bit(
                    pos,
                    ANN_WARNING,
                    vec!["Six consecutive identical bits".into(), "Stuff err".into()],
                );
                log_or_err!(self, Level::Warn, anyhow!(CanError::StuffError));
            }
            _ => {}
        }

        self.put_bit(pos, ANN_BIT, vec![(level as u8).to_string()]);

        if bitnum <= self.frame.last_databit {
            self.frame.crc_reg = CRC_15.update_bit(self.frame.crc_reg, level);
        }

        match bitnum {
            // Start of frame, must be dominant.
            0 => {
                self.frame.ss_packet = pos;
                self.put_bit(
                    pos,
                    ANN_SOF,
                    vec!["Start of frame".into(), "SOF".into(), "S".into()],
                );
                if level {
                    self.put_bit(
                        pos,
                        ANN_WARNING,
                        vec!["Start of frame (SOF) must be a dominant bit".into()],
                    );
                }
            }
            1 => self.frame.ss_block = pos,
            // Identifier ID[10..0]; bits 10..4 must not all be recessive.
            11 => {
                self.frame.ident = self.pack(1..12);
                self.frame.fullid = self.frame.ident;
                let s = format!("{} (0x{:x})", self.frame.ident, self.frame.ident);
                self.put_block(
                    pos,
                    ANN_ID,
                    vec![format!("Identifier: {s}"), format!("ID: {s}"), "ID".into()],
                );
                if self.frame.ident & 0x7f0 == 0x7f0 {
                    self.put_block(
                        pos,
                        ANN_WARNING,
                        vec!["Identifier bits 10..4 must not be all recessive".into()],
                    );
                }
            }
            // RTR or SRR, interpreted once IDE is known.
            12 => self.frame.ss_bit12 = pos,
            // Identifier extension: dominant standard, recessive extended.
            13 => {
                self.frame.extended = level;
                let ide = if level { "extended" } else { "standard" };
                self.put_bit(
                    pos,
                    ANN_IDE,
                    vec![
                        format!("Identifier extension bit: {ide} frame"),
                        format!("IDE: {ide} frame"),
                        "IDE".into(),
                    ],
                );
            }
            _ => {
                return if self.frame.extended {
                    self.extended_frame(level, pos, bitnum)
                } else {
                    self.standard_frame(level, pos, bitnum)
                };
            }
        }

        Ok(Step::Continue)
    }

    fn standard_frame(&mut self, level: bool, pos: SamplePosition, bitnum: usize) -> Result<Step> {
        if bitnum == 14 {
            // Recessive here marks an FD frame.
            if level {
                self.put_bit(
                    pos,
                    ANN_WARNING,
                    vec!["FD frame, not decoded".into(), "FD".into()],
                );
                log_or_err!(self, Level::Warn, anyhow!(CanError::FdFrameUnsupported(pos)));
                return Ok(Step::Abort);
            }
            self.put_bit(
                pos,
                ANN_RESERVED,
                vec![
                    format!("Reserved bit 0: {}", level as u8),
                    format!("RB0: {}", level as u8),
                    "RB0".into(),
                ],
            );

            let remote = self.bit_value(12);
            self.frame.remote = remote;
            let rtr = if remote { "remote" } else { "data" };
            let ss_bit12 = self.frame.ss_bit12;
            self.put_bit(
                ss_bit12,
                ANN_RTR,
                vec![
                    format!("Remote transmission request: {rtr} frame"),
                    format!("RTR: {rtr} frame"),
                    "RTR".into(),
                ],
            );
            self.frame.dlc_start = 15;
        }

        if bitnum == self.frame.dlc_start {
            self.frame.ss_block = pos;
        } else if bitnum == self.frame.dlc_start + 3 {
            self.read_dlc(pos)?;
            if self.frame.dlc > 8 {
                self.put_block(
                    pos,
                    ANN_WARNING,
                    vec!["Data length code (DLC) > 8 is not allowed".into()],
                );
            }
        } else if bitnum > self.frame.dlc_start + 3 && bitnum < self.frame.last_databit {
            self.frame.byte_positions.push(pos);
        } else if bitnum == self.frame.last_databit {
            self.read_data_bytes(pos);
        } else if bitnum > self.frame.last_databit {
            return self.frame_end(level, pos, bitnum);
        }

        Ok(Step::Continue)
    }

    fn extended_frame(&mut self, level: bool, pos: SamplePosition, bitnum: usize) -> Result<Step> {
        if bitnum == 14 {
            self.frame.ss_block = pos;
            self.frame.dlc_start = 35;
        } else if bitnum == 31 {
            // Extended identifier EID[17..0].
            let eid = self.pack(14..32);
            self.frame.fullid = (self.frame.ident << 18) | eid;
            let s = format!("{eid} (0x{eid:x})");
            self.put_block(
                pos,
                ANN_EXT_ID,
                vec![
                    format!("Extended Identifier: {s}"),
                    format!("Extended ID: {s}"),
                    "EID".into(),
                ],
            );
            let full = self.frame.fullid;
            let s = format!("{full} (0x{full:x})");
            self.put_block(
                pos,
                ANN_FULL_ID,
                vec![format!("Full Identifier: {s}"), format!("Full ID: {s}"), "FID".into()],
            );
            let srr = self.bit_value(12) as u8;
            let ss_bit12 = self.frame.ss_bit12;
            self.put_bit(
                ss_bit12,
                ANN_SRR,
                vec![
                    format!("Substitute remote request: {srr}"),
                    format!("SRR: {srr}"),
                    "SRR".into(),
                ],
            );
        }

        if bitnum == 32 {
            self.frame.remote = level;
            let rtr = if level { "remote" } else { "data" };
            self.put_bit(
                pos,
                ANN_RTR,
                vec![
                    format!("Remote transmission request: {rtr} frame"),
                    format!("RTR: {rtr} frame"),
                    "RTR".into(),
                ],
            );
        } else if bitnum == 33 {
            if level {
                self.put_bit(
                    pos,
                    ANN_WARNING,
                    vec!["FD frame, not decoded".into(), "FD".into()],
                );
                log_or_err!(self, Level::Warn, anyhow!(CanError::FdFrameUnsupported(pos)));
                return Ok(Step::Abort);
            }
            self.put_bit(
                pos,
                ANN_RESERVED,
                vec![
                    format!("Reserved bit 1: {}", level as u8),
                    format!("RB1: {}", level as u8),
                    "RB1".into(),
                ],
            );
        } else if bitnum == 34 {
            self.put_bit(
                pos,
                ANN_RESERVED,
                vec![
                    format!("Reserved bit 0: {}", level as u8),
                    format!("RB0: {}", level as u8),
                    "RB0".into(),
                ],
            );
        } else if bitnum == self.frame.dlc_start {
            self.frame.ss_block = pos;
        } else if bitnum == self.frame.dlc_start + 3 {
            self.read_dlc(pos)?;
        } else if bitnum > self.frame.dlc_start + 3 && bitnum < self.frame.last_databit {
            self.frame.byte_positions.push(pos);
        } else if bitnum == self.frame.last_databit {
            self.read_data_bytes(pos);
        } else if bitnum > self.frame.last_databit {
            return self.frame_end(level, pos, bitnum);
        }

        Ok(Step::Continue)
    }

    fn read_dlc(&mut self, pos: SamplePosition) -> Result<()> {
        let start = self.frame.dlc_start;
        self.frame.dlc = self.pack(start..start + 4) as u8;
        self.put_block(
            pos,
            ANN_DLC,
            vec![
                format!("Data length code: {}", self.frame.dlc),
                format!("DLC: {}", self.frame.dlc),
                "DLC".into(),
            ],
        );
        self.frame.last_databit = start + 3 + dlc2len(self.frame.dlc) * 8;

        Ok(())
    }

    fn read_data_bytes(&mut self, pos: SamplePosition) {
        self.frame.byte_positions.push(pos);

        for i in 0..dlc2len(self.frame.dlc) {
            let x = self.frame.dlc_start + 4 + 8 * i;
            let byte = self.pack(x..x + 8) as u8;
            self.frame.frame_bytes.push(byte);

            let ss = self.frame.byte_positions[i * 8];
            let es = self.frame.byte_positions[(i + 1) * 8 - 1];
            let (ss, _) = self.bit_span(ss);
            let (_, es) = self.bit_span(es);
            self.anns.push(Annotation::new(
                ss,
                es,
                ANN_DATA,
                vec![
                    format!("Data byte {i}: 0x{byte:02x}"),
                    format!("DB {i}: 0x{byte:02x}"),
                    "DB".into(),
                ],
            ));
        }
        self.frame.byte_positions.clear();
    }

    fn frame_end(&mut self, level: bool, pos: SamplePosition, bitnum: usize) -> Result<Step> {
        let last = self.frame.last_databit;

        if bitnum == last + 1 {
            self.frame.ss_block = pos;
        } else if bitnum == last + 15 {
            // CRC sequence. The register already covers SOF through the
            // end of the data field.
            self.frame.crc_read = self.pack(last + 1..last + 16) as u16;
            let calculated = CRC_15.finalize(self.frame.crc_reg) as u16;
            self.frame.crc_ok = calculated == self.frame.crc_read;
            self.put_block(
                pos,
                ANN_CRC_SEQ,
                vec![
                    format!("CRC-15 sequence: 0x{:04x}", self.frame.crc_read),
                    format!("CRC-15: 0x{:04x}", self.frame.crc_read),
                    "CRC-15".into(),
                ],
            );
            if !self.frame.crc_ok {
                self.put_block(
                    pos,
                    ANN_WARNING,
                    vec![
                        format!(
                            "CRC mismatch: calculated 0x{calculated:04x}, read 0x{:04x}",
                            self.frame.crc_read
                        ),
                        "CRC err".into(),
                    ],
                );
                log_or_err!(
                    self,
                    Level::Warn,
                    anyhow!(CanError::CrcMismatch {
                        calculated,
                        read: self.frame.crc_read,
                    })
                );
            }
        } else if bitnum == last + 16 {
            self.put_bit(
                pos,
                ANN_CRC_DELIM,
                vec![
                    format!("CRC delimiter: {}", level as u8),
                    format!("CRC d: {}", level as u8),
                    "CRC d".into(),
                ],
            );
            if !level {
                self.put_bit(
                    pos,
                    ANN_WARNING,
                    vec!["CRC delimiter must be a recessive bit".into()],
                );
                log_or_err!(self, Level::Warn, anyhow!(CanError::InvalidCrcDelimiter));
            }
        } else if bitnum == last + 17 {
            let ack = if level { "NACK" } else { "ACK" };
            self.put_bit(
                pos,
                ANN_ACK_SLOT,
                vec![
                    format!("ACK slot: {ack}"),
                    format!("ACK s: {ack}"),
                    "ACK s".into(),
                ],
            );
        } else if bitnum == last + 18 {
            self.put_bit(
                pos,
                ANN_ACK_DELIM,
                vec![
                    format!("ACK delimiter: {}", level as u8),
                    format!("ACK d: {}", level as u8),
                    "ACK d".into(),
                ],
            );
            if !level {
                self.put_bit(
                    pos,
                    ANN_WARNING,
                    vec!["ACK delimiter must be a recessive bit".into()],
                );
                log_or_err!(self, Level::Warn, anyhow!(CanError::InvalidAckDelimiter));
            }
        } else if bitnum == last + 19 {
            self.frame.ss_block = pos;
        } else if bitnum == last + 25 {
            // End of frame, seven recessive bits.
            self.put_block(pos, ANN_EOF, vec!["End of frame".into(), "EOF".into(), "E".into()]);
            let eof_bad = self.frame.bits[bitnum - 6..=bitnum]
                .iter()
                .any(|&(b, _)| !b);
            if eof_bad {
                self.put_block(
                    pos,
                    ANN_WARNING,
                    vec!["End of frame (EOF) must be 7 recessive bits".into()],
                );
                log_or_err!(self, Level::Warn, anyhow!(CanError::InvalidEndOfFrame));
            }

            let frame = CanFrame {
                id: self.frame.fullid,
                extended: self.frame.extended,
                remote: self.frame.remote,
                dlc: self.frame.dlc,
                data: self.frame.frame_bytes.clone(),
                crc: self.frame.crc_read,
                crc_ok: self.frame.crc_ok,
            };
            self.records
                .push(Spanned::new(self.frame.ss_packet, pos, frame));

            return Ok(Step::Done);
        }

        Ok(Step::Continue)
    }
}

#[cfg(test)]
use crate::decoders::uart::line_capture;
#[cfg(test)]
use crate::engine::sink::MemorySink;

/// Builds the logical bit sequence of a classic standard data frame,
/// CRC computed by the same engine the decoder verifies with.
#[cfg(test)]
fn standard_frame_bits(id: u16, data: &[u8]) -> (Vec<bool>, usize) {
    let mut bits = vec![false];
    bits.extend((0..11).rev().map(|i| (id >> i) & 1 != 0));
    bits.push(false); // RTR
    bits.push(false); // IDE
    bits.push(false); // RB0
    let dlc = data.len() as u8;
    bits.extend((0..4).rev().map(|i| (dlc >> i) & 1 != 0));
    for &byte in data {
        bits.extend((0..8).rev().map(|i| (byte >> i) & 1 != 0));
    }

    let mut reg = CRC_15.init();
    for &b in &bits {
        reg = CRC_15.update_bit(reg, b);
    }
    let crc = CRC_15.finalize(reg);
    bits.extend((0..15).rev().map(|i| (crc >> i) & 1 != 0));
    let stuff_end = bits.len() - 1;

    bits.push(true); // CRC delimiter
    bits.push(false); // ACK slot
    bits.push(true); // ACK delimiter
    bits.extend([true; 7]); // EOF

    (bits, stuff_end)
}

/// Inserts stuff bits over `0..=stuff_end` of the logical sequence.
#[cfg(test)]
fn apply_stuffing(bits: &[bool], stuff_end: usize) -> Vec<bool> {
    let mut out = Vec::new();
    let mut run_level = false;
    let mut run = 0u32;

    for (i, &b) in bits.iter().enumerate() {
        out.push(b);
        if i > stuff_end {
            continue;
        }
        if run > 0 && b == run_level {
            run += 1;
        } else {
            run_level = b;
            run = 1;
        }
        if run == 5 {
            out.push(!b);
            run_level = !b;
            run = 1;
        }
    }

    out
}

#[cfg(test)]
fn test_decoder() -> CanDecoder {
    CanDecoder::new(CanOptions {
        channel: Some(0),
        bitrate: 100_000.0,
        ..Default::default()
    })
}

#[test]
fn standard_data_frame() {
    let (bits, stuff_end) = standard_frame_bits(0x123, &[0xDE, 0xAD]);
    let mut levels = vec![true, true];
    levels.extend(apply_stuffing(&bits, stuff_end));
    levels.extend([true; 4]);

    let capture = line_capture(&levels, 10, 1_000_000.0);
    let mut sink = MemorySink::new();
    test_decoder().decode(&capture, &mut sink).unwrap();

    assert_eq!(sink.records.len(), 1);
    assert_eq!(
        sink.records[0].payload,
        CanFrame {
            id: 0x123,
            extended: false,
            remote: false,
            dlc: 2,
            data: vec![0xDE, 0xAD],
            crc: sink.records[0].payload.crc,
            crc_ok: true,
        }
    );
    assert_eq!(sink.annotations_of(ANN_WARNING).count(), 0);
}

#[test]
fn stuff_bits_are_stripped() {
    // A zero data byte forces runs of identical bits, so the wire
    // sequence carries stuff bits the logical frame must not see.
    let (bits, stuff_end) = standard_frame_bits(0x155, &[0x00, 0xFF]);
    let stuffed = apply_stuffing(&bits, stuff_end);
    assert!(stuffed.len() > bits.len());

    let mut levels = vec![true, true];
    levels.extend(stuffed);
    levels.extend([true; 4]);

    let capture = line_capture(&levels, 10, 1_000_000.0);
    let mut sink = MemorySink::new();
    test_decoder().decode(&capture, &mut sink).unwrap();

    assert_eq!(sink.records.len(), 1);
    assert_eq!(sink.records[0].payload.data, vec![0x00, 0xFF]);
    assert!(sink.records[0].payload.crc_ok);
    assert!(sink.annotations_of(ANN_STUFF_BIT).count() >= 1);
}

#[test]
fn corrupted_crc_is_flagged() {
    let (mut bits, stuff_end) = standard_frame_bits(0x123, &[0x42]);
    // Flip one data bit after CRC computation.
    bits[20] = !bits[20];

    let mut levels = vec![true, true];
    levels.extend(apply_stuffing(&bits, stuff_end));
    levels.extend([true; 4]);

    let capture = line_capture(&levels, 10, 1_000_000.0);
    let mut sink = MemorySink::new();
    test_decoder().decode(&capture, &mut sink).unwrap();

    assert_eq!(sink.records.len(), 1);
    assert!(!sink.records[0].payload.crc_ok);
    assert!(sink.annotations_of(ANN_WARNING).count() >= 1);
}

#[test]
fn sync_loss_restarts_at_offending_edge() {
    // A dominant pulse whose trailing edge lands mid-bit: the decoder
    // must flag sync loss and hunt for a new SOF.
    let mut samples = vec![1u8; 10];
    samples.extend(vec![0u8; 10]);
    samples.extend(vec![1u8; 5]);
    samples.extend(vec![0u8; 8]);
    samples.extend(vec![1u8; 40]);

    let capture = Capture::new(samples, Some(1_000_000.0));
    let mut sink = MemorySink::new();
    test_decoder().decode(&capture, &mut sink).unwrap();

    assert!(sink.records.is_empty());
    assert!(
        sink.annotations
            .iter()
            .any(|a| a.class == ANN_WARNING && a.texts[0].contains("Synchronization"))
    );
}

#[test]
fn truncated_frame_warns() {
    let (bits, stuff_end) = standard_frame_bits(0x321, &[0x11]);
    let stuffed = apply_stuffing(&bits, stuff_end);
    let mut levels = vec![true];
    levels.extend(&stuffed[..12]);

    let capture = line_capture(&levels, 10, 1_000_000.0);
    let mut sink = MemorySink::new();
    test_decoder().decode(&capture, &mut sink).unwrap();

    assert!(sink.records.is_empty());
    assert!(
        sink.annotations
            .iter()
            .any(|a| a.class == ANN_WARNING && a.texts[0].contains("truncated"))
    );
}

#[test]
fn strict_mode_fails_on_crc_mismatch() {
    let (mut bits, stuff_end) = standard_frame_bits(0x123, &[0x42]);
    bits[20] = !bits[20];

    let mut levels = vec![true, true];
    levels.extend(apply_stuffing(&bits, stuff_end));
    levels.extend([true; 4]);

    let capture = line_capture(&levels, 10, 1_000_000.0);
    let mut decoder = test_decoder();
    decoder.set_fail_level(Level::Warn);
    let mut sink = MemorySink::new();

    assert!(decoder.decode(&capture, &mut sink).is_err());
}

#[test]
fn missing_channel_is_fatal() {
    let capture = Capture::new(vec![1], Some(1_000_000.0));
    let decoder = CanDecoder::new(CanOptions::default());
    let mut sink = MemorySink::new();

    assert!(decoder.decode(&capture, &mut sink).is_err());
}
