//! UART decoder.
//!
//! Recovers asynchronous serial frames from one or two lines (RX, TX).
//! Each line is clocked independently from its own start-bit edges, so
//! the two directions may interleave freely in the output. Framing and
//! parity violations are reported as warning annotations and leave the
//! decoder hunting for the next start edge; a capture that ends inside
//! a frame flushes that frame as invalid.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use log::Level;

use crate::engine::bits::{BitClock, BitOrder, pack_bits};
use crate::engine::capture::{Capture, Cond, Cursor, SamplePosition};
use crate::engine::sink::{Annotation, Sink, Spanned};
use crate::log_or_err;
use crate::utils::crc::{ParityMode, parity_ok};
use crate::utils::errors::{ConfigError, UartError};

pub const ANN_DATA: u32 = 0;
pub const ANN_START: u32 = 2;
pub const ANN_PARITY_OK: u32 = 4;
pub const ANN_PARITY_ERR: u32 = 6;
pub const ANN_STOP: u32 = 8;
pub const ANN_WARNING: u32 = 10;
pub const ANN_DATA_BIT: u32 = 12;
pub const ANN_BREAK: u32 = 14;

/// Which line a result came from. Doubles as the annotation class
/// offset, RX classes being even and TX classes odd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    fn class(self, base: u32) -> u32 {
        base + matches!(self, Direction::Tx) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartEvent {
    /// A completed frame. `valid` is false on any framing or parity
    /// violation, including truncation at end of capture.
    Frame { value: u16, valid: bool },
    /// Line held at the space level for at least a frame time.
    Break,
    /// Line idle for at least a frame time between frames.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartRecord {
    pub dir: Direction,
    pub event: UartEvent,
}

/// Rendering of recovered data values in annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFormat {
    Ascii,
    Dec,
    #[default]
    Hex,
    Oct,
    Bin,
}

#[derive(Debug, Clone)]
pub struct UartOptions {
    pub rx: Option<usize>,
    pub tx: Option<usize>,
    pub baudrate: f64,
    pub data_bits: u32,
    pub parity: ParityMode,
    pub stop_bits: f64,
    pub bit_order: BitOrder,
    pub format: DataFormat,
    pub invert_rx: bool,
    pub invert_tx: bool,
    pub sample_point: f64,
}

impl Default for UartOptions {
    fn default() -> Self {
        Self {
            rx: None,
            tx: None,
            baudrate: 115_200.0,
            data_bits: 8,
            parity: ParityMode::None,
            stop_bits: 1.0,
            bit_order: BitOrder::LsbFirst,
            format: DataFormat::Hex,
            invert_rx: false,
            invert_tx: false,
            sample_point: 0.5,
        }
    }
}

fn invalid(option: &str, value: &str) -> ConfigError {
    ConfigError::InvalidOption {
        option: option.to_owned(),
        value: value.to_owned(),
    }
}

pub(crate) fn parse_channel(option: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse().map_err(|_| invalid(option, value))
}

pub(crate) fn parse_parity(value: &str) -> Result<ParityMode, ConfigError> {
    match value {
        "none" => Ok(ParityMode::None),
        "odd" => Ok(ParityMode::Odd),
        "even" => Ok(ParityMode::Even),
        "zero" => Ok(ParityMode::Zero),
        "one" => Ok(ParityMode::One),
        "ignore" => Ok(ParityMode::Ignore),
        _ => Err(invalid("parity", value)),
    }
}

impl UartOptions {
    /// Builds options from `key=value` pairs as given on a command line.
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut opts = Self::default();

        for (key, value) in pairs {
            match key.as_str() {
                "rx" => opts.rx = Some(parse_channel(key, value)?),
                "tx" => opts.tx = Some(parse_channel(key, value)?),
                "baudrate" => {
                    opts.baudrate = value.parse().map_err(|_| invalid(key, value))?;
                }
                "data_bits" => {
                    let bits: u32 = value.parse().map_err(|_| invalid(key, value))?;
                    if !(5..=9).contains(&bits) {
                        return Err(invalid(key, value));
                    }
                    opts.data_bits = bits;
                }
                "parity" => opts.parity = parse_parity(value)?,
                "stop_bits" => {
                    let stop: f64 = value.parse().map_err(|_| invalid(key, value))?;
                    if ![0.0, 0.5, 1.0, 1.5, 2.0].contains(&stop) {
                        return Err(invalid(key, value));
                    }
                    opts.stop_bits = stop;
                }
                "bit_order" => {
                    opts.bit_order = match value.as_str() {
                        "lsb-first" => BitOrder::LsbFirst,
                        "msb-first" => BitOrder::MsbFirst,
                        _ => return Err(invalid(key, value)),
                    };
                }
                "format" => {
                    opts.format = match value.as_str() {
                        "ascii" => DataFormat::Ascii,
                        "dec" => DataFormat::Dec,
                        "hex" => DataFormat::Hex,
                        "oct" => DataFormat::Oct,
                        "bin" => DataFormat::Bin,
                        _ => return Err(invalid(key, value)),
                    };
                }
                "invert_rx" => {
                    opts.invert_rx = value.parse().map_err(|_| invalid(key, value))?;
                }
                "invert_tx" => {
                    opts.invert_tx = value.parse().map_err(|_| invalid(key, value))?;
                }
                "sample_point" => {
                    let point: f64 = value.parse().map_err(|_| invalid(key, value))?;
                    if !(1.0..=99.0).contains(&point) {
                        return Err(invalid(key, value));
                    }
                    opts.sample_point = point / 100.0;
                }
                _ => return Err(ConfigError::UnknownOption(key.clone())),
            }
        }

        Ok(opts)
    }

    fn parity_bits(&self) -> u32 {
        (self.parity != ParityMode::None) as u32
    }

    /// Nominal frame duration in bit times, fractional stop included.
    fn frame_bits(&self) -> f64 {
        1.0 + self.data_bits as f64 + self.parity_bits() as f64 + self.stop_bits
    }
}

/// Per-line output, merged across lines before reaching the sink so
/// annotation starts stay non-decreasing.
#[derive(Debug, Default)]
struct LineOut {
    annotations: Vec<Annotation>,
    binary: Vec<(SamplePosition, SamplePosition, Vec<u8>)>,
    records: Vec<Spanned<UartRecord>>,
}

#[derive(Debug)]
pub struct UartDecoder {
    opts: UartOptions,
    pub fail_level: Level,
}

impl UartDecoder {
    pub fn new(opts: UartOptions) -> Self {
        Self {
            opts,
            fail_level: Level::Error,
        }
    }

    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
    }

    fn format_value(&self, value: u16) -> String {
        let bits = self.opts.data_bits;

        match self.opts.format {
            DataFormat::Ascii => {
                let byte = value as u8;
                if (0x20..0x7F).contains(&byte) {
                    (byte as char).to_string()
                } else {
                    format!("[{value:02X}]")
                }
            }
            DataFormat::Dec => format!("{value}"),
            DataFormat::Hex => format!("{:01$X}", value, ((bits + 3) / 4) as usize),
            DataFormat::Oct => format!("{:01$o}", value, ((bits + 2) / 3) as usize),
            DataFormat::Bin => format!("{:01$b}", value, bits as usize),
        }
    }

    /// Decodes every configured line of a capture.
    pub fn decode(&self, capture: &Capture, sink: &mut impl Sink<UartRecord>) -> Result<()> {
        let Some(samplerate) = capture.samplerate() else {
            anyhow::bail!(ConfigError::SamplerateMissing);
        };
        if self.opts.rx.is_none() && self.opts.tx.is_none() {
            anyhow::bail!(ConfigError::ChannelMissing("RX or TX"));
        }

        let lines = [
            (Direction::Rx, self.opts.rx, self.opts.invert_rx),
            (Direction::Tx, self.opts.tx, self.opts.invert_tx),
        ];

        let mut outs = Vec::new();
        for (dir, channel, invert) in lines {
            let Some(channel) = channel else { continue };
            if channel >= 8 {
                anyhow::bail!(ConfigError::ChannelOutOfRange {
                    index: channel,
                    width: 8,
                });
            }

            let mut out = LineOut::default();
            self.decode_line(capture, samplerate, dir, channel, invert, &mut out)?;
            outs.push(out);
        }

        merge_outputs(outs, sink);

        Ok(())
    }

    fn decode_line(
        &self,
        capture: &Capture,
        samplerate: f64,
        dir: Direction,
        channel: usize,
        invert: bool,
        out: &mut LineOut,
    ) -> Result<()> {
        let bit_width = samplerate / self.opts.baudrate;
        let halfbit = bit_width / 2.0;
        let frame_samples = (self.opts.frame_bits() * bit_width).ceil() as u64;
        let data_bits = self.opts.data_bits;
        let parity_bits = self.opts.parity_bits();
        let stop_count = self.opts.stop_bits as u32;

        // Logical level, inversion applied. None past the capture end.
        let read = |pos: SamplePosition| -> Option<bool> {
            (pos < capture.len()).then(|| capture.level(pos, channel) != invert)
        };
        let span = |clock: &BitClock, n: u32| -> (SamplePosition, SamplePosition) {
            let point = clock.sample_point_of(n);
            (
                point.saturating_sub(halfbit.floor() as u64),
                point + halfbit.ceil() as u64,
            )
        };

        let mut cursor = Cursor::new(capture);
        let start_edge = if invert {
            Cond::Rising(channel)
        } else {
            Cond::Falling(channel)
        };
        let mut last_frame_end: Option<SamplePosition> = None;

        while let Some(m) = cursor.wait(&[start_edge]) {
            let frame_start = m.pos;
            let clock = BitClock::new(bit_width, self.opts.sample_point, frame_start);

            if let Some(end) = last_frame_end
                && frame_start.saturating_sub(end) >= frame_samples
            {
                out.records.push(Spanned::new(
                    end,
                    frame_start,
                    UartRecord {
                        dir,
                        event: UartEvent::Idle,
                    },
                ));
            }

            let Some(start_level) = read(clock.sample_point_of(0)) else {
                break;
            };
            if start_level {
                let (ss, es) = span(&clock, 0);
                out.annotations.push(Annotation::new(
                    ss,
                    es,
                    dir.class(ANN_WARNING),
                    vec!["Frame error: invalid start bit".into(), "Frame err".into()],
                ));
                log_or_err!(self, Level::Warn, anyhow!(UartError::InvalidStartBit));
                cursor.seek(clock.sample_point_of(0) + 1);
                continue;
            }
            {
                let (ss, es) = span(&clock, 0);
                out.annotations.push(Annotation::new(
                    ss,
                    es,
                    dir.class(ANN_START),
                    vec!["Start bit".into(), "Start".into(), "S".into()],
                ));
            }

            let mut valid = true;
            let mut levels = Vec::with_capacity(data_bits as usize);
            let mut truncated = false;

            for i in 0..data_bits {
                let Some(level) = read(clock.sample_point_of(1 + i)) else {
                    truncated = true;
                    break;
                };
                let (ss, es) = span(&clock, 1 + i);
                out.annotations.push(Annotation::text(
                    ss,
                    es,
                    dir.class(ANN_DATA_BIT),
                    if level { "1" } else { "0" },
                ));
                levels.push(level);
            }

            let value = pack_bits(&levels, self.opts.bit_order);

            if !truncated && !levels.is_empty() {
                let (ss, _) = span(&clock, 1);
                let (_, es) = span(&clock, data_bits);
                out.annotations.push(Annotation::text(
                    ss,
                    es,
                    dir.class(ANN_DATA),
                    self.format_value(value),
                ));
                out.binary.push((ss, es, vec![value as u8]));
            }

            if !truncated && parity_bits == 1 {
                match read(clock.sample_point_of(1 + data_bits)) {
                    Some(parity_bit) => {
                        let (ss, es) = span(&clock, 1 + data_bits);
                        if parity_ok(self.opts.parity, value, parity_bit) {
                            out.annotations.push(Annotation::new(
                                ss,
                                es,
                                dir.class(ANN_PARITY_OK),
                                vec!["Parity bit".into(), "Parity".into(), "P".into()],
                            ));
                        } else {
                            valid = false;
                            out.annotations.push(Annotation::new(
                                ss,
                                es,
                                dir.class(ANN_PARITY_ERR),
                                vec!["Parity error".into(), "PE".into()],
                            ));
                            log_or_err!(
                                self,
                                Level::Warn,
                                anyhow!(UartError::ParityMismatch {
                                    expected: !parity_bit as u8,
                                    received: parity_bit as u8,
                                })
                            );
                        }
                    }
                    None => truncated = true,
                }
            }

            let mut stop_low_at = None;
            if !truncated {
                for b in 0..stop_count {
                    let n = 1 + data_bits + parity_bits + b;
                    let Some(level) = read(clock.sample_point_of(n)) else {
                        truncated = true;
                        break;
                    };
                    let (ss, es) = span(&clock, n);
                    if level {
                        out.annotations.push(Annotation::new(
                            ss,
                            es,
                            dir.class(ANN_STOP),
                            vec!["Stop bit".into(), "Stop".into(), "T".into()],
                        ));
                    } else {
                        valid = false;
                        stop_low_at = Some(clock.sample_point_of(n));
                        out.annotations.push(Annotation::new(
                            ss,
                            es,
                            dir.class(ANN_WARNING),
                            vec!["Frame error: invalid stop bit".into(), "Frame err".into()],
                        ));
                        log_or_err!(self, Level::Warn, anyhow!(UartError::InvalidStopBit));
                    }
                }
            }

            if truncated {
                let es = capture.len();
                out.annotations.push(Annotation::new(
                    frame_start,
                    es,
                    dir.class(ANN_WARNING),
                    vec!["Frame truncated at end of capture".into(), "Trunc".into()],
                ));
                out.records.push(Spanned::new(
                    frame_start,
                    es,
                    UartRecord {
                        dir,
                        event: UartEvent::Frame {
                            value,
                            valid: false,
                        },
                    },
                ));
                log_or_err!(
                    self,
                    Level::Warn,
                    anyhow!(UartError::TruncatedFrame(levels.len()))
                );
                break;
            }

            // A data word of all zeros ending in a low stop bit is a
            // break condition; the frame resumes when the line returns
            // to mark.
            if value == 0
                && let Some(low_at) = stop_low_at
            {
                cursor.seek(low_at);
                let mark = if invert {
                    Cond::Low(channel)
                } else {
                    Cond::High(channel)
                };
                let break_end = match cursor.wait(&[mark]) {
                    Some(m) => m.pos,
                    None => capture.len(),
                };
                out.annotations.push(Annotation::new(
                    frame_start,
                    break_end,
                    dir.class(ANN_BREAK),
                    vec!["Break condition".into(), "Break".into(), "BRK".into()],
                ));
                out.records.push(Spanned::new(
                    frame_start,
                    break_end,
                    UartRecord {
                        dir,
                        event: UartEvent::Break,
                    },
                ));
                last_frame_end = Some(break_end);
                continue;
            }

            let frame_end = frame_start + frame_samples;
            out.records.push(Spanned::new(
                frame_start,
                frame_end.min(capture.len()),
                UartRecord {
                    dir,
                    event: UartEvent::Frame { value, valid },
                },
            ));

            cursor.seek(frame_end.saturating_sub(halfbit.ceil() as u64));
            last_frame_end = Some(frame_end);
        }

        Ok(())
    }
}

/// Merges per-line outputs by start sample and forwards to the sink.
fn merge_outputs(outs: Vec<LineOut>, sink: &mut impl Sink<UartRecord>) {
    let mut annotations: Vec<Annotation> = Vec::new();
    let mut binary: Vec<(SamplePosition, SamplePosition, Vec<u8>)> = Vec::new();
    let mut records: Vec<Spanned<UartRecord>> = Vec::new();

    for out in outs {
        annotations.extend(out.annotations);
        binary.extend(out.binary);
        records.extend(out.records);
    }

    annotations.sort_by_key(|a| a.ss);
    binary.sort_by_key(|b| b.0);
    records.sort_by_key(|r| r.ss);

    for annotation in annotations {
        sink.annotate(annotation);
    }
    for (ss, es, bytes) in binary {
        sink.binary(ss, es, &bytes);
    }
    for record in records {
        sink.record(record);
    }
}

#[cfg(test)]
use crate::engine::sink::MemorySink;

/// Expands logical line levels to a capture, one channel, n samples per bit.
#[cfg(test)]
pub(crate) fn line_capture(levels: &[bool], samples_per_bit: usize, samplerate: f64) -> Capture {
    let mut samples = Vec::new();
    for &level in levels {
        samples.extend(std::iter::repeat_n(level as u8, samples_per_bit));
    }

    Capture::new(samples, Some(samplerate))
}

#[cfg(test)]
fn frame_8n1(value: u8) -> Vec<bool> {
    let mut levels = vec![false];
    levels.extend((0..8).map(|i| (value >> i) & 1 != 0));
    levels.push(true);

    levels
}

#[cfg(test)]
fn test_options() -> UartOptions {
    UartOptions {
        rx: Some(0),
        baudrate: 100_000.0,
        ..Default::default()
    }
}

#[test]
fn clean_frame_8n1() {
    let mut levels = vec![true, true];
    levels.extend(frame_8n1(0x41));
    levels.push(true);

    let capture = line_capture(&levels, 10, 1_000_000.0);
    let decoder = UartDecoder::new(test_options());
    let mut sink = MemorySink::new();

    decoder.decode(&capture, &mut sink).unwrap();

    assert_eq!(
        sink.records
            .iter()
            .map(|r| r.payload.event)
            .collect::<Vec<_>>(),
        vec![UartEvent::Frame {
            value: 0x41,
            valid: true
        }]
    );
    let data: Vec<_> = sink.annotations_of(ANN_DATA).collect();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].texts[0], "41");
    assert_eq!(sink.annotations_of(ANN_WARNING).count(), 0);
}

#[test]
fn ascii_format() {
    let mut levels = vec![true];
    levels.extend(frame_8n1(b'A'));

    let capture = line_capture(&levels, 10, 1_000_000.0);
    let decoder = UartDecoder::new(UartOptions {
        format: DataFormat::Ascii,
        ..test_options()
    });
    let mut sink = MemorySink::new();

    decoder.decode(&capture, &mut sink).unwrap();

    assert_eq!(sink.annotations_of(ANN_DATA).next().unwrap().texts[0], "A");
}

#[test]
fn binary_stream_carries_data_bytes() {
    let mut levels = vec![true];
    levels.extend(frame_8n1(0x41));
    levels.extend(frame_8n1(0x42));
    levels.push(true);

    let capture = line_capture(&levels, 10, 1_000_000.0);
    let decoder = UartDecoder::new(test_options());
    let mut sink = MemorySink::new();

    decoder.decode(&capture, &mut sink).unwrap();

    let bytes: Vec<u8> = sink
        .binary
        .iter()
        .flat_map(|(_, _, b)| b.iter().copied())
        .collect();
    assert_eq!(bytes, vec![0x41, 0x42]);

    // Spans match the data-word annotations.
    let &(ss, es, _) = &sink.binary[0];
    let data = sink.annotations_of(ANN_DATA).next().unwrap();
    assert_eq!((ss, es), (data.ss, data.es));
}

#[test]
fn resync_after_glitch() {
    // A short low glitch before the real frame: the glitch decodes as
    // a garbage frame, after which the clean frame must come out
    // exactly as it would alone.
    let mut levels = vec![true, false, true, true, true, true, true, true, true, true, true, true];
    levels.extend(frame_8n1(0x5A));
    levels.push(true);

    let capture = line_capture(&levels, 10, 1_000_000.0);
    let decoder = UartDecoder::new(test_options());
    let mut sink = MemorySink::new();

    decoder.decode(&capture, &mut sink).unwrap();

    let frames: Vec<_> = sink
        .records
        .iter()
        .filter_map(|r| match r.payload.event {
            UartEvent::Frame { value, valid } => Some((value, valid)),
            _ => None,
        })
        .collect();

    assert!(frames.contains(&(0x5A, true)));
}

#[test]
fn parity_error_reported() {
    // 0x03 has two one-bits; with odd parity the line must send 1.
    // Send 0 instead.
    let mut levels = vec![true, false];
    levels.extend((0..8).map(|i| (0x03 >> i) & 1 != 0));
    levels.push(false);
    levels.push(true);

    let capture = line_capture(&levels, 10, 1_000_000.0);
    let decoder = UartDecoder::new(UartOptions {
        parity: ParityMode::Odd,
        ..test_options()
    });
    let mut sink = MemorySink::new();

    decoder.decode(&capture, &mut sink).unwrap();

    assert_eq!(sink.annotations_of(ANN_PARITY_ERR).count(), 1);
    assert_eq!(
        sink.records[0].payload.event,
        UartEvent::Frame {
            value: 0x03,
            valid: false
        }
    );
}

#[test]
fn truncated_frame_flushes_invalid() {
    // Start bit plus only four data bits, then the capture ends.
    let levels = vec![true, false, true, false, true, false];

    let capture = line_capture(&levels, 10, 1_000_000.0);
    let decoder = UartDecoder::new(test_options());
    let mut sink = MemorySink::new();

    decoder.decode(&capture, &mut sink).unwrap();

    assert_eq!(sink.records.len(), 1);
    assert!(matches!(
        sink.records[0].payload.event,
        UartEvent::Frame { valid: false, .. }
    ));
    assert_eq!(sink.annotations_of(ANN_WARNING).count(), 1);
}

#[test]
fn break_condition() {
    // All-zero data with a low stop bit, line returns high afterwards.
    let mut levels = vec![true, false];
    levels.extend([false; 8]);
    levels.push(false);
    levels.extend([false, false, true, true]);

    let capture = line_capture(&levels, 10, 1_000_000.0);
    let decoder = UartDecoder::new(test_options());
    let mut sink = MemorySink::new();

    decoder.decode(&capture, &mut sink).unwrap();

    assert!(
        sink.records
            .iter()
            .any(|r| r.payload.event == UartEvent::Break)
    );
    assert_eq!(sink.annotations_of(ANN_BREAK).count(), 1);
}

#[test]
fn strict_mode_fails_on_parity_error() {
    let mut levels = vec![true, false];
    levels.extend((0..8).map(|i| (0x03 >> i) & 1 != 0));
    levels.push(false);
    levels.push(true);

    let capture = line_capture(&levels, 10, 1_000_000.0);
    let mut decoder = UartDecoder::new(UartOptions {
        parity: ParityMode::Odd,
        ..test_options()
    });
    decoder.set_fail_level(Level::Warn);
    let mut sink = MemorySink::new();

    assert!(decoder.decode(&capture, &mut sink).is_err());
}

#[test]
fn missing_channel_is_fatal() {
    let capture = line_capture(&[true], 10, 1_000_000.0);
    let decoder = UartDecoder::new(UartOptions::default());
    let mut sink = MemorySink::new();

    assert!(decoder.decode(&capture, &mut sink).is_err());
}

#[test]
fn missing_samplerate_is_fatal() {
    let capture = Capture::new(vec![1, 1, 0], None);
    let decoder = UartDecoder::new(test_options());
    let mut sink = MemorySink::new();

    assert!(decoder.decode(&capture, &mut sink).is_err());
}

#[test]
fn options_from_pairs() {
    let pairs: HashMap<String, String> = [
        ("rx", "2"),
        ("baudrate", "9600"),
        ("parity", "even"),
        ("bit_order", "msb-first"),
        ("format", "bin"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();

    let opts = UartOptions::from_pairs(&pairs).unwrap();
    assert_eq!(opts.rx, Some(2));
    assert_eq!(opts.baudrate, 9600.0);
    assert_eq!(opts.parity, ParityMode::Even);
    assert_eq!(opts.bit_order, BitOrder::MsbFirst);
    assert_eq!(opts.format, DataFormat::Bin);

    let bad: HashMap<String, String> =
        [("data_bits".to_owned(), "12".to_owned())].into_iter().collect();
    assert!(UartOptions::from_pairs(&bad).is_err());
}
