//! Modbus RTU decoder, stacked on recovered UART frames.
//!
//! Application data units (ADUs) are delimited by line silence of at
//! least 3.5 character times. Frames on the client line are parsed as
//! requests and frames on the server line as responses; by default the
//! TX line carries the client. Every ADU ends in a CRC-16 transmitted
//! low byte first; a mismatch is reported with both the calculated and
//! the received value but the ADU is still decoded. An ADU shorter
//! than its function's minimum length produces a warning and no
//! record.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use log::Level;

use crate::decoders::uart::{Direction, UartDecoder, UartEvent, UartOptions, UartRecord};
use crate::engine::assemble::DataByte;
use crate::engine::capture::{Capture, SamplePosition};
use crate::engine::sink::{Annotation, MemorySink, Sink, Spanned};
use crate::log_or_err;
use crate::utils::crc::{CRC_16_MODBUS_ALG, Crc};
use crate::utils::errors::{ConfigError, ModbusError};

pub const ANN_SERVER_ID: u32 = 0;
pub const ANN_FUNCTION: u32 = 1;
pub const ANN_ADDRESS: u32 = 2;
pub const ANN_DATA: u32 = 3;
pub const ANN_LENGTH: u32 = 4;
pub const ANN_CRC: u32 = 5;
pub const ANN_WARNING: u32 = 6;

const CRC_16: Crc = Crc::new(&CRC_16_MODBUS_ALG);

/// Silence threshold between ADUs, in character times.
const ADU_GAP_CHARS: f64 = 3.5;

/// Largest ADU the protocol allows: server id, function, 252 bytes of
/// payload and the CRC.
const ADU_MAX: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModbusRole {
    Client,
    Server,
}

#[derive(Debug, Clone)]
pub struct ModbusOptions {
    pub uart: UartOptions,
    /// Which UART line the client transmits on.
    pub client: Direction,
}

impl Default for ModbusOptions {
    fn default() -> Self {
        Self {
            uart: UartOptions {
                baudrate: 9600.0,
                ..Default::default()
            },
            client: Direction::Tx,
        }
    }
}

impl ModbusOptions {
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut opts = Self::default();
        let mut uart_pairs = HashMap::new();

        for (key, value) in pairs {
            match key.as_str() {
                "client" => {
                    opts.client = match value.as_str() {
                        "rx" => Direction::Rx,
                        "tx" => Direction::Tx,
                        _ => {
                            return Err(ConfigError::InvalidOption {
                                option: key.clone(),
                                value: value.clone(),
                            });
                        }
                    };
                }
                _ => {
                    uart_pairs.insert(key.clone(), value.clone());
                }
            }
        }

        opts.uart = UartOptions::from_pairs(&uart_pairs)?;

        Ok(opts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusRecord {
    pub role: ModbusRole,
    pub server_id: u8,
    pub function: u8,
    /// PDU payload between the function code and the CRC.
    pub data: Vec<u8>,
    pub crc_ok: bool,
    /// Exception code for error responses (function >= 0x80).
    pub exception: Option<u8>,
}

fn function_name(function: u8) -> Option<&'static str> {
    match function {
        1 => Some("Read Coils"),
        2 => Some("Read Discrete Inputs"),
        3 => Some("Read Holding Registers"),
        4 => Some("Read Input Registers"),
        5 => Some("Write Single Coil"),
        6 => Some("Write Single Register"),
        7 => Some("Read Exception Status"),
        8 => Some("Diagnostic"),
        15 => Some("Write Multiple Coils"),
        16 => Some("Write Multiple Registers"),
        _ => None,
    }
}

fn exception_name(code: u8) -> &'static str {
    match code {
        1 => "Illegal Function",
        2 => "Illegal Data Address",
        3 => "Illegal Data Value",
        4 => "Slave Device Failure",
        5 => "Acknowledge",
        6 => "Slave Device Busy",
        8 => "Memory Parity Error",
        10 => "Gateway Path Unavailable",
        11 => "Gateway Target Device failed to respond",
        _ => "Unknown",
    }
}

/// Expected total ADU length, once enough of it has been seen.
enum Outcome {
    Known(usize),
    /// Unknown function; the whole burst is taken as the ADU.
    Unknown,
    /// Ran out of bytes mid-parse.
    Short,
}

struct AduParse<'a> {
    bytes: &'a [DataByte],
    anns: Vec<Annotation>,
    /// Shortest ADU the dispatched function allows, updated as length
    /// fields are read.
    minimum: usize,
}

impl<'a> AduParse<'a> {
    fn new(bytes: &'a [DataByte]) -> Self {
        Self {
            bytes,
            anns: Vec::new(),
            minimum: 4,
        }
    }

    fn byte(&self, i: usize) -> Option<u8> {
        self.bytes.get(i).map(|b| b.value)
    }

    fn half_word(&self, i: usize) -> Option<u16> {
        let hi = self.byte(i)?;
        let lo = self.byte(i + 1)?;

        Some(((hi as u16) << 8) | lo as u16)
    }

    /// Annotates bytes `i..=j`; fails when they have not all arrived.
    fn puti(&mut self, i: usize, j: usize, class: u32, text: String) -> Option<()> {
        if j >= self.bytes.len() {
            return None;
        }

        self.anns.push(Annotation::new(
            self.bytes[i].ss,
            self.bytes[j].es,
            class,
            vec![text],
        ));

        Some(())
    }

    fn server_id(&mut self) -> Option<()> {
        let id = self.byte(0)?;
        let message = match id {
            0 => "Broadcast message".to_owned(),
            1..=247 => format!("Slave ID: {id}"),
            _ => format!("Slave ID: {id} (reserved address)"),
        };
        self.puti(0, 0, ANN_SERVER_ID, message)
    }

    fn function_header(&mut self, function: u8) -> Option<()> {
        match function_name(function) {
            Some(name) => self.puti(1, 1, ANN_FUNCTION, format!("Function {function}: {name}")),
            None => self.puti(1, 1, ANN_FUNCTION, format!("Function {function}")),
        }
    }

    // Requests 1-4: read `count` units starting at `address`.
    fn req_read(&mut self, function: u8) -> Option<Outcome> {
        self.minimum = 8;
        self.function_header(function)?;

        let address = self.half_word(2)?;
        let long_name = 10_000 * function as u32 + 1 + address as u32;
        self.puti(
            2,
            3,
            ANN_ADDRESS,
            format!("Start at address 0x{address:X} / {long_name}"),
        )?;

        let count = self.half_word(4)?;
        self.puti(4, 5, ANN_LENGTH, format!("Read {count} units of data"))?;

        Some(Outcome::Known(8))
    }

    // Requests 5 and 6: write one coil or register.
    fn req_write_single(&mut self, function: u8) -> Option<Outcome> {
        self.minimum = 8;
        self.function_header(function)?;

        let address = self.half_word(2)?;
        let offset = if function == 5 { 1 } else { 30_001 };
        self.puti(
            2,
            3,
            ANN_ADDRESS,
            format!("Address 0x{address:X} / {}", address as u32 + offset),
        )?;

        let value = self.half_word(4)?;
        if function == 5 {
            let text = match value {
                0x0000 => "Write coil: off".to_owned(),
                0xFF00 => "Write coil: on".to_owned(),
                _ => format!("Bad coil value: 0x{value:04X}"),
            };
            let class = if matches!(value, 0x0000 | 0xFF00) {
                ANN_DATA
            } else {
                ANN_WARNING
            };
            self.puti(4, 5, class, text)?;
        } else {
            self.puti(4, 5, ANN_DATA, format!("Write value: 0x{value:04X} / {value}"))?;
        }

        Some(Outcome::Known(8))
    }

    // Request 8: diagnostics, subfunction plus data word.
    fn req_diagnostics(&mut self) -> Option<Outcome> {
        self.minimum = 8;
        self.function_header(8)?;

        let sub = self.half_word(2)?;
        self.puti(2, 3, ANN_DATA, format!("Subfunction: {sub}"))?;
        let data = self.half_word(4)?;
        self.puti(4, 5, ANN_DATA, format!("Data: 0x{data:04X}"))?;

        Some(Outcome::Known(8))
    }

    // Requests 15 and 16: write multiple coils or registers.
    fn req_write_multiple(&mut self, function: u8) -> Option<Outcome> {
        self.minimum = 9;
        self.function_header(function)?;

        let (unit, max_outputs, long_offset) = if function == 15 {
            ("coils", 0x07B0u16, 10_001u32)
        } else {
            ("registers", 0x007B, 30_001)
        };

        let address = self.half_word(2)?;
        self.puti(
            2,
            3,
            ANN_ADDRESS,
            format!("Start at address 0x{address:X} / {}", long_offset + address as u32),
        )?;

        let quantity = self.half_word(4)?;
        if quantity <= max_outputs {
            self.puti(4, 5, ANN_LENGTH, format!("Write {quantity} {unit}"))?;
        } else {
            self.puti(
                4,
                5,
                ANN_WARNING,
                format!("Bad value: {quantity} {unit}, max is {max_outputs}"),
            )?;
        }

        let bytecount = self.byte(6)?;
        self.puti(6, 6, ANN_LENGTH, format!("Bytecount: {bytecount}"))?;
        self.minimum = 9 + bytecount as usize;

        let last = 6 + bytecount as usize;
        self.puti(7, last, ANN_DATA, format!("{bytecount} bytes of data"))?;

        Some(Outcome::Known(last + 3))
    }

    // Responses 1-4: bytecount then payload.
    fn resp_read(&mut self, function: u8) -> Option<Outcome> {
        self.minimum = 6;
        self.function_header(function)?;

        let bytecount = self.byte(2)?;
        self.puti(2, 2, ANN_LENGTH, format!("Bytecount: {bytecount}"))?;
        self.minimum = 5 + bytecount as usize;

        let last = 2 + bytecount as usize;
        if function <= 2 {
            self.puti(3, last, ANN_DATA, format!("{bytecount} status bytes"))?;
        } else {
            for i in 0..bytecount as usize / 2 {
                let value = self.half_word(3 + 2 * i)?;
                self.puti(
                    3 + 2 * i,
                    4 + 2 * i,
                    ANN_DATA,
                    format!("0x{value:04X} / {value}"),
                )?;
            }
        }

        Some(Outcome::Known(last + 3))
    }

    // Response 7: exception status bitfield.
    fn resp_exception_status(&mut self) -> Option<Outcome> {
        self.minimum = 5;
        self.function_header(7)?;

        let status = self.byte(2)?;
        self.puti(2, 2, ANN_DATA, format!("Exception status: {status:08b}"))?;

        Some(Outcome::Known(5))
    }

    // Responses 15 and 16 echo address and quantity.
    fn resp_write_multiple(&mut self, function: u8) -> Option<Outcome> {
        self.minimum = 8;
        self.function_header(function)?;

        let (unit, long_offset) = if function == 15 {
            ("coils", 10_001u32)
        } else {
            ("registers", 30_001)
        };

        let address = self.half_word(2)?;
        self.puti(
            2,
            3,
            ANN_ADDRESS,
            format!("Start at address 0x{address:X} / {}", long_offset + address as u32),
        )?;

        let quantity = self.half_word(4)?;
        self.puti(4, 5, ANN_LENGTH, format!("Wrote {quantity} {unit}"))?;

        Some(Outcome::Known(8))
    }

    // Error response: function with the high bit set.
    fn resp_error(&mut self, function: u8) -> Option<Outcome> {
        self.minimum = 5;

        let original = function - 0x80;
        let name = function_name(original).unwrap_or("Unknown function");
        self.puti(
            1,
            1,
            ANN_FUNCTION,
            format!("Error for function {original}: {name}"),
        )?;

        let code = self.byte(2)?;
        self.puti(
            2,
            2,
            ANN_DATA,
            format!("Error {code}: {}", exception_name(code)),
        )?;

        Some(Outcome::Known(5))
    }

    fn dispatch(&mut self, role: ModbusRole, function: u8) -> Outcome {
        let outcome = match (role, function) {
            (ModbusRole::Client, 1..=4) => self.req_read(function),
            (ModbusRole::Client, 5 | 6) => self.req_write_single(function),
            (ModbusRole::Client, 8) => self.req_diagnostics(),
            (ModbusRole::Client, 15 | 16) => self.req_write_multiple(function),
            (ModbusRole::Server, 1..=4) => self.resp_read(function),
            (ModbusRole::Server, 5 | 6) => self.req_write_single(function),
            (ModbusRole::Server, 7) => self.resp_exception_status(),
            (ModbusRole::Server, 8) => self.req_diagnostics(),
            (ModbusRole::Server, 15 | 16) => self.resp_write_multiple(function),
            (ModbusRole::Server, 0x80..) => self.resp_error(function),
            _ => return Outcome::Unknown,
        };

        outcome.unwrap_or(Outcome::Short)
    }
}

#[derive(Debug)]
pub struct ModbusDecoder {
    opts: ModbusOptions,
    pub fail_level: Level,
}

impl ModbusDecoder {
    pub fn new(opts: ModbusOptions) -> Self {
        Self {
            opts,
            fail_level: Level::Error,
        }
    }

    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
    }

    /// Runs the UART layer over the capture, then decodes its frames.
    pub fn decode(&self, capture: &Capture, sink: &mut impl Sink<ModbusRecord>) -> Result<()> {
        let mut uart = UartDecoder::new(self.opts.uart.clone());
        uart.set_fail_level(self.fail_level);

        let mut frames: MemorySink<UartRecord> = MemorySink::new();
        uart.decode(capture, &mut frames)?;

        self.decode_frames(&frames.records, sink)
    }

    /// Decodes ADUs from already-recovered UART frames.
    pub fn decode_frames(
        &self,
        frames: &[Spanned<UartRecord>],
        sink: &mut impl Sink<ModbusRecord>,
    ) -> Result<()> {
        let mut anns: Vec<Annotation> = Vec::new();
        let mut bins: Vec<(SamplePosition, SamplePosition, Vec<u8>)> = Vec::new();
        let mut records: Vec<Spanned<ModbusRecord>> = Vec::new();

        for dir in [Direction::Rx, Direction::Tx] {
            let role = if dir == self.opts.client {
                ModbusRole::Client
            } else {
                ModbusRole::Server
            };

            let mut adu: Vec<DataByte> = Vec::new();
            let mut last_es = 0u64;
            let mut char_time = 0u64;

            for frame in frames.iter().filter(|f| f.payload.dir == dir) {
                let UartEvent::Frame { value, .. } = frame.payload.event else {
                    continue;
                };

                let gap = frame.ss.saturating_sub(last_es);
                if !adu.is_empty() && gap as f64 > ADU_GAP_CHARS * char_time as f64 {
                    self.parse_adu(role, &adu, &mut anns, &mut bins, &mut records)?;
                    adu.clear();
                }

                adu.push(DataByte {
                    value: value as u8,
                    ss: frame.ss,
                    es: frame.es,
                });
                last_es = frame.es;
                char_time = frame.es - frame.ss;

                if adu.len() >= ADU_MAX {
                    self.parse_adu(role, &adu, &mut anns, &mut bins, &mut records)?;
                    adu.clear();
                }
            }

            if !adu.is_empty() {
                self.parse_adu(role, &adu, &mut anns, &mut bins, &mut records)?;
            }
        }

        anns.sort_by_key(|a| a.ss);
        bins.sort_by_key(|b| b.0);
        records.sort_by_key(|r| r.ss);

        for ann in anns {
            sink.annotate(ann);
        }
        for (ss, es, bytes) in bins {
            sink.binary(ss, es, &bytes);
        }
        for record in records {
            sink.record(record);
        }

        Ok(())
    }

    fn parse_adu(
        &self,
        role: ModbusRole,
        bytes: &[DataByte],
        anns: &mut Vec<Annotation>,
        bins: &mut Vec<(SamplePosition, SamplePosition, Vec<u8>)>,
        records: &mut Vec<Spanned<ModbusRecord>>,
    ) -> Result<()> {
        let ss = bytes[0].ss;
        let es = bytes[bytes.len() - 1].es;

        let mut parse = AduParse::new(bytes);
        let header = parse.server_id().and_then(|()| parse.byte(1));

        let Some(function) = header else {
            anns.extend(parse.anns);
            anns.push(Annotation::text(ss, es, ANN_WARNING, "Message too short"));
            log_or_err!(
                self,
                Level::Warn,
                anyhow!(ModbusError::TooShort {
                    got: bytes.len(),
                    minimum: 4,
                })
            );
            return Ok(());
        };

        let outcome = parse.dispatch(role, function);
        let minimum = parse.minimum;
        anns.extend(parse.anns);

        let total = match outcome {
            Outcome::Known(total) => total,
            Outcome::Unknown => {
                anns.push(Annotation::text(
                    bytes[1].ss,
                    bytes[1].es,
                    ANN_WARNING,
                    format!("Unknown function: {function}"),
                ));
                log_or_err!(self, Level::Warn, anyhow!(ModbusError::UnknownFunction(function)));
                bytes.len().max(4)
            }
            Outcome::Short => {
                anns.push(Annotation::text(ss, es, ANN_WARNING, "Message too short"));
                log_or_err!(
                    self,
                    Level::Warn,
                    anyhow!(ModbusError::TooShort {
                        got: bytes.len(),
                        minimum,
                    })
                );
                return Ok(());
            }
        };

        if bytes.len() < total {
            anns.push(Annotation::text(ss, es, ANN_WARNING, "Message too short"));
            log_or_err!(
                self,
                Level::Warn,
                anyhow!(ModbusError::TooShort {
                    got: bytes.len(),
                    minimum: total,
                })
            );
            return Ok(());
        }

        // CRC-16, transmitted low byte first.
        let crc_lo = bytes[total - 2].value as u16;
        let crc_hi = bytes[total - 1].value as u16;
        let received = (crc_hi << 8) | crc_lo;
        let payload: Vec<u8> = bytes[..total - 2].iter().map(|b| b.value).collect();
        let calculated = CRC_16.checksum(&payload) as u16;
        let crc_ok = calculated == received;

        if crc_ok {
            anns.push(Annotation::text(
                bytes[total - 2].ss,
                bytes[total - 1].es,
                ANN_CRC,
                format!("CRC correct (0x{received:04X})"),
            ));
        } else {
            anns.push(Annotation::text(
                bytes[total - 2].ss,
                bytes[total - 1].es,
                ANN_WARNING,
                format!("CRC mismatch: calculated 0x{calculated:04X}, received 0x{received:04X}"),
            ));
            log_or_err!(
                self,
                Level::Warn,
                anyhow!(ModbusError::CrcMismatch {
                    calculated,
                    read: received,
                })
            );
        }

        if bytes.len() > total {
            anns.push(Annotation::text(
                bytes[total].ss,
                es,
                ANN_WARNING,
                "Message too long",
            ));
            log_or_err!(self, Level::Warn, anyhow!(ModbusError::TooLong));
        }

        // Reassembled ADU bytes, CRC excluded, for stacked consumers.
        bins.push((ss, bytes[total - 3].es, payload.clone()));

        records.push(Spanned::new(
            ss,
            es,
            ModbusRecord {
                role,
                server_id: bytes[0].value,
                function,
                data: payload[2..].to_vec(),
                crc_ok,
                exception: (role == ModbusRole::Server && function >= 0x80)
                    .then(|| bytes[2].value),
            },
        ));

        Ok(())
    }
}

#[cfg(test)]
fn frames_of(bytes: &[&[u8]]) -> Vec<Spanned<UartRecord>> {
    // 11-bit characters at 10 samples per bit; ADUs a full character
    // gap of 4 chars apart.
    let mut frames = Vec::new();
    let mut pos = 0u64;

    for burst in bytes {
        for &value in *burst {
            frames.push(Spanned::new(
                pos,
                pos + 110,
                UartRecord {
                    dir: Direction::Rx,
                    event: UartEvent::Frame {
                        value: value as u16,
                        valid: true,
                    },
                },
            ));
            pos += 110;
        }
        pos += 4 * 110;
    }

    frames
}

#[cfg(test)]
fn client_decoder() -> ModbusDecoder {
    ModbusDecoder::new(ModbusOptions {
        client: Direction::Rx,
        ..Default::default()
    })
}

#[test]
fn read_holding_registers_request() {
    let frames = frames_of(&[&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]]);
    let mut sink: MemorySink<ModbusRecord> = MemorySink::new();

    client_decoder().decode_frames(&frames, &mut sink).unwrap();

    assert_eq!(
        sink.records[0].payload,
        ModbusRecord {
            role: ModbusRole::Client,
            server_id: 1,
            function: 3,
            data: vec![0x00, 0x00, 0x00, 0x01],
            crc_ok: true,
            exception: None,
        }
    );
    assert_eq!(sink.annotations_of(ANN_WARNING).count(), 0);

    // The CRC-stripped ADU comes out on the binary stream.
    assert_eq!(sink.binary.len(), 1);
    assert_eq!(sink.binary[0].2, vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01]);
}

#[test]
fn crc_mismatch_still_decodes() {
    let frames = frames_of(&[&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0xFF, 0xFF]]);
    let mut sink: MemorySink<ModbusRecord> = MemorySink::new();

    client_decoder().decode_frames(&frames, &mut sink).unwrap();

    assert_eq!(sink.records.len(), 1);
    assert!(!sink.records[0].payload.crc_ok);

    let warning = sink.annotations_of(ANN_WARNING).next().unwrap();
    assert!(warning.texts[0].contains("0x0A84"));
    assert!(warning.texts[0].contains("0xFFFF"));
}

#[test]
fn short_burst_warns_without_record() {
    let frames = frames_of(&[&[0x01, 0x03]]);
    let mut sink: MemorySink<ModbusRecord> = MemorySink::new();

    client_decoder().decode_frames(&frames, &mut sink).unwrap();

    assert!(sink.records.is_empty());
    assert_eq!(sink.annotations_of(ANN_WARNING).count(), 1);
}

#[test]
fn gap_splits_adus() {
    let frames = frames_of(&[
        &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A],
        &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A],
    ]);
    let mut sink: MemorySink<ModbusRecord> = MemorySink::new();

    client_decoder().decode_frames(&frames, &mut sink).unwrap();

    assert_eq!(sink.records.len(), 2);
}

#[test]
fn error_response() {
    let adu = [0x01u8, 0x83, 0x02];
    let mut bytes = adu.to_vec();
    let crc = CRC_16.checksum(&bytes);
    bytes.push(crc as u8);
    bytes.push((crc >> 8) as u8);

    let frames = frames_of(&[&bytes]);
    let decoder = ModbusDecoder::new(ModbusOptions {
        client: Direction::Tx,
        ..Default::default()
    });
    let mut sink: MemorySink<ModbusRecord> = MemorySink::new();

    decoder.decode_frames(&frames, &mut sink).unwrap();

    assert_eq!(sink.records[0].payload.exception, Some(2));
    assert!(sink.records[0].payload.crc_ok);
    assert!(
        sink.annotations
            .iter()
            .any(|a| a.texts[0].contains("Illegal Data Address"))
    );
}

#[test]
fn unknown_function_warns_but_records() {
    let adu = [0x01u8, 0x63, 0xAA];
    let mut bytes = adu.to_vec();
    let crc = CRC_16.checksum(&bytes);
    bytes.push(crc as u8);
    bytes.push((crc >> 8) as u8);

    let frames = frames_of(&[&bytes]);
    let mut sink: MemorySink<ModbusRecord> = MemorySink::new();

    client_decoder().decode_frames(&frames, &mut sink).unwrap();

    assert_eq!(sink.records.len(), 1);
    assert_eq!(sink.records[0].payload.function, 0x63);
    assert!(sink.records[0].payload.crc_ok);
    assert!(
        sink.annotations
            .iter()
            .any(|a| a.class == ANN_WARNING && a.texts[0].contains("Unknown function"))
    );
}

#[test]
fn write_multiple_registers_request() {
    // Write 2 registers at address 0: 01 10 0000 0002 04 000A 0102 + CRC.
    let mut bytes = vec![0x01, 0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02];
    let crc = CRC_16.checksum(&bytes);
    bytes.push(crc as u8);
    bytes.push((crc >> 8) as u8);

    let frames = frames_of(&[&bytes]);
    let mut sink: MemorySink<ModbusRecord> = MemorySink::new();

    client_decoder().decode_frames(&frames, &mut sink).unwrap();

    assert_eq!(sink.records.len(), 1);
    let record = &sink.records[0].payload;
    assert_eq!(record.function, 16);
    assert_eq!(record.data, vec![0x00, 0x00, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]);
    assert!(record.crc_ok);
}

#[test]
fn strict_mode_fails_on_crc_mismatch() {
    let frames = frames_of(&[&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0xFF, 0xFF]]);
    let mut decoder = client_decoder();
    decoder.set_fail_level(Level::Warn);
    let mut sink: MemorySink<ModbusRecord> = MemorySink::new();

    assert!(decoder.decode_frames(&frames, &mut sink).is_err());
}
