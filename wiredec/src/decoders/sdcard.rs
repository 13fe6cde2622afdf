//! SD card (SD mode) command/response decoder.
//!
//! The CMD line is sampled on every CLK rising edge, so no samplerate
//! is needed. Tokens are 48 bits, except R2 responses which run to 136
//! and reveal that only after the preceding command is known. CRC-7 is
//! verified on every token that carries one; an R3 response's CRC
//! field is reserved and left unchecked. A CMD55 arms the ACMD flag,
//! which the next command token consumes.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use log::Level;

use crate::engine::assemble::{BitStore, Field, FieldCursor};
use crate::engine::capture::{Capture, Cond, Cursor};
use crate::engine::sink::{Annotation, Sink, Spanned};
use crate::log_or_err;
use crate::utils::bitreader::SliceBitReader;
use crate::utils::crc::{CRC_7_SD_ALG, Crc};
use crate::utils::errors::{ConfigError, SdError};

pub const ANN_BIT: u32 = 0;
pub const ANN_START: u32 = 1;
pub const ANN_TRANSMISSION: u32 = 2;
pub const ANN_CMD: u32 = 3;
pub const ANN_ARG: u32 = 4;
pub const ANN_CRC: u32 = 5;
pub const ANN_END: u32 = 6;
pub const ANN_FIELD: u32 = 7;
pub const ANN_COMMAND: u32 = 8;
pub const ANN_RESPONSE: u32 = 9;
pub const ANN_WARNING: u32 = 10;

const CRC_7: Crc = Crc::new(&CRC_7_SD_ALG);

const TOKEN_BITS: usize = 48;
const TOKEN_BITS_R2: usize = 136;

#[derive(Debug, Clone, Default)]
pub struct SdOptions {
    pub cmd: Option<usize>,
    pub clk: Option<usize>,
}

impl SdOptions {
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut opts = Self::default();

        for (key, value) in pairs {
            let bad = || ConfigError::InvalidOption {
                option: key.clone(),
                value: value.clone(),
            };

            match key.as_str() {
                "cmd" => opts.cmd = Some(value.parse().map_err(|_| bad())?),
                "clk" => opts.clk = Some(value.parse().map_err(|_| bad())?),
                _ => return Err(ConfigError::UnknownOption(key.clone())),
            }
        }

        Ok(opts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    R1,
    R1b,
    R2Cid,
    R2Csd,
    R3,
    R6,
    R7,
}

impl ResponseKind {
    pub fn label(self) -> &'static str {
        match self {
            ResponseKind::R1 => "R1",
            ResponseKind::R1b => "R1b",
            ResponseKind::R2Cid | ResponseKind::R2Csd => "R2",
            ResponseKind::R3 => "R3",
            ResponseKind::R6 => "R6",
            ResponseKind::R7 => "R7",
        }
    }
}

/// Card identification register contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidInfo {
    pub mid: u8,
    pub oid: String,
    pub pnm: String,
    pub prv_major: u8,
    pub prv_minor: u8,
    pub psn: u32,
    pub mdt_year: u16,
    pub mdt_month: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdRecord {
    Command {
        cmd: u8,
        acmd: bool,
        arg: u32,
        crc_ok: bool,
    },
    Response {
        kind: ResponseKind,
        value: u32,
        crc_ok: bool,
    },
    Cid(CidInfo),
}

fn cmd_name(acmd: bool, cmd: u8) -> Option<&'static str> {
    if acmd {
        match cmd {
            6 => Some("SET_BUS_WIDTH"),
            13 => Some("SD_STATUS"),
            41 => Some("SD_SEND_OP_COND"),
            51 => Some("SEND_SCR"),
            _ => None,
        }
    } else {
        match cmd {
            0 => Some("GO_IDLE_STATE"),
            2 => Some("ALL_SEND_CID"),
            3 => Some("SEND_RELATIVE_ADDR"),
            6 => Some("SWITCH_FUNC"),
            7 => Some("SELECT/DESELECT_CARD"),
            8 => Some("SEND_IF_COND"),
            9 => Some("SEND_CSD"),
            10 => Some("SEND_CID"),
            13 => Some("SEND_STATUS"),
            16 => Some("SET_BLOCKLEN"),
            55 => Some("APP_CMD"),
            _ => None,
        }
    }
}

/// Response expected after a command; `None` for no response at all.
fn response_for(acmd: bool, cmd: u8) -> Option<ResponseKind> {
    if acmd {
        match cmd {
            41 => Some(ResponseKind::R3),
            _ => Some(ResponseKind::R1),
        }
    } else {
        match cmd {
            0 => None,
            2 | 10 => Some(ResponseKind::R2Cid),
            9 => Some(ResponseKind::R2Csd),
            3 => Some(ResponseKind::R6),
            7 => Some(ResponseKind::R1b),
            8 => Some(ResponseKind::R7),
            _ => Some(ResponseKind::R1),
        }
    }
}

#[derive(Debug)]
pub struct SdDecoder {
    opts: SdOptions,
    pub fail_level: Level,
}

impl SdDecoder {
    pub fn new(opts: SdOptions) -> Self {
        Self {
            opts,
            fail_level: Level::Error,
        }
    }

    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
    }

    pub fn decode(&self, capture: &Capture, sink: &mut impl Sink<SdRecord>) -> Result<()> {
        let Some(cmd_ch) = self.opts.cmd else {
            anyhow::bail!(ConfigError::ChannelMissing("CMD"));
        };
        let Some(clk_ch) = self.opts.clk else {
            anyhow::bail!(ConfigError::ChannelMissing("CLK"));
        };
        for ch in [cmd_ch, clk_ch] {
            if ch >= 8 {
                anyhow::bail!(ConfigError::ChannelOutOfRange {
                    index: ch,
                    width: 8,
                });
            }
        }

        let mut cursor = Cursor::new(capture);
        let mut store = BitStore::new();
        let mut anns: Vec<Annotation> = Vec::new();
        let mut records: Vec<Spanned<SdRecord>> = Vec::new();
        // Expected kind of the next response token, set by commands.
        let mut pending: Option<ResponseKind> = None;
        // Armed by CMD55, consumed by the next command token.
        let mut acmd = false;

        while let Some(m) = cursor.wait(&[Cond::Rising(clk_ch)]) {
            let level = capture.level(m.pos, cmd_ch);

            if store.is_empty() {
                // A token begins with a low start bit; anything else
                // on an idle line is not ours to decode.
                if level {
                    continue;
                }
                let expected = match pending {
                    Some(ResponseKind::R2Cid | ResponseKind::R2Csd) => TOKEN_BITS_R2,
                    _ => TOKEN_BITS,
                };
                store.set_expected(expected);
            }

            store.push_at(level, m.pos);

            if store.is_complete() {
                store.close();
                self.process_token(&store, &mut pending, &mut acmd, &mut anns, &mut records)?;
                store.clear();
            }
        }

        if !store.is_empty() {
            let got = store.len();
            let expected = store.expected().unwrap_or(TOKEN_BITS);
            let ss = store.bits()[0].ss;
            anns.push(Annotation::new(
                ss,
                capture.len(),
                ANN_WARNING,
                vec![
                    format!("Token truncated at end of capture ({got} of {expected} bits)"),
                    "Trunc".into(),
                ],
            ));
            log_or_err!(
                self,
                Level::Warn,
                anyhow!(SdError::TruncatedToken { got, expected })
            );
        }

        anns.sort_by_key(|a| a.ss);
        for ann in anns {
            sink.annotate(ann);
        }
        for record in records {
            sink.record(record);
        }

        Ok(())
    }

    fn process_token(
        &self,
        store: &BitStore,
        pending: &mut Option<ResponseKind>,
        acmd: &mut bool,
        anns: &mut Vec<Annotation>,
        records: &mut Vec<Spanned<SdRecord>>,
    ) -> Result<()> {
        for bit in store.bits() {
            anns.push(Annotation::text(
                bit.ss,
                bit.es,
                ANN_BIT,
                if bit.level { "1" } else { "0" },
            ));
        }

        let mut fields = FieldCursor::new(store);
        let Some(start) = fields.take(1) else {
            return Ok(());
        };
        let Some(transmission) = fields.take(1) else {
            return Ok(());
        };
        anns.push(Annotation::new(
            start.ss,
            start.es,
            ANN_START,
            vec!["Start bit".into(), "S".into()],
        ));
        anns.push(Annotation::new(
            transmission.ss,
            transmission.es,
            ANN_TRANSMISSION,
            vec![
                format!(
                    "Transmission: {}",
                    if transmission.value == 1 { "host" } else { "card" }
                ),
                "T".into(),
            ],
        ));

        if transmission.value == 1 {
            self.command_token(store, fields, pending, acmd, anns, records)
        } else {
            let kind = pending.take().unwrap_or(ResponseKind::R1);
            match kind {
                ResponseKind::R2Cid | ResponseKind::R2Csd => {
                    self.r2_token(store, kind, fields, anns, records)
                }
                _ => self.short_response(store, kind, fields, anns, records),
            }
        }
    }

    fn check_end_bit(&self, end: Field, anns: &mut Vec<Annotation>) -> Result<()> {
        anns.push(Annotation::new(
            end.ss,
            end.es,
            ANN_END,
            vec!["End bit".into(), "E".into()],
        ));
        if end.value != 1 {
            anns.push(Annotation::text(
                end.ss,
                end.es,
                ANN_WARNING,
                "End bit must be 1",
            ));
            log_or_err!(self, Level::Warn, anyhow!(SdError::InvalidEndBit));
        }

        Ok(())
    }

    /// CRC-7 over the first 40 token bits, reconstructed from fields.
    fn verify_crc(
        &self,
        kind: &'static str,
        head: u8,
        arg: u32,
        read: u8,
        span: Field,
        anns: &mut Vec<Annotation>,
    ) -> Result<bool> {
        let bytes = [
            head,
            (arg >> 24) as u8,
            (arg >> 16) as u8,
            (arg >> 8) as u8,
            arg as u8,
        ];
        let calculated = CRC_7.checksum(&bytes) as u8;
        let ok = calculated == read;

        anns.push(Annotation::new(
            span.ss,
            span.es,
            ANN_CRC,
            vec![format!("CRC-7: 0x{read:02x}"), "CRC".into()],
        ));
        if !ok {
            anns.push(Annotation::new(
                span.ss,
                span.es,
                ANN_WARNING,
                vec![format!(
                    "CRC-7 mismatch: calculated 0x{calculated:02x}, read 0x{read:02x}"
                )],
            ));
            log_or_err!(
                self,
                Level::Warn,
                anyhow!(SdError::CrcMismatch {
                    kind,
                    calculated,
                    read,
                })
            );
        }

        Ok(ok)
    }

    fn command_token(
        &self,
        store: &BitStore,
        mut fields: FieldCursor,
        pending: &mut Option<ResponseKind>,
        acmd: &mut bool,
        anns: &mut Vec<Annotation>,
        records: &mut Vec<Spanned<SdRecord>>,
    ) -> Result<()> {
        let (Some(cmd), Some(arg), Some(crc), Some(end)) = (
            fields.take(6),
            fields.take(32),
            fields.take(7),
            fields.take(1),
        ) else {
            return Ok(());
        };

        let cmd_index = cmd.value as u8;
        let is_acmd = *acmd;
        let prefix = if is_acmd { "ACMD" } else { "CMD" };

        anns.push(Annotation::new(
            cmd.ss,
            cmd.es,
            ANN_CMD,
            vec![format!("Command: {prefix}{cmd_index}"), format!("{prefix}{cmd_index}")],
        ));
        anns.push(Annotation::new(
            arg.ss,
            arg.es,
            ANN_ARG,
            vec![format!("Argument: 0x{:08x}", arg.value), "Arg".into()],
        ));

        let crc_ok = self.verify_crc(
            "command",
            0x40 | cmd_index,
            arg.value as u32,
            crc.value as u8,
            crc,
            anns,
        )?;
        self.check_end_bit(end, anns)?;

        let name = cmd_name(is_acmd, cmd_index);
        match name {
            Some(name) => anns.push(Annotation::new(
                store.bits()[0].ss,
                end.es,
                ANN_COMMAND,
                vec![
                    format!("{prefix}{cmd_index} ({name}), arg 0x{:08x}", arg.value),
                    format!("{prefix}{cmd_index}"),
                ],
            )),
            None => {
                anns.push(Annotation::new(
                    store.bits()[0].ss,
                    end.es,
                    ANN_WARNING,
                    vec![format!("Unknown command {prefix}{cmd_index}")],
                ));
                log_or_err!(self, Level::Warn, anyhow!(SdError::UnknownCommand(cmd_index)));
            }
        }

        records.push(Spanned::new(
            store.bits()[0].ss,
            end.es,
            SdRecord::Command {
                cmd: cmd_index,
                acmd: is_acmd,
                arg: arg.value as u32,
                crc_ok,
            },
        ));

        *pending = response_for(is_acmd, cmd_index);
        // CMD55 arms the flag; every other command consumes it.
        *acmd = cmd_index == 55;

        Ok(())
    }

    fn short_response(
        &self,
        store: &BitStore,
        kind: ResponseKind,
        mut fields: FieldCursor,
        anns: &mut Vec<Annotation>,
        records: &mut Vec<Spanned<SdRecord>>,
    ) -> Result<()> {
        let (Some(echo), Some(value), Some(crc), Some(end)) = (
            fields.take(6),
            fields.take(32),
            fields.take(7),
            fields.take(1),
        ) else {
            return Ok(());
        };

        let field_text = match kind {
            ResponseKind::R3 => format!("OCR: 0x{:08x}", value.value),
            ResponseKind::R6 => format!(
                "RCA: 0x{:04x}, status 0x{:04x}",
                value.value >> 16,
                value.value & 0xFFFF
            ),
            ResponseKind::R7 => format!("Echo-back: 0x{:08x}", value.value),
            _ => format!("Card status: 0x{:08x}", value.value),
        };
        anns.push(Annotation::new(
            value.ss,
            value.es,
            ANN_FIELD,
            vec![field_text],
        ));

        // The CRC field of an R3 is reserved, all ones on the wire.
        let crc_ok = if kind == ResponseKind::R3 {
            anns.push(Annotation::new(
                crc.ss,
                crc.es,
                ANN_CRC,
                vec!["CRC (reserved)".into(), "CRC".into()],
            ));
            true
        } else {
            self.verify_crc(
                "response",
                echo.value as u8,
                value.value as u32,
                crc.value as u8,
                crc,
                anns,
            )?
        };
        self.check_end_bit(end, anns)?;

        anns.push(Annotation::new(
            store.bits()[0].ss,
            end.es,
            ANN_RESPONSE,
            vec![format!("Response {}", kind.label()), kind.label().into()],
        ));

        records.push(Spanned::new(
            store.bits()[0].ss,
            end.es,
            SdRecord::Response {
                kind,
                value: value.value as u32,
                crc_ok,
            },
        ));

        Ok(())
    }

    fn r2_token(
        &self,
        store: &BitStore,
        kind: ResponseKind,
        mut fields: FieldCursor,
        anns: &mut Vec<Annotation>,
        records: &mut Vec<Spanned<SdRecord>>,
    ) -> Result<()> {
        let Some(_reserved) = fields.take(6) else {
            return Ok(());
        };

        // The remaining 128 bits are the register itself, its own CRC
        // and the token end bit doubling as the register's stop bit.
        let mut raw = [0u8; 16];
        for byte in raw.iter_mut() {
            let Some(field) = fields.take(8) else {
                return Ok(());
            };
            *byte = field.value as u8;
        }

        let ss = store.bits()[0].ss;
        let es = store.bits()[store.len() - 1].es;

        anns.push(Annotation::new(
            ss,
            es,
            ANN_RESPONSE,
            vec![format!("Response {}", kind.label()), kind.label().into()],
        ));

        records.push(Spanned::new(
            ss,
            es,
            SdRecord::Response {
                kind,
                value: 0,
                crc_ok: true,
            },
        ));

        match kind {
            ResponseKind::R2Cid => {
                if let Ok(cid) = self.decode_cid(&raw, ss, es, anns) {
                    records.push(Spanned::new(ss, es, SdRecord::Cid(cid)));
                }
            }
            _ => {
                // CSD contents: annotate the structure version and the
                // raw register.
                let version = (raw[0] >> 6) + 1;
                anns.push(Annotation::new(
                    ss,
                    es,
                    ANN_FIELD,
                    vec![
                        format!("CSD v{version}: {}", hex_string(&raw)),
                        format!("CSD v{version}"),
                    ],
                ));
            }
        }

        Ok(())
    }

    fn decode_cid(
        &self,
        raw: &[u8; 16],
        ss: u64,
        es: u64,
        anns: &mut Vec<Annotation>,
    ) -> Result<CidInfo> {
        let mut r = SliceBitReader::from_slice(raw);

        let mid: u8 = r.get_n(8)?;
        let oid_bytes: u16 = r.get_n(16)?;
        let oid: String = oid_bytes.to_be_bytes().iter().map(|&b| b as char).collect();
        let pnm: String = (0..5)
            .map(|_| r.get_n::<u8>(8).map(|b| b as char))
            .collect::<Result<_, _>>()?;
        let prv: u8 = r.get_n(8)?;
        let psn: u32 = r.get_n(32)?;
        r.skip_n(4)?;
        let mdt: u16 = r.get_n(12)?;

        let cid = CidInfo {
            mid,
            oid,
            pnm,
            prv_major: prv >> 4,
            prv_minor: prv & 0x0F,
            psn,
            mdt_year: 2000 + (mdt >> 4),
            mdt_month: (mdt & 0x0F) as u8,
        };

        anns.push(Annotation::new(
            ss,
            es,
            ANN_FIELD,
            vec![
                format!(
                    "CID: MID 0x{:02x}, OID '{}', PNM '{}', PRV {}.{}, PSN 0x{:08x}, MDT {}-{:02}",
                    cid.mid,
                    cid.oid,
                    cid.pnm,
                    cid.prv_major,
                    cid.prv_minor,
                    cid.psn,
                    cid.mdt_year,
                    cid.mdt_month
                ),
                "CID".into(),
            ],
        ));

        Ok(cid)
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
use crate::engine::sink::MemorySink;

/// Expands token bytes to a two-channel capture: CMD on 0, CLK on 1,
/// one rising clock edge per bit.
#[cfg(test)]
fn sd_capture(tokens: &[Vec<u8>]) -> Capture {
    let mut samples = vec![0b01, 0b01];

    for token in tokens {
        for byte in token {
            for i in (0..8).rev() {
                let cmd = (byte >> i) & 1;
                samples.push(cmd);
                samples.push(cmd | 0b10);
            }
        }
        // Idle clocks between tokens, CMD high.
        for _ in 0..4 {
            samples.push(0b01);
            samples.push(0b11);
        }
    }

    Capture::new(samples, None)
}

#[cfg(test)]
fn token48(head: u8, arg: u32, crc7: Option<u8>) -> Vec<u8> {
    let mut bytes = vec![
        head,
        (arg >> 24) as u8,
        (arg >> 16) as u8,
        (arg >> 8) as u8,
        arg as u8,
    ];
    let crc = crc7.unwrap_or(CRC_7.checksum(&bytes) as u8);
    bytes.push((crc << 1) | 1);

    bytes
}

#[cfg(test)]
fn test_decoder() -> SdDecoder {
    SdDecoder::new(SdOptions {
        cmd: Some(0),
        clk: Some(1),
    })
}

#[test]
fn cmd0_with_valid_crc() {
    let capture = sd_capture(&[token48(0x40, 0, None)]);
    assert_eq!(token48(0x40, 0, None)[5], 0x95);

    let mut sink = MemorySink::new();
    test_decoder().decode(&capture, &mut sink).unwrap();

    assert_eq!(
        sink.records[0].payload,
        SdRecord::Command {
            cmd: 0,
            acmd: false,
            arg: 0,
            crc_ok: true,
        }
    );
    assert_eq!(sink.annotations_of(ANN_WARNING).count(), 0);
}

#[test]
fn cmd0_with_zero_crc_still_decodes() {
    // A zeroed CRC field is an integrity warning, not a framing error;
    // the command must still come out.
    let capture = sd_capture(&[token48(0x40, 0, Some(0))]);

    let mut sink = MemorySink::new();
    test_decoder().decode(&capture, &mut sink).unwrap();

    assert_eq!(
        sink.records[0].payload,
        SdRecord::Command {
            cmd: 0,
            acmd: false,
            arg: 0,
            crc_ok: false,
        }
    );
    assert_eq!(sink.annotations_of(ANN_WARNING).count(), 1);
}

#[test]
fn cmd8_check_pattern() {
    let token = token48(0x48, 0x1AA, None);
    assert_eq!(token[5], 0x87);

    let capture = sd_capture(&[token]);
    let mut sink = MemorySink::new();
    test_decoder().decode(&capture, &mut sink).unwrap();

    assert_eq!(
        sink.records[0].payload,
        SdRecord::Command {
            cmd: 8,
            acmd: false,
            arg: 0x1AA,
            crc_ok: true,
        }
    );
}

#[test]
fn acmd_flag_is_one_shot() {
    let capture = sd_capture(&[
        token48(0x40 | 55, 0, None),
        token48(0x40 | 41, 0x4010_0000, None),
        token48(0x40, 0, None),
    ]);

    let mut sink = MemorySink::new();
    test_decoder().decode(&capture, &mut sink).unwrap();

    let flags: Vec<(u8, bool)> = sink
        .records
        .iter()
        .filter_map(|r| match r.payload {
            SdRecord::Command { cmd, acmd, .. } => Some((cmd, acmd)),
            _ => None,
        })
        .collect();

    assert_eq!(flags, vec![(55, false), (41, true), (0, false)]);
}

#[test]
fn r2_cid_response() {
    // CMD2, then the 136-bit R2 carrying a CID register.
    let mut cid = vec![0x03u8];
    cid.extend(b"SD");
    cid.extend(b"SD08G");
    cid.push(0x80);
    cid.extend(0x1234_5678u32.to_be_bytes());
    cid.extend(0x0137u16.to_be_bytes()); // reserved nibble + MDT 2019-07
    cid.push(0x01); // CRC-7 field and stop bit
    let mut r2 = vec![0b0011_1111u8];
    r2.extend(&cid);
    assert_eq!(r2.len(), 17);

    let capture = sd_capture(&[token48(0x42, 0, None), r2]);
    let mut sink = MemorySink::new();
    test_decoder().decode(&capture, &mut sink).unwrap();

    let cid = sink
        .records
        .iter()
        .find_map(|r| match &r.payload {
            SdRecord::Cid(cid) => Some(cid.clone()),
            _ => None,
        })
        .unwrap();

    assert_eq!(cid.mid, 0x03);
    assert_eq!(cid.oid, "SD");
    assert_eq!(cid.pnm, "SD08G");
    assert_eq!(cid.prv_major, 8);
    assert_eq!(cid.prv_minor, 0);
    assert_eq!(cid.psn, 0x1234_5678);
    assert_eq!(cid.mdt_year, 2019);
    assert_eq!(cid.mdt_month, 7);
}

#[test]
fn unknown_command_falls_back_to_r1() {
    let capture = sd_capture(&[
        token48(0x40 | 42, 0, None),
        // The card answers; decoded as R1 despite the unknown index.
        token48(42, 0x0000_0900, None),
    ]);

    let mut sink = MemorySink::new();
    test_decoder().decode(&capture, &mut sink).unwrap();

    assert!(
        sink.annotations
            .iter()
            .any(|a| a.class == ANN_WARNING && a.texts[0].contains("Unknown command"))
    );
    assert!(sink.records.iter().any(|r| matches!(
        r.payload,
        SdRecord::Response {
            kind: ResponseKind::R1,
            value: 0x0000_0900,
            crc_ok: true,
        }
    )));
}

#[test]
fn truncated_token_warns() {
    let mut token = token48(0x40, 0, None);
    token.truncate(3);

    let capture = sd_capture(&[token]);
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
fn missing_channel_is_fatal() {
    let capture = sd_capture(&[token48(0x40, 0, None)]);
    let decoder = SdDecoder::new(SdOptions {
        cmd: Some(0),
        clk: None,
    });
    let mut sink = MemorySink::new();

    assert!(decoder.decode(&capture, &mut sink).is_err());
}
