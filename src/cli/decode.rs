use std::collections::HashMap;

use anyhow::{Result, anyhow};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;
use serde::Serialize;

use super::command::{Cli, DecodeArgs, Protocol, ReportFormat};
use crate::input::InputReader;
use wiredec::decoders::can::{CanDecoder, CanFrame, CanOptions};
use wiredec::decoders::modbus::{ModbusDecoder, ModbusOptions, ModbusRecord, ModbusRole};
use wiredec::decoders::sdcard::{SdDecoder, SdOptions, SdRecord};
use wiredec::decoders::uart::{UartDecoder, UartEvent, UartOptions, UartRecord};
use wiredec::engine::capture::Capture;
use wiredec::engine::sink::MemorySink;

#[derive(Debug, Serialize)]
struct Report {
    protocol: String,
    samples: u64,
    samplerate: Option<f64>,
    annotations: Vec<AnnotationRow>,
    records: Vec<RecordRow>,
}

#[derive(Debug, Serialize)]
struct AnnotationRow {
    start: u64,
    end: u64,
    class: String,
    text: String,
}

#[derive(Debug, Serialize)]
struct RecordRow {
    start: u64,
    end: u64,
    summary: String,
}

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Decoding capture: {} (protocol: {:?}, strict mode: {})",
        args.input.display(),
        args.protocol,
        cli.strict
    );

    let options = parse_options(&args.options)?;
    let capture = read_capture(args, multi)?;

    let fail_level = if cli.strict { Level::Warn } else { Level::Error };

    let report = match args.protocol {
        Protocol::Uart => {
            let mut decoder = UartDecoder::new(UartOptions::from_pairs(&options)?);
            decoder.set_fail_level(fail_level);

            let mut sink: MemorySink<UartRecord> = MemorySink::new();
            decoder.decode(&capture, &mut sink)?;
            build_report(args, &capture, sink, uart_class, uart_summary)
        }
        Protocol::Can => {
            let mut decoder = CanDecoder::new(CanOptions::from_pairs(&options)?);
            decoder.set_fail_level(fail_level);

            let mut sink: MemorySink<CanFrame> = MemorySink::new();
            decoder.decode(&capture, &mut sink)?;
            build_report(args, &capture, sink, can_class, can_summary)
        }
        Protocol::Sdcard => {
            let mut decoder = SdDecoder::new(SdOptions::from_pairs(&options)?);
            decoder.set_fail_level(fail_level);

            let mut sink: MemorySink<SdRecord> = MemorySink::new();
            decoder.decode(&capture, &mut sink)?;
            build_report(args, &capture, sink, sd_class, sd_summary)
        }
        Protocol::Modbus => {
            let mut decoder = ModbusDecoder::new(ModbusOptions::from_pairs(&options)?);
            decoder.set_fail_level(fail_level);

            let mut sink: MemorySink<ModbusRecord> = MemorySink::new();
            decoder.decode(&capture, &mut sink)?;
            build_report(args, &capture, sink, modbus_class, modbus_summary)
        }
    };

    match args.format {
        ReportFormat::Text => print_report(&report),
        ReportFormat::Yaml => print!("{}", serde_yaml_ng::to_string(&report)?),
    }

    Ok(())
}

/// Splits `key=value` decoder options as given on the command line.
fn parse_options(raw: &[String]) -> Result<HashMap<String, String>> {
    let mut options = HashMap::new();

    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Option '{pair}' is not of the form key=value"))?;
        options.insert(key.to_owned(), value.to_owned());
    }

    Ok(options)
}

fn read_capture(args: &DecodeArgs, multi: Option<&MultiProgress>) -> Result<Capture> {
    let mut input_reader = InputReader::new(&args.input)?;

    let pb = multi.map(|multi| {
        let pb = match input_reader.len_hint() {
            Some(len) => {
                let pb = multi.add(ProgressBar::new(len));
                pb.set_style(
                    ProgressStyle::with_template("{bar:40.cyan/blue} {bytes}/{total_bytes}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                pb
            }
            None => {
                if input_reader.is_pipe() {
                    log::debug!("Reading capture from pipe, size unknown");
                }
                let pb = multi.add(ProgressBar::new_spinner());
                pb.set_style(
                    ProgressStyle::with_template("{spinner:.green} {bytes} read")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb
            }
        };
        pb.set_message("reading capture");
        pb
    });

    let samples = input_reader.read_samples(|read| {
        if let Some(ref pb) = pb {
            pb.set_position(read);
        }
    })?;

    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    log::info!("Read {} samples", samples.len());

    Ok(Capture::new(samples, args.samplerate))
}

fn build_report<R>(
    args: &DecodeArgs,
    capture: &Capture,
    sink: MemorySink<R>,
    class_label: impl Fn(u32) -> String,
    summarize: impl Fn(&R) -> String,
) -> Report {
    Report {
        protocol: format!("{:?}", args.protocol).to_lowercase(),
        samples: capture.len(),
        samplerate: capture.samplerate(),
        annotations: sink
            .annotations
            .iter()
            .map(|a| AnnotationRow {
                start: a.ss,
                end: a.es,
                class: class_label(a.class),
                text: a.texts.first().cloned().unwrap_or_default(),
            })
            .collect(),
        records: sink
            .records
            .iter()
            .map(|r| RecordRow {
                start: r.ss,
                end: r.es,
                summary: summarize(&r.payload),
            })
            .collect(),
    }
}

fn print_report(report: &Report) {
    println!(
        "{}: {} annotations, {} records",
        report.protocol,
        report.annotations.len(),
        report.records.len()
    );
    println!();

    println!("Annotations");
    for row in &report.annotations {
        println!(
            "  {:>10}..{:<10} {:<16} {}",
            row.start, row.end, row.class, row.text
        );
    }
    println!();

    println!("Records");
    for row in &report.records {
        println!("  {:>10}..{:<10} {}", row.start, row.end, row.summary);
    }
}

fn uart_class(class: u32) -> String {
    const NAMES: [&str; 8] = [
        "data",
        "start",
        "parity-ok",
        "parity-err",
        "stop",
        "warning",
        "data-bit",
        "break",
    ];

    let dir = if class % 2 == 0 { "rx" } else { "tx" };
    let name = NAMES.get((class / 2) as usize).unwrap_or(&"unknown");

    format!("{dir}-{name}")
}

fn can_class(class: u32) -> String {
    const NAMES: [&str; 18] = [
        "data",
        "sof",
        "eof",
        "id",
        "ext-id",
        "full-id",
        "ide",
        "reserved-bit",
        "rtr",
        "srr",
        "dlc",
        "crc-sequence",
        "crc-delimiter",
        "ack-slot",
        "ack-delimiter",
        "stuff-bit",
        "warning",
        "bit",
    ];

    NAMES
        .get(class as usize)
        .unwrap_or(&"unknown")
        .to_string()
}

fn sd_class(class: u32) -> String {
    const NAMES: [&str; 11] = [
        "bit",
        "start-bit",
        "transmission-bit",
        "command",
        "argument",
        "crc",
        "end-bit",
        "field",
        "command-token",
        "response-token",
        "warning",
    ];

    NAMES
        .get(class as usize)
        .unwrap_or(&"unknown")
        .to_string()
}

fn modbus_class(class: u32) -> String {
    const NAMES: [&str; 7] = [
        "server-id",
        "function",
        "address",
        "data",
        "length",
        "crc",
        "warning",
    ];

    NAMES
        .get(class as usize)
        .unwrap_or(&"unknown")
        .to_string()
}

fn uart_summary(record: &UartRecord) -> String {
    let dir = format!("{:?}", record.dir).to_lowercase();

    match record.event {
        UartEvent::Frame { value, valid } => {
            let suffix = if valid { "" } else { " (invalid)" };
            format!("{dir} frame 0x{value:02X}{suffix}")
        }
        UartEvent::Break => format!("{dir} break"),
        UartEvent::Idle => format!("{dir} idle"),
    }
}

fn can_summary(frame: &CanFrame) -> String {
    let kind = match (frame.extended, frame.remote) {
        (false, false) => "standard data",
        (false, true) => "standard remote",
        (true, false) => "extended data",
        (true, true) => "extended remote",
    };
    let data = frame
        .data
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ");
    let crc = if frame.crc_ok { "ok" } else { "BAD" };

    format!(
        "{kind} frame id 0x{:X} dlc {} data [{data}] crc {crc}",
        frame.id, frame.dlc
    )
}

fn sd_summary(record: &SdRecord) -> String {
    match record {
        SdRecord::Command { cmd, acmd, arg, crc_ok } => {
            let prefix = if *acmd { "ACMD" } else { "CMD" };
            let crc = if *crc_ok { "ok" } else { "BAD" };
            format!("{prefix}{cmd} arg 0x{arg:08X} crc {crc}")
        }
        SdRecord::Response { kind, value, crc_ok } => {
            let crc = if *crc_ok { "ok" } else { "BAD" };
            format!("{} response 0x{value:08X} crc {crc}", kind.label())
        }
        SdRecord::Cid(cid) => format!(
            "CID: {} '{}' rev {}.{} serial 0x{:08X} date {}-{:02}",
            cid.mid, cid.pnm, cid.prv_major, cid.prv_minor, cid.psn, cid.mdt_year, cid.mdt_month
        ),
    }
}

fn modbus_summary(record: &ModbusRecord) -> String {
    let role = match record.role {
        ModbusRole::Client => "client",
        ModbusRole::Server => "server",
    };
    let crc = if record.crc_ok { "ok" } else { "BAD" };

    match record.exception {
        Some(code) => format!(
            "{role} id {} error response for function {} (exception {code}) crc {crc}",
            record.server_id,
            record.function - 0x80
        ),
        None => format!(
            "{role} id {} function {} ({} data bytes) crc {crc}",
            record.server_id,
            record.function,
            record.data.len()
        ),
    }
}
