#![doc = include_str!("../README.md")]
//!
//! ## Quick Start
//!
//! Steps for decoding a capture:
//!
//! 1. Load samples into an [`engine::capture::Capture`]
//! 2. Configure a decoder, e.g. [`decoders::uart::UartDecoder`]
//! 3. Run it into a sink such as [`engine::sink::MemorySink`]
//!
//! ```rust
//! use wiredec::decoders::uart::{UartDecoder, UartOptions, UartRecord};
//! use wiredec::engine::capture::Capture;
//! use wiredec::engine::sink::MemorySink;
//!
//! // One channel, idle-high line, no traffic.
//! let capture = Capture::new(vec![0x01; 1000], Some(115200.0 * 10.0));
//!
//! let decoder = UartDecoder::new(UartOptions {
//!     rx: Some(0),
//!     ..Default::default()
//! });
//!
//! let mut sink: MemorySink<UartRecord> = MemorySink::new();
//! decoder.decode(&capture, &mut sink)?;
//!
//! assert!(sink.records.is_empty());
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Reference protocol decoders.
///
/// - **UART** ([`decoders::uart`]): asynchronous serial frames
/// - **CAN** ([`decoders::can`]): CAN 2.0 data and remote frames
/// - **SD card** ([`decoders::sdcard`]): SD mode command/response tokens
/// - **Modbus RTU** ([`decoders::modbus`]): ADUs stacked on UART frames
pub mod decoders;

/// The decoding engine shared by all protocol decoders.
///
/// - **Captures** ([`engine::capture`]): sample storage and condition waits
/// - **Bit recovery** ([`engine::bits`]): bit clocks and edge resynchronization
/// - **Assembly** ([`engine::assemble`]): bit stores, fields, stuffing, bytes
/// - **Sinks** ([`engine::sink`]): annotation, binary, and record output
pub mod engine;

/// Utility functions and supporting infrastructure.
///
/// - **CRC and parity** ([`utils::crc`]): table-driven CRC engine, parity checks
/// - **Bit field reading** ([`utils::bitreader`]): register-style field extraction
/// - **Error Handling** ([`utils::errors`]): error types
pub mod utils;
