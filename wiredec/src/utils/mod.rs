//! Utility functions and supporting infrastructure.
//!
//! Provides CRC and parity validation, register bit-field reading,
//! and error handling shared by the decoders.

pub mod bitreader;
pub mod crc;
pub mod errors;
