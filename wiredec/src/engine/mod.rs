//! Decoding engine: capture traversal, bit recovery, frame assembly,
//! and output collection.
//!
//! The engine is protocol-agnostic. Decoders drive a [`capture::Cursor`]
//! to find the samples they care about, recover timed bits through
//! [`bits`], assemble them into frames with [`assemble`], and hand
//! results to a [`sink::Sink`].

pub mod assemble;
pub mod bits;
pub mod capture;
pub mod sink;
