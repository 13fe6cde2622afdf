//! Frame assembly: collecting timed bits and carving fields from them.
//!
//! A [`BitStore`] accumulates recovered bits for one frame. Its
//! expected length is revisable, because many frame formats only
//! reveal their true length partway through (an SD R2 response, a CAN
//! DLC field). A [`FieldCursor`] then carves the stored bits into
//! fields, and a [`ByteCursor`] does the same over assembled bytes.
//! For link layers framed by repeated pad symbols rather than bit
//! counts, a [`SymbolMatcher`] collapses symbol runs into composites.

use crate::engine::bits::Bit;
use crate::engine::capture::SamplePosition;

/// Ordered store of recovered bits for a frame in progress.
///
/// Bits arrive with a known start sample but an end only the next bit
/// can establish, so `push_at` closes the previous bit's span. When
/// the store completes, the final bit's end is extrapolated from the
/// preceding bit's width.
#[derive(Debug, Default)]
pub struct BitStore {
    bits: Vec<Bit>,
    expected: Option<usize>,
}

impl BitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bits.clear();
        self.expected = None;
    }

    /// Number of frame bits expected, once known.
    pub fn set_expected(&mut self, expected: usize) {
        self.expected = Some(expected);
    }

    pub fn expected(&self) -> Option<usize> {
        self.expected
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.expected.is_some_and(|n| self.bits.len() >= n)
    }

    /// Appends a bit starting at `ss`, closing the previous bit there.
    pub fn push_at(&mut self, level: bool, ss: SamplePosition) {
        if let Some(last) = self.bits.last_mut() {
            last.es = ss;
        }

        self.bits.push(Bit { level, ss, es: ss });
    }

    /// Extrapolates the final bit's end from the previous bit width.
    pub fn close(&mut self) {
        if self.bits.len() < 2 {
            return;
        }

        let prev_width = self.bits[self.bits.len() - 2].es - self.bits[self.bits.len() - 2].ss;
        if let Some(last) = self.bits.last_mut() {
            last.es = last.ss + prev_width;
        }
    }

    pub fn bits(&self) -> &[Bit] {
        &self.bits
    }

    pub fn get(&self, index: usize) -> Option<Bit> {
        self.bits.get(index).copied()
    }
}

/// A contiguous run of bits interpreted as an unsigned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub value: u64,
    pub ss: SamplePosition,
    pub es: SamplePosition,
}

/// Carves MSB-first fields out of a completed [`BitStore`].
#[derive(Debug)]
pub struct FieldCursor<'a> {
    store: &'a BitStore,
    index: usize,
}

impl<'a> FieldCursor<'a> {
    pub fn new(store: &'a BitStore) -> Self {
        Self { store, index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Takes the next `width` bits as one field, or `None` when the
    /// store holds fewer. A failed take does not consume anything.
    pub fn take(&mut self, width: usize) -> Option<Field> {
        if width == 0 || self.index + width > self.store.len() {
            return None;
        }

        let bits = &self.store.bits()[self.index..self.index + width];
        let value = bits.iter().fold(0u64, |acc, b| (acc << 1) | b.level as u64);

        self.index += width;
        Some(Field {
            value,
            ss: bits[0].ss,
            es: bits[width - 1].es,
        })
    }

    /// Skips `width` bits without interpreting them.
    pub fn skip(&mut self, width: usize) -> Option<()> {
        if self.index + width > self.store.len() {
            return None;
        }

        self.index += width;
        Some(())
    }
}

/// Detects and strips bit stuffing from a bit-serial line.
///
/// After five identical consecutive bits the transmitter inserts one
/// opposite bit; `feed` reports whether the bit just seen is such an
/// insertion. Six identical bits in a row inside a stuffed region is a
/// line error, reported separately. The caller decides where stuffing
/// applies; frame trailers are typically transmitted unstuffed.
#[derive(Debug, Default)]
pub struct StuffRemover {
    run_level: bool,
    run_len: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuffVerdict {
    /// An ordinary data bit.
    Data,
    /// A stuff bit to drop.
    Stuffed,
    /// Six identical bits in a row.
    Error,
}

impl StuffRemover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.run_len = 0;
    }

    pub fn feed(&mut self, level: bool) -> StuffVerdict {
        if self.run_len == 0 || level != self.run_level {
            let verdict = if self.run_len == 5 {
                StuffVerdict::Stuffed
            } else {
                StuffVerdict::Data
            };

            self.run_level = level;
            self.run_len = 1;
            return verdict;
        }

        self.run_len += 1;
        if self.run_len > 5 {
            self.run_len = 0;
            return StuffVerdict::Error;
        }

        StuffVerdict::Data
    }
}

/// A classified line symbol with the span that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol<S> {
    pub value: S,
    pub ss: SamplePosition,
    pub es: SamplePosition,
}

/// Collapses runs of symbols into composite symbols by tail matching.
///
/// Link layers that frame with pad symbols build their delimiters out
/// of repeated smaller symbols: a long mark and a short space form a
/// sync pad, three sync pads in a row open a frame. The matcher keeps
/// the emitted symbol list and, whenever its tail equals a declared
/// sequence, replaces that tail with one composite symbol spanning it,
/// so composites themselves can take part in further matches.
#[derive(Debug)]
pub struct SymbolMatcher<S> {
    symbols: Vec<Symbol<S>>,
}

impl<S> Default for SymbolMatcher<S> {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
        }
    }
}

impl<S: Copy + PartialEq> SymbolMatcher<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.symbols.clear();
    }

    pub fn push(&mut self, symbol: Symbol<S>) {
        self.symbols.push(symbol);
    }

    pub fn symbols(&self) -> &[Symbol<S>] {
        &self.symbols
    }

    /// True when the most recent symbols equal `sequence`.
    pub fn ends_with(&self, sequence: &[S]) -> bool {
        !sequence.is_empty()
            && sequence.len() <= self.symbols.len()
            && self.symbols[self.symbols.len() - sequence.len()..]
                .iter()
                .zip(sequence)
                .all(|(symbol, value)| symbol.value == *value)
    }

    /// Replaces a matching tail with `composite`, returning it. The
    /// symbol list is untouched when the tail does not match.
    pub fn collapse(&mut self, sequence: &[S], composite: S) -> Option<Symbol<S>> {
        if !self.ends_with(sequence) {
            return None;
        }

        let tail_start = self.symbols.len() - sequence.len();
        let symbol = Symbol {
            value: composite,
            ss: self.symbols[tail_start].ss,
            es: self.symbols[self.symbols.len() - 1].es,
        };
        self.symbols.truncate(tail_start);
        self.symbols.push(symbol);

        Some(symbol)
    }
}

/// A recovered byte with the span of the bits that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataByte {
    pub value: u8,
    pub ss: SamplePosition,
    pub es: SamplePosition,
}

/// Carves multi-byte values out of a recovered byte sequence.
///
/// All takes return `None` past the end instead of panicking, so a
/// parser truncated mid-field simply stops producing output.
#[derive(Debug)]
pub struct ByteCursor<'a> {
    bytes: &'a [DataByte],
    index: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [DataByte]) -> Self {
        Self { bytes, index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.index
    }

    pub fn u8(&mut self) -> Option<DataByte> {
        let byte = self.bytes.get(self.index).copied()?;
        self.index += 1;

        Some(byte)
    }

    /// Big-endian 16-bit value spanning two bytes.
    pub fn u16_be(&mut self) -> Option<Field> {
        if self.index + 2 > self.bytes.len() {
            return None;
        }

        let hi = self.bytes[self.index];
        let lo = self.bytes[self.index + 1];
        self.index += 2;

        Some(Field {
            value: ((hi.value as u64) << 8) | lo.value as u64,
            ss: hi.ss,
            es: lo.es,
        })
    }

    /// Little-endian 16-bit value spanning two bytes.
    pub fn u16_le(&mut self) -> Option<Field> {
        if self.index + 2 > self.bytes.len() {
            return None;
        }

        let lo = self.bytes[self.index];
        let hi = self.bytes[self.index + 1];
        self.index += 2;

        Some(Field {
            value: ((hi.value as u64) << 8) | lo.value as u64,
            ss: lo.ss,
            es: hi.es,
        })
    }

    /// Takes `n` raw bytes.
    pub fn bytes(&mut self, n: usize) -> Option<&'a [DataByte]> {
        if self.index + n > self.bytes.len() {
            return None;
        }

        let slice = &self.bytes[self.index..self.index + n];
        self.index += n;

        Some(slice)
    }
}

#[test]
fn store_fixes_previous_end() {
    let mut store = BitStore::new();
    store.push_at(true, 100);
    store.push_at(false, 110);
    store.push_at(true, 121);

    assert_eq!(store.get(0).unwrap().es, 110);
    assert_eq!(store.get(1).unwrap().es, 121);

    store.close();
    // Last bit width extrapolated from the 11-sample predecessor.
    assert_eq!(store.get(2).unwrap().es, 132);
}

#[test]
fn store_expected_length_is_revisable() {
    let mut store = BitStore::new();
    store.set_expected(48);
    for i in 0..48 {
        store.push_at(i % 2 == 0, i * 10);
    }
    assert!(store.is_complete());

    store.set_expected(136);
    assert!(!store.is_complete());
}

#[test]
fn field_cursor_msb_first() {
    let mut store = BitStore::new();
    // 0b101101 pushed as individual bits.
    for (i, level) in [true, false, true, true, false, true].iter().enumerate() {
        store.push_at(*level, i as u64 * 10);
    }

    let mut cursor = FieldCursor::new(&store);
    let head = cursor.take(2).unwrap();
    assert_eq!(head.value, 0b10);
    assert_eq!((head.ss, head.es), (0, 20));

    let tail = cursor.take(4).unwrap();
    assert_eq!(tail.value, 0b1101);

    assert!(cursor.take(1).is_none());
}

#[test]
fn stuff_removal() {
    let mut stuff = StuffRemover::new();

    // Five dominant bits then the stuffed recessive one.
    for _ in 0..5 {
        assert_eq!(stuff.feed(false), StuffVerdict::Data);
    }
    assert_eq!(stuff.feed(true), StuffVerdict::Stuffed);

    // The stuff bit restarts the run count.
    assert_eq!(stuff.feed(true), StuffVerdict::Data);
}

#[test]
fn stuff_error_on_six_identical() {
    let mut stuff = StuffRemover::new();

    for _ in 0..5 {
        stuff.feed(true);
    }
    assert_eq!(stuff.feed(true), StuffVerdict::Error);
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PadSym {
    LongMark,
    ShortSpace,
    SyncPad,
    FrameInit,
}

#[test]
fn symbol_matcher_collapses_composites() {
    // A long mark then a short space form a sync pad; three pads in a
    // row open a frame.
    let mut matcher = SymbolMatcher::new();
    let mut pos = 0u64;

    for _ in 0..3 {
        for (value, width) in [(PadSym::LongMark, 40u64), (PadSym::ShortSpace, 10)] {
            matcher.push(Symbol {
                value,
                ss: pos,
                es: pos + width,
            });
            pos += width;
        }
        let pad = matcher
            .collapse(&[PadSym::LongMark, PadSym::ShortSpace], PadSym::SyncPad)
            .unwrap();
        assert_eq!(pad.es - pad.ss, 50);
    }

    let init = matcher
        .collapse(&[PadSym::SyncPad; 3], PadSym::FrameInit)
        .unwrap();
    assert_eq!((init.ss, init.es), (0, 150));
    assert_eq!(matcher.symbols().len(), 1);
}

#[test]
fn symbol_matcher_mismatch_consumes_nothing() {
    let mut matcher = SymbolMatcher::new();
    matcher.push(Symbol {
        value: PadSym::LongMark,
        ss: 0,
        es: 40,
    });
    matcher.push(Symbol {
        value: PadSym::LongMark,
        ss: 40,
        es: 80,
    });

    assert!(!matcher.ends_with(&[PadSym::LongMark, PadSym::ShortSpace]));
    assert!(
        matcher
            .collapse(&[PadSym::LongMark, PadSym::ShortSpace], PadSym::SyncPad)
            .is_none()
    );
    assert_eq!(matcher.symbols().len(), 2);
}

#[test]
fn byte_cursor_endianness_and_exhaustion() {
    let bytes: Vec<DataByte> = [0x12u8, 0x34, 0x56]
        .iter()
        .enumerate()
        .map(|(i, &value)| DataByte {
            value,
            ss: i as u64 * 100,
            es: i as u64 * 100 + 100,
        })
        .collect();

    let mut cursor = ByteCursor::new(&bytes);
    let word = cursor.u16_be().unwrap();
    assert_eq!(word.value, 0x1234);
    assert_eq!((word.ss, word.es), (0, 200));

    assert_eq!(cursor.u8().unwrap().value, 0x56);
    assert!(cursor.u8().is_none());
    assert!(cursor.u16_le().is_none());

    let mut cursor = ByteCursor::new(&bytes);
    assert_eq!(cursor.u16_le().unwrap().value, 0x3412);
}
