//! Bitstream reading for fixed-layout register fields.
//!
//! Card registers such as the SD CID and CSD are defined as big-endian
//! bit fields over a small byte buffer; this wrapper keeps the reads
//! bounds-checked with useful positions in the error text.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, UnsignedInteger};

#[derive(Debug)]
pub struct BitFieldReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type SliceBitReader<'a> = BitFieldReader<io::Cursor<&'a [u8]>>;

impl<R> BitFieldReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_n({}): out of bounds bits at {}",
                    n,
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            )),
            Err(e) => Err(e),
        }
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        self.bs.skip(n)
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        let pos = self.bs.position_in_bits()?;

        Ok(self.len.saturating_sub(pos))
    }
}

impl<'a> SliceBitReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self::new(io::Cursor::new(buf), buf.len() as u64)
    }
}

#[test]
fn field_reads() {
    let buf = [0b1010_0110u8, 0x5A];
    let mut r = SliceBitReader::from_slice(&buf);

    assert!(r.get().unwrap());
    assert_eq!(r.get_n::<u8>(3).unwrap(), 0b010);
    assert_eq!(r.get_n::<u16>(12).unwrap(), 0b0110_0101_1010);
    assert_eq!(r.available().unwrap(), 0);
    assert!(r.get().is_err());
}
