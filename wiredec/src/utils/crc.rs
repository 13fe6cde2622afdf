//! CRC validation utilities for protocol frames.
//!
//! Provides a generic bit- and byte-oriented CRC engine parameterized by
//! width, polynomial, initial value, reflection and final XOR, together
//! with the named algorithms used by the bundled decoders.
//!
//! The running register is kept top-aligned in a `u32` so a single table
//! serves every width up to 32; `finalize` shifts the result back down.

/// CRC algorithm specification in Rocksoft parameter form.
pub struct Algorithm {
    pub width: u32,
    pub poly: u32,
    pub init: u32,
    pub refin: bool,
    pub refout: bool,
    pub xorout: u32,
}

/// CRC-7 protecting SD command and response tokens.
pub const CRC_7_SD_ALG: Algorithm = Algorithm {
    width: 7,
    poly: 0x09,
    init: 0x00,
    refin: false,
    refout: false,
    xorout: 0x00,
};

/// CRC-8 used by PJON-family single-wire packets.
pub const CRC_8_PJON_ALG: Algorithm = Algorithm {
    width: 8,
    poly: 0x97,
    init: 0x00,
    refin: false,
    refout: false,
    xorout: 0x00,
};

/// CRC-15 protecting classic CAN frames.
pub const CRC_15_CAN_ALG: Algorithm = Algorithm {
    width: 15,
    poly: 0x4599,
    init: 0x00,
    refin: false,
    refout: false,
    xorout: 0x00,
};

/// CRC-16 protecting Modbus RTU application data units.
pub const CRC_16_MODBUS_ALG: Algorithm = Algorithm {
    width: 16,
    poly: 0x8005,
    init: 0xFFFF,
    refin: true,
    refout: true,
    xorout: 0x0000,
};

/// CRC-32 as used by Ethernet and data-block checksums.
pub const CRC_32_IEEE_ALG: Algorithm = Algorithm {
    width: 32,
    poly: 0x04C1_1DB7,
    init: 0xFFFF_FFFF,
    refin: true,
    refout: true,
    xorout: 0xFFFF_FFFF,
};

/// Reverses the low `width` bits of `value`.
#[inline(always)]
const fn reflect(mut value: u32, width: u32) -> u32 {
    let mut out = 0u32;
    let mut i = 0;
    while i < width {
        out = (out << 1) | (value & 1);
        value >>= 1;
        i += 1;
    }

    out
}

/// Advances a top-aligned register by eight message bits.
#[inline(always)]
const fn crc_byte(poly_top: u32, mut value: u32) -> u32 {
    let mut i = 0;
    while i < 8 {
        value = (value << 1) ^ (((value >> 31) & 1) * poly_top);
        i += 1;
    }

    value
}

#[inline(always)]
const fn crc_table(poly_top: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc_byte(poly_top, (i as u32) << 24);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc {
    pub width: u32,
    pub poly: u32,
    init: u32,
    refin: bool,
    refout: bool,
    xorout: u32,
    table: [u32; 256],
}

impl Crc {
    pub const fn new(algorithm: &Algorithm) -> Self {
        Self {
            width: algorithm.width,
            poly: algorithm.poly,
            init: algorithm.init,
            refin: algorithm.refin,
            refout: algorithm.refout,
            xorout: algorithm.xorout,
            table: crc_table(algorithm.poly << (32 - algorithm.width)),
        }
    }

    /// Initial value of the top-aligned running register.
    #[inline(always)]
    pub const fn init(&self) -> u32 {
        self.init << (32 - self.width)
    }

    const fn table_entry(&self, index: u32) -> u32 {
        self.table[(index & 0xFF) as usize]
    }

    /// Feeds whole bytes into a top-aligned running register.
    #[inline(always)]
    pub const fn update(&self, mut crc: u32, bytes: &[u8]) -> u32 {
        let mut i = 0;

        while i < bytes.len() {
            let byte = if self.refin {
                (reflect(bytes[i] as u32, 8)) as u8
            } else {
                bytes[i]
            };
            crc = self.table_entry((crc >> 24) ^ byte as u32) ^ (crc << 8);
            i += 1;
        }

        crc
    }

    /// Feeds a single message bit, MSB-first. Only meaningful for
    /// unreflected algorithms; bit-serial protocols such as CAN use this.
    #[inline(always)]
    pub const fn update_bit(&self, crc: u32, bit: bool) -> u32 {
        let fed = crc ^ ((bit as u32) << 31);
        let poly_top = self.poly << (32 - self.width);

        (fed << 1) ^ (((fed >> 31) & 1) * poly_top)
    }

    /// Collapses the running register into the final width-bit checksum.
    #[inline(always)]
    pub const fn finalize(&self, crc: u32) -> u32 {
        let value = crc >> (32 - self.width);
        let value = if self.refout {
            reflect(value, self.width)
        } else {
            value
        };

        (value ^ self.xorout) & (u32::MAX >> (32 - self.width))
    }

    /// One-shot checksum over a byte slice.
    #[inline(always)]
    pub const fn checksum(&self, bytes: &[u8]) -> u32 {
        self.finalize(self.update(self.init(), bytes))
    }
}

/// Parity discipline for framed serial data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParityMode {
    #[default]
    None,
    Odd,
    Even,
    Zero,
    One,
    Ignore,
}

/// Checks a received parity bit against the data bits it covers.
///
/// `ParityMode::None` frames carry no parity bit at all, so a check
/// against one is vacuously true, same as `Ignore`.
pub fn parity_ok(mode: ParityMode, value: u16, parity_bit: bool) -> bool {
    let ones = value.count_ones() + parity_bit as u32;

    match mode {
        ParityMode::None | ParityMode::Ignore => true,
        ParityMode::Odd => ones % 2 == 1,
        ParityMode::Even => ones % 2 == 0,
        ParityMode::Zero => !parity_bit,
        ParityMode::One => parity_bit,
    }
}

/// Longitudinal redundancy check: XOR of all bytes.
pub fn xor_lrc(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

#[test]
fn crc7_sd_tokens() {
    let crc = Crc::new(&CRC_7_SD_ALG);

    // CMD0 with zero argument, then CMD8 with the 0x1AA check pattern.
    assert_eq!(crc.checksum(&[0x40, 0x00, 0x00, 0x00, 0x00]), 0x4A);
    assert_eq!(crc.checksum(&[0x48, 0x00, 0x00, 0x01, 0xAA]), 0x43);
    assert_eq!(crc.checksum(b"123456789"), 0x75);
}

#[test]
fn crc16_modbus_vectors() {
    let crc = Crc::new(&CRC_16_MODBUS_ALG);

    assert_eq!(crc.checksum(b"123456789"), 0x4B37);
    // Read Holding Registers request: slave 1, address 0, quantity 1.
    assert_eq!(crc.checksum(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]), 0x0A84);
}

#[test]
fn crc32_ieee_vector() {
    let crc = Crc::new(&CRC_32_IEEE_ALG);

    assert_eq!(crc.checksum(b"123456789"), 0xCBF4_3926);
}

#[test]
fn crc15_can_vector() {
    let crc = Crc::new(&CRC_15_CAN_ALG);

    assert_eq!(crc.checksum(b"123456789"), 0x059E);
}

#[test]
fn crc8_pjon_single_byte() {
    let crc = Crc::new(&CRC_8_PJON_ALG);

    assert_eq!(crc.checksum(&[0x01]), 0x97);
}

#[test]
fn bit_feed_matches_byte_feed() {
    let crc = Crc::new(&CRC_15_CAN_ALG);
    let bytes = [0x12u8, 0x34, 0x56];

    let mut reg = crc.init();
    for byte in bytes {
        for i in (0..8).rev() {
            reg = crc.update_bit(reg, (byte >> i) & 1 != 0);
        }
    }

    assert_eq!(crc.finalize(reg), crc.checksum(&bytes));
}

#[test]
fn appended_checksum_leaves_zero_remainder() {
    // Holds for unreflected algorithms with zero init and xorout.
    let crc = Crc::new(&CRC_7_SD_ALG);
    let msg = [0x40u8, 0x00, 0x00, 0x00, 0x00];
    let sum = crc.checksum(&msg);

    let mut reg = crc.init();
    reg = crc.update(reg, &msg);
    for i in (0..7).rev() {
        reg = crc.update_bit(reg, (sum >> i) & 1 != 0);
    }

    assert_eq!(crc.finalize(reg), 0);
}

#[test]
fn parity_modes() {
    assert!(parity_ok(ParityMode::Even, 0b0110_0001, true));
    assert!(!parity_ok(ParityMode::Even, 0b0110_0001, false));
    assert!(parity_ok(ParityMode::Odd, 0b0110_0001, false));
    assert!(parity_ok(ParityMode::Zero, 0xFF, false));
    assert!(parity_ok(ParityMode::Ignore, 0xFF, true));
}

#[test]
fn lrc_xor() {
    assert_eq!(xor_lrc(&[0x01, 0x02, 0x04]), 0x07);
    assert_eq!(xor_lrc(&[]), 0);
}
