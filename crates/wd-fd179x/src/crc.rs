//! CRC-16/CCITT engine for on-disk address and data fields.
//!
//! Polynomial 0x1021, initial value 0xFFFF, big-endian bit order, no final
//! inversion. Every ID and data field on disk carries two trailing CRC
//! bytes; feeding the covered bytes plus those two trailing bytes through
//! the accumulator yields zero exactly when the field is intact.

/// CRC-16/CCITT accumulator.
///
/// The accumulator is only meaningful between the reset at the start of a
/// field and the point the field's trailing CRC bytes are consumed. The
/// controller resets it at every address mark rather than reusing it
/// across fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16(u16);

impl Crc16 {
    /// Accumulator in its reset state.
    #[must_use]
    pub const fn new() -> Self {
        Self(0xFFFF)
    }

    /// Accumulator primed with the three 0xA1 sync bytes that precede
    /// every double-density address mark. Equal to feeding 0xA1 three
    /// times into a fresh accumulator.
    #[must_use]
    pub const fn preset_a1a1a1() -> Self {
        Self(0xCDB4)
    }

    /// Feed one byte into the accumulator.
    pub const fn feed(&mut self, byte: u8) {
        let mut crc = self.0 ^ ((byte as u16) << 8);
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
            bit += 1;
        }
        self.0 = crc;
    }

    /// Current 16-bit remainder.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// High byte of the remainder (written to disk first).
    #[must_use]
    pub const fn hi(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Low byte of the remainder.
    #[must_use]
    pub const fn lo(self) -> u8 {
        self.0 as u8
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}
