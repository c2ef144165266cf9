//! Scripted drive used by the unit tests.

use emu_core::Ticks;

use crate::crc::Crc16;
use crate::drive::DiskDrive;

/// Byte cell length in ticks at a 1 MHz controller clock.
pub(crate) const BYTE_TICKS: u64 = 32;

/// In-memory single-track drive with recorded stimulus.
///
/// The cell array is cyclic; the index hole sits at offset 0. Steps and
/// writes are recorded so tests can assert on the exact pin activity a
/// command produced.
pub(crate) struct FakeDrive {
    pub cells: Vec<u8>,
    pub idams: Vec<usize>,
    pub pos: usize,
    pub index: u32,
    pub cylinder: u8,
    pub cylinders: u8,
    pub side: u8,
    pub inward: bool,
    pub double_density: bool,
    pub ready: bool,
    pub write_protect: bool,
    pub steps: Vec<i8>,
    pub writes: Vec<u8>,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self::with_track_len(1024)
    }

    pub fn with_track_len(len: usize) -> Self {
        Self {
            cells: vec![0; len],
            idams: Vec::new(),
            pos: 0,
            index: 0,
            cylinder: 10,
            cylinders: 80,
            side: 0,
            inward: false,
            double_density: false,
            ready: true,
            write_protect: false,
            steps: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Lay down one ID field plus data field starting at `at`. Returns the
    /// offset of the first free cell after the data field's CRC.
    pub fn format_sector(
        &mut self,
        at: usize,
        track: u8,
        side: u8,
        sector: u8,
        size_code: u8,
        dam: u8,
        payload: &[u8],
    ) -> usize {
        let mut pos = at;
        let mut put = |cells: &mut Vec<u8>, byte: u8| {
            let at = pos % cells.len();
            cells[at] = byte;
            pos += 1;
        };

        let mut crc = if self.double_density {
            Crc16::preset_a1a1a1()
        } else {
            Crc16::new()
        };
        self.idams.push(at % self.cells.len());
        put(&mut self.cells, 0xFE);
        crc.feed(0xFE);
        for byte in [track, side, sector, size_code] {
            put(&mut self.cells, byte);
            crc.feed(byte);
        }
        put(&mut self.cells, crc.hi());
        put(&mut self.cells, crc.lo());

        // Gap between ID and data fields.
        for _ in 0..8 {
            put(&mut self.cells, 0x00);
        }

        let mut crc = if self.double_density {
            Crc16::preset_a1a1a1()
        } else {
            Crc16::new()
        };
        put(&mut self.cells, dam);
        crc.feed(dam);
        for &byte in payload {
            put(&mut self.cells, byte);
            crc.feed(byte);
        }
        put(&mut self.cells, crc.hi());
        put(&mut self.cells, crc.lo());
        pos
    }

    fn advance(&mut self) {
        self.pos += 1;
        if self.pos >= self.cells.len() {
            self.pos = 0;
            self.index += 1;
        }
    }

    fn idam_distance(&self) -> Option<usize> {
        let len = self.cells.len();
        (0..len).find(|d| self.idams.contains(&((self.pos + d) % len)))
    }
}

impl DiskDrive for FakeDrive {
    fn set_direction(&mut self, inward: bool) {
        self.inward = inward;
    }

    fn step(&mut self) {
        if self.inward {
            self.steps.push(1);
            self.cylinder = (self.cylinder + 1).min(self.cylinders - 1);
        } else {
            self.steps.push(-1);
            self.cylinder = self.cylinder.saturating_sub(1);
        }
    }

    fn set_side(&mut self, side: u8) {
        self.side = side;
    }

    fn set_density(&mut self, double: bool) {
        self.double_density = double;
    }

    fn read_byte(&mut self) -> u8 {
        let byte = self.cells[self.pos];
        self.advance();
        byte
    }

    fn write_byte(&mut self, byte: u8) {
        self.cells[self.pos] = byte;
        self.idams.retain(|&at| at != self.pos);
        self.writes.push(byte);
        self.advance();
    }

    fn skip_byte(&mut self) {
        self.advance();
    }

    fn write_idam(&mut self) {
        self.cells[self.pos] = 0xFE;
        if !self.idams.contains(&self.pos) {
            self.idams.push(self.pos);
        }
        self.writes.push(0xFE);
        self.advance();
    }

    fn time_to_next_byte(&self) -> Ticks {
        Ticks::new(BYTE_TICKS)
    }

    fn time_to_next_idam(&self) -> Ticks {
        let cells = self.idam_distance().unwrap_or(self.cells.len());
        Ticks::new(cells as u64 * BYTE_TICKS)
    }

    fn locate_next_idam(&mut self) -> bool {
        match self.idam_distance() {
            Some(d) => {
                for _ in 0..=d {
                    self.advance();
                }
                true
            }
            None => {
                for _ in 0..self.cells.len() {
                    self.advance();
                }
                false
            }
        }
    }

    fn ready(&self) -> bool {
        self.ready
    }

    fn track0(&self) -> bool {
        self.cylinder == 0
    }

    fn index_pulse(&self) -> bool {
        self.pos < 4
    }

    fn index_count(&self) -> u32 {
        self.index
    }

    fn write_protect(&self) -> bool {
        self.write_protect
    }
}
