//! Command execution state machine.
//!
//! A command runs as a chain of phases. Each phase does a bounded amount
//! of synchronous work and then either falls through to the next phase or
//! parks the controller on a one-shot delay (a byte cell, a head-step
//! interval, a settle time, the gap to the next ID address mark). When
//! the delay expires the tick path re-enters [`Wd179x::run`] and the
//! chain resumes. Terminal transitions clear BUSY and raise INTRQ exactly
//! once, through [`Wd179x::finish`].

use emu_core::Ticks;

use crate::crc::Crc16;
use crate::drive::DiskDrive;
use crate::{
    Diagnostic, HostLines, Wd179x, STATUS_BUSY, STATUS_CRC_ERROR, STATUS_LOST_DATA,
    STATUS_RECORD_NOT_FOUND, STATUS_RECORD_TYPE, STATUS_SEEK_ERROR, STATUS_WRITE_PROTECT,
};

// Type I flag bits.
const CMD_RATE_MASK: u8 = 0x03;
const CMD_VERIFY: u8 = 0x04;
const CMD_UPDATE_TRACK: u8 = 0x10;

// Type II/III flag bits.
const CMD_DELETED_DAM: u8 = 0x01;
const CMD_SIDE_COMPARE: u8 = 0x02;
const CMD_SETTLE: u8 = 0x04;
const CMD_LENGTH_FLAG: u8 = 0x08;
const CMD_MULTI_SECTOR: u8 = 0x10;

/// Head step rates in milliseconds, indexed by the command's rate bits.
const STEP_RATES_MS: [u64; 4] = [6, 12, 20, 30];

/// Head settle delay applied when a Type II/III command sets the E bit.
const SETTLE_MS: u64 = 30;

/// ID searches give up after this many index holes.
const SEARCH_REVOLUTIONS: u32 = 5;

/// Byte cells scanned for a data address mark after a matching ID field
/// before the search restarts from the next ID field.
const DAM_WINDOW_SD: u8 = 30;
const DAM_WINDOW_DD: u8 = 43;

/// Sector sizes in bytes, indexed by the length-flag row and the ID
/// field's size code. Variants without the length flag always use row 1.
const SECTOR_SIZES: [[i32; 4]; 2] = [[256, 512, 1024, 128], [128, 256, 512, 1024]];

/// Where the state machine resumes when its pending delay expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Idle; waiting for a command register write.
    AcceptCommand,
    TypeIDispatch,
    /// Compare the data register (seek target) against the track register.
    SeekCompare,
    /// Issue one head step in the latched direction.
    StepHead,
    /// Step sequence done; verify against an ID field if V is set.
    VerifyTrack,
    /// Wait out the gap to the next ID address mark.
    FindIdField,
    /// An ID address mark is under the head; read and qualify the field.
    CheckIdField,
    /// Scan byte cells for the data address mark.
    ReadSectorFindDam,
    /// Transfer one data byte to the data register.
    ReadSectorByte,
    /// Data field done; consume and check the trailing CRC.
    ReadSectorCrc,
    /// Raise DRQ for the first byte of a sector write.
    WriteSectorDrq,
    /// First-byte deadline passed; lay down the gap and address mark.
    WriteSectorGap,
    /// Write one data byte from the data register.
    WriteSectorByte,
    /// Transfer one ID field byte for READ ADDRESS.
    ReadAddressByte,
    TypeIIDispatch,
    TypeIIIDispatch,
    /// WRITE TRACK: wait for the index hole before streaming.
    WriteTrackWaitIndex,
    /// WRITE TRACK: interpret and write one format byte.
    WriteTrackByte,
}

impl<D: DiskDrive, H: HostLines> Wd179x<D, H> {
    /// Advance the state machine until it parks on a delay or goes idle.
    pub(crate) fn run(&mut self) {
        while self.delay.is_none() {
            match self.phase {
                Phase::AcceptCommand => return,
                Phase::TypeIDispatch => self.type1_dispatch(),
                Phase::SeekCompare => self.seek_compare(),
                Phase::StepHead => self.step_head(),
                Phase::VerifyTrack => self.verify_track(),
                Phase::FindIdField => self.find_id_field(),
                Phase::CheckIdField => self.check_id_field(),
                Phase::ReadSectorFindDam => self.read_sector_find_dam(),
                Phase::ReadSectorByte => self.read_sector_byte(),
                Phase::ReadSectorCrc => self.read_sector_crc(),
                Phase::WriteSectorDrq => self.write_sector_drq(),
                Phase::WriteSectorGap => self.write_sector_gap(),
                Phase::WriteSectorByte => self.write_sector_byte(),
                Phase::ReadAddressByte => self.read_address_byte(),
                Phase::TypeIIDispatch => self.type2_dispatch(),
                Phase::TypeIIIDispatch => self.type3_dispatch(),
                Phase::WriteTrackWaitIndex => self.write_track_wait_index(),
                Phase::WriteTrackByte => self.write_track_byte(),
            }
        }
    }

    /// Park on a delay and resume in `next` when it expires. A zero delay
    /// still yields to the scheduler for one tick.
    fn schedule(&mut self, delay: Ticks, next: Phase) {
        self.phase = next;
        self.delay = Some(if delay == Ticks::ZERO {
            Ticks::new(1)
        } else {
            delay
        });
    }

    /// Terminal transition: clear BUSY, go idle, raise INTRQ.
    fn finish(&mut self) {
        self.delay = None;
        self.status &= !STATUS_BUSY;
        self.phase = Phase::AcceptCommand;
        self.set_intrq(true);
    }

    fn byte_time(&self) -> Ticks {
        self.drive.time_to_next_byte()
    }

    /// Read one on-disk byte and fold it into the CRC accumulator.
    fn read_field_byte(&mut self) -> u8 {
        let byte = self.drive.read_byte();
        self.crc.feed(byte);
        byte
    }

    /// Write one on-disk byte and fold it into the CRC accumulator.
    fn write_field_byte(&mut self, byte: u8) {
        self.drive.write_byte(byte);
        self.crc.feed(byte);
    }

    /// Reset the CRC to the state an address mark is computed from: in
    /// double density the three 0xA1 sync bytes are already folded in.
    fn prime_mark_crc(&mut self) {
        self.crc = if self.double_density {
            Crc16::preset_a1a1a1()
        } else {
            Crc16::new()
        };
    }

    /// Latch the head side from the command byte. Parts with a
    /// side-select output drive it from bit 1; the others carry the
    /// expected side in bit 3 for comparison only.
    fn select_side(&mut self) {
        if self.variant.has_sso() {
            self.side = (self.command >> 1) & 1;
            self.drive.set_side(self.side);
        } else {
            self.side = (self.command >> 3) & 1;
        }
    }

    /// Whether the ID field's side byte participates in sector matching.
    fn compare_side(&self) -> bool {
        self.variant.has_sso() || self.command & CMD_SIDE_COMPARE != 0
    }

    /// Sector size from the ID field's size code.
    fn sector_size(&self, size_code: u8) -> i32 {
        let row = if self.variant.has_length_flag() {
            usize::from(self.command & CMD_LENGTH_FLAG != 0)
        } else {
            1
        };
        SECTOR_SIZES[row][usize::from(size_code & 0x03)]
    }

    fn search_exhausted(&self) -> bool {
        self.drive.index_count().wrapping_sub(self.index_base) >= SEARCH_REVOLUTIONS
    }

    fn type1_dispatch(&mut self) {
        self.status |= STATUS_BUSY;
        self.status &= !(STATUS_CRC_ERROR | STATUS_SEEK_ERROR);
        self.status_type1 = true;
        self.set_drq(false);
        self.step_delay = self
            .clock
            .millis(STEP_RATES_MS[usize::from(self.command & CMD_RATE_MASK)]);
        self.is_step_command = self.command >= 0x20;

        match self.command & 0xE0 {
            0x40 => {
                // STEP-IN
                self.direction = 1;
                self.drive.set_direction(true);
            }
            0x60 => {
                // STEP-OUT
                self.direction = -1;
                self.drive.set_direction(false);
            }
            _ => {}
        }

        if self.is_step_command {
            self.phase = Phase::StepHead;
        } else {
            if self.command < 0x10 {
                // RESTORE seeks toward an impossibly high track register
                // until the TRACK0 line cuts the sequence short.
                self.track = 0xFF;
                self.data = 0x00;
            }
            self.phase = Phase::SeekCompare;
        }
    }

    fn seek_compare(&mut self) {
        if self.data == self.track {
            self.phase = Phase::VerifyTrack;
            return;
        }
        self.direction = if self.data > self.track { 1 } else { -1 };
        self.drive.set_direction(self.direction > 0);
        self.phase = Phase::StepHead;
    }

    fn step_head(&mut self) {
        if !self.is_step_command || self.command & CMD_UPDATE_TRACK != 0 {
            self.track = self.track.wrapping_add(self.direction as u8);
        }
        if self.direction < 0 && self.drive.track0() {
            // TRACK0 overrides the register arithmetic outright.
            self.track = 0;
            self.phase = Phase::VerifyTrack;
            return;
        }
        self.drive.step();
        let next = if self.is_step_command {
            Phase::VerifyTrack
        } else {
            Phase::SeekCompare
        };
        self.schedule(self.step_delay, next);
    }

    fn verify_track(&mut self) {
        if self.command & CMD_VERIFY == 0 {
            self.finish();
            return;
        }
        self.index_base = self.drive.index_count();
        self.phase = Phase::FindIdField;
    }

    fn find_id_field(&mut self) {
        if self.search_exhausted() {
            self.status |= if self.command < 0x80 {
                STATUS_SEEK_ERROR
            } else {
                STATUS_RECORD_NOT_FOUND
            };
            self.finish();
            return;
        }
        self.schedule(self.drive.time_to_next_idam(), Phase::CheckIdField);
    }

    fn check_id_field(&mut self) {
        if !self.drive.locate_next_idam() {
            self.phase = Phase::FindIdField;
            return;
        }
        self.prime_mark_crc();
        self.crc.feed(0xFE);

        if self.command < 0x80 {
            // Type I verify: only the track byte matters.
            let id_track = self.read_field_byte();
            for _ in 0..5 {
                let _ = self.read_field_byte();
            }
            if self.crc.get() != 0 {
                self.status |= STATUS_CRC_ERROR;
                self.phase = Phase::FindIdField;
                return;
            }
            if id_track == self.track {
                self.status &= !STATUS_CRC_ERROR;
                self.finish();
            } else {
                self.phase = Phase::FindIdField;
            }
            return;
        }

        if self.command & 0xF0 == 0xC0 {
            // READ ADDRESS takes the next ID field unconditionally.
            self.bytes_remaining = 6;
            self.schedule(self.byte_time(), Phase::ReadAddressByte);
            return;
        }

        let id_track = self.read_field_byte();
        let id_side = self.read_field_byte();
        let id_sector = self.read_field_byte();
        let id_size = self.read_field_byte();
        let _ = self.read_field_byte();
        let _ = self.read_field_byte();

        if id_track != self.track || id_sector != self.sector {
            self.phase = Phase::FindIdField;
            return;
        }
        if self.compare_side() && id_side != self.side {
            self.phase = Phase::FindIdField;
            return;
        }
        if self.crc.get() != 0 {
            self.status |= STATUS_CRC_ERROR;
            self.phase = Phase::FindIdField;
            return;
        }
        self.status &= !STATUS_CRC_ERROR;
        self.bytes_remaining = self.sector_size(id_size);

        if self.command < 0xA0 {
            self.dam_window = if self.double_density {
                DAM_WINDOW_DD
            } else {
                DAM_WINDOW_SD
            };
            self.schedule(self.byte_time(), Phase::ReadSectorFindDam);
        } else {
            // Two byte cells pass before the host owes the first byte.
            self.schedule(self.byte_time() * 2, Phase::WriteSectorDrq);
        }
    }

    fn read_sector_find_dam(&mut self) {
        if self.dam_window == 0 {
            // No mark within the window: hunt for the ID field again.
            self.phase = Phase::FindIdField;
            return;
        }
        self.dam_window -= 1;
        let byte = self.drive.read_byte();
        if byte == 0xFB || byte == 0xF8 {
            self.deleted_dam = byte == 0xF8;
            self.prime_mark_crc();
            self.crc.feed(byte);
            self.schedule(self.byte_time(), Phase::ReadSectorByte);
        } else {
            self.schedule(self.byte_time(), Phase::ReadSectorFindDam);
        }
    }

    fn read_sector_byte(&mut self) {
        if self.drq {
            self.status |= STATUS_LOST_DATA;
        }
        self.data = self.read_field_byte();
        self.set_drq(true);
        self.bytes_remaining -= 1;
        let next = if self.bytes_remaining > 0 {
            Phase::ReadSectorByte
        } else {
            Phase::ReadSectorCrc
        };
        self.schedule(self.byte_time(), next);
    }

    fn read_sector_crc(&mut self) {
        let _ = self.read_field_byte();
        let _ = self.read_field_byte();
        if self.crc.get() != 0 {
            self.status |= STATUS_CRC_ERROR;
        }
        if self.deleted_dam {
            self.status |= STATUS_RECORD_TYPE;
        }
        self.finish();
    }

    fn write_sector_drq(&mut self) {
        self.set_drq(true);
        // Eight byte cells to service DRQ before the write gate opens.
        self.schedule(self.byte_time() * 8, Phase::WriteSectorGap);
    }

    fn write_sector_gap(&mut self) {
        if self.drq {
            self.status |= STATUS_LOST_DATA;
            self.finish();
            return;
        }
        self.drive.skip_byte();
        if self.double_density {
            for _ in 0..11 {
                self.drive.write_byte(0x00);
            }
            self.crc = Crc16::new();
            for _ in 0..3 {
                self.write_field_byte(0xA1);
            }
        } else {
            for _ in 0..6 {
                self.drive.write_byte(0x00);
            }
            self.crc = Crc16::new();
        }
        let dam = if self.command & CMD_DELETED_DAM != 0 {
            0xF8
        } else {
            0xFB
        };
        self.write_field_byte(dam);
        self.schedule(self.byte_time(), Phase::WriteSectorByte);
    }

    fn write_sector_byte(&mut self) {
        let byte = if self.drq {
            // Host missed the deadline: a zero goes to disk instead.
            self.status |= STATUS_LOST_DATA;
            0x00
        } else {
            self.data
        };
        self.write_field_byte(byte);
        self.bytes_remaining -= 1;
        if self.bytes_remaining > 0 {
            self.set_drq(true);
            self.schedule(self.byte_time(), Phase::WriteSectorByte);
        } else {
            let (hi, lo) = (self.crc.hi(), self.crc.lo());
            self.drive.write_byte(hi);
            self.drive.write_byte(lo);
            self.drive.write_byte(0xFF);
            self.finish();
        }
    }

    fn read_address_byte(&mut self) {
        if self.drq {
            self.status |= STATUS_LOST_DATA;
        }
        let byte = self.read_field_byte();
        if self.bytes_remaining == 6 {
            // The ID's track byte lands in the sector register at the end.
            self.track_tmp = byte;
        }
        self.data = byte;
        self.set_drq(true);
        self.bytes_remaining -= 1;
        if self.bytes_remaining > 0 {
            self.schedule(self.byte_time(), Phase::ReadAddressByte);
        } else {
            if self.crc.get() != 0 {
                self.status |= STATUS_CRC_ERROR;
            }
            self.sector = self.track_tmp;
            self.finish();
        }
    }

    fn type2_dispatch(&mut self) {
        self.status |= STATUS_BUSY;
        self.status &= !(STATUS_LOST_DATA
            | STATUS_RECORD_NOT_FOUND
            | STATUS_CRC_ERROR
            | STATUS_RECORD_TYPE
            | STATUS_WRITE_PROTECT);
        self.status_type1 = false;
        self.set_drq(false);
        self.deleted_dam = false;

        if !self.drive.ready() {
            self.finish();
            return;
        }
        if self.command >= 0xA0 && self.drive.write_protect() {
            self.status |= STATUS_WRITE_PROTECT;
            self.finish();
            return;
        }
        self.select_side();
        if self.command & CMD_MULTI_SECTOR != 0 {
            self.diagnostic = Some(Diagnostic::MultiSectorIgnored);
        }
        self.index_base = self.drive.index_count();
        if self.command & CMD_SETTLE != 0 {
            self.schedule(self.clock.millis(SETTLE_MS), Phase::FindIdField);
        } else {
            self.phase = Phase::FindIdField;
        }
    }

    fn type3_dispatch(&mut self) {
        self.status |= STATUS_BUSY;
        self.status &=
            !(STATUS_LOST_DATA | STATUS_RECORD_NOT_FOUND | STATUS_CRC_ERROR | STATUS_WRITE_PROTECT);
        self.status_type1 = false;
        self.set_drq(false);

        if !self.drive.ready() {
            self.finish();
            return;
        }

        if self.command >= 0xF0 {
            // WRITE TRACK
            if self.drive.write_protect() {
                self.status |= STATUS_WRITE_PROTECT;
                self.finish();
                return;
            }
            self.select_side();
            self.sync_run = false;
            self.index_base = self.drive.index_count();
            // The host must load the first format byte before the hole.
            self.set_drq(true);
            if self.command & CMD_SETTLE != 0 {
                self.schedule(self.clock.millis(SETTLE_MS), Phase::WriteTrackWaitIndex);
            } else {
                self.phase = Phase::WriteTrackWaitIndex;
            }
            return;
        }

        // READ ADDRESS
        self.select_side();
        self.index_base = self.drive.index_count();
        if self.command & CMD_SETTLE != 0 {
            self.schedule(self.clock.millis(SETTLE_MS), Phase::FindIdField);
        } else {
            self.phase = Phase::FindIdField;
        }
    }

    fn write_track_wait_index(&mut self) {
        if self.drive.index_count() != self.index_base {
            if self.drq {
                // First byte never arrived; nothing gets written.
                self.status |= STATUS_LOST_DATA;
                self.finish();
                return;
            }
            self.index_base = self.drive.index_count();
            self.phase = Phase::WriteTrackByte;
            return;
        }
        self.drive.skip_byte();
        self.schedule(self.byte_time(), Phase::WriteTrackWaitIndex);
    }

    fn write_track_byte(&mut self) {
        if self.drive.index_count() != self.index_base {
            // Full revolution written.
            self.finish();
            return;
        }
        let byte = if self.drq {
            self.status |= STATUS_LOST_DATA;
            0x00
        } else {
            self.data
        };
        self.set_drq(true);

        let was_sync_run = self.sync_run;
        self.sync_run = self.double_density && byte == 0xF5;

        if self.double_density {
            match byte {
                0xF5 => {
                    // Sync byte: written as 0xA1; a run of them restarts
                    // the CRC once, at the first byte of the run.
                    if !was_sync_run {
                        self.crc = Crc16::new();
                    }
                    self.write_field_byte(0xA1);
                }
                0xF6 => self.drive.write_byte(0xC2),
                0xF7 => {
                    let (hi, lo) = (self.crc.hi(), self.crc.lo());
                    self.drive.write_byte(hi);
                    self.drive.write_byte(lo);
                }
                0xFE => {
                    self.drive.write_idam();
                    self.crc.feed(0xFE);
                }
                _ => self.write_field_byte(byte),
            }
        } else {
            match byte {
                0xF7 => {
                    let (hi, lo) = (self.crc.hi(), self.crc.lo());
                    self.drive.write_byte(hi);
                    self.drive.write_byte(lo);
                }
                0xFE => {
                    self.drive.write_idam();
                    self.crc = Crc16::new();
                    self.crc.feed(0xFE);
                }
                0xF8..=0xFB => {
                    self.crc = Crc16::new();
                    self.write_field_byte(byte);
                }
                0xFC => self.drive.write_byte(0xFC),
                _ => self.write_field_byte(byte),
            }
        }
        self.schedule(self.byte_time(), Phase::WriteTrackByte);
    }
}
