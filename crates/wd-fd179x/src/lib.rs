//! Western Digital FD179x floppy disk controller.
//!
//! Emulates the WD1791/1793/1795/1797 family as seen from the host bus:
//! five programmer-visible registers, the three command classes, and the
//! per-byte / per-revolution timing contract. The drive mechanism and the
//! event scheduler live outside this crate: the controller consumes a
//! [`DiskDrive`] and is advanced by [`Tickable`] ticks, suspending itself
//! on an internal one-shot delay whenever it must wait for a byte cell,
//! an index hole or a head-settle interval.
//!
//! # Registers (ports 0-3)
//!
//! | Port | Read           | Write            |
//! |------|----------------|------------------|
//! | 0    | Status         | Command          |
//! | 1    | Track          | Track            |
//! | 2    | Sector         | Sector           |
//! | 3    | Data (clears DRQ) | Data (clears DRQ) |
//!
//! Reading status clears INTRQ unless an immediate force-interrupt is
//! latched. The WD1791 and WD1795 invert the data bus; all port traffic
//! is XORed with the variant's inversion mask.
//!
//! # Command classes
//!
//! - **Type I** (0x00-0x7F): RESTORE, SEEK, STEP, STEP-IN, STEP-OUT,
//!   optionally followed by track verification against ID fields.
//! - **Type II** (0x80-0xBF): READ SECTOR, WRITE SECTOR.
//! - **Type III** (0xC0-0xFF): READ ADDRESS, READ TRACK (unsupported,
//!   terminates immediately), FORCE INTERRUPT (0xD0-0xDF), WRITE TRACK.

pub mod crc;
pub mod drive;
mod sequencer;

#[cfg(test)]
mod testutil;

pub use crc::Crc16;
pub use drive::DiskDrive;

use emu_core::{MasterClock, Tickable, Ticks};
use sequencer::Phase;

/// Status register bits. Bits 1, 2 and 5 are overloaded: Type I commands
/// report INDEX / TRACK0 / HEAD-LOADED where Type II/III report DRQ /
/// LOST-DATA / RECORD-TYPE.
pub const STATUS_BUSY: u8 = 0x01;
pub const STATUS_DRQ: u8 = 0x02;
pub const STATUS_INDEX: u8 = 0x02;
pub const STATUS_LOST_DATA: u8 = 0x04;
pub const STATUS_TRACK0: u8 = 0x04;
pub const STATUS_CRC_ERROR: u8 = 0x08;
pub const STATUS_RECORD_NOT_FOUND: u8 = 0x10;
pub const STATUS_SEEK_ERROR: u8 = 0x10;
pub const STATUS_RECORD_TYPE: u8 = 0x20;
pub const STATUS_WRITE_PROTECT: u8 = 0x40;
pub const STATUS_NOT_READY: u8 = 0x80;

/// Which part number is being emulated.
///
/// The four parts share one command set but differ in three wiring
/// details: whether a side-select output exists, whether Type II/III
/// commands carry a sector-length flag bit, and whether the data bus is
/// inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Wd1791,
    Wd1793,
    Wd1795,
    Wd1797,
}

impl Variant {
    /// Whether the part drives a side-select output from command bit 1.
    #[must_use]
    pub const fn has_sso(self) -> bool {
        matches!(self, Self::Wd1795 | Self::Wd1797)
    }

    /// Whether Type II/III command bit 3 selects the sector-length table row.
    #[must_use]
    pub const fn has_length_flag(self) -> bool {
        matches!(self, Self::Wd1795 | Self::Wd1797)
    }

    /// XOR mask applied to every byte crossing the data bus. The '91 and
    /// '95 present inverted data to the host.
    #[must_use]
    pub const fn data_invert_mask(self) -> u8 {
        match self {
            Self::Wd1791 | Self::Wd1795 => 0xFF,
            Self::Wd1793 | Self::Wd1797 => 0x00,
        }
    }
}

/// Conditions the controller cannot model as status bits: surfaced for
/// the host to inspect, in place of a hardware behavior that either does
/// not exist (READ TRACK) or is deliberately not chained (multi-sector).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// READ TRACK was issued; the command terminates immediately with
    /// INTRQ and no data transfer.
    ReadTrackUnsupported,
    /// A Type II command carried the multi-sector flag; only a single
    /// sector is transferred.
    MultiSectorIgnored,
}

/// Sink for the controller's two output lines.
///
/// Called on level changes only. The cartridge adapter maps these onto
/// the host CPU's actual interrupt wiring (NMI/FIRQ, possibly gated by a
/// software enable latch). Implementations must not call back into the
/// controller from within these notifications.
pub trait HostLines {
    /// DRQ line changed: a data-register transfer is (or is no longer)
    /// pending.
    fn drq_changed(&mut self, asserted: bool);

    /// INTRQ line changed: a command completed or a latched interrupt
    /// condition fired.
    fn intrq_changed(&mut self, asserted: bool);
}

/// Null sink for hosts that poll status instead of taking interrupts.
impl HostLines for () {
    fn drq_changed(&mut self, _asserted: bool) {}
    fn intrq_changed(&mut self, _asserted: bool) {}
}

/// One FD179x controller instance.
pub struct Wd179x<D, H> {
    pub(crate) variant: Variant,
    pub(crate) clock: MasterClock,
    pub(crate) drive: D,
    pub(crate) host: H,

    // Programmer-visible registers
    pub(crate) status: u8,
    pub(crate) track: u8,
    pub(crate) sector: u8,
    pub(crate) data: u8,
    pub(crate) command: u8,

    // Execution state
    pub(crate) phase: Phase,
    /// Pending one-shot resumption delay; `None` while idle or running
    /// synchronously.
    pub(crate) delay: Option<Ticks>,
    /// Last seek direction: +1 toward the hub, -1 toward the rim.
    pub(crate) direction: i8,
    pub(crate) side: u8,
    pub(crate) step_delay: Ticks,
    pub(crate) double_density: bool,
    pub(crate) is_step_command: bool,
    /// Status register reports Type I bit layout (INDEX/TRACK0 mirrored
    /// from the drive lines).
    pub(crate) status_type1: bool,

    // Command-scoped transients
    pub(crate) crc: Crc16,
    pub(crate) deleted_dam: bool,
    pub(crate) bytes_remaining: i32,
    /// Revolution counter value at the start of the current search.
    pub(crate) index_base: u32,
    /// READ ADDRESS stages the first ID byte here before copying it into
    /// the sector register.
    pub(crate) track_tmp: u8,
    /// Byte cells left in the data-address-mark search window.
    pub(crate) dam_window: u8,
    /// Inside a run of 0xF5 sync bytes during WRITE TRACK.
    pub(crate) sync_run: bool,

    // Output lines
    pub(crate) drq: bool,
    pub(crate) intrq: bool,

    // Force-interrupt condition latches
    pub(crate) intr_not_ready_to_ready: bool,
    pub(crate) intr_ready_to_not_ready: bool,
    pub(crate) intr_index_pulse: bool,
    pub(crate) intr_immediate: bool,
    pub(crate) ready_prev: bool,
    pub(crate) index_seen: u32,

    pub(crate) diagnostic: Option<Diagnostic>,
}

impl<D: DiskDrive, H: HostLines> Wd179x<D, H> {
    /// Create a controller wired to the given drive and host lines.
    ///
    /// `clock` is the controller's own crystal (1 MHz on the standard
    /// parts); step and settle delays derive from it.
    #[must_use]
    pub fn new(variant: Variant, clock: MasterClock, drive: D, host: H) -> Self {
        let ready = drive.ready();
        let index = drive.index_count();
        Self {
            variant,
            clock,
            drive,
            host,
            status: 0,
            track: 0,
            sector: 0,
            data: 0,
            command: 0,
            phase: Phase::AcceptCommand,
            delay: None,
            direction: -1,
            side: 0,
            step_delay: Ticks::ZERO,
            double_density: false,
            is_step_command: false,
            status_type1: true,
            crc: Crc16::new(),
            deleted_dam: false,
            bytes_remaining: 0,
            index_base: 0,
            track_tmp: 0,
            dam_window: 0,
            sync_run: false,
            drq: false,
            intrq: false,
            intr_not_ready_to_ready: false,
            intr_ready_to_not_ready: false,
            intr_index_pulse: false,
            intr_immediate: false,
            ready_prev: ready,
            index_seen: index,
            diagnostic: None,
        }
    }

    /// Full controller reset, as on the hardware reset line: registers
    /// zeroed, pending timer cancelled, output lines dropped.
    pub fn reset(&mut self) {
        self.status = 0;
        self.track = 0;
        self.sector = 0;
        self.data = 0;
        self.command = 0;
        self.phase = Phase::AcceptCommand;
        self.delay = None;
        self.direction = -1;
        self.side = 0;
        self.step_delay = Ticks::ZERO;
        self.is_step_command = false;
        self.status_type1 = true;
        self.crc = Crc16::new();
        self.deleted_dam = false;
        self.bytes_remaining = 0;
        self.track_tmp = 0;
        self.dam_window = 0;
        self.sync_run = false;
        self.intr_not_ready_to_ready = false;
        self.intr_ready_to_not_ready = false;
        self.intr_index_pulse = false;
        self.intr_immediate = false;
        self.ready_prev = self.drive.ready();
        self.index_seen = self.drive.index_count();
        self.index_base = self.index_seen;
        self.diagnostic = None;
        self.set_drq(false);
        self.set_intrq(false);
    }

    /// Read one of the four bus ports.
    pub fn read(&mut self, port: u8) -> u8 {
        let value = match port & 0x03 {
            0 => {
                if !self.intr_immediate {
                    self.set_intrq(false);
                }
                self.compose_status()
            }
            1 => self.track,
            2 => self.sector,
            _ => {
                self.set_drq(false);
                self.data
            }
        };
        value ^ self.variant.data_invert_mask()
    }

    /// Write one of the four bus ports.
    pub fn write(&mut self, port: u8, value: u8) {
        let value = value ^ self.variant.data_invert_mask();
        match port & 0x03 {
            0 => self.write_command(value),
            1 => self.track = value,
            2 => self.sector = value,
            _ => {
                self.set_drq(false);
                self.data = value;
            }
        }
    }

    /// Select single/double density recording (the DDEN pin).
    pub fn set_density(&mut self, double: bool) {
        self.double_density = double;
        self.drive.set_density(double);
    }

    /// Current DRQ line level.
    #[must_use]
    pub fn drq(&self) -> bool {
        self.drq
    }

    /// Current INTRQ line level.
    #[must_use]
    pub fn intrq(&self) -> bool {
        self.intrq
    }

    /// Whether a command is in progress.
    #[must_use]
    pub fn busy(&self) -> bool {
        self.status & STATUS_BUSY != 0
    }

    /// The attached drive.
    pub fn drive(&self) -> &D {
        &self.drive
    }

    /// Mutable access to the attached drive (disk changes, write-protect
    /// tab, motor state are the host's business).
    pub fn drive_mut(&mut self) -> &mut D {
        &mut self.drive
    }

    /// Take the latest diagnostic condition, if any.
    pub fn take_diagnostic(&mut self) -> Option<Diagnostic> {
        self.diagnostic.take()
    }

    fn write_command(&mut self, value: u8) {
        if value & 0xF0 == 0xD0 {
            self.force_interrupt(value);
            return;
        }
        // While busy, everything but force-interrupt is ignored.
        if self.status & STATUS_BUSY != 0 {
            return;
        }
        if !self.intr_immediate {
            self.set_intrq(false);
        }
        self.intr_not_ready_to_ready = false;
        self.intr_ready_to_not_ready = false;
        self.intr_index_pulse = false;
        self.command = value;
        self.diagnostic = None;

        if value & 0xF0 == 0xE0 {
            // READ TRACK is not modelled: terminate immediately with
            // INTRQ and no transfer, leaving the controller idle.
            self.diagnostic = Some(Diagnostic::ReadTrackUnsupported);
            self.set_intrq(true);
            return;
        }

        self.phase = match value {
            0x00..=0x7F => Phase::TypeIDispatch,
            0x80..=0xBF => Phase::TypeIIDispatch,
            _ => Phase::TypeIIIDispatch,
        };
        self.run();
    }

    /// Force interrupt (0xD0-0xDF): the only command accepted while busy.
    ///
    /// Cancels any pending resumption before touching BUSY or INTRQ so a
    /// stale timer can never fire for an aborted command, then latches
    /// the four trigger conditions from the low nibble.
    fn force_interrupt(&mut self, value: u8) {
        self.delay = None;
        let was_busy = self.status & STATUS_BUSY != 0;
        self.status &= !STATUS_BUSY;
        self.phase = Phase::AcceptCommand;
        self.command = value;
        self.intr_not_ready_to_ready = value & 0x01 != 0;
        self.intr_ready_to_not_ready = value & 0x02 != 0;
        self.intr_index_pulse = value & 0x04 != 0;
        self.intr_immediate = value & 0x08 != 0;
        self.ready_prev = self.drive.ready();
        self.index_seen = self.drive.index_count();
        if !was_busy {
            self.status_type1 = true;
        }
        if self.intr_immediate {
            self.set_intrq(true);
        }
    }

    fn compose_status(&self) -> u8 {
        let mut status = self.status;
        if self.status_type1 {
            status &= !(STATUS_INDEX | STATUS_TRACK0);
            if self.drive.index_pulse() {
                status |= STATUS_INDEX;
            }
            if self.drive.track0() {
                status |= STATUS_TRACK0;
            }
        } else if self.drq {
            status |= STATUS_DRQ;
        } else {
            status &= !STATUS_DRQ;
        }
        if self.drive.ready() {
            status & !STATUS_NOT_READY
        } else {
            status | STATUS_NOT_READY
        }
    }

    pub(crate) fn set_drq(&mut self, asserted: bool) {
        if self.drq != asserted {
            self.drq = asserted;
            self.host.drq_changed(asserted);
        }
    }

    pub(crate) fn set_intrq(&mut self, asserted: bool) {
        if self.intrq != asserted {
            self.intrq = asserted;
            self.host.intrq_changed(asserted);
        }
    }

    /// Evaluate the latched force-interrupt conditions against the drive
    /// lines. Called every tick; the drive lines only move under drive
    /// activity, so this is a couple of boolean compares.
    fn poll_lines(&mut self) {
        let ready = self.drive.ready();
        if self.intr_not_ready_to_ready && !self.ready_prev && ready {
            self.set_intrq(true);
        }
        if self.intr_ready_to_not_ready && self.ready_prev && !ready {
            self.set_intrq(true);
        }
        self.ready_prev = ready;

        let index = self.drive.index_count();
        if self.intr_index_pulse && index != self.index_seen {
            self.set_intrq(true);
        }
        self.index_seen = index;
    }
}

impl<D: DiskDrive, H: HostLines> Tickable for Wd179x<D, H> {
    fn tick(&mut self) {
        if let Some(left) = self.delay {
            let left = left - Ticks::new(1);
            if left == Ticks::ZERO {
                self.delay = None;
                self.run();
            } else {
                self.delay = Some(left);
            }
        }
        self.poll_lines();
    }

    fn tick_n(&mut self, count: Ticks) {
        let mut remaining = count.get();
        while remaining > 0 {
            let Some(pending) = self.delay else { break };
            let step = pending.get().min(remaining);
            remaining -= step;
            if step == pending.get() {
                self.delay = None;
                self.run();
            } else {
                self.delay = Some(Ticks::new(pending.get() - step));
            }
            self.poll_lines();
        }
        self.poll_lines();
    }

    fn time_until_event(&self) -> Option<Ticks> {
        self.delay
    }
}
