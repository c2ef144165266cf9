//! In-memory floppy drive mechanism for the FD179x controller.
//!
//! Models the drive side of the cable: head positioning, side and density
//! selection, the index hole, and per-track byte-cell storage. Tracks
//! start blank and acquire structure only through the controller's WRITE
//! TRACK and WRITE SECTOR commands, which makes a formatted image exactly
//! as self-consistent as the controller that produced it.
//!
//! Rotation is tied to head activity rather than wall time: every byte
//! read, written or skipped advances the head one cell, and the index
//! counter increments when the head wraps past the hole. The controller
//! paces those operations with its own delays, so elapsed time and disk
//! angle stay in step while a command runs.

pub mod track;

use std::fmt;

use emu_core::{MasterClock, Ticks};
use track::TrackImage;
use wd_fd179x::DiskDrive;

/// Byte cells per revolution in double density (MFM, 300 rpm).
pub const CELLS_DD: usize = 6250;
/// Byte cells per revolution in single density (FM, 300 rpm).
pub const CELLS_SD: usize = 3125;

/// Cell duration in microseconds for each density.
const CELL_US_DD: u64 = 32;
const CELL_US_SD: u64 = 64;

/// Cells for which the index pulse line stays asserted after the hole.
const INDEX_PULSE_CELLS: usize = 4;

const MAX_CYLINDERS: u8 = 86;
const MAX_SIDES: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloppyError {
    InvalidGeometry { cylinders: u8, sides: u8 },
}

impl fmt::Display for FloppyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGeometry { cylinders, sides } => write!(
                f,
                "invalid geometry: {cylinders} cylinders x {sides} sides \
                 (expected 1-{MAX_CYLINDERS} x 1-{MAX_SIDES})",
            ),
        }
    }
}

impl std::error::Error for FloppyError {}

/// A spinning disk in a drive, as seen from the controller's pins.
pub struct VirtualFloppy {
    tracks: Vec<TrackImage>,
    cylinders: u8,
    sides: u8,
    cylinder: u8,
    side: u8,
    inward: bool,
    double_density: bool,
    /// Angular head position in cells; shared across cylinders the way a
    /// real platter's rotation is.
    head_pos: usize,
    index: u32,
    ready: bool,
    write_protect: bool,
    clock: MasterClock,
}

impl VirtualFloppy {
    /// A blank, unformatted disk of the given geometry, spinning and
    /// ready. Tracks are allocated at double-density length; in single
    /// density only the first [`CELLS_SD`] cells pass the head.
    pub fn blank(clock: MasterClock, cylinders: u8, sides: u8) -> Result<Self, FloppyError> {
        if cylinders == 0 || cylinders > MAX_CYLINDERS || sides == 0 || sides > MAX_SIDES {
            return Err(FloppyError::InvalidGeometry { cylinders, sides });
        }
        let count = usize::from(cylinders) * usize::from(sides);
        Ok(Self {
            tracks: (0..count).map(|_| TrackImage::new(CELLS_DD)).collect(),
            cylinders,
            sides,
            cylinder: 0,
            side: 0,
            inward: false,
            double_density: false,
            head_pos: 0,
            index: 0,
            ready: true,
            write_protect: false,
            clock,
        })
    }

    /// Current head cylinder.
    #[must_use]
    pub fn cylinder(&self) -> u8 {
        self.cylinder
    }

    /// Drive ready line (motor at speed, disk present).
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Write-protect tab.
    pub fn set_write_protect(&mut self, protect: bool) {
        self.write_protect = protect;
    }

    /// Inspect a track surface.
    #[must_use]
    pub fn track(&self, cylinder: u8, side: u8) -> Option<&TrackImage> {
        self.tracks.get(self.track_index(cylinder, side)?)
    }

    /// Mutate a track surface directly, bypassing the head. Hosts use
    /// this to load pre-built images or inject media defects.
    pub fn track_mut(&mut self, cylinder: u8, side: u8) -> Option<&mut TrackImage> {
        let at = self.track_index(cylinder, side)?;
        self.tracks.get_mut(at)
    }

    fn track_index(&self, cylinder: u8, side: u8) -> Option<usize> {
        if cylinder >= self.cylinders || side >= self.sides {
            return None;
        }
        Some(usize::from(cylinder) * usize::from(self.sides) + usize::from(side))
    }

    /// Cells per revolution at the selected density.
    fn span(&self) -> usize {
        if self.double_density {
            CELLS_DD
        } else {
            CELLS_SD
        }
    }

    fn cell_ticks(&self) -> Ticks {
        self.clock.micros(if self.double_density {
            CELL_US_DD
        } else {
            CELL_US_SD
        })
    }

    fn under_head(&self) -> usize {
        usize::from(self.cylinder) * usize::from(self.sides) + usize::from(self.side)
    }

    fn advance(&mut self) {
        self.head_pos += 1;
        if self.head_pos >= self.span() {
            self.head_pos = 0;
            self.index = self.index.wrapping_add(1);
        }
    }
}

impl DiskDrive for VirtualFloppy {
    fn set_direction(&mut self, inward: bool) {
        self.inward = inward;
    }

    fn step(&mut self) {
        if self.inward {
            self.cylinder = (self.cylinder + 1).min(self.cylinders - 1);
        } else {
            self.cylinder = self.cylinder.saturating_sub(1);
        }
    }

    fn set_side(&mut self, side: u8) {
        self.side = side.min(self.sides - 1);
    }

    fn set_density(&mut self, double: bool) {
        self.double_density = double;
        self.head_pos %= self.span();
    }

    fn read_byte(&mut self) -> u8 {
        let at = self.under_head();
        let byte = self.tracks[at].read(self.head_pos);
        self.advance();
        byte
    }

    fn write_byte(&mut self, byte: u8) {
        let at = self.under_head();
        self.tracks[at].write(self.head_pos, byte);
        self.advance();
    }

    fn skip_byte(&mut self) {
        self.advance();
    }

    fn write_idam(&mut self) {
        let at = self.under_head();
        self.tracks[at].write_idam(self.head_pos);
        self.advance();
    }

    fn time_to_next_byte(&self) -> Ticks {
        self.cell_ticks()
    }

    fn time_to_next_idam(&self) -> Ticks {
        let span = self.span();
        let cells = self.tracks[self.under_head()]
            .idam_distance(self.head_pos, span)
            .unwrap_or(span);
        self.cell_ticks() * cells as u64
    }

    fn locate_next_idam(&mut self) -> bool {
        let span = self.span();
        match self.tracks[self.under_head()].idam_distance(self.head_pos, span) {
            Some(cells) => {
                for _ in 0..=cells {
                    self.advance();
                }
                true
            }
            None => {
                for _ in 0..span {
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
        self.head_pos < INDEX_PULSE_CELLS
    }

    fn index_count(&self) -> u32 {
        self.index
    }

    fn write_protect(&self) -> bool {
        self.write_protect
    }
}
