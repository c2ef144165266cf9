//! The drive contract consumed by the controller.
//!
//! The FD179x sees the disk as a byte-serial stream: one byte cell passes
//! under the head at a time, and the drive knows where the ID address
//! marks and the index hole sit in that stream. Implementations live
//! outside this crate (`drive-virtual-floppy` provides one backed by
//! in-memory track images; the unit tests here use scripted fakes).

use emu_core::Ticks;

/// A byte-serial floppy drive as seen from the controller's pins.
///
/// Every read, write or skip consumes exactly one byte cell and advances
/// the head. All timing queries are relative to the current head position;
/// the controller turns them into one-shot delays on its own scheduler, so
/// implementations must answer them without moving the head.
pub trait DiskDrive {
    /// Latch the step direction: `true` steps toward the hub (higher
    /// cylinders), `false` toward the rim (cylinder 0).
    fn set_direction(&mut self, inward: bool);

    /// Pulse the step line once, moving the head one cylinder in the
    /// latched direction.
    fn step(&mut self);

    /// Select the head side (0 or 1). Only wired on controller variants
    /// with a side-select output.
    fn set_side(&mut self, side: u8);

    /// Select single (`false`) or double (`true`) density recording.
    fn set_density(&mut self, double: bool);

    /// Read the byte cell under the head and advance.
    fn read_byte(&mut self) -> u8;

    /// Write a byte cell under the head and advance. Overwriting a cell
    /// that held an ID address mark destroys the mark.
    fn write_byte(&mut self, byte: u8);

    /// Advance one byte cell without transferring data.
    fn skip_byte(&mut self);

    /// Write an ID address mark cell and register its position so later
    /// searches can find it.
    fn write_idam(&mut self);

    /// Ticks until the next byte cell boundary.
    fn time_to_next_byte(&self) -> Ticks;

    /// Ticks until the next ID address mark passes under the head, or one
    /// full revolution if the track holds none.
    fn time_to_next_idam(&self) -> Ticks;

    /// Advance the head to just past the next ID address mark, wrapping
    /// through the index hole if necessary. Returns `false` (after a full
    /// revolution) if the track holds no mark.
    fn locate_next_idam(&mut self) -> bool;

    /// Drive ready line (motor at speed, disk present).
    fn ready(&self) -> bool;

    /// Track-zero sensor: asserted while the head sits on cylinder 0.
    fn track0(&self) -> bool;

    /// Index pulse line: asserted while the index hole passes the sensor.
    fn index_pulse(&self) -> bool;

    /// Monotonic count of index holes seen. The controller bounds its
    /// searches by revolutions, not wall time, so it compares this counter
    /// rather than edge-sampling the pulse line.
    fn index_count(&self) -> u32;

    /// Write-protect sensor.
    fn write_protect(&self) -> bool;
}
