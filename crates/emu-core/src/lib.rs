//! Core timing traits and types for cycle-accurate emulation.
//!
//! Everything ticks at the master crystal frequency. All component timing
//! derives from this. No exceptions.

mod clock;
mod tickable;
mod ticks;

pub use clock::MasterClock;
pub use tickable::Tickable;
pub use ticks::Ticks;
