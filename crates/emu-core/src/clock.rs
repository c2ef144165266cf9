//! Master clock configuration.

use crate::Ticks;

/// Master clock configuration for a system.
///
/// Each system has a master crystal that drives all timing. Components may
/// run at divided rates, but everything derives from this frequency.
#[derive(Debug, Clone, Copy)]
pub struct MasterClock {
    /// Crystal frequency in Hz (e.g., `1_000_000` for an FDC clocked at 1 MHz).
    pub frequency_hz: u64,
}

impl MasterClock {
    #[must_use]
    pub const fn new(frequency_hz: u64) -> Self {
        Self { frequency_hz }
    }

    /// Ticks in the given number of milliseconds (integer arithmetic).
    #[must_use]
    pub const fn millis(&self, ms: u64) -> Ticks {
        Ticks::new(self.frequency_hz * ms / 1_000)
    }

    /// Ticks in the given number of microseconds (integer arithmetic).
    #[must_use]
    pub const fn micros(&self, us: u64) -> Ticks {
        Ticks::new(self.frequency_hz * us / 1_000_000)
    }
}
