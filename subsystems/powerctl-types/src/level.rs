//! Performance levels and clock source selection.

use core::fmt;

use crate::state::PowerState;

// ============================================================================
// PERFORMANCE LEVEL
// ============================================================================

/// Operating point index, `0..=4`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PerfLevel(u8);

impl PerfLevel {
    /// No clock / retention voltage
    pub const OFF: Self = Self(0);
    /// RUN_LOW
    pub const LOW: Self = Self(1);
    /// RUN_BAL
    pub const BALANCED: Self = Self(2);
    /// RUN_HIGH
    pub const HIGH: Self = Self(3);
    /// TURBO
    pub const TURBO: Self = Self(4);

    /// Highest encodable level
    pub const MAX: Self = Self::TURBO;

    /// Create a level, saturating at [`PerfLevel::MAX`]
    #[inline]
    pub const fn new(raw: u8) -> Self {
        if raw > Self::MAX.0 {
            Self::MAX
        } else {
            Self(raw)
        }
    }

    /// Raw level value
    #[inline(always)]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    /// RUN state that implements this level (`OFF` maps to [`PowerState::Off`])
    pub const fn run_state(&self) -> PowerState {
        match self.0 {
            0 => PowerState::Off,
            1 => PowerState::RunLow,
            2 => PowerState::RunBal,
            3 => PowerState::RunHigh,
            _ => PowerState::Turbo,
        }
    }

    /// Clock source able to deliver this level
    pub const fn clock_source(&self) -> ClockSource {
        match self.0 {
            0 => ClockSource::Off,
            1 | 2 => ClockSource::Oscillator,
            3 => ClockSource::PllA,
            _ => ClockSource::PllB,
        }
    }
}

impl From<u8> for PerfLevel {
    fn from(raw: u8) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for PerfLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

// ============================================================================
// CLOCK SOURCE
// ============================================================================

/// Clock source feeding a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ClockSource {
    /// Clock gated
    #[default]
    Off        = 0,
    /// Reference oscillator
    Oscillator = 1,
    /// First PLL
    PllA       = 2,
    /// Second (fastest) PLL
    PllB       = 3,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_saturates() {
        assert_eq!(PerfLevel::new(9), PerfLevel::TURBO);
        assert_eq!(PerfLevel::from(2), PerfLevel::BALANCED);
    }

    #[test]
    fn test_clock_source_map() {
        assert_eq!(PerfLevel::OFF.clock_source(), ClockSource::Off);
        assert_eq!(PerfLevel::LOW.clock_source(), ClockSource::Oscillator);
        assert_eq!(PerfLevel::BALANCED.clock_source(), ClockSource::Oscillator);
        assert_eq!(PerfLevel::HIGH.clock_source(), ClockSource::PllA);
        assert_eq!(PerfLevel::TURBO.clock_source(), ClockSource::PllB);
    }

    #[test]
    fn test_run_state_round_trip() {
        for raw in 1..=4u8 {
            let level = PerfLevel::new(raw);
            assert_eq!(level.run_state().perf_level(), level);
        }
        assert_eq!(PerfLevel::OFF.run_state(), PowerState::Off);
    }
}
