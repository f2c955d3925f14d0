//! # Power States and Control Lines
//!
//! Every domain is in exactly one [`PowerState`]. The physical control lines
//! driven into the domain's gating logic are a pure function of that state:
//!
//! ```text
//! ┌───────────────────────────┬─────┬─────┬────────┬─────┬────────┐
//! │ State                     │ iso │ rst │ clk_en │ ret │ pwr_sw │
//! ├───────────────────────────┼─────┼─────┼────────┼─────┼────────┤
//! │ OFF                       │  1  │  1  │   0    │  1  │   0    │
//! │ RETENTION                 │  1  │  1  │   0    │  1  │   1    │
//! │ STANDBY                   │  1  │  1  │   1    │  1  │   1    │
//! │ IDLE / RUN_* / TURBO      │  0  │  0  │   1    │  1  │   1    │
//! │ FAULT                     │  1  │  1  │   0    │  1  │   0    │
//! └───────────────────────────┴─────┴─────┴────────┴─────┴────────┘
//! ```
//!
//! OFF and FAULT share the safe vector. The released states share one vector
//! and are told apart by their clock mode and voltage level.

use core::fmt;

use bitflags::bitflags;

use crate::level::PerfLevel;

// =============================================================================
// CONTROL VECTOR
// =============================================================================

bitflags! {
    /// Physical gating lines for one domain
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlVector: u8 {
        /// Output isolation clamps enabled
        const ISOLATION     = 1 << 0;
        /// Domain reset asserted
        const RESET         = 1 << 1;
        /// Domain clock gate open
        const CLOCK_ENABLE  = 1 << 2;
        /// SRAM retention enabled
        const RETENTION     = 1 << 3;
        /// Power switch closed
        const POWER_SWITCH  = 1 << 4;
    }
}

impl ControlVector {
    /// Isolated, in reset, unclocked, unpowered
    pub const SAFE: Self = Self::ISOLATION
        .union(Self::RESET)
        .union(Self::RETENTION);

    /// Powered but still isolated and held in reset
    pub const POWERED_ISOLATED: Self = Self::SAFE.union(Self::POWER_SWITCH);

    /// Powered, isolated, clock running
    pub const CLOCKED_ISOLATED: Self = Self::POWERED_ISOLATED.union(Self::CLOCK_ENABLE);

    /// Fully released, clocked and powered
    pub const RELEASED: Self = Self::CLOCK_ENABLE
        .union(Self::RETENTION)
        .union(Self::POWER_SWITCH);

    #[inline(always)]
    pub const fn isolation_enable(&self) -> bool {
        self.contains(Self::ISOLATION)
    }

    #[inline(always)]
    pub const fn reset_assert(&self) -> bool {
        self.contains(Self::RESET)
    }

    #[inline(always)]
    pub const fn clock_enable(&self) -> bool {
        self.contains(Self::CLOCK_ENABLE)
    }

    #[inline(always)]
    pub const fn memory_retention_enable(&self) -> bool {
        self.contains(Self::RETENTION)
    }

    #[inline(always)]
    pub const fn power_switch_enable(&self) -> bool {
        self.contains(Self::POWER_SWITCH)
    }
}

// =============================================================================
// POWER STATE
// =============================================================================

/// Lifecycle state of one power domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PowerState {
    /// Power switch open
    #[default]
    Off       = 0,
    /// Powered, isolated, unclocked (ramping up or draining down)
    Retention = 1,
    /// Powered, isolated, clock requested and settling
    Standby   = 2,
    /// Released and clocked, no performance level requested
    Idle      = 3,
    /// Lowest operating point
    RunLow    = 4,
    /// Balanced operating point
    RunBal    = 5,
    /// High operating point
    RunHigh   = 6,
    /// Maximum operating point
    Turbo     = 7,
    /// Faulted; left only by a forced OFF command
    Fault     = 8,
}

impl PowerState {
    /// All states in encoding order
    pub const ALL: [PowerState; 9] = [
        PowerState::Off,
        PowerState::Retention,
        PowerState::Standby,
        PowerState::Idle,
        PowerState::RunLow,
        PowerState::RunBal,
        PowerState::RunHigh,
        PowerState::Turbo,
        PowerState::Fault,
    ];

    /// Control lines for this state
    pub const fn control_vector(&self) -> ControlVector {
        match self {
            PowerState::Off | PowerState::Fault => ControlVector::SAFE,
            PowerState::Retention => ControlVector::POWERED_ISOLATED,
            PowerState::Standby => ControlVector::CLOCKED_ISOLATED,
            PowerState::Idle
            | PowerState::RunLow
            | PowerState::RunBal
            | PowerState::RunHigh
            | PowerState::Turbo => ControlVector::RELEASED,
        }
    }

    /// Performance level driven on clk_mode / volt_level
    pub const fn perf_level(&self) -> PerfLevel {
        match self {
            PowerState::RunLow => PerfLevel::LOW,
            PowerState::RunBal => PerfLevel::BALANCED,
            PowerState::RunHigh => PerfLevel::HIGH,
            PowerState::Turbo => PerfLevel::TURBO,
            _ => PerfLevel::OFF,
        }
    }

    /// RUN_LOW through TURBO
    #[inline(always)]
    pub const fn is_run(&self) -> bool {
        matches!(
            self,
            PowerState::RunLow | PowerState::RunBal | PowerState::RunHigh | PowerState::Turbo
        )
    }

    /// IDLE or any RUN level: the domain can serve dependents
    #[inline(always)]
    pub const fn is_operational(&self) -> bool {
        matches!(self, PowerState::Idle) || self.is_run()
    }

    /// Anything other than OFF and FAULT
    #[inline(always)]
    pub const fn is_active(&self) -> bool {
        !matches!(self, PowerState::Off | PowerState::Fault)
    }

    /// Decode from the raw encoding
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(PowerState::Off),
            1 => Some(PowerState::Retention),
            2 => Some(PowerState::Standby),
            3 => Some(PowerState::Idle),
            4 => Some(PowerState::RunLow),
            5 => Some(PowerState::RunBal),
            6 => Some(PowerState::RunHigh),
            7 => Some(PowerState::Turbo),
            8 => Some(PowerState::Fault),
            _ => None,
        }
    }

    /// Short uppercase name as used in traces
    pub const fn name(&self) -> &'static str {
        match self {
            PowerState::Off => "OFF",
            PowerState::Retention => "RETENTION",
            PowerState::Standby => "STANDBY",
            PowerState::Idle => "IDLE",
            PowerState::RunLow => "RUN_LOW",
            PowerState::RunBal => "RUN_BAL",
            PowerState::RunHigh => "RUN_HIGH",
            PowerState::Turbo => "TURBO",
            PowerState::Fault => "FAULT",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// TESTS
// =============================================================================
