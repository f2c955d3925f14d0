//! # Per-Tick Signal Records
//!
//! Commands flow into a domain's state machine and status flows back out.
//! Both are sampled once per tick and are level-valid: a command that is not
//! acted on must be presented again on the next tick, and a newer command
//! simply replaces an older one.

use core::fmt;

use crate::level::PerfLevel;
use crate::state::PowerState;

// =============================================================================
// FAULT CODES
// =============================================================================

/// 8-bit fault code reported in [`Status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct FaultCode(pub u8);

impl FaultCode {
    /// No fault recorded
    pub const NONE: Self = Self(0x00);
    /// Clock never acknowledged while settling in STANDBY
    pub const CLOCK_STABLE_TIMEOUT: Self = Self(0x01);
    /// Clock/voltage acknowledgement missing after a RUN level change
    pub const RUN_ACK_TIMEOUT: Self = Self(0x02);
    /// Domain never went idle during power-down
    pub const TEARDOWN_TIMEOUT: Self = Self(0x03);
    /// Fatal error signalled from outside the subsystem
    pub const FATAL_ERROR: Self = Self(0xFF);

    #[inline(always)]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    #[inline(always)]
    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Whether this code was produced by an expired handshake budget
    pub const fn is_timeout(&self) -> bool {
        matches!(self.0, 0x01..=0x03)
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NONE => f.write_str("none"),
            Self::CLOCK_STABLE_TIMEOUT => f.write_str("clock-stable timeout"),
            Self::RUN_ACK_TIMEOUT => f.write_str("run-level ack timeout"),
            Self::TEARDOWN_TIMEOUT => f.write_str("teardown timeout"),
            Self::FATAL_ERROR => f.write_str("fatal external error"),
            other => write!(f, "fault {:#04x}", other.0),
        }
    }
}

// =============================================================================
// COMMAND
// =============================================================================

/// Target-state request presented to one domain for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Command {
    /// Command present this tick
    pub valid: bool,
    /// State the domain should move toward
    pub requested_state: PowerState,
    /// Advisory performance level (0-4)
    pub performance_hint: PerfLevel,
    /// Override safety interlocks (recovery and verification tooling)
    pub force: bool,
}

impl Command {
    /// No command this tick
    pub const NONE: Self = Self {
        valid: false,
        requested_state: PowerState::Off,
        performance_hint: PerfLevel::OFF,
        force: false,
    };

    /// Request a target state
    pub const fn request(state: PowerState) -> Self {
        Self {
            valid: true,
            requested_state: state,
            performance_hint: state.perf_level(),
            force: false,
        }
    }

    /// Request the RUN state implementing `level`
    pub const fn run_at(level: PerfLevel) -> Self {
        Self::request(level.run_state())
    }

    /// Forced OFF: the only way out of FAULT
    pub const fn force_off() -> Self {
        Self {
            valid: true,
            requested_state: PowerState::Off,
            performance_hint: PerfLevel::OFF,
            force: true,
        }
    }

    /// Mark this command as forced
    pub const fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// Valid, forced and asking for OFF
    #[inline(always)]
    pub const fn is_forced_off(&self) -> bool {
        self.valid && self.force && matches!(self.requested_state, PowerState::Off)
    }

    /// Valid and asking for OFF
    #[inline(always)]
    pub const fn is_power_down(&self) -> bool {
        self.valid && matches!(self.requested_state, PowerState::Off)
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Status published by a domain every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    /// A command was accepted this tick
    pub ack: bool,
    /// Committed state
    pub current_state: PowerState,
    /// Transition or handshake in progress
    pub busy: bool,
    /// Domain is in FAULT
    pub fault: bool,
    /// Reason for the most recent fault
    pub fault_code: FaultCode,
    /// Ticks spent in STANDBY during the last power-up
    pub last_transition_latency: u32,
}

// =============================================================================
// TESTS
// =============================================================================
