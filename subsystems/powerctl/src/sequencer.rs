//! # Power Sequencer
//!
//! Tick-counted physical ramp for one domain. A single implementation is
//! embedded in every [`DomainPsm`]; the PSM decides *when* to ramp and the
//! sequencer decides *how long* each phase lasts.
//!
//! ```text
//!            begin_power_up                ramp_delay
//!   ┌─────┐ ───────────────▶ ┌─────────┐ ────────────▶ ┌────────────┐
//!   │ OFF │                  │ POWER_ON│               │ WAIT_STABLE│
//!   └─────┘ ◀──────┐         └─────────┘               └─────┬──────┘
//!      ▲           │ idle                    clk_ack + setup │
//!      │      ┌────┴─────┐                    + stable delay │
//!      │      │ POWER_OFF│ ◀──── begin_teardown ───┐         ▼
//!      │      └────┬─────┘                    ┌────┴──┐  ┌─────────┐
//!      │           │ timeout                  │  ON   │◀─│ RELEASE │
//!      │           ▼                          └───────┘  └─────────┘
//!      │      ┌─────────┐
//!      └──────│  FAULT  │  seq_fault latched; cleared by reset()
//!      reset  └─────────┘
//! ```
//!
//! [`DomainPsm`]: crate::psm::DomainPsm

use core::fmt;

use powerctl_types::FaultCode;

use crate::config::TimingConfig;

// =============================================================================
// PHASES
// =============================================================================

/// Sequencer phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SequencerPhase {
    /// Power switch open
    #[default]
    Off        = 0,
    /// Switch closed, waiting out the ramp delay
    PowerOn    = 1,
    /// Clock requested; waiting for ack then setup + stable delays
    WaitStable = 2,
    /// Isolation and reset released this tick
    Release    = 3,
    /// Domain released and running
    On         = 4,
    /// Reset/isolation asserted, clock dropped, waiting for idle
    PowerOff   = 5,
    /// Ramp failed
    Fault      = 6,
}

impl SequencerPhase {
    /// Phase is part of a power-up or power-down ramp
    pub const fn is_ramping(&self) -> bool {
        matches!(
            self,
            SequencerPhase::PowerOn | SequencerPhase::WaitStable | SequencerPhase::PowerOff
        )
    }
}

impl fmt::Display for SequencerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SequencerPhase::Off => "OFF",
            SequencerPhase::PowerOn => "PWR_ON",
            SequencerPhase::WaitStable => "WAIT_STABLE",
            SequencerPhase::Release => "RELEASE",
            SequencerPhase::On => "ON",
            SequencerPhase::PowerOff => "PWR_OFF",
            SequencerPhase::Fault => "FAULT",
        };
        f.write_str(name)
    }
}

/// Outcome of one sequencer step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerEvent {
    /// Nothing changed this tick
    None,
    /// Ramp delay elapsed; clock may be requested
    RampComplete,
    /// Clock stable; isolation and reset released
    Released,
    /// Domain drained; power switch opened
    PoweredOff,
    /// A wait exceeded its budget
    Timeout(FaultCode),
}

/// Per-domain sequencer status exposed in tick outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequencerStatus {
    pub phase: SequencerPhase,
    /// Latched ramp failure
    pub seq_fault: bool,
    /// Ticks spent in the current timed phase
    pub timer: u32,
}

// =============================================================================
// SEQUENCER
// =============================================================================

/// Ramp timing engine for one domain
#[derive(Debug, Clone, Default)]
pub struct PowerSequencer {
    phase: SequencerPhase,
    timer: u32,
    clk_stable: bool,
    seq_fault: bool,
}

impl PowerSequencer {
    pub const fn new() -> Self {
        Self {
            phase: SequencerPhase::Off,
            timer: 0,
            clk_stable: false,
            seq_fault: false,
        }
    }

    #[inline(always)]
    pub fn phase(&self) -> SequencerPhase {
        self.phase
    }

    #[inline(always)]
    pub fn seq_fault(&self) -> bool {
        self.seq_fault
    }

    pub fn status(&self) -> SequencerStatus {
        SequencerStatus {
            phase: self.phase,
            seq_fault: self.seq_fault,
            timer: self.timer,
        }
    }

    /// Close the power switch and start the ramp delay
    ///
    /// Only valid from [`SequencerPhase::Off`].
    pub fn begin_power_up(&mut self) -> bool {
        if self.phase != SequencerPhase::Off {
            return false;
        }
        self.phase = SequencerPhase::PowerOn;
        self.timer = 0;
        self.clk_stable = false;
        true
    }

    /// Assert reset and isolation, drop the clock and wait for idle
    ///
    /// Only valid once the domain has been released.
    pub fn begin_teardown(&mut self) -> bool {
        if !matches!(self.phase, SequencerPhase::Release | SequencerPhase::On) {
            return false;
        }
        self.phase = SequencerPhase::PowerOff;
        self.timer = 0;
        true
    }

    /// Enter FAULT because of a condition outside the ramp
    pub fn halt(&mut self) {
        self.phase = SequencerPhase::Fault;
        self.timer = 0;
    }

    /// External reset: back to OFF with the fault latch cleared
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance one tick
    pub fn step(&mut self, clk_ack: bool, idle: bool, timing: &TimingConfig) -> SequencerEvent {
        match self.phase {
            SequencerPhase::Off | SequencerPhase::On | SequencerPhase::Fault => SequencerEvent::None,

            SequencerPhase::PowerOn => {
                self.timer = self.timer.saturating_add(1);
                if self.timer >= timing.ramp_delay {
                    self.phase = SequencerPhase::WaitStable;
                    self.timer = 0;
                    self.clk_stable = false;
                    SequencerEvent::RampComplete
                } else {
                    SequencerEvent::None
                }
            }

            SequencerPhase::WaitStable => {
                if self.clk_stable {
                    self.timer = self.timer.saturating_add(1);
                } else if clk_ack {
                    self.clk_stable = true;
                    self.timer = 0;
                } else {
                    self.timer = self.timer.saturating_add(1);
                    if self.timer >= timing.clk_timeout {
                        return self.timeout(FaultCode::CLOCK_STABLE_TIMEOUT);
                    }
                    return SequencerEvent::None;
                }

                if self.timer >= timing.settle_ticks() {
                    self.phase = SequencerPhase::Release;
                    self.timer = 0;
                    SequencerEvent::Released
                } else {
                    SequencerEvent::None
                }
            }

            SequencerPhase::Release => {
                self.phase = SequencerPhase::On;
                SequencerEvent::None
            }

            SequencerPhase::PowerOff => {
                self.timer = self.timer.saturating_add(1);
                if idle {
                    self.phase = SequencerPhase::Off;
                    self.timer = 0;
                    SequencerEvent::PoweredOff
                } else if self.timer >= timing.teardown_timeout {
                    self.timeout(FaultCode::TEARDOWN_TIMEOUT)
                } else {
                    SequencerEvent::None
                }
            }
        }
    }

    fn timeout(&mut self, code: FaultCode) -> SequencerEvent {
        log::warn!("sequencer: {} in {}", code, self.phase);
        self.phase = SequencerPhase::Fault;
        self.timer = 0;
        self.seq_fault = true;
        SequencerEvent::Timeout(code)
    }
}

// =============================================================================
// TESTS
// =============================================================================
