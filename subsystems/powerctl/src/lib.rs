//! # powerctl: GPU Power and Performance Management Core
//!
//! Deterministic, tick-driven model of the control logic that powers a
//! mobile GPU's independently gated domains (shader clusters, ray-tracing
//! unit, caches, memory controller, fabric) up and down, picks their
//! operating points and keeps them inside thermal limits.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                          POWERCTL TICK PIPELINE                           │
//! │                                                                           │
//! │  sensors ──▶ ┌──────────────┐ caps ┌──────────────┐ levels                │
//! │              │   Thermal    │─────▶│     DVFS     │────────┐              │
//! │              │   Governor   │      │ Policy Engine│        │              │
//! │              └──────┬───────┘      └──────────────┘        ▼              │
//! │                     │ throttle              ┌───────────────────────┐     │
//! │                     │             host ────▶│ Power Coordination    │     │
//! │                     │           commands    │ Engine (deps, acks)   │     │
//! │                     │                       └──────────┬────────────┘     │
//! │                     │                                  │ commands         │
//! │                     ▼                                  ▼                  │
//! │              ┌──────────────────────────────────────────────────┐         │
//! │              │  per-domain PSM  ⇄  embedded Power Sequencer     │         │
//! │              └───────────────────────┬──────────────────────────┘         │
//! │                                      ▼                                    │
//! │                 iso / rst / clk_en / ret / pwr_sw, clk & volt requests    │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//!
//! 1. **Pure control vector**: a domain's control lines are a function of its
//!    committed state alone.
//!
//! 2. **Sticky FAULT**: a faulted domain stays faulted until it is given a
//!    forced OFF command.
//!
//! 3. **Dependency respect**: a domain never starts a power-up or level change
//!    while one of its prerequisites is OFF, ramping or faulted.
//!
//! 4. **Snapshot discipline**: every engine computes its next state from the
//!    previous committed snapshot; nothing another engine reads is mutated
//!    mid-tick.
//!
//! 5. **No cycles**: the dependency matrix is validated acyclic when the
//!    subsystem is built.
//!
//! ## Example
//!
//! ```rust,ignore
//! let config = PowerConfig::new(4, 4)
//!     .with_dependency(DomainId::new(0), DomainId::new(3))?;
//! let mut gpu = PowerSubsystem::new(config)?;
//!
//! gpu.run(&mut ImmediateRails, 200, |tick, inputs| {
//!     if tick == 0 {
//!         inputs.set_command(DomainId::new(3), Command::request(PowerState::Idle));
//!         inputs.set_command(DomainId::new(0), Command::request(PowerState::RunBal));
//!     }
//! })?;
//! ```

#![cfg_attr(not(test), no_std)]

// =============================================================================
// EXTERNAL DEPENDENCIES
// =============================================================================

extern crate alloc;

use static_assertions::const_assert;

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Configuration and validation
pub mod config;

/// Dependency matrix and topological validation
pub mod dependency;

/// Error types
pub mod error;

/// Power coordination engine
pub mod coordination;

/// DVFS policy engine
pub mod dvfs;

/// Per-domain power state machine
pub mod psm;

/// Clock/voltage rail providers
pub mod rails;

/// Power-up/power-down ramp sequencer
pub mod sequencer;

/// Tick driver
pub mod subsystem;

/// Counters and the host-readable mirror
pub mod telemetry;

/// Thermal governor
pub mod thermal;

#[cfg(test)]
mod tests;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use config::{DvfsConfig, PowerConfig, ThermalConfig, Threshold, TimingConfig};
pub use coordination::{CoordState, CoordinationEngine};
pub use dependency::DependencyMatrix;
pub use dvfs::{DvfsEngine, DvfsState};
pub use error::{ErrorKind, PowerError, PowerResult};
pub use psm::DomainPsm;
pub use rails::{DelayedRails, ImmediateRails, RailAck, RailProvider, RailRequest};
pub use sequencer::{PowerSequencer, SequencerPhase, SequencerStatus};
pub use subsystem::{DomainInputs, DomainOutputs, PowerSubsystem, TickInputs, TickOutputs};
pub use telemetry::{Telemetry, TelemetryMirror};
pub use thermal::{ThermalGovernor, ThermalTier};

pub use powerctl_types::{
    ClockSource, Command, ControlVector, DomainId, DomainMask, FaultCode, PerfLevel, PowerState,
    SensorId, SensorMask, Status,
};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum number of power domains (domain bitmaps are `u32`)
pub const MAX_DOMAINS: usize = 32;

/// Maximum number of thermal sensors (sensor bitmaps are `u32`)
pub const MAX_SENSORS: usize = 32;

/// Domain count used by [`PowerConfig::default`]
pub const DEFAULT_NUM_DOMAINS: usize = 8;

/// Sensor count used by [`PowerConfig::default`]
pub const DEFAULT_NUM_SENSORS: usize = 8;

const_assert!(MAX_DOMAINS <= u32::BITS as usize);
const_assert!(MAX_SENSORS <= u32::BITS as usize);
const_assert!(DEFAULT_NUM_DOMAINS <= MAX_DOMAINS);
const_assert!(DEFAULT_NUM_SENSORS <= MAX_SENSORS);
