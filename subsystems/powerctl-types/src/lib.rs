//! # Power Control Types
//!
//! Signal-level vocabulary shared by every layer of the GPU power
//! management core: domain and sensor indices, power states and the control
//! lines they imply, performance levels, and the per-tick command/status
//! records exchanged with each domain's state machine.
//!
//! Nothing here allocates or carries behaviour beyond pure mappings, so the
//! crate can be linked into firmware, host tooling and test benches alike.

#![no_std]
#![deny(missing_debug_implementations)]

pub mod ids;
pub mod level;
pub mod mask;
pub mod signal;
pub mod state;

pub use ids::{DomainId, SensorId};
pub use level::{ClockSource, PerfLevel};
pub use mask::{DomainMask, SensorMask};
pub use signal::{Command, FaultCode, Status};
pub use state::{ControlVector, PowerState};
