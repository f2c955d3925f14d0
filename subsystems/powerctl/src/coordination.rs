//! # Power Coordination Engine
//!
//! Sits between the policy layer and the per-domain PSMs. For every domain it
//! holds at most one pending request (a host command, or a policy target
//! derived from the DVFS level), gates that request on the dependency matrix
//! and forwards it to the PSM once the domain's prerequisites are ready.
//!
//! ## Per-Domain Sequencer
//!
//! ```text
//!             request pending, deps ready
//!   ┌──────┐ ─────────────────────────────────────▶ ┌───────────┐
//!   │ IDLE │                                         │ WAIT_ACKS │
//!   └──┬───┘ ◀───── target reached + clk/volt ack ── └─────▲─────┘
//!      │                                                   │
//!      │ request pending, deps not ready   ┌───────────┐   │ deps ready
//!      └──────────────────────────────────▶│ WAIT_DEPS │───┘
//!                                          └───────────┘
//! ```
//!
//! Power-down and forced requests bypass the dependency gate and are
//! forwarded immediately. Host commands the PSM would refuse in the current
//! state are dropped on arrival and never displace the policy request. Reads of other domains' state always come from the
//! previous committed snapshot.

use core::fmt;

use arrayvec::ArrayVec;
use powerctl_types::{ClockSource, Command, DomainId, DomainMask, PerfLevel, PowerState};

use crate::dependency::DependencyMatrix;
use crate::psm::accepts_command;
use crate::MAX_DOMAINS;

// =============================================================================
// TYPES
// =============================================================================

/// Coordination sequencer state of one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CoordState {
    #[default]
    Idle     = 0,
    WaitDeps = 1,
    WaitAcks = 2,
}

impl fmt::Display for CoordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoordState::Idle => "IDLE",
            CoordState::WaitDeps => "WAIT_DEPS",
            CoordState::WaitAcks => "WAIT_ACKS",
        };
        f.write_str(name)
    }
}

/// Origin of a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSource {
    /// Host command; held until reached, refused or overwritten
    Host,
    /// DVFS/thermal policy; recomputed every tick
    Policy,
}

/// Request waiting to be carried out by a domain's PSM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub command: Command,
    pub source: RequestSource,
}

impl PendingRequest {
    /// Forwarded without waiting for prerequisites
    pub fn bypasses_dependencies(&self) -> bool {
        self.command.force || self.command.requested_state == PowerState::Off
    }
}

/// Per-domain inputs for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoordinationInput {
    pub host_command: Command,
    /// Final DVFS level for this tick
    pub requested_level: PerfLevel,
    pub clk_ack: bool,
    pub volt_ack: bool,
}

/// Per-domain coordination outputs for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DomainCoordination {
    pub state: CoordState,
    /// Command presented to the PSM this tick
    pub forwarded: Command,
    pub clk_request: bool,
    pub volt_request: bool,
    pub clock_source: ClockSource,
    pub pending: bool,
}

/// Aggregate result of one coordination step
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoordinationReport {
    pub domains: ArrayVec<DomainCoordination, MAX_DOMAINS>,
    /// Max requested level across domains
    pub global_level: PerfLevel,
    /// Domains not in OFF or FAULT
    pub active_domains: DomainMask,
    /// Domains running high while asked to run low
    pub throttle_events: u32,
}

/// Policy target for a domain in `state` with DVFS level `level`
pub fn policy_request(state: PowerState, level: PerfLevel) -> Option<Command> {
    if level == PerfLevel::OFF {
        return state.is_active().then(|| Command::request(PowerState::Off));
    }
    if state.is_run() && state.perf_level() != level {
        return Some(Command::run_at(level));
    }
    None
}

// =============================================================================
// DOMAIN COORDINATOR
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct DomainCoordinator {
    state: CoordState,
    pending: Option<PendingRequest>,
}

impl DomainCoordinator {
    fn step(
        &mut self,
        domain: DomainId,
        input: &CoordinationInput,
        states: &[PowerState],
        deps: &DependencyMatrix,
    ) -> DomainCoordination {
        let current = states.get(domain.index()).copied().unwrap_or_default();
        let prev = self.state;

        // Retire requests the domain has reached or would refuse
        if let Some(p) = self.pending {
            if current == p.command.requested_state || !accepts_command(current, &p.command) {
                self.pending = None;
            }
        }

        let mut forwarded = Command::NONE;
        let host = input.host_command.valid.then_some(input.host_command);
        let host = host.filter(|cmd| {
            let accepted = accepts_command(current, cmd);
            if !accepted {
                log::debug!(
                    "coord[{}]: host request {} refused in {}",
                    domain.raw(),
                    cmd.requested_state,
                    current
                );
            }
            accepted
        });

        if let Some(host) = host {
            if host.requested_state == current {
                // Already there: acknowledge without opening a handshake
                forwarded = host;
                self.pending = None;
            } else {
                self.pending = Some(PendingRequest {
                    command: host,
                    source: RequestSource::Host,
                });
            }
        } else if !matches!(self.pending, Some(p) if p.source == RequestSource::Host) {
            self.pending = policy_request(current, input.requested_level).map(|command| {
                PendingRequest {
                    command,
                    source: RequestSource::Policy,
                }
            });
        }

        if current == PowerState::Fault && !self.pending.is_some_and(|p| p.command.force) {
            self.state = CoordState::Idle;
        } else {
            match self.pending {
                Some(p) if p.bypasses_dependencies() => {
                    forwarded = p.command;
                    self.state = CoordState::Idle;
                }
                Some(p) => {
                    if deps.deps_ready(domain, states) {
                        forwarded = p.command;
                        self.state = CoordState::WaitAcks;
                    } else {
                        self.state = CoordState::WaitDeps;
                    }
                }
                None => {
                    self.state = match self.state {
                        CoordState::WaitAcks if !(input.clk_ack && input.volt_ack) => {
                            CoordState::WaitAcks
                        }
                        _ => CoordState::Idle,
                    };
                }
            }
        }

        if self.state != prev {
            log::debug!("coord[{}]: {} -> {}", domain.raw(), prev, self.state);
        }

        let waiting = self.state == CoordState::WaitAcks;
        DomainCoordination {
            state: self.state,
            forwarded,
            clk_request: waiting,
            volt_request: waiting,
            clock_source: input.requested_level.clock_source(),
            pending: self.pending.is_some(),
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Coordination engine for all domains
#[derive(Debug, Clone)]
pub struct CoordinationEngine {
    domains: ArrayVec<DomainCoordinator, MAX_DOMAINS>,
}

impl CoordinationEngine {
    pub fn new(num_domains: usize) -> Self {
        let mut domains = ArrayVec::new();
        for _ in 0..num_domains.min(MAX_DOMAINS) {
            domains.push(DomainCoordinator::default());
        }
        Self { domains }
    }

    /// Sequencer state of `domain`
    pub fn state(&self, domain: DomainId) -> CoordState {
        self.domains
            .get(domain.index())
            .map(|c| c.state)
            .unwrap_or_default()
    }

    /// Pending request of `domain`
    pub fn pending(&self, domain: DomainId) -> Option<PendingRequest> {
        self.domains.get(domain.index()).and_then(|c| c.pending)
    }

    /// Advance one tick
    ///
    /// `inputs` is indexed by domain; `states` is the previous committed
    /// PSM snapshot.
    pub fn step(
        &mut self,
        inputs: &[CoordinationInput],
        states: &[PowerState],
        deps: &DependencyMatrix,
    ) -> CoordinationReport {
        let mut report = CoordinationReport::default();

        for (d, coordinator) in self.domains.iter_mut().enumerate() {
            let domain = DomainId::new(d as u8);
            let input = inputs.get(d).copied().unwrap_or_default();
            let current = states.get(d).copied().unwrap_or_default();

            report.domains.push(coordinator.step(domain, &input, states, deps));

            if current.is_active() {
                report.active_domains.insert(domain);
            }
            if input.requested_level <= PerfLevel::LOW
                && matches!(current, PowerState::RunHigh | PowerState::Turbo)
            {
                report.throttle_events += 1;
            }
            report.global_level = report.global_level.max(input.requested_level);
        }

        report
    }
}

// =============================================================================
// TESTS
// =============================================================================
