//! # Power State Machine
//!
//! One [`DomainPsm`] per domain owns the domain's power lifecycle and drives
//! its control lines. The physical ramp timing is delegated to an embedded
//! [`PowerSequencer`].
//!
//! ## Lifecycle
//!
//! ```text
//!                      cmd≠OFF | wake (deps ready)
//!   ┌─────┐ ─────────────────────────────────────────▶ ┌───────────┐
//!   │ OFF │                                            │ RETENTION │
//!   └─────┘ ◀────────────── idle ─────────────────┐    └─────┬─────┘
//!      ▲                                          │          │ ramp_delay
//!      │ forced OFF                        ┌──────┴────┐     ▼
//!      │                                   │ RETENTION │ ┌─────────┐
//!   ┌──┴────┐                              │ (teardown)│ │ STANDBY │
//!   │ FAULT │ ◀── timeouts, fatal_error    └──────▲────┘ └────┬────┘
//!   └───────┘                                     │ OFF       │ clk_ack + settle
//!                                                 │           ▼
//!                  ┌──────────────────────┐  ┌────┴─┐     ┌──────┐
//!                  │ RUN_LOW .. TURBO     │◀─│      │◀────│ IDLE │
//!                  │ (clk + volt acks)    │──▶      │────▶│      │
//!                  └──────────────────────┘  └──────┘     └──────┘
//! ```
//!
//! ## Priority Within a Tick
//!
//! 1. `fatal_error` (unless the command is valid and forced) → FAULT
//! 2. valid forced OFF → OFF from any state, sequencer reset
//! 3. FAULT holds
//! 4. per-state transition logic

use powerctl_types::{Command, ControlVector, DomainId, FaultCode, PerfLevel, PowerState, Status};

use crate::config::TimingConfig;
use crate::sequencer::{PowerSequencer, SequencerEvent, SequencerPhase, SequencerStatus};

// =============================================================================
// SIGNALS
// =============================================================================

/// Everything a PSM samples in one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsmInputs {
    pub command: Command,
    pub clk_ack: bool,
    pub volt_ack: bool,
    pub idle: bool,
    pub wake_event: bool,
    pub thermal_throttle: bool,
    pub fatal_error: bool,
    /// All prerequisites ready in the previous committed snapshot
    pub deps_ready: bool,
}

impl Default for PsmInputs {
    fn default() -> Self {
        Self {
            command: Command::NONE,
            clk_ack: false,
            volt_ack: false,
            idle: true,
            wake_event: false,
            thermal_throttle: false,
            fatal_error: false,
            deps_ready: true,
        }
    }
}

/// Everything a PSM drives after one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsmOutputs {
    pub control: ControlVector,
    pub clk_request: bool,
    pub clk_mode: PerfLevel,
    pub volt_request: bool,
    pub volt_level: PerfLevel,
    pub status: Status,
    pub sequencer: SequencerStatus,
}

/// Clock/voltage acknowledgement tracking after a RUN level change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct RunHandshake {
    clk_seen: bool,
    volt_seen: bool,
    timer: u32,
}

impl RunHandshake {
    fn complete(&self) -> bool {
        self.clk_seen && self.volt_seen
    }
}

/// Whether a PSM in `state` acknowledges `command`
///
/// Only a forced OFF is honoured in FAULT. Intermediate ramp states are
/// only meaningful as a wake-up target from OFF.
pub fn accepts_command(state: PowerState, command: &Command) -> bool {
    if command.is_forced_off() {
        return true;
    }
    if state == PowerState::Fault {
        return false;
    }
    match command.requested_state {
        PowerState::Fault => false,
        PowerState::Retention | PowerState::Standby => state == PowerState::Off,
        _ => true,
    }
}

// =============================================================================
// DOMAIN PSM
// =============================================================================

/// Power state machine for one domain
#[derive(Debug, Clone)]
pub struct DomainPsm {
    id: DomainId,
    state: PowerState,
    sequencer: PowerSequencer,
    /// Latched command target, cleared once reached
    target: Option<PowerState>,
    handshake: RunHandshake,
    fault_code: FaultCode,
    last_transition_latency: u32,
}

impl DomainPsm {
    pub fn new(id: DomainId) -> Self {
        Self {
            id,
            state: PowerState::Off,
            sequencer: PowerSequencer::new(),
            target: None,
            handshake: RunHandshake::default(),
            fault_code: FaultCode::NONE,
            last_transition_latency: 0,
        }
    }

    #[inline(always)]
    pub fn id(&self) -> DomainId {
        self.id
    }

    #[inline(always)]
    pub fn state(&self) -> PowerState {
        self.state
    }

    #[inline(always)]
    pub fn target(&self) -> Option<PowerState> {
        self.target
    }

    #[inline(always)]
    pub fn fault_code(&self) -> FaultCode {
        self.fault_code
    }

    #[inline(always)]
    pub fn last_transition_latency(&self) -> u32 {
        self.last_transition_latency
    }

    pub fn sequencer(&self) -> &PowerSequencer {
        &self.sequencer
    }

    /// Advance one tick and return the driven outputs
    pub fn step(&mut self, inputs: &PsmInputs, timing: &TimingConfig) -> PsmOutputs {
        let prev = self.state;
        let cmd = inputs.command;
        let overridden = cmd.valid && cmd.force;
        let mut ack = false;

        if inputs.fatal_error && !overridden {
            self.enter_fault(FaultCode::FATAL_ERROR);
        } else if cmd.is_forced_off() {
            self.reset();
            ack = true;
        } else if self.state != PowerState::Fault {
            if cmd.valid && accepts_command(self.state, &cmd) {
                self.target = Some(cmd.requested_state);
                ack = true;
            }
            self.advance(inputs, timing);
            if self.target == Some(self.state) {
                self.target = None;
            }
        }

        if self.state != prev {
            log::debug!("psm[{}]: {} -> {}", self.id.raw(), prev, self.state);
        }

        self.outputs(ack)
    }

    fn advance(&mut self, inputs: &PsmInputs, timing: &TimingConfig) {
        match self.state {
            PowerState::Off => {
                let wanted = matches!(self.target, Some(t) if t != PowerState::Off);
                let gated = inputs.deps_ready || inputs.command.force;
                if (wanted || inputs.wake_event) && gated && self.sequencer.begin_power_up() {
                    self.state = PowerState::Retention;
                }
            }

            PowerState::Retention | PowerState::Standby => {
                if self.state == PowerState::Standby {
                    self.last_transition_latency = self.last_transition_latency.saturating_add(1);
                }
                let event = self.sequencer.step(inputs.clk_ack, inputs.idle, timing);
                self.on_sequencer_event(event);
            }

            PowerState::Idle => {
                self.sequencer.step(inputs.clk_ack, inputs.idle, timing);

                match self.target {
                    Some(PowerState::Off) => self.begin_teardown(),
                    _ if inputs.thermal_throttle => self.enter_run(PowerState::RunLow),
                    Some(t) if t.is_run() => self.enter_run(t),
                    _ if !inputs.idle => self.enter_run(PowerState::RunBal),
                    _ => {}
                }
            }

            PowerState::RunLow | PowerState::RunBal | PowerState::RunHigh | PowerState::Turbo => {
                self.sequencer.step(inputs.clk_ack, inputs.idle, timing);
                self.advance_run(inputs, timing);
            }

            PowerState::Fault => {}
        }
    }

    fn advance_run(&mut self, inputs: &PsmInputs, timing: &TimingConfig) {
        if self.target == Some(PowerState::Off) {
            self.begin_teardown();
            return;
        }

        let hs = &mut self.handshake;
        hs.clk_seen |= inputs.clk_ack;
        hs.volt_seen |= inputs.volt_ack;

        if !hs.complete() {
            hs.timer = hs.timer.saturating_add(1);
            if hs.timer >= timing.run_ack_timeout {
                self.enter_fault(FaultCode::RUN_ACK_TIMEOUT);
            }
            return;
        }

        if inputs.thermal_throttle {
            if self.state != PowerState::RunLow {
                self.enter_run(PowerState::RunLow);
            }
            return;
        }

        match self.target {
            Some(t) if t.is_run() => {
                if t != self.state {
                    self.enter_run(t);
                }
            }
            Some(PowerState::Idle) => self.state = PowerState::Idle,
            _ if inputs.idle => self.state = PowerState::Idle,
            _ => {}
        }
    }

    fn on_sequencer_event(&mut self, event: SequencerEvent) {
        match event {
            SequencerEvent::None => {}
            SequencerEvent::RampComplete => {
                self.state = PowerState::Standby;
                self.last_transition_latency = 0;
            }
            SequencerEvent::Released => self.state = PowerState::Idle,
            SequencerEvent::PoweredOff => self.state = PowerState::Off,
            SequencerEvent::Timeout(code) => self.enter_fault(code),
        }
    }

    fn enter_run(&mut self, level: PowerState) {
        self.state = level;
        self.handshake = RunHandshake::default();
    }

    fn begin_teardown(&mut self) {
        if self.sequencer.begin_teardown() {
            self.state = PowerState::Retention;
        }
    }

    fn enter_fault(&mut self, code: FaultCode) {
        if self.state != PowerState::Fault || self.fault_code != code {
            log::warn!("psm[{}]: fault {} in {}", self.id.raw(), code, self.state);
        }
        self.state = PowerState::Fault;
        self.fault_code = code;
        self.target = None;
        if self.sequencer.phase() != SequencerPhase::Fault {
            self.sequencer.halt();
        }
    }

    /// Full reset to OFF
    fn reset(&mut self) {
        self.state = PowerState::Off;
        self.sequencer.reset();
        self.target = None;
        self.handshake = RunHandshake::default();
        self.fault_code = FaultCode::NONE;
    }

    fn busy(&self) -> bool {
        self.sequencer.phase().is_ramping()
            || self.target.is_some()
            || (self.state.is_run() && !self.handshake.complete())
    }

    /// Outputs implied by the committed state
    pub fn outputs(&self, ack: bool) -> PsmOutputs {
        let level = self.state.perf_level();
        let operational = self.state.is_operational();

        PsmOutputs {
            control: self.state.control_vector(),
            clk_request: operational || self.state == PowerState::Standby,
            clk_mode: level,
            volt_request: operational,
            volt_level: level,
            status: Status {
                ack,
                current_state: self.state,
                busy: self.busy(),
                fault: self.state == PowerState::Fault,
                fault_code: self.fault_code,
                last_transition_latency: self.last_transition_latency,
            },
            sequencer: self.sequencer.status(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
