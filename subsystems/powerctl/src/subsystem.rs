//! # Tick Driver
//!
//! [`PowerSubsystem`] owns every engine and advances them in lock-step.
//!
//! ## One Tick
//!
//! ```text
//!   committed snapshot (read-only) ──────────────────────────────┐
//!        │                                                        │
//!        ▼                                                        │
//!   ┌──────────┐  caps   ┌──────┐  levels  ┌──────────────┐ cmds ┌─────┐
//!   │ Thermal  │───────▶ │ DVFS │────────▶ │ Coordination │────▶ │ PSM │
//!   └──────────┘ throttle└──────┘          └──────────────┘      └──┬──┘
//!        │                                                          │
//!        └──────────────────────────── next snapshot ◀──────────────┘
//!                                            │
//!                                         commit ──▶ telemetry mirror
//! ```
//!
//! Every engine steps a copy of its committed state; cross-domain reads
//! (dependency readiness, throttle detection, active bitmap) see only the
//! previous committed snapshot. The copy replaces the snapshot once every
//! engine has stepped.

use alloc::format;

use arrayvec::ArrayVec;
use powerctl_types::{
    ClockSource, Command, ControlVector, DomainId, PerfLevel, PowerState, SensorId, Status,
};

use crate::config::PowerConfig;
use crate::coordination::{CoordState, CoordinationEngine, CoordinationInput};
use crate::dvfs::{DvfsEngine, DvfsInput, DvfsState};
use crate::error::{ErrorKind, PowerError, PowerResult};
use crate::psm::{DomainPsm, PsmInputs};
use crate::rails::{RailProvider, RailRequest};
use crate::sequencer::SequencerStatus;
use crate::telemetry::{Telemetry, TelemetryMirror};
use crate::thermal::{ThermalGovernor, ThermalTier};
use crate::{MAX_DOMAINS, MAX_SENSORS};

// =============================================================================
// INPUTS
// =============================================================================

/// Signals sampled from one domain and its host each tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainInputs {
    pub idle: bool,
    pub wake_event: bool,
    /// Work in flight; a busy domain is never treated as idle
    pub busy: bool,
    pub fatal_error: bool,
    /// 0-10000 (hundredths of a percent)
    pub utilization_pct: u16,
    pub latency_urgency: bool,
    pub clk_ack: bool,
    pub volt_ack: bool,
    /// Host command for this tick
    pub command: Command,
}

impl Default for DomainInputs {
    fn default() -> Self {
        Self {
            idle: true,
            wake_event: false,
            busy: false,
            fatal_error: false,
            utilization_pct: 0,
            latency_urgency: false,
            clk_ack: false,
            volt_ack: false,
            command: Command::NONE,
        }
    }
}

impl DomainInputs {
    #[inline(always)]
    fn effective_idle(&self) -> bool {
        self.idle && !self.busy
    }
}

/// Complete input record for one tick
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TickInputs {
    pub domains: ArrayVec<DomainInputs, MAX_DOMAINS>,
    /// Fresh raw code per sensor, `None` to hold
    pub sensors: ArrayVec<Option<u16>, MAX_SENSORS>,
}

impl TickInputs {
    /// Quiescent inputs for the given counts
    pub fn new(num_domains: usize, num_sensors: usize) -> Self {
        let mut inputs = Self::default();
        for _ in 0..num_domains.min(MAX_DOMAINS) {
            inputs.domains.push(DomainInputs::default());
        }
        for _ in 0..num_sensors.min(MAX_SENSORS) {
            inputs.sensors.push(None);
        }
        inputs
    }

    /// Quiescent inputs shaped for `config`
    pub fn for_config(config: &PowerConfig) -> Self {
        Self::new(config.num_domains, config.num_sensors)
    }

    pub fn domain_mut(&mut self, domain: DomainId) -> Option<&mut DomainInputs> {
        self.domains.get_mut(domain.index())
    }

    /// Present a host command to `domain`
    pub fn set_command(&mut self, domain: DomainId, command: Command) {
        if let Some(d) = self.domain_mut(domain) {
            d.command = command;
        }
    }

    /// Provide a fresh sample for `sensor`
    pub fn set_sensor(&mut self, sensor: SensorId, raw: u16) {
        if let Some(s) = self.sensors.get_mut(sensor.index()) {
            *s = Some(raw);
        }
    }
}

// =============================================================================
// OUTPUTS
// =============================================================================

/// Everything driven for one domain after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainOutputs {
    pub control: ControlVector,
    pub clk_request: bool,
    pub clk_mode: PerfLevel,
    pub volt_request: bool,
    pub volt_level: PerfLevel,
    pub clock_source: ClockSource,
    pub status: Status,
    pub sequencer: SequencerStatus,
    pub coordination: CoordState,
    pub dvfs: DvfsState,
    pub thermal_tier: ThermalTier,
    pub thermal_cap: PerfLevel,
    pub thermal_throttle: bool,
}

impl DomainOutputs {
    /// Rail request lines as seen by a [`RailProvider`]
    pub fn rail_request(&self) -> RailRequest {
        RailRequest {
            clk_request: self.clk_request,
            clk_mode: self.clk_mode,
            volt_request: self.volt_request,
            volt_level: self.volt_level,
            clock_source: self.clock_source,
        }
    }
}

/// Complete output record for one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutputs {
    pub domains: ArrayVec<DomainOutputs, MAX_DOMAINS>,
    pub telemetry: Telemetry,
}

impl TickOutputs {
    pub fn domain(&self, domain: DomainId) -> Option<&DomainOutputs> {
        self.domains.get(domain.index())
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Committed state of every engine
#[derive(Debug, Clone)]
struct Snapshot {
    psm: ArrayVec<DomainPsm, MAX_DOMAINS>,
    coordination: CoordinationEngine,
    dvfs: DvfsEngine,
    thermal: ThermalGovernor,
    telemetry: Telemetry,
}

impl Snapshot {
    fn new(config: &PowerConfig) -> Self {
        let mut psm = ArrayVec::new();
        for d in 0..config.num_domains {
            psm.push(DomainPsm::new(DomainId::new(d as u8)));
        }

        Self {
            psm,
            coordination: CoordinationEngine::new(config.num_domains),
            dvfs: DvfsEngine::new(config.num_domains),
            thermal: ThermalGovernor::new(config.num_domains, config.num_sensors),
            telemetry: Telemetry::default(),
        }
    }

    fn states(&self) -> ArrayVec<PowerState, MAX_DOMAINS> {
        self.psm.iter().map(|p| p.state()).collect()
    }
}

// =============================================================================
// SUBSYSTEM
// =============================================================================

/// Multi-domain power management core
#[derive(Debug)]
pub struct PowerSubsystem {
    config: PowerConfig,
    power_up_order: ArrayVec<DomainId, MAX_DOMAINS>,
    committed: Snapshot,
    mirror: TelemetryMirror,
}

impl PowerSubsystem {
    /// Validate `config` and build a subsystem with every domain OFF
    pub fn new(config: PowerConfig) -> PowerResult<Self> {
        let power_up_order = config.validate()?;

        log::info!(
            "powerctl: {} domains, {} sensors, ramp {} ticks",
            config.num_domains,
            config.num_sensors,
            config.timing.ramp_delay
        );

        let committed = Snapshot::new(&config);
        Ok(Self {
            config,
            power_up_order,
            committed,
            mirror: TelemetryMirror::new(),
        })
    }

    pub fn config(&self) -> &PowerConfig {
        &self.config
    }

    /// Dependency-respecting power-up order
    pub fn power_up_order(&self) -> &[DomainId] {
        &self.power_up_order
    }

    /// Committed state of `domain`
    pub fn state(&self, domain: DomainId) -> Option<PowerState> {
        self.committed.psm.get(domain.index()).map(|p| p.state())
    }

    /// Committed state of every domain
    pub fn states(&self) -> ArrayVec<PowerState, MAX_DOMAINS> {
        self.committed.states()
    }

    pub fn psm(&self, domain: DomainId) -> Option<&DomainPsm> {
        self.committed.psm.get(domain.index())
    }

    pub fn coordination_state(&self, domain: DomainId) -> CoordState {
        self.committed.coordination.state(domain)
    }

    pub fn dvfs_state(&self, domain: DomainId) -> Option<DvfsState> {
        self.committed.dvfs.state(domain).copied()
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.committed.telemetry
    }

    /// Handle receiving a copy of the telemetry after every tick
    pub fn mirror(&self) -> TelemetryMirror {
        self.mirror.clone()
    }

    /// Quiescent inputs shaped for this subsystem
    pub fn inputs(&self) -> TickInputs {
        TickInputs::for_config(&self.config)
    }

    fn check_shape(&self, inputs: &TickInputs) -> PowerResult<()> {
        if inputs.domains.len() != self.config.num_domains {
            return Err(PowerError::from_kind(ErrorKind::DomainInputMismatch).with_details(
                format!(
                    "got {}, expected {}",
                    inputs.domains.len(),
                    self.config.num_domains
                ),
            ));
        }
        if inputs.sensors.len() != self.config.num_sensors {
            return Err(PowerError::from_kind(ErrorKind::SensorInputMismatch).with_details(
                format!(
                    "got {}, expected {}",
                    inputs.sensors.len(),
                    self.config.num_sensors
                ),
            ));
        }
        Ok(())
    }

    /// Advance every engine by one tick and commit
    pub fn tick(&mut self, inputs: &TickInputs) -> PowerResult<TickOutputs> {
        self.check_shape(inputs)?;

        let config = &self.config;
        let states = self.committed.states();
        let mut next = self.committed.clone();

        // Thermal governor
        let thermal = next
            .thermal
            .step(&inputs.sensors, &config.sensor_map, &config.thermal);

        // DVFS policy
        let dvfs_inputs: ArrayVec<DvfsInput, MAX_DOMAINS> = inputs
            .domains
            .iter()
            .enumerate()
            .map(|(d, i)| DvfsInput {
                utilization_pct: i.utilization_pct,
                latency_urgency: i.latency_urgency,
                thermal_cap: next.thermal.cap(DomainId::new(d as u8)),
            })
            .collect();
        next.dvfs.step(&dvfs_inputs, &config.dvfs);

        // Coordination
        let coord_inputs: ArrayVec<CoordinationInput, MAX_DOMAINS> = inputs
            .domains
            .iter()
            .enumerate()
            .map(|(d, i)| CoordinationInput {
                host_command: i.command,
                requested_level: next.dvfs.requested_level(DomainId::new(d as u8)),
                clk_ack: i.clk_ack,
                volt_ack: i.volt_ack,
            })
            .collect();
        let coordination = next
            .coordination
            .step(&coord_inputs, &states, &config.dependencies);

        // PSM + embedded sequencer
        let mut domains: ArrayVec<DomainOutputs, MAX_DOMAINS> = ArrayVec::new();
        for (d, psm) in next.psm.iter_mut().enumerate() {
            let domain = DomainId::new(d as u8);
            let input = inputs.domains[d];
            let coord = coordination.domains[d];
            let thermal_state = next.thermal.domain(domain).copied().unwrap_or_default();

            let psm_inputs = PsmInputs {
                command: coord.forwarded,
                clk_ack: input.clk_ack,
                volt_ack: input.volt_ack,
                idle: input.effective_idle(),
                wake_event: input.wake_event,
                thermal_throttle: thermal_state.throttle,
                fatal_error: input.fatal_error,
                deps_ready: config.dependencies.deps_ready(domain, &states),
            };
            let out = psm.step(&psm_inputs, &config.timing);

            domains.push(DomainOutputs {
                control: out.control,
                clk_request: out.clk_request || coord.clk_request,
                clk_mode: out.clk_mode,
                volt_request: out.volt_request || coord.volt_request,
                volt_level: out.volt_level,
                clock_source: coord.clock_source,
                status: out.status,
                sequencer: out.sequencer,
                coordination: coord.state,
                dvfs: next.dvfs.state(domain).copied().unwrap_or_default(),
                thermal_tier: thermal_state.tier,
                thermal_cap: thermal_state.cap(),
                thermal_throttle: thermal_state.throttle,
            });
        }

        let faulted = domains.iter().filter(|o| o.status.fault).count() as u32;
        next.telemetry.record(&thermal, &coordination, faulted);
        let telemetry = next.telemetry;

        // Commit
        self.committed = next;
        self.mirror.publish(&telemetry);

        log::trace!(
            "powerctl: tick {} global {} active {:#x}",
            telemetry.tick,
            telemetry.global_perf_level,
            telemetry.active_domains.bits()
        );

        Ok(TickOutputs { domains, telemetry })
    }

    /// Drive `ticks` ticks in a closed loop with `rails`
    ///
    /// Before each tick `stimulus` receives the tick index and a quiescent
    /// input record to fill in; rail acknowledgements are then filled from
    /// the requests driven on the previous tick. Returns the last outputs.
    pub fn run<R, F>(&mut self, rails: &mut R, ticks: u32, mut stimulus: F) -> PowerResult<Option<TickOutputs>>
    where
        R: RailProvider,
        F: FnMut(u32, &mut TickInputs),
    {
        let mut last: Option<TickOutputs> = None;

        for n in 0..ticks {
            let mut inputs = self.inputs();
            stimulus(n, &mut inputs);

            if let Some(prev) = &last {
                for (d, out) in prev.domains.iter().enumerate() {
                    let ack = rails.respond(DomainId::new(d as u8), &out.rail_request());
                    if let Some(input) = inputs.domains.get_mut(d) {
                        input.clk_ack = ack.clk_ack;
                        input.volt_ack = ack.volt_ack;
                    }
                }
            }

            last = Some(self.tick(&inputs)?);
        }

        Ok(last)
    }
}

// =============================================================================
// TESTS
// =============================================================================
