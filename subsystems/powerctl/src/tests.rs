//! End-to-end tests driving the whole subsystem in a closed rail loop.

use crate::rails::{DelayedRails, ImmediateRails, RailProvider};
use crate::*;

// =============================================================================
// HARNESS
// =============================================================================

/// Subsystem plus rail model, checking the global invariants after each tick
struct Harness<R: RailProvider> {
    gpu: PowerSubsystem,
    rails: R,
    last: Option<TickOutputs>,
}

impl Harness<ImmediateRails> {
    fn new(config: PowerConfig) -> Self {
        Self::with_rails(config, ImmediateRails)
    }
}

impl<R: RailProvider> Harness<R> {
    fn with_rails(config: PowerConfig, rails: R) -> Self {
        Self {
            gpu: PowerSubsystem::new(config).unwrap(),
            rails,
            last: None,
        }
    }

    fn step<F: FnOnce(&mut TickInputs)>(&mut self, stimulus: F) -> TickOutputs {
        let mut inputs = self.gpu.inputs();
        stimulus(&mut inputs);

        if let Some(prev) = &self.last {
            for (d, out) in prev.domains.iter().enumerate() {
                let ack = self.rails.respond(DomainId::new(d as u8), &out.rail_request());
                inputs.domains[d].clk_ack = ack.clk_ack;
                inputs.domains[d].volt_ack = ack.volt_ack;
            }
        }

        let before = self.gpu.states();
        let prev_telemetry = *self.gpu.telemetry();
        let out = self.gpu.tick(&inputs).unwrap();

        check_invariants(&self.gpu, &before, &inputs, &out);
        assert!(out.telemetry.throttle_count >= prev_telemetry.throttle_count);
        let faulted = out.domains.iter().filter(|o| o.status.fault).count() as u64;
        assert_eq!(out.telemetry.fault_count, prev_telemetry.fault_count + faulted);
        assert!(out.telemetry.overtemp_events >= prev_telemetry.overtemp_events);

        self.last = Some(out.clone());
        out
    }

    fn quiet(&mut self) -> TickOutputs {
        self.step(|_| {})
    }

    /// Step with `stimulus` until `done` holds
    fn run_until<F, P>(&mut self, mut stimulus: F, done: P) -> TickOutputs
    where
        F: FnMut(&mut TickInputs),
        P: Fn(&TickOutputs) -> bool,
    {
        for _ in 0..1_000 {
            let out = self.step(&mut stimulus);
            if done(&out) {
                return out;
            }
        }
        panic!("condition not reached within 1000 ticks");
    }
}

fn check_invariants(
    gpu: &PowerSubsystem,
    before: &[PowerState],
    inputs: &TickInputs,
    out: &TickOutputs,
) {
    for (d, o) in out.domains.iter().enumerate() {
        let domain = DomainId::new(d as u8);
        let state = o.status.current_state;
        let cmd = inputs.domains[d].command;

        assert_eq!(Some(state), gpu.state(domain));
        assert_eq!(o.control, state.control_vector(), "domain {} in {}", d, state);
        assert_eq!(o.status.fault, state == PowerState::Fault);
        if state == PowerState::Fault {
            assert!(!o.status.fault_code.is_none());
        }

        if before[d] == PowerState::Fault && !(cmd.valid && cmd.force) {
            assert_eq!(state, PowerState::Fault, "domain {} left FAULT unforced", d);
        }

        if before[d] == PowerState::Off && state == PowerState::Retention {
            assert!(
                gpu.config().dependencies.deps_ready(domain, before),
                "domain {} powered up ahead of its prerequisites",
                d
            );
        }
    }
}

fn d(i: u8) -> DomainId {
    DomainId::new(i)
}

fn load(inputs: &mut TickInputs, domain: DomainId, utilization_pct: u16) {
    if let Some(i) = inputs.domain_mut(domain) {
        i.idle = false;
        i.utilization_pct = utilization_pct;
    }
}

fn settled(out: &TickOutputs, domain: DomainId, state: PowerState) -> bool {
    out.domain(domain)
        .map(|o| o.status.current_state == state && !o.status.busy)
        .unwrap_or(false)
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn test_host_request_walks_power_up_ladder() {
    let mut h = Harness::new(PowerConfig::new(1, 1));

    let first = h.step(|i| {
        load(i, d(0), 5_000);
        i.set_command(d(0), Command::request(PowerState::RunBal));
    });
    assert!(first.domains[0].status.ack);
    assert_eq!(first.domains[0].status.current_state, PowerState::Retention);
    assert_eq!(first.domains[0].coordination, CoordState::WaitAcks);

    let mut visited = vec![PowerState::Retention];
    let mut standby_ticks = 0;
    let mut last = first;
    for _ in 0..200 {
        last = h.step(|i| load(i, d(0), 5_000));
        let state = last.domains[0].status.current_state;
        if state == PowerState::Standby {
            standby_ticks += 1;
        }
        if visited.last() != Some(&state) {
            visited.push(state);
        }
    }

    assert_eq!(
        visited,
        [
            PowerState::Retention,
            PowerState::Standby,
            PowerState::Idle,
            PowerState::RunBal
        ]
    );
    assert_eq!(standby_ticks, 7);

    let out = &last.domains[0];
    assert_eq!(out.status.last_transition_latency, 7);
    assert_eq!(out.control, ControlVector::RELEASED);
    assert_eq!(out.coordination, CoordState::Idle);
    assert_eq!(out.dvfs.requested_level, PerfLevel::BALANCED);
    assert_eq!(out.clock_source, ClockSource::Oscillator);
    assert!(!out.status.busy);
}

#[test]
fn test_throttle_crossing_drops_to_run_low() {
    let mut h = Harness::new(PowerConfig::new(1, 1));
    let hot_load = |i: &mut TickInputs| load(i, d(0), 7_500);

    h.step(|i| {
        hot_load(i);
        i.set_command(d(0), Command::request(PowerState::RunHigh));
    });
    let out = h.run_until(hot_load, |o| settled(o, d(0), PowerState::RunHigh));
    assert_eq!(out.telemetry.throttle_count, 0);

    // One sample drives the filtered reading to 1000: throttle, not critical
    let out = h.step(|i| {
        hot_load(i);
        i.set_sensor(SensorId::new(0), 4_000);
    });
    let dom = &out.domains[0];
    assert_eq!(dom.thermal_tier, ThermalTier::Throttle);
    assert_eq!(dom.thermal_cap, PerfLevel::LOW);
    assert!(dom.thermal_throttle);
    assert_eq!(dom.dvfs.requested_level, PerfLevel::LOW);
    assert_eq!(dom.status.current_state, PowerState::RunLow);
    assert_eq!(out.telemetry.throttle_count, 1);

    for _ in 0..20 {
        let out = h.step(hot_load);
        assert_eq!(out.domains[0].status.current_state, PowerState::RunLow);
        assert_eq!(out.telemetry.throttle_count, 1);
    }
}

#[test]
fn test_dependency_holds_power_up() {
    let config = PowerConfig::new(2, 2).with_dependency(d(0), d(1)).unwrap();
    let mut h = Harness::new(config);
    assert_eq!(h.gpu.power_up_order(), &[d(1), d(0)]);

    let out = h.step(|i| i.set_command(d(0), Command::request(PowerState::Idle)));
    assert_eq!(out.domains[0].coordination, CoordState::WaitDeps);

    for _ in 0..20 {
        let out = h.quiet();
        assert_eq!(out.domains[0].coordination, CoordState::WaitDeps);
        assert_eq!(out.domains[0].status.current_state, PowerState::Off);
        assert!(!out.domains[0].clk_request);
    }

    let mut prev = h.step(|i| i.set_command(d(1), Command::request(PowerState::Idle)));
    let mut released = false;
    for _ in 0..200 {
        let out = h.quiet();
        if prev.domains[1].status.current_state.is_operational() {
            assert_eq!(out.domains[0].coordination, CoordState::WaitAcks);
            assert_eq!(out.domains[0].status.current_state, PowerState::Retention);
            released = true;
            break;
        }
        assert_eq!(out.domains[0].coordination, CoordState::WaitDeps);
        assert_eq!(out.domains[0].status.current_state, PowerState::Off);
        prev = out;
    }
    assert!(released);

    h.run_until(|_| {}, |o| settled(o, d(0), PowerState::Idle));
    assert_eq!(h.gpu.state(d(1)), Some(PowerState::Idle));
}

#[test]
fn test_critical_temperature_shuts_domain_down() {
    let mut h = Harness::new(PowerConfig::new(2, 2));
    h.step(|i| {
        i.set_command(d(0), Command::request(PowerState::Idle));
        i.set_command(d(1), Command::request(PowerState::Idle));
    });
    h.run_until(
        |_| {},
        |o| settled(o, d(0), PowerState::Idle) && settled(o, d(1), PowerState::Idle),
    );

    let out = h.step(|i| i.set_sensor(SensorId::new(0), 8_000));
    assert_eq!(out.domains[0].thermal_tier, ThermalTier::Critical);
    assert_eq!(out.domains[0].thermal_cap, PerfLevel::OFF);
    assert_eq!(out.domains[1].thermal_tier, ThermalTier::Normal);
    assert_eq!(out.telemetry.global_cap, PerfLevel::OFF);
    assert!(out.telemetry.crit_shutdown);
    assert_eq!(out.telemetry.overtemp_events, 1);

    for k in 2..=20u64 {
        let out = h.quiet();
        assert_eq!(out.telemetry.overtemp_events, k);
        assert!(out.telemetry.crit_shutdown);
    }

    assert_eq!(h.gpu.state(d(0)), Some(PowerState::Off));
    assert_eq!(h.gpu.state(d(1)), Some(PowerState::Idle));
}

#[test]
fn test_fatal_error_in_turbo_faults_until_forced_off() {
    let mut h = Harness::new(PowerConfig::new(1, 1));
    let flat_out = |i: &mut TickInputs| load(i, d(0), 9_000);

    h.step(|i| {
        flat_out(i);
        i.set_command(d(0), Command::request(PowerState::Turbo));
    });
    h.run_until(flat_out, |o| settled(o, d(0), PowerState::Turbo));

    let out = h.step(|i| {
        flat_out(i);
        i.domains[0].fatal_error = true;
    });
    let dom = &out.domains[0];
    assert_eq!(dom.status.current_state, PowerState::Fault);
    assert_eq!(out.telemetry.fault_count, 1);
    assert_eq!(dom.status.fault_code.raw(), 0xFF);
    assert!(dom.status.fault);
    assert_eq!(dom.control, ControlVector::SAFE);
    assert!(!dom.clk_request && !dom.volt_request);

    for _ in 0..10 {
        let out = h.step(|i| {
            flat_out(i);
            i.set_command(d(0), Command::request(PowerState::RunBal));
        });
        assert_eq!(out.domains[0].status.fault_code, FaultCode::FATAL_ERROR);
    }
    assert_eq!(h.gpu.telemetry().fault_count, 11);

    let out = h.step(|i| i.set_command(d(0), Command::force_off()));
    assert_eq!(out.domains[0].status.current_state, PowerState::Off);
    assert_eq!(out.telemetry.fault_count, 11);
    assert_eq!(out.domains[0].status.fault_code, FaultCode::NONE);
    assert_eq!(out.domains[0].control, ControlVector::SAFE);

    // The domain is usable again
    h.step(|i| i.set_command(d(0), Command::request(PowerState::Idle)));
    h.run_until(|_| {}, |o| settled(o, d(0), PowerState::Idle));
}

#[test]
fn test_cooling_into_warn_reaches_balanced() {
    let mut h = Harness::new(PowerConfig::new(1, 1));
    let hot_load = |i: &mut TickInputs| load(i, d(0), 7_500);

    h.step(|i| {
        hot_load(i);
        i.set_command(d(0), Command::request(PowerState::RunHigh));
    });
    h.run_until(hot_load, |o| settled(o, d(0), PowerState::RunHigh));

    let out = h.step(|i| {
        hot_load(i);
        i.set_sensor(SensorId::new(0), 4_000);
    });
    assert_eq!(out.domains[0].thermal_tier, ThermalTier::Throttle);
    assert_eq!(out.domains[0].status.current_state, PowerState::RunLow);

    // Filtered reading settles at 870: below throttle.low, above warn.low
    let warm = |i: &mut TickInputs| {
        hot_load(i);
        i.set_sensor(SensorId::new(0), 870);
    };
    let out = h.run_until(warm, |o| {
        o.domains[0].thermal_tier == ThermalTier::Warn && settled(o, d(0), PowerState::RunBal)
    });
    let dom = &out.domains[0];
    assert_eq!(dom.thermal_cap, PerfLevel::BALANCED);
    assert!(!dom.thermal_throttle);
    assert_eq!(dom.dvfs.requested_level, PerfLevel::BALANCED);
    assert_eq!(dom.coordination, CoordState::Idle);

    for _ in 0..50 {
        let out = h.step(warm);
        let dom = &out.domains[0];
        assert_eq!(dom.thermal_tier, ThermalTier::Warn);
        assert_eq!(dom.status.current_state, PowerState::RunBal);
        assert_eq!(dom.coordination, CoordState::Idle);
        assert!(!dom.status.busy);
    }
}

#[test]
fn test_refused_command_does_not_block_policy() {
    let mut h = Harness::new(PowerConfig::new(1, 0));
    h.step(|i| {
        load(i, d(0), 5_000);
        i.set_command(d(0), Command::request(PowerState::RunBal));
    });
    h.run_until(|i| load(i, d(0), 5_000), |o| settled(o, d(0), PowerState::RunBal));

    // STANDBY is a wake-up waypoint and means nothing to a running domain
    let out = h.step(|i| {
        load(i, d(0), 5_000);
        i.set_command(d(0), Command::request(PowerState::Standby));
    });
    let dom = &out.domains[0];
    assert!(!dom.status.ack);
    assert_eq!(dom.status.current_state, PowerState::RunBal);
    assert_eq!(dom.coordination, CoordState::Idle);
    assert_eq!(h.gpu.coordination_state(d(0)), CoordState::Idle);

    let out = h.run_until(|i| load(i, d(0), 9_500), |o| settled(o, d(0), PowerState::Turbo));
    assert_eq!(out.domains[0].dvfs.requested_level, PerfLevel::TURBO);
    assert_eq!(out.domains[0].coordination, CoordState::Idle);
}

// =============================================================================
// PROPERTIES
// =============================================================================

#[test]
fn test_reissued_command_is_idempotent() {
    let mut h = Harness::new(PowerConfig::new(1, 0));
    h.step(|i| {
        load(i, d(0), 5_000);
        i.set_command(d(0), Command::request(PowerState::RunBal));
    });
    let reached = h.run_until(|i| load(i, d(0), 5_000), |o| settled(o, d(0), PowerState::RunBal));
    let latency = reached.domains[0].status.last_transition_latency;

    for _ in 0..50 {
        let out = h.step(|i| {
            load(i, d(0), 5_000);
            i.set_command(d(0), Command::request(PowerState::RunBal));
        });
        let dom = &out.domains[0];
        assert_eq!(dom.status.current_state, PowerState::RunBal);
        assert!(dom.status.ack);
        assert!(!dom.status.busy);
        assert_eq!(dom.coordination, CoordState::Idle);
        assert_eq!(dom.status.last_transition_latency, latency);
    }
}

#[test]
fn test_idle_domain_returns_to_idle_and_off() {
    let mut h = Harness::new(PowerConfig::new(1, 0));
    h.step(|i| {
        load(i, d(0), 5_000);
        i.set_command(d(0), Command::request(PowerState::RunBal));
    });
    h.run_until(|i| load(i, d(0), 5_000), |o| settled(o, d(0), PowerState::RunBal));

    h.run_until(|_| {}, |o| settled(o, d(0), PowerState::Idle));

    let out = h.step(|i| i.set_command(d(0), Command::request(PowerState::Off)));
    assert_eq!(out.domains[0].status.current_state, PowerState::Retention);
    assert_eq!(out.domains[0].sequencer.phase, SequencerPhase::PowerOff);

    h.run_until(|_| {}, |o| settled(o, d(0), PowerState::Off));

    // Active bitmap follows the committed snapshot one tick later
    let out = h.quiet();
    assert_eq!(out.domains[0].control, ControlVector::SAFE);
    assert_eq!(out.telemetry.active_domains, DomainMask::EMPTY);
}

#[test]
fn test_slow_rails_stretch_standby() {
    let mut h = Harness::with_rails(PowerConfig::new(1, 0), DelayedRails::new(5, 5));
    h.step(|i| i.set_command(d(0), Command::request(PowerState::Idle)));
    let out = h.run_until(|_| {}, |o| settled(o, d(0), PowerState::Idle));

    // The coordinator requests the clock from the first tick, so the ack
    // is already present when the ramp completes.
    assert_eq!(out.domains[0].status.last_transition_latency, 7);
}

/// Deterministic pseudo-random stimulus
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) as u32
    }

    fn below(&mut self, n: u32) -> u32 {
        self.next() % n
    }
}

#[test]
fn test_invariants_hold_under_random_stimulus() {
    let config = PowerConfig::new(6, 4)
        .with_dependency(d(0), d(1))
        .and_then(|c| c.with_dependency(d(1), d(2)))
        .and_then(|c| c.with_dependency(d(3), d(2)))
        .and_then(|c| c.with_dependency(d(4), d(5)))
        .unwrap()
        .with_sensors(d(5), SensorMask::EMPTY.with(SensorId::new(3)))
        .with_timing(TimingConfig {
            ramp_delay: 4,
            run_ack_timeout: 50,
            teardown_timeout: 30,
            clk_timeout: 40,
            ..TimingConfig::default()
        });

    let targets = [
        PowerState::Off,
        PowerState::Idle,
        PowerState::RunLow,
        PowerState::RunBal,
        PowerState::RunHigh,
        PowerState::Turbo,
    ];

    let mut h = Harness::with_rails(config, DelayedRails::new(1, 2));
    let mut rng = Lcg(0x5eed);
    let mut faults = 0;

    for _ in 0..5_000 {
        let out = h.step(|inputs| {
            for i in inputs.domains.iter_mut() {
                i.idle = rng.below(4) != 0;
                i.busy = rng.below(10) == 0;
                i.utilization_pct = rng.below(10_001) as u16;
                i.latency_urgency = rng.below(50) == 0;
                i.wake_event = rng.below(40) == 0;
                i.fatal_error = rng.below(700) == 0;
                i.command = match rng.below(200) {
                    0 => Command::force_off(),
                    n if n < 8 => Command::request(targets[(n % 6) as usize]),
                    _ => Command::NONE,
                };
            }
            for s in inputs.sensors.iter_mut() {
                if rng.below(8) == 0 {
                    *s = Some(rng.below(1_300) as u16);
                }
            }
        });
        faults += out
            .domains
            .iter()
            .filter(|o| o.status.current_state == PowerState::Fault)
            .count();
    }

    // The run exercised the fault path
    assert!(faults > 0);
}
