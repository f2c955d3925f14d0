//! # DVFS Policy Engine
//!
//! Turns per-domain utilization and latency urgency into a requested
//! performance level.
//!
//! ## Baseline Staircase
//!
//! ```text
//!   level
//!     4 ┤                              ┌──────────
//!     3 ┤                   ┌──────────┘
//!     2 ┤         ┌─────────┘
//!     1 ┼─────────┘
//!       └─────────┬─────────┬──────────┬────────── utilization
//!               down    up - hyst     up
//! ```
//!
//! ## Residency
//!
//! While the hold timer runs the request may rise but never fall. When the
//! timer expires the baseline is taken as-is and the timer reloads with
//! `min_hold_ms`. A latency-urgency request jumps straight to level 4 and
//! loads `max_boost_ms`. The thermal cap is applied last, every tick.

use arrayvec::ArrayVec;
use powerctl_types::{DomainId, PerfLevel};

use crate::config::{DvfsConfig, UTILIZATION_FULL_SCALE};
use crate::MAX_DOMAINS;

/// Per-domain policy state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DvfsState {
    /// Final (capped) level requested on the last evaluation
    pub requested_level: PerfLevel,
    /// A latency-urgency boost window is running
    pub boost_active: bool,
    /// Residency window remaining, in evaluations
    pub hold_timer_ms: u32,
}

/// Per-domain policy inputs for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DvfsInput {
    /// 0-10000 (hundredths of a percent)
    pub utilization_pct: u16,
    pub latency_urgency: bool,
    /// Cap from the thermal governor, same tick
    pub thermal_cap: PerfLevel,
}

impl Default for DvfsInput {
    fn default() -> Self {
        Self {
            utilization_pct: 0,
            latency_urgency: false,
            thermal_cap: PerfLevel::MAX,
        }
    }
}

/// Level requested by utilization alone
pub fn baseline_level(utilization_pct: u16, config: &DvfsConfig) -> PerfLevel {
    let util = utilization_pct.min(UTILIZATION_FULL_SCALE);

    if util >= config.up_threshold {
        PerfLevel::TURBO
    } else if util >= config.up_threshold.saturating_sub(config.hysteresis) {
        PerfLevel::HIGH
    } else if util >= config.down_threshold {
        PerfLevel::BALANCED
    } else {
        PerfLevel::LOW
    }
}

impl DvfsState {
    /// One policy evaluation
    fn evaluate(&mut self, input: &DvfsInput, config: &DvfsConfig) {
        let baseline = baseline_level(input.utilization_pct, config);

        let level = if input.latency_urgency {
            self.boost_active = true;
            self.hold_timer_ms = config.max_boost_ms;
            PerfLevel::TURBO
        } else if self.hold_timer_ms > 0 {
            self.hold_timer_ms -= 1;
            baseline.max(self.requested_level)
        } else {
            self.boost_active = false;
            self.hold_timer_ms = config.min_hold_ms;
            baseline
        };

        self.requested_level = level.min(input.thermal_cap);
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Policy engine for all domains
#[derive(Debug, Clone)]
pub struct DvfsEngine {
    domains: ArrayVec<DvfsState, MAX_DOMAINS>,
    /// Ticks since the last evaluation, modulo the policy period
    phase: u32,
}

impl DvfsEngine {
    pub fn new(num_domains: usize) -> Self {
        let mut domains = ArrayVec::new();
        for _ in 0..num_domains.min(MAX_DOMAINS) {
            domains.push(DvfsState::default());
        }
        Self { domains, phase: 0 }
    }

    pub fn state(&self, domain: DomainId) -> Option<&DvfsState> {
        self.domains.get(domain.index())
    }

    /// Requested level for `domain` (0 for unknown domains)
    pub fn requested_level(&self, domain: DomainId) -> PerfLevel {
        self.state(domain).map(|s| s.requested_level).unwrap_or_default()
    }

    /// Highest requested level across domains
    pub fn global_level(&self) -> PerfLevel {
        self.domains
            .iter()
            .map(|s| s.requested_level)
            .max()
            .unwrap_or_default()
    }

    /// Advance one tick
    ///
    /// `inputs` is indexed by domain; missing entries use defaults.
    pub fn step(&mut self, inputs: &[DvfsInput], config: &DvfsConfig) {
        let evaluate = self.phase == 0;
        self.phase = (self.phase + 1) % config.policy_period_ticks.max(1);

        for (d, state) in self.domains.iter_mut().enumerate() {
            let input = inputs.get(d).copied().unwrap_or_default();
            if evaluate {
                state.evaluate(&input, config);
            } else {
                state.requested_level = state.requested_level.min(input.thermal_cap);
            }
        }

        log::trace!("dvfs: global level {}", self.global_level());
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn util(pct: u16) -> DvfsInput {
        DvfsInput {
            utilization_pct: pct,
            ..DvfsInput::default()
        }
    }

    fn levels(engine: &mut DvfsEngine, input: DvfsInput, config: &DvfsConfig, n: usize) -> alloc::vec::Vec<u8> {
        (0..n)
            .map(|_| {
                engine.step(&[input], config);
                engine.requested_level(DomainId::new(0)).raw()
            })
            .collect()
    }

    #[test]
    fn test_baseline_staircase() {
        let config = DvfsConfig::default();
        assert_eq!(baseline_level(0, &config), PerfLevel::LOW);
        assert_eq!(baseline_level(2_999, &config), PerfLevel::LOW);
        assert_eq!(baseline_level(3_000, &config), PerfLevel::BALANCED);
        assert_eq!(baseline_level(6_999, &config), PerfLevel::BALANCED);
        assert_eq!(baseline_level(7_000, &config), PerfLevel::HIGH);
        assert_eq!(baseline_level(7_999, &config), PerfLevel::HIGH);
        assert_eq!(baseline_level(8_000, &config), PerfLevel::TURBO);
        assert_eq!(baseline_level(u16::MAX, &config), PerfLevel::TURBO);
    }

    #[test]
    fn test_hold_blocks_decrease_until_expiry() {
        let config = DvfsConfig {
            min_hold_ms: 3,
            ..DvfsConfig::default()
        };
        let mut engine = DvfsEngine::new(1);

        assert_eq!(levels(&mut engine, util(9_000), &config, 1), [4]);
        // Hold of 3 evaluations keeps level 4, then baseline applies
        assert_eq!(levels(&mut engine, util(1_000), &config, 5), [4, 4, 4, 1, 1]);
    }

    #[test]
    fn test_hold_allows_increase() {
        let config = DvfsConfig {
            min_hold_ms: 100,
            ..DvfsConfig::default()
        };
        let mut engine = DvfsEngine::new(1);
        levels(&mut engine, util(1_000), &config, 1);
        assert!(engine.state(DomainId::new(0)).unwrap().hold_timer_ms > 0);

        assert_eq!(levels(&mut engine, util(5_000), &config, 1), [2]);
        assert_eq!(levels(&mut engine, util(9_000), &config, 1), [4]);
    }

    #[test]
    fn test_urgency_boost_window() {
        let config = DvfsConfig {
            max_boost_ms: 4,
            min_hold_ms: 2,
            ..DvfsConfig::default()
        };
        let mut engine = DvfsEngine::new(1);

        let urgent = DvfsInput {
            latency_urgency: true,
            ..util(0)
        };
        engine.step(&[urgent], &config);
        let state = *engine.state(DomainId::new(0)).unwrap();
        assert_eq!(state.requested_level, PerfLevel::TURBO);
        assert!(state.boost_active);
        assert_eq!(state.hold_timer_ms, 4);

        assert_eq!(levels(&mut engine, util(0), &config, 4), [4, 4, 4, 4]);
        assert!(engine.state(DomainId::new(0)).unwrap().boost_active);

        engine.step(&[util(0)], &config);
        let state = *engine.state(DomainId::new(0)).unwrap();
        assert_eq!(state.requested_level, PerfLevel::LOW);
        assert!(!state.boost_active);
        assert_eq!(state.hold_timer_ms, 2);
    }

    #[test]
    fn test_thermal_cap_clamps() {
        let config = DvfsConfig::default();
        let mut engine = DvfsEngine::new(1);

        let capped = DvfsInput {
            utilization_pct: 9_500,
            latency_urgency: true,
            thermal_cap: PerfLevel::LOW,
        };
        engine.step(&[capped], &config);
        assert_eq!(engine.requested_level(DomainId::new(0)), PerfLevel::LOW);

        let shutdown = DvfsInput {
            thermal_cap: PerfLevel::OFF,
            ..capped
        };
        engine.step(&[shutdown], &config);
        assert_eq!(engine.requested_level(DomainId::new(0)), PerfLevel::OFF);
    }

    #[test]
    fn test_policy_period_holds_between_evaluations() {
        let config = DvfsConfig {
            policy_period_ticks: 3,
            min_hold_ms: 0,
            ..DvfsConfig::default()
        };
        let mut engine = DvfsEngine::new(1);

        assert_eq!(levels(&mut engine, util(5_000), &config, 1), [2]);
        assert_eq!(levels(&mut engine, util(9_000), &config, 3), [2, 2, 4]);
    }

    #[test]
    fn test_global_level_is_max() {
        let config = DvfsConfig::default();
        let mut engine = DvfsEngine::new(3);
        engine.step(&[util(0), util(8_500), util(4_000)], &config);
        assert_eq!(engine.global_level(), PerfLevel::TURBO);
    }

    #[test]
    fn test_monotone_while_holding() {
        let config = DvfsConfig {
            min_hold_ms: 5,
            max_boost_ms: 7,
            ..DvfsConfig::default()
        };
        let mut engine = DvfsEngine::new(1);
        let pattern = [9_000u16, 100, 5_000, 7_500, 0, 0, 8_200, 10, 3_100, 0];

        for round in 0..40usize {
            let before = *engine.state(DomainId::new(0)).unwrap();
            let input = DvfsInput {
                utilization_pct: pattern[round % pattern.len()],
                latency_urgency: round % 13 == 0,
                ..DvfsInput::default()
            };
            engine.step(&[input], &config);
            let after = engine.requested_level(DomainId::new(0));
            if before.hold_timer_ms > 0 {
                assert!(after >= before.requested_level, "round {}", round);
            }
        }
    }
}
