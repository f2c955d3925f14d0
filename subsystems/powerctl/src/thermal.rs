//! # Thermal Governor
//!
//! Filters raw sensor codes, folds them into per-domain temperatures and
//! derives a performance cap per domain through three sticky tiers.
//!
//! ## Tiers
//!
//! ```text
//!   raw code
//!      ▲
//!      │  ── critical.high ─┐  CRITICAL   cap 0, throttle, overtemp++
//!      │  ── critical.low  ─┘
//!      │  ── throttle.high ─┐  THROTTLE   cap 1, throttle
//!      │  ── throttle.low  ─┘
//!      │  ── warn.high     ─┐  WARN       cap 2, throttle cleared
//!      │  ── warn.low      ─┘
//!      │                       NORMAL     cap 4, throttle cleared
//!      └──────────────────────────────────────────────────▶ time
//! ```
//!
//! A tier is entered at its `high` threshold and left only once the
//! temperature drops to its `low` threshold or below.

use core::fmt;

use arrayvec::ArrayVec;
use powerctl_types::{DomainId, PerfLevel, SensorId, SensorMask};

use crate::config::{Threshold, ThermalConfig};
use crate::{MAX_DOMAINS, MAX_SENSORS};

// =============================================================================
// TIERS
// =============================================================================

/// Thermal tier of one domain, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum ThermalTier {
    #[default]
    Normal   = 0,
    Warn     = 1,
    Throttle = 2,
    Critical = 3,
}

impl ThermalTier {
    /// Performance cap imposed by this tier
    pub const fn cap(&self) -> PerfLevel {
        match self {
            ThermalTier::Normal => PerfLevel::MAX,
            ThermalTier::Warn => PerfLevel::BALANCED,
            ThermalTier::Throttle => PerfLevel::LOW,
            ThermalTier::Critical => PerfLevel::OFF,
        }
    }

    /// Next tier given the previous tier and the current temperature
    pub fn classify(prev: ThermalTier, temperature: u16, config: &ThermalConfig) -> ThermalTier {
        let sticky = |tier: ThermalTier, threshold: &Threshold| {
            temperature >= threshold.high || (prev >= tier && temperature > threshold.low)
        };

        if sticky(ThermalTier::Critical, &config.critical) {
            ThermalTier::Critical
        } else if sticky(ThermalTier::Throttle, &config.throttle) {
            ThermalTier::Throttle
        } else if sticky(ThermalTier::Warn, &config.warn) {
            ThermalTier::Warn
        } else {
            ThermalTier::Normal
        }
    }
}

impl fmt::Display for ThermalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThermalTier::Normal => "normal",
            ThermalTier::Warn => "warn",
            ThermalTier::Throttle => "throttle",
            ThermalTier::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Thermal view of one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DomainThermal {
    /// Max filtered reading over the domain's sensors
    pub temperature: u16,
    pub tier: ThermalTier,
    /// Throttle override presented to the domain's PSM
    pub throttle: bool,
}

impl DomainThermal {
    #[inline(always)]
    pub fn cap(&self) -> PerfLevel {
        self.tier.cap()
    }
}

/// Result of one governor step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThermalReport {
    /// Domains in the critical tier this tick
    pub overtemp_events: u32,
    /// Minimum of the domain caps
    pub global_cap: PerfLevel,
    /// Global cap is 0
    pub crit_shutdown: bool,
}

/// EMA with weight 3/4 old, 1/4 new
#[inline]
pub const fn ema(filtered: u16, raw: u16) -> u16 {
    ((3 * filtered as u32 + raw as u32) >> 2) as u16
}

// =============================================================================
// GOVERNOR
// =============================================================================

/// Thermal governor for all sensors and domains
#[derive(Debug, Clone)]
pub struct ThermalGovernor {
    filtered: ArrayVec<u16, MAX_SENSORS>,
    domains: ArrayVec<DomainThermal, MAX_DOMAINS>,
}

impl ThermalGovernor {
    pub fn new(num_domains: usize, num_sensors: usize) -> Self {
        let mut filtered = ArrayVec::new();
        for _ in 0..num_sensors.min(MAX_SENSORS) {
            filtered.push(0);
        }
        let mut domains = ArrayVec::new();
        for _ in 0..num_domains.min(MAX_DOMAINS) {
            domains.push(DomainThermal::default());
        }
        Self { filtered, domains }
    }

    /// Filtered reading of `sensor`
    pub fn filtered(&self, sensor: SensorId) -> Option<u16> {
        self.filtered.get(sensor.index()).copied()
    }

    pub fn domain(&self, domain: DomainId) -> Option<&DomainThermal> {
        self.domains.get(domain.index())
    }

    /// Cap for `domain` (uncapped for unknown domains)
    pub fn cap(&self, domain: DomainId) -> PerfLevel {
        self.domain(domain).map(|t| t.cap()).unwrap_or(PerfLevel::MAX)
    }

    pub fn throttle(&self, domain: DomainId) -> bool {
        self.domain(domain).map(|t| t.throttle).unwrap_or(false)
    }

    /// Minimum cap over all domains
    pub fn global_cap(&self) -> PerfLevel {
        self.domains
            .iter()
            .map(|t| t.cap())
            .min()
            .unwrap_or(PerfLevel::MAX)
    }

    /// Max filtered reading over the sensors in `mask`, 0 if none
    fn temperature_of(&self, mask: SensorMask) -> u16 {
        mask.iter()
            .filter_map(|s| self.filtered(s))
            .max()
            .unwrap_or(0)
    }

    /// Advance one tick
    ///
    /// `samples` holds a fresh raw code per sensor, or `None` to hold the
    /// filtered value. `sensor_map` is indexed by domain.
    pub fn step(
        &mut self,
        samples: &[Option<u16>],
        sensor_map: &[SensorMask],
        config: &ThermalConfig,
    ) -> ThermalReport {
        for (filtered, sample) in self.filtered.iter_mut().zip(samples.iter()) {
            if let Some(raw) = *sample {
                *filtered = ema(*filtered, raw);
            }
        }

        let mut overtemp_events = 0;
        for d in 0..self.domains.len() {
            let mask = sensor_map.get(d).copied().unwrap_or_default();
            let temperature = self.temperature_of(mask);

            let domain = &mut self.domains[d];
            let tier = ThermalTier::classify(domain.tier, temperature, config);

            if tier != domain.tier {
                log::warn!(
                    "thermal[{}]: {} -> {} at {}",
                    d,
                    domain.tier,
                    tier,
                    temperature
                );
            }

            domain.temperature = temperature;
            domain.tier = tier;
            domain.throttle = tier >= ThermalTier::Throttle;

            if tier == ThermalTier::Critical {
                overtemp_events += 1;
            }
        }

        let global_cap = self.global_cap();
        ThermalReport {
            overtemp_events,
            global_cap,
            crit_shutdown: global_cap == PerfLevel::OFF,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
