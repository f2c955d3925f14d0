//! # Subsystem Configuration
//!
//! Everything that is "set once or rarely": domain and sensor counts, the
//! dependency matrix, sensor membership, DVFS and thermal thresholds and all
//! timing budgets. A [`PowerConfig`] is validated in full when the subsystem
//! is constructed; a configuration that passes [`PowerConfig::validate`] can
//! never produce a configuration fault at run time.
//!
//! All durations are in ticks. One DVFS evaluation counts as one millisecond
//! of the hold timer.

use alloc::format;

use arrayvec::ArrayVec;
use powerctl_types::{DomainId, SensorId, SensorMask};

use crate::dependency::DependencyMatrix;
use crate::error::{ErrorKind, PowerError, PowerResult};
use crate::{DEFAULT_NUM_DOMAINS, DEFAULT_NUM_SENSORS, MAX_DOMAINS, MAX_SENSORS};

/// Full-scale utilization (100.00%)
pub const UTILIZATION_FULL_SCALE: u16 = 10_000;

// =============================================================================
// TIMING
// =============================================================================

/// Handshake delays and timeout budgets, in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Power-switch close to rail stable (RETENTION residency)
    pub ramp_delay: u32,
    /// Clock enable + isolation setup after the clock acknowledges
    pub setup_delay: u32,
    /// Clock-stable settling after setup
    pub stable_delay: u32,
    /// Budget for the clock ack while in STANDBY
    pub clk_timeout: u32,
    /// Budget for clk/volt acks after entering a RUN level
    pub run_ack_timeout: u32,
    /// Budget for the domain to go idle during power-down
    pub teardown_timeout: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ramp_delay: 50,
            setup_delay: 2,
            stable_delay: 4,
            clk_timeout: 10_000,
            run_ack_timeout: 10_000,
            teardown_timeout: 10_000,
        }
    }
}

impl TimingConfig {
    /// Ticks spent settling once the clock has acknowledged
    pub const fn settle_ticks(&self) -> u32 {
        self.setup_delay.saturating_add(self.stable_delay)
    }

    fn validate(&self) -> PowerResult<()> {
        let fields = [
            ("ramp_delay", self.ramp_delay),
            ("clk_timeout", self.clk_timeout),
            ("run_ack_timeout", self.run_ack_timeout),
            ("teardown_timeout", self.teardown_timeout),
        ];

        for (name, value) in fields {
            if value == 0 {
                return Err(PowerError::from_kind(ErrorKind::InvalidTiming)
                    .with_details(format!("{} must be nonzero", name)));
            }
        }
        Ok(())
    }
}

// =============================================================================
// DVFS
// =============================================================================

/// DVFS policy thresholds and residency windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DvfsConfig {
    /// Utilization at or above which level 4 is requested
    pub up_threshold: u16,
    /// Band below `up_threshold` that still requests level 3
    pub hysteresis: u16,
    /// Utilization at or above which level 2 is requested
    pub down_threshold: u16,
    /// Minimum residency window, reloaded whenever the hold timer expires
    pub min_hold_ms: u32,
    /// Boost window loaded on a latency-urgency request
    pub max_boost_ms: u32,
    /// Ticks between policy evaluations
    pub policy_period_ticks: u32,
}

impl Default for DvfsConfig {
    fn default() -> Self {
        Self {
            up_threshold: 8_000,
            hysteresis: 1_000,
            down_threshold: 3_000,
            min_hold_ms: 10,
            max_boost_ms: 50,
            policy_period_ticks: 1,
        }
    }
}

impl DvfsConfig {
    fn validate(&self) -> PowerResult<()> {
        if self.policy_period_ticks == 0 {
            return Err(PowerError::from_kind(ErrorKind::InvalidTiming)
                .with_details("policy_period_ticks must be nonzero".into()));
        }

        let monotone = self.up_threshold <= UTILIZATION_FULL_SCALE
            && self.hysteresis <= self.up_threshold
            && self.down_threshold <= self.up_threshold - self.hysteresis;

        if !monotone {
            return Err(PowerError::from_kind(ErrorKind::InvalidDvfsThresholds).with_details(
                format!(
                    "up={} hysteresis={} down={}",
                    self.up_threshold, self.hysteresis, self.down_threshold
                ),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// THERMAL
// =============================================================================

/// Hysteresis pair: enter at `high`, leave below `low`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub high: u16,
    pub low: u16,
}

impl Threshold {
    pub const fn new(high: u16, low: u16) -> Self {
        Self { high, low }
    }
}

/// Thermal tier thresholds, in raw sensor codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThermalConfig {
    pub warn: Threshold,
    pub throttle: Threshold,
    pub critical: Threshold,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            warn: Threshold::new(850, 800),
            throttle: Threshold::new(950, 900),
            critical: Threshold::new(1_050, 1_000),
        }
    }
}

impl ThermalConfig {
    fn validate(&self) -> PowerResult<()> {
        let tiers = [
            ("warn", self.warn),
            ("throttle", self.throttle),
            ("critical", self.critical),
        ];

        for (name, tier) in tiers {
            if tier.low >= tier.high {
                return Err(PowerError::from_kind(ErrorKind::InvalidThermalThresholds)
                    .with_details(format!("{}: low {} >= high {}", name, tier.low, tier.high)));
            }
        }

        if self.warn.high > self.throttle.high || self.throttle.high > self.critical.high {
            return Err(PowerError::from_kind(ErrorKind::InvalidThermalThresholds)
                .with_details(format!(
                    "tiers out of order: warn {} throttle {} critical {}",
                    self.warn.high, self.throttle.high, self.critical.high
                )));
        }
        Ok(())
    }
}

// =============================================================================
// POWER CONFIG
// =============================================================================

/// Complete subsystem configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerConfig {
    /// Number of power domains (1..=MAX_DOMAINS)
    pub num_domains: usize,
    /// Number of thermal sensors (0..=MAX_SENSORS)
    pub num_sensors: usize,
    /// Domain dependency relation
    pub dependencies: DependencyMatrix,
    /// Sensors mapped to each domain
    pub sensor_map: ArrayVec<SensorMask, MAX_DOMAINS>,
    pub timing: TimingConfig,
    pub dvfs: DvfsConfig,
    pub thermal: ThermalConfig,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_NUM_DOMAINS, DEFAULT_NUM_SENSORS)
    }
}

impl PowerConfig {
    /// Configuration for the given counts with default thresholds
    ///
    /// Domain `d` is mapped to sensor `d` when that sensor exists.
    pub fn new(num_domains: usize, num_sensors: usize) -> Self {
        let mut sensor_map = ArrayVec::new();
        for d in 0..num_domains.min(MAX_DOMAINS) {
            let mask = if d < num_sensors.min(MAX_SENSORS) {
                SensorMask::EMPTY.with(SensorId::new(d as u8))
            } else {
                SensorMask::EMPTY
            };
            sensor_map.push(mask);
        }

        Self {
            num_domains,
            num_sensors,
            dependencies: DependencyMatrix::new(num_domains),
            sensor_map,
            timing: TimingConfig::default(),
            dvfs: DvfsConfig::default(),
            thermal: ThermalConfig::default(),
        }
    }

    /// Add a dependency: `domain` requires `prerequisite`
    pub fn with_dependency(mut self, domain: DomainId, prerequisite: DomainId) -> PowerResult<Self> {
        self.dependencies.add(domain, prerequisite)?;
        Ok(self)
    }

    /// Replace the sensors mapped to `domain`
    pub fn with_sensors(mut self, domain: DomainId, sensors: SensorMask) -> Self {
        if let Some(mask) = self.sensor_map.get_mut(domain.index()) {
            *mask = sensors;
        }
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_dvfs(mut self, dvfs: DvfsConfig) -> Self {
        self.dvfs = dvfs;
        self
    }

    pub fn with_thermal(mut self, thermal: ThermalConfig) -> Self {
        self.thermal = thermal;
        self
    }

    /// Sensors mapped to `domain`
    pub fn sensors_of(&self, domain: DomainId) -> SensorMask {
        self.sensor_map.get(domain.index()).copied().unwrap_or_default()
    }

    /// Check the whole configuration
    ///
    /// Returns the dependency-respecting power-up order on success.
    pub fn validate(&self) -> PowerResult<ArrayVec<DomainId, MAX_DOMAINS>> {
        if self.num_domains == 0 || self.num_domains > MAX_DOMAINS {
            return Err(PowerError::from_kind(ErrorKind::InvalidDomainCount)
                .with_details(format!("{} (max {})", self.num_domains, MAX_DOMAINS)));
        }
        if self.num_sensors > MAX_SENSORS {
            return Err(PowerError::from_kind(ErrorKind::InvalidSensorCount)
                .with_details(format!("{} (max {})", self.num_sensors, MAX_SENSORS)));
        }
        if self.dependencies.len() != self.num_domains {
            return Err(PowerError::from_kind(ErrorKind::UnknownDomain).with_details(format!(
                "dependency matrix covers {} domains, expected {}",
                self.dependencies.len(),
                self.num_domains
            )));
        }
        if self.sensor_map.len() != self.num_domains {
            return Err(PowerError::from_kind(ErrorKind::InvalidSensorMap).with_details(format!(
                "sensor map covers {} domains, expected {}",
                self.sensor_map.len(),
                self.num_domains
            )));
        }

        let known = if self.num_sensors >= 32 {
            u32::MAX
        } else {
            (1u32 << self.num_sensors) - 1
        };
        for (d, mask) in self.sensor_map.iter().enumerate() {
            if mask.bits() & !known != 0 {
                return Err(PowerError::from_kind(ErrorKind::InvalidSensorMap)
                    .with_domain(DomainId::new(d as u8))
                    .with_details(format!("mask {:#010x}", mask.bits())));
            }
        }

        self.timing.validate()?;
        self.dvfs.validate()?;
        self.thermal.validate()?;
        self.dependencies.validate()
    }
}

// =============================================================================
// TESTS
// =============================================================================
