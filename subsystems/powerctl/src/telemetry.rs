//! # Telemetry
//!
//! Host-readable counters and global selections. The tick driver owns the
//! single [`Telemetry`] aggregate and folds each tick's thermal and
//! coordination reports into it. Counters saturate and are never reset.
//!
//! A [`TelemetryMirror`] is a cloneable handle that receives a copy of the
//! aggregate after every commit, so another context can poll counters
//! without borrowing the subsystem.

use core::sync::atomic::{AtomicU64, Ordering};

use alloc::sync::Arc;

use powerctl_types::{DomainMask, PerfLevel};
use spin::RwLock;

use crate::coordination::CoordinationReport;
use crate::thermal::ThermalReport;

// =============================================================================
// TELEMETRY
// =============================================================================

/// Global telemetry aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry {
    /// Ticks committed so far
    pub tick: u64,
    /// Domain-ticks spent running high while asked to run low
    pub throttle_count: u64,
    /// Domain-ticks spent in FAULT
    pub fault_count: u64,
    /// Domain-ticks spent in the critical thermal tier
    pub overtemp_events: u64,
    /// Max DVFS level across domains
    pub global_perf_level: PerfLevel,
    /// Min thermal cap across domains
    pub global_cap: PerfLevel,
    /// Domains not in OFF or FAULT
    pub active_domains: DomainMask,
    /// Global cap is 0
    pub crit_shutdown: bool,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            tick: 0,
            throttle_count: 0,
            fault_count: 0,
            overtemp_events: 0,
            global_perf_level: PerfLevel::OFF,
            global_cap: PerfLevel::MAX,
            active_domains: DomainMask::EMPTY,
            crit_shutdown: false,
        }
    }
}

impl Telemetry {
    /// Fold one tick's reports into the aggregate
    ///
    /// `faulted_domains` counts domains whose PSM reports a fault after
    /// stepping this tick.
    pub fn record(
        &mut self,
        thermal: &ThermalReport,
        coordination: &CoordinationReport,
        faulted_domains: u32,
    ) {
        self.tick = self.tick.saturating_add(1);
        self.throttle_count = self
            .throttle_count
            .saturating_add(u64::from(coordination.throttle_events));
        self.fault_count = self
            .fault_count
            .saturating_add(u64::from(faulted_domains));
        self.overtemp_events = self
            .overtemp_events
            .saturating_add(u64::from(thermal.overtemp_events));

        self.global_perf_level = coordination.global_level;
        self.active_domains = coordination.active_domains;
        self.global_cap = thermal.global_cap;

        if thermal.crit_shutdown && !self.crit_shutdown {
            log::warn!("telemetry: critical shutdown asserted at tick {}", self.tick);
        }
        self.crit_shutdown = thermal.crit_shutdown;
    }
}

// =============================================================================
// MIRROR
// =============================================================================

/// Shared, lock-protected copy of the latest committed telemetry
#[derive(Debug, Clone, Default)]
pub struct TelemetryMirror {
    inner: Arc<MirrorInner>,
}

#[derive(Debug, Default)]
struct MirrorInner {
    latest: RwLock<Telemetry>,
    publications: AtomicU64,
}

impl TelemetryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the mirrored copy
    pub fn publish(&self, telemetry: &Telemetry) {
        *self.inner.latest.write() = *telemetry;
        self.inner.publications.fetch_add(1, Ordering::Release);
    }

    /// Latest published telemetry
    pub fn snapshot(&self) -> Telemetry {
        *self.inner.latest.read()
    }

    /// Number of publications so far
    pub fn publications(&self) -> u64 {
        self.inner.publications.load(Ordering::Acquire)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use powerctl_types::DomainId;

    fn thermal(overtemp: u32, cap: PerfLevel) -> ThermalReport {
        ThermalReport {
            overtemp_events: overtemp,
            global_cap: cap,
            crit_shutdown: cap == PerfLevel::OFF,
        }
    }

    #[test]
    fn test_counters_accumulate() {
        let mut telemetry = Telemetry::default();
        let coordination = CoordinationReport {
            throttle_events: 1,
            global_level: PerfLevel::HIGH,
            active_domains: DomainMask::EMPTY.with(DomainId::new(3)),
            ..CoordinationReport::default()
        };

        telemetry.record(&thermal(1, PerfLevel::OFF), &coordination, 2);
        telemetry.record(&thermal(1, PerfLevel::OFF), &coordination, 2);

        assert_eq!(telemetry.tick, 2);
        assert_eq!(telemetry.throttle_count, 2);
        assert_eq!(telemetry.fault_count, 4);
        assert_eq!(telemetry.overtemp_events, 2);
        assert_eq!(telemetry.global_perf_level, PerfLevel::HIGH);
        assert_eq!(telemetry.active_domains.bits(), 0b1000);
        assert!(telemetry.crit_shutdown);

        telemetry.record(&thermal(0, PerfLevel::MAX), &CoordinationReport::default(), 0);
        assert!(!telemetry.crit_shutdown);
        assert_eq!(telemetry.overtemp_events, 2);
    }

    #[test]
    fn test_counters_saturate() {
        let mut telemetry = Telemetry {
            fault_count: u64::MAX,
            ..Telemetry::default()
        };
        telemetry.record(&thermal(0, PerfLevel::MAX), &CoordinationReport::default(), 3);
        assert_eq!(telemetry.fault_count, u64::MAX);
    }

    #[test]
    fn test_mirror_shares_latest() {
        let mirror = TelemetryMirror::new();
        let reader = mirror.clone();
        assert_eq!(reader.snapshot(), Telemetry::default());

        let telemetry = Telemetry {
            tick: 42,
            throttle_count: 7,
            ..Telemetry::default()
        };
        mirror.publish(&telemetry);

        assert_eq!(reader.snapshot().tick, 42);
        assert_eq!(reader.snapshot().throttle_count, 7);
        assert_eq!(reader.publications(), 1);
    }
}
