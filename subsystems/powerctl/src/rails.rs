//! # Clock and Voltage Rail Providers
//!
//! The subsystem only *requests* clock and voltage changes; external
//! providers acknowledge them. A [`RailProvider`] models those providers for
//! closed-loop simulation: it sees the requests a domain drove on tick `t`
//! and returns the acknowledgements sampled on tick `t + 1`.

use arrayvec::ArrayVec;
use powerctl_types::{ClockSource, DomainId, PerfLevel};

use crate::MAX_DOMAINS;

/// Rail request lines driven by one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RailRequest {
    pub clk_request: bool,
    pub clk_mode: PerfLevel,
    pub volt_request: bool,
    pub volt_level: PerfLevel,
    pub clock_source: ClockSource,
}

/// Acknowledgements returned to one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RailAck {
    pub clk_ack: bool,
    pub volt_ack: bool,
}

/// External clock/voltage provider
pub trait RailProvider {
    /// Answer the requests `domain` drove on the previous tick
    fn respond(&mut self, domain: DomainId, request: &RailRequest) -> RailAck;
}

// =============================================================================
// IMMEDIATE
// =============================================================================

/// Provider that acknowledges every request on the next tick
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateRails;

impl RailProvider for ImmediateRails {
    fn respond(&mut self, _domain: DomainId, request: &RailRequest) -> RailAck {
        RailAck {
            clk_ack: request.clk_request,
            volt_ack: request.volt_request,
        }
    }
}

// =============================================================================
// DELAYED
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct RailTracker {
    level: PerfLevel,
    held: u32,
}

impl RailTracker {
    /// Count consecutive ticks of an unchanged request
    fn observe(&mut self, requested: bool, level: PerfLevel, delay: u32) -> bool {
        if !requested {
            self.held = 0;
            return false;
        }
        if level != self.level {
            self.level = level;
            self.held = 0;
        }
        self.held = self.held.saturating_add(1);
        self.held > delay
    }
}

/// Provider that acknowledges after a request has been held unchanged
///
/// A change of clock mode or voltage level restarts the delay.
#[derive(Debug, Clone)]
pub struct DelayedRails {
    clk_delay: u32,
    volt_delay: u32,
    clk: ArrayVec<RailTracker, MAX_DOMAINS>,
    volt: ArrayVec<RailTracker, MAX_DOMAINS>,
}

impl DelayedRails {
    /// Clock acks after `clk_delay` extra ticks, voltage after `volt_delay`
    pub fn new(clk_delay: u32, volt_delay: u32) -> Self {
        let mut clk = ArrayVec::new();
        let mut volt = ArrayVec::new();
        for _ in 0..MAX_DOMAINS {
            clk.push(RailTracker::default());
            volt.push(RailTracker::default());
        }
        Self {
            clk_delay,
            volt_delay,
            clk,
            volt,
        }
    }
}

impl RailProvider for DelayedRails {
    fn respond(&mut self, domain: DomainId, request: &RailRequest) -> RailAck {
        let clk_ack = self
            .clk
            .get_mut(domain.index())
            .map(|t| t.observe(request.clk_request, request.clk_mode, self.clk_delay))
            .unwrap_or(false);
        let volt_ack = self
            .volt
            .get_mut(domain.index())
            .map(|t| t.observe(request.volt_request, request.volt_level, self.volt_delay))
            .unwrap_or(false);

        RailAck { clk_ack, volt_ack }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request(level: PerfLevel) -> RailRequest {
        RailRequest {
            clk_request: true,
            clk_mode: level,
            volt_request: true,
            volt_level: level,
            clock_source: level.clock_source(),
        }
    }

    #[test]
    fn test_immediate_rails_echo_requests() {
        let mut rails = ImmediateRails;
        let ack = rails.respond(DomainId::new(0), &request(PerfLevel::HIGH));
        assert!(ack.clk_ack && ack.volt_ack);

        let ack = rails.respond(DomainId::new(0), &RailRequest::default());
        assert!(!ack.clk_ack && !ack.volt_ack);
    }

    #[test]
    fn test_delayed_rails_hold_off() {
        let mut rails = DelayedRails::new(1, 3);
        let d = DomainId::new(2);
        let req = request(PerfLevel::BALANCED);

        let acks: [RailAck; 4] = core::array::from_fn(|_| rails.respond(d, &req));
        assert_eq!(acks.map(|a| a.clk_ack), [false, true, true, true]);
        assert_eq!(acks.map(|a| a.volt_ack), [false, false, false, true]);
    }

    #[test]
    fn test_level_change_restarts_delay() {
        let mut rails = DelayedRails::new(1, 1);
        let d = DomainId::new(0);
        rails.respond(d, &request(PerfLevel::LOW));
        assert!(rails.respond(d, &request(PerfLevel::LOW)).clk_ack);

        assert!(!rails.respond(d, &request(PerfLevel::TURBO)).clk_ack);
        assert!(rails.respond(d, &request(PerfLevel::TURBO)).clk_ack);

        assert!(!rails.respond(d, &RailRequest::default()).clk_ack);
    }
}
