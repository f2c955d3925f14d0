//! # Domain Dependency Matrix
//!
//! `depends[d][j]` means domain `d` may only power up or change performance
//! level while domain `j` is operationally ready (IDLE or any RUN level).
//! The matrix is fixed once the subsystem is built and is validated acyclic
//! at load time, so no cyclic wait can ever form at run time.
//!
//! ## Storage
//!
//! One [`DomainMask`] row per domain: bit `j` of row `d` is `depends[d][j]`.
//!
//! ```text
//!            j = 0  1  2  3
//!   d = 0  [     0  1  0  0 ]   shader cluster needs fabric
//!   d = 1  [     0  0  0  1 ]   fabric needs memory controller
//!   d = 2  [     0  1  0  0 ]   cache needs fabric
//!   d = 3  [     0  0  0  0 ]   memory controller stands alone
//! ```
//!
//! ## Validation
//!
//! Uses Kahn's algorithm:
//!
//! 1. Compute in-degree (number of prerequisites) for each domain
//! 2. Queue every domain with no prerequisites
//! 3. Pop the lowest-numbered ready domain, append it to the order and
//!    release its dependents
//! 4. If not every domain was visited, the rest sit on a cycle

use alloc::format;
use alloc::string::String;

use arrayvec::ArrayVec;
use powerctl_types::{DomainId, DomainMask, PowerState};

use crate::error::{ErrorKind, PowerError, PowerResult};
use crate::MAX_DOMAINS;

// =============================================================================
// DEPENDENCY MATRIX
// =============================================================================

/// N×N dependency relation between domains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyMatrix {
    rows: ArrayVec<DomainMask, MAX_DOMAINS>,
}

impl DependencyMatrix {
    /// Matrix for `num_domains` domains with no dependencies
    ///
    /// Counts above [`MAX_DOMAINS`] are truncated; configuration validation
    /// rejects them separately.
    pub fn new(num_domains: usize) -> Self {
        let mut rows = ArrayVec::new();
        for _ in 0..num_domains.min(MAX_DOMAINS) {
            rows.push(DomainMask::EMPTY);
        }
        Self { rows }
    }

    /// Number of domains covered
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the matrix covers no domains
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Record that `domain` requires `prerequisite`
    pub fn add(&mut self, domain: DomainId, prerequisite: DomainId) -> PowerResult<()> {
        if domain == prerequisite {
            return Err(PowerError::from_kind(ErrorKind::SelfDependency).with_domain(domain));
        }
        if prerequisite.index() >= self.rows.len() {
            return Err(PowerError::from_kind(ErrorKind::UnknownDomain)
                .with_domain(domain)
                .with_details(format!("prerequisite {}", prerequisite)));
        }

        let row = self.rows.get_mut(domain.index()).ok_or_else(|| {
            PowerError::from_kind(ErrorKind::UnknownDomain).with_domain(domain)
        })?;
        row.insert(prerequisite);
        Ok(())
    }

    /// Builder form of [`DependencyMatrix::add`]
    pub fn with_dependency(mut self, domain: DomainId, prerequisite: DomainId) -> PowerResult<Self> {
        self.add(domain, prerequisite)?;
        Ok(self)
    }

    /// `depends[domain][prerequisite]`
    pub fn depends(&self, domain: DomainId, prerequisite: DomainId) -> bool {
        self.dependencies_of(domain).contains(prerequisite)
    }

    /// Direct prerequisites of `domain`
    pub fn dependencies_of(&self, domain: DomainId) -> DomainMask {
        self.rows.get(domain.index()).copied().unwrap_or_default()
    }

    /// Domains that directly require `domain`
    pub fn dependents_of(&self, domain: DomainId) -> DomainMask {
        let mut mask = DomainMask::EMPTY;
        for (d, row) in self.rows.iter().enumerate() {
            if row.contains(domain) {
                mask.insert(DomainId::new(d as u8));
            }
        }
        mask
    }

    /// Check if `domain` requires `prerequisite`, directly or transitively
    pub fn depends_on(&self, domain: DomainId, prerequisite: DomainId) -> bool {
        let mut visited = DomainMask::EMPTY;
        let mut frontier = self.dependencies_of(domain);

        while !frontier.is_empty() {
            if frontier.contains(prerequisite) {
                return true;
            }
            visited = DomainMask::from_bits(visited.bits() | frontier.bits());
            let mut next = DomainMask::EMPTY;
            for j in frontier.iter() {
                next = DomainMask::from_bits(next.bits() | self.dependencies_of(j).bits());
            }
            frontier = DomainMask::from_bits(next.bits() & !visited.bits());
        }

        false
    }

    /// Every prerequisite of `domain` is operationally ready in `states`
    ///
    /// `states` is the previous committed snapshot, indexed by domain.
    pub fn deps_ready(&self, domain: DomainId, states: &[PowerState]) -> bool {
        self.dependencies_of(domain).iter().all(|j| {
            states
                .get(j.index())
                .map(|state| state.is_operational())
                .unwrap_or(false)
        })
    }

    /// Validate the matrix and return a power-up order
    ///
    /// Every domain appears after all of its prerequisites.
    pub fn validate(&self) -> PowerResult<ArrayVec<DomainId, MAX_DOMAINS>> {
        let count = self.rows.len();
        let all = if count >= 32 {
            u32::MAX
        } else {
            (1u32 << count) - 1
        };

        for (d, row) in self.rows.iter().enumerate() {
            let domain = DomainId::new(d as u8);
            if row.contains(domain) {
                return Err(PowerError::from_kind(ErrorKind::SelfDependency).with_domain(domain));
            }
            if row.bits() & !all != 0 {
                return Err(PowerError::from_kind(ErrorKind::UnknownDomain)
                    .with_domain(domain)
                    .with_details(format!("row bits {:#010x}", row.bits())));
            }
        }

        self.topological_order()
    }

    /// Compute topological order using Kahn's algorithm
    fn topological_order(&self) -> PowerResult<ArrayVec<DomainId, MAX_DOMAINS>> {
        let mut order: ArrayVec<DomainId, MAX_DOMAINS> = ArrayVec::new();
        let mut in_degree: ArrayVec<u32, MAX_DOMAINS> =
            self.rows.iter().map(|row| row.count()).collect();

        // Bitmap queue: popping the lowest set bit keeps the order stable
        let mut ready = DomainMask::EMPTY;
        for (d, &degree) in in_degree.iter().enumerate() {
            if degree == 0 {
                ready.insert(DomainId::new(d as u8));
            }
        }

        while let Some(current) = ready.first() {
            ready.remove(current);
            order.push(current);

            for dependent in self.dependents_of(current).iter() {
                if let Some(degree) = in_degree.get_mut(dependent.index()) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() != self.rows.len() {
            let mut involved = String::new();
            for d in 0..self.rows.len() {
                let domain = DomainId::new(d as u8);
                if !order.contains(&domain) {
                    if !involved.is_empty() {
                        involved.push_str(", ");
                    }
                    involved.push_str(&format!("{}", d));
                }
            }

            return Err(
                PowerError::new(ErrorKind::CircularDependency, "Circular dependency detected")
                    .with_details(format!("Involved domains: {}", involved)),
            );
        }

        Ok(order)
    }
}

impl Default for DependencyMatrix {
    fn default() -> Self {
        Self::new(crate::DEFAULT_NUM_DOMAINS)
    }
}

// =============================================================================
// TESTS
// =============================================================================
