//! # Error Handling
//!
//! Runtime handshake failures never surface here: a clock that never
//! acknowledges or a domain that never drains becomes a domain-local FAULT
//! state with a fault code. The errors in this module cover the two places
//! where the caller itself is at fault:
//!
//! - constructing a subsystem from an inconsistent [`PowerConfig`]
//! - feeding [`PowerSubsystem::tick`] an input record shaped for a
//!   different configuration
//!
//! ## Error Categories
//!
//! | Category | Band | Example |
//! |----------|------|---------|
//! | Configuration | 100-199 | Zero timeout, inverted thresholds |
//! | Dependency | 200-299 | Cyclic dependency matrix |
//! | Signal | 300-399 | Input record sized for another config |
//!
//! [`PowerConfig`]: crate::config::PowerConfig
//! [`PowerSubsystem::tick`]: crate::subsystem::PowerSubsystem::tick

use core::fmt;

use alloc::string::String;

use powerctl_types::DomainId;

// =============================================================================
// ERROR KIND
// =============================================================================

/// Classification of power-management errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorKind {
    // -------------------------------------------------------------------------
    // Configuration Errors (100-199)
    // -------------------------------------------------------------------------
    /// Domain count outside the supported range
    InvalidDomainCount   = 100,

    /// Sensor count outside the supported range
    InvalidSensorCount   = 101,

    /// A timer or period configured as zero
    InvalidTiming        = 102,

    /// DVFS thresholds do not form a monotone staircase
    InvalidDvfsThresholds = 103,

    /// Thermal thresholds overlap or are inverted
    InvalidThermalThresholds = 104,

    /// Sensor membership names a sensor that does not exist
    InvalidSensorMap     = 105,

    // -------------------------------------------------------------------------
    // Dependency Errors (200-299)
    // -------------------------------------------------------------------------
    /// The dependency matrix contains a cycle
    CircularDependency   = 200,

    /// A domain depends on itself
    SelfDependency       = 201,

    /// The dependency matrix names a domain outside the configuration
    UnknownDomain        = 202,

    // -------------------------------------------------------------------------
    // Signal Errors (300-399)
    // -------------------------------------------------------------------------
    /// Per-domain input record count does not match the configuration
    DomainInputMismatch  = 300,

    /// Per-sensor input record count does not match the configuration
    SensorInputMismatch  = 301,
}

impl ErrorKind {
    /// Get the error category name
    pub const fn category(&self) -> &'static str {
        match *self as u32 {
            100..=199 => "Configuration",
            200..=299 => "Dependency",
            300..=399 => "Signal",
            _ => "Unknown",
        }
    }

    /// Whether this error is reported while loading configuration
    pub const fn is_configuration(&self) -> bool {
        matches!(*self as u32, 100..=299)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// =============================================================================
// POWER ERROR
// =============================================================================

/// Error returned by subsystem construction and tick evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerError {
    /// Error classification
    kind: ErrorKind,

    /// Human-readable message
    message: &'static str,

    /// Optional detailed message (heap allocated)
    details: Option<String>,

    /// Domain the error refers to
    domain: Option<DomainId>,
}

impl PowerError {
    /// Create new error with kind and message
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self {
            kind,
            message,
            details: None,
            domain: None,
        }
    }

    /// Create error from kind with default message
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind_to_message(kind))
    }

    /// Add details to error
    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    /// Add domain to error
    pub fn with_domain(mut self, domain: DomainId) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Get error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get message
    pub fn message(&self) -> &str {
        self.message
    }

    /// Get details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Get domain
    pub fn domain(&self) -> Option<DomainId> {
        self.domain
    }
}

impl fmt::Display for PowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.category(), self.message)?;

        if let Some(domain) = self.domain {
            write!(f, " ({})", domain)?;
        }

        if let Some(ref details) = self.details {
            write!(f, ": {}", details)?;
        }

        Ok(())
    }
}

impl From<ErrorKind> for PowerError {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

/// Default message for each error kind
const fn kind_to_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidDomainCount => "domain count out of range",
        ErrorKind::InvalidSensorCount => "sensor count out of range",
        ErrorKind::InvalidTiming => "timing constant must be nonzero",
        ErrorKind::InvalidDvfsThresholds => "DVFS thresholds are not monotone",
        ErrorKind::InvalidThermalThresholds => "thermal thresholds are inconsistent",
        ErrorKind::InvalidSensorMap => "sensor map names an unknown sensor",
        ErrorKind::CircularDependency => "circular dependency detected",
        ErrorKind::SelfDependency => "domain depends on itself",
        ErrorKind::UnknownDomain => "dependency names an unknown domain",
        ErrorKind::DomainInputMismatch => "domain input count mismatch",
        ErrorKind::SensorInputMismatch => "sensor input count mismatch",
    }
}

/// Result type for power-management operations
pub type PowerResult<T> = Result<T, PowerError>;

// =============================================================================
// TESTS
// =============================================================================
