//! Errors that stop a scan from starting or finishing.
//!
//! Per-probe network failures are not represented here: they are folded
//! into [`ProbeOutcome`](crate::scanner::ProbeOutcome) and never abort a scan.
use thiserror::Error;

/// Conditions that reach the caller of [`Scanner`](crate::scanner::Scanner)
/// as distinguishable outcomes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The target is neither an IP literal nor a resolvable host name.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// The requested bounds are outside the valid port space or reversed.
    #[error("Invalid port range {start}-{end}: ports must satisfy 1 <= start <= end <= 65535")]
    InvalidRange { start: u32, end: u32 },

    /// A port in an explicit list is outside the valid port space.
    #[error("Invalid port {0}: ports must be between 1 and 65535")]
    InvalidPort(u32),

    /// An explicit port list contained no ports at all.
    #[error("No ports to scan")]
    EmptyPortList,

    /// The scan was interrupted. In-flight probes were allowed to drain.
    #[error("Scan cancelled after {completed}/{total} probes")]
    Cancelled {
        completed: u64,
        total: u64,
        open: Vec<u16>,
    },
}

impl ScanError {
    /// True for the errors raised before any probe is dispatched.
    pub const fn is_validation(&self) -> bool {
        !matches!(self, Self::Cancelled { .. })
    }

    /// True for the invalid-range family.
    pub const fn is_range(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange { .. } | Self::InvalidPort(_) | Self::EmptyPortList
        )
    }
}

#[cfg(test)]
mod tests {
    use super::ScanError;

    #[test]
    fn cancellation_is_not_a_validation_error() {
        let err = ScanError::Cancelled {
            completed: 3,
            total: 10,
            open: vec![],
        };
        assert!(!err.is_validation());
        assert!(!err.is_range());
        assert_eq!(err.to_string(), "Scan cancelled after 3/10 probes");
    }

    #[test]
    fn range_errors_are_validation_errors() {
        let err = ScanError::InvalidRange { start: 10, end: 5 };
        assert!(err.is_validation());
        assert!(err.is_range());
        assert!(err.to_string().contains("10-5"));

        assert!(ScanError::InvalidPort(0).is_range());
        assert!(ScanError::EmptyPortList.is_range());
        assert!(!ScanError::InvalidTarget("x".to_owned()).is_range());
    }
}
