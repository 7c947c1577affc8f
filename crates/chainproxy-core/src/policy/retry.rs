//! Retry ceiling for the failover loop.
//!
//! There is no backoff: failover to the next provider is immediate and only
//! throttled by the shared rate limiter.

use crate::error::ProxyError;

/// Maximum number of forward attempts for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Keep rotating through providers until one succeeds.
    Unlimited,
    /// Give up after this many failed attempts. `0` still makes one attempt.
    Attempts(u32),
}

impl RetryLimit {
    /// Interpret the integer from the config file (`-1` = unlimited).
    pub fn from_config(value: i64) -> Result<Self, ProxyError> {
        match value {
            -1 => Ok(Self::Unlimited),
            n if n >= 0 => u32::try_from(n)
                .map(Self::Attempts)
                .map_err(|_| ProxyError::Config(format!("retry_limit {n} is too large"))),
            n => Err(ProxyError::Config(format!(
                "retry_limit must be -1 (unlimited) or >= 0, got {n}"
            ))),
        }
    }

    /// Returns `true` once `attempts` failures exhaust the ceiling.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        match self {
            Self::Unlimited => false,
            Self::Attempts(limit) => attempts >= *limit,
        }
    }
}

impl std::fmt::Display for RetryLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlimited => write!(f, "unlimited"),
            Self::Attempts(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_values() {
        assert_eq!(RetryLimit::from_config(-1).unwrap(), RetryLimit::Unlimited);
        assert_eq!(RetryLimit::from_config(3).unwrap(), RetryLimit::Attempts(3));
        assert!(RetryLimit::from_config(-2).is_err());
        assert!(RetryLimit::from_config(i64::MAX).is_err());
    }

    #[test]
    fn exhaustion_boundary() {
        let limit = RetryLimit::Attempts(2);
        assert!(!limit.is_exhausted(1));
        assert!(limit.is_exhausted(2));
        assert!(RetryLimit::Attempts(0).is_exhausted(1));
        assert!(!RetryLimit::Unlimited.is_exhausted(u32::MAX));
    }
}
