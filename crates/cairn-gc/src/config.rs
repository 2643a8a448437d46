use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GcError, GcResult};

/// Eviction policy for one namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Usage ceiling. Collection does nothing while a namespace is at or
    /// below it.
    pub max_namespace_bytes: u64,
    /// Objects accessed more recently than this are never evicted.
    pub grace_period_secs: u64,
    /// Deletes issued between cancellation checks.
    pub batch_size: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            max_namespace_bytes: 10 * 1024 * 1024 * 1024,
            grace_period_secs: 60 * 60,
            batch_size: 256,
        }
    }
}

impl GcConfig {
    /// Minimum age since last access before an object may be evicted.
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Reject a zero batch size.
    pub fn validate(&self) -> GcResult<()> {
        if self.batch_size == 0 {
            return Err(GcError::InvalidConfig("batch_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = GcConfig::default();
        assert_eq!(c.max_namespace_bytes, 10 * 1024 * 1024 * 1024);
        assert_eq!(c.grace_period(), Duration::from_secs(3600));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c: GcConfig = toml::from_str("max_namespace_bytes = 500").unwrap();
        assert_eq!(c.max_namespace_bytes, 500);
        assert_eq!(c.batch_size, 256);
    }

    #[test]
    fn zero_batch_is_rejected() {
        let c = GcConfig {
            batch_size: 0,
            ..GcConfig::default()
        };
        assert!(matches!(c.validate(), Err(GcError::InvalidConfig(_))));
    }
}
