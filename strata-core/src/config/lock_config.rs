//! Distributed lease lock configuration.

use serde::{Deserialize, Serialize};

use crate::errors::{StrataError, StrataResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub enabled: bool,
    /// Lease length granted on acquire and on every renewal.
    pub lease_ttl_secs: u64,
    /// How often the holder renews while work is in progress.
    pub renew_interval_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lease_ttl_secs: 30,
            renew_interval_secs: 10,
        }
    }
}

impl LockConfig {
    pub fn validate(&self) -> StrataResult<()> {
        if self.renew_interval_secs == 0 || self.renew_interval_secs >= self.lease_ttl_secs {
            return Err(StrataError::ConfigError(format!(
                "lock.renew_interval_secs ({}) must be in [1, lease_ttl_secs ({}))",
                self.renew_interval_secs, self.lease_ttl_secs
            )));
        }
        Ok(())
    }
}
