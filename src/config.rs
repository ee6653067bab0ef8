use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    errors::{ErrorKind, Result},
    uapi::{self, RetryPolicy, Sysfs},
};

/// Settings a [`Controller`](crate::Controller) can be built from.
///
/// Every field has a default, so a configuration file only needs to name what differs:
///
/// ```json
/// { "available_pins": [4, 17, 27], "export_backoff_ms": 20 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub sysfs_root: PathBuf,
    pub available_pins: Vec<u32>,
    pub export_attempts: u32,
    pub export_backoff_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(uapi::SYSFS_GPIO_ROOT),
            available_pins: Vec::new(),
            export_attempts: uapi::DEFAULT_EXPORT_ATTEMPTS,
            export_backoff_ms: uapi::DEFAULT_EXPORT_BACKOFF.as_millis() as u64,
        }
    }
}

impl ControllerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ErrorKind::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents)
            .map_err(|e| ErrorKind::InvalidConfig(format!("invalid config json: {e}")))?;

        if config.export_attempts == 0 {
            return Err(ErrorKind::InvalidConfig("export_attempts must be at least 1".into()).into());
        }
        Ok(config)
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.export_attempts,
            backoff: Duration::from_millis(self.export_backoff_ms),
        }
    }

    pub fn sysfs(&self) -> Sysfs {
        Sysfs::new(&self.sysfs_root).with_retry(self.retry())
    }
}
