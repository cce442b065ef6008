//! Environment configuration for the measurement/action exchange
//!
//! The four timing fields are required; a missing field fails
//! deserialization and startup stops there.

use crate::error::{LinkGymError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Step-loop timing, all values in milliseconds of simulated time except
/// the wait bound, which is wall-clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvConfig {
    /// Simulated time of the first measurement emission
    pub measurement_start_time_ms: u64,
    /// Simulated time between consecutive emissions
    pub measurement_interval_ms: u64,
    /// Wall-clock bound on the per-step wait for an inward action
    pub max_wait_time_for_action_ms: u64,
    /// Simulated time after which no further measurements are emitted
    pub env_end_time_ms: u64,
}

impl EnvConfig {
    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file (the conventional `env-configure.json`)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the loop cannot run on
    pub fn validate(&self) -> Result<()> {
        if self.measurement_interval_ms == 0 {
            return Err(LinkGymError::Config(
                "measurement_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
