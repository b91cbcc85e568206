use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the admission gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Admission-store parameter queried before every admission.
    pub policy_parameter: String,
    /// The only value of `policy_parameter` under which jobs are admitted.
    pub required_policy: String,
    /// Hint returned to rejected callers, in seconds.
    pub retry_after_secs: u64,
    /// Upper bound on one policy query; a slower answer counts as unknown.
    pub query_timeout_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            policy_parameter: "maxmemory-policy".into(),
            required_policy: "noeviction".into(),
            retry_after_secs: 5,
            query_timeout_ms: 2_000,
        }
    }
}

impl GateConfig {
    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: GateConfig = toml::from_str("retry_after_secs = 30").unwrap();
        assert_eq!(config.retry_after(), Duration::from_secs(30));
        assert_eq!(config.policy_parameter, "maxmemory-policy");
        assert_eq!(config.required_policy, "noeviction");
    }
}
