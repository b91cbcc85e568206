use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::GateConfig;
use crate::error::{GateError, GateResult};

/// Somewhere the admission store's eviction policy can be read from.
#[async_trait]
pub trait EvictionPolicySource: Send + Sync {
    /// Raw reply to `CONFIG GET <parameter>`.
    async fn config_get(&self, parameter: &str) -> GateResult<Vec<String>>;
}

/// Reads the policy from a live Redis server.
///
/// A fresh connection is opened for every query and dropped afterwards.
pub struct RedisPolicySource {
    client: redis::Client,
}

impl RedisPolicySource {
    pub fn open(url: &str) -> GateResult<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }
}

#[async_trait]
impl EvictionPolicySource for RedisPolicySource {
    async fn config_get(&self, parameter: &str) -> GateResult<Vec<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let reply: Vec<String> = redis::cmd("CONFIG")
            .arg("GET")
            .arg(parameter)
            .query_async(&mut conn)
            .await?;
        Ok(reply)
    }
}

/// A fixed reply, for stores that cannot evict and for tests.
#[derive(Clone, Debug)]
pub struct StaticPolicySource {
    reply: Result<Vec<String>, String>,
}

impl StaticPolicySource {
    pub fn new<S: Into<String>>(reply: impl IntoIterator<Item = S>) -> Self {
        Self {
            reply: Ok(reply.into_iter().map(Into::into).collect()),
        }
    }

    /// Answers with `(parameter, policy)`.
    pub fn reporting(parameter: &str, policy: &str) -> Self {
        Self::new([parameter, policy])
    }

    /// Every query fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
        }
    }
}

#[async_trait]
impl EvictionPolicySource for StaticPolicySource {
    async fn config_get(&self, _parameter: &str) -> GateResult<Vec<String>> {
        self.reply
            .clone()
            .map_err(|message| GateError::stage("eviction-policy", message))
    }
}

/// Whether a `CONFIG GET` reply is exactly the `(parameter, required)` pair.
pub fn reply_permits(reply: &[String], parameter: &str, required: &str) -> bool {
    matches!(reply, [name, value] if name == parameter && value == required)
}

/// Refuses admission unless the admission store is configured never to evict.
///
/// The policy is queried on every call and never cached. A failed or slow
/// query means the policy is unknown, and unknown fails closed.
#[derive(Clone)]
pub struct BackpressureGuard {
    source: Arc<dyn EvictionPolicySource>,
    config: GateConfig,
}

impl BackpressureGuard {
    pub fn new(source: Arc<dyn EvictionPolicySource>, config: GateConfig) -> Self {
        Self { source, config }
    }

    pub async fn check_admission_policy(&self) -> bool {
        let parameter = &self.config.policy_parameter;
        let timeout = self.config.query_timeout();
        let reply = match tokio::time::timeout(timeout, self.source.config_get(parameter)).await {
            Ok(reply) => reply,
            Err(_) => Err(GateError::Timeout(timeout)),
        };

        match reply {
            Ok(reply) => {
                let permitted = reply_permits(&reply, parameter, &self.config.required_policy);
                if !permitted {
                    tracing::warn!(?reply, required = %self.config.required_policy, "admission store may evict jobs");
                }
                permitted
            }
            Err(err) => {
                tracing::warn!(error = %err, "eviction policy unknown, refusing admission");
                false
            }
        }
    }

    pub fn retry_after(&self) -> Duration {
        self.config.retry_after()
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}

impl std::fmt::Debug for BackpressureGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackpressureGuard")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(source: StaticPolicySource) -> BackpressureGuard {
        BackpressureGuard::new(Arc::new(source), GateConfig::default())
    }

    struct SlowSource;

    #[async_trait]
    impl EvictionPolicySource for SlowSource {
        async fn config_get(&self, _parameter: &str) -> GateResult<Vec<String>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec!["maxmemory-policy".into(), "noeviction".into()])
        }
    }

    #[tokio::test]
    async fn noeviction_pair_admits() {
        let guard = guard(StaticPolicySource::reporting("maxmemory-policy", "noeviction"));
        assert!(guard.check_admission_policy().await);
    }

    #[tokio::test]
    async fn any_other_reply_refuses() {
        let replies: Vec<Vec<&str>> = vec![
            vec![],
            vec!["maxmemory-policy"],
            vec!["maxmemory-policy", "allkeys-lru"],
            vec!["maxmemory-policy", "NOEVICTION"],
            vec!["maxmemory", "noeviction"],
            vec!["maxmemory-policy", "noeviction", "extra"],
            vec!["noeviction", "maxmemory-policy"],
        ];
        for reply in replies {
            let guard = guard(StaticPolicySource::new(reply.clone()));
            assert!(!guard.check_admission_policy().await, "{reply:?}");
        }
    }

    #[tokio::test]
    async fn query_failure_refuses() {
        let guard = guard(StaticPolicySource::failing("connection refused"));
        assert!(!guard.check_admission_policy().await);
    }

    #[tokio::test]
    async fn slow_query_refuses() {
        let config = GateConfig {
            query_timeout_ms: 20,
            ..GateConfig::default()
        };
        let guard = BackpressureGuard::new(Arc::new(SlowSource), config);
        assert!(!guard.check_admission_policy().await);
    }

    #[test]
    fn malformed_url_is_rejected_at_open() {
        assert!(RedisPolicySource::open("not a url").is_err());
    }
}
