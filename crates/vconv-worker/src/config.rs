//! Worker configuration.

use std::net::SocketAddr;
use std::time::Duration;

use vconv_models::env::{self, ConfigError, ConfigResult, Lookup};

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Pause after a requeue, multiplied by the delivery counter
    pub requeue_backoff: Duration,
    /// Upper bound for the post-requeue pause
    pub max_requeue_backoff: Duration,
    /// How often the claim on the job being processed is renewed
    pub lease_renewal: Duration,
    /// Address for the Prometheus listener; none disables it
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            requeue_backoff: Duration::from_millis(1000),
            max_requeue_backoff: Duration::from_secs(30),
            lease_renewal: Duration::from_secs(100),
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(&env::process_env())
    }

    pub fn from_lookup(vars: &impl Lookup) -> ConfigResult<Self> {
        let metrics_addr = match vars.get("WORKER_METRICS_ADDR") {
            None => None,
            Some(raw) => Some(raw.parse::<SocketAddr>().map_err(|e| {
                ConfigError::invalid("WORKER_METRICS_ADDR", raw.as_str(), e.to_string())
            })?),
        };

        let lease_renewal = env::secs_or(vars, "WORKER_LEASE_RENEWAL_SECS", 100)?;
        if lease_renewal.is_zero() {
            return Err(ConfigError::invalid("WORKER_LEASE_RENEWAL_SECS", "0", "must be positive"));
        }

        Ok(Self {
            requeue_backoff: env::millis_or(vars, "WORKER_REQUEUE_BACKOFF_MS", 1000)?,
            max_requeue_backoff: env::millis_or(vars, "WORKER_MAX_REQUEUE_BACKOFF_MS", 30_000)?,
            lease_renewal,
            metrics_addr,
        })
    }

    /// Shorten the lease renewal period to at most a third of the broker's
    /// reclaim window.
    pub fn fit_lease_to(mut self, claim_min_idle: Duration) -> Self {
        let bound = (claim_min_idle / 3).max(Duration::from_millis(1));
        self.lease_renewal = self.lease_renewal.min(bound);
        self
    }

    /// Pause before fetching again after requeueing delivery number
    /// `attempt`.
    pub fn requeue_delay(&self, attempt: u32) -> Duration {
        self.requeue_backoff
            .saturating_mul(attempt.max(1))
            .min(self.max_requeue_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Lookup {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::from_lookup(&vars(&[])).unwrap();
        assert_eq!(config, WorkerConfig::default());
    }

    #[test]
    fn test_requeue_delay_linear_and_capped() {
        let config = WorkerConfig::from_lookup(&vars(&[
            ("WORKER_REQUEUE_BACKOFF_MS", "500"),
            ("WORKER_MAX_REQUEUE_BACKOFF_MS", "2000"),
        ]))
        .unwrap();

        assert_eq!(config.requeue_delay(1), Duration::from_millis(500));
        assert_eq!(config.requeue_delay(3), Duration::from_millis(1500));
        assert_eq!(config.requeue_delay(10), Duration::from_millis(2000));
    }

    #[test]
    fn test_lease_renewal_fits_reclaim_window() {
        let config = WorkerConfig::default();
        assert_eq!(
            config.clone().fit_lease_to(Duration::from_secs(300)).lease_renewal,
            Duration::from_secs(100)
        );
        assert_eq!(
            config.clone().fit_lease_to(Duration::from_secs(60)).lease_renewal,
            Duration::from_secs(20)
        );
        assert_eq!(
            config.fit_lease_to(Duration::ZERO).lease_renewal,
            Duration::from_millis(1)
        );

        let err = WorkerConfig::from_lookup(&vars(&[("WORKER_LEASE_RENEWAL_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "WORKER_LEASE_RENEWAL_SECS"));
    }

    #[test]
    fn test_metrics_addr() {
        let config = WorkerConfig::from_lookup(&vars(&[("WORKER_METRICS_ADDR", "0.0.0.0:9100")])).unwrap();
        assert_eq!(config.metrics_addr, Some("0.0.0.0:9100".parse().unwrap()));

        let err = WorkerConfig::from_lookup(&vars(&[("WORKER_METRICS_ADDR", "localhost")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "WORKER_METRICS_ADDR"));
    }

    #[test]
    fn test_invalid_backoff_rejected() {
        let err = WorkerConfig::from_lookup(&vars(&[("WORKER_REQUEUE_BACKOFF_MS", "1s")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "WORKER_REQUEUE_BACKOFF_MS"));
    }
}
