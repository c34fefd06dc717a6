//! Broker and queue-name configuration.

use std::time::Duration;

use uuid::Uuid;
use vconv_models::env::{self, Lookup};
use vconv_models::ConfigResult;

use crate::backoff::LinearBackoff;

/// Connection settings for the Redis Streams broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker host (no scheme, no port)
    pub host: String,
    /// Broker port
    pub port: u16,
    /// How long the liveness check tolerates failed pings before asking for
    /// a reconnect
    pub heartbeat: Duration,
    /// Bound on establishing the TCP connection
    pub socket_timeout: Duration,
    /// Bound on waiting for any reply from the broker
    pub blocked_connection_timeout: Duration,
    /// Connect attempts before giving up
    pub connect_attempts: u32,
    /// Linear backoff unit between connect attempts
    pub backoff_unit: Duration,
    /// Period of the liveness check
    pub liveness_period: Duration,
    /// Consumer group shared by all workers
    pub consumer_group: String,
    /// This process's consumer name within the group
    pub consumer_name: String,
    /// How long a fetch blocks waiting for a new entry
    pub poll_interval: Duration,
    /// Idle time after which another consumer's unsettled entry is reclaimed
    pub claim_min_idle: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "redis".to_string(),
            port: 6379,
            heartbeat: Duration::from_secs(120),
            socket_timeout: Duration::from_secs(5),
            blocked_connection_timeout: Duration::from_secs(300),
            connect_attempts: 5,
            backoff_unit: Duration::from_secs(5),
            liveness_period: Duration::from_secs(30),
            consumer_group: "vconv:converters".to_string(),
            consumer_name: format!("converter-{}", Uuid::new_v4()),
            poll_interval: Duration::from_secs(1),
            claim_min_idle: Duration::from_secs(300),
        }
    }
}

impl BrokerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(&env::process_env())
    }

    pub fn from_lookup(vars: &impl Lookup) -> ConfigResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: env::host_or(vars, "BROKER_HOST", &defaults.host)?,
            port: env::parse_or(vars, "BROKER_PORT", defaults.port)?,
            heartbeat: env::secs_or(vars, "BROKER_HEARTBEAT_SECS", 120)?,
            socket_timeout: env::secs_or(vars, "BROKER_SOCKET_TIMEOUT_SECS", 5)?,
            blocked_connection_timeout: env::secs_or(vars, "BROKER_BLOCKED_TIMEOUT_SECS", 300)?,
            connect_attempts: env::parse_or(vars, "BROKER_CONNECT_ATTEMPTS", defaults.connect_attempts)?,
            backoff_unit: env::secs_or(vars, "BROKER_BACKOFF_UNIT_SECS", 5)?,
            liveness_period: env::secs_or(vars, "BROKER_LIVENESS_PERIOD_SECS", 30)?,
            consumer_group: env::string_or(vars, "BROKER_CONSUMER_GROUP", &defaults.consumer_group),
            consumer_name: env::string_or(vars, "BROKER_CONSUMER_NAME", &defaults.consumer_name),
            poll_interval: env::millis_or(vars, "BROKER_POLL_INTERVAL_MS", 1000)?,
            claim_min_idle: env::secs_or(vars, "BROKER_CLAIM_MIN_IDLE_SECS", 300)?,
        })
    }

    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }

    /// Connect retry policy.
    pub fn backoff(&self) -> LinearBackoff {
        LinearBackoff::new(format!("broker connect to {}:{}", self.host, self.port))
            .with_max_attempts(self.connect_attempts)
            .with_unit(self.backoff_unit)
    }
}

/// Names of the two durable queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    /// Conversion jobs
    pub jobs: String,
    /// Completion events
    pub completions: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            jobs: "video".to_string(),
            completions: "mp3".to_string(),
        }
    }
}

impl QueueNames {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(&env::process_env())
    }

    pub fn from_lookup(vars: &impl Lookup) -> ConfigResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            jobs: env::string_or(vars, "VIDEO_QUEUE", &defaults.jobs),
            completions: env::string_or(vars, "MP3_QUEUE", &defaults.completions),
        })
    }
}
