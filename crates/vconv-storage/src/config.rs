//! Content-store configuration.

use std::str::FromStr;

use vconv_models::env::{self, Lookup};
use vconv_models::{ConfigError, ConfigResult};

/// Which backend holds the blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// S3-compatible object store (MinIO, R2, S3).
    S3,
    /// Process-local map; contents are lost on exit.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(StoreBackend::S3),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{other}', expected 's3' or 'memory'")),
        }
    }
}

/// Configuration for the content store.
#[derive(Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Object-store host (no scheme, no port)
    pub host: String,
    /// Object-store port
    pub port: u16,
    /// Use https for the endpoint
    pub tls: bool,
    /// Bucket holding both namespaces
    pub bucket: String,
    /// Region (MinIO accepts any value)
    pub region: String,
    /// Access key ID (required for the S3 backend)
    pub access_key_id: Option<String>,
    /// Secret access key (required for the S3 backend)
    pub secret_access_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::S3,
            host: "minio".to_string(),
            port: 9000,
            tls: false,
            bucket: "vconv".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(&env::process_env())
    }

    pub fn from_lookup(vars: &impl Lookup) -> ConfigResult<Self> {
        let defaults = Self::default();
        let backend = env::parse_or(vars, "STORE_BACKEND", defaults.backend)?;

        let (access_key_id, secret_access_key) = match backend {
            StoreBackend::S3 => (
                Some(env::required(vars, "STORE_ACCESS_KEY_ID")?),
                Some(env::required(vars, "STORE_SECRET_ACCESS_KEY")?),
            ),
            StoreBackend::Memory => (None, None),
        };

        let bucket = env::string_or(vars, "STORE_BUCKET", &defaults.bucket);
        if bucket.contains('/') {
            return Err(ConfigError::invalid("STORE_BUCKET", bucket, "bucket names cannot contain '/'"));
        }

        Ok(Self {
            backend,
            host: env::host_or(vars, "STORE_HOST", &defaults.host)?,
            port: env::parse_or(vars, "STORE_PORT", defaults.port)?,
            tls: env::parse_or(vars, "STORE_TLS", defaults.tls)?,
            bucket,
            region: env::string_or(vars, "STORE_REGION", &defaults.region),
            access_key_id,
            secret_access_key,
        })
    }

    /// S3 API endpoint URL.
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}
