//! API configuration.

use std::time::Duration;

use vconv_models::env::{self, ConfigError, ConfigResult, Lookup};

/// API server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Base URL of the external auth service
    pub auth_service_url: String,
    /// Bound on each call to the auth service
    pub auth_timeout: Duration,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size
    pub max_body_size: usize,
    /// Serve Prometheus metrics at /metrics
    pub metrics_enabled: bool,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            auth_service_url: "http://auth:5000".to_string(),
            auth_timeout: Duration::from_secs(10),
            cors_origins: vec!["*".to_string()],
            max_body_size: 512 * 1024 * 1024, // 512MiB
            metrics_enabled: true,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(&env::process_env())
    }

    pub fn from_lookup(vars: &impl Lookup) -> ConfigResult<Self> {
        let defaults = Self::default();

        let auth_service_url = env::string_or(vars, "AUTH_SERVICE_URL", &defaults.auth_service_url);
        if !(auth_service_url.starts_with("http://") || auth_service_url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "AUTH_SERVICE_URL",
                auth_service_url,
                "expected an http:// or https:// URL",
            ));
        }

        let metrics_enabled = match vars.get("METRICS_ENABLED") {
            None => defaults.metrics_enabled,
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::invalid(
                        "METRICS_ENABLED",
                        raw.as_str(),
                        "expected true, false, 1 or 0",
                    ))
                }
            },
        };

        let cors_origins = match vars.get("CORS_ORIGINS") {
            None => defaults.cors_origins,
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        Ok(Self {
            host: env::string_or(vars, "API_HOST", &defaults.host),
            port: env::parse_or(vars, "API_PORT", defaults.port)?,
            auth_service_url: auth_service_url.trim_end_matches('/').to_string(),
            auth_timeout: env::secs_or(vars, "AUTH_TIMEOUT_SECS", 10)?,
            cors_origins,
            max_body_size: env::parse_or(vars, "MAX_BODY_SIZE", defaults.max_body_size)?,
            metrics_enabled,
            environment: env::string_or(vars, "ENVIRONMENT", &defaults.environment),
        })
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
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
        let config = ApiConfig::from_lookup(&vars(&[])).unwrap();
        assert_eq!(config, ApiConfig::default());
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert!(!config.is_production());
    }

    #[test]
    fn test_overrides() {
        let config = ApiConfig::from_lookup(&vars(&[
            ("API_PORT", "9000"),
            ("AUTH_SERVICE_URL", "https://auth.internal/"),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
            ("MAX_BODY_SIZE", "1024"),
            ("METRICS_ENABLED", "false"),
            ("ENVIRONMENT", "Production"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.auth_service_url, "https://auth.internal");
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.max_body_size, 1024);
        assert!(!config.metrics_enabled);
        assert!(config.is_production());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ApiConfig::from_lookup(&vars(&[("API_PORT", "http://x:80")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "API_PORT"));

        let err = ApiConfig::from_lookup(&vars(&[("AUTH_SERVICE_URL", "auth:5000")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "AUTH_SERVICE_URL"));

        let err = ApiConfig::from_lookup(&vars(&[("METRICS_ENABLED", "yes")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "METRICS_ENABLED"));
    }
}
