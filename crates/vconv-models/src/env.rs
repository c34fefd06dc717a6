//! Strict environment parsing.
//!
//! Every process reads its configuration once at startup. A variable that is
//! set but does not parse fails startup with a [`ConfigError`] naming the
//! variable; nothing is coerced or guessed.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is required but not set")]
    Missing { var: String },

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn missing(var: impl Into<String>) -> Self {
        Self::Missing { var: var.into() }
    }

    pub fn invalid(var: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var: var.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Variable lookup. `from_env` constructors pass the process environment;
/// tests pass a map.
pub trait Lookup {
    fn get(&self, var: &str) -> Option<String>;
}

impl<F> Lookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, var: &str) -> Option<String> {
        self(var)
    }
}

/// The process environment. Empty values count as unset.
pub fn process_env() -> impl Lookup {
    |var: &str| std::env::var(var).ok().filter(|v| !v.is_empty())
}

/// String value with a default.
pub fn string_or(env: &impl Lookup, var: &str, default: &str) -> String {
    env.get(var).unwrap_or_else(|| default.to_string())
}

/// Required string value.
pub fn required(env: &impl Lookup, var: &str) -> ConfigResult<String> {
    env.get(var).ok_or_else(|| ConfigError::missing(var))
}

/// Parsed value with a default. Set-but-invalid is an error.
pub fn parse_or<T>(env: &impl Lookup, var: &str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env.get(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(var, raw.as_str(), e.to_string())),
    }
}

/// Whole seconds with a default.
pub fn secs_or(env: &impl Lookup, var: &str, default_secs: u64) -> ConfigResult<Duration> {
    parse_or(env, var, default_secs).map(Duration::from_secs)
}

/// Milliseconds with a default.
pub fn millis_or(env: &impl Lookup, var: &str, default_ms: u64) -> ConfigResult<Duration> {
    parse_or(env, var, default_ms).map(Duration::from_millis)
}

/// A bare hostname. URLs, ports and paths are rejected rather than stripped.
pub fn host_or(env: &impl Lookup, var: &str, default: &str) -> ConfigResult<String> {
    let host = string_or(env, var, default);
    if host.contains("://") || host.contains('/') || host.contains(':') || host.trim().is_empty() {
        return Err(ConfigError::invalid(
            var,
            host,
            "expected a bare hostname without scheme, port or path",
        ));
    }
    Ok(host)
}
