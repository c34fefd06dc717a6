//! Blob identifiers and content-store namespaces.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque identifier of a stored blob.
///
/// Identifiers are generated by the content store on `put` and are always
/// hyphenated UUIDs, so a value taken from a message or a query string can be
/// validated before it reaches a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobId(String);

/// Returned when a string is not a well-formed blob identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid blob id: {0:?}")]
pub struct InvalidBlobId(pub String);

impl BlobId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse an identifier received from outside the store.
    pub fn parse(s: &str) -> Result<Self, InvalidBlobId> {
        Uuid::try_parse(s)
            .map(|u| Self(u.hyphenated().to_string()))
            .map_err(|_| InvalidBlobId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BlobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BlobId {
    type Err = InvalidBlobId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BlobId {
    type Error = InvalidBlobId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BlobId> for String {
    fn from(id: BlobId) -> Self {
        id.0
    }
}

/// Content-store namespace. Identifiers never cross namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Uploaded source media.
    Videos,
    /// Derived audio produced by the worker.
    Mp3s,
}

impl Namespace {
    /// Key prefix used by object-store backends.
    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Videos => "videos",
            Namespace::Mp3s => "mp3s",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}
