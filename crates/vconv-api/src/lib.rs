//! Axum HTTP gateway for the conversion pipeline.
//!
//! This crate provides:
//! - `POST /upload`: store a video and enqueue its conversion
//! - `GET /download`: serve converted audio
//! - `POST /login`: pass-through to the auth service
//! - Health, readiness and Prometheus endpoints

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use auth::{AuthServiceClient, Identity, IdentityValidator};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
