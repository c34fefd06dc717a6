//! HTTP handlers.

pub mod download;
pub mod health;
pub mod login;
pub mod upload;

pub use download::download;
pub use health::{health, ready};
pub use login::login;
pub use upload::upload;
