pub mod algorithms;
pub mod client_identity;
pub mod clock;
pub mod config;
pub mod config_validator;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod telemetry;

pub use config::Config;
pub use error::{ApiError, Error, Result};
pub use server::{create_app, create_app_with_clock, Server};
