//! Rate limiting algorithms module
//!
//! Per-client admission algorithms. The service currently uses a sliding
//! window log; the registry in [`crate::rate_limiter`] owns one counter per
//! client.

pub mod sliding_window;

pub use sliding_window::{Decision, WindowCounter};
