//! HTTP service implementation.
//!
//! ## Structure
//!
//! - [`handler`] - route handlers, shared state (`LeaderboardService`) and
//!   the error-to-response mapping.

pub mod handler;
