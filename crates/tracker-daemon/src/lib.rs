//! PageSpeed tracker daemon
//!
//! Exposes the HTTP API and configuration so the router can be exercised
//! without a running server.

pub mod api;
pub mod config;
