//! Edge authentication gateway: verifies the session evidence an upstream OAuth2 proxy attaches
//! to each request before any protected handler runs.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
