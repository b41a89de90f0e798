//! HTTP handler definitions for the list server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for building the router.

pub mod health;
pub mod lists;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use lists::{
    list_aftermarket_devices, list_privileges, list_rewards, list_stakes, list_vehicles, ApiError,
};

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::service::ListService;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc`s and cheaply clonable services.
#[derive(Clone)]
pub struct AppState {
    /// Paginated listings.
    pub lists: ListService,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Network configuration.
    pub config: Arc<NetworkConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
