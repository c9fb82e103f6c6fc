//! jobstream Server Library
//!
//! This crate provides the network-facing side of jobstream: request
//! validation, the streaming session that relays worker events to a
//! WebSocket client, the request/acknowledge endpoint, startup checks and
//! metrics.

pub mod config;
pub mod http;
pub mod metrics;
pub mod protocol;
pub mod service;
pub mod session;
pub mod startup;
pub mod state;

pub use config::Config;
pub use service::{Acknowledgement, ConfigSchema, HealthStatus, JobService, ServiceError};
pub use session::{ClientConnection, DirectConnectionSink, SessionReport, StreamSession, TransportError};
pub use state::AppState;
