//! jobstream Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/WebSocket transports
//! - The async runtime
//! - Any particular job implementation
//!
//! All types here describe a single job execution and the session that
//! streams it to a client.

pub mod config;
pub mod error;
pub mod event;
pub mod ids;
pub mod result;
pub mod status;

// Re-export commonly used types
pub use config::JobConfig;
pub use error::CoreError;
pub use event::JobEvent;
pub use ids::{JobId, SessionId};
pub use result::{JobFailure, JobResult};
pub use status::SessionState;
