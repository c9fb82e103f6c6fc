//! HTTP request handlers.

mod health;
mod jobs;
mod stream;

pub use health::{health_check, metrics_handler};
pub use jobs::train;
pub use stream::ws_handler;
