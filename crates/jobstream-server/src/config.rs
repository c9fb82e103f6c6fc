//! Server configuration.

use std::path::PathBuf;

use crate::service::ConfigSchema;

/// Server configuration.
pub struct Config {
    /// HTTP/WebSocket server bind address.
    pub http_addr: String,

    /// Job parameters every request must carry.
    pub required_fields: Vec<String>,

    /// Capacity of each session's handoff queue (`None` = unbounded).
    pub queue_capacity: Option<usize>,

    /// Environment variable holding the credential token.
    pub token_env: String,

    /// Abort startup when the credential token is missing.
    pub require_token: bool,

    /// Launcher configuration file checked at startup (warning only).
    pub launcher_config: Option<PathBuf>,

    /// Default number of steps for the simulated trainer.
    pub sim_steps: u64,

    /// Default per-step delay for the simulated trainer (milliseconds).
    pub sim_step_delay_ms: u64,
}

impl Config {
    /// Build the validation schema for inbound job payloads.
    pub fn schema(&self) -> ConfigSchema {
        self.required_fields
            .iter()
            .fold(ConfigSchema::default(), |schema, field| schema.require(field.as_str()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8000".to_string(),
            required_fields: Vec::new(),
            queue_capacity: None,
            token_env: "JOBSTREAM_TOKEN".to_string(),
            require_token: true,
            launcher_config: None,
            sim_steps: 5,
            sim_step_delay_ms: 500,
        }
    }
}
