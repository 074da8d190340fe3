//! Configuration for the voice-loop server
//!
//! Every tunable lives in an explicit config value handed to a component at
//! construction; nothing reads globals. Settings layer `config/default.yaml`,
//! an optional environment file, and `VOICE_LOOP__`-prefixed variables.

mod pipeline;
mod settings;

pub use pipeline::{PacingConfig, PipelineConfig, ReplyConfig, SttConfig, VadConfig};
pub use settings::{
    load_settings, ModelPaths, ObservabilityConfig, ServerConfig, Settings,
};

use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config load error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
