//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, PipelineConfig};

/// Main application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-session pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Model paths
    #[serde(default)]
    pub models: ModelPaths,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Validate settings, rejecting values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.pipeline.vad.threshold) {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.vad.threshold".to_string(),
                message: "must be within 0.0..=1.0".to_string(),
            });
        }

        if self.pipeline.vad.frame_samples == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.vad.frame_samples".to_string(),
                message: "must be non-zero".to_string(),
            });
        }

        if self.pipeline.pacing.quantum_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.pacing.quantum_ms".to_string(),
                message: "must be non-zero".to_string(),
            });
        }

        if self.pipeline.pacing.max_buffered_ms < self.pipeline.pacing.quantum_ms {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.pacing.max_buffered_ms".to_string(),
                message: "must be at least one playback quantum".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen host
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket path
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Maximum concurrent sessions
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8848
}
fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_max_connections() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_path: default_ws_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Model file paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPaths {
    /// Silero VAD model path
    #[serde(default = "default_vad_path")]
    pub vad: String,
}

fn default_vad_path() -> String {
    "models/silero_vad.onnx".to_string()
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            vad: default_vad_path(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON logs instead of human-readable ones
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`VOICE_LOOP__` prefix, `__` separator)
/// 2. `config/{env}.yaml` (if an environment name is given)
/// 3. `config/default.yaml`
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE_LOOP")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;

    Ok(settings)
}
