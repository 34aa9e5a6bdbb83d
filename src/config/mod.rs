//! Configuration for wikidat

mod logging;
mod network;
mod pipeline;
mod storage;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use network::NetworkConfig;
pub use pipeline::{ExecutionMode, PipelineConfig};
pub use storage::{StorageBackend, StorageConfig};

use crate::transform::is_supported_language;
use crate::transport::DATA_CHANNELS_PER_LINE;
use crate::types::RecordKind;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Lines, fan-out and batching
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Inter-stage channel ports
    #[serde(default)]
    pub network: NetworkConfig,
    /// Database and staging directories
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration rendered as TOML
    pub fn default_toml() -> Result<String> {
        let body = toml::to_string_pretty(&Config::default())?;
        Ok(format!("# wikidat configuration\n\n{}", body))
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        let pipeline = &self.pipeline;
        let network = &self.network;

        // Pipeline validation
        if pipeline.lines == 0 {
            errors.push("lines must be positive".to_string());
        }
        if RecordKind::ALL.iter().all(|kind| pipeline.fan(*kind) == 0) {
            errors.push("at least one of page_fan, revision_fan, logitem_fan must be positive".to_string());
        }
        for kind in RecordKind::ALL {
            if pipeline.cache_size(kind) == 0 {
                errors.push(format!("{}_cache_size must be positive", kind));
            }
        }
        if !is_supported_language(&pipeline.language) {
            errors.push(format!("unsupported language key '{}'", pipeline.language));
        }
        if pipeline.run_timeout_secs == 0 {
            errors.push("run_timeout_secs must be positive".to_string());
        }

        // Network validation
        if network.host.is_empty() {
            errors.push("host must not be empty".to_string());
        }
        if network.port_stride < DATA_CHANNELS_PER_LINE {
            errors.push(format!(
                "port_stride must be at least {} (data channels per line)",
                DATA_CHANNELS_PER_LINE
            ));
        }
        if network.base_port == 0 || network.control_port == 0 {
            errors.push("base_port and control_port must be between 1 and 65535".to_string());
        }
        if pipeline.lines > 0 {
            let last_line = (pipeline.lines - 1) as u64 * network.port_stride as u64;
            let last_data = network.base_port as u64 + last_line + DATA_CHANNELS_PER_LINE as u64 - 1;
            if last_data > u16::MAX as u64 {
                errors.push(format!("data ports of {} lines exceed 65535", pipeline.lines));
            }
            if network.control_port as u64 + last_line > u16::MAX as u64 {
                errors.push(format!("control ports of {} lines exceed 65535", pipeline.lines));
            }
            if self.control_overlaps_data() {
                errors.push("control ports overlap data ports".to_string());
            }
        }
        if network.connect_timeout_secs == 0 {
            errors.push("connect_timeout_secs must be positive".to_string());
        }
        if network.ready_timeout_secs == 0 {
            errors.push("ready_timeout_secs must be positive".to_string());
        }

        // Storage validation
        if self.storage.url.is_empty() {
            errors.push("storage url must not be empty".to_string());
        }
        if self.storage.staging_dir.as_os_str().is_empty() {
            errors.push("staging_dir must not be empty".to_string());
        }
        if self.storage.log_dir.as_os_str().is_empty() {
            errors.push("log_dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }

    fn control_overlaps_data(&self) -> bool {
        let stride = self.network.port_stride as u64;
        let base = self.network.base_port as u64;
        let width = DATA_CHANNELS_PER_LINE as u64;
        (0..self.pipeline.lines as u64).any(|control_line| {
            let control = self.network.control_port as u64 + control_line * stride;
            (0..self.pipeline.lines as u64).any(|data_line| {
                let start = base + data_line * stride;
                (start..start + width).contains(&control)
            })
        })
    }
}
