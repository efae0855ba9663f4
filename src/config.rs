use std::fs;
use std::path::Path;

use crate::error::{DocPipeError, Result};

pub mod processors;
pub mod server;
pub mod worker;

pub use processors::{ProcessingConfig, ProcessorConfig};

/// Load and validate the processor-set configuration from a YAML file.
pub fn load_processing_config<P: AsRef<Path>>(config_path: P) -> Result<ProcessingConfig> {
    let path_ref = config_path.as_ref();
    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        DocPipeError::ConfigError(format!(
            "Failed to read processing config file '{}': {}",
            path_ref.display(),
            e
        ))
    })?;

    let config: ProcessingConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        DocPipeError::ConfigError(format!(
            "Failed to parse processing config YAML from '{}': {}",
            path_ref.display(),
            e
        ))
    })?;

    config.validate()?;

    Ok(config)
}
