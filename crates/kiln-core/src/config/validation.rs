//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_cache(config)?;
    validate_agent(config)?;
    validate_staging(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_cache(config: &Config) -> Result<()> {
    if config
        .cache
        .dir
        .as_ref()
        .is_some_and(|d| d.as_os_str().is_empty())
    {
        return Err(ConfigError::InvalidValue {
            field: "cache.dir".to_string(),
            message: "directory cannot be empty".to_string(),
        }
        .into());
    }

    Ok(())
}

fn validate_agent(config: &Config) -> Result<()> {
    if config.agent.poll_interval_ms == 0 {
        return Err(ConfigError::InvalidValue {
            field: "agent.poll_interval_ms".to_string(),
            message: "must be greater than zero".to_string(),
        }
        .into());
    }

    Ok(())
}

fn validate_staging(config: &Config) -> Result<()> {
    let paths = [
        ("staging.root", &config.staging.root),
        ("staging.local_scratch", &config.staging.local_scratch),
    ];
    for (field, path) in paths {
        if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                message: "path cannot be empty".to_string(),
            }
            .into());
        }
    }

    Ok(())
}
