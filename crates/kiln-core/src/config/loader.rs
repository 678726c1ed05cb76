//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConfigError, CoreError, Result};

use super::defaults::config_file_names;
use super::types::Config;
use super::validation::validate_config;

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<Config> {
    let format = if path.extension().is_some_and(|e| e == "toml") {
        "TOML"
    } else {
        "YAML"
    };
    info!(path = %path.display(), format, "loading config");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let config: Config = if format == "TOML" {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    };

    validate_config(&config)?;
    debug!(path = %path.display(), "config loaded and validated");
    Ok(config)
}

/// Find configuration file in directory or parent directories.
///
/// The first match wins. Parents are walked until the filesystem root.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.exists() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load configuration from directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf)> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

/// Load configuration or use defaults
pub fn load_config_or_default(dir: &Path) -> (Config, Option<PathBuf>) {
    match load_config_from_dir(dir) {
        Ok((config, path)) => (config, Some(path)),
        Err(CoreError::Config(ConfigError::NotFound(_))) => {
            debug!(dir = %dir.display(), "no config file found, using defaults");
            (Config::default(), None)
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "no usable config, using defaults");
            (Config::default(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("kiln.toml");
        std::fs::write(&config_path, "[agent]\npoll_interval_ms = 250").unwrap();

        let found = find_config(temp.path());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_prefers_toml_over_yaml() {
        let temp = TempDir::new().unwrap();
        let toml_path = temp.path().join("kiln.toml");
        let yaml_path = temp.path().join("kiln.yaml");
        std::fs::write(&toml_path, "[agent]\npoll_interval_ms = 250").unwrap();
        std::fs::write(&yaml_path, "agent:\n  poll_interval_ms: 500").unwrap();

        let found = find_config(temp.path()).unwrap();
        assert_eq!(found, toml_path);
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        let config_path = temp.path().join(".kiln.yaml");
        std::fs::write(&config_path, "cache:\n  enabled: false").unwrap();

        assert_eq!(find_config(&nested), Some(config_path));
    }

    #[test]
    fn test_load_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("kiln.toml");
        std::fs::write(
            &config_path,
            "[cache]\nenabled = false\ndir = \"/tmp/kiln-cache\"\n\n[agent]\npoll_interval_ms = 250\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.resolved_dir(), PathBuf::from("/tmp/kiln-cache"));
        assert_eq!(config.agent.poll_interval().as_millis(), 250);
        assert!(config.agent.show_progress);
    }

    #[test]
    fn test_load_config_yaml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("kiln.yaml");
        std::fs::write(
            &config_path,
            "staging:\n  root: /srv/staging\nagent:\n  show_progress: false\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.staging.resolved_root(), PathBuf::from("/srv/staging"));
        assert!(!config.agent.show_progress);
    }

    #[test]
    fn test_load_invalid_config_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("kiln.toml"), "[agent]\npoll_interval_ms = 0\n").unwrap();

        let (config, path) = load_config_or_default(temp.path());
        assert!(path.is_none());
        assert_eq!(config.agent.poll_interval_ms, 1000);
    }
}
