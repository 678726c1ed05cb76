//! Default configuration values

use std::path::{Path, PathBuf};

use super::types::Config;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "kiln.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "kiln.yaml";

/// Default delay between remote status polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Directory under the home directory holding Kiln state
pub const STATE_DIR: &str = ".kiln";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".kiln.toml",
        ".kiln.yaml",
    ]
}

/// Root of Kiln's per-user state, falling back to the working directory
pub fn state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(STATE_DIR))
        .unwrap_or_else(|| PathBuf::from(STATE_DIR))
}

/// Default location of the local task cache
pub fn default_cache_dir() -> PathBuf {
    state_dir().join("local-cache")
}

/// Default root of the staging store
pub fn default_staging_root() -> PathBuf {
    state_dir().join("staging")
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Generate default configuration TOML
pub fn default_config_toml() -> String {
    toml::to_string_pretty(&Config::default()).unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Kiln Configuration

[cache]
enabled = true
# dir = "~/.kiln/local-cache"

[agent]
poll_interval_ms = 1000
show_progress = true

[staging]
# root = "~/.kiln/staging"
"#;
