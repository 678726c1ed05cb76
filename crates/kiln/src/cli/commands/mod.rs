//! CLI commands

mod cache;
mod fetch;

pub use cache::CacheCommand;
pub use fetch::FetchCommand;

use kiln_core::{load_config_or_default, Config};

/// Config for the current directory, falling back to defaults
pub(crate) fn current_config() -> anyhow::Result<Config> {
    let cwd = std::env::current_dir()?;
    let (config, path) = load_config_or_default(&cwd);
    if let Some(path) = path {
        tracing::debug!(path = %path.display(), "loaded config");
    }
    Ok(config)
}
