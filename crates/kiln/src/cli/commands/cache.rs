//! Cache management command

use std::time::Duration;

use clap::{Args, Subcommand};
use console::style;
use tracing::info;

use kiln_core::convert::infer;
use kiln_core::{Literal, LiteralMap, LiteralValue};
use kiln_tasks::{fingerprint, TaskCache};

use super::current_config;
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Local task cache management
#[derive(Debug, Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show cache statistics
    Status(CacheStatusCommand),
    /// Remove old cache entries
    Prune(CachePruneCommand),
    /// Clear all cached entries
    Clean(CacheCleanCommand),
    /// Print the cache key for a task invocation
    Key(CacheKeyCommand),
}

/// Show cache statistics
#[derive(Debug, Args)]
pub struct CacheStatusCommand;

/// Prune old cache entries
#[derive(Debug, Args)]
pub struct CachePruneCommand {
    /// Maximum age in days
    #[arg(long, default_value = "7")]
    pub max_age_days: u64,
}

/// Clear all cached entries
#[derive(Debug, Args)]
pub struct CacheCleanCommand {
    /// Skip confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Compute a cache key
#[derive(Debug, Args)]
pub struct CacheKeyCommand {
    /// Task name
    #[arg(long)]
    pub task: String,

    /// Cache version of the task
    #[arg(long = "version", default_value = "")]
    pub cache_version: String,

    /// Inputs as a JSON object
    #[arg(long, default_value = "{}")]
    pub inputs: String,
}

impl CacheCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let config = current_config()?;
        let cache = TaskCache::new(config.cache.resolved_dir());
        if !config.cache.enabled && !cli.quiet && cli.format == OutputFormat::Text {
            output::warning("Caching is disabled in config");
        }

        match &self.action {
            CacheAction::Status(cmd) => cmd.execute(cli, &cache),
            CacheAction::Prune(cmd) => cmd.execute(cli, &cache),
            CacheAction::Clean(cmd) => cmd.execute(cli, &cache),
            CacheAction::Key(cmd) => cmd.execute(cli, &cache),
        }
    }
}

impl CacheStatusCommand {
    fn execute(&self, cli: &Cli, cache: &TaskCache) -> anyhow::Result<()> {
        let stats = cache.status()?;

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "entries": stats.entries,
                "total_size": stats.total_size,
                "total_size_formatted": stats.formatted_size(),
                "cache_dir": cache.cache_dir().display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            println!("{}", output::header("Task Cache Status"));
            println!();
            println!(
                "{}",
                output::key_value(
                    "Location",
                    &output::path_style()
                        .apply_to(cache.cache_dir().display())
                        .to_string()
                )
            );
            println!("{}", output::key_value("Entries", &stats.entries.to_string()));
            println!(
                "{}",
                output::key_value("Size", &style(stats.formatted_size()).yellow().to_string())
            );
        }

        Ok(())
    }
}

impl CachePruneCommand {
    /// Day counts too large to represent mean no entry is old enough
    fn max_age(&self) -> Duration {
        self.max_age_days
            .checked_mul(24 * 60 * 60)
            .map(Duration::from_secs)
            .unwrap_or(Duration::MAX)
    }

    fn execute(&self, cli: &Cli, cache: &TaskCache) -> anyhow::Result<()> {
        let max_age = self.max_age();

        if !cli.quiet && cli.format == OutputFormat::Text {
            output::info(&format!(
                "Pruning cache entries older than {} days...",
                self.max_age_days
            ));
        }

        let stats = cache.prune(max_age)?;

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else if !cli.quiet {
            output::success(&format!(
                "Removed {} of {} entries ({} kept)",
                stats.removed, stats.total, stats.kept
            ));
        }

        Ok(())
    }
}

impl CacheCleanCommand {
    fn execute(&self, cli: &Cli, cache: &TaskCache) -> anyhow::Result<()> {
        let cache_dir = cache.cache_dir();

        if !self.yes {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!("Remove all cached entries at {}?", cache_dir.display()))
                .default(false)
                .interact()?;

            if !confirmed {
                println!("{}", style("Aborted.").yellow());
                return Ok(());
            }
        }

        let removed = cache.clear()?;
        info!(removed, "cache cleaned from cli");

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "removed": removed,
                "cache_dir": cache_dir.display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            output::success(&format!(
                "Removed {} entries at {}",
                removed,
                output::path_style().apply_to(cache_dir.display())
            ));
        }

        Ok(())
    }
}

impl CacheKeyCommand {
    fn execute(&self, cli: &Cli, cache: &TaskCache) -> anyhow::Result<()> {
        let inputs = parse_inputs(&self.inputs)?;
        let key = fingerprint(&self.task, &self.cache_version, &inputs);
        let cached = cache.contains(&key);

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "key": key.as_str(),
                "cached": cached,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if cli.quiet {
            println!("{}", key);
        } else {
            println!("{}", key);
            let state = if cached {
                style("cached").green()
            } else {
                style("not cached").dim()
            };
            println!("{}", output::key_value("Status", &state.to_string()));
        }

        Ok(())
    }
}

/// Parse a JSON object into literal inputs, inferring types from values
fn parse_inputs(json: &str) -> anyhow::Result<LiteralMap> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    match infer(&value) {
        Literal {
            value: LiteralValue::Map(map),
            ..
        } => Ok(map),
        _ => anyhow::bail!("--inputs must be a JSON object, got: {}", json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inputs_object() {
        let inputs = parse_inputs(r#"{"x": 3, "y": 4}"#).unwrap();
        assert_eq!(inputs.get("x").and_then(|l| l.as_integer()), Some(3));
        assert_eq!(inputs.len(), 2);
    }

    #[test]
    fn test_parse_inputs_rejects_non_objects() {
        assert!(parse_inputs("[1, 2]").is_err());
        assert!(parse_inputs("not json").is_err());
    }

    #[test]
    fn test_prune_max_age_saturates() {
        let week = CachePruneCommand { max_age_days: 7 };
        assert_eq!(week.max_age(), Duration::from_secs(7 * 86_400));

        let forever = CachePruneCommand {
            max_age_days: u64::MAX,
        };
        assert_eq!(forever.max_age(), Duration::MAX);
    }

    #[test]
    fn test_key_matches_library_fingerprint() {
        let inputs = parse_inputs(r#"{"y": 4, "x": 3}"#).unwrap();
        let expected = fingerprint(
            "add_numbers",
            "1",
            &LiteralMap::new().with("x", 3i64).with("y", 4i64),
        );
        assert_eq!(fingerprint("add_numbers", "1", &inputs), expected);
    }
}
