//! Fetch command: inspect staged inputs and outputs

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing::{debug, info};

use kiln_agents::blob::read_bytes;
use kiln_agents::{interrupt_token, BlobStore, LocalBlobStore};
use kiln_core::convert::{render, render_map};
use kiln_core::{Blob, Literal, LiteralMap};

use super::current_config;
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Read a staged literal map (or single literal) and print it
#[derive(Debug, Args)]
pub struct FetchCommand {
    /// Staged file, e.g. <prefix>/output/outputs.pb
    pub path: String,

    /// Copy the referenced blob to this local path
    #[arg(long)]
    pub download: Option<PathBuf>,

    /// Value to download when several are blobs
    #[arg(long)]
    pub name: Option<String>,
}

/// Contents of a staged file
#[derive(Debug, PartialEq)]
enum Staged {
    Map(LiteralMap),
    Single(Literal),
}

impl Staged {
    fn to_json(&self) -> serde_json::Value {
        match self {
            Staged::Map(map) => render_map(map),
            Staged::Single(literal) => render(literal),
        }
    }
}

impl FetchCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let config = current_config()?;
        let store = LocalBlobStore::new(
            config.staging.resolved_root(),
            config.staging.resolved_scratch(),
        );

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli, &store))
    }

    async fn execute_async(&self, cli: &Cli, store: &dyn BlobStore) -> anyhow::Result<()> {
        info!(path = %self.path, "fetching staged file");
        let cancel = interrupt_token();

        let staged = tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("Fetch of {} interrupted", self.path),
            staged = read_staged(store, &self.path) => staged?,
        };

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&staged.to_json())?);
        } else if !cli.quiet {
            print_text(&self.path, &staged, cli.verbose);
        }

        let Some(dest) = &self.download else {
            return Ok(());
        };

        let (name, blob) = select_blob(&staged, self.name.as_deref())?;
        debug!(name, uri = %blob.uri, dest = %dest.display(), "downloading blob");
        tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("Download of {} interrupted", blob.uri),
            result = store.get(&blob.uri, dest) => result
                .with_context(|| format!("Failed to download {}", blob.uri))?,
        }

        if !cli.quiet && cli.format == OutputFormat::Text {
            output::success(&format!(
                "Downloaded {} to {}",
                name,
                output::path_style().apply_to(dest.display())
            ));
        }
        Ok(())
    }
}

async fn read_staged(store: &dyn BlobStore, path: &str) -> anyhow::Result<Staged> {
    let bytes = read_bytes(store, path)
        .await
        .with_context(|| format!("Failed to read {}", path))?;

    if let Ok(map) = serde_json::from_slice::<LiteralMap>(&bytes) {
        return Ok(Staged::Map(map));
    }
    let literal = serde_json::from_slice::<Literal>(&bytes)
        .with_context(|| format!("{} is neither a literal map nor a literal", path))?;
    Ok(Staged::Single(literal))
}

/// Pick the blob to download: the named value, or the only blob present
fn select_blob<'a>(staged: &'a Staged, name: Option<&'a str>) -> anyhow::Result<(&'a str, &'a Blob)> {
    let candidates: Vec<(&str, &Blob)> = match staged {
        Staged::Single(literal) => literal.as_blob().map(|b| ("value", b)).into_iter().collect(),
        Staged::Map(map) => map
            .iter()
            .filter_map(|(k, v)| v.as_blob().map(|b| (k.as_str(), b)))
            .collect(),
    };

    if let Some(name) = name {
        return candidates
            .into_iter()
            .find(|(k, _)| *k == name)
            .ok_or_else(|| anyhow::anyhow!("No blob named '{}' in staged values", name));
    }

    match candidates.as_slice() {
        [] => anyhow::bail!("Staged values contain no blob to download"),
        [only] => Ok(*only),
        many => {
            let names: Vec<&str> = many.iter().map(|(k, _)| *k).collect();
            anyhow::bail!(
                "Several blobs staged ({}); pick one with --name",
                names.join(", ")
            )
        }
    }
}

fn print_text(path: &str, staged: &Staged, verbose: bool) {
    println!("{}", output::header(&format!("Staged values at {}", path)));
    match staged {
        Staged::Map(map) if map.is_empty() => println!("  (empty)"),
        Staged::Map(map) => {
            for (name, literal) in map {
                println!("{}", output::key_value(name, &render(literal).to_string()));
                if verbose {
                    if let Some(hash) = &literal.hash {
                        println!("      hash: {}", hash);
                    }
                }
            }
        }
        Staged::Single(literal) => println!("  {}", render(literal)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_agents::blob::write_literal_map;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> LocalBlobStore {
        LocalBlobStore::new(temp.path().join("remote"), temp.path().join("scratch"))
    }

    #[tokio::test]
    async fn test_read_staged_map() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let remote = format!("{}/output/outputs.pb", store.random_remote_directory());
        let outputs = LiteralMap::new().with("o0", 7i64);
        write_literal_map(&store, &outputs, &remote).await.unwrap();

        let staged = read_staged(&store, &remote).await.unwrap();
        assert_eq!(staged, Staged::Map(outputs));
        assert_eq!(staged.to_json(), serde_json::json!({"o0": 7}));
    }

    #[tokio::test]
    async fn test_read_staged_single_literal() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let local = temp.path().join("one.pb");
        let literal = Literal::blob("file:///data/a.csv", "csv");
        std::fs::write(&local, serde_json::to_vec(&literal).unwrap()).unwrap();

        let staged = read_staged(&store, &local.to_string_lossy()).await.unwrap();
        assert_eq!(staged, Staged::Single(literal));
    }

    #[test]
    fn test_select_blob() {
        let single = Staged::Map(
            LiteralMap::new()
                .with("count", 3i64)
                .with("report", Literal::blob("/data/r.csv", "csv")),
        );
        let (name, blob) = select_blob(&single, None).unwrap();
        assert_eq!(name, "report");
        assert_eq!(blob.uri, "/data/r.csv");

        let several = Staged::Map(
            LiteralMap::new()
                .with("a", Literal::blob("/data/a", ""))
                .with("b", Literal::blob("/data/b", "")),
        );
        assert!(select_blob(&several, None).is_err());
        assert_eq!(select_blob(&several, Some("b")).unwrap().1.uri, "/data/b");

        let none = Staged::Map(LiteralMap::new().with("x", 1i64));
        assert!(select_blob(&none, None).is_err());
    }
}
