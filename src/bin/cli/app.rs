use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use wikimigrate_lib::progress::ProgressStore;
use wikimigrate_lib::remote::{ConfluenceClient, ConfluenceConfig};
use wikimigrate_lib::scan::{scan_source, ScanOptions, SourceGraph};

/// Shared state for CLI commands working on one export
pub struct App {
    pub source_dir: PathBuf,
    pub store: ProgressStore,
}

impl App {
    /// Open an export directory and its progress file
    pub fn open(source_dir: &Path) -> Result<Self> {
        if !source_dir.is_dir() {
            bail!("Source directory {} does not exist", source_dir.display());
        }
        let source_dir = fs::canonicalize(source_dir)
            .with_context(|| format!("Failed to resolve {}", source_dir.display()))?;

        let store = ProgressStore::for_source(&source_dir)
            .context("Failed to load migration progress")?;

        Ok(Self { source_dir, store })
    }

    /// Scan the export into a fresh graph
    pub fn scan(&self, options: &ScanOptions) -> Result<SourceGraph> {
        scan_source(&self.source_dir, options)
            .with_context(|| format!("Failed to scan {}", self.source_dir.display()))
    }

    /// Graph with no channels, for commands that work on single files
    pub fn empty_graph(&self) -> SourceGraph {
        SourceGraph::new(self.source_dir.clone(), Vec::new())
    }
}

/// Confluence client configured from the environment (and `.env`)
pub fn connect() -> Result<ConfluenceClient> {
    let config = ConfluenceConfig::from_env().context("Confluence is not configured")?;
    log::debug!("Using Confluence at {}", config.base_url);
    ConfluenceClient::new(config).context("Failed to create Confluence client")
}
