use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use wikimigrate_lib::migrate::{Migrator, SinglePageRequest};
use wikimigrate_lib::render::StorageFormatRenderer;

use crate::app::{connect, App};
use crate::commands::migrate::print_report;
use crate::OutputFormat;

/// Build the request, resolving `path` against the export when relative
pub fn request(
    app: &App,
    path: PathBuf,
    title: String,
    space_id: String,
    space_key: String,
    parent_id: Option<String>,
) -> Result<SinglePageRequest> {
    Ok(SinglePageRequest {
        path: source_file(app, path)?,
        title,
        space_id,
        space_key,
        parent_id: parent_id.filter(|id| !id.trim().is_empty()),
    })
}

/// Canonical path of a file inside the export
pub fn source_file(app: &App, path: PathBuf) -> Result<PathBuf> {
    let candidate = if path.is_relative() && !path.exists() {
        app.source_dir.join(&path)
    } else {
        path
    };
    let path = fs::canonicalize(&candidate)
        .with_context(|| format!("Page file {} not found", candidate.display()))?;

    if !path.starts_with(&app.source_dir) {
        bail!(
            "{} is not inside the source directory {}",
            path.display(),
            app.source_dir.display()
        );
    }
    Ok(path)
}

pub fn run(app: &App, request: &SinglePageRequest, format: &OutputFormat, use_color: bool) -> Result<()> {
    let client = connect()?;
    let graph = app.empty_graph();

    let report = Migrator::new(&client, &app.store, &graph, &StorageFormatRenderer)
        .migrate_single_page(request)
        .with_context(|| format!("Failed to migrate {}", request.path.display()))?;

    print_report(&report, format, use_color)?;

    if report.has_failures() {
        bail!("Failed to upload page: {} to space {}", request.title, request.space_key);
    }
    Ok(())
}
