use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use wikimigrate_lib::migrate::{MediaRequest, Migrator};
use wikimigrate_lib::remote::RemoteClient;
use wikimigrate_lib::render::StorageFormatRenderer;

use crate::app::{connect, App};
use crate::commands::migrate::print_report;
use crate::commands::page::source_file;
use crate::OutputFormat;

/// Upload a document's media folder to an existing page and fix its links
pub fn migrate(
    app: &App,
    path: PathBuf,
    page_id: String,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let request = MediaRequest {
        path: source_file(app, path)?,
        page_id,
    };
    let client = connect()?;
    let graph = app.empty_graph();

    let report = Migrator::new(&client, &app.store, &graph, &StorageFormatRenderer)
        .migrate_media(&request)
        .with_context(|| format!("Failed to migrate media of {}", request.path.display()))?;

    print_report(&report, format, use_color)?;

    if report.has_failures() {
        bail!("Failed to migrate media of {} to page {}", request.path.display(), request.page_id);
    }
    Ok(())
}

pub fn run(page_id: &str, path: &Path, format: &OutputFormat) -> Result<()> {
    if !path.is_file() {
        bail!("{} is not a file", path.display());
    }

    let client = connect()?;
    let media = client
        .upload_media(page_id, path)
        .with_context(|| format!("Failed to upload {} to page {}", path.display(), page_id))?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "pageId": page_id,
                "fileName": media.file_name,
                "url": media.url,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("Uploaded {} to page {}", media.file_name, page_id);
            println!("  {}", media.url);
        }
    }

    Ok(())
}
