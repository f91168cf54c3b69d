use std::collections::HashSet;

use anyhow::{bail, Context, Result};

use wikimigrate_lib::migrate::{MigrationReport, Migrator};
use wikimigrate_lib::render::StorageFormatRenderer;
use wikimigrate_lib::scan::ScanOptions;

use crate::app::{connect, App};
use crate::render::terminal::render_report;
use crate::OutputFormat;

pub fn run(
    app: &App,
    private_channels: Vec<String>,
    exclude_channels: Vec<String>,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let options = ScanOptions {
        private_channels: channel_set(private_channels),
        excluded_channels: channel_set(exclude_channels),
    };
    let graph = app.scan(&options)?;
    let client = connect()?;

    let report = Migrator::new(&client, &app.store, &graph, &StorageFormatRenderer)
        .run()
        .context("Migration aborted")?;

    print_report(&report, format, use_color)?;

    if report.has_failures() {
        bail!(
            "{} item(s) failed, rerun the same command to retry them",
            report.failed
        );
    }
    Ok(())
}

pub fn print_report(report: &MigrationReport, format: &OutputFormat, use_color: bool) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Plain => println!("{}", render_report(report, use_color)),
    }
    Ok(())
}

fn channel_set(names: Vec<String>) -> HashSet<String> {
    names
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
