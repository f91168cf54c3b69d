use anyhow::Result;

use wikimigrate_lib::progress::MigrationStatus;

use crate::app::App;
use crate::render::terminal::{paint, status_color, Color};
use crate::OutputFormat;

const STATUSES: [MigrationStatus; 6] = [
    MigrationStatus::Pending,
    MigrationStatus::SpaceCreated,
    MigrationStatus::PageCreated,
    MigrationStatus::MediaUploaded,
    MigrationStatus::LinksResolved,
    MigrationStatus::Complete,
];

pub fn run(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let state = app.store.snapshot();
    let summary = app.store.summary();

    match format {
        OutputFormat::Json => {
            let failures: Vec<serde_json::Value> = state
                .documents
                .iter()
                .filter_map(|(id, record)| {
                    record.failure.as_ref().map(|f| {
                        serde_json::json!({
                            "document": id,
                            "stage": f.stage,
                            "reason": f.reason,
                            "at": f.at.to_rfc3339(),
                        })
                    })
                })
                .collect();
            let output = serde_json::json!({
                "stateFile": app.store.path().to_string_lossy(),
                "summary": summary,
                "failures": failures,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if state.channels.is_empty() && state.documents.is_empty() {
                println!("No migration progress in {}", app.store.path().display());
                return Ok(());
            }

            println!("{}", paint("Channels", Color::BOLD, use_color));
            for (name, record) in &state.channels {
                let status = paint(&record.status.to_string(), status_color(record.status), use_color);
                let key = record.space_key.as_deref().unwrap_or("-");
                println!("  {:<30} {:<10} {}", name, key, status);
                if let Some(failure) = &record.failure {
                    println!("    {}", paint(&failure.reason, Color::RED, use_color));
                }
            }

            println!("\n{}", paint("Documents", Color::BOLD, use_color));
            for status in STATUSES {
                let count = summary.documents.get(&status).copied().unwrap_or(0);
                if count > 0 {
                    println!("  {:<16} {}", paint(&status.to_string(), status_color(status), use_color), count);
                }
            }

            if summary.unresolved_refs > 0 {
                println!("\n{} reference(s) left as plain text", summary.unresolved_refs);
            }

            if !summary.failed_documents.is_empty() {
                println!("\n{}", paint("Failed", Color::RED, use_color));
                for (id, record) in &state.documents {
                    if let Some(failure) = &record.failure {
                        println!("  {} ({}): {}", id, failure.stage, failure.reason);
                    }
                }
            }
        }
    }

    Ok(())
}
