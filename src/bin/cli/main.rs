mod app;
mod commands;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wikimigrate", about = "Migrate a Slite export into Confluence", version)]
struct Cli {
    /// Log level (RUST_LOG overrides it)
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Migrate every channel of an export (safe to rerun)
    Migrate {
        /// Root of the Slite export
        #[arg(long)]
        source_dir: PathBuf,
        /// Comma-separated channels to create as private spaces
        #[arg(long, value_delimiter = ',')]
        private_channels: Vec<String>,
        /// Comma-separated channels to leave out
        #[arg(long, value_delimiter = ',')]
        exclude_channels: Vec<String>,
    },

    /// Migrate a single file into an existing space
    MigratePage {
        /// Root of the Slite export (holds the progress file)
        #[arg(long)]
        source_dir: PathBuf,
        /// Page title
        #[arg(long)]
        title: String,
        /// Markdown file to migrate
        #[arg(long)]
        path: PathBuf,
        /// Target space id
        #[arg(long)]
        space_id: String,
        /// Target space key
        #[arg(long)]
        space_key: String,
        /// Parent page id
        #[arg(long)]
        parent_id: Option<String>,
    },

    /// Upload one file as an attachment of a page
    UploadMedia {
        /// Page to attach to
        #[arg(long)]
        page_id: String,
        /// File to upload
        #[arg(long)]
        path: PathBuf,
    },

    /// Upload a file's Media_<name> folder to an existing page and fix its links
    MigrateMedia {
        /// Root of the Slite export (holds the progress file)
        #[arg(long)]
        source_dir: PathBuf,
        /// Markdown file whose media to migrate
        #[arg(long)]
        path: PathBuf,
        /// Page the file was migrated to
        #[arg(long)]
        page_id: String,
    },

    /// Show migration progress without contacting Confluence
    Status {
        /// Root of the Slite export
        #[arg(long)]
        source_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.log_level.as_filter()),
    )
    .init();

    let use_color = !cli.no_color && std::io::stdout().is_terminal();

    match cli.command {
        Command::Migrate {
            source_dir,
            private_channels,
            exclude_channels,
        } => {
            let app = app::App::open(&source_dir)?;
            commands::migrate::run(&app, private_channels, exclude_channels, &cli.format, use_color)?;
        }
        Command::MigratePage {
            source_dir,
            title,
            path,
            space_id,
            space_key,
            parent_id,
        } => {
            let app = app::App::open(&source_dir)?;
            let request = commands::page::request(&app, path, title, space_id, space_key, parent_id)?;
            commands::page::run(&app, &request, &cli.format, use_color)?;
        }
        Command::UploadMedia { page_id, path } => {
            commands::media::run(&page_id, &path, &cli.format)?;
        }
        Command::MigrateMedia {
            source_dir,
            path,
            page_id,
        } => {
            let app = app::App::open(&source_dir)?;
            commands::media::migrate(&app, path, page_id, &cli.format, use_color)?;
        }
        Command::Status { source_dir } => {
            let app = app::App::open(&source_dir)?;
            commands::status::run(&app, &cli.format, use_color)?;
        }
    }

    Ok(())
}
