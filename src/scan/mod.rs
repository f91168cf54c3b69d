//! Source tree scanning
//!
//! Builds the in-memory document graph from a Slite channel export:
//! - One channel (future space) per top-level directory
//! - `<channel>/<channel>.md` as the space home page
//! - Nested pages with `Media_<page>` attachment folders
//! - Outbound references between documents

mod builder;
pub mod document;
mod models;

pub use builder::{load_document, scan_source, ScanError, ScanOptions, MEDIA_DIR_PREFIX};
pub use models::*;
