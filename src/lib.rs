//! Resumable migration of a Slite channel export into Confluence.
//!
//! - [`scan`] reads the export into a graph of channels and documents
//! - [`progress`] is the durable record of what has been migrated
//! - [`migrate`] drives spaces, pages, media and links through their statuses
//! - [`remote`] talks to Confluence
//! - [`render`] turns markdown into Confluence storage format

pub mod migrate;
pub mod progress;
pub mod remote;
pub mod render;
pub mod scan;
