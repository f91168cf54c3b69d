//! The resumable migration engine.
//!
//! [`Migrator`] walks a [`SourceGraph`](crate::scan::SourceGraph) channel by
//! channel and document by document, checkpointing every remote side effect
//! in the [`ProgressStore`](crate::progress::ProgressStore) before moving on.
//! Running it again over the same source only does what is still missing.

mod links;
mod migrator;
mod titles;


use serde::Serialize;
use thiserror::Error;

use crate::progress::PersistError;
use crate::scan::ScanError;

pub use links::{LinkResolver, ResolvedTarget, Rewrite};
pub use migrator::{MediaRequest, Migrator, SinglePageRequest};
pub use titles::{derive_space_key, SpaceKeys, TitleRegistry};

/// Errors that stop a run. Remote failures never do; they are recorded on
/// the affected record and counted in the [`MigrationReport`].
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("{document} is already migrated to page {recorded}, not {requested}")]
    PageMismatch {
        document: String,
        recorded: String,
        requested: String,
    },
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub spaces_created: usize,
    pub spaces_reused: usize,
    pub home_pages_written: usize,
    pub pages_created: usize,
    /// Pages not created because their parent has no page
    pub pages_blocked: usize,
    pub media_uploaded: usize,
    pub pages_patched: usize,
    pub documents_completed: usize,
    pub channels_completed: usize,
    pub unresolved_refs: usize,
    pub failed: usize,
}

impl MigrationReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Whether this run sent anything to the remote
    pub fn is_noop(&self) -> bool {
        self.spaces_created == 0
            && self.home_pages_written == 0
            && self.pages_created == 0
            && self.media_uploaded == 0
            && self.pages_patched == 0
    }
}
