use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scan::DocumentId;

/// Current on-disk schema version
pub const STATE_VERSION: u32 = 1;

/// Migration stage of a channel or document.
///
/// The declaration order is the total order statuses advance along; the
/// store refuses any move backwards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "camelCase")]
pub enum MigrationStatus {
    #[default]
    Pending,
    SpaceCreated,
    PageCreated,
    MediaUploaded,
    LinksResolved,
    Complete,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::SpaceCreated => "space created",
            Self::PageCreated => "page created",
            Self::MediaUploaded => "media uploaded",
            Self::LinksResolved => "links resolved",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Last failed attempt at advancing a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    /// Status the record was trying to reach
    pub stage: MigrationStatus,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Progress of one channel / space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    #[serde(default)]
    pub status: MigrationStatus,
    #[serde(default)]
    pub remote_space_id: Option<String>,
    /// Space key, reserved before the space is created so it never changes
    #[serde(default)]
    pub space_key: Option<String>,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub home_page_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for ChannelRecord {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            status: MigrationStatus::Pending,
            remote_space_id: None,
            space_key: None,
            remote_url: None,
            home_page_id: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl ChannelRecord {
    pub fn is_at_least(&self, status: MigrationStatus) -> bool {
        self.status >= status
    }

    /// Move forward to `status` and clear any recorded failure
    pub fn advance(&mut self, status: MigrationStatus) {
        if status > self.status {
            self.status = status;
        }
        self.failure = None;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, stage: MigrationStatus, reason: impl Into<String>) {
        let now = Utc::now();
        self.failure = Some(Failure {
            stage,
            reason: reason.into(),
            at: now,
        });
        self.updated_at = now;
    }
}

/// Why a reference was left as plain text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnresolvedReason {
    /// Target is not part of the migration (excluded channel, missing file)
    OutOfScope,
    /// Target is known but has no page
    NotMigrated,
    /// Target's own migration failed
    Failed,
}

/// A reference that could not be pointed at a remote page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedRef {
    pub target: String,
    pub text: String,
    pub reason: UnresolvedReason,
}

/// Progress of one document / page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    #[serde(default)]
    pub status: MigrationStatus,
    #[serde(default)]
    pub remote_page_id: Option<String>,
    #[serde(default)]
    pub remote_url: Option<String>,
    /// Title after de-duplication, fixed once assigned
    #[serde(default)]
    pub assigned_title: Option<String>,
    /// Local media id -> remote media reference; an entry means "uploaded"
    #[serde(default)]
    pub media_map: BTreeMap<String, String>,
    #[serde(default)]
    pub unresolved_refs: Vec<UnresolvedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for DocumentRecord {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            status: MigrationStatus::Pending,
            remote_page_id: None,
            remote_url: None,
            assigned_title: None,
            media_map: BTreeMap::new(),
            unresolved_refs: Vec::new(),
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl DocumentRecord {
    pub fn is_at_least(&self, status: MigrationStatus) -> bool {
        self.status >= status
    }

    /// Remote page id, once the page exists
    pub fn page_id(&self) -> Option<&str> {
        if self.is_at_least(MigrationStatus::PageCreated) {
            self.remote_page_id.as_deref()
        } else {
            None
        }
    }

    /// Move forward to `status` and clear any recorded failure
    pub fn advance(&mut self, status: MigrationStatus) {
        if status > self.status {
            self.status = status;
        }
        self.failure = None;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, stage: MigrationStatus, reason: impl Into<String>) {
        let now = Utc::now();
        self.failure = Some(Failure {
            stage,
            reason: reason.into(),
            at: now,
        });
        self.updated_at = now;
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Remember an uploaded media file
    pub fn record_media(&mut self, media_id: impl Into<String>, reference: impl Into<String>) {
        self.media_map.insert(media_id.into(), reference.into());
        self.updated_at = Utc::now();
    }
}

/// Everything the progress file holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelRecord>,
    #[serde(default)]
    pub documents: BTreeMap<DocumentId, DocumentRecord>,
}

fn default_version() -> u32 {
    STATE_VERSION
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            channels: BTreeMap::new(),
            documents: BTreeMap::new(),
        }
    }
}

/// Counts per status, for reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub channels: BTreeMap<MigrationStatus, usize>,
    pub documents: BTreeMap<MigrationStatus, usize>,
    pub failed_channels: Vec<String>,
    pub failed_documents: Vec<String>,
    pub unresolved_refs: usize,
}

impl ProgressSummary {
    pub fn from_state(state: &ProgressState) -> Self {
        let mut summary = Self::default();
        for (name, record) in &state.channels {
            *summary.channels.entry(record.status).or_default() += 1;
            if record.failure.is_some() {
                summary.failed_channels.push(name.clone());
            }
        }
        for (id, record) in &state.documents {
            *summary.documents.entry(record.status).or_default() += 1;
            if record.is_failed() {
                summary.failed_documents.push(id.to_string());
            }
            summary.unresolved_refs += record.unresolved_refs.len();
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_order() {
        assert!(MigrationStatus::Pending < MigrationStatus::SpaceCreated);
        assert!(MigrationStatus::PageCreated < MigrationStatus::MediaUploaded);
        assert!(MigrationStatus::LinksResolved < MigrationStatus::Complete);
    }

    #[test]
    fn test_advance_never_regresses() {
        let mut record = DocumentRecord::default();
        record.advance(MigrationStatus::MediaUploaded);
        record.advance(MigrationStatus::PageCreated);
        assert_eq!(record.status, MigrationStatus::MediaUploaded);
    }

    #[test]
    fn test_failure_keeps_checkpoint() {
        let mut record = DocumentRecord::default();
        record.advance(MigrationStatus::PageCreated);
        record.fail(MigrationStatus::MediaUploaded, "timeout");

        assert_eq!(record.status, MigrationStatus::PageCreated);
        assert!(record.is_failed());

        record.advance(MigrationStatus::MediaUploaded);
        assert!(!record.is_failed());
    }

    #[test]
    fn test_state_reads_partial_documents() {
        let json = r#"{
            "channels": { "Eng": { "status": "spaceCreated", "remoteSpaceId": "42" } },
            "documents": { "Eng/Eng/A.md": { "status": "pageCreated", "remotePageId": "7", "futureField": true } }
        }"#;
        let state: ProgressState = serde_json::from_str(json).unwrap();

        assert_eq!(state.version, STATE_VERSION);
        let doc = &state.documents[&DocumentId::from("Eng/Eng/A.md")];
        assert_eq!(doc.page_id(), Some("7"));
        assert!(doc.media_map.is_empty());
    }
}
