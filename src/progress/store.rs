use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use super::models::{
    ChannelRecord, DocumentRecord, ProgressState, ProgressSummary, STATE_VERSION,
};
use crate::scan::DocumentId;

/// File name of the progress state, kept at the root of the source tree
pub const STATE_FILE_NAME: &str = "migration_state.json";

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to write progress file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Progress file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialise progress state: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Refusing to record {identity}: {reason}")]
    Invariant { identity: String, reason: String },
}

type Result<T> = std::result::Result<T, PersistError>;

/// Durable record of what has already been migrated.
///
/// Every upsert writes the whole state to a temporary file and renames it
/// over the previous one before returning, so a successful upsert survives a
/// crash and an interrupted write never leaves a partial file behind.
pub struct ProgressStore {
    path: PathBuf,
    state: Mutex<ProgressState>,
}

impl ProgressStore {
    /// Load the store, starting empty when the file does not exist yet
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let state = if path.exists() {
            let data = fs::read_to_string(&path).map_err(|source| PersistError::Io {
                path: path.clone(),
                source,
            })?;
            let state: ProgressState =
                serde_json::from_str(&data).map_err(|source| PersistError::Malformed {
                    path: path.clone(),
                    source,
                })?;
            if state.version > STATE_VERSION {
                log::warn!(
                    "{} was written by a newer version (schema {}), reading what is known",
                    path.display(),
                    state.version
                );
            }
            log::debug!(
                "Loaded progress for {} channel(s), {} document(s) from {}",
                state.channels.len(),
                state.documents.len(),
                path.display()
            );
            state
        } else {
            log::debug!("No progress file at {}, starting fresh", path.display());
            ProgressState::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Load the store kept inside a source tree
    pub fn for_source(root: &Path) -> Result<Self> {
        Self::load(root.join(STATE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn state(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_channel(&self, name: &str) -> Option<ChannelRecord> {
        self.state().channels.get(name).cloned()
    }

    pub fn get_document(&self, id: &DocumentId) -> Option<DocumentRecord> {
        self.state().documents.get(id).cloned()
    }

    /// Copy of the full state
    pub fn snapshot(&self) -> ProgressState {
        self.state().clone()
    }

    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary::from_state(&self.state())
    }

    /// Record channel progress and persist it before returning
    pub fn upsert_channel(&self, name: &str, record: ChannelRecord) -> Result<()> {
        let mut state = self.state();

        if let Some(existing) = state.channels.get(name) {
            check_channel(existing, &record).map_err(|reason| PersistError::Invariant {
                identity: format!("channel '{}'", name),
                reason,
            })?;
        }

        let previous = state.channels.insert(name.to_string(), record);
        if let Err(e) = self.persist(&state) {
            match previous {
                Some(previous) => state.channels.insert(name.to_string(), previous),
                None => state.channels.remove(name),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Record document progress and persist it before returning
    pub fn upsert_document(&self, id: &DocumentId, record: DocumentRecord) -> Result<()> {
        let mut state = self.state();

        if let Some(existing) = state.documents.get(id) {
            check_document(existing, &record).map_err(|reason| PersistError::Invariant {
                identity: format!("document '{}'", id),
                reason,
            })?;
        }

        let previous = state.documents.insert(id.clone(), record);
        if let Err(e) = self.persist(&state) {
            match previous {
                Some(previous) => state.documents.insert(id.clone(), previous),
                None => state.documents.remove(id),
            };
            return Err(e);
        }
        Ok(())
    }

    fn persist(&self, state: &ProgressState) -> Result<()> {
        let io_err = |source| PersistError::Io {
            path: self.path.clone(),
            source,
        };

        let data = serde_json::to_vec_pretty(state).map_err(PersistError::Serialize)?;
        let tmp_path = self.path.with_extension("json.tmp");

        {
            let mut file = File::create(&tmp_path).map_err(io_err)?;
            file.write_all(&data).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;

        // Make the rename itself durable
        #[cfg(unix)]
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(dir).and_then(|dir| dir.sync_all()).map_err(io_err)?;
        }

        Ok(())
    }
}

fn check_set_once(field: &str, old: &Option<String>, new: &Option<String>) -> std::result::Result<(), String> {
    match (old, new) {
        (Some(old), Some(new)) if old != new => Err(format!(
            "{} is already '{}' and cannot change to '{}'",
            field, old, new
        )),
        (Some(old), None) => Err(format!("{} '{}' cannot be cleared", field, old)),
        _ => Ok(()),
    }
}

fn check_channel(old: &ChannelRecord, new: &ChannelRecord) -> std::result::Result<(), String> {
    if new.status < old.status {
        return Err(format!("status cannot go from {} back to {}", old.status, new.status));
    }
    check_set_once("remote space id", &old.remote_space_id, &new.remote_space_id)?;
    check_set_once("space key", &old.space_key, &new.space_key)
}

fn check_document(old: &DocumentRecord, new: &DocumentRecord) -> std::result::Result<(), String> {
    if new.status < old.status {
        return Err(format!("status cannot go from {} back to {}", old.status, new.status));
    }
    check_set_once("remote page id", &old.remote_page_id, &new.remote_page_id)?;
    check_set_once("assigned title", &old.assigned_title, &new.assigned_title)?;

    for (media, reference) in &old.media_map {
        if new.media_map.get(media) != Some(reference) {
            return Err(format!("uploaded media '{}' cannot be forgotten or remapped", media));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MigrationStatus;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::for_source(dir.path()).unwrap();

        assert!(store.snapshot().documents.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(STATE_FILE_NAME), "{ not json").unwrap();

        let result = ProgressStore::for_source(dir.path());
        assert!(matches!(result, Err(PersistError::Malformed { .. })));
    }

    #[test]
    fn test_upsert_is_visible_after_reload() {
        let dir = TempDir::new().unwrap();
        let id = DocumentId::from("Eng/Eng/A.md");
        {
            let store = ProgressStore::for_source(dir.path()).unwrap();
            let mut record = DocumentRecord::default();
            record.remote_page_id = Some("101".to_string());
            record.advance(MigrationStatus::PageCreated);
            store.upsert_document(&id, record).unwrap();
        }

        let reloaded = ProgressStore::for_source(dir.path()).unwrap();
        let record = reloaded.get_document(&id).unwrap();
        assert_eq!(record.page_id(), Some("101"));
        assert!(!dir.path().join("migration_state.json.tmp").exists());
    }

    #[test]
    fn test_upsert_rejects_status_regression() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::for_source(dir.path()).unwrap();
        let id = DocumentId::from("Eng/Eng/A.md");

        let mut record = DocumentRecord::default();
        record.advance(MigrationStatus::MediaUploaded);
        store.upsert_document(&id, record.clone()).unwrap();

        record.status = MigrationStatus::PageCreated;
        let result = store.upsert_document(&id, record);
        assert!(matches!(result, Err(PersistError::Invariant { .. })));
        assert_eq!(
            store.get_document(&id).unwrap().status,
            MigrationStatus::MediaUploaded
        );
    }

    #[test]
    fn test_upsert_rejects_changed_remote_id() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::for_source(dir.path()).unwrap();

        let mut record = ChannelRecord::default();
        record.remote_space_id = Some("1".to_string());
        store.upsert_channel("Eng", record.clone()).unwrap();

        record.remote_space_id = Some("2".to_string());
        assert!(store.upsert_channel("Eng", record).is_err());
    }

    #[test]
    fn test_upsert_rejects_forgotten_media() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::for_source(dir.path()).unwrap();
        let id = DocumentId::from("Eng/Eng/A.md");

        let mut record = DocumentRecord::default();
        record.media_map.insert("Eng/Eng/Media_A/a.png".into(), "https://x/a.png".into());
        store.upsert_document(&id, record.clone()).unwrap();

        record.media_map.clear();
        assert!(store.upsert_document(&id, record).is_err());
    }

    #[test]
    fn test_unwritable_medium_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::load(dir.path().join("missing").join(STATE_FILE_NAME)).unwrap();

        let result = store.upsert_channel("Eng", ChannelRecord::default());
        assert!(matches!(result, Err(PersistError::Io { .. })));
        assert!(store.get_channel("Eng").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_unsyncable_directory_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let state_dir = dir.path().join("state");
        fs::create_dir(&state_dir).unwrap();
        // Writable and searchable, but not readable: the rename works, opening the directory does not
        fs::set_permissions(&state_dir, fs::Permissions::from_mode(0o300)).unwrap();
        if File::open(&state_dir).is_ok() {
            // Privileged users ignore directory permissions
            fs::set_permissions(&state_dir, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let store = ProgressStore::load(state_dir.join(STATE_FILE_NAME)).unwrap();
        let result = store.upsert_channel("Eng", ChannelRecord::default());

        fs::set_permissions(&state_dir, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(result, Err(PersistError::Io { .. })));
        assert!(store.get_channel("Eng").is_none());
    }
}
