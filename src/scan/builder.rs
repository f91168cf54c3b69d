//! Walks an export directory and builds the [`SourceGraph`].

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use super::document::{extract_links, is_markdown, parse_metadata, resolve_target};
use super::models::{Channel, Document, DocumentId, MediaRef, OutboundRef, SourceGraph, Visibility};
use crate::progress::STATE_FILE_NAME;

/// Prefix of the per-document attachment folder ("Media_<stem>")
pub const MEDIA_DIR_PREFIX: &str = "Media_";

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Source directory not found: {0}")]
    RootMissing(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("{0} is not inside the source directory")]
    OutsideRoot(PathBuf),
}

type Result<T> = std::result::Result<T, ScanError>;

/// Channel selection for a scan
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Channels whose spaces are created as private (exact name match)
    pub private_channels: HashSet<String>,
    /// Channels left out of the migration entirely
    pub excluded_channels: HashSet<String>,
}

/// Scan `root` into channels and documents.
///
/// Every immediate subdirectory is a channel. Unreadable or non-UTF-8
/// markdown files are skipped with a warning.
pub fn scan_source(root: &Path, options: &ScanOptions) -> Result<SourceGraph> {
    if !root.is_dir() {
        return Err(ScanError::RootMissing(root.to_path_buf()));
    }

    let entries = fs::read_dir(root).map_err(|source| ScanError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let mut channel_dirs = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|source| ScanError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || name == STATE_FILE_NAME || !entry.path().is_dir() {
            continue;
        }
        channel_dirs.insert(name);
    }

    let mut channels = Vec::new();
    for name in channel_dirs {
        if options.excluded_channels.contains(&name) {
            log::info!("Excluding channel '{}'", name);
            continue;
        }

        let visibility = if options.private_channels.contains(&name) {
            Visibility::Private
        } else {
            Visibility::Public
        };

        let channel = scan_channel(root, &name, visibility)?;
        if channel.home.is_none() && channel.documents.is_empty() {
            log::warn!("Skipping channel '{}': no markdown documents found", name);
            continue;
        }

        log::debug!(
            "Channel '{}' ({:?}): {} page(s), home page: {}",
            name,
            visibility,
            channel.documents.len(),
            channel.home.is_some()
        );
        channels.push(channel);
    }

    let graph = SourceGraph::new(root.to_path_buf(), channels);
    log::info!(
        "Scanned {} channel(s), {} document(s) from {}",
        graph.channels.len(),
        graph.document_count(),
        root.display()
    );
    Ok(graph)
}

fn scan_channel(root: &Path, name: &str, visibility: Visibility) -> Result<Channel> {
    let channel_dir = root.join(name);
    let home_path = channel_dir.join(format!("{}.md", name));

    let home = if home_path.is_file() {
        load_document_inner(root, &home_path, true)?
    } else {
        log::debug!("Channel '{}' has no root document", name);
        None
    };

    let mut documents = Vec::new();
    let walker = WalkDir::new(&channel_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let file_name = e.file_name().to_string_lossy();
            e.depth() == 0
                || !(file_name.starts_with('.')
                    || (e.file_type().is_dir() && file_name.starts_with(MEDIA_DIR_PREFIX)))
        });

    for entry in walker {
        let entry = entry.map_err(|source| ScanError::Walk {
            path: channel_dir.clone(),
            source,
        })?;
        let path = entry.path();

        if !entry.file_type().is_file() || !is_markdown(path) || path == home_path {
            continue;
        }

        if let Some(doc) = load_document_inner(root, path, false)? {
            documents.push(doc);
        }
    }

    documents.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(Channel {
        name: name.to_string(),
        visibility,
        home,
        documents,
    })
}

/// Load a single document, e.g. for a one-off page migration.
///
/// Fails if the file is outside `root` or unreadable.
pub fn load_document(root: &Path, path: &Path) -> Result<Document> {
    let bytes = fs::read(path).map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8(bytes).map_err(|e| ScanError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    build_document(root, path, &content, false)
}

fn load_document_inner(root: &Path, path: &Path, is_home: bool) -> Result<Option<Document>> {
    let content = match fs::read(path) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(_) => {
                log::warn!("Skipping {}: not valid UTF-8", path.display());
                return Ok(None);
            }
        },
        Err(e) => {
            log::warn!("Skipping {}: {}", path.display(), e);
            return Ok(None);
        }
    };

    build_document(root, path, &content, is_home).map(Some)
}

fn build_document(root: &Path, path: &Path, content: &str, is_home: bool) -> Result<Document> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| ScanError::OutsideRoot(path.to_path_buf()))?;
    let id = DocumentId::from_relative(relative);
    let channel = id.channel().to_string();
    let relative_dir = relative.parent().map(Path::to_path_buf).unwrap_or_default();

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let (metadata, body) = parse_metadata(content);
    let title = metadata.title.unwrap_or_else(|| stem.clone());

    let mut references = Vec::new();
    let mut media = collect_media_folder(root, path, &stem)?;
    let mut seen_media: HashSet<String> = media.iter().map(|m| m.id.clone()).collect();

    for link in extract_links(body) {
        let Some(resolved) = resolve_target(&relative_dir, &link.target) else {
            continue;
        };

        if link.is_image {
            let absolute = root.join(&resolved);
            let media_id = DocumentId::from_relative(&resolved).to_string();
            if seen_media.contains(&media_id) {
                continue;
            }
            if absolute.is_file() {
                seen_media.insert(media_id.clone());
                media.push(MediaRef {
                    id: media_id,
                    file_name: file_name_of(&absolute),
                    path: absolute,
                });
            } else {
                log::warn!(
                    "{}: image '{}' not found at {}",
                    id,
                    link.target,
                    absolute.display()
                );
            }
        } else if is_markdown(&resolved) {
            references.push(OutboundRef {
                text: link.text,
                raw_target: link.target,
                target: DocumentId::from_relative(&resolved),
            });
        }
    }

    Ok(Document {
        parent: if is_home { None } else { find_parent(root, path, &channel) },
        id,
        path: path.to_path_buf(),
        channel,
        title,
        body: body.to_string(),
        is_home,
        references,
        media,
    })
}

/// Files of the `Media_<stem>` folder next to the document
fn collect_media_folder(root: &Path, doc_path: &Path, stem: &str) -> Result<Vec<MediaRef>> {
    let Some(dir) = doc_path.parent() else {
        return Ok(Vec::new());
    };
    let media_dir = dir.join(format!("{}{}", MEDIA_DIR_PREFIX, stem));
    if !media_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut media = Vec::new();
    for entry in WalkDir::new(&media_dir).sort_by_file_name() {
        let entry = entry.map_err(|source| ScanError::Walk {
            path: media_dir.clone(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|_| ScanError::OutsideRoot(path.to_path_buf()))?;
        media.push(MediaRef {
            id: DocumentId::from_relative(relative).to_string(),
            file_name: file_name_of(path),
            path: path.to_path_buf(),
        });
    }

    log::debug!("Found {} media file(s) in {}", media.len(), media_dir.display());
    Ok(media)
}

/// A page in folder `X/` is a child of `X.md` next to that folder. Pages of
/// the channel folder itself hang off the space root.
fn find_parent(root: &Path, doc_path: &Path, channel: &str) -> Option<DocumentId> {
    let dir = doc_path.parent()?;
    let dir_name = dir.file_name()?.to_string_lossy().to_string();
    let grandparent = dir.parent()?;

    if grandparent == root.join(channel) && dir_name == channel {
        return None;
    }
    if grandparent == root {
        return None;
    }

    let candidate = grandparent.join(format!("{}.md", dir_name));
    if !candidate.is_file() {
        return None;
    }
    candidate
        .strip_prefix(root)
        .ok()
        .map(DocumentId::from_relative)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "Eng/Eng.md", "Welcome to engineering");
        write(
            root,
            "Eng/Eng/Overview.md",
            "\ntitle: Overview\ncreated at: today\n---\n\nSee [Setup](Guides/Setup.md) and [ops](/Ops/Ops/Runbook.md).\n![arch](Media_Overview/arch.png)",
        );
        write(root, "Eng/Eng/Media_Overview/arch.png", "png");
        write(root, "Eng/Eng/Media_Overview/extra.pdf", "pdf");
        write(root, "Eng/Eng/Guides.md", "Guides index");
        write(root, "Eng/Eng/Guides/Setup.md", "Back to [overview](../Overview.md)");
        write(root, "Ops/Ops.md", "Ops home");
        write(root, "Ops/Ops/Runbook.md", "Runbook");
        write(root, "Empty/readme.txt", "nothing");
        write(root, STATE_FILE_NAME, "{}");
        dir
    }

    #[test]
    fn test_scan_missing_root() {
        let result = scan_source(Path::new("/definitely/not/here"), &ScanOptions::default());
        assert!(matches!(result, Err(ScanError::RootMissing(_))));
    }

    #[test]
    fn test_scan_builds_channels_in_order() {
        let dir = sample_tree();
        let graph = scan_source(dir.path(), &ScanOptions::default()).unwrap();

        let names: Vec<&str> = graph.channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Eng", "Ops"]);

        let eng = graph.channel("Eng").unwrap();
        assert!(eng.home.as_ref().unwrap().is_home);
        let ids: Vec<&str> = eng.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["Eng/Eng/Guides.md", "Eng/Eng/Guides/Setup.md", "Eng/Eng/Overview.md"]
        );
    }

    #[test]
    fn test_scan_extracts_references_media_and_parents() {
        let dir = sample_tree();
        let graph = scan_source(dir.path(), &ScanOptions::default()).unwrap();

        let overview = graph.document(&DocumentId::from("Eng/Eng/Overview.md")).unwrap();
        assert_eq!(overview.title, "Overview");
        assert!(overview.body.starts_with("See [Setup]"));
        assert_eq!(overview.parent, None);

        let targets: Vec<&str> = overview.references.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["Eng/Eng/Guides/Setup.md", "Ops/Ops/Runbook.md"]);

        let media: Vec<&str> = overview.media.iter().map(|m| m.file_name.as_str()).collect();
        assert_eq!(media, vec!["arch.png", "extra.pdf"]);

        let setup = graph.document(&DocumentId::from("Eng/Eng/Guides/Setup.md")).unwrap();
        assert_eq!(setup.parent, Some(DocumentId::from("Eng/Eng/Guides.md")));
        assert_eq!(setup.references[0].target.as_str(), "Eng/Eng/Overview.md");
    }

    #[test]
    fn test_scan_applies_channel_options() {
        let dir = sample_tree();
        let options = ScanOptions {
            private_channels: ["Eng".to_string()].into_iter().collect(),
            excluded_channels: ["Ops".to_string()].into_iter().collect(),
        };
        let graph = scan_source(dir.path(), &options).unwrap();

        assert_eq!(graph.channels.len(), 1);
        assert_eq!(graph.channels[0].visibility, Visibility::Private);
        assert!(!graph.contains(&DocumentId::from("Ops/Ops/Runbook.md")));
    }

    #[test]
    fn test_scan_skips_invalid_utf8() {
        let dir = sample_tree();
        fs::write(dir.path().join("Eng/Eng/Broken.md"), [0xff, 0xfe, 0x00]).unwrap();

        let graph = scan_source(dir.path(), &ScanOptions::default()).unwrap();
        assert!(!graph.contains(&DocumentId::from("Eng/Eng/Broken.md")));
    }
}
