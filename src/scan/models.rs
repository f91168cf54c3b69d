use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Identity of a source document: its path relative to the source root,
/// always joined with `/` so the progress file is portable between machines.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Build an identity from a path relative to the source root
    pub fn from_relative(path: &Path) -> Self {
        let parts: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();
        Self(parts.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Channel segment of the identity ("Eng/Eng/Overview.md" -> "Eng")
    pub fn channel(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }

    /// Absolute location of the document under `root`
    pub fn to_path(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::from_relative(Path::new(value))
    }
}

/// Visibility of the space a channel becomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// A link in a document body pointing at another source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRef {
    /// Link text as written
    pub text: String,
    /// Link target exactly as it appears in the body
    pub raw_target: String,
    /// Document the link resolves to
    pub target: DocumentId,
}

/// A local file that gets uploaded as an attachment of the document's page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Path relative to the source root, `/`-joined; key of the record's media map
    pub id: String,
    /// Absolute path on disk
    pub path: PathBuf,
    pub file_name: String,
}

/// A single markdown source file
#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocumentId,
    pub path: PathBuf,
    pub channel: String,
    /// Raw title, before de-duplication
    pub title: String,
    /// Markdown with the metadata header stripped
    pub body: String,
    pub parent: Option<DocumentId>,
    /// The channel's root document, which becomes the space home page
    pub is_home: bool,
    pub references: Vec<OutboundRef>,
    pub media: Vec<MediaRef>,
}

impl Document {
    /// Directory of the document relative to the source root
    pub fn relative_dir(&self) -> PathBuf {
        Path::new(self.id.as_str())
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/// A top-level directory of the source tree; becomes a space
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    pub visibility: Visibility,
    pub home: Option<Document>,
    /// Pages sorted by identity, so parents always precede their children
    pub documents: Vec<Document>,
}

impl Channel {
    /// Home document first, then pages in order
    pub fn all_documents(&self) -> impl Iterator<Item = &Document> {
        self.home.iter().chain(self.documents.iter())
    }
}

/// Everything a run migrates, rebuilt from disk on each invocation
#[derive(Debug, Clone)]
pub struct SourceGraph {
    pub root: PathBuf,
    pub channels: Vec<Channel>,
    index: HashMap<DocumentId, (usize, Option<usize>)>,
}

impl SourceGraph {
    pub fn new(root: PathBuf, channels: Vec<Channel>) -> Self {
        let mut index = HashMap::new();
        for (c, channel) in channels.iter().enumerate() {
            if let Some(home) = &channel.home {
                index.insert(home.id.clone(), (c, None));
            }
            for (d, doc) in channel.documents.iter().enumerate() {
                index.insert(doc.id.clone(), (c, Some(d)));
            }
        }
        Self { root, channels, index }
    }

    /// Whether `id` is part of this migration
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.index.contains_key(id)
    }

    pub fn document(&self, id: &DocumentId) -> Option<&Document> {
        let (c, d) = *self.index.get(id)?;
        let channel = self.channels.get(c)?;
        match d {
            None => channel.home.as_ref(),
            Some(d) => channel.documents.get(d),
        }
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// All documents in migration order
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.channels.iter().flat_map(Channel::all_documents)
    }

    pub fn document_count(&self) -> usize {
        self.index.len()
    }
}
