//! Rewriting of document links once every document has been attempted.
//!
//! Resolution runs in two passes. [`LinkResolver::collect`] reads every page
//! recorded in the progress store after pages were created; [`LinkResolver::rewrite`]
//! then turns a document's source body into the body its page should carry.
//! A target without a page by then will not get one in this run, so it is
//! left as plain text and recorded instead of holding the document back.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::progress::{DocumentRecord, ProgressStore, UnresolvedReason, UnresolvedRef};
use crate::scan::document::{is_markdown, link_regex, resolve_target};
use crate::scan::{Document, DocumentId};

/// Remote page a document identity maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub page_id: String,
    pub url: String,
}

/// Body of one document with its references classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub markdown: String,
    pub unresolved: Vec<UnresolvedRef>,
    /// Whether `markdown` differs from the source body
    pub changed: bool,
}

#[derive(Debug, Default, Clone)]
pub struct LinkResolver {
    targets: HashMap<DocumentId, ResolvedTarget>,
    /// Identities with a record, created or not
    known: HashSet<DocumentId>,
    /// Identities whose record carries a failure
    failed: HashSet<DocumentId>,
}

impl LinkResolver {
    /// Build the identity -> page map from every record with a page
    pub fn collect(store: &ProgressStore) -> Self {
        let mut resolver = Self::default();
        for (id, record) in store.snapshot().documents {
            if let (Some(page_id), Some(url)) = (record.page_id(), record.remote_url.as_ref()) {
                resolver.targets.insert(
                    id.clone(),
                    ResolvedTarget {
                        page_id: page_id.to_string(),
                        url: url.clone(),
                    },
                );
            }
            if record.is_failed() {
                resolver.failed.insert(id.clone());
            }
            resolver.known.insert(id);
        }
        log::debug!("Link resolver knows {} page(s)", resolver.targets.len());
        resolver
    }

    pub fn get(&self, id: &DocumentId) -> Option<&ResolvedTarget> {
        self.targets.get(id)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Rewrite `doc`'s body: page links point at remote pages, image links at
    /// uploaded media, and links to documents without a page become plain
    /// text `text (not migrated: <target>)`.
    ///
    /// `in_scope` tells whether a target belongs to the migration at all; it
    /// only decides the reason recorded for a target without a page.
    pub fn rewrite<F>(&self, doc: &Document, record: &DocumentRecord, in_scope: F) -> Rewrite
    where
        F: Fn(&DocumentId) -> bool,
    {
        let body = doc.body.as_str();
        let doc_dir = doc.relative_dir();

        let mut out = String::with_capacity(body.len());
        let mut unresolved = Vec::new();
        let mut last = 0;

        for caps in link_regex().captures_iter(body) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            out.push_str(&body[last..whole.start()]);
            last = whole.end();

            let is_image = !caps[1].is_empty();
            let text = &caps[2];
            let raw = &caps[3];

            if is_image {
                match media_reference(&doc_dir, raw, record) {
                    Some(url) => out.push_str(&format!("![{}]({})", text, url)),
                    None => out.push_str(whole.as_str()),
                }
                continue;
            }

            let Some(resolved) = resolve_target(&doc_dir, raw).filter(|p| is_markdown(p)) else {
                out.push_str(whole.as_str());
                continue;
            };
            let target = DocumentId::from_relative(&resolved);

            if let Some(page) = self.targets.get(&target) {
                out.push_str(&format!("[{}]({})", text, page.url));
                continue;
            }

            let reason = if self.failed.contains(&target) {
                UnresolvedReason::Failed
            } else if in_scope(&target) || self.known.contains(&target) {
                UnresolvedReason::NotMigrated
            } else {
                UnresolvedReason::OutOfScope
            };
            out.push_str(&format!("{} (not migrated: {})", text, target));
            unresolved.push(UnresolvedRef {
                target: target.to_string(),
                text: text.to_string(),
                reason,
            });
        }
        out.push_str(&body[last..]);

        let changed = out != body;
        Rewrite {
            markdown: out,
            unresolved,
            changed,
        }
    }
}

/// Remote reference of an uploaded image, by path or else by file name
fn media_reference<'r>(doc_dir: &Path, raw: &str, record: &'r DocumentRecord) -> Option<&'r str> {
    let resolved = resolve_target(doc_dir, raw)?;
    let media_id = DocumentId::from_relative(&resolved).to_string();
    if let Some(url) = record.media_map.get(&media_id) {
        return Some(url);
    }

    let file_name = resolved.file_name()?.to_string_lossy().to_string();
    record
        .media_map
        .iter()
        .find(|(id, _)| id.rsplit('/').next() == Some(file_name.as_str()))
        .map(|(_, url)| url.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MigrationStatus;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn document(id: &str, body: &str) -> Document {
        let id = DocumentId::from(id);
        Document {
            channel: id.channel().to_string(),
            path: PathBuf::from(id.as_str()),
            id,
            title: "Doc".to_string(),
            body: body.to_string(),
            parent: None,
            is_home: false,
            references: Vec::new(),
            media: Vec::new(),
        }
    }

    fn created(page_id: &str) -> DocumentRecord {
        let mut record = DocumentRecord::default();
        record.remote_page_id = Some(page_id.to_string());
        record.remote_url = Some(format!("https://wiki.test/pages/{}", page_id));
        record.advance(MigrationStatus::PageCreated);
        record
    }

    fn resolver_with(records: &[(&str, DocumentRecord)]) -> (TempDir, LinkResolver) {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::for_source(dir.path()).unwrap();
        for (id, record) in records {
            store.upsert_document(&DocumentId::from(*id), record.clone()).unwrap();
        }
        let resolver = LinkResolver::collect(&store);
        (dir, resolver)
    }

    #[test]
    fn test_created_targets_are_rewritten() {
        let (_dir, resolver) = resolver_with(&[("Eng/Eng/Setup.md", created("7"))]);
        let doc = document("Eng/Eng/Overview.md", "Read [the setup](Setup.md#install) first.");

        let rewrite = resolver.rewrite(&doc, &created("1"), |_| true);

        assert_eq!(
            rewrite,
            Rewrite {
                markdown: "Read [the setup](https://wiki.test/pages/7) first.".to_string(),
                unresolved: Vec::new(),
                changed: true,
            }
        );
    }

    #[test]
    fn test_in_scope_target_without_page_becomes_text() {
        let (_dir, resolver) = resolver_with(&[("Eng/Eng/Guide.md", created("7"))]);
        let doc = document("Eng/Eng/Overview.md", "[a](Setup.md) and [b](Guide.md)");

        let rewrite = resolver.rewrite(&doc, &created("1"), |_| true);

        assert_eq!(
            rewrite.markdown,
            "a (not migrated: Eng/Eng/Setup.md) and [b](https://wiki.test/pages/7)"
        );
        assert_eq!(rewrite.unresolved.len(), 1);
        assert_eq!(rewrite.unresolved[0].reason, UnresolvedReason::NotMigrated);
    }

    #[test]
    fn test_failed_target_is_recorded_as_failed() {
        let mut failed = DocumentRecord::default();
        failed.fail(MigrationStatus::PageCreated, "HTTP 500");
        let (_dir, resolver) = resolver_with(&[("Eng/Eng/Setup.md", failed)]);
        let doc = document("Eng/Eng/Overview.md", "[setup](Setup.md)");

        let rewrite = resolver.rewrite(&doc, &created("1"), |_| true);

        assert_eq!(rewrite.markdown, "setup (not migrated: Eng/Eng/Setup.md)");
        assert_eq!(rewrite.unresolved[0].reason, UnresolvedReason::Failed);
    }

    #[test]
    fn test_out_of_scope_target_becomes_text() {
        let (_dir, resolver) = resolver_with(&[]);
        let doc = document("Eng/Eng/Overview.md", "See [runbook](../../Ops/Ops/Runbook.md).");

        let rewrite = resolver.rewrite(&doc, &created("1"), |_| false);

        assert!(rewrite.changed);
        assert_eq!(rewrite.markdown, "See runbook (not migrated: Ops/Ops/Runbook.md).");
        assert_eq!(rewrite.unresolved.len(), 1);
        assert_eq!(rewrite.unresolved[0].reason, UnresolvedReason::OutOfScope);
    }

    #[test]
    fn test_known_but_uncreated_target_is_not_migrated() {
        let (_dir, resolver) = resolver_with(&[("Eng/Eng/Setup.md", DocumentRecord::default())]);
        let doc = document("Eng/Eng/Overview.md", "[setup](Setup.md)");

        let rewrite = resolver.rewrite(&doc, &created("1"), |_| false);
        assert_eq!(rewrite.unresolved[0].reason, UnresolvedReason::NotMigrated);
    }

    #[test]
    fn test_images_use_media_map() {
        let (_dir, resolver) = resolver_with(&[]);
        let mut record = created("1");
        record.record_media("Eng/Eng/Media_Overview/a.png", "https://wiki.test/att/a.png");
        record.record_media("Eng/Eng/Media_Overview/b.png", "https://wiki.test/att/b.png");
        let doc = document(
            "Eng/Eng/Overview.md",
            "![a](Media_Overview/a.png) ![b](elsewhere/b.png) ![c](c.png) [site](https://example.com)",
        );

        let rewrite = resolver.rewrite(&doc, &record, |_| true);
        assert_eq!(
            rewrite.markdown,
            "![a](https://wiki.test/att/a.png) ![b](https://wiki.test/att/b.png) ![c](c.png) [site](https://example.com)"
        );
    }

    #[test]
    fn test_body_without_links_is_unchanged() {
        let (_dir, resolver) = resolver_with(&[]);
        let doc = document("Eng/Eng/Overview.md", "Nothing to see.");

        assert!(!resolver.rewrite(&doc, &created("1"), |_| true).changed);
    }
}
