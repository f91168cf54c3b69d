//! Parsing of a single exported markdown file: metadata header, links and
//! link target resolution.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Key/value header Slite writes at the top of every export
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub fields: HashMap<String, String>,
}

/// A markdown link or image found in a body
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub is_image: bool,
    pub text: String,
    pub target: String,
}

/// Matches `[text](target)` and `![alt](target)`, with an optional quoted title
pub(crate) fn link_regex() -> &'static Regex {
    static LINK_RE: OnceLock<Regex> = OnceLock::new();
    LINK_RE.get_or_init(|| {
        Regex::new(r#"(!?)\[([^\]]*)\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)"#).unwrap()
    })
}

/// Split the metadata header from the body.
///
/// Accepts an optional opening `---` fence followed by `key: value` lines and
/// a closing `---`. Leading blank lines are ignored. Content without a closed
/// header is returned untouched.
pub fn parse_metadata(content: &str) -> (Metadata, &str) {
    let trimmed = content.trim_start_matches(['\n', '\r']);
    let mut metadata = Metadata::default();
    let mut offset = content.len() - trimmed.len();
    let mut opened = false;
    let mut saw_field = false;

    for line in trimmed.split_inclusive('\n') {
        let text = line.trim();
        offset += line.len();

        if text == "---" {
            if !opened && !saw_field {
                opened = true;
                continue;
            }
            if !saw_field {
                break;
            }
            let body = content[offset..].trim_start_matches(['\n', '\r']);
            return (metadata, body);
        }

        match text.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() && !key.contains(' ') || is_known_key(key) => {
                let key = key.trim().to_lowercase();
                let value = value.trim().trim_matches('"').to_string();
                if key == "title" && !value.is_empty() {
                    metadata.title = Some(value.clone());
                }
                metadata.fields.insert(key, value);
                saw_field = true;
            }
            _ => break,
        }
    }

    (Metadata::default(), content)
}

/// Slite uses keys with spaces ("created at"), which the generic rule rejects
fn is_known_key(key: &str) -> bool {
    matches!(
        key.trim().to_lowercase().as_str(),
        "created at" | "updated at" | "created by" | "updated by"
    )
}

/// All links and images in a body, in order of appearance
pub fn extract_links(body: &str) -> Vec<Link> {
    link_regex()
        .captures_iter(body)
        .map(|caps| Link {
            is_image: !caps[1].is_empty(),
            text: caps[2].to_string(),
            target: caps[3].to_string(),
        })
        .collect()
}

/// Resolve a link target to a path relative to the source root.
///
/// Targets starting with `/` are root-relative, everything else is relative
/// to `doc_dir`. Returns `None` for external URLs, pure anchors, and paths
/// escaping the root.
pub fn resolve_target(doc_dir: &Path, raw: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());

    let without_fragment = decoded
        .split(['#', '?'])
        .next()
        .unwrap_or_default()
        .trim();

    if without_fragment.is_empty() || is_external(without_fragment) {
        return None;
    }

    let joined = match without_fragment.strip_prefix('/') {
        Some(rooted) => PathBuf::from(rooted),
        None => doc_dir.join(without_fragment),
    };

    normalize(&joined)
}

/// Whether a resolved target points at another markdown document
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

fn is_external(target: &str) -> bool {
    target.contains("://") || target.starts_with("mailto:") || target.starts_with("data:")
}

/// Lexically resolve `.` and `..`; `None` if the path climbs above the root
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => parts.push(name),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slite_header() {
        let content = "\ntitle: My Title Project\ncreated at: Wed Nov 12 2024 13:13:31 GMT+0000\nupdated at: Thu Mar 06 2025 15:40:25 GMT+0000\n---\n\n# Hello\n\nBody.";
        let (meta, body) = parse_metadata(content);

        assert_eq!(meta.title.as_deref(), Some("My Title Project"));
        assert!(meta.fields.contains_key("created at"));
        assert!(body.starts_with("# Hello"));
    }

    #[test]
    fn test_parse_fenced_frontmatter() {
        let content = "---\ntitle: \"Quoted\"\n---\nText";
        let (meta, body) = parse_metadata(content);

        assert_eq!(meta.title.as_deref(), Some("Quoted"));
        assert_eq!(body, "Text");
    }

    #[test]
    fn test_no_header_keeps_content() {
        let content = "# Just a heading\n\nSome text: with a colon\n---\nmore";
        let (meta, body) = parse_metadata(content);

        assert!(meta.title.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn test_extract_links_and_images() {
        let body = "See [Setup](Setup.md) and ![diagram](Media_Page/diagram.png \"d\").";
        let links = extract_links(body);

        assert_eq!(links.len(), 2);
        assert!(!links[0].is_image);
        assert_eq!(links[0].target, "Setup.md");
        assert!(links[1].is_image);
        assert_eq!(links[1].target, "Media_Page/diagram.png");
    }

    #[test]
    fn test_resolve_relative_and_rooted_targets() {
        let dir = Path::new("Eng/Eng");

        assert_eq!(
            resolve_target(dir, "Other%20Page.md#section"),
            Some(PathBuf::from("Eng/Eng/Other Page.md"))
        );
        assert_eq!(
            resolve_target(dir, "/Ops/Ops/Runbook.md"),
            Some(PathBuf::from("Ops/Ops/Runbook.md"))
        );
        assert_eq!(
            resolve_target(dir, "../Eng.md"),
            Some(PathBuf::from("Eng/Eng.md"))
        );
        assert_eq!(resolve_target(dir, "https://example.com/a.md"), None);
        assert_eq!(resolve_target(dir, "#anchor"), None);
        assert_eq!(resolve_target(dir, "../../../outside.md"), None);
    }
}
