use std::collections::HashSet;

use crate::progress::ProgressStore;

const UNTITLED: &str = "Untitled";
const MAX_SPACE_KEY_LEN: usize = 10;

/// Titles already taken within one channel.
///
/// The remote rejects titles that differ only in case, so titles are compared
/// trimmed and lowercased.
#[derive(Debug, Default, Clone)]
pub struct TitleRegistry {
    channel: String,
    taken: HashSet<String>,
}

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

impl TitleRegistry {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            taken: HashSet::new(),
        }
    }

    /// Seed the registry with every title already assigned in `channel`
    pub fn from_store(channel: &str, store: &ProgressStore) -> Self {
        let mut registry = Self::new(channel);
        for (id, record) in store.snapshot().documents {
            if id.channel() != channel {
                continue;
            }
            if let Some(title) = record.assigned_title {
                registry.register(&title);
            }
        }
        log::debug!(
            "Title registry for '{}' seeded with {} title(s)",
            channel,
            registry.taken.len()
        );
        registry
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn contains(&self, title: &str) -> bool {
        self.taken.contains(&title_key(title))
    }

    /// Mark `title` as used. Returns false if it already was.
    pub fn register(&mut self, title: &str) -> bool {
        self.taken.insert(title_key(title))
    }

    /// Pick the first free title of `raw`, `raw (2)`, `raw (3)`, ... and
    /// register it
    pub fn assign(&mut self, raw: &str) -> String {
        let base = match raw.trim() {
            "" => UNTITLED,
            trimmed => trimmed,
        };

        let mut candidate = base.to_string();
        let mut n = 2;
        while self.contains(&candidate) {
            candidate = format!("{} ({})", base, n);
            n += 1;
        }

        if candidate != base {
            log::info!(
                "Title '{}' is already used in '{}', using '{}'",
                base,
                self.channel,
                candidate
            );
        }
        self.register(&candidate);
        candidate
    }
}

/// Allocates space keys, unique across all channels of a migration
#[derive(Debug, Default, Clone)]
pub struct SpaceKeys {
    taken: HashSet<String>,
}

impl SpaceKeys {
    /// Seed with the keys already recorded for any channel
    pub fn from_store(store: &ProgressStore) -> Self {
        let taken = store
            .snapshot()
            .channels
            .into_values()
            .filter_map(|record| record.space_key)
            .collect();
        Self { taken }
    }

    /// Derive and reserve a key for `channel`
    pub fn reserve(&mut self, channel: &str) -> String {
        let base = derive_space_key(channel);
        let mut key = base.clone();
        let mut n = 2;
        while self.taken.contains(&key) {
            let suffix = n.to_string();
            let keep = MAX_SPACE_KEY_LEN.saturating_sub(suffix.len()).min(base.len());
            key = format!("{}{}", &base[..keep], suffix);
            n += 1;
        }
        self.taken.insert(key.clone());
        key
    }
}

/// Initials of the channel name, e.g. "Product Design-Team" -> "PDT".
/// Space keys only allow ASCII letters and digits.
pub fn derive_space_key(name: &str) -> String {
    let initials: String = name
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter_map(|word| word.chars().find(char::is_ascii_alphanumeric))
        .map(|c| c.to_ascii_uppercase())
        .take(MAX_SPACE_KEY_LEN)
        .collect();
    if !initials.is_empty() {
        return initials;
    }

    let fallback: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .take(MAX_SPACE_KEY_LEN)
        .collect();
    if fallback.is_empty() {
        "SPACE".to_string()
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::DocumentRecord;
    use crate::scan::DocumentId;
    use tempfile::TempDir;

    #[test]
    fn test_duplicate_titles_get_suffixes() {
        let mut registry = TitleRegistry::new("Eng");

        assert_eq!(registry.assign("Overview"), "Overview");
        assert_eq!(registry.assign("Overview"), "Overview (2)");
        assert_eq!(registry.assign(" overview "), "overview (3)");
        assert_eq!(registry.assign("Setup"), "Setup");
    }

    #[test]
    fn test_empty_title_is_untitled() {
        let mut registry = TitleRegistry::new("Eng");
        assert_eq!(registry.assign("   "), "Untitled");
        assert_eq!(registry.assign(""), "Untitled (2)");
    }

    #[test]
    fn test_seeded_from_store_per_channel() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::for_source(dir.path()).unwrap();

        let mut record = DocumentRecord::default();
        record.assigned_title = Some("Overview".to_string());
        store.upsert_document(&DocumentId::from("Eng/Eng/A.md"), record.clone()).unwrap();
        store.upsert_document(&DocumentId::from("Ops/Ops/A.md"), record).unwrap();

        let mut eng = TitleRegistry::from_store("Eng", &store);
        assert_eq!(eng.assign("Overview"), "Overview (2)");

        let mut design = TitleRegistry::from_store("Design", &store);
        assert_eq!(design.assign("Overview"), "Overview");
    }

    #[test]
    fn test_space_key_from_initials() {
        assert_eq!(derive_space_key("Engineering"), "E");
        assert_eq!(derive_space_key("Product Design-Team"), "PDT");
        assert_eq!(derive_space_key("a b c d e f g h i j k l"), "ABCDEFGHIJ");
        assert_eq!(derive_space_key("!!!"), "SPACE");
    }

    #[test]
    fn test_space_keys_do_not_collide() {
        let mut keys = SpaceKeys::default();
        assert_eq!(keys.reserve("Engineering"), "E");
        assert_eq!(keys.reserve("Events"), "E2");
        assert_eq!(keys.reserve("Everything"), "E3");

        let mut long = SpaceKeys::default();
        let first = long.reserve("a b c d e f g h i j");
        let second = long.reserve("a b c d e f g h i j");
        assert_eq!(first, "ABCDEFGHIJ");
        assert_eq!(second, "ABCDEFGHI2");
    }
}
