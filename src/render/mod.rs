//! Markdown to Confluence storage format
//!
//! Converts exported markdown into the XHTML dialect Confluence stores,
//! including:
//! - `!!` lines and `> [!NOTE]` blocks as info/warning/tip panels
//! - Fenced code as the `code` macro
//! - Escaping of stray angle-bracket tokens that are not HTML

mod storage_format;

pub use storage_format::StorageFormatRenderer;

/// Turns a markdown body into the remote page body format
pub trait Render {
    fn render(&self, markdown: &str) -> String;
}
