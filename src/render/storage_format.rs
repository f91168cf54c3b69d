use std::borrow::Cow;
use std::sync::OnceLock;

use pulldown_cmark::{html, Options, Parser};
use regex::{Captures, Regex};

use super::Render;

/// Tags allowed through as raw HTML; anything else in angle brackets is text
const VALID_HTML_TAGS: &[&str] = &[
    "a", "abbr", "address", "area", "article", "aside", "audio", "b", "bdi", "bdo", "blockquote",
    "br", "caption", "cite", "code", "col", "colgroup", "data", "dd", "del", "details", "dfn",
    "div", "dl", "dt", "em", "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "i", "img", "ins", "kbd", "li", "main", "mark", "nav", "ol", "p", "picture",
    "pre", "q", "s", "samp", "section", "small", "source", "span", "strong", "sub", "summary",
    "sup", "table", "tbody", "td", "tfoot", "th", "thead", "time", "tr", "u", "ul", "var",
    "video", "wbr",
];

/// Renders markdown into Confluence storage-format XHTML
#[derive(Debug, Default, Clone, Copy)]
pub struct StorageFormatRenderer;

impl Render for StorageFormatRenderer {
    fn render(&self, markdown: &str) -> String {
        let markdown = escape_unknown_tags(markdown);
        let markdown = fix_duplicate_links(&markdown);
        let markdown = convert_bang_admonitions(&markdown);
        let html = markdown_to_html(&markdown);
        let html = convert_admonitions(&html);
        convert_code_blocks(&html)
    }
}

fn code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```.*?```|`[^`\n]+`").unwrap())
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<\s*/?\s*([a-zA-Z][a-zA-Z0-9-]*)[^<>\n]*>").unwrap())
}

fn void_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<(br|hr)\s*>").unwrap())
}

fn duplicate_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(<https.*>|https.*)\n*(\[\\\[(http.*)\\\]\]\(http.*\))").unwrap()
    })
}

fn admonition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<blockquote>\s*<p>\[!(\w+)\]\s*(.*?)</blockquote>\n?").unwrap()
    })
}

fn pre_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<pre><code(?: class="language-([^"]+)")?>(.*?)</code></pre>\n?"#).unwrap()
    })
}

/// Slite exports a pasted URL twice: bare, then as `[\[url\]](url)`.
/// Collapse the pair into one link.
fn fix_duplicate_links(markdown: &str) -> String {
    duplicate_link_regex()
        .replace_all(markdown, |caps: &Captures| {
            let raw = caps[1].trim().trim_start_matches('<').trim_end_matches('>');
            let url = caps[3].trim();

            if raw == url {
                format!("[{}]({})", raw, raw)
            } else {
                log::debug!("Keeping both links: {} != {}", raw, url);
                format!("{}\n[{}]({})", raw, url, url)
            }
        })
        .into_owned()
}

/// Lines starting with `!!` become `> [!NOTE]` blocks, rendered as info panels
fn convert_bang_admonitions(markdown: &str) -> String {
    let mut lines = Vec::new();
    for line in markdown.lines() {
        match line.strip_prefix("!!") {
            Some(rest) => {
                lines.push("> [!NOTE]".to_string());
                lines.push(format!("> {}", rest.trim()));
                lines.push(String::new());
            }
            None => lines.push(line.to_string()),
        }
    }
    lines.join("\n")
}

/// Escape `<token>`s that are not HTML (placeholders such as `<id>`),
/// leaving code and autolinks alone
fn escape_unknown_tags(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut last = 0;
    for code in code_regex().find_iter(markdown) {
        out.push_str(&escape_segment(&markdown[last..code.start()]));
        out.push_str(code.as_str());
        last = code.end();
    }
    out.push_str(&escape_segment(&markdown[last..]));
    out
}

fn escape_segment(text: &str) -> Cow<'_, str> {
    let escaped = tag_regex().replace_all(text, |caps: &Captures| {
        let snippet = &caps[0];
        let tag = caps[1].to_lowercase();

        if VALID_HTML_TAGS.contains(&tag.as_str()) || snippet.contains("http") || snippet.contains('@') {
            return snippet.to_string();
        }

        log::debug!("{} is not a valid html tag. Escaping angle brackets", snippet);
        snippet.replace('<', "&lt;").replace('>', "&gt;")
    });

    match escaped {
        Cow::Borrowed(text) => void_tag_regex().replace_all(text, "<$1 />"),
        Cow::Owned(text) => Cow::Owned(void_tag_regex().replace_all(&text, "<$1 />").into_owned()),
    }
}

fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn macro_for(kind: &str) -> &'static str {
    // Slite "Note" blocks look like Confluence info panels
    match kind.to_lowercase().as_str() {
        "warning" => "warning",
        "tip" => "tip",
        "important" => "note",
        "caution" => "warning",
        _ => "info",
    }
}

/// `<blockquote><p>[!TYPE] ...` -> panel macro
fn convert_admonitions(html: &str) -> String {
    admonition_regex()
        .replace_all(html, |caps: &Captures| {
            let kind = &caps[1];
            let content = caps[2].trim();
            let macro_name = macro_for(kind);

            if content.trim_end_matches("</p>").trim().is_empty() {
                log::warn!("Skipping empty admonition block of type '{}'", kind);
                return String::new();
            }

            log::debug!("Admonition detected: type={}", macro_name);
            format!(
                "<ac:structured-macro ac:name=\"{}\"><ac:rich-text-body><p>{}</ac:rich-text-body></ac:structured-macro>\n",
                macro_name, content
            )
        })
        .into_owned()
}

/// `<pre><code>` -> code macro with a CDATA body
fn convert_code_blocks(html: &str) -> String {
    pre_code_regex()
        .replace_all(html, |caps: &Captures| {
            let code = html_escape::decode_html_entities(&caps[2]);
            let code = code.trim_matches('\n').replace("]]>", "]]]]><![CDATA[>");

            let language = caps
                .get(1)
                .map(|m| {
                    format!(
                        "<ac:parameter ac:name=\"language\">{}</ac:parameter>",
                        m.as_str()
                    )
                })
                .unwrap_or_default();

            format!(
                "<ac:structured-macro ac:name=\"code\">{}<ac:plain-text-body><![CDATA[{}]]></ac:plain-text-body></ac:structured-macro>\n",
                language, code
            )
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(markdown: &str) -> String {
        StorageFormatRenderer.render(markdown)
    }

    #[test]
    fn test_renders_links_and_tables() {
        let html = render("See [docs](https://example.com).\n\n| a | b |\n|---|---|\n| 1 | 2 |\n");

        assert!(html.contains("<a href=\"https://example.com\">docs</a>"));
        assert!(html.contains("<table>"));
    }

    #[test]
    fn test_bang_line_becomes_info_panel() {
        let html = render("Intro\n!! Remember the milk\nOutro");

        assert!(html.contains("<ac:structured-macro ac:name=\"info\">"));
        assert!(html.contains("Remember the milk"));
        assert!(!html.contains("[!NOTE]"));
        assert!(html.contains("Outro"));
    }

    #[test]
    fn test_typed_admonition() {
        let html = render("> [!WARNING]\n> Do not deploy on Fridays");

        assert!(html.contains("ac:name=\"warning\""));
        assert!(html.contains("Do not deploy on Fridays</p></ac:rich-text-body>"));
    }

    #[test]
    fn test_plain_blockquote_untouched() {
        let html = render("> just a quote");
        assert!(html.contains("<blockquote>"));
    }

    #[test]
    fn test_code_block_becomes_macro() {
        let html = render("```rust\nlet v: Vec<u8> = vec![];\nprintln!(\"{}\", v.len());\n```\n");

        assert!(html.contains("<ac:parameter ac:name=\"language\">rust</ac:parameter>"));
        assert!(html.contains("<![CDATA[let v: Vec<u8> = vec![];\nprintln!(\"{}\", v.len());]]>"));
        assert!(!html.contains("<pre>"));
    }

    #[test]
    fn test_unknown_tags_escaped_outside_code() {
        let html = render("Replace <team-name> with yours. Keep <sub>this</sub> and `<T>`.");

        assert!(html.contains("&lt;team-name&gt;"));
        assert!(html.contains("<sub>this</sub>"));
        assert!(html.contains("<code>&lt;T&gt;</code>"));
        assert!(!html.contains("&amp;lt;"));
    }

    #[test]
    fn test_duplicate_link_pair_collapses() {
        let markdown = "Docs:\nhttps://example.com/doc\n[\\[https://example.com/doc\\]](https://example.com/doc)\nEnd";

        assert_eq!(
            fix_duplicate_links(markdown),
            "Docs:\n[https://example.com/doc](https://example.com/doc)\nEnd"
        );

        let html = render(markdown);
        assert_eq!(html.matches("<a href=").count(), 1);
        assert!(!html.contains("\\["));
    }

    #[test]
    fn test_different_urls_are_both_kept() {
        let markdown = "<https://a.example>\n[\\[https://b.example\\]](https://b.example)";

        assert_eq!(
            fix_duplicate_links(markdown),
            "https://a.example\n[https://b.example](https://b.example)"
        );
    }

    #[test]
    fn test_admonition_kinds_map_to_confluence_macros() {
        assert_eq!(macro_for("NOTE"), "info");
        assert_eq!(macro_for("Important"), "note");
        assert_eq!(macro_for("caution"), "warning");
        assert_eq!(macro_for("tip"), "tip");
        assert_eq!(macro_for("unknown"), "info");
    }

    #[test]
    fn test_void_tags_closed() {
        let html = render("line one<br>line two");
        assert!(html.contains("<br />"));
    }
}
