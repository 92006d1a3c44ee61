//! HTML menu flattening
//!
//! Turns a dispensary web page into plain text small enough for one text
//! model call: scripts, styles and comments removed, tags stripped, common
//! entities decoded, whitespace collapsed, truncated to a character budget.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

struct HtmlPatterns {
    invisible: Regex,
    block_break: Regex,
    tag: Regex,
    spaces: Regex,
}

static PATTERNS: Lazy<HtmlPatterns> = Lazy::new(|| HtmlPatterns {
    invisible: Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<!--.*?-->")
        .expect("static regex"),
    block_break: Regex::new(r"(?i)<br\s*/?>|</(?:p|div|li|tr|h[1-6]|section|article|td|th)\s*>")
        .expect("static regex"),
    tag: Regex::new(r"(?s)<[^>]*>").expect("static regex"),
    spaces: Regex::new(r"[ \t\x{a0}]+").expect("static regex"),
});

/// Flatten `html` into menu text of at most `max_chars` characters
pub fn html_to_menu_text(html: &str, max_chars: usize) -> String {
    let p = &*PATTERNS;

    let visible = p.invisible.replace_all(html, " ");
    let broken = p.block_break.replace_all(&visible, "\n");
    let stripped = p.tag.replace_all(&broken, " ");
    let decoded = decode_entities(&stripped);

    let text = decoded
        .lines()
        .map(|line| p.spaces.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let truncated = truncate_chars(&text, max_chars);
    debug!(
        html_bytes = html.len(),
        text_chars = truncated.chars().count(),
        truncated = truncated.len() < text.len(),
        "Flattened HTML menu"
    );
    truncated
}

fn decode_entities(text: &str) -> String {
    // &amp; last so "&amp;lt;" stays "&lt;"
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

/// True when `bytes` look like an HTML document rather than an image
pub fn looks_like_html(bytes: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_lowercase();
    let head = head.trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<body")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_scripts_styles_and_tags() {
        let html = r#"<html><head><style>.x { color: red; }</style>
            <script>var menu = {"name": "fake"};</script></head>
            <body><!-- hidden -->
            <div class="product"><h3>Blue Dream</h3><span>Hybrid &amp; THC 21%</span></div>
            <div class="product"><h3>OG&nbsp;Kush</h3><span>Indica</span></div>
            </body></html>"#;
        let text = html_to_menu_text(html, 24_000);

        assert!(text.contains("Blue Dream"));
        assert!(text.contains("Hybrid & THC 21%"));
        assert!(text.contains("OG Kush"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains("fake"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_block_elements_become_lines() {
        let text = html_to_menu_text("<p>Gelato</p><p>Wedding Cake</p>", 1000);
        assert_eq!(text, "Gelato\nWedding Cake");
    }

    #[test]
    fn test_entity_decoding_order() {
        assert_eq!(decode_entities("&amp;lt; &quot;x&quot; it&#39;s"), "&lt; \"x\" it's");
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let text = html_to_menu_text("<p>ééééé</p>", 3);
        assert_eq!(text, "ééé");
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html(b"  <!DOCTYPE html><html>"));
        assert!(looks_like_html(b"<html lang=\"en\">"));
        assert!(!looks_like_html(&[0x89, b'P', b'N', b'G']));
    }
}
