//! HTML page reduction: title, visible text, links, and images.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

/// Elements whose text is never visible.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg", "iframe", "head"];

/// Link targets that are never followed: images, documents, archives, media.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp", "pdf", "zip", "gz", "tar", "rar",
    "mp3", "mp4", "mov", "avi", "webm", "woff", "woff2", "ttf", "css", "js", "xml", "doc", "docx",
    "xls", "xlsx",
];

static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static H1_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("valid selector"));
static BODY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid selector"));
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));
static IMG_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("valid selector"));

/// A page reduced to what the import pipeline needs.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: String,
    pub text: String,
    pub links: Vec<Url>,
    pub images: Vec<String>,
}

/// Parse an HTML document fetched from `base`.
pub fn parse_page(html: &str, base: &Url, max_chars: usize) -> ParsedPage {
    let doc = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&doc),
        text: truncate_chars(&visible_text(&doc), max_chars),
        links: extract_links(&doc, base),
        images: extract_images(&doc, base),
    }
}

/// `<title>`, falling back to the first `<h1>`.
fn extract_title(doc: &Html) -> String {
    let from = |sel: &Selector| {
        doc.select(sel)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    };
    from(&TITLE_SEL).or_else(|| from(&H1_SEL)).unwrap_or_default()
}

/// Body text with hidden elements removed and whitespace collapsed.
pub fn visible_text(doc: &Html) -> String {
    let Some(body) = doc.select(&BODY_SEL).next() else {
        return String::new();
    };

    let mut out = String::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| HIDDEN_TAGS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        out.push_str(text);
        out.push(' ');
    }
    collapse_whitespace(&out)
}

/// Extract all followable links from a document, resolved against the base URL.
fn extract_links(doc: &Html, base_url: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for el in doc.select(&LINK_SEL) {
        let Some(href) = el.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }

        if let Ok(mut resolved) = base_url.join(href) {
            resolved.set_fragment(None);
            if is_binary_target(&resolved) {
                continue;
            }
            if seen.insert(resolved.to_string()) {
                links.push(resolved);
            }
        }
    }

    links
}

/// Absolute image URLs, deduplicated, `data:` URIs skipped.
fn extract_images(doc: &Html, base_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    doc.select(&IMG_SEL)
        .filter_map(|el| el.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty() && !src.starts_with("data:"))
        .filter_map(|src| base_url.join(src).ok())
        .map(|u| u.to_string())
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

/// Whether the URL path ends in a known non-HTML extension.
pub fn is_binary_target(url: &Url) -> bool {
    let last = url.path().rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((_, ext)) => BINARY_EXTENSIONS
            .iter()
            .any(|b| ext.eq_ignore_ascii_case(b)),
        None => false,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most `max_chars` characters, never splitting a character.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://ecospray.example.com/services/").unwrap()
    }

    #[test]
    fn title_prefers_title_tag() {
        let html = "<html><head><title> Spray Foam | EcoSpray </title></head><body><h1>Other</h1></body></html>";
        let page = parse_page(html, &base(), 1000);
        assert_eq!(page.title, "Spray Foam | EcoSpray");
    }

    #[test]
    fn title_falls_back_to_h1() {
        let html = "<html><body><h1>Attic Insulation</h1></body></html>";
        let page = parse_page(html, &base(), 1000);
        assert_eq!(page.title, "Attic Insulation");
    }

    #[test]
    fn visible_text_skips_scripts_and_styles() {
        let html = r#"<html><head><style>.a{color:red}</style></head><body>
            <h1>Closed-cell foam</h1>
            <script>var tracking = "secret";</script>
            <p>Seals   air leaks.</p>
            <noscript>Enable JS</noscript>
        </body></html>"#;
        let page = parse_page(html, &base(), 1000);
        assert_eq!(page.text, "Closed-cell foam Seals air leaks.");
    }

    #[test]
    fn text_is_truncated_on_char_boundary() {
        let html = "<html><body><p>ééééé</p></body></html>";
        let page = parse_page(html, &base(), 3);
        assert_eq!(page.text, "ééé");
    }

    #[test]
    fn links_are_resolved_and_filtered() {
        let html = r##"<html><body>
            <a href="/about">About</a>
            <a href="attic#top">Attic</a>
            <a href="#section">Anchor</a>
            <a href="mailto:info@ecospray.example.com">Mail</a>
            <a href="tel:5551234567">Call</a>
            <a href="/brochure.pdf">Brochure</a>
            <a href="/about">About again</a>
        </body></html>"##;
        let page = parse_page(html, &base(), 1000);
        let links: Vec<String> = page.links.iter().map(|u| u.to_string()).collect();
        assert_eq!(
            links,
            vec![
                "https://ecospray.example.com/about",
                "https://ecospray.example.com/services/attic",
            ]
        );
    }

    #[test]
    fn images_are_absolute_and_deduplicated() {
        let html = r#"<html><body>
            <img src="/img/crew.jpg"><img src="/img/crew.jpg">
            <img src="data:image/png;base64,AAAA">
            <img src="https://cdn.example.com/logo.png">
        </body></html>"#;
        let page = parse_page(html, &base(), 1000);
        assert_eq!(
            page.images,
            vec![
                "https://ecospray.example.com/img/crew.jpg",
                "https://cdn.example.com/logo.png",
            ]
        );
    }
}
