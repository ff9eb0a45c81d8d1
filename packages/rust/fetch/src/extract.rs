//! Scraped-page HTML → Markdown extraction.
//!
//! Research pages arrive as full HTML documents. We keep only the content
//! region (`<main>`/`<article>`, falling back to `<body>`), convert it to
//! Markdown with `htmd`, and normalize whitespace so the result is usable as
//! LLM context.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use glossgen_shared::{GlossgenError, Result};

/// Result of extracting a scraped page.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// Page title from the first `<h1>` or `<title>`, when present.
    pub title: Option<String>,
    /// Extracted Markdown body.
    pub markdown: String,
}

/// Convert a raw HTML document to clean Markdown.
pub fn page_to_markdown(html: &str) -> Result<ExtractedPage> {
    let content_html = extract_content_html(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg",
        ])
        .build();

    let raw = converter
        .convert(&content_html)
        .map_err(|e| GlossgenError::parse(format!("markdown conversion failed: {e}")))?;

    let markdown = collapse_blank_lines(raw.trim());
    if markdown.is_empty() {
        return Err(GlossgenError::parse("page produced no content"));
    }

    Ok(ExtractedPage {
        title: extract_title(html),
        markdown,
    })
}

/// Keep the content region of the document: `<main>`, then `<article>`,
/// then the whole `<body>`.
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    for tag in ["main", "article", "body"] {
        let selector = Selector::parse(tag).unwrap();
        if let Some(el) = doc.select(&selector).next() {
            return el.html();
        }
    }

    html.to_string()
}

/// Extract a title from the first `<h1>`, falling back to `<title>`.
fn extract_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    for tag in ["h1", "title"] {
        let selector = Selector::parse(tag).unwrap();
        if let Some(el) = doc.select(&selector).next() {
            let text = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    None
}

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Collapse runs of three or more newlines down to a single blank line.
fn collapse_blank_lines(markdown: &str) -> String {
    BLANK_RUNS.replace_all(markdown, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_main_over_body() {
        let html = r#"<html><body>
            <nav><a href="/">Home</a><a href="/about">About</a></nav>
            <main><h1>Sharding</h1><p>Splitting data across nodes.</p></main>
            <footer>Copyright</footer>
        </body></html>"#;

        let page = page_to_markdown(html).expect("extract");
        assert_eq!(page.title.as_deref(), Some("Sharding"));
        assert!(page.markdown.contains("Splitting data across nodes."));
        assert!(!page.markdown.contains("About"));
        assert!(!page.markdown.contains("Copyright"));
    }

    #[test]
    fn falls_back_to_body() {
        let html = "<html><body><p>Plain page with no landmarks.</p></body></html>";
        let page = page_to_markdown(html).expect("extract");
        assert!(page.markdown.contains("Plain page"));
        assert_eq!(page.title, None);
    }

    #[test]
    fn title_falls_back_to_title_tag() {
        let html = r#"<html><head><title>Gossip Protocols</title></head>
            <body><p>No h1 here.</p></body></html>"#;
        let page = page_to_markdown(html).expect("extract");
        assert_eq!(page.title.as_deref(), Some("Gossip Protocols"));
    }

    #[test]
    fn scripts_and_styles_are_stripped() {
        let html = r#"<html><body><main>
            <script>alert("x")</script>
            <style>.red { color: red }</style>
            <p>Real content.</p>
        </main></body></html>"#;
        let page = page_to_markdown(html).expect("extract");
        assert!(page.markdown.contains("Real content."));
        assert!(!page.markdown.contains("alert"));
        assert!(!page.markdown.contains("color: red"));
    }

    #[test]
    fn blank_runs_collapse() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn empty_page_is_an_error() {
        let err = page_to_markdown("<html><body></body></html>").unwrap_err();
        assert!(err.to_string().contains("no content"));
    }
}
