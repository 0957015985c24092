//! HTML manual page → readable plain text.

use scraper::{ElementRef, Html, Node, Selector};

use crate::domain::{Document, RawDocument};
use crate::error::AppError;

/// Elements that never carry manual content.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "nav", "header", "footer", "aside",
    "form", "button", "iframe", "head",
];

/// Class tokens used by documentation generators for chrome around the content.
const SKIPPED_CLASSES: &[&str] = &[
    "headerlink",
    "sidebar",
    "sphinxsidebar",
    "related",
    "breadcrumb",
    "breadcrumbs",
    "toctree-wrapper",
    "navigation",
    "footer",
    "prev-next-area",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul",
    "ol", "dl", "dt", "dd", "table", "thead", "tbody", "tr", "blockquote", "figure",
    "figcaption", "hr", "caption", "details", "summary",
];

/// Stateless page normalizer. Cheap to clone; safe to share across threads.
#[derive(Debug, Clone)]
pub struct Normalizer {
    default_language: String,
    roots: RootSelectors,
}

impl Normalizer {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            default_language: default_language.into(),
            roots: RootSelectors::new(),
        }
    }

    pub fn normalize(&self, raw: &RawDocument) -> Result<Document, AppError> {
        let malformed = |message: &str| {
            AppError::malformed_document(message.to_string())
                .with_details(format!("source_id={}", raw.source_id))
        };

        if raw.bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(malformed("Document is empty"));
        }
        let decoded =
            std::str::from_utf8(&raw.bytes).map_err(|_| malformed("Document is not valid UTF-8"))?;
        if !decoded.contains('<') {
            return Err(malformed("Document contains no markup"));
        }

        let html = Html::parse_document(decoded);
        let has_content_elements = html
            .root_element()
            .descendent_elements()
            .any(|el| !matches!(el.value().name(), "html" | "head" | "body"));
        if !has_content_elements {
            return Err(malformed("Document contains no markup elements"));
        }

        let root = self.roots.pick_root(&html);
        let mut collector = BlockCollector::default();
        collector.walk(root);
        let body = collector.finish();
        if body.is_empty() {
            return Err(malformed("Document has no readable text"));
        }

        let title = self
            .roots
            .title(&html)
            .unwrap_or_else(|| raw.source_id.clone());
        let language = html
            .root_element()
            .value()
            .attr("lang")
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.default_language.clone());

        Ok(Document {
            source_id: raw.source_id.clone(),
            title,
            body,
            language,
        })
    }
}

#[derive(Debug, Clone)]
struct RootSelectors {
    main: Selector,
    article: Selector,
    content_section: Selector,
    body: Selector,
    title: Selector,
    h1: Selector,
}

impl RootSelectors {
    fn new() -> Self {
        let parse = |s: &str| Selector::parse(s).expect("static selector");
        Self {
            main: parse("main"),
            article: parse("article"),
            content_section: parse("section#content"),
            body: parse("body"),
            title: parse("title"),
            h1: parse("h1"),
        }
    }

    fn pick_root<'a>(&self, html: &'a Html) -> ElementRef<'a> {
        html.select(&self.main)
            .next()
            .or_else(|| html.select(&self.article).next())
            .or_else(|| html.select(&self.content_section).next())
            .or_else(|| html.select(&self.body).next())
            .unwrap_or_else(|| html.root_element())
    }

    fn title(&self, html: &Html) -> Option<String> {
        let from_title = html.select(&self.title).next().map(|t| {
            let text = collapse_whitespace(&t.text().collect::<String>());
            strip_site_suffix(&text).to_string()
        });
        from_title
            .filter(|t| !t.is_empty())
            .or_else(|| {
                html.select(&self.h1).next().map(|h| {
                    collapse_whitespace(&h.text().collect::<String>())
                        .trim_end_matches('¶')
                        .trim()
                        .to_string()
                })
            })
            .filter(|t| !t.is_empty())
    }
}

/// "Mirror Modifier — Blender Manual" → "Mirror Modifier"
fn strip_site_suffix(title: &str) -> &str {
    for sep in [" — ", " – ", " - ", " | "] {
        if let Some((head, _)) = title.split_once(sep) {
            let head = head.trim();
            if !head.is_empty() {
                return head;
            }
        }
    }
    title
}

#[derive(Default)]
struct BlockCollector {
    blocks: Vec<String>,
    current: String,
}

impl BlockCollector {
    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.current.push_str(text),
                Node::Element(el) => {
                    let name = el.name();
                    if is_boilerplate(el) {
                        continue;
                    }
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };
                    match name {
                        "pre" => {
                            self.flush();
                            let text = collapse_newlines(&child.text().collect::<String>());
                            if !text.is_empty() {
                                self.blocks.push(text);
                            }
                        }
                        "br" | "td" | "th" => {
                            self.current.push(' ');
                            self.walk(child);
                            self.current.push(' ');
                        }
                        _ if BLOCK_TAGS.contains(&name) => {
                            self.flush();
                            self.walk(child);
                            self.flush();
                        }
                        _ => self.walk(child),
                    }
                }
                _ => {}
            }
        }
    }

    fn flush(&mut self) {
        let text = collapse_whitespace(&self.current);
        self.current.clear();
        if !text.is_empty() {
            self.blocks.push(text);
        }
    }

    fn finish(mut self) -> String {
        self.flush();
        self.blocks.join("\n\n")
    }
}

fn is_boilerplate(el: &scraper::node::Element) -> bool {
    if SKIPPED_TAGS.contains(&el.name()) {
        return true;
    }
    if el.attr("role") == Some("navigation") || el.attr("aria-hidden") == Some("true") {
        return true;
    }
    el.classes().any(|c| SKIPPED_CLASSES.contains(&c))
}

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}

fn collapse_newlines(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
