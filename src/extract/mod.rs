pub mod title;


use crate::config::SelectorConfig;
use crate::error::{Error, Result};
use crate::filter::LinkFilter;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

pub use title::{UNTITLED, clean_title};

/// What the extractor pulled out of one page
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// Cleaned title, never empty
    pub title: String,
    /// Inner HTML of every content container, joined by a blank line
    pub content: String,
    /// Absolute, fragment-free outbound links in document order
    pub links: Vec<Url>,
}

impl ExtractedPage {
    /// A page whose content is only whitespace has nothing to aggregate
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// Pulls title, body and links out of a fetched HTML document
#[derive(Debug)]
pub struct Extractor {
    title: Option<Selector>,
    title_fallback: Selector,
    content: Selector,
    /// Used when no configured container matched
    body: Selector,
    exclude: Vec<Selector>,
    links: Selector,
}

impl Extractor {
    /// Compile every configured selector; a bad selector is a configuration error
    pub fn new(config: &SelectorConfig) -> Result<Self> {
        let title = if config.title.trim().is_empty() {
            None
        } else {
            Some(parse_selector(&config.title)?)
        };

        let exclude = config
            .exclude
            .iter()
            .map(|s| parse_selector(s))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            title,
            title_fallback: parse_selector("title")?,
            content: parse_selector(&config.content)?,
            body: parse_selector("body")?,
            exclude,
            links: parse_selector("a[href]")?,
        })
    }

    /// Extract everything from a page. `base` is the URL the page was served
    /// from and is used to resolve relative links.
    pub fn extract(&self, html: &str, base: &Url) -> ExtractedPage {
        let mut document = Html::parse_document(html);

        let title = self.extract_title(&document);
        // Links come from the document before exclusions are detached
        let links = self.discover_links(&document, base);
        let content = self.extract_content(&mut document);

        ::log::trace!(
            "Extracted '{}' from {} ({} bytes, {} links)",
            title,
            base,
            content.len(),
            links.len()
        );

        ExtractedPage {
            title,
            content,
            links,
        }
    }

    /// Configured title selector, then `<title>`, then the placeholder
    pub fn extract_title(&self, document: &Html) -> String {
        let raw = self
            .title
            .as_ref()
            .and_then(|selector| first_text(document, selector))
            .or_else(|| first_text(document, &self.title_fallback));

        match raw {
            Some(raw) => {
                let cleaned = clean_title(&raw);
                if cleaned.is_empty() {
                    UNTITLED.to_string()
                } else {
                    cleaned
                }
            }
            None => UNTITLED.to_string(),
        }
    }

    /// Serialize every content container after removing excluded descendants.
    /// Falls back to `<body>` when no container matched at all.
    pub fn extract_content(&self, document: &mut Html) -> String {
        let mut targets: Vec<_> = document.select(&self.content).map(|el| el.id()).collect();
        ::log::trace!("Content selector matched {} elements", targets.len());
        if targets.is_empty() {
            targets = document.select(&self.body).map(|el| el.id()).collect();
        }

        let mut doomed = Vec::new();
        for id in &targets {
            let Some(container) = document.tree.get(*id).and_then(ElementRef::wrap) else {
                continue;
            };
            for selector in &self.exclude {
                doomed.extend(container.select(selector).map(|el| el.id()));
            }
        }

        for id in doomed {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }

        targets
            .iter()
            .filter_map(|id| document.tree.get(*id).and_then(ElementRef::wrap))
            .map(|el| el.inner_html())
            .filter(|fragment| !fragment.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Resolve every `a[href]` against `base`, dropping duplicates
    pub fn discover_links(&self, document: &Html, base: &Url) -> Vec<Url> {
        let mut seen = HashSet::new();
        document
            .select(&self.links)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| resolve_link(base, href))
            .filter(|url| seen.insert(url.as_str().to_string()))
            .collect()
    }
}

/// Trimmed text of the first element matching `selector` that has any
fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty())
}

/// Resolve a possibly-relative href, skipping in-page anchors and non-web schemes
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("javascript:")
    {
        return None;
    }

    base.join(href)
        .ok()
        .map(|url| LinkFilter::normalize_url(&url))
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| Error::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}
