use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::UNTITLED;
use crate::results::Page;
use crate::utils;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Deepest Markdown heading level
const MAX_HEADING_LEVEL: usize = 6;

/// SHA-256 of a page's extracted content, hex encoded
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Document-level settings used when rendering
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub name: String,
    pub base_url: String,
    pub max_depth: usize,
    pub include_metadata: bool,
    pub include_toc: bool,
}

impl From<&Config> for DocumentMeta {
    fn from(config: &Config) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url.clone(),
            max_depth: config.processing.max_depth,
            include_metadata: config.output.include_metadata,
            include_toc: config.processing.generate_toc,
        }
    }
}

#[derive(Debug, Default)]
struct AggregateState {
    pages: Vec<Page>,
    hashes: HashSet<String>,
}

/// Collects pages from concurrent workers, dropping duplicate content
#[derive(Debug)]
pub struct Aggregator {
    state: Mutex<AggregateState>,
    memory_limit: usize,
    memory_warned: AtomicBool,
}

impl Aggregator {
    /// `memory_limit` is the page count at which a warning is logged
    pub fn new(memory_limit: usize) -> Self {
        Self {
            state: Mutex::new(AggregateState::default()),
            memory_limit,
            memory_warned: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregateState> {
        // A panicking worker cannot leave the page list half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a page unless one with identical content was already added.
    /// Returns whether the page was kept.
    pub fn add_page(&self, page: Page) -> bool {
        let hash = content_hash(&page.content);
        let mut state = self.lock();

        if !state.hashes.insert(hash) {
            ::log::debug!("Skipping duplicate content from {}", page.url);
            return false;
        }

        if state.pages.len() >= self.memory_limit && !self.memory_warned.swap(true, Ordering::Relaxed)
        {
            ::log::warn!(
                "Holding {} pages in memory (limit {}); very large sites may exhaust memory",
                state.pages.len(),
                self.memory_limit
            );
        }

        state.pages.push(page);
        true
    }

    /// Number of distinct pages collected so far
    pub fn page_count(&self) -> usize {
        self.lock().pages.len()
    }

    /// Snapshot the collected pages into a sorted document.
    /// Fails with [`Error::NoPages`] when nothing was collected.
    pub fn finish(&self, meta: DocumentMeta) -> Result<AggregateDocument> {
        let mut pages = self.lock().pages.clone();
        if pages.is_empty() {
            return Err(Error::NoPages);
        }

        sort_pages(&mut pages);
        Ok(AggregateDocument {
            meta,
            pages,
            generated_at: Utc::now(),
        })
    }

    /// Render the collected pages and write them to `path`
    pub fn generate_output(&self, meta: DocumentMeta, path: impl AsRef<Path>) -> Result<AggregateDocument> {
        let document = self.finish(meta)?;
        document.write_output(path)?;
        Ok(document)
    }
}

/// Order by depth, then URL
pub fn sort_pages(pages: &mut [Page]) {
    pages.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.url.cmp(&b.url)));
}

/// Anchor slug for a heading: lower-case, spaces to hyphens, punctuation
/// removed, hyphen runs collapsed, no leading/trailing hyphens.
pub fn anchor_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        let mapped = if c.is_whitespace() || c == '-' {
            '-'
        } else if c.is_alphanumeric() || c == '_' {
            c
        } else {
            continue;
        };

        if mapped == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(mapped);
    }

    slug.trim_matches('-').to_string()
}

/// The final ordered document
#[derive(Debug, Clone)]
pub struct AggregateDocument {
    pub meta: DocumentMeta,
    pub pages: Vec<Page>,
    pub generated_at: DateTime<Utc>,
}

impl AggregateDocument {
    /// Render metadata header, table of contents and page bodies
    pub fn render(&self) -> String {
        let mut output = String::new();

        if self.meta.include_metadata {
            self.write_metadata(&mut output);
        }
        if self.meta.include_toc {
            self.write_table_of_contents(&mut output);
        }
        self.write_content(&mut output);

        output
    }

    /// Render and write to `path`
    pub fn write_output(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.render())?;
        ::log::info!("Wrote {} pages to {}", self.pages.len(), path.display());
        Ok(())
    }

    fn write_metadata(&self, output: &mut String) {
        let _ = write!(
            output,
            "# {}\n\n*Generated on {}*\n\n- **Base URL**: {}\n- **Total Pages**: {}\n- **Max Depth**: {}\n\n---\n\n",
            self.meta.name,
            self.generated_at.format("%Y-%m-%d %H:%M:%S"),
            self.meta.base_url,
            self.pages.len(),
            self.meta.max_depth
        );
    }

    fn write_table_of_contents(&self, output: &mut String) {
        output.push_str("## Table of Contents\n\n");
        for page in &self.pages {
            let title = display_title(page);
            let _ = writeln!(
                output,
                "{}- [{}](#{})",
                "  ".repeat(page.depth),
                title,
                anchor_slug(&title)
            );
        }
        output.push_str("\n---\n\n");
    }

    fn write_content(&self, output: &mut String) {
        let sections: Vec<String> = self.pages.iter().map(|page| self.section(page)).collect();
        output.push_str(&sections.join("\n\n---\n\n"));
        output.push('\n');
    }

    fn section(&self, page: &Page) -> String {
        let level = (page.depth + 1).min(MAX_HEADING_LEVEL);
        let title = display_title(page);
        let mut section = format!("{} {}", "#".repeat(level), title);

        if self.meta.include_metadata {
            let _ = write!(section, "\n\n*Source: [{}]({})*", page.url, page.url);
            let _ = write!(
                section,
                "\n\n<!-- Source: {} -->\n<!-- Title: {} -->\n<!-- Depth: {} -->",
                page.url, title, page.depth
            );
        }

        let body = page.markdown.trim();
        if !body.is_empty() {
            section.push_str("\n\n");
            section.push_str(body);
        }
        section
    }
}

/// Page title, or one derived from the URL when extraction found none
fn display_title(page: &Page) -> String {
    if page.title.is_empty() || page.title == UNTITLED {
        utils::title_from_url(&page.url)
    } else {
        page.title.clone()
    }
}
