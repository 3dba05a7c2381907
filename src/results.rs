use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One extracted documentation page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Canonical URL of the page
    pub url: String,

    /// Cleaned title
    pub title: String,

    /// Extracted HTML before sanitization; the deduplication key
    pub content: String,

    /// Markdown rendering of `content`
    pub markdown: String,

    /// Link hops from the nearest seed
    pub depth: usize,

    /// When the page was extracted
    pub discovered_at: DateTime<Utc>,
}

impl Page {
    /// Create a new page stamped with the current time
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        markdown: impl Into<String>,
        depth: usize,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            markdown: markdown.into(),
            depth,
            discovered_at: Utc::now(),
        }
    }
}

/// Outcome of a crawl that produced at least one page
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Pages retained after deduplication
    pub pages: usize,

    /// Seed URLs that could not be fetched, with the reason
    pub failed_seeds: Vec<(String, String)>,

    /// Discovered URLs skipped after exhausting retries or yielding no content
    pub skipped_urls: usize,

    /// Where the document was written, once it has been
    pub output_file: Option<String>,
}

impl RunReport {
    /// Some work failed even though the run as a whole succeeded
    pub fn has_partial_failures(&self) -> bool {
        !self.failed_seeds.is_empty() || self.skipped_urls > 0
    }
}
