pub mod aggregate;
pub mod config;
pub mod convert;
pub mod crawlers;
pub mod error;
pub mod extract;
pub mod filter;
pub mod results;
pub mod utils;

// Re-export commonly used types for convenience
pub use aggregate::{AggregateDocument, Aggregator, DocumentMeta};
pub use config::Config;
pub use crawlers::{Crawler, FetchedPage, Fetcher, HttpFetcher};
pub use error::{Error, FetchError, Result};
pub use results::{Page, RunReport};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main builder: crawl a documentation site and write it out as one
/// Markdown file.
pub struct DocBundle {
    config: Config,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl DocBundle {
    /// Create a new builder from a loaded configuration
    pub fn new(config: Config) -> Self {
        Self {
            config,
            fetcher: None,
        }
    }

    /// Set the number of concurrent workers
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.processing.concurrency = max_concurrency;
        self
    }

    /// Set how many links deep the crawl may go
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.config.processing.max_depth = max_depth;
        self
    }

    /// Set the total timeout (maximum runtime)
    pub fn with_total_timeout(mut self, timeout_seconds: u64) -> Self {
        self.config.security.scraping_timeout_secs = timeout_seconds;
        self
    }

    /// Set where the Markdown document is written
    pub fn with_output_file(mut self, path: impl Into<String>) -> Self {
        self.config.output_file = path.into();
        self
    }

    /// Write whatever was collected when the total timeout expires
    pub fn with_partial_output(mut self, enabled: bool) -> Self {
        self.config.output.render_partial_on_timeout = enabled;
        self
    }

    /// Replace the HTTP fetcher, e.g. with a canned one in tests
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Crawl, aggregate and write the output file.
    ///
    /// On timeout the collected pages are written only when partial output is
    /// enabled, and the timeout error is still returned.
    pub async fn generate(self, cancel: CancellationToken) -> Result<RunReport> {
        let Self { config, fetcher } = self;
        config.validate()?;

        let crawler = Arc::new(match fetcher {
            Some(fetcher) => Crawler::new(config.clone(), fetcher)?,
            None => Crawler::from_config(config.clone())?,
        });
        let meta = DocumentMeta::from(&config);

        match crawler.run(cancel).await {
            Ok(mut report) => {
                crawler
                    .aggregator()
                    .generate_output(meta, &config.output_file)?;
                report.output_file = Some(config.output_file.clone());

                if report.has_partial_failures() {
                    ::log::warn!(
                        "Completed with partial failures: {} start URLs failed, {} URLs skipped",
                        report.failed_seeds.len(),
                        report.skipped_urls
                    );
                }
                Ok(report)
            }
            Err(Error::Timeout(limit)) if config.output.render_partial_on_timeout => {
                match crawler
                    .aggregator()
                    .generate_output(meta, &config.output_file)
                {
                    Ok(document) => ::log::warn!(
                        "Timed out; wrote partial output with {} pages to {}",
                        document.pages.len(),
                        config.output_file
                    ),
                    Err(e) => ::log::error!("Timed out and could not write partial output: {}", e),
                }
                Err(Error::Timeout(limit))
            }
            Err(e) => Err(e),
        }
    }
}
