use super::fetcher::{FetchedPage, Fetcher, HttpFetcher};
use super::retry::visit_with_retry;
use crate::aggregate::Aggregator;
use crate::config::Config;
use crate::convert::Converter;
use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::filter::LinkFilter;
use crate::results::{Page, RunReport};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Log a progress line every this many pages
const PROGRESS_INTERVAL: usize = 10;

/// A URL admitted to the pool
#[derive(Debug, Clone)]
struct Job {
    url: Url,
    depth: usize,
    seed: bool,
}

/// Failure bookkeeping for one run
#[derive(Debug, Default)]
struct RunStats {
    fetched_seeds: usize,
    failed_seeds: Vec<(String, String)>,
    skipped_urls: usize,
}

/// Channel-fed job queue shared by every worker
#[derive(Clone)]
struct Pool {
    tx: mpsc::UnboundedSender<Job>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    /// Admitted jobs not yet finished
    pending: Arc<AtomicUsize>,
    /// Cancelled once `pending` reaches zero
    drain: CancellationToken,
    /// Cancelled on deadline or caller cancellation
    stop: CancellationToken,
}

impl Pool {
    fn new(stop: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            pending: Arc::new(AtomicUsize::new(0)),
            drain: CancellationToken::new(),
            stop,
        }
    }

    fn admit(&self, job: Job) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.finish_one();
        }
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            ::log::debug!("Crawl queue drained");
            self.drain.cancel();
        }
    }

    /// Next job, or `None` once the queue is drained or the run stopped
    async fn next(&self) -> Option<Job> {
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => None,
            _ = self.drain.cancelled() => None,
            job = async { self.rx.lock().await.recv().await } => job,
        }
    }
}

/// One crawl of a documentation site: visited set, page counter and the
/// aggregator that collects the results.
pub struct Crawler {
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    filter: LinkFilter,
    extractor: Extractor,
    converter: Converter,
    aggregator: Arc<Aggregator>,
    visited: Mutex<HashSet<String>>,
    page_count: AtomicUsize,
    stats: std::sync::Mutex<RunStats>,
}

impl Crawler {
    /// Build a crawler that fetches over HTTP
    pub fn from_config(config: Config) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        Self::new(config, fetcher)
    }

    /// Build a crawler around any fetch collaborator
    pub fn new(config: Config, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        Ok(Self {
            filter: LinkFilter::new((&config).into())?,
            extractor: Extractor::new(&config.selectors)?,
            converter: Converter::new(&config),
            aggregator: Arc::new(Aggregator::new(config.processing.max_pages_in_memory)),
            visited: Mutex::new(HashSet::new()),
            page_count: AtomicUsize::new(0),
            stats: std::sync::Mutex::new(RunStats::default()),
            fetcher,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Pages extracted and kept so far
    pub fn page_count(&self) -> usize {
        self.page_count.load(Ordering::Relaxed)
    }

    /// The aggregator receiving this crawl's pages
    pub fn aggregator(&self) -> Arc<Aggregator> {
        Arc::clone(&self.aggregator)
    }

    /// Crawl from every start URL until the queue drains.
    ///
    /// Fails with [`Error::Timeout`] once `security.scraping_timeout_secs`
    /// elapses, [`Error::Cancelled`] when `cancel` fires, and
    /// [`Error::AllSeedsFailed`] when no start URL could be fetched.
    pub async fn run(self: &Arc<Self>, cancel: CancellationToken) -> Result<RunReport> {
        let timeout = self.config.security.scraping_timeout();
        let pool = Pool::new(cancel.child_token());

        ::log::info!(
            "Starting crawl of '{}' with {} workers (max depth {})",
            self.config.name,
            self.config.processing.concurrency,
            self.config.processing.max_depth
        );

        self.admit_seeds(&pool).await;
        if pool.pending.load(Ordering::SeqCst) == 0 {
            pool.drain.cancel();
        }

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.processing.concurrency.max(1) {
            let crawler = Arc::clone(self);
            let pool = pool.clone();
            workers.spawn(async move { crawler.worker(worker_id, pool).await });
        }

        let stopped = tokio::select! {
            biased;
            _ = cancel.cancelled() => Some(Error::Cancelled),
            _ = pool.drain.cancelled() => None,
            _ = tokio::time::sleep(timeout) => Some(Error::Timeout(timeout)),
        };

        if stopped.is_some() {
            pool.stop.cancel();
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                ::log::error!("Crawl worker failed: {}", e);
            }
        }

        if let Some(err) = stopped {
            ::log::warn!(
                "Crawl stopped early with {} pages collected: {}",
                self.aggregator.page_count(),
                err
            );
            return Err(err);
        }

        let stats = std::mem::take(&mut *self.lock_stats());
        if stats.fetched_seeds == 0 {
            return Err(Error::AllSeedsFailed(stats.failed_seeds));
        }

        let report = RunReport {
            pages: self.aggregator.page_count(),
            failed_seeds: stats.failed_seeds,
            skipped_urls: stats.skipped_urls,
            output_file: None,
        };
        ::log::info!(
            "Crawl complete: {} pages, {} skipped URLs, {} failed start URLs",
            report.pages,
            report.skipped_urls,
            report.failed_seeds.len()
        );
        Ok(report)
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, RunStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start URLs skip the pattern filter but are still visited only once
    async fn admit_seeds(&self, pool: &Pool) {
        for raw in &self.config.start_urls {
            let url = match Url::parse(raw) {
                Ok(url) => LinkFilter::normalize_url(&url),
                Err(e) => {
                    self.lock_stats()
                        .failed_seeds
                        .push((raw.clone(), e.to_string()));
                    continue;
                }
            };

            if self.mark_visited(&url).await {
                pool.admit(Job {
                    url,
                    depth: 0,
                    seed: true,
                });
            } else {
                ::log::debug!("Skipping duplicate start URL: {}", raw);
            }
        }
    }

    /// Atomic check-and-set; true when `url` had not been seen
    async fn mark_visited(&self, url: &Url) -> bool {
        self.visited.lock().await.insert(url.to_string())
    }

    async fn worker(&self, worker_id: usize, pool: Pool) {
        ::log::trace!("Worker {} started", worker_id);

        while let Some(job) = pool.next().await {
            ::log::trace!("Worker {} processing: {}", worker_id, job.url);
            self.process(job, &pool).await;
            pool.finish_one();
        }

        ::log::trace!("Worker {} finished", worker_id);
    }

    async fn process(&self, job: Job, pool: &Pool) {
        let fetched = tokio::select! {
            biased;
            _ = pool.stop.cancelled() => return,
            result = visit_with_retry(
                self.fetcher.as_ref(),
                &job.url,
                self.config.processing.max_retries,
            ) => result,
        };

        let fetched = match fetched {
            Ok(page) => page,
            Err(e) => {
                let mut stats = self.lock_stats();
                if job.seed {
                    ::log::error!("Start URL failed: {}", e);
                    stats.failed_seeds.push((job.url.to_string(), e.to_string()));
                } else {
                    ::log::warn!("Skipping {}: {}", job.url, e);
                    stats.skipped_urls += 1;
                }
                return;
            }
        };
        if job.seed {
            self.lock_stats().fetched_seeds += 1;
        }

        if !self.filter.is_allowed_domain(&fetched.url) {
            ::log::warn!(
                "Skipping {}: redirected outside allowed domains to {}",
                job.url,
                fetched.url
            );
            self.lock_stats().skipped_urls += 1;
            return;
        }

        let final_url = LinkFilter::normalize_url(&fetched.url);
        if final_url != job.url {
            // Later links to the redirect target are not fetched again
            self.mark_visited(&final_url).await;
        }

        let links = self.collect_page(&job, &final_url, &fetched);

        if job.depth >= self.config.processing.max_depth {
            return;
        }
        for link in links {
            if pool.stop.is_cancelled() {
                return;
            }
            if !self.filter.should_crawl(&link) {
                continue;
            }
            if self.mark_visited(&link).await {
                ::log::debug!("Queuing {} at depth {}", link, job.depth + 1);
                pool.admit(Job {
                    url: link,
                    depth: job.depth + 1,
                    seed: false,
                });
            }
        }
    }

    /// Extract, convert and aggregate one fetched page. Returns its links.
    fn collect_page(&self, job: &Job, url: &Url, fetched: &FetchedPage) -> Vec<Url> {
        let extracted = self.extractor.extract(&fetched.body, url);

        if !extracted.has_content() {
            ::log::warn!("No content extracted from {}", url);
            self.lock_stats().skipped_urls += 1;
            return extracted.links;
        }

        match self.converter.convert(url.as_str(), &extracted.content) {
            Ok(markdown) => {
                let page = Page::new(
                    url.as_str(),
                    extracted.title.as_str(),
                    extracted.content.as_str(),
                    markdown,
                    job.depth,
                );
                if self.aggregator.add_page(page) {
                    let count = self.page_count.fetch_add(1, Ordering::Relaxed) + 1;
                    ::log::debug!("Collected '{}' from {}", extracted.title, url);
                    if self.config.monitoring.progress_updates && count % PROGRESS_INTERVAL == 0 {
                        ::log::info!("Progress: {} pages collected", count);
                    }
                }
            }
            Err(e) => {
                ::log::warn!("Skipping {}", e);
                self.lock_stats().skipped_urls += 1;
            }
        }

        extracted.links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Serves canned pages keyed by URL and records every request
    #[derive(Default)]
    struct MapFetcher {
        pages: HashMap<String, String>,
        redirects: HashMap<String, String>,
        calls: std::sync::Mutex<Vec<String>>,
    }

    impl MapFetcher {
        fn page(mut self, url: &str, title: &str, body: &str, links: &[&str]) -> Self {
            let anchors: String = links
                .iter()
                .map(|href| format!(r#"<a href="{}">link</a>"#, href))
                .collect();
            self.pages.insert(
                url.to_string(),
                format!(
                    "<html><head><title>{}</title></head><body><nav>menu</nav>\
                     <main><p>{}</p>{}</main></body></html>",
                    title, body, anchors
                ),
            );
            self
        }

        fn raw(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        fn redirect(mut self, from: &str, to: &str) -> Self {
            self.redirects.insert(from.to_string(), to.to_string());
            self
        }

        fn calls_for(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
        }
    }

    #[async_trait]
    impl Fetcher for MapFetcher {
        async fn fetch(&self, url: &Url) -> std::result::Result<FetchedPage, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            let target = self
                .redirects
                .get(url.as_str())
                .cloned()
                .unwrap_or_else(|| url.to_string());
            match self.pages.get(&target) {
                Some(body) => Ok(FetchedPage {
                    url: Url::parse(&target).unwrap(),
                    body: body.clone(),
                }),
                None => Err(FetchError::Status(404)),
            }
        }
    }

    /// Never answers within any reasonable time
    struct SlowFetcher;

    #[async_trait]
    impl Fetcher for SlowFetcher {
        async fn fetch(&self, _url: &Url) -> std::result::Result<FetchedPage, FetchError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(FetchError::Status(504))
        }
    }

    fn test_config(seeds: &[&str], max_depth: usize) -> Config {
        let mut config = Config::for_url("https://docs.example.com/docs", max_depth, 3, None).unwrap();
        config.start_urls = seeds.iter().map(|s| s.to_string()).collect();
        config.processing.max_retries = 1;
        config.processing.delay = 0.0;
        config
    }

    fn crawler(config: Config, fetcher: Arc<dyn Fetcher>) -> Arc<Crawler> {
        Arc::new(Crawler::new(config, fetcher).unwrap())
    }

    const ROOT: &str = "https://docs.example.com/docs/";
    const A: &str = "https://docs.example.com/docs/a";
    const B: &str = "https://docs.example.com/docs/b";

    #[tokio::test]
    async fn test_depth_limit() {
        let fetcher = Arc::new(
            MapFetcher::default()
                .page(ROOT, "Root", "root body", &["/docs/a"])
                .page(A, "A", "a body", &["/docs/b"])
                .page(B, "B", "b body", &[]),
        );
        let crawler = crawler(test_config(&[ROOT], 1), fetcher.clone());

        let report = crawler.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(fetcher.calls_for(A), 1);
        assert_eq!(fetcher.calls_for(B), 0);
    }

    #[tokio::test]
    async fn test_each_url_fetched_once() {
        let fetcher = Arc::new(
            MapFetcher::default()
                .page(ROOT, "Root", "root body", &["/docs/a", "/docs/b", "/docs/a#intro"])
                .page(A, "A", "a body", &["/docs/b", "/docs/"])
                .page(B, "B", "b body", &["/docs/a", "/docs/"]),
        );
        let crawler = crawler(test_config(&[ROOT, ROOT], 5), fetcher.clone());

        let report = crawler.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.pages, 3);
        assert_eq!(crawler.page_count(), 3);
        for url in [ROOT, A, B] {
            assert_eq!(fetcher.calls_for(url), 1, "{} fetched more than once", url);
        }
    }

    #[tokio::test]
    async fn test_pages_aggregated_with_depth() {
        let fetcher = Arc::new(
            MapFetcher::default()
                .page(ROOT, "Root", "root body", &["/docs/a"])
                .page(A, "A", "a body", &[]),
        );
        let crawler = crawler(test_config(&[ROOT], 3), fetcher);
        crawler.run(CancellationToken::new()).await.unwrap();

        let meta = crate::aggregate::DocumentMeta::from(crawler.config());
        let document = crawler.aggregator().finish(meta).unwrap();
        let pages: Vec<(&str, &str, usize)> = document
            .pages
            .iter()
            .map(|p| (p.url.as_str(), p.title.as_str(), p.depth))
            .collect();
        assert_eq!(pages, vec![(ROOT, "Root", 0), (A, "A", 1)]);
        assert!(!document.pages[0].markdown.contains("menu"));
    }

    #[tokio::test]
    async fn test_empty_page_skipped_without_retry_but_links_followed() {
        let fetcher = Arc::new(
            MapFetcher::default()
                .raw(
                    ROOT,
                    r#"<html><head><title>Root</title></head><body>
                       <nav><a href="/docs/a">A</a></nav><main>   </main>
                       </body></html>"#,
                )
                .page(A, "A", "a body", &[]),
        );
        let mut config = test_config(&[ROOT], 3);
        config.processing.max_retries = 3;
        let crawler = crawler(config, fetcher.clone());

        let report = crawler.run(CancellationToken::new()).await.unwrap();

        assert_eq!(fetcher.calls_for(ROOT), 1);
        assert_eq!(report.skipped_urls, 1);
        assert_eq!(fetcher.calls_for(A), 1);
        assert_eq!(report.pages, 1);
        assert!(report.failed_seeds.is_empty());

        let meta = crate::aggregate::DocumentMeta::from(crawler.config());
        let document = crawler.aggregator().finish(meta).unwrap();
        assert_eq!(document.pages[0].url, A);
    }

    #[tokio::test]
    async fn test_filtered_links_not_fetched() {
        let fetcher = Arc::new(MapFetcher::default().page(
            ROOT,
            "Root",
            "root body",
            &["/privacy", "https://other.example.org/docs", "/docs/logo.png", "mailto:x@y.z"],
        ));
        let crawler = crawler(test_config(&[ROOT], 3), fetcher.clone());

        crawler.run(CancellationToken::new()).await.unwrap();

        assert_eq!(fetcher.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_content_collapsed() {
        let fetcher = Arc::new(
            MapFetcher::default()
                .page(ROOT, "Root", "same body", &["/docs/a"])
                .page(A, "Root", "same body", &["/docs/a"]),
        );
        let crawler = crawler(test_config(&[ROOT], 3), fetcher.clone());

        let report = crawler.run(CancellationToken::new()).await.unwrap();

        assert_eq!(fetcher.calls_for(A), 1);
        assert_eq!(report.pages, 1);
    }

    #[tokio::test]
    async fn test_all_seeds_failed() {
        let fetcher = Arc::new(MapFetcher::default());
        let crawler = crawler(test_config(&[ROOT, A], 3), fetcher);

        match crawler.run(CancellationToken::new()).await {
            Err(Error::AllSeedsFailed(failed)) => assert_eq!(failed.len(), 2),
            other => panic!("expected AllSeedsFailed, got {:?}", other.map(|r| r.pages)),
        }
    }

    #[tokio::test]
    async fn test_partial_seed_failure_reported() {
        let fetcher = Arc::new(MapFetcher::default().page(ROOT, "Root", "root body", &[]));
        let crawler = crawler(test_config(&[ROOT, A], 3), fetcher);

        let report = crawler.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(report.failed_seeds.len(), 1);
        assert_eq!(report.failed_seeds[0].0, A);
        assert!(report.has_partial_failures());
    }

    #[tokio::test]
    async fn test_missing_link_counted_as_skipped() {
        let fetcher =
            Arc::new(MapFetcher::default().page(ROOT, "Root", "root body", &["/docs/missing"]));
        let crawler = crawler(test_config(&[ROOT], 3), fetcher);

        let report = crawler.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.skipped_urls, 1);
        assert!(report.failed_seeds.is_empty());
    }

    #[tokio::test]
    async fn test_redirect_off_domain_skipped() {
        let fetcher = Arc::new(
            MapFetcher::default()
                .page(ROOT, "Root", "root body", &["/docs/moved"])
                .page("https://elsewhere.org/landing", "Elsewhere", "foreign body", &[])
                .redirect("https://docs.example.com/docs/moved", "https://elsewhere.org/landing"),
        );
        let crawler = crawler(test_config(&[ROOT], 3), fetcher);

        let report = crawler.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(report.skipped_urls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_fatal() {
        let mut config = test_config(&[ROOT], 3);
        config.security.scraping_timeout_secs = 5;
        let crawler = crawler(config, Arc::new(SlowFetcher));

        let result = crawler.run(CancellationToken::new()).await;

        assert!(matches!(result, Err(Error::Timeout(d)) if d == Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation() {
        let crawler = crawler(test_config(&[ROOT], 3), Arc::new(SlowFetcher));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        assert!(matches!(crawler.run(cancel).await, Err(Error::Cancelled)));
    }
}
