use crate::config::Config;
use crate::error::{Error, FetchError, Result};
use async_trait::async_trait;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use reqwest::redirect::Policy;
use std::time::Duration;
use url::Url;

/// Redirects followed before a request fails
const MAX_REDIRECTS: usize = 5;

/// A fetched document
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub url: Url,
    pub body: String,
}

/// Retrieves a single document. Implementations must be shareable across
/// workers.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> std::result::Result<FetchedPage, FetchError>;
}

/// Spaces out requests to the same host: one request per `delay` per host
#[derive(Debug)]
pub struct Throttle<C: Clock = DefaultClock> {
    /// `None` when the delay is zero
    limiter: Option<RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<C::Instant>>>,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self {
            limiter: Quota::with_period(delay).map(RateLimiter::keyed),
        }
    }

    /// Wait until this host may be requested again
    pub async fn wait(&self, url: &Url) {
        if let Some(limiter) = &self.limiter {
            let host = url.host_str().unwrap_or_default().to_string();
            limiter.until_key_ready(&host).await;
        }
    }
}

impl<C: Clock> Throttle<C> {
    /// Throttle driven by a custom clock
    pub fn with_clock(delay: Duration, clock: C) -> Self {
        Self {
            limiter: Quota::with_period(delay)
                .map(|quota| RateLimiter::new(quota, DefaultKeyedStateStore::default(), clock)),
        }
    }

    /// Take this host's slot if it is free, without waiting
    pub fn try_acquire(&self, host: &str) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check_key(&host.to_string()).is_ok(),
            None => true,
        }
    }
}

/// reqwest-backed fetcher with a size limit and per-host throttling
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_size: u64,
    throttle: Throttle,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.processing.user_agent.clone())
            .timeout(config.security.request_timeout())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_body_size: config.security.max_file_size_bytes()?,
            throttle: Throttle::new(config.processing.delay()),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<FetchedPage, FetchError> {
        self.throttle.wait(url).await;
        ::log::debug!("GET {}", url);

        let mut response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(size) = response.content_length() {
            if size > self.max_body_size {
                return Err(FetchError::TooLarge {
                    size,
                    limit: self.max_body_size,
                });
            }
        }

        let final_url = response.url().clone();
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            // Content-Length may be absent or wrong
            if body.len() as u64 > self.max_body_size {
                return Err(FetchError::TooLarge {
                    size: body.len() as u64,
                    limit: self.max_body_size,
                });
            }
        }

        Ok(FetchedPage {
            url: final_url,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> Config {
        let mut config = Config::for_url("https://example.com/docs", 2, 1, None).unwrap();
        config.processing.delay = 0.0;
        config
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Docs</h1>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/docs", server.uri())).unwrap();
        let page = fetcher.fetch(&url).await.unwrap();

        assert_eq!(page.body, "<h1>Docs</h1>");
        assert_eq!(page.url, url);
    }

    #[tokio::test]
    async fn test_fetch_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/down", server.uri())).unwrap();

        assert!(matches!(fetcher.fetch(&url).await, Err(FetchError::Status(503))));
    }

    #[tokio::test]
    async fn test_fetch_follows_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("Location", format!("{}/new", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
        let page = fetcher.fetch(&url).await.unwrap();

        assert_eq!(page.url.path(), "/new");
        assert_eq!(page.body, "moved");
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&server)
            .await;

        let mut config = test_config();
        config.security.max_file_size = "1KB".to_string();
        let fetcher = HttpFetcher::new(&config).unwrap();
        let url = Url::parse(&format!("{}/big", server.uri())).unwrap();

        assert!(matches!(
            fetcher.fetch(&url).await,
            Err(FetchError::TooLarge { limit: 1024, .. })
        ));
    }

    #[test]
    fn test_throttle_spaces_same_host() {
        let clock = FakeRelativeClock::default();
        let throttle = Throttle::with_clock(Duration::from_secs(2), clock.clone());

        assert!(throttle.try_acquire("a.example.com"));
        assert!(throttle.try_acquire("b.example.com"));
        assert!(!throttle.try_acquire("a.example.com"));

        clock.advance(Duration::from_secs(1));
        assert!(!throttle.try_acquire("a.example.com"));

        clock.advance(Duration::from_secs(1));
        assert!(throttle.try_acquire("a.example.com"));
    }

    #[tokio::test]
    async fn test_zero_delay_never_throttles() {
        let throttle = Throttle::new(Duration::ZERO);
        let url = Url::parse("https://a.example.com/1").unwrap();
        for _ in 0..5 {
            throttle.wait(&url).await;
        }
        assert!(throttle.try_acquire("a.example.com"));
    }
}
