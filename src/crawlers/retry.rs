use super::fetcher::{FetchedPage, Fetcher};
use crate::error::{Error, Result};
use std::time::Duration;
use url::Url;

/// Delay before the first retry
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on any single backoff
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential backoff after the `attempt`-th failure (0-based), capped
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    BASE_DELAY.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Fetch `url`, retrying failures with exponential backoff.
///
/// `max_retries` is the total number of attempts; zero is treated as one.
/// There is no sleep after the final attempt.
pub async fn visit_with_retry<F: Fetcher + ?Sized>(
    fetcher: &F,
    url: &Url,
    max_retries: u32,
) -> Result<FetchedPage> {
    let attempts = max_retries.max(1);
    let mut attempt = 0;

    loop {
        match fetcher.fetch(url).await {
            Ok(page) => {
                if attempt > 0 {
                    ::log::debug!("Fetched {} on attempt {}", url, attempt + 1);
                }
                return Ok(page);
            }
            Err(e) if attempt + 1 < attempts => {
                let delay = backoff_delay(attempt);
                ::log::warn!(
                    "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                    attempt + 1,
                    attempts,
                    url,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(source) => {
                return Err(Error::RetriesExhausted {
                    url: url.to_string(),
                    attempts,
                    source,
                });
            }
        }
    }
}
