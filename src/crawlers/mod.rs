pub mod fetcher;
pub mod retry;
pub mod web;

pub use fetcher::{FetchedPage, Fetcher, HttpFetcher, Throttle};
pub use retry::{backoff_delay, visit_with_retry};
pub use web::Crawler;
