use crate::config::{Config, compile_patterns};
use crate::error::Result;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Path segments that never lead to documentation
const NON_DOC_SEGMENTS: &[&str] = &[
    "privacy",
    "terms",
    "legal",
    "cookies",
    "gdpr",
    "about",
    "contact",
    "support",
    "careers",
    "jobs",
    "blog",
    "news",
    "press",
    "media",
    "pricing",
    "enterprise",
    "commercial",
    "sales",
    "login",
    "signup",
    "register",
    "account",
    "profile",
    "404",
    "error",
    "maintenance",
    "status",
];

/// `/segment` followed by the end of the URL or a path/query/fragment delimiter
static NON_DOC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = NON_DOC_SEGMENTS.join("|");
    Regex::new(&format!(r"(?i)/({})($|[/?#])", alternatives))
        .expect("non-documentation pattern should be valid")
});

/// Configuration for URL filtering in crawlers
#[derive(Debug, Clone, Default)]
pub struct LinkFilterConfig {
    /// Hosts that may be crawled, matched exactly or as a parent domain.
    /// Empty means any host.
    pub allowed_domains: Vec<String>,

    /// Regex patterns for URLs to follow (if empty, all URLs are followed unless ignored)
    pub follow_patterns: Vec<String>,

    /// Regex patterns for URLs to ignore (these take precedence over follow patterns)
    pub ignore_patterns: Vec<String>,
}

impl From<&Config> for LinkFilterConfig {
    fn from(config: &Config) -> Self {
        Self {
            allowed_domains: config.security.allowed_domains.clone(),
            follow_patterns: config.follow_patterns.clone(),
            ignore_patterns: config.ignore_patterns.clone(),
        }
    }
}

/// Why a URL was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Not an http(s) URL
    Scheme,
    /// Privacy/legal/marketing heuristic
    NonDocumentation,
    /// Matched an ignore pattern
    Ignored,
    /// Follow patterns exist and none matched
    NotFollowed,
    /// Host outside the allow-list
    Domain,
}

/// Decides which discovered URLs are worth fetching
#[derive(Debug)]
pub struct LinkFilter {
    config: LinkFilterConfig,
    follow_regexes: Vec<Regex>,
    ignore_regexes: Vec<Regex>,
}

impl LinkFilter {
    /// Create a new link filter, compiling every pattern up front
    pub fn new(mut config: LinkFilterConfig) -> Result<Self> {
        // Hosts come out of `Url` lower-cased
        for domain in &mut config.allowed_domains {
            *domain = domain.to_ascii_lowercase();
        }
        let follow_regexes = compile_patterns("follow", &config.follow_patterns)?;
        let ignore_regexes = compile_patterns("ignore", &config.ignore_patterns)?;

        Ok(Self {
            config,
            follow_regexes,
            ignore_regexes,
        })
    }

    /// Determine if a discovered URL should be crawled
    pub fn should_crawl(&self, url: &Url) -> bool {
        match self.check(url) {
            Ok(()) => true,
            Err(reason) => {
                ::log::trace!("Link filter rejected {} ({:?})", url, reason);
                false
            }
        }
    }

    /// Run every rule and report the first one that rejects the URL
    pub fn check(&self, url: &Url) -> std::result::Result<(), Rejection> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Rejection::Scheme);
        }
        self.check_patterns(url.as_str())?;
        if !self.is_allowed_domain(url) {
            return Err(Rejection::Domain);
        }
        Ok(())
    }

    /// Heuristic, ignore and follow rules, in that order
    fn check_patterns(&self, url: &str) -> std::result::Result<(), Rejection> {
        // Heuristic wins even over an explicit follow pattern
        if is_non_documentation(url) {
            return Err(Rejection::NonDocumentation);
        }

        if self.ignore_regexes.iter().any(|re| re.is_match(url)) {
            return Err(Rejection::Ignored);
        }

        if !self.follow_regexes.is_empty() && !self.follow_regexes.iter().any(|re| re.is_match(url))
        {
            return Err(Rejection::NotFollowed);
        }

        Ok(())
    }

    /// Check the host against the allow-list: exact match or a strict subdomain
    pub fn is_allowed_domain(&self, url: &Url) -> bool {
        if self.config.allowed_domains.is_empty() {
            return true;
        }

        let Some(host) = url.host_str() else {
            return false;
        };

        self.config
            .allowed_domains
            .iter()
            .any(|domain| host_matches(host, domain))
    }

    /// Strip the fragment so `page#a` and `page#b` are the same page
    pub fn normalize_url(url: &Url) -> Url {
        let mut normalized = url.clone();
        normalized.set_fragment(None);
        normalized
    }
}

/// `host == domain` or `host` ends with `.domain`
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Privacy, legal, account and marketing pages
pub fn is_non_documentation(url: &str) -> bool {
    NON_DOC_PATTERN.is_match(url)
}
