use crate::error::{Error, Result};
use crate::utils;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Top-level configuration for one documentation bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Human-readable name used as the document heading
    pub name: String,

    /// Base URL of the documentation site, shown in the metadata header
    pub base_url: String,

    /// Path of the Markdown file to write
    pub output_file: String,

    /// Seed URLs, crawled in order
    pub start_urls: Vec<String>,

    /// Regex patterns a discovered URL must match (if any are given)
    #[serde(default)]
    pub follow_patterns: Vec<String>,

    /// Regex patterns that reject a discovered URL
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    #[serde(default)]
    pub selectors: SelectorConfig,

    #[serde(default)]
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// CSS selectors used to pull content out of each page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Selector for the page title, tried before `<title>`
    #[serde(default = "default_title_selector")]
    pub title: String,

    /// Selector (group) for the content containers
    #[serde(default = "default_content_selector")]
    pub content: String,

    /// Selectors removed from inside every content container
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Crawl behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Links are followed only from pages shallower than this
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Number of concurrent workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Delay in seconds between requests to the same domain
    #[serde(default = "default_delay")]
    pub delay: f64,

    /// Attempts per URL before it is skipped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Emit a table of contents after the metadata header
    #[serde(default = "default_true")]
    pub generate_toc: bool,

    /// Run extracted HTML through the allow-list sanitizer before rendering
    #[serde(default = "default_true")]
    pub sanitize_html: bool,

    /// Page count after which a memory warning is logged
    #[serde(default = "default_max_pages_in_memory")]
    pub max_pages_in_memory: usize,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Rendering options for the final document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Emit the metadata header and per-page source lines
    #[serde(default = "default_true")]
    pub include_metadata: bool,

    /// Keep `<img>` elements when sanitizing
    #[serde(default)]
    pub preserve_images: bool,

    /// Keep `style` attributes when sanitizing
    #[serde(default)]
    pub inline_styles: bool,

    /// Still write the pages collected so far when the crawl times out
    #[serde(default)]
    pub render_partial_on_timeout: bool,
}

/// Limits applied to the crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Hosts allowed to be crawled (exact or subdomain); empty allows all
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Maximum response size, e.g. `10MB`
    #[serde(default = "default_max_file_size")]
    pub max_file_size: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Deadline for the whole crawl in seconds
    #[serde(default = "default_scraping_timeout")]
    pub scraping_timeout_secs: u64,
}

/// Logging and progress reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Default log filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log a progress line every ten aggregated pages
    #[serde(default = "default_true")]
    pub progress_updates: bool,
}

/// Title selector used in quick mode
const QUICK_TITLE_SELECTOR: &str = "h1, title, .page-title, .doc-title, [data-testid='page-title']";

/// Content containers tried in quick mode; `<body>` is the extractor's fallback
const QUICK_CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    ".content",
    ".documentation",
    ".docs",
    "#content",
    ".main-content",
    ".doc-content",
    ".docs-content",
    ".documentation-content",
    ".guide-content",
    ".tutorial-content",
    ".reference-content",
    ".api-content",
    ".markdown-body",
    // Site generators
    ".docusaurus_skipToContent_node",
    ".nextra-content",
    ".vuepress-content",
    ".gitbook-content",
    ".notion-page-content",
    ".sphinx-content",
    "[role='main']",
    "[data-content]",
    ".page-content",
    ".post-content",
    ".entry-content",
    ".single-content",
    "#main-content",
    "#primary-content",
];

/// Links never followed in quick mode
const QUICK_IGNORE_PATTERNS: &[&str] = &[
    r".*\.(jpg|jpeg|png|gif|svg|css|js|ico|woff|woff2|ttf|eot|pdf|zip|tar|gz)$",
    r".*/edit.*$",
    r".*/settings.*$",
    r".*/login.*$",
    r".*/logout.*$",
    r".*/signin.*$",
    r".*/signup.*$",
    r".*/register.*$",
    r".*/contact.*$",
    r".*/support.*$",
    r".*/pricing.*$",
    r".*/about.*$",
    r".*/careers.*$",
    r".*/jobs.*$",
    r".*/legal.*$",
    r".*/terms.*$",
    r".*/privacy.*$",
    r".*github\.com.*$",
    r".*twitter\.com.*$",
    r".*linkedin\.com.*$",
    r".*facebook\.com.*$",
    r".*youtube\.com.*$",
    r".*discord\.(gg|com).*$",
    r".*slack\.com.*$",
    r".*/admin.*$",
    r".*/dashboard.*$",
    r".*/account.*$",
    r".*/profile.*$",
    r".*/user/.*$",
    r".*/playground.*$",
    r".*/editor.*$",
    r".*/sandbox.*$",
];

/// Removed from inside content containers in quick mode
const QUICK_EXCLUDE_SELECTORS: &[&str] = &[
    "nav",
    "header",
    "footer",
    ".navigation",
    ".sidebar",
    ".toc",
    ".table-of-contents",
    ".menu",
    ".nav",
    ".navbar",
    ".topbar",
    ".breadcrumb",
    ".breadcrumbs",
    ".edit-link",
    ".edit-page",
    ".edit-this-page",
    ".feedback",
    ".prev-next",
    ".pagination",
    ".page-nav",
    ".site-nav",
    ".social",
    ".share",
    "script",
    "style",
    "noscript",
    ".highlight",
    ".code-toolbar",
    ".advertisement",
    ".ads",
    ".ad",
    ".promo",
    ".banner",
    ".cookie",
    ".comments",
    ".disqus",
    ".utterances",
    ".giscus",
    ".social-share",
    ".search",
    ".search-box",
    ".search-form",
    ".newsletter",
    ".subscribe",
    // Site-specific chrome
    ".cmdklaunch_wrapper__KrfZL",
    ".mobile-menu_root__PX9iM",
    ".toggle_mobileMenuToggle__W5y02",
    ".header_header__TSZx7",
    "[data-testid='header']",
    ".DocSearch",
    ".algolia-docsearch",
    ".version-switcher",
    ".lang-switcher",
    ".theme-switcher",
    ".locale-switcher",
];

fn default_title_selector() -> String {
    "h1".to_string()
}

fn default_content_selector() -> String {
    "main, article, .content".to_string()
}

fn default_max_depth() -> usize {
    5
}

fn default_concurrency() -> usize {
    3
}

fn default_delay() -> f64 {
    1.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_max_pages_in_memory() -> usize {
    1000
}

fn default_user_agent() -> String {
    concat!("docs-bundler/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_file_size() -> String {
    "10MB".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_scraping_timeout() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            title: default_title_selector(),
            content: default_content_selector(),
            exclude: Vec::new(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            concurrency: default_concurrency(),
            delay: default_delay(),
            max_retries: default_max_retries(),
            generate_toc: true,
            sanitize_html: true,
            max_pages_in_memory: default_max_pages_in_memory(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            include_metadata: true,
            preserve_images: false,
            inline_styles: false,
            render_partial_on_timeout: false,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            max_file_size: default_max_file_size(),
            request_timeout_secs: default_request_timeout(),
            scraping_timeout_secs: default_scraping_timeout(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            progress_updates: true,
        }
    }
}

impl Config {
    /// Load and validate a configuration file. `.yml`/`.yaml` files are read
    /// as YAML, everything else as JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::ConfigFile(format!("{}: {}", path.display(), e)))?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yml") | Some("yaml")
        );
        let config = if is_yaml {
            Self::from_yaml(&contents)?
        } else {
            Self::from_json(&contents)?
        };

        ::log::debug!("Loaded configuration '{}' from {}", config.name, path.display());
        Ok(config)
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::ConfigFile(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML configuration
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| Error::ConfigFile(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a ready-to-run configuration for a single documentation URL.
    ///
    /// A missing scheme defaults to `https`. The host becomes the only allowed
    /// domain and the output file is named after it unless `output` is given.
    pub fn for_url(
        input: &str,
        max_depth: usize,
        concurrency: usize,
        output: Option<&str>,
    ) -> Result<Self> {
        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("https://{}", input)
        };
        let url = parse_http_url(&with_scheme, "url")?;
        let host = url.host_str().unwrap_or_default().to_string();
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.clone(),
        };
        let host_pattern = regex::escape(&authority);

        let mut follow_patterns = vec![format!("^https?://{}/.*", host_pattern)];
        if url.path().contains("/docs") {
            for section in [
                "docs",
                "documentation",
                "guide",
                "guides",
                "tutorial",
                "tutorials",
                "reference",
                "api",
                "cli",
                "learn",
            ] {
                follow_patterns.push(format!("^https?://{}/{}/.*", host_pattern, section));
            }
        }

        let ignore_patterns = QUICK_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect();
        let content = QUICK_CONTENT_SELECTORS.join(", ");
        let exclude = QUICK_EXCLUDE_SELECTORS.iter().map(|s| s.to_string()).collect();

        let output_file = match output {
            Some(path) => path.to_string(),
            None => utils::output_file_for_host(&host),
        };

        let config = Self {
            name: format!("{} Documentation", utils::title_case(&host)),
            base_url: url.origin().ascii_serialization(),
            output_file,
            start_urls: vec![with_scheme],
            follow_patterns,
            ignore_patterns,
            selectors: SelectorConfig {
                title: QUICK_TITLE_SELECTOR.to_string(),
                content,
                exclude,
            },
            processing: ProcessingConfig {
                max_depth,
                concurrency,
                delay: 0.8,
                ..ProcessingConfig::default()
            },
            output: OutputConfig::default(),
            security: SecurityConfig {
                allowed_domains: vec![host],
                ..SecurityConfig::default()
            },
            monitoring: MonitoringConfig::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check every field that could make the crawl fail later
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("name is required".to_string()));
        }
        parse_http_url(&self.base_url, "base_url")?;

        if self.output_file.trim().is_empty() {
            return Err(Error::Config("output_file is required".to_string()));
        }

        if self.start_urls.is_empty() {
            return Err(Error::Config(
                "start_urls must contain at least one URL".to_string(),
            ));
        }
        for (i, start_url) in self.start_urls.iter().enumerate() {
            parse_http_url(start_url, &format!("start_urls[{}]", i))?;
        }

        compile_patterns("follow", &self.follow_patterns)?;
        compile_patterns("ignore", &self.ignore_patterns)?;

        if self.processing.max_depth == 0 {
            return Err(Error::Config("max_depth must be greater than 0".to_string()));
        }
        if self.processing.concurrency == 0 {
            return Err(Error::Config(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        if !self.processing.delay.is_finite() || self.processing.delay < 0.0 {
            return Err(Error::Config(format!(
                "delay must be non-negative, got {}",
                self.processing.delay
            )));
        }

        let domain_format = Regex::new(r"^[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").map_err(|e| {
            Error::Pattern {
                kind: "domain",
                pattern: "domain format".to_string(),
                source: e,
            }
        })?;
        for (i, domain) in self.security.allowed_domains.iter().enumerate() {
            if domain.is_empty() {
                return Err(Error::Config(format!(
                    "allowed_domains[{}] cannot be empty",
                    i
                )));
            }
            if !domain_format.is_match(domain) {
                return Err(Error::Config(format!(
                    "invalid domain format in allowed_domains[{}]: '{}'",
                    i, domain
                )));
            }
        }

        self.security.max_file_size_bytes()?;
        Ok(())
    }
}

impl ProcessingConfig {
    /// Per-domain request delay
    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay.max(0.0))
    }
}

impl SecurityConfig {
    /// Parsed `max_file_size`
    pub fn max_file_size_bytes(&self) -> Result<u64> {
        parse_size(&self.max_file_size)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn scraping_timeout(&self) -> Duration {
        Duration::from_secs(self.scraping_timeout_secs)
    }
}

/// Compile a list of regex patterns, naming the offending one on failure
pub fn compile_patterns(kind: &'static str, patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| Error::Pattern {
                kind,
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

/// Parse a size string such as `512KB`, `10MB`, `1GB` or a plain byte count
pub fn parse_size(size: &str) -> Result<u64> {
    let size = size.trim();
    if size.is_empty() {
        return Err(Error::InvalidSize(size.to_string()));
    }

    let (number, multiplier) = if let Some(n) = size.strip_suffix("KB") {
        (n, 1024)
    } else if let Some(n) = size.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = size.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else {
        (size, 1)
    };

    number
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| Error::InvalidSize(size.to_string()))
}

/// Parse a URL and require an http(s) scheme and a host
fn parse_http_url(raw: &str, field: &str) -> Result<Url> {
    if raw.trim().is_empty() {
        return Err(Error::Config(format!("{} cannot be empty", field)));
    }

    let url = Url::parse(raw).map_err(|e| Error::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::InvalidUrl {
            url: raw.to_string(),
            reason: format!("{} must use http or https", field),
        });
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidUrl {
            url: raw.to_string(),
            reason: format!("{} must include a host", field),
        });
    }

    Ok(url)
}
