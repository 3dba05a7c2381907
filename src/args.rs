use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "docs-bundler")]
#[command(about = "Crawl a documentation site into a single Markdown file")]
#[command(version)]
pub struct Args {
    /// Documentation URL to crawl (quick mode, no config file needed)
    pub url: Option<String>,

    /// Path to a JSON or YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Output file (defaults to <host>-docs.md in quick mode)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Maximum crawl depth in quick mode
    #[arg(short, long, default_value_t = 8)]
    pub depth: usize,

    /// Number of concurrent workers in quick mode
    #[arg(long, default_value_t = 3)]
    pub concurrency: usize,

    /// Total timeout in seconds (overrides the configuration)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Write the pages collected so far if the crawl times out
    #[arg(long)]
    pub partial: bool,
}

impl Args {
    /// Exactly one of a URL or a config file is required
    pub fn validate(&self) -> Result<(), String> {
        match (&self.url, &self.config) {
            (Some(_), Some(_)) => Err("pass either a URL or --config, not both".to_string()),
            (None, None) => Err("a URL or --config is required".to_string()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quick_mode_defaults() {
        let args = Args::parse_from(["docs-bundler", "docs.example.com"]);
        assert_eq!(args.url.as_deref(), Some("docs.example.com"));
        assert_eq!(args.depth, 8);
        assert_eq!(args.concurrency, 3);
        assert!(!args.partial);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_config_mode() {
        let args = Args::parse_from(["docs-bundler", "-c", "site.yaml", "-o", "out.md", "--timeout", "60"]);
        assert_eq!(args.config.as_deref(), Some("site.yaml"));
        assert_eq!(args.output.as_deref(), Some("out.md"));
        assert_eq!(args.timeout, Some(60));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_url_or_config_required() {
        assert!(Args::parse_from(["docs-bundler"]).validate().is_err());
        assert!(
            Args::parse_from(["docs-bundler", "https://a.example.com", "-c", "x.json"])
                .validate()
                .is_err()
        );
    }
}
