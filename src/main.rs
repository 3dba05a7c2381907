use clap::Parser;
use docs_bundler::{Config, DocBundle, Error};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

mod args;
use args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.monitoring.log_level.as_str()),
    )
    .init();

    ::log::info!("Crawling '{}' into {}", config.name, config.output_file);

    let mut bundle = DocBundle::new(config).with_partial_output(args.partial);
    if let Some(timeout) = args.timeout {
        bundle = bundle.with_total_timeout(timeout);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ::log::warn!("Interrupted, stopping crawl");
            on_signal.cancel();
        }
    });

    let start_time = std::time::Instant::now();
    match bundle.generate(cancel).await {
        Ok(report) => {
            ::log::info!(
                "Finished in {:.2} seconds",
                start_time.elapsed().as_secs_f64()
            );
            println!(
                "Wrote {} pages to {}",
                report.pages,
                report.output_file.unwrap_or_default()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            ::log::debug!("Stopped after {:.2} seconds", start_time.elapsed().as_secs_f64());
            eprintln!("{}", failure_message(&e));
            ExitCode::FAILURE
        }
    }
}

/// Run-level failures read differently from a single bad input
fn failure_message(e: &Error) -> String {
    if e.is_fatal() {
        format!("Crawl aborted: {}", e)
    } else {
        format!("Error: {}", e)
    }
}

/// Config file when given, otherwise the quick-mode configuration for the URL
fn load_config(args: &Args) -> docs_bundler::Result<Config> {
    let mut config = match (&args.config, &args.url) {
        (Some(path), _) => Config::from_file(path)?,
        (None, Some(url)) => {
            Config::for_url(url, args.depth, args.concurrency, args.output.as_deref())?
        }
        (None, None) => {
            return Err(Error::Config("a URL or --config is required".to_string()));
        }
    };

    if let Some(output) = &args.output {
        config.output_file = output.clone();
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_failure_message() {
        assert!(failure_message(&Error::Cancelled).starts_with("Crawl aborted: "));
        assert!(failure_message(&Error::Timeout(Duration::from_secs(5))).starts_with("Crawl aborted: "));
        assert_eq!(failure_message(&Error::NoPages), "Error: no pages to aggregate");
    }
}
