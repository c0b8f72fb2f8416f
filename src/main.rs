//! Repo-Trawler main entry point
//!
//! This is the command-line interface for the Repo-Trawler GitHub crawler.

use anyhow::Context as _;
use clap::Parser;
use repo_trawler::config::{load_config_with_hash, Config};
use repo_trawler::output::{print_statistics, JsonlSink};
use repo_trawler::repo::read_repos;
use repo_trawler::{Coordinator, CrawlStatistics, GithubTransport, RepoRef, Sink};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Repo-Trawler: a crawler for paginated GitHub repository metadata
///
/// Reads repositories (`owner/name`, GitHub URLs, or JSON lines with a
/// `repo_url` field) one per line and writes every fetched page as a JSON
/// line.
#[derive(Parser, Debug)]
#[command(name = "repo-trawler")]
#[command(version)]
#[command(about = "A crawler for paginated GitHub repository metadata", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Repositories to crawl, one per line ("-" for stdin)
    #[arg(short, long, value_name = "INFILE", default_value = "-")]
    infile: String,

    /// Write records here instead of stdout
    #[arg(short, long, value_name = "OUTFILE")]
    outfile: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and print the first-page queries without crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let transport = Arc::new(GithubTransport::from_config(&config.github)?);
    let shutdown = CancellationToken::new();
    let coordinator = Coordinator::new(&config, transport).with_shutdown(shutdown.clone());

    let input = open_input(&cli.infile)?;

    if cli.dry_run {
        return handle_dry_run(&config, &coordinator, input);
    }

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping after the current page");
                shutdown.cancel();
            }
        }
    });

    let mut sink: Box<dyn Sink> = match &cli.outfile {
        Some(path) => Box::new(
            JsonlSink::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(JsonlSink::stdout()),
    };

    let failures = handle_crawl(&coordinator, input, &mut sink, &shutdown).await;
    if failures > 0 {
        anyhow::bail!("{} repositories failed to crawl", failures);
    }
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr; stdout carries records.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("repo_trawler=info,warn"),
            1 => EnvFilter::new("repo_trawler=debug,info"),
            2 => EnvFilter::new("repo_trawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_input(infile: &str) -> anyhow::Result<Box<dyn BufRead>> {
    if infile == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(infile).with_context(|| format!("failed to open {}", infile))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Handles the --dry-run mode: shows what would be requested first
fn handle_dry_run(
    config: &Config,
    coordinator: &Coordinator,
    input: Box<dyn BufRead>,
) -> anyhow::Result<()> {
    println!("=== Repo-Trawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Max attempts: {}", config.crawler.max_attempts);
    println!(
        "  Backoff: {}ms..{}ms (jitter {})",
        config.crawler.backoff_base_ms, config.crawler.backoff_max_ms, config.crawler.jitter
    );

    println!("\nEnabled Resources:");
    for kind in config.enabled_kinds() {
        println!("  - {}", kind);
    }

    println!("\nGitHub:");
    println!("  Endpoint: {}", config.github.endpoint);
    println!("  User agent: {}", config.github.user_agent);

    let mut repos = 0;
    for repo in read_repos(input) {
        let repo = match repo {
            Ok(repo) => repo,
            Err(e) => {
                println!("\n! Skipping input line: {}", e);
                continue;
            }
        };
        repos += 1;
        println!("\n--- {} ---", repo);
        for request in coordinator.seed_requests(&repo)? {
            println!("# {}", request.resource().kind);
            println!("{}", request.query());
        }
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would crawl {} repositories", repos);

    Ok(())
}

/// Handles the main crawl operation
///
/// Returns the number of repositories whose crawl failed.
async fn handle_crawl(
    coordinator: &Coordinator,
    input: Box<dyn BufRead>,
    sink: &mut Box<dyn Sink>,
    shutdown: &CancellationToken,
) -> usize {
    let mut totals = CrawlStatistics::default();
    let mut crawled = 0;
    let mut failures = 0;

    for repo in read_repos(input) {
        if shutdown.is_cancelled() {
            break;
        }

        let repo: RepoRef = match repo {
            Ok(repo) => repo,
            Err(e) => {
                tracing::warn!("Skipping input line: {}", e);
                failures += 1;
                continue;
            }
        };

        match coordinator.run(&repo, sink.as_mut()).await {
            Ok(stats) => {
                crawled += 1;
                totals.absorb(&stats);
            }
            Err(e) => {
                tracing::error!("Crawl of {} failed: {}", repo, e);
                failures += 1;
            }
        }
    }

    tracing::info!(
        "Crawled {} repositories ({} failed)",
        crawled,
        failures
    );
    print_statistics(&totals);
    failures
}
