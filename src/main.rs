//! Command line entry point for release-mirror

use clap::Parser;
use release_mirror::{ApiConfig, Config, Mirror, RepositoryId};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Download (and keep in sync) the releases from a set of GitHub projects.
#[derive(Debug, Parser)]
#[command(
    name = "release-mirror",
    version,
    after_help = "Set the GITHUB_TOKEN environment variable to use token-based authentication. \
                  This is required for accessing private repositories and can help with API rate limits."
)]
struct Cli {
    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Also download source for each release
    #[arg(short = 's', long)]
    download_source: bool,

    /// Output directory
    #[arg(long)]
    output: PathBuf,

    /// API root
    #[arg(long, default_value = "https://api.github.com")]
    api_url: String,

    /// Repository to fetch releases from (owner/name)
    #[arg(required = true, value_name = "REPOSITORY")]
    repository: Vec<RepositoryId>,
}

/// Route WARN and ERROR to stderr and everything else to stdout
///
/// `RUST_LOG` takes precedence over `--verbose` when set.
fn init_logging(verbose: bool) {
    let writer = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(std::io::stdout);
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .without_time()
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output_dir = match std::path::absolute(&cli.output) {
        Ok(path) => path,
        Err(e) => {
            error!(error = %e, "Invalid output directory '{}'", cli.output.display());
            return ExitCode::FAILURE;
        }
    };

    let config = Config {
        output_dir,
        download_source: cli.download_source,
        api: ApiConfig {
            base_url: cli.api_url,
            ..ApiConfig::default()
        }
        .with_token(ApiConfig::token_from_env()),
        ..Config::default()
    };

    let mirror = match Mirror::new(config) {
        Ok(mirror) => mirror,
        Err(e) => {
            error!(error = %e, "Failed to start");
            return ExitCode::FAILURE;
        }
    };

    let outcomes = mirror.sync_all(&cli.repository).await;
    if outcomes.iter().any(|outcome| outcome.result.is_err()) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
