//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use ecospray_core::{Destination, ImportService, SourceData};
use ecospray_crawler::CrawlProgress;
use ecospray_shared::{
    AppConfig, CrawlResult, ExtractedContent, FileBundle, SourceType, init_config, load_config,
    load_config_from,
};
use ecospray_storage::open_store;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// EcoSpray: website backend and site-import tool.
#[derive(Parser)]
#[command(
    name = "ecospray",
    version,
    about = "Serve the EcoSpray website backend and import existing sites into its content tables.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.ecospray/ecospray.toml).
    #[arg(long, global = true, env = "ECOSPRAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start the HTTP server.
    Serve {
        /// Interface to bind (overrides `server.host`).
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides `server.port`).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Crawl a website and print the crawl payload as JSON.
    Crawl {
        /// Seed URL.
        url: String,
    },

    /// Fetch a GitHub repository's text files and print them as JSON.
    Github {
        /// Repository URL, optionally with `/tree/<branch>`.
        url: String,
    },

    /// Read a ZIP archive's text files and print them as JSON.
    Zip {
        /// Path to the archive.
        path: PathBuf,
    },

    /// Extract structured content from a crawl or file payload.
    Analyze {
        /// JSON produced by `crawl`, `github` or `zip`.
        #[arg(long)]
        input: PathBuf,

        /// Which command produced the input: url, git or zip.
        #[arg(long)]
        source_type: SourceType,

        /// Gemini API key (falls back to the configured environment variable).
        #[arg(long)]
        key: Option<String>,
    },

    /// Write extracted content to the store or a spreadsheet.
    Write {
        /// JSON produced by `analyze`.
        #[arg(long)]
        input: PathBuf,

        /// Spreadsheet to write to (requires --destination-key).
        #[arg(long)]
        destination_id: Option<String>,

        /// Sheets access token; without it rows go to the configured store.
        #[arg(long)]
        destination_key: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stage output
/// on stdout can be piped into the next stage.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "ecospray=info",
        1 => "ecospray=debug",
        _ => "ecospray=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Serve { host, port } => cmd_serve(config_path, host, port).await,
        Command::Crawl { url } => cmd_crawl(config_path, &url).await,
        Command::Github { url } => cmd_github(config_path, &url).await,
        Command::Zip { path } => cmd_zip(config_path, &path).await,
        Command::Analyze {
            input,
            source_type,
            key,
        } => cmd_analyze(config_path, &input, source_type, key.as_deref()).await,
        Command::Write {
            input,
            destination_id,
            destination_key,
        } => cmd_write(config_path, &input, destination_id, destination_key).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

async fn import_service(config: &AppConfig) -> Result<ImportService> {
    let store = open_store(&config.store).await?;
    Ok(ImportService::new(config, store)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_input<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).wrap_err_with(|| format!("{} is not a valid payload", path.display()))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    ecospray_server::serve(&config, &host, port).await?;
    Ok(())
}

async fn cmd_crawl(config_path: Option<&Path>, url: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let service = import_service(&config).await?;

    info!(url, max_pages = config.crawl.max_pages, "crawling site");
    let progress = CliProgress::new();
    let result = service.crawl(url, &progress).await;
    progress.finish();
    let result = result?;

    info!(
        pages = result.pages.len(),
        images = result.images.len(),
        errors = result.errors.len(),
        "crawl finished"
    );
    print_json(&result)
}

async fn cmd_github(config_path: Option<&Path>, url: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let service = import_service(&config).await?;

    let spinner = CliProgress::new();
    spinner.set_message(format!("Fetching {url}"));
    let files = service.github(url).await;
    spinner.finish();
    let files = files?;

    info!(files = files.len(), "repository fetched");
    print_json(&FileBundle { files })
}

async fn cmd_zip(config_path: Option<&Path>, path: &Path) -> Result<()> {
    let config = resolve_config(config_path)?;
    let service = import_service(&config).await?;

    let bytes = std::fs::read(path).wrap_err_with(|| format!("failed to read {}", path.display()))?;
    let files = service.zip(&bytes)?;

    info!(files = files.len(), "archive read");
    print_json(&FileBundle { files })
}

async fn cmd_analyze(
    config_path: Option<&Path>,
    input: &Path,
    source_type: SourceType,
    key: Option<&str>,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let service = import_service(&config).await?;

    let source = match source_type {
        SourceType::Url => SourceData::Crawl(read_input::<CrawlResult>(input)?),
        SourceType::Git | SourceType::Zip => {
            SourceData::Files(read_input::<FileBundle>(input)?.files)
        }
    };

    let spinner = CliProgress::new();
    spinner.set_message("Extracting content");
    let content = service.analyze(&source, source_type, key).await;
    spinner.finish();

    print_json(&content?)
}

async fn cmd_write(
    config_path: Option<&Path>,
    input: &Path,
    destination_id: Option<String>,
    destination_key: Option<String>,
) -> Result<()> {
    if destination_id.is_some() && destination_key.is_none() {
        return Err(eyre!("--destination-id requires --destination-key"));
    }

    let config = resolve_config(config_path)?;
    let service = import_service(&config).await?;
    let content: ExtractedContent = read_input(input)?;

    let destination = Destination {
        key: destination_key,
        id: destination_id,
    };
    let outcome = service.write(&content, &destination).await?;
    print_json(&outcome)?;

    if !outcome.report.is_complete() {
        return Err(eyre!(outcome.report.failure_message()));
    }
    Ok(())
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, toml::to_string_pretty(&AppConfig::default())?)?;
            path.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner on stderr, also used as the crawl progress sink.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn set_message(&self, message: impl Into<String>) {
        self.spinner.set_message(message.into());
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl CrawlProgress for CliProgress {
    fn page_fetched(&self, url: &str, current: usize, max_pages: usize) {
        self.spinner
            .set_message(format!("Fetching [{current}/{max_pages}] {url}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stage_commands() {
        let cli = Cli::try_parse_from([
            "ecospray",
            "analyze",
            "--input",
            "crawl.json",
            "--source-type",
            "github",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Analyze {
                source_type, key, ..
            } => {
                assert_eq!(source_type, SourceType::Git);
                assert!(key.is_none());
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn rejects_unknown_source_type() {
        let result = Cli::try_parse_from([
            "ecospray",
            "analyze",
            "--input",
            "x.json",
            "--source-type",
            "ftp",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn serve_overrides_are_optional() {
        let cli = Cli::try_parse_from(["ecospray", "serve", "--port", "8080"]).unwrap();
        match cli.command {
            Command::Serve { host, port } => {
                assert!(host.is_none());
                assert_eq!(port, Some(8080));
            }
            _ => panic!("expected serve"),
        }
    }
}
