//! CLI command definitions, routing, and tracing setup.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use graphfeat_core::{Pipeline, ProgressReporter, Submission, UploadPayload};
use graphfeat_shared::{
    AppConfig, EmbeddingResponse, GraphFeatError, PipelineStage, Settings, init_config,
    load_config, load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::server;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// graphfeat: turn RDF graph datasets into published embedding feature tables.
#[derive(Parser)]
#[command(
    name = "graphfeat",
    version,
    about = "Embed RDF graph datasets and publish the vectors as OpenML feature tables.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.graphfeat/graphfeat.toml.
    #[arg(long, global = true, env = "GRAPHFEAT_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Embed one dataset and publish the resulting feature table.
    Run {
        /// Source address (http, https, or file URL) of the dataset.
        #[arg(short, long, required_unless_present = "file", conflicts_with = "file")]
        dataset: Option<String>,

        /// Local dataset file to upload instead of an address.
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Display name of the published dataset (defaults to the last path segment).
        #[arg(short, long)]
        name: Option<String>,

        /// Embedding method.
        #[arg(short, long, default_value = "rescal")]
        method: String,

        /// Hyperparameters as `key=value;key=value`.
        #[arg(long, default_value = "")]
        hyperp: String,
    },

    /// Start the HTTP server.
    Serve {
        /// Address to bind (overrides the config file).
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to bind (overrides the config file).
        #[arg(short, long)]
        port: Option<u16>,
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

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "graphfeat=info,tower_http=info",
        1 => "graphfeat=debug,tower_http=debug",
        _ => "graphfeat=trace,tower_http=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
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
        Command::Run {
            dataset,
            file,
            name,
            method,
            hyperp,
        } => cmd_run(config_path, dataset, file, name, method, hyperp).await,
        Command::Serve { host, port } => cmd_serve(config_path, host, port).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn read_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

fn build_pipeline(config: &AppConfig) -> Result<Arc<Pipeline>> {
    let settings = Arc::new(Settings::resolve(config)?);
    Ok(Arc::new(Pipeline::with_openml(settings)?))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    dataset: Option<String>,
    file: Option<PathBuf>,
    name: Option<String>,
    method: String,
    hyperp: String,
) -> Result<()> {
    let config = read_config(config_path)?;
    let pipeline = build_pipeline(&config)?;

    let upload = match &file {
        Some(path) => Some(read_upload(path).await?),
        None => None,
    };

    // An upload must carry a name; default it from the file name.
    let name = match (name, &upload) {
        (Some(n), _) => n,
        (None, Some(u)) => u.filename.clone(),
        (None, None) => String::new(),
    };

    let submission = Submission {
        upload,
        dataset: dataset.unwrap_or_default(),
        name,
        method,
        hyperp,
    };

    info!(
        dataset = %submission.dataset,
        method = %submission.method,
        "running embedding pipeline"
    );

    let reporter = CliProgress::new();
    let response = pipeline.process(submission, &reporter).await?;

    println!();
    println!("  Dataset published!");
    println!("  Source: {}", response.dataset);
    println!("  Method: {}", response.method);
    println!("  Params: {}", response.hyperp);
    println!("  URL:    {}", response.url);
    println!();

    Ok(())
}

/// Read a local dataset for upload. An empty file is an upload error rather
/// than being skipped.
async fn read_upload(path: &Path) -> graphfeat_shared::Result<UploadPayload> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| GraphFeatError::Upload(format!("cannot read '{}': {e}", path.display())))?;
    if bytes.is_empty() {
        return Err(GraphFeatError::Upload(format!(
            "'{}' is empty",
            path.display()
        )));
    }

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| GraphFeatError::Upload(format!("'{}' has no file name", path.display())))?;

    Ok(UploadPayload { filename, bytes })
}

async fn cmd_serve(config_path: Option<&Path>, host: Option<IpAddr>, port: Option<u16>) -> Result<()> {
    let config = read_config(config_path)?;

    let host = match host {
        Some(h) => h,
        None => config
            .server
            .host
            .parse()
            .map_err(|e| eyre!("invalid server host '{}': {e}", config.server.host))?,
    };
    let addr = SocketAddr::new(host, port.unwrap_or(config.server.port));

    let pipeline = build_pipeline(&config)?;
    server::serve(pipeline, addr).await
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = read_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
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
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

fn stage_message(stage: PipelineStage) -> &'static str {
    match stage {
        PipelineStage::Validating => "Validating request",
        PipelineStage::Acquiring => "Fetching dataset",
        PipelineStage::Embedding => "Running embedding",
        PipelineStage::Assembling => "Building feature table",
        PipelineStage::Publishing => "Publishing to repository",
        PipelineStage::CleaningUp => "Cleaning up",
        PipelineStage::Done => "Done",
        PipelineStage::Failed => "Failed",
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: PipelineStage) {
        self.spinner.set_message(stage_message(stage));
    }

    fn done(&self, _response: &EmbeddingResponse) {
        self.spinner.finish_and_clear();
    }

    fn failed(&self, stage: PipelineStage, _error: &GraphFeatError) {
        self.spinner
            .abandon_with_message(format!("{} failed", stage_message(stage)));
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_requires_dataset_or_file() {
        assert!(Cli::try_parse_from(["graphfeat", "run", "--method", "rescal"]).is_err());

        let cli = Cli::try_parse_from([
            "graphfeat",
            "run",
            "--dataset",
            "http://example.org/iris.ttl",
            "--hyperp",
            "rank=5",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                dataset, method, ..
            } => {
                assert_eq!(dataset.as_deref(), Some("http://example.org/iris.ttl"));
                assert_eq!(method, "rescal");
            }
            _ => panic!("expected run"),
        }
    }

    #[tokio::test]
    async fn empty_file_is_an_upload_error() {
        let dir = std::env::temp_dir().join(format!("gf-cli-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let empty = dir.join("empty.ttl");
        std::fs::write(&empty, b"").unwrap();
        let full = dir.join("iris.ttl");
        std::fs::write(&full, b"<a> <b> <c> .").unwrap();

        let err = read_upload(&empty).await.unwrap_err();
        assert!(matches!(err, GraphFeatError::Upload(_)));

        let payload = read_upload(&full).await.unwrap();
        assert_eq!(payload.filename, "iris.ttl");
        assert_eq!(payload.bytes, b"<a> <b> <c> .");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn serve_flags_override() {
        let cli = Cli::try_parse_from(["graphfeat", "serve", "--port", "9090"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Serve {
                host: None,
                port: Some(9090)
            }
        ));
    }
}
