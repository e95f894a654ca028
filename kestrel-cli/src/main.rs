//! Kestrel CLI: analyze Karpenter configurations, search the knowledge base,
//! and emit remediation bundles.

mod commands;
mod render;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Kestrel: grounded advice for Karpenter configurations
#[derive(Parser, Debug)]
#[command(name = "kestrel", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.kestrel/config.toml` and relative paths)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path, used instead of the layered lookup
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Disable the JSON log file
    #[arg(long)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Analyze one or more Karpenter YAML files
    Analyze {
        /// YAML files; their documents are analyzed together
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// AWS region recorded in the report
        #[arg(long)]
        region: Option<String>,

        /// Attach cited explanations to findings
        #[arg(long)]
        explain: bool,

        /// Check explanations for grounding (implies --explain)
        #[arg(long)]
        evaluate: bool,

        /// Generate an overall narrative (requires a text-generation backend)
        #[arg(long)]
        summary: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Search the Karpenter knowledge base
    Search {
        /// Free-text query
        query: String,

        /// Number of results (1-10)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Print remediation patches as a YAML bundle
    Bundle {
        /// YAML files to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Only patches that apply to this NodePool
        #[arg(long)]
        nodepool: Option<String>,

        /// Patch categories (spot, consolidation, ttl, graviton, nodeclass)
        #[arg(long, value_delimiter = ',')]
        category: Vec<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List or call the local tools
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ToolsAction {
    /// List registered tools with their parameter schemas
    List,
    /// Call one tool with JSON arguments
    Call {
        /// Tool name
        name: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective merged configuration
    Show,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Reports go to stdout, so human-readable logs stay on stderr.
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let mut _guard = None;
    let json_layer = if cli.no_log_file {
        None
    } else {
        let log_dir = directories::ProjectDirs::from("dev", "kestrel", "kestrel")
            .map(|d| d.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from(".kestrel/logs"));
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "kestrel.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _guard = Some(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug")),
        )
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await
}
