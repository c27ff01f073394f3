//! Command-line client for the Embedded AI code generation service.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use embedded_ai_core::{ApiError, Artifact, ClientConfig, Source, TaskState, DEFAULT_INSTRUCTION};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "embedded-ai")]
#[command(about = "Generate embedded C code from datasheets and schematics", long_about = None)]
struct Cli {
    /// Service address
    #[arg(
        long,
        env = "EMBEDDED_AI_BASE_URL",
        default_value = "http://localhost:8080",
        global = true
    )]
    base_url: String,

    /// API key sent as X-API-Key
    #[arg(long, env = "EMBEDDED_AI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Request timeout in seconds
    #[arg(long, env = "EMBEDDED_AI_TIMEOUT", default_value_t = 60, global = true)]
    timeout: u64,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check the service, then generate code from a datasheet and schematic
    Demo {
        #[arg(value_name = "DATASHEET")]
        datasheet: Option<PathBuf>,

        #[arg(value_name = "SCHEMATIC")]
        schematic: Option<PathBuf>,

        #[arg(value_name = "INSTRUCTION", default_value = DEFAULT_INSTRUCTION)]
        instruction: String,

        /// Where to write the generated code
        #[arg(short, long, default_value = "generated.c")]
        output: PathBuf,
    },

    /// Service health
    Health,

    /// System status
    Status,

    /// API documentation
    Docs,

    /// Generate code; sources starting with http:// or https:// are sent as URLs
    Generate {
        #[arg(long, value_name = "PATH|URL")]
        datasheet: Option<Source>,

        #[arg(long, value_name = "PATH|URL")]
        schematic: Option<Source>,

        #[arg(short, long, default_value = DEFAULT_INSTRUCTION)]
        instruction: String,

        /// Write the generated code here instead of printing the response
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Queue the generation and print the task handle
        #[arg(long = "async")]
        queue: bool,
    },

    /// Analyze a single datasheet or schematic
    Analyze {
        #[arg(value_name = "datasheet|schematic")]
        artifact: Artifact,

        #[arg(value_name = "PATH|URL")]
        source: Source,
    },

    /// Inspect asynchronous generation tasks
    Task {
        #[command(subcommand)]
        action: TaskCommand,
    },

    /// Forward a question to the chat service
    Ask {
        query: String,

        #[arg(long, env = "CHAT_ENDPOINT")]
        chat_endpoint: String,

        #[arg(long, env = "CHAT_TOKEN", hide_env_values = true)]
        chat_token: String,

        #[arg(long, env = "CHAT_USER", default_value = "embedded-ai")]
        chat_user: String,

        /// Chat timeout in seconds
        #[arg(long, default_value_t = 500)]
        chat_timeout: u64,
    },
}

#[derive(Debug, Subcommand)]
enum TaskCommand {
    /// Task status and progress
    Get { task_id: String },

    /// Generated code of a finished task
    Result {
        task_id: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Recent tasks
    List {
        #[arg(long)]
        status: Option<TaskState>,

        #[arg(long)]
        limit: Option<u32>,
    },

    /// Remove a task and its result
    Delete { task_id: String },
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let config =
            ClientConfig::new(&self.base_url).with_timeout(Duration::from_secs(self.timeout));
        match &self.api_key {
            Some(key) => config.with_api_key(key.clone()),
            None => config,
        }
    }
}

fn init_tracing(verbose: u8) {
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            0 => "warn".to_string(),
            1 => "warn,embedded_ai_core=info,embedded_ai=info".to_string(),
            _ => "info,embedded_ai_core=debug,embedded_ai=debug".to_string(),
        },
    };
    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

/// One-line explanation for the user, keyed on the failure kind.
fn describe(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ApiError>() {
        Some(ApiError::Connection(_)) => {
            "cannot connect to the API server; make sure it is running".to_string()
        }
        Some(ApiError::Timeout) => "request timed out".to_string(),
        Some(api) => api.to_string(),
        None => format!("{err:#}"),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match commands::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            eprintln!("error: {}", describe(&err));
            ExitCode::FAILURE
        }
    }
}
