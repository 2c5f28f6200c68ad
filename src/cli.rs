use clap::{Parser, Subcommand};

// Display order for log level option (placed at end of help text)
const LOG_LEVEL_DISPLAY_ORDER: usize = 100;

const DEFAULT_CONFIG: &str = "toolbridge.toml";

/// CLI arguments
#[derive(Parser)]
#[command(name = "toolbridge", version, about = "Protocol adapter for function-calling LLM providers", long_about = None)]
pub struct Cli {
    /// Log level (see https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html)
    /// [env: TOOLBRIDGE_LOG=] [default: info]
    #[arg(
        long,
        env = "TOOLBRIDGE_LOG",
        default_value = "info",
        global = true,
        hide_default_value = true,
        hide_env = true,
        display_order = LOG_LEVEL_DISPLAY_ORDER,
        verbatim_doc_comment
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a default toolbridge.toml config file
    Init(InitArgs),
    /// Print the JSON schema of the config file
    Schema,
    /// Normalize a saved provider response offline
    Decode(DecodeArgs),
    /// Run test entries against a provider
    Run(RunArgs),
}

/// Arguments for the init command
#[derive(Parser)]
pub struct InitArgs {
    /// Path to config file
    #[arg(long, default_value = DEFAULT_CONFIG)]
    pub config: String,

    /// Override existing config file
    #[arg(long)]
    pub r#override: bool,
}

/// Arguments for the decode command
#[derive(Parser, Debug)]
pub struct DecodeArgs {
    /// File holding the raw response body
    pub response: String,

    /// JSON file with the function docs the request was built from,
    /// used to map sanitized names back to their originals
    #[arg(long, verbatim_doc_comment)]
    pub functions: Option<String>,

    /// Path to config file
    #[arg(long, default_value = DEFAULT_CONFIG)]
    pub config: String,

    /// Provider profile whose decode settings apply [default: first configured]
    #[arg(long)]
    pub provider: Option<String>,

    /// HTTP status the response came with
    #[arg(long, default_value_t = 200)]
    pub status: u16,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// JSONL file of test entries ({"id", "question", "function"} per line)
    pub entries: String,

    /// Path to config file (initialize with `toolbridge init`)
    #[arg(long, default_value = DEFAULT_CONFIG)]
    pub config: String,

    /// Override config values using dot notation (e.g. providers.local.model=gpt-4)
    #[arg(long = "config-override")]
    pub config_overrides: Vec<String>,

    /// Provider profile to run against [default: first configured]
    #[arg(long)]
    pub provider: Option<String>,

    /// Maximum number of cases in flight (overrides config)
    #[arg(long)]
    pub max_parallel_cases: Option<usize>,

    /// Output file path (.json), printed to stdout when unset
    #[arg(long)]
    pub output: Option<String>,
}
