mod cli;

use anyhow::{Context, bail};
use clap::Parser;
use cli::{Cli, Commands, DecodeArgs, InitArgs, RunArgs};
use std::path::Path;
use toolbridge::config::Config;
use toolbridge::runner::Runner;
use toolbridge::transport::{HttpTransport, RawResponse};
use toolbridge::types::{FunctionDoc, TestEntry};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: i32 = 1;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Init(args) => init(args),
        Commands::Schema => schema(),
        Commands::Decode(args) => decode(args),
        Commands::Run(args) => run(args).await,
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(EXIT_FAILURE);
    }
}

fn init(args: &InitArgs) -> anyhow::Result<()> {
    if Path::new(&args.config).exists() && !args.r#override {
        bail!(
            "Config file {} already exists, use --override to replace it",
            args.config
        );
    }
    let content = Config::default_config().to_toml()?;
    std::fs::write(&args.config, content)
        .with_context(|| format!("Failed to write config file {}", args.config))?;
    info!("Config written to {}", args.config);
    Ok(())
}

fn schema() -> anyhow::Result<()> {
    let schema = schemars::schema_for!(Config);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn decode(args: &DecodeArgs) -> anyhow::Result<()> {
    let config = if Path::new(&args.config).exists() {
        Config::load(&args.config, &[])?
    } else {
        debug!("No config at {}, using defaults", args.config);
        Config::default_config()
    };
    let (name, profile) = config.select_provider(args.provider.as_deref())?;
    debug!("Decoding with provider '{}'", name);

    let body = std::fs::read_to_string(&args.response)
        .with_context(|| format!("Failed to read response file {}", args.response))?;
    let functions: Vec<FunctionDoc> = match &args.functions {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read functions file {}", path))?;
            serde_json::from_str(&text)
                .with_context(|| format!("{} is not a JSON array of function docs", path))?
        }
        None => Vec::new(),
    };

    let catalog = profile.compile(&functions);
    let raw = RawResponse::new(args.status, body);
    let decoded = (profile.strategy().normalize)(&raw, &catalog.names, &profile.normalize_options());

    let output = serde_json::json!({
        "status": decoded.status(),
        "response": decoded.into_parsed(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(args: &RunArgs) -> anyhow::Result<()> {
    let config = Config::load(&args.config, &args.config_overrides)?;
    let (name, profile) = config.select_provider(args.provider.as_deref())?;
    let entries = read_entries(&args.entries)?;
    info!(
        "Loaded {} entries, running against provider '{}' ({})",
        entries.len(),
        name,
        profile.model
    );

    let transport = HttpTransport::new(profile.base_url.clone());
    let runner = Runner::new(&transport, profile).max_steps_per_turn(config.runner.max_steps_per_turn);
    let max_parallel = args.max_parallel_cases.or(config.runner.max_parallel_cases);
    let reports = runner.run_all(&entries, max_parallel).await;

    let content = serde_json::to_string_pretty(&reports)?;
    match &args.output {
        Some(path) => {
            if !path.ends_with(".json") {
                warn!("Output file {} does not end with .json", path);
            }
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write output file {}", path))?;
            info!("Results written to {}", path);
        }
        None => println!("{}", content),
    }

    let failed = reports.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        bail!("{} case(s) failed", failed);
    }
    Ok(())
}

fn read_entries(path: &str) -> anyhow::Result<Vec<TestEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read entries file {}", path))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid entry at {}:{}", path, index + 1))
        })
        .collect()
}
