//! Branching conversation CLI.
//!
//! Each reply is decomposed into a cast of characters; any point in the
//! conversation can be forked into a new branch carrying a chosen subset of
//! that cast.
//!
//! ```bash
//! cargo run -p decomp -- --provider anthropic --save my_forest.json
//! ```

mod headless;

use decomp_core::config::API_KEY_ENV;
use decomp_core::{
    JsonFileGateway, MemoryGateway, Orchestrator, PersistenceGateway, ProviderConfig, ProviderKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_SAVE_PATH: &str = "decomp_forest.json";

/// Options gathered from the command line.
#[derive(Debug)]
pub struct CliOptions {
    pub provider: ProviderConfig,
    /// `None` keeps the forest in memory only.
    pub save_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays a clean line protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let options = parse_options_from_args(&args)?;
    tracing::info!(provider = %options.provider.kind, save = ?options.save_path, "starting");

    if options.provider.kind == ProviderKind::Anthropic && options.provider.api_key.is_none() {
        eprintln!("Warning: {API_KEY_ENV} is not set; turns will fail until it is.");
    }

    let gateway: Arc<dyn PersistenceGateway> = match &options.save_path {
        Some(path) => Arc::new(JsonFileGateway::new(path)),
        None => Arc::new(MemoryGateway::new()),
    };
    let orchestrator = Orchestrator::from_config(&options.provider, gateway);

    headless::run_headless(orchestrator, &options).await
}

/// Parse flags on top of the environment-derived provider configuration.
pub fn parse_options_from_args(args: &[String]) -> Result<CliOptions, String> {
    let mut options = CliOptions {
        provider: ProviderConfig::from_env(),
        save_path: Some(PathBuf::from(DEFAULT_SAVE_PATH)),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--provider" => {
                let kind = args.get(i + 1).ok_or("--provider needs a value")?;
                options.provider.kind = kind.parse()?;
                i += 1;
            }
            "--model" => {
                let model = args.get(i + 1).ok_or("--model needs a value")?;
                options.provider.model = Some(model.clone());
                i += 1;
            }
            "--save" => {
                let path = args.get(i + 1).ok_or("--save needs a path")?;
                options.save_path = Some(PathBuf::from(path));
                i += 1;
            }
            "--no-save" => options.save_path = None,
            other => return Err(format!("unknown argument '{other}' (try --help)")),
        }
        i += 1;
    }

    Ok(options)
}

fn print_help() {
    println!("decomp - branching conversations with a cast of characters");
    println!();
    println!("USAGE:");
    println!("  decomp [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help           Show this help message");
    println!("  --provider <KIND>    simulated (default) or anthropic");
    println!("  --model <NAME>       Model override for the anthropic provider");
    println!("  --save <PATH>        Forest file (default: {DEFAULT_SAVE_PATH})");
    println!("  --no-save            Keep the forest in memory only");
    println!();
    println!("ENVIRONMENT:");
    println!("  DECOMP_PROVIDER, DECOMP_MODEL, {API_KEY_ENV}, RUST_LOG");
    println!();
    println!("EXAMPLES:");
    println!("  decomp                                  # Offline, simulated replies");
    println!("  decomp --provider anthropic --no-save");
}
