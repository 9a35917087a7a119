use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::info;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use anyhow::anyhow;

use xpu_tts_gateway::{DeviceSelection, ServerConfig, init, server, state::AppState};

/// XPU TTS Gateway - Text-to-speech server with Intel GPU acceleration
#[derive(Parser, Debug)]
#[command(name = "xpu-tts-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Probe the accelerator, print the selected device and exit
    Probe,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        println!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    // Driver hints and probing happen before any worker thread exists
    let applied = init::apply_accelerator_hints(&config.accelerator);
    if !applied.is_empty() {
        info!(?applied, "Accelerator environment hints set");
    }
    let selection = init::select_device(&config.accelerator);

    if let Some(Commands::Probe) = cli.command {
        println!("{}", serde_json::to_string_pretty(&selection)?);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config, selection))
}

async fn serve(config: ServerConfig, selection: DeviceSelection) -> anyhow::Result<()> {
    let address = config.address();

    match (&selection.name, selection.is_accelerator()) {
        (Some(name), true) => println!("Device: {} ({name})", selection.kind),
        _ => println!("Device: {} (running on CPU)", selection.kind),
    }
    println!("Starting server on {address}");

    // Create application state
    let app_state = AppState::new(config, selection);
    let app = server::build_app(app_state);

    // Parse socket address
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    println!("Server listening on http://{}", socket_addr);

    let listener = TcpListener::bind(&socket_addr).await?;
    server::run(listener, app, server::shutdown_signal()).await?;

    Ok(())
}
