//! Stemdle player - main entry point
//!
//! Loads configuration, opens the audio backend, and runs the interactive
//! console against the game backend.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use stemdle_common::config::{resolve_config_path, CONFIG_ENV_VAR};
use stemdle_player::api::GameApiClient;
use stemdle_player::audio::device::DeviceBackend;
use stemdle_player::audio::headless::{HeadlessBackend, HeadlessContext};
use stemdle_player::audio::output::AudioOutput;
use stemdle_player::audio::{AudioContext, AudioGraph, StemSource};
use stemdle_player::config::{ConfigOverrides, PlayerConfig};
use stemdle_player::console::{Console, Flow, HELP};
use stemdle_player::game::GameSession;
use stemdle_player::playback::PlaybackEngine;
use stemdle_player::SharedState;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ngit: ",
    env!("GIT_HASH"),
    "\nbuilt: ",
    env!("BUILD_TIMESTAMP"),
    "\nprofile: ",
    env!("BUILD_PROFILE")
);

/// Command-line arguments for stemdle
#[derive(Parser, Debug)]
#[command(name = "stemdle")]
#[command(about = "Guess the song from its stems")]
#[command(version, long_version = LONG_VERSION)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Game backend base URL, including the /api prefix
    #[arg(long, env = "STEMDLE_API_URL")]
    api_url: Option<String>,

    /// User whose rating is saved after each confirmed guess
    #[arg(long, env = "STEMDLE_USER_ID")]
    user_id: Option<String>,

    /// Starting rating
    #[arg(long)]
    rating: Option<i64>,

    /// Run without a sound device
    #[arg(long)]
    headless: bool,

    /// Audio output device name
    #[arg(long)]
    device: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// List audio output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "stemdle={level},stemdle_player={level},stemdle_common={level}"
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

struct Backend {
    source: Arc<dyn StemSource>,
    context: Arc<dyn AudioContext>,
}

fn open_backend(config: &PlayerConfig) -> Result<Backend> {
    if config.audio.headless {
        info!("Using headless audio backend");
        return Ok(Backend {
            source: Arc::new(HeadlessBackend::new()),
            context: Arc::new(HeadlessContext::new()),
        });
    }

    let device = DeviceBackend::open(config.audio.device.clone(), config.request_timeout())
        .context("Failed to open audio output (use --headless to run without sound)")?;
    let context = device.context();
    Ok(Backend {
        source: Arc::new(device),
        context,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_devices {
        for name in AudioOutput::list_devices().context("Failed to list audio devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR);
    let config = PlayerConfig::load(config_path.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(ConfigOverrides {
            api_base_url: args.api_url,
            user_id: args.user_id,
            rating: args.rating,
            headless: args.headless,
            device: args.device,
            log_level: args.log_level,
        })
        .context("Invalid command-line settings")?;

    init_tracing(&config.logging.level);
    info!(
        "Starting stemdle {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file; using defaults"),
    }
    info!("Game backend: {}", config.api_base_url);

    let shared = Arc::new(SharedState::new(config.initial_rating));
    let backend = open_backend(&config)?;
    let graph = Arc::new(AudioGraph::new());
    let engine = PlaybackEngine::new(
        config.playback.clone(),
        graph,
        backend.context,
        Arc::clone(&shared),
    );
    let api = GameApiClient::new(&config.api_base_url, config.request_timeout())
        .context("Failed to create backend client")?;

    match api.health().await {
        Ok(true) => debug!("Backend is healthy"),
        Ok(false) => warn!("Backend reports it is not healthy"),
        Err(e) => warn!("Backend health check failed: {}", e),
    }

    let session = Arc::new(GameSession::new(
        &config,
        api,
        engine.clone(),
        backend.source,
        Arc::clone(&shared),
    ));

    // Log every game event at debug level
    let mut events = shared.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => debug!(event = event.event_type(), "{}", json),
                Err(e) => warn!("Failed to serialize event: {}", e),
            }
        }
    });

    let console = Console::new(Arc::clone(&session));
    println!("{}", HELP);
    if let Flow::Continue(text) = console.handle_line("next").await {
        println!("{}", text);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match console.handle_line(&line).await {
            Flow::Continue(text) if text.is_empty() => {}
            Flow::Continue(text) => println!("{}", text),
            Flow::Quit => break,
        }
    }

    engine.shutdown().await;
    info!("Goodbye");
    Ok(())
}
