//! Host shell for the huddle call core.
//!
//! Plays the part a native UI shell plays: sets up logging, loads settings,
//! forwards published tracks back into the session and lays out the grid.

mod replay;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use huddle_core::engine::Region;
use huddle_core::key::{KeyEncoding, hex_to_ascii};
use huddle_core::layout::DEFAULT_ASPECT_RATIO;
use huddle_core::{CallError, SettingsStore, calculate_layout, call_grid};
use serde::de::DeserializeOwned;

#[derive(Parser, Debug)]
#[command(name = "huddle", version, about = "Video call grid and session tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the tile grid for a container.
    Layout {
        width: f64,
        height: f64,
        tiles: u32,
        #[arg(long, default_value_t = DEFAULT_ASPECT_RATIO)]
        aspect_ratio: f64,
        /// Treat `tiles` as remote participants: add the self-view and padding.
        #[arg(long)]
        call: bool,
    },
    /// Decode a hex channel secret the way it is handed to the engine.
    DecodeKey { hex: String },
    /// Replay a JSON list of engine events through a loopback session.
    Replay {
        events: PathBuf,
        #[arg(long, default_value = ".huddle")]
        data_dir: PathBuf,
        #[arg(long, default_value_t = 1280.0)]
        width: f64,
        #[arg(long, default_value_t = 720.0)]
        height: f64,
    },
    /// Update the stored settings, then print the effective configuration.
    Settings(SettingsArgs),
}

#[derive(Args, Debug)]
struct SettingsArgs {
    #[arg(long, default_value = ".huddle")]
    data_dir: PathBuf,
    #[arg(long)]
    app_id: Option<String>,
    /// Engine region, e.g. `europe` or `north_america`.
    #[arg(long, value_parser = parse_snake_case::<Region>)]
    region: Option<Region>,
    #[arg(long)]
    channel: Option<String>,
    #[arg(long, requires = "channel")]
    token: Option<String>,
    /// Hex channel secret.
    #[arg(long, conflicts_with = "clear_secret")]
    secret: Option<String>,
    #[arg(long)]
    clear_secret: bool,
    /// `decoded_ascii` or `raw_hex`.
    #[arg(long, value_parser = parse_snake_case::<KeyEncoding>)]
    key_encoding: Option<KeyEncoding>,
}

/// Parse a CLI value with the same snake_case names the settings file uses.
fn parse_snake_case<T: DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|e| e.to_string())
}

fn apply_settings(store: &SettingsStore, args: SettingsArgs) -> Result<(), CallError> {
    if let Some(app_id) = args.app_id {
        store.set_app_id(app_id)?;
    }
    if let Some(region) = args.region {
        store.set_region(region)?;
    }
    if let Some(channel) = args.channel {
        let token = args.token.unwrap_or_else(|| store.get().token);
        store.set_channel(channel, token)?;
    }
    if let Some(secret) = args.secret {
        store.set_encryption_secret(Some(secret))?;
    } else if args.clear_secret {
        store.set_encryption_secret(None)?;
    }
    if let Some(encoding) = args.key_encoding {
        store.set_key_encoding(encoding)?;
    }
    Ok(())
}

/// Initialize tracing/logging once for the process.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("huddle_core=debug,huddle_cli=info")),
        )
        .with_ansi(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Layout { width, height, tiles, aspect_ratio, call } => {
            let layout = if call {
                call_grid(width, height, tiles as usize, aspect_ratio)
            } else {
                calculate_layout(width, height, tiles, aspect_ratio)
            };
            println!(
                "cols={} rows={} tile={}x{}",
                layout.cols, layout.rows, layout.width, layout.height
            );
        }
        Command::DecodeKey { hex } => {
            let key = hex_to_ascii(&hex)?;
            println!("{} chars: {}", key.chars().count(), key.escape_default());
        }
        Command::Replay { events, data_dir, width, height } => {
            let summary = replay::run(&events, &data_dir, width, height).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Settings(args) => {
            let store = SettingsStore::new(&args.data_dir);
            tracing::info!("settings file: {}", store.file_path().display());
            apply_settings(&store, args)?;
            println!("{}", serde_json::to_string_pretty(&store.get())?);
        }
    }
    Ok(())
}
