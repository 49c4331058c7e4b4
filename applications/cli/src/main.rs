/// Cadence - play a playlist through the transport controller
use cadence_cli::{
    config::CliConfig,
    player::{self, Outcome, PlayOptions},
    playlist::Playlist,
};
use cadence_playback::{format_time, RepeatMode};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Queue sequencing and transport control, driven from a playlist file", long_about = None)]
struct Cli {
    /// Configuration file path (default: ./cadence.toml if present)
    #[arg(short, long, global = true, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a playlist against the simulated engine
    Play {
        /// Playlist file (TOML)
        playlist: PathBuf,

        /// Track id or 1-based position to start from
        #[arg(short, long)]
        start: Option<String>,

        /// Repeat mode: none, one or all
        #[arg(short, long)]
        repeat: Option<RepeatMode>,

        /// Shuffle the play order
        #[arg(long)]
        shuffle: bool,

        /// Simulated playback speed multiplier
        #[arg(long)]
        speed: Option<f64>,
    },
    /// List the tracks of a playlist
    List {
        /// Playlist file (TOML)
        playlist: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence=info,cadence_cli=info,cadence_playback=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            playlist,
            start,
            repeat,
            shuffle,
            speed,
        } => {
            let options = PlayOptions {
                start,
                repeat,
                shuffle,
                speed,
            };
            play(cli.config, &playlist, &options).await?;
        }
        Commands::List { playlist } => {
            list(&playlist)?;
        }
    }

    Ok(())
}

async fn play(
    config_path: Option<PathBuf>,
    playlist_path: &Path,
    options: &PlayOptions,
) -> anyhow::Result<()> {
    // Load configuration
    let config = CliConfig::load(config_path.as_deref())?;
    config.validate()?;

    let playlist = Playlist::load(playlist_path)?;

    let outcome = player::play(&playlist, &config, options, interrupted()).await?;
    match outcome {
        Outcome::Finished | Outcome::Interrupted => Ok(()),
        Outcome::GaveUp { attempts } => {
            anyhow::bail!("gave up after {} consecutive load failures", attempts)
        }
    }
}

fn list(playlist_path: &Path) -> anyhow::Result<()> {
    let playlist = Playlist::load(playlist_path)?;

    println!("{} ({} tracks)", playlist.display_name(), playlist.tracks.len());
    for (index, track) in playlist.descriptors().iter().enumerate() {
        println!(
            "{:>3}. {:<24} {:>6}  {}",
            index + 1,
            track.title.as_deref().unwrap_or(&track.id),
            format_time(track.duration_hint_ms()),
            track.artist.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
