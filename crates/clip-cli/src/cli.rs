use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// clipctl: browse replay clips and send them to the OBS preview
#[derive(Parser, Debug)]
#[command(name = "clipctl")]
#[command(about = "Browse replay clips and send them to the OBS preview", long_about = None)]
pub struct Cli {
    /// Daemon base URL (default: from config.toml)
    #[arg(long, global = true)]
    pub daemon: Option<String>,

    /// OBS WebSocket address (default: from config.toml)
    #[arg(long, global = true)]
    pub obs: Option<String>,

    /// OBS WebSocket password (default: from config.toml)
    #[arg(long, global = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// List the clips in a folder without asking the daemon
    Scan { folder: PathBuf },

    /// Point the daemon at a folder
    SetFolder {
        folder: PathBuf,
        /// Send the folder even if it holds no clips yet
        #[arg(long)]
        allow_empty: bool,
    },

    /// Show the folder the daemon is watching
    Config,

    /// Print the daemon's clip list
    Clips,

    /// Ask the daemon to rescan now
    Refresh,

    /// Stay connected and reprint the list on every change
    Follow,

    /// Put a clip into the OBS preview scene
    Preview {
        /// Clip file to preview
        #[arg(required_unless_present = "latest", conflicts_with = "latest")]
        path: Option<PathBuf>,
        /// Preview the newest clip in the daemon's list
        #[arg(long)]
        latest: bool,
    },

    /// Print OBS events as they arrive (Ctrl-C to stop)
    Events {
        /// Event types to subscribe to (default: scene, input and replay events)
        event_types: Vec<String>,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
