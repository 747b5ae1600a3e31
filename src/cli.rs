use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Wager-backed battle-arena match engine: lobby/match lifecycle, the
/// authoritative simulation, and the escrow ledger behind it.
#[derive(Parser)]
#[command(name = "battle-arena-core", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the API + WebSocket server.
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(long, default_value = "8080")]
        port: u16,

        #[arg(long, default_value = "~/.battle-arena-core")]
        data_dir: PathBuf,
    },

    /// Create a lobby and print its id.
    CreateLobby {
        #[arg(long, default_value = "solo")]
        mode: String,

        /// Buy-in in minor units (cents).
        #[arg(long)]
        buy_in: i64,

        #[arg(long, default_value = "winner_take_all")]
        payout_model: String,

        #[arg(long, default_value = "800")]
        rake_bps: u32,

        #[arg(long)]
        rake_cap: Option<i64>,

        #[arg(long, default_value = "~/.battle-arena-core")]
        data_dir: PathBuf,
    },

    /// List all lobbies and their state.
    ListLobbies {
        #[arg(long, default_value = "~/.battle-arena-core")]
        data_dir: PathBuf,
    },
}
