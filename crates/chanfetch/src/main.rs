// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! chanfetch - watches Telegram channels and downloads matching videos.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod serve;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::error;

/// chanfetch - watches Telegram channels and downloads matching videos.
#[derive(Parser, Debug)]
#[command(name = "chanfetch", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the engine until SIGINT or SIGTERM.
    Serve,
    /// Scan every eligible item once and print the number of new downloads.
    Scan,
    /// List items as JSON.
    Items {
        /// Include items whose last match is older than the scan threshold.
        #[arg(long)]
        all: bool,
    },
    /// Create an item.
    AddItem(AddItemArgs),
    /// List the downloads of an item as JSON.
    Downloads {
        /// Item id.
        item: i64,
    },
    /// Re-queue a download.
    Reset {
        /// Download id.
        id: i64,
    },
}

#[derive(Args, Debug)]
pub(crate) struct AddItemArgs {
    /// Channel to watch.
    #[arg(long, allow_hyphen_values = true)]
    pub channel: i64,
    #[arg(long)]
    pub name: String,
    /// Regexp applied to captions.
    #[arg(long)]
    pub regexp: String,
    /// Naming template for finished files, e.g. `ep$1`.
    #[arg(long)]
    pub pattern: String,
    #[arg(long, default_value = "")]
    pub match_pattern: String,
    #[arg(long, default_value = "")]
    pub match_content: String,
    #[arg(long, default_value_t = 1)]
    pub priority: i32,
    /// Directory finished files are moved into.
    #[arg(long)]
    pub target: String,
    /// Only messages posted after this unix timestamp are scanned. Defaults to now.
    #[arg(long)]
    pub since: Option<i64>,
    /// Message to queue right away. Repeatable.
    #[arg(long = "message")]
    pub messages: Vec<i64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => chanfetch_config::load_and_validate_path(path),
        None => chanfetch_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            chanfetch_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    serve::init_tracing(&config.app.log_level);

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Scan => commands::run_scan(&config).await,
        Commands::Items { all } => commands::run_items(&config, all).await,
        Commands::AddItem(args) => commands::run_add_item(&config, args).await,
        Commands::Downloads { item } => commands::run_downloads(&config, item).await,
        Commands::Reset { id } => commands::run_reset(&config, id).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn add_item_accepts_negative_channel_and_repeated_messages() {
        let cli = Cli::try_parse_from([
            "chanfetch",
            "--config",
            "/tmp/c.toml",
            "add-item",
            "--channel",
            "-1001",
            "--name",
            "show",
            "--regexp",
            r"S(\d+)E(\d+)",
            "--pattern",
            "ep$2",
            "--target",
            "/srv/show",
            "--message",
            "5",
            "--message",
            "6",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/c.toml")));
        let Commands::AddItem(args) = cli.command else {
            panic!("expected add-item");
        };
        assert_eq!(args.channel, -1001);
        assert_eq!(args.priority, 1);
        assert_eq!(args.messages, vec![5, 6]);
        assert!(args.since.is_none());
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["chanfetch"]).is_err());
        assert!(matches!(
            Cli::try_parse_from(["chanfetch", "reset", "9"]).unwrap().command,
            Commands::Reset { id: 9 }
        ));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = chanfetch_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.app.log_level, "info");
    }
}
