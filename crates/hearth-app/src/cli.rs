//! CLI argument definitions for the Hearth application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use hearth_core::config::HearthConfig;

/// Hearth: find a place to rent by chatting about it.
#[derive(Parser, Debug)]
#[command(name = "hearth", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory holding the catalog database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Catalog database file. Overrides the data directory.
    #[arg(long = "db")]
    pub db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Start an interactive chat session (default).
    Chat,
    /// Import listings from a JSON array file.
    Import {
        /// Path to the JSON file.
        file: PathBuf,
    },
    /// Print the neighborhoods the catalog knows about.
    Neighborhoods,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > HEARTH_CONFIG env var > platform default (~/.hearth/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("HEARTH_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the catalog database path.
    ///
    /// Priority: --db flag > HEARTH_DB env var > data dir (flag or config) joined
    /// with `storage.database_file`.
    pub fn resolve_db_path(&self, config: &HearthConfig) -> PathBuf {
        if let Some(ref p) = self.db {
            return p.clone();
        }
        if let Ok(p) = std::env::var("HEARTH_DB") {
            return PathBuf::from(p);
        }
        let data_dir = match self.data_dir {
            Some(ref dir) => dir.clone(),
            None => expand_home(&config.general.data_dir),
        };
        data_dir.join(&config.storage.database_file)
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config: &HearthConfig) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config.general.log_level.clone())
    }

    /// The subcommand to run; a bare invocation starts a chat.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Chat)
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".hearth").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}
