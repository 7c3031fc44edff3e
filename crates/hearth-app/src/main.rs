//! Hearth application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite catalog (listings + FTS5 index)
//! 4. Run the requested command: interactive chat, import or neighborhoods

mod cli;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use hearth_chat::{ChatOrchestrator, SessionId, TemplateComposer};
use hearth_core::catalog::{FullTextIndex, PropertyCatalog};
use hearth_core::config::HearthConfig;
use hearth_core::types::NewListing;
use hearth_storage::{Database, ListingRepository, ListingSearch};

use cli::{CliArgs, Command};

/// Seconds between sweeps for idle chat sessions.
const PURGE_INTERVAL_SECS: u64 = 60;

/// Import a JSON array of listings into the catalog.
fn import_listings(repo: &ListingRepository, file: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)?;
    let listings: Vec<NewListing> = serde_json::from_str(&content)?;
    let ids = repo.insert_many(&listings)?;
    tracing::info!(count = ids.len(), path = %file.display(), "Listings imported");
    Ok(ids.len())
}

/// Read utterances from stdin until EOF or an exit word.
async fn chat_loop(orchestrator: Arc<ChatOrchestrator>) -> Result<(), Box<dyn std::error::Error>> {
    let session = SessionId::from(uuid::Uuid::new_v4());
    tracing::info!(session_id = %session, "Chat session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if matches!(line.to_lowercase().as_str(), "quit" | "exit" | "sair") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        match orchestrator.handle_turn(&session, line).await {
            Ok(reply) => println!("{}\n", reply.text),
            Err(e) => println!("({})\n", e),
        }
    }

    orchestrator.end_session(&session);
    tracing::info!(session_id = %session, "Chat session ended");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config = HearthConfig::load_or_default(&config_file);

    // Tracing. RUST_LOG wins over --log-level and the config file.
    let log_level = args.resolve_log_level(&config);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Hearth v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Storage.
    let db_path = args.resolve_db_path(&config);
    let db = match Database::new(&db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(path = %db_path.display(), error = %e, "Failed to open catalog database");
            return Err(e.into());
        }
    };
    let repo = Arc::new(ListingRepository::new(Arc::clone(&db)));
    tracing::info!(path = %db_path.display(), listings = repo.count()?, "Catalog opened");

    match args.command() {
        Command::Import { file } => {
            let count = import_listings(&repo, &file)?;
            println!("Imported {} listings.", count);
        }
        Command::Neighborhoods => {
            for name in repo.neighborhoods()? {
                println!("{}", name);
            }
        }
        Command::Chat => {
            let index: Arc<dyn FullTextIndex> = Arc::new(ListingSearch::new(Arc::clone(&db)));
            let orchestrator = Arc::new(ChatOrchestrator::new(
                &config,
                repo as Arc<dyn PropertyCatalog>,
                Some(index),
                Arc::new(TemplateComposer),
            ));

            // Session sweeper.
            let sweeper = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(tokio::time::Duration::from_secs(PURGE_INTERVAL_SECS));
                loop {
                    interval.tick().await;
                    sweeper.purge_expired();
                }
            });

            chat_loop(orchestrator).await?;
        }
    }

    Ok(())
}
