use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::{
    domain::{Game, GameCatalog},
    import::{parse_csv, ImportError},
};
use storage::{Storage, UpsertMode};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Maintenance commands that talk to the leaderboard database directly.
/// Connected clients are not notified of these writes.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/leaderboard.db")]
    database_url: String,
    /// Comma-separated game catalog used to validate games.
    #[arg(long, default_value = "")]
    games: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List {
        #[arg(long)]
        game: Option<String>,
    },
    Add {
        name: String,
        points: i64,
        #[arg(long)]
        game: Option<String>,
    },
    Import {
        path: PathBuf,
    },
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    let catalog = GameCatalog::new(cli.games.split(','));
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;

    match cli.command {
        Command::List { game } => {
            let game = game.map(|raw| resolve(&catalog, &raw)).transpose()?;
            for entry in storage.list_entries(game.as_ref()).await? {
                let game = entry.game.as_ref().map(Game::as_str).unwrap_or("-");
                println!("{}\t{}\t{}\t{}", entry.id.0, entry.name, entry.points, game);
            }
        }
        Command::Add { name, points, game } => {
            if name.trim().is_empty() {
                bail!("name cannot be empty");
            }
            if points < 0 {
                bail!("points cannot be negative");
            }
            let game = game.map(|raw| resolve(&catalog, &raw)).transpose()?;
            if game.is_none() && !catalog.is_empty() {
                bail!("a game is required");
            }
            let entry = storage
                .upsert_entry(&name, points, game.as_ref(), UpsertMode::Accumulate)
                .await?;
            println!("entry_id={} points={}", entry.id.0, entry.points);
        }
        Command::Import { path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let rows = parse_csv(&text, &catalog)?;
            if rows.is_empty() {
                return Err(ImportError::NoValidRows.into());
            }
            let mut applied = 0usize;
            for row in &rows {
                for game in row.targets() {
                    match storage
                        .upsert_entry(&row.name, row.points, game.as_ref(), UpsertMode::Accumulate)
                        .await
                    {
                        Ok(_) => applied += 1,
                        Err(error) => warn!(name = %row.name, %error, "import row failed"),
                    }
                }
            }
            info!(rows = rows.len(), applied, "import finished");
            println!("applied {applied} row(s)");
        }
        Command::Clear => {
            let deleted = storage.clear_entries().await?;
            println!("deleted {deleted} entries");
        }
    }

    Ok(())
}

fn resolve(catalog: &GameCatalog, raw: &str) -> Result<Game> {
    if catalog.is_empty() {
        bail!("categories are not enabled; pass --games to define them");
    }
    catalog
        .resolve(raw)
        .with_context(|| format!("unknown game '{raw}'"))
}
