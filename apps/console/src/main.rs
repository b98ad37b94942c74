use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    reducer::{Action, ViewState},
    view::RankedEntry,
    LeaderboardClient, LeaderboardController,
};
use shared::domain::{EntryId, Game, SortDirection, SortKey};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Leaderboard console client")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server_url: String,
    /// Admin password; required for commands that change the leaderboard.
    #[arg(long)]
    password: Option<String>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long, value_enum, default_value_t = SortArg::Points)]
    sort: SortArg,
    #[arg(long)]
    ascending: bool,
    /// Only show entries of this game.
    #[arg(long)]
    game: Option<String>,
    /// Print one leaderboard per game.
    #[arg(long)]
    grouped: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Points,
    Name,
    Created,
}

impl From<SortArg> for SortKey {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Points => SortKey::Points,
            SortArg::Name => SortKey::Name,
            SortArg::Created => SortKey::CreatedAt,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the leaderboard once.
    Show,
    /// Print the leaderboard and keep it updated until interrupted.
    Follow,
    /// Add points to a player, creating the entry if needed.
    Add {
        name: String,
        points: i64,
        #[arg(long)]
        game: Option<String>,
    },
    Set {
        id: i64,
        points: i64,
    },
    Inc {
        id: i64,
    },
    Dec {
        id: i64,
    },
    Delete {
        id: i64,
    },
    /// Delete every entry in every game.
    Clear,
    /// Import a CSV file with a `name,points[,game|games]` header.
    Import {
        path: PathBuf,
    },
    /// Copy an entry's points into other games.
    Copy {
        id: i64,
        #[arg(required = true)]
        games: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let client = LeaderboardClient::new(&cli.server_url)
        .with_context(|| format!("invalid server url: {}", cli.server_url))?;
    client
        .health()
        .await
        .with_context(|| format!("leaderboard server at {} is not ready", client.base_url()))?;
    debug!(url = %client.base_url(), "server healthy");
    let mut controller = LeaderboardController::new(Arc::new(client.clone()));
    controller.mount().await;
    ensure_ok(controller.state())?;

    apply_query(&mut controller, &cli)?;

    let command = cli.command.unwrap_or(Command::Show);
    debug!(?command, "dispatching command");
    if needs_admin(&command) {
        let password = cli
            .password
            .as_deref()
            .ok_or_else(|| anyhow!("--password is required for this command"))?;
        controller.login(password).await;
        ensure_ok(controller.state())?;
    }

    match command {
        Command::Show => {}
        Command::Follow => {
            render(controller.state(), cli.grouped);
            return follow(&client, &mut controller, cli.grouped).await;
        }
        Command::Add { name, points, game } => {
            let game = game
                .map(|raw| resolve_game(controller.state(), &raw))
                .transpose()?;
            controller.add_entry(&name, points, game).await;
        }
        Command::Set { id, points } => {
            controller.begin_edit(EntryId(id));
            if controller.state().editing.is_none() {
                bail!("no entry with id {id}");
            }
            controller.set_edit_points(points);
            controller.save_edit().await;
        }
        Command::Inc { id } => controller.increment(EntryId(id)).await,
        Command::Dec { id } => controller.decrement(EntryId(id)).await,
        Command::Delete { id } => controller.delete(EntryId(id)).await,
        Command::Clear => controller.clear_all().await,
        Command::Import { path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            controller.stage_import(&text);
            ensure_ok(controller.state())?;
            let staged = controller
                .state()
                .staged_import
                .as_ref()
                .map_or(0, Vec::len);
            println!("Staged {staged} row(s) from {}", path.display());
            let summary = controller.apply_import().await;
            println!(
                "Applied {} row(s), {} failed",
                summary.applied, summary.failed
            );
        }
        Command::Copy { id, games } => {
            controller.begin_copy(EntryId(id));
            if controller.state().copy.is_none() {
                bail!("no entry with id {id}");
            }
            for raw in games {
                let game = resolve_game(controller.state(), &raw)?;
                controller.toggle_copy_target(game);
            }
            controller.apply_copy().await;
        }
    }

    ensure_ok(controller.state())?;
    render(controller.state(), cli.grouped);
    Ok(())
}

fn needs_admin(command: &Command) -> bool {
    !matches!(command, Command::Show | Command::Follow)
}

fn apply_query(controller: &mut LeaderboardController, cli: &Cli) -> Result<()> {
    if let Some(search) = &cli.search {
        controller.dispatch(Action::SearchChanged(search.clone()));
    }
    let key = SortKey::from(cli.sort);
    if controller.state().query.sort_key != key {
        controller.dispatch(Action::SortChanged(key));
    }
    let wanted = if cli.ascending {
        SortDirection::Ascending
    } else {
        SortDirection::Descending
    };
    if controller.state().query.direction != wanted {
        controller.dispatch(Action::SortDirectionToggled);
    }
    if let Some(raw) = &cli.game {
        let game = resolve_game(controller.state(), raw)?;
        controller.dispatch(Action::GameFilterChanged(Some(game)));
    }
    Ok(())
}

fn resolve_game(state: &ViewState, raw: &str) -> Result<Game> {
    state
        .catalog
        .resolve(raw)
        .ok_or_else(|| anyhow!("unknown game '{raw}'"))
}

fn ensure_ok(state: &ViewState) -> Result<()> {
    match &state.error {
        Some(message) => bail!("{message}"),
        None => Ok(()),
    }
}

async fn follow(
    client: &LeaderboardClient,
    controller: &mut LeaderboardController,
    grouped: bool,
) -> Result<()> {
    let mut feed = client.subscribe_changes().await?;
    info!("following leaderboard changes; press Ctrl-C to stop");
    loop {
        tokio::select! {
            item = feed.next() => {
                let Some(item) = item else {
                    info!("change feed closed");
                    break;
                };
                controller.apply_remote(item).await;
                if let Some(message) = &controller.state().error {
                    eprintln!("error: {message}");
                }
                render(controller.state(), grouped);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn render(state: &ViewState, grouped: bool) {
    if state.is_empty() {
        println!("No entries yet");
        return;
    }
    if grouped && !state.catalog.is_empty() {
        for group in state.grouped_view() {
            let title = group
                .game
                .as_ref()
                .map_or("Uncategorized", Game::as_str);
            println!("== {title} ==");
            print_rows(&group.entries, false);
        }
    } else {
        print_rows(&state.view(), !state.catalog.is_empty());
    }
}

fn print_rows(rows: &[RankedEntry], show_game: bool) {
    if rows.is_empty() {
        println!("(no matching entries)");
        return;
    }
    for row in rows {
        let entry = &row.entry;
        let mut line = format!(
            "{}  {:<24} {:>8}  #{}",
            row.rank_label(),
            entry.name,
            entry.points,
            entry.id.0
        );
        if show_game {
            if let Some(game) = &entry.game {
                line.push_str(&format!("  [{game}]"));
            }
        }
        println!("{line}");
    }
}
