use chrono::Utc;
use shared::{
    domain::{Entry, EntryId, Game, GameCatalog},
    error::{ApiError, ErrorCode},
    protocol::{AddEntryRequest, AdminSession, LeaderboardEvent},
};
use storage::{Storage, StorageError, UpsertMode};
use tracing::{info, warn};

pub mod auth;

pub use auth::AdminAuthConfig;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub catalog: GameCatalog,
    pub auth: AdminAuthConfig,
}

pub async fn list_entries(ctx: &ApiContext, game: Option<Game>) -> Result<Vec<Entry>, ApiError> {
    let game = game.map(|g| resolve_game(ctx, &g)).transpose()?;
    ctx.storage
        .list_entries(game.as_ref())
        .await
        .map_err(storage_failure)
}

pub fn list_games(ctx: &ApiContext) -> Vec<Game> {
    ctx.catalog.games().to_vec()
}

pub fn admin_login(ctx: &ApiContext, password: &str) -> Result<AdminSession, ApiError> {
    if !auth::password_matches(&ctx.auth, password) {
        warn!("rejected admin login");
        return Err(ApiError::unauthorized("Invalid admin password"));
    }
    auth::mint_admin_token(&ctx.auth, Utc::now())
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("token mint failed: {e}")))
}

/// Rejects requests that do not carry a valid admin token.
pub fn authorize(ctx: &ApiContext, token: Option<&str>) -> Result<(), ApiError> {
    let Some(token) = token else {
        return Err(ApiError::unauthorized("Admin access required"));
    };
    auth::verify_admin_token(&ctx.auth, token)
        .map_err(|e| ApiError::unauthorized(format!("invalid admin token: {e}")))
}

/// Adds points to the same-named row in the category, creating it if absent.
pub async fn add_entry(ctx: &ApiContext, req: AddEntryRequest) -> Result<LeaderboardEvent, ApiError> {
    let name = validate_name(&req.name)?;
    validate_points(req.points)?;
    let game = entry_game(ctx, req.game.as_ref())?;

    let entry = ctx
        .storage
        .upsert_entry(name, req.points, game.as_ref(), UpsertMode::Accumulate)
        .await
        .map_err(storage_failure)?;
    info!(entry_id = entry.id.0, points = entry.points, "entry added");
    Ok(LeaderboardEvent::EntryUpserted { entry })
}

pub async fn set_points(
    ctx: &ApiContext,
    entry_id: EntryId,
    points: i64,
) -> Result<LeaderboardEvent, ApiError> {
    validate_points(points)?;
    let entry = ctx
        .storage
        .set_points(entry_id, points)
        .await
        .map_err(storage_failure)?
        .ok_or_else(entry_not_found)?;
    Ok(LeaderboardEvent::EntryUpserted { entry })
}

pub async fn increment_points(
    ctx: &ApiContext,
    entry_id: EntryId,
) -> Result<LeaderboardEvent, ApiError> {
    adjust_points(ctx, entry_id, 1).await
}

pub async fn decrement_points(
    ctx: &ApiContext,
    entry_id: EntryId,
) -> Result<LeaderboardEvent, ApiError> {
    adjust_points(ctx, entry_id, -1).await
}

async fn adjust_points(
    ctx: &ApiContext,
    entry_id: EntryId,
    delta: i64,
) -> Result<LeaderboardEvent, ApiError> {
    let entry = ctx
        .storage
        .adjust_points(entry_id, delta)
        .await
        .map_err(storage_failure)?
        .ok_or_else(entry_not_found)?;
    Ok(LeaderboardEvent::EntryUpserted { entry })
}

pub async fn delete_entry(ctx: &ApiContext, entry_id: EntryId) -> Result<LeaderboardEvent, ApiError> {
    let deleted = ctx
        .storage
        .delete_entry(entry_id)
        .await
        .map_err(storage_failure)?;
    if !deleted {
        return Err(entry_not_found());
    }
    info!(entry_id = entry_id.0, "entry deleted");
    Ok(LeaderboardEvent::EntryDeleted { entry_id })
}

pub async fn clear_entries(ctx: &ApiContext) -> Result<(u64, LeaderboardEvent), ApiError> {
    let deleted = ctx.storage.clear_entries().await.map_err(storage_failure)?;
    info!(deleted, "leaderboard cleared");
    Ok((deleted, LeaderboardEvent::LeaderboardCleared))
}

/// Sets the same-named row in each target game to the source's points.
pub async fn copy_entry(
    ctx: &ApiContext,
    entry_id: EntryId,
    targets: Vec<Game>,
) -> Result<Vec<LeaderboardEvent>, ApiError> {
    if ctx.catalog.is_empty() {
        return Err(ApiError::validation("categories are not enabled"));
    }
    let source = ctx
        .storage
        .get_entry(entry_id)
        .await
        .map_err(storage_failure)?
        .ok_or_else(entry_not_found)?;

    let mut resolved: Vec<Game> = Vec::with_capacity(targets.len());
    for target in &targets {
        let game = resolve_game(ctx, target)?;
        if source.game.as_ref() != Some(&game) && !resolved.contains(&game) {
            resolved.push(game);
        }
    }
    if resolved.is_empty() {
        return Err(ApiError::validation("select at least one other game"));
    }

    let written = ctx
        .storage
        .copy_points(&source, &resolved)
        .await
        .map_err(storage_failure)?;
    info!(
        entry_id = entry_id.0,
        targets = written.len(),
        "entry points copied"
    );
    Ok(written
        .into_iter()
        .map(|entry| LeaderboardEvent::EntryUpserted { entry })
        .collect())
}

fn validate_name(raw: &str) -> Result<&str, ApiError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name cannot be empty"));
    }
    Ok(name)
}

fn validate_points(points: i64) -> Result<(), ApiError> {
    if points < 0 {
        return Err(ApiError::validation("points cannot be negative"));
    }
    Ok(())
}

/// Categorized leaderboards require a known game; uncategorized ones refuse one.
fn entry_game(ctx: &ApiContext, game: Option<&Game>) -> Result<Option<Game>, ApiError> {
    match (ctx.catalog.is_empty(), game) {
        (true, None) => Ok(None),
        (true, Some(_)) => Err(ApiError::validation("categories are not enabled")),
        (false, None) => Err(ApiError::validation("a game is required")),
        (false, Some(game)) => resolve_game(ctx, game).map(Some),
    }
}

fn resolve_game(ctx: &ApiContext, game: &Game) -> Result<Game, ApiError> {
    ctx.catalog
        .resolve(game.as_str())
        .ok_or_else(|| ApiError::validation(format!("unknown game '{game}'")))
}

fn entry_not_found() -> ApiError {
    ApiError::not_found("entry not found")
}

fn storage_failure(err: anyhow::Error) -> ApiError {
    match err.downcast_ref::<StorageError>() {
        Some(StorageError::PointsOutOfRange) => ApiError::validation("points out of range"),
        None => ApiError::new(ErrorCode::Internal, err.to_string()),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
