use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::debug;

use shared::domain::{name_key, Entry, EntryId, Game};

const ENTRY_COLUMNS: &str = "id, name, points, game, created_at";

/// Failures callers tell apart from database errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The new total would not fit in a signed 64-bit integer. The stored
    /// row is left unchanged.
    #[error("points out of range")]
    PointsOutOfRange,
}

/// How an upsert treats the points of a row that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// Add the submitted points to the stored total.
    Accumulate,
    /// Replace the stored total with the submitted points.
    Replace,
}

impl UpsertMode {
    fn sql(self) -> String {
        // SQLite turns an overflowing integer sum into a REAL, so the
        // accumulate arm only updates while the sum still fits.
        let update = match self {
            UpsertMode::Accumulate => {
                "points = entries.points + excluded.points
                 WHERE excluded.points <= 0 OR entries.points <= 9223372036854775807 - excluded.points"
            }
            UpsertMode::Replace => "points = excluded.points",
        };
        format!(
            "INSERT INTO entries (name, name_key, points, game, created_at) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(game, name_key) DO UPDATE SET {update}
             RETURNING {ENTRY_COLUMNS}"
        )
    }
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        // Every connection to an in-memory database opens a distinct database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };
        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Lists entries ordered by points, highest first. With a game, only that
    /// category's rows are returned.
    pub async fn list_entries(&self, game: Option<&Game>) -> Result<Vec<Entry>> {
        let rows = match game {
            Some(game) => {
                sqlx::query(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries WHERE game = ? ORDER BY points DESC, id ASC"
                ))
                .bind(game.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries ORDER BY points DESC, id ASC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(entry_from_row).collect()
    }

    pub async fn get_entry(&self, entry_id: EntryId) -> Result<Option<Entry>> {
        let row = sqlx::query(&format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"))
            .bind(entry_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    /// Inserts the row or updates the existing row with the same name and
    /// category in one statement. Fails with [`StorageError::PointsOutOfRange`]
    /// when accumulating would overflow.
    pub async fn upsert_entry(
        &self,
        name: &str,
        points: i64,
        game: Option<&Game>,
        mode: UpsertMode,
    ) -> Result<Entry> {
        let row = sqlx::query(&mode.sql())
            .bind(name.trim())
            .bind(name_key(name))
            .bind(points)
            .bind(game_column(game))
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to upsert entry '{}'", name.trim()))?;
        // Only a conflicting row whose guarded update was skipped returns nothing.
        let Some(row) = row else {
            return Err(StorageError::PointsOutOfRange.into());
        };
        let entry = entry_from_row(&row)?;
        debug!(entry_id = entry.id.0, points = entry.points, ?mode, "upserted entry");
        Ok(entry)
    }

    pub async fn set_points(&self, entry_id: EntryId, points: i64) -> Result<Option<Entry>> {
        let row = sqlx::query(&format!(
            "UPDATE entries SET points = ? WHERE id = ? RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(points)
        .bind(entry_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    /// Adds `delta` to the stored points, never going below zero. Returns
    /// `None` for a missing row and [`StorageError::PointsOutOfRange`] when
    /// the total would overflow.
    pub async fn adjust_points(&self, entry_id: EntryId, delta: i64) -> Result<Option<Entry>> {
        let row = sqlx::query(&format!(
            "UPDATE entries SET points = MAX(points + ?, 0)
             WHERE id = ? AND (? <= 0 OR points <= 9223372036854775807 - ?)
             RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(delta)
        .bind(entry_id.0)
        .bind(delta)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => entry_from_row(&row).map(Some),
            None if self.get_entry(entry_id).await?.is_some() => {
                Err(StorageError::PointsOutOfRange.into())
            }
            None => Ok(None),
        }
    }

    pub async fn delete_entry(&self, entry_id: EntryId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM entries WHERE id = ?")
            .bind(entry_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes every row across all categories.
    pub async fn clear_entries(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM entries")
            .execute(&self.pool)
            .await
            .context("failed to clear entries")?;
        Ok(result.rows_affected())
    }

    /// Writes the source's points into the same-named row of every target
    /// category. The source's own category is skipped.
    pub async fn copy_points(&self, source: &Entry, targets: &[Game]) -> Result<Vec<Entry>> {
        let sql = UpsertMode::Replace.sql();
        let mut tx = self.pool.begin().await?;
        let mut written = Vec::with_capacity(targets.len());
        for target in targets {
            if source.game.as_ref() == Some(target) {
                continue;
            }
            let row = sqlx::query(&sql)
                .bind(source.name.trim())
                .bind(name_key(&source.name))
                .bind(source.points)
                .bind(target.as_str())
                .bind(Utc::now())
                .fetch_one(&mut *tx)
                .await
                .with_context(|| format!("failed to copy points into '{target}'"))?;
            written.push(entry_from_row(&row)?);
        }
        tx.commit().await?;
        Ok(written)
    }
}

fn game_column(game: Option<&Game>) -> &str {
    game.map(Game::as_str).unwrap_or_default()
}

fn entry_from_row(row: &SqliteRow) -> Result<Entry> {
    let game: String = row.try_get("game")?;
    Ok(Entry {
        id: EntryId(row.try_get::<i64, _>("id")?),
        name: row.try_get("name")?,
        points: row.try_get("points")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        game: (!game.is_empty()).then(|| Game::new(game)),
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
