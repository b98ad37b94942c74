//! CSV ingestion for bulk leaderboard imports.
//!
//! The first line is a header naming the columns; every following line is
//! split on commas and read positionally in the header's column order. Rows
//! that cannot be applied are dropped rather than failing the whole import.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Game, GameCatalog};

const GAMES_SEPARATOR: char = ';';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("CSV text is empty")]
    Empty,
    #[error("CSV header is missing the '{0}' column")]
    MissingColumn(&'static str),
    #[error("no valid rows found in CSV")]
    NoValidRows,
}

/// One staged row, ready to be applied through add-or-accumulate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    pub name: String,
    pub points: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub games: Vec<Game>,
}

impl ImportRow {
    /// Categories this row is applied to; uncategorized rows apply once.
    pub fn targets(&self) -> Vec<Option<Game>> {
        if self.games.is_empty() {
            vec![None]
        } else {
            self.games.iter().cloned().map(Some).collect()
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum GameColumn {
    Single(usize),
    Multi(usize),
}

struct Header {
    name: usize,
    points: usize,
    game: Option<GameColumn>,
}

impl Header {
    fn parse(line: &str, categorized: bool) -> Result<Self, ImportError> {
        let columns: Vec<String> = line
            .split(',')
            .map(|c| c.trim().to_ascii_lowercase())
            .collect();
        let position = |wanted: &str| columns.iter().position(|c| c == wanted);

        let name = position("name").ok_or(ImportError::MissingColumn("name"))?;
        let points = position("points").ok_or(ImportError::MissingColumn("points"))?;
        let game = match (position("games"), position("game")) {
            (Some(idx), _) => Some(GameColumn::Multi(idx)),
            (None, Some(idx)) => Some(GameColumn::Single(idx)),
            (None, None) => None,
        };
        if categorized && game.is_none() {
            return Err(ImportError::MissingColumn("game"));
        }

        Ok(Self {
            name,
            points,
            game: if categorized { game } else { None },
        })
    }

    fn row(&self, line: &str, catalog: &GameCatalog) -> Option<ImportRow> {
        let cells: Vec<&str> = line.split(',').map(str::trim).collect();

        let name = cells.get(self.name).copied().unwrap_or_default();
        if name.is_empty() {
            return None;
        }
        let points = cells.get(self.points)?.parse::<i64>().ok()?;
        if points < 0 {
            return None;
        }

        let games = match self.game {
            None => Vec::new(),
            Some(GameColumn::Single(idx)) => vec![catalog.resolve(cells.get(idx)?)?],
            Some(GameColumn::Multi(idx)) => {
                let mut games = Vec::new();
                for raw in cells.get(idx)?.split(GAMES_SEPARATOR) {
                    if raw.trim().is_empty() {
                        continue;
                    }
                    let game = catalog.resolve(raw)?;
                    if !games.contains(&game) {
                        games.push(game);
                    }
                }
                if games.is_empty() {
                    return None;
                }
                games
            }
        };

        Some(ImportRow {
            name: name.to_string(),
            points,
            games,
        })
    }
}

/// Parses CSV text into staged rows.
///
/// A game column is required when the catalog defines categories. Rows with an
/// empty name, non-numeric or negative points, or an unknown game are skipped.
pub fn parse_csv(text: &str, catalog: &GameCatalog) -> Result<Vec<ImportRow>, ImportError> {
    let mut lines = text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty());

    let header_line = lines.next().ok_or(ImportError::Empty)?;
    let header = Header::parse(header_line, !catalog.is_empty())?;

    Ok(lines.filter_map(|line| header.row(line, catalog)).collect())
}

#[cfg(test)]
#[path = "tests/import_tests.rs"]
mod tests;
