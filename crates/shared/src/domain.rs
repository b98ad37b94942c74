use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(EntryId);

/// Category label partitioning entries into independent leaderboards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Game(String);

impl Game {
    /// Wraps a stored label without checking it against a catalog.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of categories an entry may belong to.
///
/// An empty catalog means the leaderboard is uncategorized: entries carry no
/// game and CSV imports do not require a game column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameCatalog {
    games: Vec<Game>,
}

impl GameCatalog {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut games: Vec<Game> = Vec::new();
        for label in labels {
            let label = label.as_ref().trim();
            if label.is_empty() || games.iter().any(|g| g.0.eq_ignore_ascii_case(label)) {
                continue;
            }
            games.push(Game(label.to_string()));
        }
        Self { games }
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn games(&self) -> &[Game] {
        &self.games
    }

    /// Maps user input onto the catalog's canonical label.
    pub fn resolve(&self, raw: &str) -> Option<Game> {
        let raw = raw.trim();
        self.games
            .iter()
            .find(|g| g.0.eq_ignore_ascii_case(raw))
            .cloned()
    }

    pub fn contains(&self, game: &Game) -> bool {
        self.games.contains(game)
    }

    /// Position used to order per-category groups; unknown games sort last.
    pub fn position(&self, game: Option<&Game>) -> usize {
        game.and_then(|g| self.games.iter().position(|known| known == g))
            .unwrap_or(self.games.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub name: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<Game>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Points,
    Name,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// Key used for case-insensitive de-duplication of player names.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
