//! Derived projections of the fetched entry set: filtering, sorting, ranking
//! and per-category grouping. Everything here is pure and recomputed from
//! state on demand.

use std::cmp::Ordering;

use shared::domain::{Entry, Game, GameCatalog, SortDirection, SortKey};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery {
    pub search: String,
    pub sort_key: SortKey,
    pub direction: SortDirection,
    pub game: Option<Game>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedEntry {
    /// 1-based position in the derived view.
    pub rank: usize,
    pub entry: Entry,
}

impl RankedEntry {
    pub fn rank_label(&self) -> String {
        format!("{:02}", self.rank)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameGroup {
    pub game: Option<Game>,
    pub entries: Vec<RankedEntry>,
}

pub fn matches_search(entry: &Entry, search: &str) -> bool {
    let needle = search.trim();
    needle.is_empty() || entry.name.to_lowercase().contains(&needle.to_lowercase())
}

pub fn compare_entries(a: &Entry, b: &Entry, key: SortKey) -> Ordering {
    match key {
        SortKey::Points => a.points.cmp(&b.points),
        SortKey::Name => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}

/// Category filter, then search filter, then a stable sort. Ties keep the
/// order the entries were fetched in.
pub fn derive_view(entries: &[Entry], query: &ViewQuery) -> Vec<RankedEntry> {
    let mut rows: Vec<&Entry> = entries
        .iter()
        .filter(|e| query.game.is_none() || e.game == query.game)
        .filter(|e| matches_search(e, &query.search))
        .collect();

    rows.sort_by(|a, b| {
        let ordering = compare_entries(a, b, query.sort_key);
        match query.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });

    rows.into_iter()
        .enumerate()
        .map(|(idx, entry)| RankedEntry {
            rank: idx + 1,
            entry: entry.clone(),
        })
        .collect()
}

/// Splits a derived view into per-category leaderboards in catalog order,
/// re-ranking within each group. Uncategorized entries come last.
pub fn group_by_game(rows: &[RankedEntry], catalog: &GameCatalog) -> Vec<GameGroup> {
    let mut groups: Vec<GameGroup> = Vec::new();
    for row in rows {
        let game = row.entry.game.clone();
        let group = match groups.iter_mut().position(|g| g.game == game) {
            Some(idx) => &mut groups[idx],
            None => {
                groups.push(GameGroup {
                    game,
                    entries: Vec::new(),
                });
                let last = groups.len() - 1;
                &mut groups[last]
            }
        };
        group.entries.push(RankedEntry {
            rank: group.entries.len() + 1,
            entry: row.entry.clone(),
        });
    }

    groups.sort_by_key(|g| (g.game.is_none(), catalog.position(g.game.as_ref())));
    groups
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
