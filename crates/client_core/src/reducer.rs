//! View state and its transitions.
//!
//! [`ViewState`] is a plain record; [`reduce`] consumes it together with one
//! [`Action`] and returns the next state. No other code mutates view state.

use chrono::{DateTime, Utc};
use shared::{
    domain::{Entry, EntryId, Game, GameCatalog, SortDirection, SortKey},
    import::ImportRow,
    protocol::{AdminSession, LeaderboardEvent},
};

use crate::view::{derive_view, group_by_game, GameGroup, RankedEntry, ViewQuery};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    pub entry_id: EntryId,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyDraft {
    pub source: EntryId,
    pub targets: Vec<Game>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    /// Entries in fetch order (points, highest first).
    pub entries: Vec<Entry>,
    pub catalog: GameCatalog,
    /// False until the catalog has been fetched once.
    pub catalog_loaded: bool,
    pub query: ViewQuery,
    pub editing: Option<EditDraft>,
    pub session: Option<AdminSession>,
    pub show_admin_login: bool,
    /// Rows awaiting confirmation; `Some` while the import preview is open.
    pub staged_import: Option<Vec<ImportRow>>,
    /// `Some` while the copy dialog is open.
    pub copy: Option<CopyDraft>,
    pub error: Option<String>,
    pub loading: bool,
}

impl ViewState {
    pub fn view(&self) -> Vec<RankedEntry> {
        derive_view(&self.entries, &self.query)
    }

    pub fn grouped_view(&self) -> Vec<GameGroup> {
        group_by_game(&self.view(), &self.catalog)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_admin_at(&self, now: DateTime<Utc>) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.is_expired_at(now))
    }

    pub fn entry(&self, entry_id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == entry_id)
    }

    /// Games a copy may target: every catalog game except the source's own.
    pub fn copy_candidates(&self) -> Vec<Game> {
        let source_game = self
            .copy
            .as_ref()
            .and_then(|draft| self.entry(draft.source))
            .and_then(|entry| entry.game.clone());
        self.catalog
            .games()
            .iter()
            .filter(|g| Some(*g) != source_game.as_ref())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    RefreshStarted,
    Refreshed(Vec<Entry>),
    CatalogLoaded(GameCatalog),
    Failed(String),
    ErrorDismissed,
    SearchChanged(String),
    /// Selecting the active key flips direction; a new key starts descending.
    SortChanged(SortKey),
    SortDirectionToggled,
    GameFilterChanged(Option<Game>),
    EditStarted(EntryId),
    EditPointsChanged(i64),
    EditCancelled,
    EditSaved,
    AdminLoginShown(bool),
    AdminLoggedIn(AdminSession),
    AdminLoggedOut,
    ImportStaged(Vec<ImportRow>),
    ImportDismissed,
    CopyStarted(EntryId),
    CopyTargetToggled(Game),
    CopyDismissed,
    Remote(LeaderboardEvent),
}

pub fn reduce(mut state: ViewState, action: Action) -> ViewState {
    match action {
        Action::RefreshStarted => {
            state.loading = true;
        }
        Action::Refreshed(entries) => {
            state.entries = entries;
            state.loading = false;
            state.error = None;
            drop_stale_drafts(&mut state);
        }
        Action::CatalogLoaded(catalog) => {
            if state
                .query
                .game
                .as_ref()
                .is_some_and(|g| !catalog.contains(g))
            {
                state.query.game = None;
            }
            state.catalog = catalog;
            state.catalog_loaded = true;
        }
        Action::Failed(message) => {
            state.error = Some(message);
            state.loading = false;
        }
        Action::ErrorDismissed => {
            state.error = None;
        }
        Action::SearchChanged(search) => {
            state.query.search = search;
        }
        Action::SortChanged(key) => {
            if state.query.sort_key == key {
                state.query.direction = state.query.direction.toggled();
            } else {
                state.query.sort_key = key;
                state.query.direction = SortDirection::Descending;
            }
        }
        Action::SortDirectionToggled => {
            state.query.direction = state.query.direction.toggled();
        }
        Action::GameFilterChanged(game) => {
            state.query.game = game;
        }
        Action::EditStarted(entry_id) => {
            if let Some(points) = state.entry(entry_id).map(|e| e.points) {
                state.editing = Some(EditDraft { entry_id, points });
            }
        }
        Action::EditPointsChanged(points) => {
            if let Some(draft) = state.editing.as_mut() {
                draft.points = points;
            }
        }
        Action::EditCancelled | Action::EditSaved => {
            state.editing = None;
        }
        Action::AdminLoginShown(show) => {
            state.show_admin_login = show && state.session.is_none();
        }
        Action::AdminLoggedIn(session) => {
            state.session = Some(session);
            state.show_admin_login = false;
            state.error = None;
        }
        Action::AdminLoggedOut => {
            state.session = None;
            state.error = None;
            state.editing = None;
            state.staged_import = None;
            state.copy = None;
        }
        Action::ImportStaged(rows) => {
            state.staged_import = Some(rows);
        }
        Action::ImportDismissed => {
            state.staged_import = None;
        }
        Action::CopyStarted(source) => {
            if state.entry(source).is_some() {
                state.copy = Some(CopyDraft {
                    source,
                    targets: Vec::new(),
                });
            }
        }
        Action::CopyTargetToggled(game) => {
            let candidates = state.copy_candidates();
            if let Some(draft) = state.copy.as_mut() {
                if let Some(idx) = draft.targets.iter().position(|g| *g == game) {
                    draft.targets.remove(idx);
                } else if candidates.contains(&game) {
                    draft.targets.push(game);
                }
            }
        }
        Action::CopyDismissed => {
            state.copy = None;
        }
        Action::Remote(event) => apply_event(&mut state, event),
    }
    state
}

/// Applies a change notification as a diff against the local entry set.
fn apply_event(state: &mut ViewState, event: LeaderboardEvent) {
    match event {
        LeaderboardEvent::EntryUpserted { entry } => {
            match state.entries.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = entry,
                None => state.entries.push(entry),
            }
            // Keep fetch order: points descending, stable for ties.
            state.entries.sort_by(|a, b| b.points.cmp(&a.points));
        }
        LeaderboardEvent::EntryDeleted { entry_id } => {
            state.entries.retain(|e| e.id != entry_id);
            drop_stale_drafts(state);
        }
        LeaderboardEvent::LeaderboardCleared => {
            state.entries.clear();
            drop_stale_drafts(state);
        }
        // Handled by the controller with a full refresh.
        LeaderboardEvent::ResyncRequired => {}
    }
}

fn drop_stale_drafts(state: &mut ViewState) {
    let stale_edit = state
        .editing
        .as_ref()
        .is_some_and(|draft| state.entry(draft.entry_id).is_none());
    if stale_edit {
        state.editing = None;
    }
    let stale_copy = state
        .copy
        .as_ref()
        .is_some_and(|draft| state.entry(draft.source).is_none());
    if stale_copy {
        state.copy = None;
    }
}

#[cfg(test)]
#[path = "tests/reducer_tests.rs"]
mod tests;
