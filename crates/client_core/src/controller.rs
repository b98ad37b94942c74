//! Drives [`ViewState`] through the remote service: every operation awaits
//! its call, then feeds the outcome to the reducer.

use std::{mem, sync::Arc};

use chrono::Utc;
use shared::{
    domain::{EntryId, Game, GameCatalog},
    import::{parse_csv, ImportError},
    protocol::{AddEntryRequest, AdminSession, LeaderboardEvent},
};
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, ClientResult},
    reducer::{reduce, Action, ViewState},
    LeaderboardService,
};

const ADMIN_REQUIRED: &str = "Admin access required";
const CATALOG_MISSING: &str = "Game catalog is not loaded; reload and try again";

/// Outcome of applying staged import rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub applied: usize,
    pub failed: usize,
}

pub struct LeaderboardController {
    service: Arc<dyn LeaderboardService>,
    state: ViewState,
}

impl LeaderboardController {
    pub fn new(service: Arc<dyn LeaderboardService>) -> Self {
        Self {
            service,
            state: ViewState::default(),
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn dispatch(&mut self, action: Action) {
        let state = mem::take(&mut self.state);
        self.state = reduce(state, action);
    }

    /// Loads the category catalog, then the entry set. A catalog failure is
    /// reported again after the refresh so it stays visible.
    pub async fn mount(&mut self) {
        let catalog_error = match self.service.list_games().await {
            Ok(games) => {
                let catalog = GameCatalog::new(games.iter().map(Game::as_str));
                self.dispatch(Action::CatalogLoaded(catalog));
                None
            }
            Err(err) => Some(err),
        };
        self.refresh().await;
        if let Some(err) = catalog_error {
            self.fail(err);
        }
    }

    pub async fn refresh(&mut self) {
        self.dispatch(Action::RefreshStarted);
        match self.service.list_entries(None).await {
            Ok(entries) => {
                debug!(count = entries.len(), "entries refreshed");
                self.dispatch(Action::Refreshed(entries));
            }
            Err(err) => self.fail(err),
        }
    }

    pub async fn login(&mut self, password: &str) {
        match self.service.admin_login(password).await {
            Ok(session) => {
                info!(expires_at = %session.expires_at, "admin session started");
                self.dispatch(Action::AdminLoggedIn(session));
            }
            Err(err) => self.fail(err),
        }
    }

    pub fn logout(&mut self) {
        self.dispatch(Action::AdminLoggedOut);
    }

    pub async fn add_entry(&mut self, name: &str, points: i64, game: Option<Game>) {
        let Some(session) = self.admin_session() else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            self.dispatch(Action::Failed("Name is required".into()));
            return;
        }
        if points < 0 {
            self.dispatch(Action::Failed("points cannot be negative".into()));
            return;
        }
        let request = AddEntryRequest {
            name: name.to_string(),
            points,
            game,
        };
        let result = self.service.add_entry(&session, request).await;
        self.settle(result).await;
    }

    pub fn begin_edit(&mut self, entry_id: EntryId) {
        self.dispatch(Action::EditStarted(entry_id));
    }

    pub fn set_edit_points(&mut self, points: i64) {
        self.dispatch(Action::EditPointsChanged(points));
    }

    pub fn cancel_edit(&mut self) {
        self.dispatch(Action::EditCancelled);
    }

    /// Writes the pending value. The draft stays open if the write fails.
    pub async fn save_edit(&mut self) {
        let Some(draft) = self.state.editing.clone() else {
            return;
        };
        let Some(session) = self.admin_session() else {
            return;
        };
        if draft.points < 0 {
            self.dispatch(Action::Failed("points cannot be negative".into()));
            return;
        }
        let result = self
            .service
            .set_points(&session, draft.entry_id, draft.points)
            .await;
        if result.is_ok() {
            self.dispatch(Action::EditSaved);
        }
        self.settle(result).await;
    }

    pub async fn increment(&mut self, entry_id: EntryId) {
        let Some(session) = self.admin_session() else {
            return;
        };
        let result = self.service.increment_points(&session, entry_id).await;
        self.settle(result).await;
    }

    pub async fn decrement(&mut self, entry_id: EntryId) {
        let Some(session) = self.admin_session() else {
            return;
        };
        let result = self.service.decrement_points(&session, entry_id).await;
        self.settle(result).await;
    }

    pub async fn delete(&mut self, entry_id: EntryId) {
        let Some(session) = self.admin_session() else {
            return;
        };
        let result = self.service.delete_entry(&session, entry_id).await;
        self.settle(result).await;
    }

    pub async fn clear_all(&mut self) {
        let Some(session) = self.admin_session() else {
            return;
        };
        let result = self.service.clear_entries(&session).await;
        self.settle(result).await;
    }

    /// Parses CSV text against the loaded catalog and opens the preview.
    /// Without a catalog the game columns cannot be resolved, so nothing is
    /// staged.
    pub fn stage_import(&mut self, text: &str) {
        if self.admin_session().is_none() {
            return;
        }
        if !self.state.catalog_loaded {
            self.dispatch(Action::Failed(CATALOG_MISSING.into()));
            return;
        }
        let parsed = parse_csv(text, &self.state.catalog).and_then(|rows| {
            if rows.is_empty() {
                Err(ImportError::NoValidRows)
            } else {
                Ok(rows)
            }
        });
        match parsed {
            Ok(rows) => {
                debug!(rows = rows.len(), "import staged");
                self.dispatch(Action::ImportStaged(rows));
            }
            Err(err) => self.fail(err.into()),
        }
    }

    pub fn dismiss_import(&mut self) {
        self.dispatch(Action::ImportDismissed);
    }

    /// Applies staged rows one at a time through add-or-accumulate, once per
    /// target category. Failures do not stop the run; the last one is shown
    /// after the closing refresh.
    pub async fn apply_import(&mut self) -> ImportSummary {
        let mut summary = ImportSummary::default();
        let Some(rows) = self.state.staged_import.clone() else {
            return summary;
        };
        let Some(session) = self.admin_session() else {
            return summary;
        };

        let mut last_error: Option<ClientError> = None;
        for row in &rows {
            for game in row.targets() {
                let request = AddEntryRequest {
                    name: row.name.clone(),
                    points: row.points,
                    game,
                };
                match self.service.add_entry(&session, request).await {
                    Ok(_) => summary.applied += 1,
                    Err(err) => {
                        warn!(name = %row.name, %err, "import row failed");
                        summary.failed += 1;
                        last_error = Some(err);
                    }
                }
            }
        }
        info!(
            applied = summary.applied,
            failed = summary.failed,
            "import applied"
        );

        self.dispatch(Action::ImportDismissed);
        self.refresh().await;
        if let Some(err) = last_error {
            self.fail(err);
        }
        summary
    }

    pub fn begin_copy(&mut self, source: EntryId) {
        self.dispatch(Action::CopyStarted(source));
    }

    pub fn toggle_copy_target(&mut self, game: Game) {
        self.dispatch(Action::CopyTargetToggled(game));
    }

    pub fn cancel_copy(&mut self) {
        self.dispatch(Action::CopyDismissed);
    }

    /// Sets the source's points on its same-named row in each selected game.
    pub async fn apply_copy(&mut self) {
        let Some(draft) = self.state.copy.clone() else {
            return;
        };
        let Some(session) = self.admin_session() else {
            return;
        };
        if draft.targets.is_empty() {
            self.dispatch(Action::Failed("select at least one other game".into()));
            return;
        }
        let result = self
            .service
            .copy_entry(&session, draft.source, draft.targets)
            .await;
        if result.is_ok() {
            self.dispatch(Action::CopyDismissed);
        }
        self.settle(result).await;
    }

    /// Applies one item from the live feed. A feed error or a resync request
    /// means the local set may have missed a change, so it is re-fetched.
    pub async fn apply_remote(&mut self, item: ClientResult<LeaderboardEvent>) {
        match item {
            Ok(LeaderboardEvent::ResyncRequired) => {
                info!("change feed requested resync");
                self.refresh().await;
            }
            Ok(event) => {
                debug!(?event, "applying change event");
                self.dispatch(Action::Remote(event));
            }
            Err(err) => {
                warn!(%err, "change feed error; refreshing");
                self.refresh().await;
            }
        }
    }

    /// Returns the active session, or records why admin actions are refused.
    fn admin_session(&mut self) -> Option<AdminSession> {
        let now = Utc::now();
        match self.state.session.clone() {
            Some(session) if !session.is_expired_at(now) => Some(session),
            Some(_) => {
                info!("admin session expired");
                self.dispatch(Action::AdminLoggedOut);
                self.dispatch(Action::Failed(ADMIN_REQUIRED.into()));
                None
            }
            None => {
                self.dispatch(Action::Failed(ADMIN_REQUIRED.into()));
                None
            }
        }
    }

    /// Re-fetches after a successful mutation, or records its error.
    async fn settle<T>(&mut self, result: ClientResult<T>) {
        match result {
            Ok(_) => self.refresh().await,
            Err(err) => self.fail(err),
        }
    }

    fn fail(&mut self, err: ClientError) {
        warn!(%err, "leaderboard operation failed");
        if err.is_unauthorized() && self.state.session.is_some() {
            self.dispatch(Action::AdminLoggedOut);
        }
        self.dispatch(Action::Failed(err.to_string()));
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
