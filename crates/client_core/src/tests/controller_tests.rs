use super::*;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use shared::{
    domain::{name_key, Entry},
    error::{ApiException, ErrorCode},
};
use std::sync::Mutex;

const PASSWORD: &str = "letmein";
const TOKEN: &str = "fake-token";

/// In-memory stand-in for the leaderboard server.
struct TestLeaderboardService {
    games: Vec<Game>,
    entries: Mutex<Vec<Entry>>,
    next_id: Mutex<i64>,
    reject_names: Vec<String>,
    revoke_tokens: bool,
    catalog_down: bool,
    calls: Mutex<Vec<&'static str>>,
}

impl TestLeaderboardService {
    fn new(games: &[&str]) -> Self {
        Self {
            games: games.iter().map(|g| Game::new(*g)).collect(),
            entries: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
            reject_names: Vec::new(),
            revoke_tokens: false,
            catalog_down: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn rejecting(mut self, name: &str) -> Self {
        self.reject_names.push(name.to_string());
        self
    }

    fn revoking_tokens(mut self) -> Self {
        self.revoke_tokens = true;
        self
    }

    fn without_catalog(mut self) -> Self {
        self.catalog_down = true;
        self
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn check(&self, session: &AdminSession) -> ClientResult<()> {
        if self.revoke_tokens || session.token != TOKEN {
            return Err(ApiException::new(ErrorCode::Unauthorized, "invalid admin token").into());
        }
        Ok(())
    }

    fn upsert(&self, name: &str, points: i64, game: Option<Game>, accumulate: bool) -> Entry {
        let mut entries = self.entries.lock().unwrap();
        if let Some(existing) = entries
            .iter_mut()
            .find(|e| e.game == game && name_key(&e.name) == name_key(name))
        {
            existing.points = if accumulate {
                existing.points + points
            } else {
                points
            };
            return existing.clone();
        }
        let mut next_id = self.next_id.lock().unwrap();
        let entry = Entry {
            id: EntryId(*next_id),
            name: name.to_string(),
            points,
            created_at: Utc::now(),
            game,
        };
        *next_id += 1;
        entries.push(entry.clone());
        entry
    }

    fn update(&self, entry_id: EntryId, f: impl FnOnce(&mut Entry)) -> ClientResult<Entry> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| ApiException::new(ErrorCode::NotFound, "entry not found"))?;
        f(entry);
        Ok(entry.clone())
    }

    fn points_of(&self, name: &str, game: Option<&str>) -> Option<i64> {
        let game = game.map(Game::new);
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.name == name && e.game == game)
            .map(|e| e.points)
    }
}

#[async_trait]
impl LeaderboardService for TestLeaderboardService {
    async fn list_entries(&self, game: Option<&Game>) -> ClientResult<Vec<Entry>> {
        self.record("list_entries");
        let mut entries: Vec<Entry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| game.is_none() || e.game.as_ref() == game)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.points.cmp(&a.points).then(a.id.0.cmp(&b.id.0)));
        Ok(entries)
    }

    async fn list_games(&self) -> ClientResult<Vec<Game>> {
        self.record("list_games");
        if self.catalog_down {
            return Err(ApiException::new(ErrorCode::Internal, "catalog unavailable").into());
        }
        Ok(self.games.clone())
    }

    async fn admin_login(&self, password: &str) -> ClientResult<AdminSession> {
        self.record("admin_login");
        if password != PASSWORD {
            return Err(
                ApiException::new(ErrorCode::Unauthorized, "Invalid admin password").into(),
            );
        }
        Ok(AdminSession {
            token: TOKEN.into(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    async fn add_entry(
        &self,
        session: &AdminSession,
        request: AddEntryRequest,
    ) -> ClientResult<Entry> {
        self.record("add_entry");
        self.check(session)?;
        if self.reject_names.contains(&request.name) {
            return Err(ApiException::new(
                ErrorCode::Internal,
                format!("store rejected {}", request.name),
            )
            .into());
        }
        Ok(self.upsert(&request.name, request.points, request.game, true))
    }

    async fn set_points(
        &self,
        session: &AdminSession,
        entry_id: EntryId,
        points: i64,
    ) -> ClientResult<Entry> {
        self.record("set_points");
        self.check(session)?;
        self.update(entry_id, |e| e.points = points)
    }

    async fn increment_points(
        &self,
        session: &AdminSession,
        entry_id: EntryId,
    ) -> ClientResult<Entry> {
        self.record("increment_points");
        self.check(session)?;
        self.update(entry_id, |e| e.points += 1)
    }

    async fn decrement_points(
        &self,
        session: &AdminSession,
        entry_id: EntryId,
    ) -> ClientResult<Entry> {
        self.record("decrement_points");
        self.check(session)?;
        self.update(entry_id, |e| e.points = (e.points - 1).max(0))
    }

    async fn delete_entry(&self, session: &AdminSession, entry_id: EntryId) -> ClientResult<()> {
        self.record("delete_entry");
        self.check(session)?;
        self.entries.lock().unwrap().retain(|e| e.id != entry_id);
        Ok(())
    }

    async fn clear_entries(&self, session: &AdminSession) -> ClientResult<u64> {
        self.record("clear_entries");
        self.check(session)?;
        let mut entries = self.entries.lock().unwrap();
        let deleted = entries.len() as u64;
        entries.clear();
        Ok(deleted)
    }

    async fn copy_entry(
        &self,
        session: &AdminSession,
        entry_id: EntryId,
        games: Vec<Game>,
    ) -> ClientResult<Vec<Entry>> {
        self.record("copy_entry");
        self.check(session)?;
        let source = self.update(entry_id, |_| {})?;
        Ok(games
            .into_iter()
            .filter(|g| Some(g) != source.game.as_ref())
            .map(|g| self.upsert(&source.name, source.points, Some(g), false))
            .collect())
    }
}

async fn mounted(
    service: TestLeaderboardService,
) -> (Arc<TestLeaderboardService>, LeaderboardController) {
    let service = Arc::new(service);
    let mut controller = LeaderboardController::new(service.clone());
    controller.mount().await;
    (service, controller)
}

async fn admin(
    service: TestLeaderboardService,
) -> (Arc<TestLeaderboardService>, LeaderboardController) {
    let (service, mut controller) = mounted(service).await;
    controller.login(PASSWORD).await;
    assert!(controller.state().is_admin_at(Utc::now()));
    (service, controller)
}

fn points_by_name(controller: &LeaderboardController, name: &str) -> Option<i64> {
    controller
        .state()
        .entries
        .iter()
        .find(|e| e.name == name)
        .map(|e| e.points)
}

#[tokio::test]
async fn mount_loads_catalog_then_entries() {
    let service = TestLeaderboardService::new(&["The Latent", "Night Shift"]);
    service.upsert("Ann", 4, Some(Game::new("The Latent")), true);
    let (service, controller) = mounted(service).await;

    assert_eq!(service.calls(), vec!["list_games", "list_entries"]);
    assert_eq!(controller.state().catalog.games().len(), 2);
    assert_eq!(controller.state().entries.len(), 1);
    assert!(!controller.state().loading);
}

#[tokio::test]
async fn catalog_failure_stays_visible_and_blocks_import() {
    let service = TestLeaderboardService::new(&["The Latent"]).without_catalog();
    service.upsert("Ann", 4, Some(Game::new("The Latent")), true);
    let (service, mut controller) = mounted(service).await;

    assert_eq!(service.calls(), vec!["list_games", "list_entries"]);
    assert_eq!(controller.state().entries.len(), 1);
    assert!(!controller.state().catalog_loaded);
    assert_eq!(controller.state().error.as_deref(), Some("catalog unavailable"));

    controller.login(PASSWORD).await;
    controller.stage_import("name,points,game\nJohn Doe,100,The Latent");
    assert!(controller.state().staged_import.is_none());
    assert_eq!(
        controller.state().error.as_deref(),
        Some("Game catalog is not loaded; reload and try again")
    );
}

#[tokio::test]
async fn mutations_without_session_never_reach_the_service() {
    let (service, mut controller) = mounted(TestLeaderboardService::new(&[])).await;

    controller.add_entry("Ann", 3, None).await;
    assert_eq!(controller.state().error.as_deref(), Some("Admin access required"));
    controller.clear_all().await;
    controller.stage_import("name,points\nAnn,1");

    assert_eq!(service.calls(), vec!["list_games", "list_entries"]);
    assert!(controller.state().staged_import.is_none());
}

#[tokio::test]
async fn wrong_password_surfaces_server_message() {
    let (_service, mut controller) = mounted(TestLeaderboardService::new(&[])).await;
    controller.login("nope").await;
    assert_eq!(controller.state().error.as_deref(), Some("Invalid admin password"));
    assert!(controller.state().session.is_none());
}

#[tokio::test]
async fn successive_adds_accumulate_and_refresh() {
    let (_service, mut controller) = admin(TestLeaderboardService::new(&[])).await;

    controller.add_entry("Alice", 3, None).await;
    controller.add_entry("alice", 5, None).await;

    assert_eq!(controller.state().entries.len(), 1);
    assert_eq!(points_by_name(&controller, "Alice"), Some(8));
    assert!(controller.state().error.is_none());
}

#[tokio::test]
async fn add_requires_a_name() {
    let (service, mut controller) = admin(TestLeaderboardService::new(&[])).await;
    controller.add_entry("   ", 3, None).await;
    assert_eq!(controller.state().error.as_deref(), Some("Name is required"));
    assert!(!service.calls().contains(&"add_entry"));
}

#[tokio::test]
async fn point_adjustments_floor_at_zero() {
    let (_service, mut controller) = admin(TestLeaderboardService::new(&[])).await;
    controller.add_entry("Bob", 1, None).await;
    let id = controller.state().entries[0].id;

    controller.increment(id).await;
    assert_eq!(points_by_name(&controller, "Bob"), Some(2));

    for _ in 0..4 {
        controller.decrement(id).await;
    }
    assert_eq!(points_by_name(&controller, "Bob"), Some(0));
}

#[tokio::test]
async fn edit_writes_pending_value() {
    let (_service, mut controller) = admin(TestLeaderboardService::new(&[])).await;
    controller.add_entry("Cy", 10, None).await;
    let id = controller.state().entries[0].id;

    controller.begin_edit(id);
    assert_eq!(controller.state().editing.as_ref().map(|d| d.points), Some(10));
    controller.set_edit_points(42);
    controller.save_edit().await;

    assert!(controller.state().editing.is_none());
    assert_eq!(points_by_name(&controller, "Cy"), Some(42));
}

#[tokio::test]
async fn delete_and_clear_remove_rows() {
    let (_service, mut controller) =
        admin(TestLeaderboardService::new(&["The Latent", "Night Shift"])).await;
    controller
        .add_entry("Ann", 1, Some(Game::new("The Latent")))
        .await;
    controller
        .add_entry("Ann", 2, Some(Game::new("Night Shift")))
        .await;
    controller
        .add_entry("Bo", 3, Some(Game::new("Night Shift")))
        .await;
    assert_eq!(controller.state().entries.len(), 3);

    let first = controller.state().entries[0].id;
    controller.delete(first).await;
    assert_eq!(controller.state().entries.len(), 2);

    controller.clear_all().await;
    assert!(controller.state().is_empty());
}

#[tokio::test]
async fn csv_import_stages_valid_rows_then_applies_them() {
    let (service, mut controller) = admin(TestLeaderboardService::new(&["The Latent"])).await;

    controller.stage_import("name,points,game\nJohn Doe,100,The Latent\nBadRow,notanumber,X");
    let staged = controller.state().staged_import.clone().expect("staged rows");
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].name, "John Doe");

    let summary = controller.apply_import().await;
    assert_eq!(summary, ImportSummary { applied: 1, failed: 0 });
    assert!(controller.state().staged_import.is_none());
    assert_eq!(service.points_of("John Doe", Some("The Latent")), Some(100));
    assert_eq!(points_by_name(&controller, "John Doe"), Some(100));
}

#[tokio::test]
async fn csv_import_without_valid_rows_reports_it() {
    let (_service, mut controller) = admin(TestLeaderboardService::new(&[])).await;
    controller.stage_import("name,points\nBadRow,notanumber");
    assert!(controller.state().staged_import.is_none());
    assert_eq!(
        controller.state().error.as_deref(),
        Some("no valid rows found in CSV")
    );
}

#[tokio::test]
async fn partial_import_keeps_applied_rows_and_last_error() {
    let service = TestLeaderboardService::new(&[])
        .rejecting("Bad One")
        .rejecting("Bad Two");
    let (_service, mut controller) = admin(service).await;

    controller.stage_import("name,points\nGood,5\nBad One,1\nBad Two,2\nAlso Good,7");
    let summary = controller.apply_import().await;

    assert_eq!(summary, ImportSummary { applied: 2, failed: 2 });
    assert_eq!(controller.state().entries.len(), 2);
    assert_eq!(
        controller.state().error.as_deref(),
        Some("store rejected Bad Two")
    );
}

#[tokio::test]
async fn copy_sets_points_in_selected_games_only() {
    let (service, mut controller) =
        admin(TestLeaderboardService::new(&["The Latent", "Night Shift", "Arcade"])).await;
    controller
        .add_entry("Ann", 30, Some(Game::new("The Latent")))
        .await;
    controller
        .add_entry("Ann", 4, Some(Game::new("Night Shift")))
        .await;
    let source = controller
        .state()
        .entries
        .iter()
        .find(|e| e.game == Some(Game::new("The Latent")))
        .map(|e| e.id)
        .expect("source");

    controller.begin_copy(source);
    controller.toggle_copy_target(Game::new("The Latent"));
    controller.toggle_copy_target(Game::new("Night Shift"));
    controller.toggle_copy_target(Game::new("Arcade"));
    controller.apply_copy().await;

    assert!(controller.state().copy.is_none());
    assert_eq!(service.points_of("Ann", Some("The Latent")), Some(30));
    assert_eq!(service.points_of("Ann", Some("Night Shift")), Some(30));
    assert_eq!(service.points_of("Ann", Some("Arcade")), Some(30));
}

#[tokio::test]
async fn copy_without_targets_is_rejected_locally() {
    let (service, mut controller) = admin(TestLeaderboardService::new(&["A", "B"])).await;
    controller.add_entry("Ann", 1, Some(Game::new("A"))).await;
    let source = controller.state().entries[0].id;

    controller.begin_copy(source);
    controller.apply_copy().await;

    assert!(controller.state().copy.is_some());
    assert!(controller.state().error.is_some());
    assert!(!service.calls().contains(&"copy_entry"));
}

#[tokio::test]
async fn rejected_token_logs_admin_out() {
    let (_service, mut controller) = admin(TestLeaderboardService::new(&[]).revoking_tokens()).await;
    controller.add_entry("Ann", 1, None).await;
    assert!(controller.state().session.is_none());
    assert_eq!(controller.state().error.as_deref(), Some("invalid admin token"));
}

#[tokio::test]
async fn expired_session_is_dropped_before_any_call() {
    let (service, mut controller) = mounted(TestLeaderboardService::new(&[])).await;
    controller.dispatch(Action::AdminLoggedIn(AdminSession {
        token: TOKEN.into(),
        expires_at: Utc::now() - Duration::seconds(1),
    }));

    controller.add_entry("Ann", 1, None).await;
    assert!(controller.state().session.is_none());
    assert_eq!(controller.state().error.as_deref(), Some("Admin access required"));
    assert!(!service.calls().contains(&"add_entry"));
}

#[tokio::test]
async fn feed_errors_trigger_a_full_refresh() {
    let (service, mut controller) = mounted(TestLeaderboardService::new(&[])).await;
    service.upsert("Late", 9, None, true);

    controller
        .apply_remote(Err(ClientError::Feed("malformed change event".into())))
        .await;
    assert_eq!(points_by_name(&controller, "Late"), Some(9));

    service.upsert("Later", 3, None, true);
    controller
        .apply_remote(Ok(LeaderboardEvent::ResyncRequired))
        .await;
    assert_eq!(points_by_name(&controller, "Later"), Some(3));

    controller
        .apply_remote(Ok(LeaderboardEvent::LeaderboardCleared))
        .await;
    assert!(controller.state().is_empty());
}

#[tokio::test]
async fn logout_clears_session_and_error() {
    let (_service, mut controller) = admin(TestLeaderboardService::new(&[])).await;
    controller.dispatch(Action::Failed("stale".into()));
    controller.logout();
    assert!(controller.state().session.is_none());
    assert!(controller.state().error.is_none());
}
