use super::*;

async fn setup(games: &[&str]) -> ApiContext {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    ApiContext {
        storage,
        catalog: GameCatalog::new(games.iter().copied()),
        auth: AdminAuthConfig {
            password: "secret".into(),
            token_secret: "k".into(),
            ttl_seconds: 60,
        },
    }
}

fn upserted(event: LeaderboardEvent) -> Entry {
    let LeaderboardEvent::EntryUpserted { entry } = event else {
        panic!("expected upsert event");
    };
    entry
}

fn add(name: &str, points: i64, game: Option<&str>) -> AddEntryRequest {
    AddEntryRequest {
        name: name.to_string(),
        points,
        game: game.map(Game::new),
    }
}

#[tokio::test]
async fn login_issues_token_that_authorizes() {
    let ctx = setup(&[]).await;
    let session = admin_login(&ctx, "secret").expect("login");
    authorize(&ctx, Some(&session.token)).expect("authorized");
}

#[tokio::test]
async fn wrong_password_and_missing_token_are_unauthorized() {
    let ctx = setup(&[]).await;
    let err = admin_login(&ctx, "nope").expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Unauthorized);
    assert_eq!(err.message, "Invalid admin password");

    let err = authorize(&ctx, None).expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Unauthorized);
    let err = authorize(&ctx, Some("garbage")).expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn successive_adds_accumulate() {
    let ctx = setup(&[]).await;
    add_entry(&ctx, add("Alice", 3, None)).await.expect("first");
    let entry = upserted(add_entry(&ctx, add("ALICE", 5, None)).await.expect("second"));
    assert_eq!(entry.points, 8);
    assert_eq!(list_entries(&ctx, None).await.expect("list").len(), 1);
}

#[tokio::test]
async fn add_validates_name_points_and_game() {
    let ctx = setup(&["The Latent"]).await;

    let err = add_entry(&ctx, add("   ", 1, Some("The Latent")))
        .await
        .expect_err("empty name");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = add_entry(&ctx, add("Bob", -4, Some("The Latent")))
        .await
        .expect_err("negative points");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = add_entry(&ctx, add("Bob", 4, None))
        .await
        .expect_err("missing game");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = add_entry(&ctx, add("Bob", 4, Some("Chess")))
        .await
        .expect_err("unknown game");
    assert_eq!(err.code, ErrorCode::Validation);

    let entry = upserted(
        add_entry(&ctx, add("Bob", 4, Some("the latent")))
            .await
            .expect("canonical game"),
    );
    assert_eq!(entry.game, Some(Game::new("The Latent")));
}

#[tokio::test]
async fn uncategorized_leaderboard_rejects_games() {
    let ctx = setup(&[]).await;
    let err = add_entry(&ctx, add("Bob", 1, Some("The Latent")))
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn point_adjustments_report_missing_rows() {
    let ctx = setup(&[]).await;
    let entry = upserted(add_entry(&ctx, add("Cy", 0, None)).await.expect("add"));

    let down = upserted(decrement_points(&ctx, entry.id).await.expect("decrement"));
    assert_eq!(down.points, 0);
    let up = upserted(increment_points(&ctx, entry.id).await.expect("increment"));
    assert_eq!(up.points, 1);
    let set = upserted(set_points(&ctx, entry.id, 42).await.expect("set"));
    assert_eq!(set.points, 42);

    let err = set_points(&ctx, EntryId(404), 1).await.expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
    let err = delete_entry(&ctx, EntryId(404)).await.expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn overflowing_totals_are_validation_errors() {
    let ctx = setup(&[]).await;
    let entry = upserted(
        add_entry(&ctx, add("Max", i64::MAX, None))
            .await
            .expect("add"),
    );

    let err = increment_points(&ctx, entry.id).await.expect_err("overflow");
    assert_eq!(err.code, ErrorCode::Validation);
    assert_eq!(err.message, "points out of range");

    let err = add_entry(&ctx, add("max", 1, None))
        .await
        .expect_err("overflow");
    assert_eq!(err.code, ErrorCode::Validation);

    let rows = list_entries(&ctx, None).await.expect("list still works");
    assert_eq!(rows[0].points, i64::MAX);
}

#[tokio::test]
async fn clear_removes_every_category() {
    let ctx = setup(&["The Latent", "Night Shift"]).await;
    add_entry(&ctx, add("A", 1, Some("The Latent")))
        .await
        .expect("add");
    add_entry(&ctx, add("B", 2, Some("Night Shift")))
        .await
        .expect("add");

    let (deleted, event) = clear_entries(&ctx).await.expect("clear");
    assert_eq!(deleted, 2);
    assert_eq!(event, LeaderboardEvent::LeaderboardCleared);
    assert!(list_entries(&ctx, None).await.expect("list").is_empty());
}

#[tokio::test]
async fn copy_sets_points_and_excludes_source_game() {
    let ctx = setup(&["The Latent", "Night Shift", "Arcade"]).await;
    let source = upserted(
        add_entry(&ctx, add("Dee", 15, Some("The Latent")))
            .await
            .expect("source"),
    );
    add_entry(&ctx, add("dee", 99, Some("Night Shift")))
        .await
        .expect("existing");

    let events = copy_entry(
        &ctx,
        source.id,
        vec![
            Game::new("The Latent"),
            Game::new("Night Shift"),
            Game::new("arcade"),
        ],
    )
    .await
    .expect("copy");
    let written: Vec<Entry> = events.into_iter().map(upserted).collect();
    assert_eq!(written.len(), 2);
    assert!(written.iter().all(|e| e.points == 15));
    assert!(written
        .iter()
        .all(|e| e.game != Some(Game::new("The Latent"))));

    let latent = list_entries(&ctx, Some(Game::new("The Latent")))
        .await
        .expect("list");
    assert_eq!(latent.len(), 1);
    assert_eq!(latent[0].points, 15);
}

#[tokio::test]
async fn copy_into_only_source_game_is_rejected() {
    let ctx = setup(&["The Latent", "Night Shift"]).await;
    let source = upserted(
        add_entry(&ctx, add("Eli", 5, Some("The Latent")))
            .await
            .expect("source"),
    );
    let err = copy_entry(&ctx, source.id, vec![Game::new("The Latent")])
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
}
