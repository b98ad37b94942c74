use shared::domain::{EntryId, Game};
use storage::{Storage, UpsertMode};

#[tokio::test]
async fn entry_lifecycle_across_categories_acceptance() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let latent = Game::new("The Latent");
    let night = Game::new("Night Shift");

    let created = storage
        .upsert_entry("John Doe", 100, Some(&latent), UpsertMode::Accumulate)
        .await
        .expect("create");
    storage
        .upsert_entry("john doe", 25, Some(&latent), UpsertMode::Accumulate)
        .await
        .expect("accumulate");

    let copied = storage
        .copy_points(
            &storage
                .get_entry(created.id)
                .await
                .expect("get")
                .expect("row"),
            &[night.clone()],
        )
        .await
        .expect("copy");
    assert_eq!(copied[0].points, 125);

    let decremented = storage
        .adjust_points(copied[0].id, -1)
        .await
        .expect("decrement")
        .expect("row");
    assert_eq!(decremented.points, 124);

    let all = storage.list_entries(None).await.expect("list");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].game.as_ref(), Some(&latent));

    assert!(storage
        .adjust_points(EntryId(-1), 1)
        .await
        .expect("adjust missing")
        .is_none());

    assert_eq!(storage.clear_entries().await.expect("clear"), 2);
    assert!(storage.list_entries(None).await.expect("list").is_empty());
}
