mod common;

use alert_dispatch::custodian::Custodian;
use alert_dispatch::db::Scope;
use alert_dispatch::models::{CleanupCounts, NewContent, NewStory, WaitPolicy};
use common::{static_strategy, Harness};
use serde_json::json;

async fn story(harness: &Harness, alert_id: i64, slug: &str, title: &str) -> i64 {
    let content = harness
        .repository
        .upsert_content(NewContent {
            url: format!("https://example.com/{slug}"),
            normalized_url: format!("example.com/{slug}"),
            title: title.to_string(),
            html_key: format!("content/{slug}.html"),
            markdown_key: format!("content/{slug}.md"),
        })
        .await
        .unwrap();
    harness
        .repository
        .insert_story(NewStory {
            alert_id,
            content_id: content.id,
            url: content.url,
            title: title.to_string(),
            key_findings: vec![],
            system_marked_irrelevant: false,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn sweep_tombstones_untitled_stories_and_orphans_once() {
    let harness = Harness::new().await;
    let user = harness.user("reader@example.com").await;
    let alert = harness
        .due_alert(user, "Rust", static_strategy(&[]), WaitPolicy::Count(1))
        .await;

    let untitled = story(&harness, alert, "blank", "").await;
    let titled = story(&harness, alert, "full", "A real headline").await;

    let live = harness.channel(user, "slack", json!({"access_token": "x", "channel_id": "C1"}), true).await;
    let removed = harness.channel(user, "discord", json!({"channel_id": "D1"}), true).await;
    harness.repository.soft_delete_channel(removed).await.unwrap();

    let keep_default = harness.repository.insert_subscription(user, alert, None).await.unwrap();
    let keep_live = harness.repository.insert_subscription(user, alert, Some(live)).await.unwrap();
    let orphan = harness.repository.insert_subscription(user, alert, Some(removed)).await.unwrap();
    let missing = harness.repository.insert_subscription(user, alert, Some(9999)).await.unwrap();

    let custodian = Custodian::new(harness.repository.clone());
    let counts = custodian.sweep().await.unwrap();
    assert_eq!(counts, CleanupCounts { stories: 1, subscriptions: 2 });

    let repo = &harness.repository;
    let live_stories: Vec<i64> = repo
        .stories_for_alert(alert, Scope::Live)
        .await
        .unwrap()
        .iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(live_stories, [titled]);
    let all_stories = repo.stories_for_alert(alert, Scope::IncludeDeleted).await.unwrap();
    assert!(all_stories.iter().any(|s| s.id == untitled && s.deleted_at.is_some()));
    for id in [keep_default, keep_live] {
        assert!(repo.get_subscription(id, Scope::Live).await.unwrap().is_some());
    }
    for id in [orphan, missing] {
        assert!(repo.get_subscription(id, Scope::Live).await.unwrap().is_none());
        assert!(repo.get_subscription(id, Scope::IncludeDeleted).await.unwrap().is_some());
    }
    assert!(repo.get_alert(alert, Scope::Live).await.unwrap().is_some());

    let again = custodian.sweep().await.unwrap();
    assert_eq!(again, CleanupCounts::default());
}

#[tokio::test]
async fn no_live_channels_orphans_every_channel_subscription() {
    let harness = Harness::new().await;
    let user = harness.user("reader@example.com").await;
    let alert = harness
        .due_alert(user, "Rust", static_strategy(&[]), WaitPolicy::Count(1))
        .await;

    let channel = harness.channel(user, "email", json!({"address": "team@example.com"}), true).await;
    harness.repository.soft_delete_channel(channel).await.unwrap();

    let bound = harness.repository.insert_subscription(user, alert, Some(channel)).await.unwrap();
    let default = harness.repository.insert_subscription(user, alert, None).await.unwrap();

    let counts = Custodian::new(harness.repository.clone()).sweep().await.unwrap();
    assert_eq!(counts.subscriptions, 1);
    assert!(harness.repository.get_subscription(bound, Scope::Live).await.unwrap().is_none());
    assert!(harness.repository.get_subscription(default, Scope::Live).await.unwrap().is_some());
}
