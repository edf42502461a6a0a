//! Alert merges racing through `PgStore` against a real database.

mod common;

use std::sync::Arc;

use herald_core::alert::AlertKind;
use herald_core::catalog::{self, notes};
use herald_core::config::HeraldConfig;
use herald_core::types::DbId;
use herald_events::{AlertEvent, AlertMerger, AlertOutcome, PgStore, UnseenCountCache};
use sqlx::PgPool;

use common::*;

fn merger(pool: PgPool) -> AlertMerger {
    let config = HeraldConfig::default();
    let directory = Arc::new(StaticDirectory::new());
    for user_id in 1..=6 {
        directory.add_user(active_user(user_id));
    }
    directory
        .add_user(active_user(RECIPIENT))
        .add_object(object_in_group(note(100), Some(GROUP), CREATOR))
        .follow(RECIPIENT, &note(100));

    AlertMerger::new(
        &config,
        Arc::new(catalog::build_registry(&[]).unwrap()),
        Arc::new(PgStore::new(pool)),
        directory.clone(),
        directory,
        Arc::new(UnseenCountCache::new()),
    )
}

fn comment(actor_id: DbId) -> AlertEvent {
    AlertEvent {
        notification_type: notes::COMMENT_POSTED.to_string(),
        actor_id,
        target: note(100),
        group_id: Some(GROUP),
        occurred_at: t0() + chrono::Duration::minutes(actor_id),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn racing_merges_on_one_item_lose_no_update(pool: PgPool) {
    let merger = merger(pool);

    let mut tasks = tokio::task::JoinSet::new();
    for actor in 1..=6 {
        let merger = merger.clone();
        tasks.spawn(async move { merger.apply_event(&comment(actor), &[RECIPIENT]).await });
    }

    let mut created = 0;
    while let Some(joined) = tasks.join_next().await {
        let outcomes = joined.unwrap().unwrap();
        assert_eq!(outcomes.len(), 1);
        if matches!(outcomes[0].1, AlertOutcome::Created(_)) {
            created += 1;
        }
    }
    assert_eq!(created, 1);

    let alerts = merger.list_alerts(RECIPIENT, 10).await.unwrap();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.kind, AlertKind::MultiUser);
    assert_eq!(alert.counter, 6);
    assert_eq!(alert.multi_user_list.len(), 5);
    assert_eq!(merger.unseen_count(RECIPIENT).await.unwrap(), 1);
}
