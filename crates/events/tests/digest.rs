mod common;

use chrono::{Duration, FixedOffset};
use herald_core::catalog::{events, follow, groups, notes, todos};
use herald_core::setting::{DigestFrequency, GlobalSetting, NotificationSetting};
use herald_core::target::ObjectRef;
use herald_events::store::WatermarkStore;

use common::*;

fn window() -> (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>) {
    (t0() - Duration::hours(1), t0() + Duration::days(1))
}

async fn compose_ids(h: &Harness, frequency: DigestFrequency) -> Vec<i64> {
    let (from, to) = window();
    h.engine
        .windower()
        .compose_digest(RECIPIENT, frequency, from, to)
        .await
        .unwrap()
        .map(|d| d.event_ids())
        .unwrap_or_default()
}

// -- supersession ------------------------------------------------------------

#[tokio::test]
async fn newer_superseding_event_replaces_older_one() {
    let h = Harness::new();
    h.directory.join_group(RECIPIENT, GROUP);

    h.store_event(notes::NOTE_UPDATED, 2, note(100), Some(GROUP), &[RECIPIENT], t0())
        .await;
    let created = h
        .store_event(notes::NOTE_CREATED, 3, note(100), Some(GROUP), &[RECIPIENT], t0() + Duration::hours(1))
        .await;

    assert_eq!(compose_ids(&h, DigestFrequency::Daily).await, vec![created.id]);
}

#[tokio::test]
async fn older_superseding_event_is_dropped_too() {
    let h = Harness::new();
    h.directory.join_group(RECIPIENT, GROUP);

    h.store_event(notes::NOTE_CREATED, 2, note(100), Some(GROUP), &[RECIPIENT], t0())
        .await;
    let updated = h
        .store_event(notes::NOTE_UPDATED, 3, note(100), Some(GROUP), &[RECIPIENT], t0() + Duration::hours(1))
        .await;

    assert_eq!(compose_ids(&h, DigestFrequency::Daily).await, vec![updated.id]);
}

#[tokio::test]
async fn same_type_on_same_object_keeps_latest_only() {
    let h = Harness::new();
    h.directory.join_group(RECIPIENT, GROUP);

    h.store_event(notes::COMMENT_POSTED, 2, note(100), Some(GROUP), &[RECIPIENT], t0())
        .await;
    let latest = h
        .store_event(notes::COMMENT_POSTED, 3, note(100), Some(GROUP), &[RECIPIENT], t0() + Duration::minutes(5))
        .await;
    let other_note = h
        .store_event(notes::COMMENT_POSTED, 3, note(101), Some(GROUP), &[RECIPIENT], t0() + Duration::minutes(6))
        .await;

    assert_eq!(
        compose_ids(&h, DigestFrequency::Daily).await,
        vec![latest.id, other_note.id]
    );
}

#[tokio::test]
async fn composing_twice_returns_the_same_events() {
    let h = Harness::new();
    h.directory.join_group(RECIPIENT, GROUP);
    for (id, minutes) in [(100, 0), (101, 10), (102, 20)] {
        h.store_event(notes::NOTE_UPDATED, 2, note(id), Some(GROUP), &[RECIPIENT], t0() + Duration::minutes(minutes))
            .await;
    }

    let first = compose_ids(&h, DigestFrequency::Daily).await;
    let second = compose_ids(&h, DigestFrequency::Daily).await;

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    assert_eq!(h.store.events().len(), 3);
}

// -- filters -----------------------------------------------------------------

#[tokio::test]
async fn own_inactive_actor_and_unreadable_events_are_filtered() {
    let h = Harness::new();
    h.directory.join_group(RECIPIENT, GROUP);
    h.directory
        .add_object(object_in_group(note(300), Some(OTHER_GROUP), CREATOR));
    h.directory.update_user(5, |p| p.is_active = false);

    let kept = h
        .store_event(notes::NOTE_UPDATED, 2, note(100), Some(GROUP), &[RECIPIENT], t0())
        .await;
    // Acted by the recipient.
    h.store_event(notes::NOTE_UPDATED, RECIPIENT, note(101), Some(GROUP), &[RECIPIENT], t0())
        .await;
    // Deactivated actor.
    h.store_event(notes::NOTE_UPDATED, 5, note(102), Some(GROUP), &[RECIPIENT], t0())
        .await;
    // Group the recipient cannot read.
    h.store_event(notes::NOTE_UPDATED, 2, note(300), Some(OTHER_GROUP), &[RECIPIENT], t0())
        .await;
    // Deleted object.
    h.store_event(notes::NOTE_UPDATED, 2, note(103), Some(GROUP), &[RECIPIENT], t0())
        .await;
    h.directory.remove_object(&note(103));
    // Not in the audience.
    h.store_event(notes::NOTE_UPDATED, 2, note(104), Some(GROUP), &[OTHER_RECIPIENT], t0())
        .await;

    assert_eq!(compose_ids(&h, DigestFrequency::Daily).await, vec![kept.id]);
}

#[tokio::test]
async fn state_check_drops_unfollowed_content() {
    let h = Harness::new();
    h.directory
        .join_group(RECIPIENT, GROUP)
        .follow(RECIPIENT, &note(100));

    let followed = h
        .store_event(follow::FOLLOWED_UPDATED, 2, note(100), Some(GROUP), &[RECIPIENT], t0())
        .await;
    h.store_event(follow::FOLLOWED_UPDATED, 2, note(101), Some(GROUP), &[RECIPIENT], t0())
        .await;

    assert_eq!(compose_ids(&h, DigestFrequency::Daily).await, vec![followed.id]);

    h.directory.unfollow(RECIPIENT, &note(100));
    assert!(compose_ids(&h, DigestFrequency::Daily).await.is_empty());
}

#[tokio::test]
async fn frequency_follows_preferences() {
    let h = Harness::new();
    h.directory.join_group(RECIPIENT, GROUP);

    let daily = h
        .store_event(notes::NOTE_UPDATED, 2, note(100), Some(GROUP), &[RECIPIENT], t0())
        .await;
    let weekly = h
        .store_event(groups::MEMBER_JOINED, 2, ObjectRef::group(GROUP), None, &[RECIPIENT], t0())
        .await;
    h.directory
        .add_object(object_in_group(ObjectRef::group(GROUP), None, CREATOR));

    assert_eq!(compose_ids(&h, DigestFrequency::Daily).await, vec![daily.id]);
    assert_eq!(compose_ids(&h, DigestFrequency::Weekly).await, vec![weekly.id]);

    h.engine
        .preferences()
        .set_group_preference(RECIPIENT, GROUP, notes::NOTE_UPDATED, NotificationSetting::Weekly)
        .await
        .unwrap();
    assert!(compose_ids(&h, DigestFrequency::Daily).await.is_empty());
    // Groups section comes before Posts.
    assert_eq!(
        compose_ids(&h, DigestFrequency::Weekly).await,
        vec![weekly.id, daily.id]
    );
}

#[tokio::test]
async fn global_now_means_no_digest() {
    let h = Harness::new();
    h.directory.join_group(RECIPIENT, GROUP);
    h.store_event(notes::NOTE_UPDATED, 2, note(100), Some(GROUP), &[RECIPIENT], t0())
        .await;
    h.engine
        .preferences()
        .set_global_setting(RECIPIENT, GlobalSetting::Now)
        .await
        .unwrap();

    let (from, to) = window();
    let digest = h
        .engine
        .windower()
        .compose_digest(RECIPIENT, DigestFrequency::Daily, from, to)
        .await
        .unwrap();
    assert!(digest.is_none());
}

// -- layout ------------------------------------------------------------------

#[tokio::test]
async fn sections_follow_category_order_with_catch_all_last() {
    let h = Harness::new();
    h.directory
        .join_group(RECIPIENT, GROUP)
        .join_group(RECIPIENT, OTHER_GROUP);
    h.directory
        .add_object(object_in_group(ObjectRef::new("todo", 400), Some(GROUP), CREATOR))
        .add_object(object_in_group(ObjectRef::new("event", 500), Some(GROUP), CREATOR))
        .add_object(object_in_group(note(600), Some(OTHER_GROUP), CREATOR));

    h.store_event(todos::TODO_COMPLETED, 2, ObjectRef::new("todo", 400), Some(GROUP), &[RECIPIENT], t0())
        .await;
    h.store_event(events::EVENT_UPDATED, 2, ObjectRef::new("event", 500), Some(GROUP), &[RECIPIENT], t0() + Duration::minutes(1))
        .await;
    h.store_event(notes::NOTE_UPDATED, 2, note(100), Some(GROUP), &[RECIPIENT], t0() + Duration::minutes(2))
        .await;
    h.store_event(notes::NOTE_UPDATED, 3, note(600), Some(OTHER_GROUP), &[RECIPIENT], t0() + Duration::minutes(3))
        .await;
    h.store_event(notes::COMMENT_POSTED, 3, note(101), Some(GROUP), &[RECIPIENT], t0() + Duration::minutes(4))
        .await;

    let (from, to) = window();
    let digest = h
        .engine
        .windower()
        .compose_digest(RECIPIENT, DigestFrequency::Daily, from, to)
        .await
        .unwrap()
        .unwrap();

    let labels: Vec<&str> = digest.sections.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["Posts", "Events", "Other"]);
    assert_eq!(digest.event_count, 5);

    let posts = &digest.sections[0];
    let groups: Vec<Option<i64>> = posts.clusters.iter().map(|c| c.group_id).collect();
    assert_eq!(groups, vec![Some(GROUP), Some(OTHER_GROUP)]);
    let first_cluster: Vec<&str> = posts.clusters[0]
        .items
        .iter()
        .map(|i| i.notification_type.as_str())
        .collect();
    assert_eq!(first_cluster, vec![notes::NOTE_UPDATED, notes::COMMENT_POSTED]);
}

#[tokio::test]
async fn times_are_shown_in_recipient_timezone() {
    let h = Harness::new();
    h.directory.join_group(RECIPIENT, GROUP);
    h.directory.update_user(RECIPIENT, |p| p.utc_offset_secs = 2 * 3600);
    h.store_event(notes::NOTE_UPDATED, 2, note(100), Some(GROUP), &[RECIPIENT], t0())
        .await;

    let (from, to) = window();
    let digest = h
        .engine
        .windower()
        .compose_digest(RECIPIENT, DigestFrequency::Daily, from, to)
        .await
        .unwrap()
        .unwrap();

    let item = &digest.sections[0].clusters[0].items[0];
    let offset = FixedOffset::east_opt(2 * 3600).unwrap();
    assert_eq!(item.local_time.offset(), &offset);
    assert_eq!(item.local_time, item.occurred_at);
    assert_eq!(digest.utc_offset_secs, 7200);
    assert_eq!(item.actor.name, "User 2");
}

// -- runs and watermarks -----------------------------------------------------

#[tokio::test]
async fn run_digest_mails_and_advances_only_its_watermark() {
    let h = Harness::new();
    h.directory
        .join_group(RECIPIENT, GROUP)
        .join_group(OTHER_RECIPIENT, GROUP);
    h.store_event(notes::NOTE_UPDATED, 2, note(100), Some(GROUP), &[RECIPIENT, OTHER_RECIPIENT], t0())
        .await;
    h.engine
        .preferences()
        .set_global_setting(OTHER_RECIPIENT, GlobalSetting::Never)
        .await
        .unwrap();

    let now = t0() + Duration::hours(12);
    let summary = h.engine.windower().run_digest(DigestFrequency::Daily, now).await.unwrap();

    assert_eq!(summary.window_start, now - Duration::days(1));
    assert_eq!(summary.window_end, now);
    assert_eq!(summary.recipients, 2);
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failed, 0);

    let mails = h.mailer.sent_to(&email_of(RECIPIENT));
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].template, "herald/digest/daily");
    assert_eq!(mails[0].subject, "Your daily digest: 1 update");
    assert_eq!(mails[0].context["event_count"], 1);
    assert_eq!(h.mails_to(OTHER_RECIPIENT), 0);

    assert_eq!(h.store.last_digest_sent(DigestFrequency::Daily).await.unwrap(), Some(now));
    assert_eq!(h.store.last_digest_sent(DigestFrequency::Weekly).await.unwrap(), None);

    // The same window is not processed twice.
    let again = h.engine.windower().run_digest(DigestFrequency::Daily, now).await.unwrap();
    assert_eq!(again.sent, 0);
    assert_eq!(h.mails_to(RECIPIENT), 1);
}

#[tokio::test]
async fn next_run_starts_at_watermark() {
    let h = Harness::new();
    h.directory.join_group(RECIPIENT, GROUP);
    let first_run = t0() + Duration::hours(1);
    h.store_event(notes::NOTE_UPDATED, 2, note(100), Some(GROUP), &[RECIPIENT], t0())
        .await;
    h.engine
        .windower()
        .run_digest(DigestFrequency::Daily, first_run)
        .await
        .unwrap();

    h.store_event(notes::NOTE_UPDATED, 2, note(101), Some(GROUP), &[RECIPIENT], first_run + Duration::hours(3))
        .await;
    let second_run = first_run + Duration::days(1);
    let summary = h
        .engine
        .windower()
        .run_digest(DigestFrequency::Daily, second_run)
        .await
        .unwrap();

    assert_eq!(summary.window_start, first_run);
    assert_eq!(summary.sent, 1);
    let mails = h.mailer.sent_to(&email_of(RECIPIENT));
    assert_eq!(mails.len(), 2);
    assert_eq!(mails[1].context["sections"][0]["clusters"][0]["items"][0]["target"]["object_id"], 101);
}

#[tokio::test]
async fn recipient_failure_is_counted_and_watermark_still_moves() {
    let h = Harness::new();
    h.directory
        .join_group(RECIPIENT, GROUP)
        .join_group(OTHER_RECIPIENT, GROUP);
    h.mailer.fail_for(&email_of(RECIPIENT));
    h.store_event(notes::NOTE_UPDATED, 2, note(100), Some(GROUP), &[RECIPIENT, OTHER_RECIPIENT], t0())
        .await;

    let now = t0() + Duration::hours(2);
    let summary = h.engine.windower().run_digest(DigestFrequency::Daily, now).await.unwrap();

    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(h.store.last_digest_sent(DigestFrequency::Daily).await.unwrap(), Some(now));
}

#[tokio::test]
async fn scheduler_tick_runs_due_frequencies() {
    let h = Harness::new();
    let scheduler = h.engine.digest_scheduler();
    let windower = h.engine.windower();

    let ran = scheduler.tick().await;
    let frequencies: Vec<DigestFrequency> = ran.iter().map(|s| s.frequency).collect();
    assert_eq!(frequencies, vec![DigestFrequency::Daily, DigestFrequency::Weekly]);

    assert!(!windower.is_due(DigestFrequency::Daily, t0()).await.unwrap());
    assert!(scheduler.tick().await.is_empty());

    h.clock.advance(Duration::days(1));
    let ran = scheduler.tick().await;
    assert_eq!(ran.len(), 1);
    assert_eq!(ran[0].frequency, DigestFrequency::Daily);
    assert_eq!(ran[0].window_start, t0());
}
