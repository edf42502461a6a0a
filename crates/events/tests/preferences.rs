mod common;

use assert_matches::assert_matches;
use herald_core::catalog::{follow, groups, notes, FOLLOWED_CONTENT_SET};
use herald_core::error::CoreError;
use herald_core::preference::{Decision, RecipientProfile};
use herald_core::setting::{DigestFrequency, GlobalSetting, NotificationSetting, GROUP_ALL_KEY, GROUP_NONE_KEY};
use herald_core::types::DbId;
use herald_events::EventsError;

use common::*;

async fn decide(h: &Harness, profile: &RecipientProfile, type_key: &str, group_id: Option<DbId>) -> Decision {
    h.engine
        .preferences()
        .decide(profile, 2, type_key, group_id)
        .await
        .unwrap()
}

#[tokio::test]
async fn mention_without_stored_preferences_is_sent_now() {
    let h = Harness::new();
    let profile = active_user(RECIPIENT);

    assert_eq!(decide(&h, &profile, notes::MENTIONED, Some(GROUP)).await, Decision::SendNow);
    assert_eq!(
        decide(&h, &profile, notes::COMMENT_POSTED, Some(GROUP)).await,
        Decision::DeferDigest(DigestFrequency::Daily)
    );
}

#[tokio::test]
async fn global_setting_beats_group_rows() {
    let h = Harness::new();
    let prefs = h.engine.preferences();
    let profile = active_user(RECIPIENT);

    prefs
        .set_group_preference(RECIPIENT, GROUP, GROUP_ALL_KEY, NotificationSetting::Now)
        .await
        .unwrap();
    prefs
        .set_group_preference(RECIPIENT, GROUP, notes::MENTIONED, NotificationSetting::Now)
        .await
        .unwrap();
    prefs.set_global_setting(RECIPIENT, GlobalSetting::Never).await.unwrap();

    assert_eq!(decide(&h, &profile, notes::MENTIONED, Some(GROUP)).await, Decision::Suppress);

    prefs.set_global_setting(RECIPIENT, GlobalSetting::Weekly).await.unwrap();
    assert_eq!(
        decide(&h, &profile, notes::MENTIONED, Some(GROUP)).await,
        Decision::DeferDigest(DigestFrequency::Weekly)
    );
}

#[tokio::test]
async fn group_rows_apply_only_to_their_group() {
    let h = Harness::new();
    let prefs = h.engine.preferences();
    let profile = active_user(RECIPIENT);

    prefs
        .set_group_preference(RECIPIENT, GROUP, GROUP_NONE_KEY, NotificationSetting::Never)
        .await
        .unwrap();
    prefs
        .set_group_preference(RECIPIENT, OTHER_GROUP, GROUP_ALL_KEY, NotificationSetting::Weekly)
        .await
        .unwrap();

    assert_eq!(decide(&h, &profile, notes::MENTIONED, Some(GROUP)).await, Decision::Suppress);
    assert_eq!(
        decide(&h, &profile, notes::MENTIONED, Some(OTHER_GROUP)).await,
        Decision::DeferDigest(DigestFrequency::Weekly)
    );
    // Group-less events fall back to the type default.
    assert_eq!(decide(&h, &profile, notes::MENTIONED, None).await, Decision::SendNow);
}

#[tokio::test]
async fn latest_write_wins() {
    let h = Harness::new();
    let prefs = h.engine.preferences();
    let profile = active_user(RECIPIENT);

    for setting in [NotificationSetting::Now, NotificationSetting::Never, NotificationSetting::Weekly] {
        prefs
            .set_group_preference(RECIPIENT, GROUP, notes::NOTE_UPDATED, setting)
            .await
            .unwrap();
    }

    assert_eq!(
        decide(&h, &profile, notes::NOTE_UPDATED, Some(GROUP)).await,
        Decision::DeferDigest(DigestFrequency::Weekly)
    );
    let snapshot = prefs.snapshot(RECIPIENT).await.unwrap();
    assert_eq!(snapshot.group.len(), 1);
}

#[tokio::test]
async fn multi_preference_covers_every_member_type() {
    let h = Harness::new();
    let prefs = h.engine.preferences();
    let profile = active_user(RECIPIENT);

    prefs
        .set_multi_preference(RECIPIENT, FOLLOWED_CONTENT_SET, NotificationSetting::Now)
        .await
        .unwrap();

    for key in [follow::FOLLOWED_UPDATED, follow::FOLLOWED_COMMENTED] {
        assert_eq!(decide(&h, &profile, key, Some(GROUP)).await, Decision::SendNow);
    }

    prefs
        .set_multi_preference(RECIPIENT, FOLLOWED_CONTENT_SET, NotificationSetting::Weekly)
        .await
        .unwrap();
    assert_eq!(decide(&h, &profile, follow::FOLLOWED_UPDATED, Some(GROUP)).await, Decision::Suppress);
    assert!(prefs
        .digest_interest(&profile, 2, follow::FOLLOWED_UPDATED, Some(GROUP))
        .await
        .unwrap());
}

#[tokio::test]
async fn invitation_ignores_user_settings() {
    let h = Harness::new();
    let prefs = h.engine.preferences();
    let mut profile = active_user(RECIPIENT);
    profile.email_blacklisted = true;
    prefs.set_global_setting(RECIPIENT, GlobalSetting::Never).await.unwrap();

    assert_eq!(decide(&h, &profile, groups::INVITED, Some(GROUP)).await, Decision::SendNow);

    profile.is_active = false;
    assert_eq!(decide(&h, &profile, groups::INVITED, Some(GROUP)).await, Decision::Suppress);
}

#[tokio::test]
async fn writes_validate_keys() {
    let h = Harness::new();
    let prefs = h.engine.preferences();

    let err = prefs
        .set_group_preference(RECIPIENT, GROUP, "notes__missing", NotificationSetting::Now)
        .await
        .unwrap_err();
    assert_matches!(err, EventsError::Core(CoreError::UnknownType(key)) if key == "notes__missing");

    let err = prefs
        .set_multi_preference(RECIPIENT, "not_a_set", NotificationSetting::Now)
        .await
        .unwrap_err();
    assert_matches!(err, EventsError::Core(CoreError::Validation(_)));

    assert_eq!(prefs.snapshot(RECIPIENT).await.unwrap().global, GlobalSetting::Individual);
}
