//! Preference resolution against stored preferences, plus preference
//! writes and the portal moderator fan-out.

use std::sync::Arc;

use herald_core::error::CoreError;
use herald_core::preference::{
    Decision, PreferenceResolver, PreferenceSnapshot, RecipientProfile,
};
use herald_core::registry::NotificationRegistry;
use herald_core::setting::{
    DigestFrequency, GlobalSetting, NotificationSetting, RESERVED_KEYS,
};
use herald_core::types::DbId;

use crate::directory::{TargetInfo, UserDirectory};
use crate::error::EventsError;
use crate::store::NotificationStore;

/// Loads preference snapshots and resolves them against the registry;
/// also the only write path for preferences.
#[derive(Clone)]
pub struct PreferenceService {
    registry: Arc<NotificationRegistry>,
    store: Arc<dyn NotificationStore>,
    users: Arc<dyn UserDirectory>,
}

impl PreferenceService {
    pub fn new(
        registry: Arc<NotificationRegistry>,
        store: Arc<dyn NotificationStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            registry,
            store,
            users,
        }
    }

    fn resolver(&self) -> PreferenceResolver<'_> {
        PreferenceResolver::new(&self.registry)
    }

    pub async fn snapshot(&self, user_id: DbId) -> Result<PreferenceSnapshot, EventsError> {
        self.store.preference_snapshot(user_id).await
    }

    /// Resolve one recipient's decision for one event.
    pub async fn decide(
        &self,
        recipient: &RecipientProfile,
        actor_id: DbId,
        type_key: &str,
        group_id: Option<DbId>,
    ) -> Result<Decision, EventsError> {
        let prefs = self.snapshot(recipient.user_id).await?;
        Ok(self
            .resolver()
            .resolve(recipient, actor_id, type_key, group_id, &prefs)?)
    }

    /// Whether any digest frequency wants this event for the recipient.
    ///
    /// Covers multi-preference sets configured to a digest frequency, which
    /// [`decide`](Self::decide) reports as suppressed.
    pub async fn digest_interest(
        &self,
        recipient: &RecipientProfile,
        actor_id: DbId,
        type_key: &str,
        group_id: Option<DbId>,
    ) -> Result<bool, EventsError> {
        let prefs = self.snapshot(recipient.user_id).await?;
        let resolver = self.resolver();
        for frequency in DigestFrequency::ALL {
            if resolver.wants_digest(recipient, actor_id, type_key, group_id, &prefs, frequency)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Portal moderators who get an instant mail for this event on top of
    /// the normal audience.
    pub async fn moderators_to_notify(
        &self,
        actor_id: DbId,
        type_key: &str,
        target: &TargetInfo,
    ) -> Result<Vec<RecipientProfile>, EventsError> {
        if !self.registry.get(type_key)?.moderatable || !target.publicly_readable {
            return Ok(Vec::new());
        }

        let resolver = self.resolver();
        let mut notify = Vec::new();
        for moderator in self.users.portal_moderators().await? {
            let decision =
                resolver.moderator_decision(&moderator, actor_id, type_key, target.publicly_readable)?;
            if decision == Decision::SendNow {
                notify.push(moderator);
            }
        }
        Ok(notify)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Replace the user's account-wide setting.
    pub async fn set_global_setting(&self, user_id: DbId, setting: GlobalSetting) -> Result<(), EventsError> {
        self.store.set_global_setting(user_id, setting).await
    }

    /// Store a per-(group, type) preference. `key` is a registered type key
    /// or one of the reserved `all` / `none` keys.
    pub async fn set_group_preference(
        &self,
        user_id: DbId,
        group_id: DbId,
        key: &str,
        setting: NotificationSetting,
    ) -> Result<(), EventsError> {
        if !RESERVED_KEYS.contains(&key) {
            self.registry.get(key)?;
        }
        self.store
            .set_group_preference(user_id, group_id, key, setting)
            .await
    }

    /// Store the setting of a multi-preference such as followed content.
    /// Fails with a validation error for keys the registry does not know.
    pub async fn set_multi_preference(
        &self,
        user_id: DbId,
        key: &str,
        setting: NotificationSetting,
    ) -> Result<(), EventsError> {
        if !self.registry.multi_preferences().iter().any(|s| s.key == key) {
            return Err(CoreError::Validation(format!("Unknown multi-preference '{key}'")).into());
        }
        self.store.set_multi_preference(user_id, key, setting).await
    }
}
