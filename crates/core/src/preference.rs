//! The preference chain deciding how a recipient wants to hear about an
//! event.
//!
//! [`PreferenceResolver::resolve`] walks the chain in a fixed priority order
//! and short-circuits on the first rule that applies:
//!
//! 0. actor/audience and login/terms-of-service gate
//! 1. email deliverability, with the ignore-user-setting override
//! 2. multi-preference sets (group independent)
//! 3. the global blanket setting
//! 4. per-group `none` / `all` overrides
//! 5. the per-(group, type) preference, else the type default
//!
//! Everything here is pure; callers load a [`RecipientProfile`] and a
//! [`PreferenceSnapshot`] first.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::registry::{NotificationRegistry, NotificationTypeDescriptor};
use crate::setting::{
    DigestFrequency, GlobalSetting, NotificationSetting, GROUP_ALL_KEY, GROUP_NONE_KEY,
};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Outcome of resolving one recipient's preferences for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "frequency", rename_all = "snake_case")]
pub enum Decision {
    SendNow,
    DeferDigest(DigestFrequency),
    Suppress,
}

impl Decision {
    fn from_setting(setting: NotificationSetting) -> Self {
        match setting {
            NotificationSetting::Never => Self::Suppress,
            NotificationSetting::Now => Self::SendNow,
            NotificationSetting::Daily => Self::DeferDigest(DigestFrequency::Daily),
            NotificationSetting::Weekly => Self::DeferDigest(DigestFrequency::Weekly),
        }
    }
}

// ---------------------------------------------------------------------------
// RecipientProfile
// ---------------------------------------------------------------------------

/// Account state of a potential recipient, as reported by the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientProfile {
    pub user_id: DbId,
    pub email: Option<String>,
    pub is_active: bool,
    pub is_anonymous: bool,
    pub email_blacklisted: bool,
    pub has_logged_in: bool,
    pub tos_accepted: bool,
    /// Offset of the recipient's timezone from UTC, in seconds.
    pub utc_offset_secs: i32,
}

impl RecipientProfile {
    /// The login / terms-of-service gate every notification must pass.
    pub fn passes_gate(&self) -> bool {
        self.is_active && self.has_logged_in && self.tos_accepted
    }

    /// Whether an email for a type may reach this account at all.
    pub fn can_receive_email(&self, descriptor: &NotificationTypeDescriptor) -> bool {
        self.is_active
            && !self.email_blacklisted
            && self.email.as_deref().is_some_and(|e| !e.is_empty())
            && (!self.is_anonymous || descriptor.allow_anonymous)
    }
}

// ---------------------------------------------------------------------------
// PreferenceSnapshot
// ---------------------------------------------------------------------------

/// Every stored preference of one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceSnapshot {
    pub global: GlobalSetting,
    /// `(group_id, type key)` rows; the key may be `all` or `none`.
    pub group: HashMap<(DbId, String), NotificationSetting>,
    /// Multi-preference set key to setting.
    pub multi: HashMap<String, NotificationSetting>,
}

impl PreferenceSnapshot {
    pub fn with_global(global: GlobalSetting) -> Self {
        Self {
            global,
            ..Self::default()
        }
    }

    pub fn set_group(&mut self, group_id: DbId, key: impl Into<String>, setting: NotificationSetting) {
        self.group.insert((group_id, key.into()), setting);
    }

    pub fn set_multi(&mut self, key: impl Into<String>, setting: NotificationSetting) {
        self.multi.insert(key.into(), setting);
    }

    fn group_row(&self, group_id: DbId, key: &str) -> Option<NotificationSetting> {
        self.group.get(&(group_id, key.to_string())).copied()
    }
}

// ---------------------------------------------------------------------------
// PreferenceResolver
// ---------------------------------------------------------------------------

/// Stateless evaluator of the preference chain over a registry.
#[derive(Debug, Clone, Copy)]
pub struct PreferenceResolver<'a> {
    registry: &'a NotificationRegistry,
}

impl<'a> PreferenceResolver<'a> {
    pub fn new(registry: &'a NotificationRegistry) -> Self {
        Self { registry }
    }

    /// Decide instant mail, digest deferral or nothing for one recipient.
    ///
    /// Fails only with [`CoreError::UnknownType`].
    pub fn resolve(
        &self,
        recipient: &RecipientProfile,
        actor_id: DbId,
        type_key: &str,
        group_id: Option<DbId>,
        prefs: &PreferenceSnapshot,
    ) -> Result<Decision, CoreError> {
        let descriptor = self.registry.get(type_key)?;

        if !self.passes_audience_gate(recipient, actor_id, descriptor) {
            return Ok(Decision::Suppress);
        }

        // Step 1: deliverability. The override bypasses blacklisting and
        // every preference below, never a deactivated account.
        if self.registry.ignores_user_setting(type_key)
            && recipient.email.as_deref().is_some_and(|e| !e.is_empty())
        {
            return Ok(Decision::SendNow);
        }
        if !descriptor.can_be_email || !recipient.can_receive_email(descriptor) {
            return Ok(Decision::Suppress);
        }

        // Step 2: multi-preference sets never fall through.
        if let Some(set) = self.registry.multi_preference_for(type_key) {
            let setting = prefs
                .multi
                .get(&set.key)
                .copied()
                .unwrap_or(set.default_setting);
            return Ok(match setting {
                NotificationSetting::Now => Decision::SendNow,
                _ => Decision::Suppress,
            });
        }

        Ok(self.individual_chain(descriptor, group_id, prefs))
    }

    /// Whether the recipient wants this event in the digest of `frequency`.
    ///
    /// Applies the same chain as [`resolve`](Self::resolve) but accepts
    /// multi-preference sets configured to the frequency.
    pub fn wants_digest(
        &self,
        recipient: &RecipientProfile,
        actor_id: DbId,
        type_key: &str,
        group_id: Option<DbId>,
        prefs: &PreferenceSnapshot,
        frequency: DigestFrequency,
    ) -> Result<bool, CoreError> {
        let descriptor = self.registry.get(type_key)?;

        if !self.passes_audience_gate(recipient, actor_id, descriptor)
            || !descriptor.can_be_email
            || !recipient.can_receive_email(descriptor)
            || self.registry.ignores_user_setting(type_key)
        {
            return Ok(false);
        }

        if let Some(set) = self.registry.multi_preference_for(type_key) {
            let setting = prefs
                .multi
                .get(&set.key)
                .copied()
                .unwrap_or(set.default_setting);
            return Ok(setting == frequency.as_setting());
        }

        Ok(self.individual_chain(descriptor, group_id, prefs) == Decision::DeferDigest(frequency))
    }

    /// Moderator fan-out: runs in parallel to the moderator's own resolution.
    pub fn moderator_decision(
        &self,
        moderator: &RecipientProfile,
        actor_id: DbId,
        type_key: &str,
        publicly_readable: bool,
    ) -> Result<Decision, CoreError> {
        let descriptor = self.registry.get(type_key)?;
        let eligible = descriptor.moderatable
            && publicly_readable
            && moderator.user_id != actor_id
            && moderator.passes_gate()
            && moderator.can_receive_email(descriptor);
        Ok(if eligible {
            Decision::SendNow
        } else {
            Decision::Suppress
        })
    }

    fn passes_audience_gate(
        &self,
        recipient: &RecipientProfile,
        actor_id: DbId,
        descriptor: &NotificationTypeDescriptor,
    ) -> bool {
        if recipient.user_id == actor_id && !descriptor.allow_creator_as_audience {
            return false;
        }
        recipient.passes_gate()
    }

    /// Steps 3 to 5.
    fn individual_chain(
        &self,
        descriptor: &NotificationTypeDescriptor,
        group_id: Option<DbId>,
        prefs: &PreferenceSnapshot,
    ) -> Decision {
        match prefs.global {
            GlobalSetting::Never => return Decision::Suppress,
            GlobalSetting::Now => return Decision::SendNow,
            GlobalSetting::Daily => return Decision::DeferDigest(DigestFrequency::Daily),
            GlobalSetting::Weekly => return Decision::DeferDigest(DigestFrequency::Weekly),
            GlobalSetting::Individual => {}
        }

        let Some(group_id) = group_id else {
            return Decision::from_setting(descriptor.default_setting);
        };

        if prefs.group_row(group_id, GROUP_NONE_KEY).is_some() {
            return Decision::Suppress;
        }
        if let Some(all) = prefs.group_row(group_id, GROUP_ALL_KEY) {
            return Decision::from_setting(all);
        }

        let setting = prefs
            .group_row(group_id, &descriptor.key)
            .unwrap_or(descriptor.default_setting);
        Decision::from_setting(setting)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
