//! Per-recipient in-app alerts and their merge rules.
//!
//! An alert starts as [`AlertKind::Single`]. Further events with the same
//! [`ItemKey`](crate::hashing::ItemKey) from different actors turn it into a
//! [`AlertKind::MultiUser`] alert; further events with the same
//! [`BundleKey`](crate::hashing::BundleKey) on different objects turn it into
//! a [`AlertKind::Bundle`] alert. The two merged kinds never convert into
//! each other and never return to `Single`.
//!
//! The side list of a merged alert holds every participant except the
//! current one, newest first, so `list.len() == counter - 1` always holds.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hashing::{BundleKey, ItemKey};
use crate::registry::NotificationTypeDescriptor;
use crate::target::{ActorDisplay, GroupDisplay, ObjectRef, TargetDisplay};
use crate::types::{DbId, Timestamp};

/// Last-resort alert image.
pub const QUESTION_MARK_ICON: &str = "/static/images/icons/question-mark.png";

// ---------------------------------------------------------------------------
// AlertKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Single,
    MultiUser,
    Bundle,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::MultiUser => "multi_user",
            Self::Bundle => "bundle",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "single" => Ok(Self::Single),
            "multi_user" => Ok(Self::MultiUser),
            "bundle" => Ok(Self::Bundle),
            other => Err(CoreError::Validation(format!("Unknown alert kind '{other}'"))),
        }
    }

    /// Allowed transitions: unchanged, or single to either merged kind.
    pub fn can_become(self, next: AlertKind) -> bool {
        self == next || (self == Self::Single && next != Self::Single)
    }
}

// ---------------------------------------------------------------------------
// ReasonKey
// ---------------------------------------------------------------------------

/// Why the recipient is seeing an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKey {
    IsGroup,
    IsCreator,
    Special,
    FollowObject,
    FollowGroup,
    None,
}

impl ReasonKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IsGroup => "is_group",
            Self::IsCreator => "is_creator",
            Self::Special => "special",
            Self::FollowObject => "follow_object",
            Self::FollowGroup => "follow_group",
            Self::None => "none",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "is_group" => Ok(Self::IsGroup),
            "is_creator" => Ok(Self::IsCreator),
            "special" => Ok(Self::Special),
            "follow_object" => Ok(Self::FollowObject),
            "follow_group" => Ok(Self::FollowGroup),
            "none" => Ok(Self::None),
            other => Err(CoreError::Validation(format!("Unknown alert reason '{other}'"))),
        }
    }
}

/// Facts about the recipient's relation to the target, in reason priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReasonFacts {
    pub target_is_group: bool,
    pub is_creator: bool,
    pub special: bool,
    pub follows_object: bool,
    pub follows_group: bool,
}

impl ReasonFacts {
    /// The first matching reason, or `None` when no alert is warranted.
    pub fn reason(&self) -> Option<ReasonKey> {
        if self.target_is_group {
            Some(ReasonKey::IsGroup)
        } else if self.is_creator {
            Some(ReasonKey::IsCreator)
        } else if self.special {
            Some(ReasonKey::Special)
        } else if self.follows_object {
            Some(ReasonKey::FollowObject)
        } else if self.follows_group {
            Some(ReasonKey::FollowGroup)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Display fields and side-list entries
// ---------------------------------------------------------------------------

/// Cached display fields, recomputed from the target on create and merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDisplay {
    pub title: String,
    pub url: String,
    pub image_url: String,
    pub subtitle: Option<String>,
    pub subtitle_icon: Option<String>,
}

impl AlertDisplay {
    /// Build display fields, picking the first available image of: the
    /// alert image, the general image, the type icon image, the
    /// question-mark icon.
    pub fn compose(
        target: &TargetDisplay,
        group: Option<&GroupDisplay>,
        descriptor: &NotificationTypeDescriptor,
    ) -> Self {
        let image_url = target
            .alert_image_url
            .clone()
            .or_else(|| target.image_url.clone())
            .or_else(|| descriptor.icon_image_url.clone())
            .unwrap_or_else(|| QUESTION_MARK_ICON.to_string());
        Self {
            title: target.title.clone(),
            url: target.url.clone(),
            image_url,
            subtitle: group.map(|g| g.title.clone()),
            subtitle_icon: group.and_then(|g| g.icon_url.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiUserEntry {
    pub user_id: DbId,
    pub title: String,
    pub url: String,
    pub icon_url: Option<String>,
}

impl From<&ActorDisplay> for MultiUserEntry {
    fn from(actor: &ActorDisplay) -> Self {
        Self {
            user_id: actor.user_id,
            title: actor.name.clone(),
            url: actor.url.clone(),
            icon_url: actor.avatar_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub object_id: DbId,
    pub title: String,
    pub url: String,
    pub icon_url: Option<String>,
}

// ---------------------------------------------------------------------------
// AlertCandidate
// ---------------------------------------------------------------------------

/// One event as seen by one recipient, ready to be created or merged.
#[derive(Debug, Clone)]
pub struct AlertCandidate {
    pub recipient_id: DbId,
    pub notification_type: String,
    pub reason: ReasonKey,
    pub group_id: Option<DbId>,
    pub target: ObjectRef,
    pub actor: ActorDisplay,
    pub display: AlertDisplay,
    pub occurred_at: Timestamp,
    pub item_key: ItemKey,
    pub bundle_key: BundleKey,
}

impl AlertCandidate {
    /// A fresh single-type alert for this candidate.
    pub fn to_new_alert(&self) -> NewNotificationAlert {
        NewNotificationAlert {
            recipient_id: self.recipient_id,
            notification_type: self.notification_type.clone(),
            reason: self.reason,
            group_id: self.group_id,
            target: self.target.clone(),
            actor: self.actor.clone(),
            kind: AlertKind::Single,
            last_event_at: self.occurred_at,
            seen: false,
            display: self.display.clone(),
            counter: 0,
            multi_user_list: Vec::new(),
            bundle_list: Vec::new(),
            item_hash: self.item_key.digest(),
            bundle_hash: self.bundle_key.digest(),
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationAlert
// ---------------------------------------------------------------------------

/// Insert payload for a new alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotificationAlert {
    pub recipient_id: DbId,
    pub notification_type: String,
    pub reason: ReasonKey,
    pub group_id: Option<DbId>,
    pub target: ObjectRef,
    pub actor: ActorDisplay,
    pub kind: AlertKind,
    pub last_event_at: Timestamp,
    pub seen: bool,
    pub display: AlertDisplay,
    pub counter: i32,
    pub multi_user_list: Vec<MultiUserEntry>,
    pub bundle_list: Vec<BundleEntry>,
    pub item_hash: String,
    pub bundle_hash: String,
}

/// A persisted alert. Owned by exactly one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAlert {
    pub id: DbId,
    pub recipient_id: DbId,
    pub notification_type: String,
    pub reason: ReasonKey,
    pub group_id: Option<DbId>,
    pub target: ObjectRef,
    /// The most recent actor.
    pub actor: ActorDisplay,
    pub kind: AlertKind,
    pub last_event_at: Timestamp,
    pub seen: bool,
    pub display: AlertDisplay,
    pub counter: i32,
    pub multi_user_list: Vec<MultiUserEntry>,
    pub bundle_list: Vec<BundleEntry>,
    pub item_hash: String,
    pub bundle_hash: String,
    pub created_at: Timestamp,
}

impl NotificationAlert {
    /// Attach storage identity to an insert payload.
    pub fn from_new(id: DbId, new: NewNotificationAlert, created_at: Timestamp) -> Self {
        Self {
            id,
            recipient_id: new.recipient_id,
            notification_type: new.notification_type,
            reason: new.reason,
            group_id: new.group_id,
            target: new.target,
            actor: new.actor,
            kind: new.kind,
            last_event_at: new.last_event_at,
            seen: new.seen,
            display: new.display,
            counter: new.counter,
            multi_user_list: new.multi_user_list,
            bundle_list: new.bundle_list,
            item_hash: new.item_hash,
            bundle_hash: new.bundle_hash,
            created_at,
        }
    }

    fn refresh(&mut self, candidate: &AlertCandidate) {
        self.display = candidate.display.clone();
        self.last_event_at = candidate.occurred_at;
        self.seen = false;
    }

    fn transition(&mut self, next: AlertKind) -> Result<(), CoreError> {
        if !self.kind.can_become(next) {
            return Err(CoreError::Validation(format!(
                "Alert {} cannot change from {} to {}",
                self.id,
                self.kind.as_str(),
                next.as_str()
            )));
        }
        if self.kind != next {
            self.kind = next;
            self.counter = 1;
        }
        Ok(())
    }

    /// Fold an event from a possibly new actor on the same object into this
    /// alert.
    pub fn merge_multi_user(&mut self, candidate: &AlertCandidate) -> Result<MergeEffect, CoreError> {
        if !self.kind.can_become(AlertKind::MultiUser) {
            return Err(CoreError::Validation(format!(
                "Alert {} of kind {} cannot take a multi-user merge",
                self.id,
                self.kind.as_str()
            )));
        }

        let actor_id = candidate.actor.user_id;
        let seen_before = self.actor.user_id == actor_id
            || self.multi_user_list.iter().any(|e| e.user_id == actor_id);
        if seen_before {
            self.refresh(candidate);
            return Ok(MergeEffect::Repeat);
        }

        self.transition(AlertKind::MultiUser)?;
        self.multi_user_list
            .insert(0, MultiUserEntry::from(&self.actor));
        self.counter += 1;
        self.actor = candidate.actor.clone();
        self.target = candidate.target.clone();
        self.refresh(candidate);
        Ok(MergeEffect::Absorbed)
    }

    /// Fold an event by the same actor on a possibly new object into this
    /// alert.
    pub fn merge_bundle(&mut self, candidate: &AlertCandidate) -> Result<MergeEffect, CoreError> {
        if !self.kind.can_become(AlertKind::Bundle) {
            return Err(CoreError::Validation(format!(
                "Alert {} of kind {} cannot take a bundle merge",
                self.id,
                self.kind.as_str()
            )));
        }

        let object_id = candidate.target.object_id;
        let seen_before = self.target == candidate.target
            || self.bundle_list.iter().any(|e| e.object_id == object_id);
        if seen_before {
            self.refresh(candidate);
            return Ok(MergeEffect::Repeat);
        }

        self.transition(AlertKind::Bundle)?;
        let current = BundleEntry {
            object_id: self.target.object_id,
            title: self.display.title.clone(),
            url: self.display.url.clone(),
            icon_url: Some(self.display.image_url.clone()),
        };
        self.bundle_list.insert(0, current);
        self.counter += 1;
        self.actor = candidate.actor.clone();
        self.target = candidate.target.clone();
        self.refresh(candidate);
        Ok(MergeEffect::Absorbed)
    }
}

/// What a merge did to an existing alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeEffect {
    /// Same actor (multi-user) or same object (bundle) again: timestamps and
    /// display refreshed, counter and lists untouched.
    Repeat,
    /// A new participant was added.
    Absorbed,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::registry::MultiMergeKind;
    use crate::setting::NotificationSetting;

    const RECIPIENT: DbId = 100;
    const GROUP: DbId = 7;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn actor(id: DbId) -> ActorDisplay {
        ActorDisplay {
            user_id: id,
            name: format!("user {id}"),
            url: format!("/users/{id}"),
            avatar_url: None,
        }
    }

    fn candidate(actor_id: DbId, object_id: DbId, at: Timestamp) -> AlertCandidate {
        let target = ObjectRef::new("note", object_id);
        let key = "notes__comment_posted";
        AlertCandidate {
            recipient_id: RECIPIENT,
            notification_type: key.to_string(),
            reason: ReasonKey::FollowObject,
            group_id: Some(GROUP),
            target: target.clone(),
            actor: actor(actor_id),
            display: AlertDisplay {
                title: format!("note {object_id}"),
                url: format!("/notes/{object_id}"),
                image_url: QUESTION_MARK_ICON.to_string(),
                subtitle: Some("group".to_string()),
                subtitle_icon: None,
            },
            occurred_at: at,
            item_key: ItemKey::new(1, Some(GROUP), &target, key),
            bundle_key: BundleKey::new(1, Some(GROUP), &target, key, actor_id),
        }
    }

    fn persisted(c: &AlertCandidate) -> NotificationAlert {
        NotificationAlert::from_new(1, c.to_new_alert(), c.occurred_at)
    }

    // -- kinds and reasons -------------------------------------------------------

    #[test]
    fn kind_transitions() {
        assert!(AlertKind::Single.can_become(AlertKind::MultiUser));
        assert!(AlertKind::Single.can_become(AlertKind::Bundle));
        assert!(!AlertKind::MultiUser.can_become(AlertKind::Bundle));
        assert!(!AlertKind::Bundle.can_become(AlertKind::Single));
        assert!(!AlertKind::MultiUser.can_become(AlertKind::Single));
    }

    #[test]
    fn reason_priority() {
        let facts = ReasonFacts {
            follows_group: true,
            follows_object: true,
            ..Default::default()
        };
        assert_eq!(facts.reason(), Some(ReasonKey::FollowObject));

        let facts = ReasonFacts {
            follows_group: true,
            ..Default::default()
        };
        assert_eq!(facts.reason(), Some(ReasonKey::FollowGroup));

        let facts = ReasonFacts {
            target_is_group: true,
            is_creator: true,
            ..Default::default()
        };
        assert_eq!(facts.reason(), Some(ReasonKey::IsGroup));

        assert_eq!(ReasonFacts::default().reason(), None);
    }

    // -- display -----------------------------------------------------------------

    #[test]
    fn display_image_fallback_chain() {
        let descriptor = NotificationTypeDescriptor::new(
            "notes__comment_posted",
            "Comment",
            NotificationSetting::Now,
        )
        .with_alert(MultiMergeKind::MultiUser);
        let mut target = TargetDisplay {
            title: "t".to_string(),
            url: "/t".to_string(),
            alert_image_url: Some("/alert.png".to_string()),
            image_url: Some("/image.png".to_string()),
        };
        assert_eq!(AlertDisplay::compose(&target, None, &descriptor).image_url, "/alert.png");

        target.alert_image_url = None;
        assert_eq!(AlertDisplay::compose(&target, None, &descriptor).image_url, "/image.png");

        target.image_url = None;
        assert_eq!(
            AlertDisplay::compose(&target, None, &descriptor).image_url,
            QUESTION_MARK_ICON
        );

        let with_icon = descriptor.with_icon_image("/icons/comment.png");
        assert_eq!(
            AlertDisplay::compose(&target, None, &with_icon).image_url,
            "/icons/comment.png"
        );
    }

    #[test]
    fn display_subtitle_from_group() {
        let descriptor =
            NotificationTypeDescriptor::new("notes__x", "X", NotificationSetting::Now);
        let group = GroupDisplay {
            group_id: GROUP,
            title: "Gardeners".to_string(),
            url: "/g".to_string(),
            icon_url: Some("/g.png".to_string()),
        };
        let d = AlertDisplay::compose(&TargetDisplay::default(), Some(&group), &descriptor);
        assert_eq!(d.subtitle.as_deref(), Some("Gardeners"));
        assert_eq!(d.subtitle_icon.as_deref(), Some("/g.png"));
    }

    // -- multi-user merges -------------------------------------------------------

    #[test]
    fn three_actors_make_multi_user_alert() {
        let mut alert = persisted(&candidate(1, 50, t0()));
        alert
            .merge_multi_user(&candidate(2, 50, t0() + Duration::minutes(1)))
            .unwrap();
        let effect = alert
            .merge_multi_user(&candidate(3, 50, t0() + Duration::minutes(2)))
            .unwrap();

        assert_eq!(effect, MergeEffect::Absorbed);
        assert_eq!(alert.kind, AlertKind::MultiUser);
        assert_eq!(alert.counter, 3);
        assert_eq!(alert.actor.user_id, 3);
        let ids: Vec<_> = alert.multi_user_list.iter().map(|e| e.user_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(alert.multi_user_list.len() as i32, alert.counter - 1);
    }

    #[test]
    fn same_actor_repeat_keeps_single() {
        let mut alert = persisted(&candidate(1, 50, t0()));
        let later = t0() + Duration::minutes(30);
        for i in 1..=3 {
            let effect = alert
                .merge_multi_user(&candidate(1, 50, t0() + Duration::minutes(10 * i)))
                .unwrap();
            assert_eq!(effect, MergeEffect::Repeat);
        }
        assert_eq!(alert.kind, AlertKind::Single);
        assert_eq!(alert.counter, 0);
        assert!(alert.multi_user_list.is_empty());
        assert_eq!(alert.last_event_at, later);
    }

    #[test]
    fn repeat_from_listed_actor_clears_seen_only() {
        let mut alert = persisted(&candidate(1, 50, t0()));
        alert.merge_multi_user(&candidate(2, 50, t0())).unwrap();
        alert.seen = true;
        let effect = alert.merge_multi_user(&candidate(1, 50, t0())).unwrap();
        assert_eq!(effect, MergeEffect::Repeat);
        assert!(!alert.seen);
        assert_eq!(alert.counter, 2);
        assert_eq!(alert.actor.user_id, 2);
    }

    #[test]
    fn multi_user_merge_into_bundle_rejected() {
        let mut alert = persisted(&candidate(1, 50, t0()));
        alert.kind = AlertKind::Bundle;
        assert_matches!(
            alert.merge_multi_user(&candidate(2, 50, t0())),
            Err(CoreError::Validation(_))
        );
    }

    // -- bundle merges -----------------------------------------------------------

    #[test]
    fn distinct_objects_make_bundle() {
        let mut alert = persisted(&candidate(1, 50, t0()));
        alert.merge_bundle(&candidate(1, 51, t0())).unwrap();
        alert.merge_bundle(&candidate(1, 52, t0())).unwrap();

        assert_eq!(alert.kind, AlertKind::Bundle);
        assert_eq!(alert.counter, 3);
        assert_eq!(alert.target.object_id, 52);
        let ids: Vec<_> = alert.bundle_list.iter().map(|e| e.object_id).collect();
        assert_eq!(ids, vec![51, 50]);
        assert_eq!(alert.bundle_list[1].title, "note 50");
    }

    #[test]
    fn bundle_repeat_of_listed_object() {
        let mut alert = persisted(&candidate(1, 50, t0()));
        alert.merge_bundle(&candidate(1, 51, t0())).unwrap();
        let effect = alert.merge_bundle(&candidate(1, 50, t0())).unwrap();
        assert_eq!(effect, MergeEffect::Repeat);
        assert_eq!(alert.counter, 2);
        assert_eq!(alert.bundle_list.len(), 1);
    }

    #[test]
    fn bundle_merge_into_multi_user_rejected() {
        let mut alert = persisted(&candidate(1, 50, t0()));
        alert.merge_multi_user(&candidate(2, 50, t0())).unwrap();
        assert!(alert.merge_bundle(&candidate(2, 51, t0())).is_err());
    }

    #[test]
    fn new_alert_carries_hashes() {
        let c = candidate(1, 50, t0());
        let new = c.to_new_alert();
        assert_eq!(new.item_hash, c.item_key.digest());
        assert_eq!(new.bundle_hash, c.bundle_key.digest());
        assert_eq!(new.kind, AlertKind::Single);
        assert!(!new.seen);
    }
}
