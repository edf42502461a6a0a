//! Persisted raw occurrences kept for digest composition.

use serde::{Deserialize, Serialize};

use crate::target::ObjectRef;
use crate::types::{DbId, Timestamp};

/// Insert payload for a [`NotificationEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotificationEvent {
    pub notification_type: String,
    pub actor_id: DbId,
    pub target: ObjectRef,
    /// `None` when the target is itself a group.
    pub group_id: Option<DbId>,
    pub audience: Vec<DbId>,
    pub extra: serde_json::Value,
    pub occurred_at: Timestamp,
}

/// One physical event with at least one recipient who deferred to a digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: DbId,
    pub notification_type: String,
    pub actor_id: DbId,
    pub target: ObjectRef,
    pub group_id: Option<DbId>,
    pub audience: Vec<DbId>,
    pub extra: serde_json::Value,
    pub occurred_at: Timestamp,
}

impl NotificationEvent {
    pub fn from_new(id: DbId, new: NewNotificationEvent) -> Self {
        Self {
            id,
            notification_type: new.notification_type,
            actor_id: new.actor_id,
            target: new.target,
            group_id: new.group_id,
            audience: new.audience,
            extra: new.extra,
            occurred_at: new.occurred_at,
        }
    }

    pub fn has_recipient(&self, user_id: DbId) -> bool {
        self.audience.contains(&user_id)
    }

    /// The group whose preferences govern this event: the owning group, or
    /// the target itself when it is a group.
    pub fn preference_group(&self) -> Option<DbId> {
        self.group_id
            .or_else(|| self.target.is_group().then_some(self.target.object_id))
    }
}
