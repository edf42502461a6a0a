//! Storage capabilities used by the runtime.
//!
//! The traits are split by table family so tests and embedders can reason
//! about each concern separately; [`NotificationStore`] bundles them for
//! wiring. [`MemoryStore`](crate::memory::MemoryStore) and
//! [`PgStore`](crate::postgres::PgStore) implement all of them.

use async_trait::async_trait;
use herald_core::alert::{AlertKind, NewNotificationAlert, NotificationAlert};
use herald_core::error::CoreError;
use herald_core::event::{NewNotificationEvent, NotificationEvent};
use herald_core::preference::PreferenceSnapshot;
use herald_core::setting::{DigestFrequency, GlobalSetting, NotificationSetting};
use herald_core::types::{DbId, Timestamp};

use crate::error::EventsError;

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Which existing alerts a merge may fold into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeLookup {
    /// Single or multi-user alerts with this item hash.
    Item { recipient_id: DbId, item_hash: String },
    /// Single or bundle alerts with this bundle hash and activity at or
    /// after `since`.
    Bundle {
        recipient_id: DbId,
        bundle_hash: String,
        since: Timestamp,
    },
}

impl MergeLookup {
    pub fn recipient_id(&self) -> DbId {
        match self {
            Self::Item { recipient_id, .. } | Self::Bundle { recipient_id, .. } => *recipient_id,
        }
    }

    /// Mutual-exclusion scope of the merge: one per (recipient, hash).
    pub fn lock_key(&self) -> String {
        match self {
            Self::Item {
                recipient_id,
                item_hash,
            } => format!("{recipient_id}:{item_hash}"),
            Self::Bundle {
                recipient_id,
                bundle_hash,
                ..
            } => format!("{recipient_id}:{bundle_hash}"),
        }
    }

    pub fn matches(&self, alert: &NotificationAlert) -> bool {
        match self {
            Self::Item {
                recipient_id,
                item_hash,
            } => {
                alert.recipient_id == *recipient_id
                    && alert.item_hash == *item_hash
                    && matches!(alert.kind, AlertKind::Single | AlertKind::MultiUser)
            }
            Self::Bundle {
                recipient_id,
                bundle_hash,
                since,
            } => {
                alert.recipient_id == *recipient_id
                    && alert.bundle_hash == *bundle_hash
                    && alert.last_event_at >= *since
                    && matches!(alert.kind, AlertKind::Single | AlertKind::Bundle)
            }
        }
    }
}

/// What the merge decision wants written.
#[derive(Debug, Clone)]
pub enum AlertWrite {
    Insert(NewNotificationAlert),
    Update(NotificationAlert),
}

/// Pure merge decision run while the merge scope is locked. Receives the
/// matching alerts, newest first.
pub type MergeDecision =
    Box<dyn FnOnce(Vec<NotificationAlert>) -> Result<AlertWrite, CoreError> + Send>;

/// An alert as written by [`AlertStore::merge_or_insert`].
#[derive(Debug, Clone)]
pub struct MergeWrite {
    pub alert: NotificationAlert,
    pub created: bool,
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Lock the lookup's scope, load the matching alerts, run `decide` and
    /// write its result, all atomically. The lock is released before this
    /// returns; no I/O other than the write happens under it.
    async fn merge_or_insert(
        &self,
        lookup: MergeLookup,
        decide: MergeDecision,
    ) -> Result<MergeWrite, EventsError>;

    /// Insert without looking for merge candidates.
    async fn insert_alert(&self, alert: NewNotificationAlert) -> Result<NotificationAlert, EventsError>;

    /// Newest alerts of a recipient by last activity.
    async fn list_alerts(&self, recipient_id: DbId, limit: i64) -> Result<Vec<NotificationAlert>, EventsError>;

    async fn mark_seen(&self, recipient_id: DbId, up_to: Timestamp) -> Result<u64, EventsError>;

    async fn unseen_count(&self, recipient_id: DbId) -> Result<i64, EventsError>;

    async fn delete_alerts_older_than(&self, cutoff: Timestamp) -> Result<u64, EventsError>;
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, event: NewNotificationEvent) -> Result<NotificationEvent, EventsError>;

    /// Events in `[from, to)` whose audience contains the recipient.
    async fn events_for_recipient(
        &self,
        recipient_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<NotificationEvent>, EventsError>;

    /// Every audience member of an event in `[from, to)`.
    async fn digest_recipients(&self, from: Timestamp, to: Timestamp) -> Result<Vec<DbId>, EventsError>;

    async fn delete_events_older_than(&self, cutoff: Timestamp) -> Result<u64, EventsError>;
}

// ---------------------------------------------------------------------------
// Preferences and watermarks
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn preference_snapshot(&self, user_id: DbId) -> Result<PreferenceSnapshot, EventsError>;

    async fn set_global_setting(&self, user_id: DbId, setting: GlobalSetting) -> Result<(), EventsError>;

    /// `key` is a notification type key or `all` / `none`.
    async fn set_group_preference(
        &self,
        user_id: DbId,
        group_id: DbId,
        key: &str,
        setting: NotificationSetting,
    ) -> Result<(), EventsError>;

    async fn set_multi_preference(
        &self,
        user_id: DbId,
        key: &str,
        setting: NotificationSetting,
    ) -> Result<(), EventsError>;
}

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn last_digest_sent(&self, frequency: DigestFrequency) -> Result<Option<Timestamp>, EventsError>;

    async fn set_last_digest_sent(&self, frequency: DigestFrequency, at: Timestamp) -> Result<(), EventsError>;
}

/// Everything the runtime persists.
pub trait NotificationStore: AlertStore + EventStore + PreferenceStore + WatermarkStore {}

impl<T> NotificationStore for T where T: AlertStore + EventStore + PreferenceStore + WatermarkStore {}
