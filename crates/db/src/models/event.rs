//! Notification event rows.

use herald_core::event::NotificationEvent;
use herald_core::target::ObjectRef;
use herald_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `notification_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EventRow {
    pub id: DbId,
    pub notification_type: String,
    pub actor_id: DbId,
    pub content_type: String,
    pub object_id: DbId,
    pub group_id: Option<DbId>,
    pub audience: Vec<DbId>,
    pub extra: serde_json::Value,
    pub occurred_at: Timestamp,
}

impl From<EventRow> for NotificationEvent {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            notification_type: row.notification_type,
            actor_id: row.actor_id,
            target: ObjectRef::new(row.content_type, row.object_id),
            group_id: row.group_id,
            audience: row.audience,
            extra: row.extra,
            occurred_at: row.occurred_at,
        }
    }
}
