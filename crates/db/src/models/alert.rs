//! Notification alert rows.

use herald_core::alert::{
    AlertDisplay, AlertKind, BundleEntry, MultiUserEntry, NotificationAlert, ReasonKey,
};
use herald_core::error::CoreError;
use herald_core::target::{ActorDisplay, ObjectRef};
use herald_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `notification_alerts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AlertRow {
    pub id: DbId,
    pub recipient_id: DbId,
    pub notification_type: String,
    pub reason_key: String,
    pub group_id: Option<DbId>,
    pub content_type: String,
    pub object_id: DbId,
    pub action_user_id: DbId,
    pub action_user: Json<ActorDisplay>,
    pub kind: String,
    pub last_event_at: Timestamp,
    pub seen: bool,
    pub title: String,
    pub url: String,
    pub image_url: String,
    pub subtitle: Option<String>,
    pub subtitle_icon: Option<String>,
    pub counter: i32,
    pub multi_user_list: Json<Vec<MultiUserEntry>>,
    pub bundle_list: Json<Vec<BundleEntry>>,
    pub item_hash: String,
    pub bundle_hash: String,
    pub created_at: Timestamp,
}

impl TryFrom<AlertRow> for NotificationAlert {
    type Error = CoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            recipient_id: row.recipient_id,
            notification_type: row.notification_type,
            reason: ReasonKey::from_name(&row.reason_key)?,
            group_id: row.group_id,
            target: ObjectRef::new(row.content_type, row.object_id),
            actor: row.action_user.0,
            kind: AlertKind::from_name(&row.kind)?,
            last_event_at: row.last_event_at,
            seen: row.seen,
            display: AlertDisplay {
                title: row.title,
                url: row.url,
                image_url: row.image_url,
                subtitle: row.subtitle,
                subtitle_icon: row.subtitle_icon,
            },
            counter: row.counter,
            multi_user_list: row.multi_user_list.0,
            bundle_list: row.bundle_list.0,
            item_hash: row.item_hash,
            bundle_hash: row.bundle_hash,
            created_at: row.created_at,
        })
    }
}
