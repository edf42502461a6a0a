//! Repository for the `notification_alerts` table.

use herald_core::alert::{AlertKind, NewNotificationAlert, NotificationAlert};
use herald_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::alert::AlertRow;

/// Column list for `notification_alerts` queries.
const COLUMNS: &str = "id, recipient_id, notification_type, reason_key, group_id, \
    content_type, object_id, action_user_id, action_user, kind, last_event_at, seen, \
    title, url, image_url, subtitle, subtitle_icon, counter, multi_user_list, bundle_list, \
    item_hash, bundle_hash, created_at";

/// Provides merge-time and read-side access to alerts.
pub struct AlertRepo;

impl AlertRepo {
    // -----------------------------------------------------------------------
    // Merge path (inside a transaction)
    // -----------------------------------------------------------------------

    /// Take a transaction-scoped advisory lock on a merge key. Concurrent
    /// merges on the same `(recipient, hash)` serialise here until the
    /// holder commits or rolls back.
    pub async fn lock_merge_key(
        tx: &mut Transaction<'_, Postgres>,
        key: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Single or multi-user alerts of a recipient with the given item hash,
    /// newest first, locked for update.
    pub async fn find_by_item_hash(
        tx: &mut Transaction<'_, Postgres>,
        recipient_id: DbId,
        item_hash: &str,
    ) -> Result<Vec<AlertRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_alerts \
             WHERE recipient_id = $1 AND item_hash = $2 AND kind IN ($3, $4) \
             ORDER BY last_event_at DESC, id DESC \
             FOR UPDATE"
        );
        sqlx::query_as::<_, AlertRow>(&query)
            .bind(recipient_id)
            .bind(item_hash)
            .bind(AlertKind::Single.as_str())
            .bind(AlertKind::MultiUser.as_str())
            .fetch_all(&mut **tx)
            .await
    }

    /// Single or bundle alerts of a recipient with the given bundle hash
    /// whose last event is at or after `since`, newest first, locked for
    /// update.
    pub async fn find_by_bundle_hash(
        tx: &mut Transaction<'_, Postgres>,
        recipient_id: DbId,
        bundle_hash: &str,
        since: Timestamp,
    ) -> Result<Vec<AlertRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_alerts \
             WHERE recipient_id = $1 AND bundle_hash = $2 AND kind IN ($3, $4) \
               AND last_event_at >= $5 \
             ORDER BY last_event_at DESC, id DESC \
             FOR UPDATE"
        );
        sqlx::query_as::<_, AlertRow>(&query)
            .bind(recipient_id)
            .bind(bundle_hash)
            .bind(AlertKind::Single.as_str())
            .bind(AlertKind::Bundle.as_str())
            .bind(since)
            .fetch_all(&mut **tx)
            .await
    }

    /// Insert a new alert, returning the created row.
    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        alert: &NewNotificationAlert,
    ) -> Result<AlertRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_alerts \
                (recipient_id, notification_type, reason_key, group_id, content_type, \
                 object_id, action_user_id, action_user, kind, last_event_at, seen, title, \
                 url, image_url, subtitle, subtitle_icon, counter, multi_user_list, \
                 bundle_list, item_hash, bundle_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
                     $16, $17, $18, $19, $20, $21) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AlertRow>(&query)
            .bind(alert.recipient_id)
            .bind(&alert.notification_type)
            .bind(alert.reason.as_str())
            .bind(alert.group_id)
            .bind(&alert.target.content_type)
            .bind(alert.target.object_id)
            .bind(alert.actor.user_id)
            .bind(Json(&alert.actor))
            .bind(alert.kind.as_str())
            .bind(alert.last_event_at)
            .bind(alert.seen)
            .bind(&alert.display.title)
            .bind(&alert.display.url)
            .bind(&alert.display.image_url)
            .bind(&alert.display.subtitle)
            .bind(&alert.display.subtitle_icon)
            .bind(alert.counter)
            .bind(Json(&alert.multi_user_list))
            .bind(Json(&alert.bundle_list))
            .bind(&alert.item_hash)
            .bind(&alert.bundle_hash)
            .fetch_one(&mut **tx)
            .await
    }

    /// Write back every mutable field of a merged alert. The hashes are
    /// fixed at creation and never updated.
    pub async fn update_merged(
        tx: &mut Transaction<'_, Postgres>,
        alert: &NotificationAlert,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE notification_alerts SET \
                content_type = $2, object_id = $3, action_user_id = $4, action_user = $5, \
                kind = $6, last_event_at = $7, seen = $8, title = $9, url = $10, \
                image_url = $11, subtitle = $12, subtitle_icon = $13, counter = $14, \
                multi_user_list = $15, bundle_list = $16 \
             WHERE id = $1",
        )
        .bind(alert.id)
        .bind(&alert.target.content_type)
        .bind(alert.target.object_id)
        .bind(alert.actor.user_id)
        .bind(Json(&alert.actor))
        .bind(alert.kind.as_str())
        .bind(alert.last_event_at)
        .bind(alert.seen)
        .bind(&alert.display.title)
        .bind(&alert.display.url)
        .bind(&alert.display.image_url)
        .bind(&alert.display.subtitle)
        .bind(&alert.display.subtitle_icon)
        .bind(alert.counter)
        .bind(Json(&alert.multi_user_list))
        .bind(Json(&alert.bundle_list))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    /// A recipient's most recently active alerts.
    pub async fn list_for_recipient(
        pool: &PgPool,
        recipient_id: DbId,
        limit: i64,
    ) -> Result<Vec<AlertRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_alerts \
             WHERE recipient_id = $1 \
             ORDER BY last_event_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, AlertRow>(&query)
            .bind(recipient_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Mark every alert with activity up to `up_to` as seen.
    ///
    /// Returns the number of alerts that changed.
    pub async fn mark_seen(
        pool: &PgPool,
        recipient_id: DbId,
        up_to: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_alerts SET seen = true \
             WHERE recipient_id = $1 AND seen = false AND last_event_at <= $2",
        )
        .bind(recipient_id)
        .bind(up_to)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn unseen_count(pool: &PgPool, recipient_id: DbId) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_alerts WHERE recipient_id = $1 AND seen = false",
        )
        .bind(recipient_id)
        .fetch_one(pool)
        .await?;
        Ok(count.unwrap_or(0))
    }

    /// Delete alerts with no activity since `cutoff`.
    pub async fn delete_older_than(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notification_alerts WHERE last_event_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
