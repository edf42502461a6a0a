//! Repository for the `notification_events` table.

use herald_core::event::NewNotificationEvent;
use herald_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::event::EventRow;

/// Column list for `notification_events` queries.
const COLUMNS: &str = "id, notification_type, actor_id, content_type, object_id, group_id, \
    audience, extra, occurred_at";

/// Provides insert, window queries and retention for digest events.
pub struct EventRepo;

impl EventRepo {
    /// Persist an event, returning the created row.
    pub async fn insert(pool: &PgPool, event: &NewNotificationEvent) -> Result<EventRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_events \
                (notification_type, actor_id, content_type, object_id, group_id, audience, \
                 extra, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, EventRow>(&query)
            .bind(&event.notification_type)
            .bind(event.actor_id)
            .bind(&event.target.content_type)
            .bind(event.target.object_id)
            .bind(event.group_id)
            .bind(&event.audience)
            .bind(&event.extra)
            .bind(event.occurred_at)
            .fetch_one(pool)
            .await
    }

    /// Events in `[from, to)` whose audience contains the recipient,
    /// oldest first.
    pub async fn list_for_recipient(
        pool: &PgPool,
        recipient_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<EventRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_events \
             WHERE $1 = ANY(audience) AND occurred_at >= $2 AND occurred_at < $3 \
             ORDER BY occurred_at, id"
        );
        sqlx::query_as::<_, EventRow>(&query)
            .bind(recipient_id)
            .bind(from)
            .bind(to)
            .fetch_all(pool)
            .await
    }

    /// Every user appearing in the audience of an event in `[from, to)`.
    pub async fn recipients_in_window(
        pool: &PgPool,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT DISTINCT recipient FROM notification_events, \
                 unnest(audience) AS recipient \
             WHERE occurred_at >= $1 AND occurred_at < $2 \
             ORDER BY recipient",
        )
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }

    /// Delete events that occurred before `cutoff`.
    ///
    /// Returns the number of rows deleted.
    pub async fn delete_older_than(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notification_events WHERE occurred_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
