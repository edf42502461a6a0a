//! Repository for the `digest_watermarks` table.

use herald_core::setting::DigestFrequency;
use herald_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::watermark::WatermarkRow;

/// Per-frequency "last digest sent" timestamps.
pub struct WatermarkRepo;

impl WatermarkRepo {
    pub async fn get(
        pool: &PgPool,
        frequency: DigestFrequency,
    ) -> Result<Option<WatermarkRow>, sqlx::Error> {
        sqlx::query_as::<_, WatermarkRow>(
            "SELECT frequency, last_sent_at FROM digest_watermarks WHERE frequency = $1",
        )
        .bind(frequency.as_str())
        .fetch_optional(pool)
        .await
    }

    /// Set the watermark of one frequency. Other frequencies are untouched.
    pub async fn set(
        pool: &PgPool,
        frequency: DigestFrequency,
        last_sent_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO digest_watermarks (frequency, last_sent_at) VALUES ($1, $2) \
             ON CONFLICT (frequency) DO UPDATE SET last_sent_at = EXCLUDED.last_sent_at",
        )
        .bind(frequency.as_str())
        .bind(last_sent_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
