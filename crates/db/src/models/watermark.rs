use herald_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `digest_watermarks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WatermarkRow {
    pub frequency: String,
    pub last_sent_at: Timestamp,
}
