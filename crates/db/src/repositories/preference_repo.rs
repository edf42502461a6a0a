//! Repository for the three preference tables.

use herald_core::preference::PreferenceSnapshot;
use herald_core::setting::{GlobalSetting, NotificationSetting};
use herald_core::types::DbId;
use sqlx::PgPool;

use crate::decode_error;
use crate::models::preference::{
    build_snapshot, GlobalSettingRow, GroupPreferenceRow, MultiPreferenceRow,
};

/// Column list for `user_notification_preferences` queries.
const GROUP_COLUMNS: &str = "id, user_id, group_id, notification_type, setting, updated_at";

/// Column list for `user_multi_notification_preferences` queries.
const MULTI_COLUMNS: &str = "id, user_id, multi_pref_key, setting, updated_at";

/// Reads and writes user notification preferences.
pub struct PreferenceRepo;

impl PreferenceRepo {
    pub async fn global_setting(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<GlobalSettingRow>, sqlx::Error> {
        sqlx::query_as::<_, GlobalSettingRow>(
            "SELECT user_id, setting, updated_at FROM global_user_notification_settings \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_group_preferences(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<GroupPreferenceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {GROUP_COLUMNS} FROM user_notification_preferences \
             WHERE user_id = $1 \
             ORDER BY group_id, notification_type"
        );
        sqlx::query_as::<_, GroupPreferenceRow>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    pub async fn list_multi_preferences(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<MultiPreferenceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {MULTI_COLUMNS} FROM user_multi_notification_preferences \
             WHERE user_id = $1 \
             ORDER BY multi_pref_key"
        );
        sqlx::query_as::<_, MultiPreferenceRow>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Load every preference of a user into one snapshot.
    pub async fn snapshot(pool: &PgPool, user_id: DbId) -> Result<PreferenceSnapshot, sqlx::Error> {
        let global = Self::global_setting(pool, user_id).await?;
        let group_rows = Self::list_group_preferences(pool, user_id).await?;
        let multi_rows = Self::list_multi_preferences(pool, user_id).await?;
        build_snapshot(global, group_rows, multi_rows).map_err(decode_error)
    }

    /// Insert or update the blanket setting of a user.
    pub async fn upsert_global(
        pool: &PgPool,
        user_id: DbId,
        setting: GlobalSetting,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO global_user_notification_settings (user_id, setting) \
             VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET \
                setting = EXCLUDED.setting, \
                updated_at = NOW()",
        )
        .bind(user_id)
        .bind(setting.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Insert or update a per-(group, type) row. `notification_type` may
    /// also be `all` or `none`.
    pub async fn upsert_group_preference(
        pool: &PgPool,
        user_id: DbId,
        group_id: DbId,
        notification_type: &str,
        setting: NotificationSetting,
    ) -> Result<GroupPreferenceRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_notification_preferences \
                (user_id, group_id, notification_type, setting) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, group_id, notification_type) DO UPDATE SET \
                setting = EXCLUDED.setting, \
                updated_at = NOW() \
             RETURNING {GROUP_COLUMNS}"
        );
        sqlx::query_as::<_, GroupPreferenceRow>(&query)
            .bind(user_id)
            .bind(group_id)
            .bind(notification_type)
            .bind(setting.as_str())
            .fetch_one(pool)
            .await
    }

    pub async fn upsert_multi_preference(
        pool: &PgPool,
        user_id: DbId,
        multi_pref_key: &str,
        setting: NotificationSetting,
    ) -> Result<MultiPreferenceRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_multi_notification_preferences (user_id, multi_pref_key, setting) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, multi_pref_key) DO UPDATE SET \
                setting = EXCLUDED.setting, \
                updated_at = NOW() \
             RETURNING {MULTI_COLUMNS}"
        );
        sqlx::query_as::<_, MultiPreferenceRow>(&query)
            .bind(user_id)
            .bind(multi_pref_key)
            .bind(setting.as_str())
            .fetch_one(pool)
            .await
    }
}
