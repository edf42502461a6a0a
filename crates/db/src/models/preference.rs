//! Preference rows and the snapshot assembled from them.

use herald_core::error::CoreError;
use herald_core::preference::PreferenceSnapshot;
use herald_core::setting::{GlobalSetting, NotificationSetting};
use herald_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `user_notification_preferences` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GroupPreferenceRow {
    pub id: DbId,
    pub user_id: DbId,
    pub group_id: DbId,
    pub notification_type: String,
    pub setting: String,
    pub updated_at: Timestamp,
}

/// A row from the `user_multi_notification_preferences` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MultiPreferenceRow {
    pub id: DbId,
    pub user_id: DbId,
    pub multi_pref_key: String,
    pub setting: String,
    pub updated_at: Timestamp,
}

/// A row from the `global_user_notification_settings` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GlobalSettingRow {
    pub user_id: DbId,
    pub setting: String,
    pub updated_at: Timestamp,
}

/// Fold stored rows into a [`PreferenceSnapshot`]. A missing global row
/// means [`GlobalSetting::Individual`].
pub fn build_snapshot(
    global: Option<GlobalSettingRow>,
    group_rows: Vec<GroupPreferenceRow>,
    multi_rows: Vec<MultiPreferenceRow>,
) -> Result<PreferenceSnapshot, CoreError> {
    let global = match global {
        Some(row) => GlobalSetting::from_name(&row.setting)?,
        None => GlobalSetting::default(),
    };
    let mut snapshot = PreferenceSnapshot::with_global(global);
    for row in group_rows {
        let setting = NotificationSetting::from_name(&row.setting)?;
        snapshot.set_group(row.group_id, row.notification_type, setting);
    }
    for row in multi_rows {
        let setting = NotificationSetting::from_name(&row.setting)?;
        snapshot.set_multi(row.multi_pref_key, setting);
    }
    Ok(snapshot)
}
