//! PostgreSQL-backed [`NotificationStore`](crate::store::NotificationStore).
//!
//! Alert merges run in one transaction: a transaction-scoped advisory lock
//! on `(recipient, hash)` serialises concurrent merges across worker
//! processes, the candidates are selected `FOR UPDATE`, and the decision's
//! write commits together with the lock release.

use async_trait::async_trait;
use herald_core::alert::{NewNotificationAlert, NotificationAlert};
use herald_core::event::{NewNotificationEvent, NotificationEvent};
use herald_core::preference::PreferenceSnapshot;
use herald_core::setting::{DigestFrequency, GlobalSetting, NotificationSetting};
use herald_core::types::{DbId, Timestamp};
use herald_db::repositories::{AlertRepo, EventRepo, PreferenceRepo, WatermarkRepo};
use herald_db::DbPool;

use crate::error::EventsError;
use crate::store::{
    AlertStore, AlertWrite, EventStore, MergeDecision, MergeLookup, MergeWrite, PreferenceStore,
    WatermarkStore,
};

/// Every store trait over one PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn into_alerts(
    rows: Vec<herald_db::models::alert::AlertRow>,
) -> Result<Vec<NotificationAlert>, EventsError> {
    rows.into_iter()
        .map(|row| NotificationAlert::try_from(row).map_err(EventsError::from))
        .collect()
}

#[async_trait]
impl AlertStore for PgStore {
    async fn merge_or_insert(
        &self,
        lookup: MergeLookup,
        decide: MergeDecision,
    ) -> Result<MergeWrite, EventsError> {
        let mut tx = self.pool.begin().await?;
        AlertRepo::lock_merge_key(&mut tx, &lookup.lock_key()).await?;

        let rows = match &lookup {
            MergeLookup::Item {
                recipient_id,
                item_hash,
            } => AlertRepo::find_by_item_hash(&mut tx, *recipient_id, item_hash).await?,
            MergeLookup::Bundle {
                recipient_id,
                bundle_hash,
                since,
            } => AlertRepo::find_by_bundle_hash(&mut tx, *recipient_id, bundle_hash, *since).await?,
        };
        let candidates = into_alerts(rows)?;

        // A failed decision drops `tx`, which rolls back and releases the lock.
        let write = match decide(candidates)? {
            AlertWrite::Insert(new) => {
                let row = AlertRepo::insert(&mut tx, &new).await?;
                MergeWrite {
                    alert: NotificationAlert::try_from(row)?,
                    created: true,
                }
            }
            AlertWrite::Update(alert) => {
                AlertRepo::update_merged(&mut tx, &alert).await?;
                MergeWrite {
                    alert,
                    created: false,
                }
            }
        };

        tx.commit().await?;
        Ok(write)
    }

    async fn insert_alert(&self, alert: NewNotificationAlert) -> Result<NotificationAlert, EventsError> {
        let mut tx = self.pool.begin().await?;
        let row = AlertRepo::insert(&mut tx, &alert).await?;
        tx.commit().await?;
        Ok(NotificationAlert::try_from(row)?)
    }

    async fn list_alerts(&self, recipient_id: DbId, limit: i64) -> Result<Vec<NotificationAlert>, EventsError> {
        into_alerts(AlertRepo::list_for_recipient(&self.pool, recipient_id, limit).await?)
    }

    async fn mark_seen(&self, recipient_id: DbId, up_to: Timestamp) -> Result<u64, EventsError> {
        Ok(AlertRepo::mark_seen(&self.pool, recipient_id, up_to).await?)
    }

    async fn unseen_count(&self, recipient_id: DbId) -> Result<i64, EventsError> {
        Ok(AlertRepo::unseen_count(&self.pool, recipient_id).await?)
    }

    async fn delete_alerts_older_than(&self, cutoff: Timestamp) -> Result<u64, EventsError> {
        Ok(AlertRepo::delete_older_than(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn insert_event(&self, event: NewNotificationEvent) -> Result<NotificationEvent, EventsError> {
        Ok(EventRepo::insert(&self.pool, &event).await?.into())
    }

    async fn events_for_recipient(
        &self,
        recipient_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<NotificationEvent>, EventsError> {
        Ok(EventRepo::list_for_recipient(&self.pool, recipient_id, from, to)
            .await?
            .into_iter()
            .map(NotificationEvent::from)
            .collect())
    }

    async fn digest_recipients(&self, from: Timestamp, to: Timestamp) -> Result<Vec<DbId>, EventsError> {
        Ok(EventRepo::recipients_in_window(&self.pool, from, to).await?)
    }

    async fn delete_events_older_than(&self, cutoff: Timestamp) -> Result<u64, EventsError> {
        Ok(EventRepo::delete_older_than(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl PreferenceStore for PgStore {
    async fn preference_snapshot(&self, user_id: DbId) -> Result<PreferenceSnapshot, EventsError> {
        Ok(PreferenceRepo::snapshot(&self.pool, user_id).await?)
    }

    async fn set_global_setting(&self, user_id: DbId, setting: GlobalSetting) -> Result<(), EventsError> {
        Ok(PreferenceRepo::upsert_global(&self.pool, user_id, setting).await?)
    }

    async fn set_group_preference(
        &self,
        user_id: DbId,
        group_id: DbId,
        key: &str,
        setting: NotificationSetting,
    ) -> Result<(), EventsError> {
        PreferenceRepo::upsert_group_preference(&self.pool, user_id, group_id, key, setting).await?;
        Ok(())
    }

    async fn set_multi_preference(
        &self,
        user_id: DbId,
        key: &str,
        setting: NotificationSetting,
    ) -> Result<(), EventsError> {
        PreferenceRepo::upsert_multi_preference(&self.pool, user_id, key, setting).await?;
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for PgStore {
    async fn last_digest_sent(&self, frequency: DigestFrequency) -> Result<Option<Timestamp>, EventsError> {
        Ok(WatermarkRepo::get(&self.pool, frequency)
            .await?
            .map(|row| row.last_sent_at))
    }

    async fn set_last_digest_sent(&self, frequency: DigestFrequency, at: Timestamp) -> Result<(), EventsError> {
        Ok(WatermarkRepo::set(&self.pool, frequency, at).await?)
    }
}
