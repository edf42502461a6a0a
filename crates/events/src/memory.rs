//! In-process store for tests, demos and embedders without PostgreSQL.
//!
//! One mutex guards all state. It is only ever held across synchronous code
//! (including the merge decision), never across an `.await`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use herald_core::alert::{NewNotificationAlert, NotificationAlert};
use herald_core::event::{NewNotificationEvent, NotificationEvent};
use herald_core::preference::PreferenceSnapshot;
use herald_core::setting::{DigestFrequency, GlobalSetting, NotificationSetting};
use herald_core::types::{DbId, Timestamp};

use crate::error::EventsError;
use crate::store::{
    AlertStore, AlertWrite, EventStore, MergeDecision, MergeLookup, MergeWrite, PreferenceStore,
    WatermarkStore,
};

#[derive(Debug, Default)]
struct State {
    next_alert_id: DbId,
    next_event_id: DbId,
    alerts: Vec<NotificationAlert>,
    events: Vec<NotificationEvent>,
    preferences: HashMap<DbId, PreferenceSnapshot>,
    watermarks: HashMap<DigestFrequency, Timestamp>,
}

impl State {
    fn insert_alert(&mut self, new: NewNotificationAlert) -> NotificationAlert {
        self.next_alert_id += 1;
        let alert = NotificationAlert::from_new(self.next_alert_id, new, Utc::now());
        self.alerts.push(alert.clone());
        alert
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every stored alert, in insertion order.
    pub fn alerts(&self) -> Vec<NotificationAlert> {
        self.state().alerts.clone()
    }

    /// Every stored event, in insertion order.
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.state().events.clone()
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn merge_or_insert(
        &self,
        lookup: MergeLookup,
        decide: MergeDecision,
    ) -> Result<MergeWrite, EventsError> {
        let mut state = self.state();

        let mut candidates: Vec<NotificationAlert> = state
            .alerts
            .iter()
            .filter(|a| lookup.matches(a))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| (b.last_event_at, b.id).cmp(&(a.last_event_at, a.id)));

        match decide(candidates)? {
            AlertWrite::Insert(new) => Ok(MergeWrite {
                alert: state.insert_alert(new),
                created: true,
            }),
            AlertWrite::Update(alert) => {
                let slot = state
                    .alerts
                    .iter_mut()
                    .find(|a| a.id == alert.id)
                    .ok_or(herald_core::error::CoreError::NotFound {
                        entity: "notification_alert",
                        id: alert.id,
                    })?;
                *slot = alert.clone();
                Ok(MergeWrite {
                    alert,
                    created: false,
                })
            }
        }
    }

    async fn insert_alert(&self, alert: NewNotificationAlert) -> Result<NotificationAlert, EventsError> {
        Ok(self.state().insert_alert(alert))
    }

    async fn list_alerts(&self, recipient_id: DbId, limit: i64) -> Result<Vec<NotificationAlert>, EventsError> {
        let mut alerts: Vec<NotificationAlert> = self
            .state()
            .alerts
            .iter()
            .filter(|a| a.recipient_id == recipient_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| (b.last_event_at, b.id).cmp(&(a.last_event_at, a.id)));
        alerts.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(alerts)
    }

    async fn mark_seen(&self, recipient_id: DbId, up_to: Timestamp) -> Result<u64, EventsError> {
        let mut state = self.state();
        let mut changed = 0;
        for alert in state
            .alerts
            .iter_mut()
            .filter(|a| a.recipient_id == recipient_id && !a.seen && a.last_event_at <= up_to)
        {
            alert.seen = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn unseen_count(&self, recipient_id: DbId) -> Result<i64, EventsError> {
        let count = self
            .state()
            .alerts
            .iter()
            .filter(|a| a.recipient_id == recipient_id && !a.seen)
            .count();
        Ok(count as i64)
    }

    async fn delete_alerts_older_than(&self, cutoff: Timestamp) -> Result<u64, EventsError> {
        let mut state = self.state();
        let before = state.alerts.len();
        state.alerts.retain(|a| a.last_event_at >= cutoff);
        Ok((before - state.alerts.len()) as u64)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: NewNotificationEvent) -> Result<NotificationEvent, EventsError> {
        let mut state = self.state();
        state.next_event_id += 1;
        let stored = NotificationEvent::from_new(state.next_event_id, event);
        state.events.push(stored.clone());
        Ok(stored)
    }

    async fn events_for_recipient(
        &self,
        recipient_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<NotificationEvent>, EventsError> {
        let mut events: Vec<NotificationEvent> = self
            .state()
            .events
            .iter()
            .filter(|e| e.has_recipient(recipient_id) && e.occurred_at >= from && e.occurred_at < to)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.occurred_at, e.id));
        Ok(events)
    }

    async fn digest_recipients(&self, from: Timestamp, to: Timestamp) -> Result<Vec<DbId>, EventsError> {
        let mut recipients: Vec<DbId> = self
            .state()
            .events
            .iter()
            .filter(|e| e.occurred_at >= from && e.occurred_at < to)
            .flat_map(|e| e.audience.iter().copied())
            .collect();
        recipients.sort_unstable();
        recipients.dedup();
        Ok(recipients)
    }

    async fn delete_events_older_than(&self, cutoff: Timestamp) -> Result<u64, EventsError> {
        let mut state = self.state();
        let before = state.events.len();
        state.events.retain(|e| e.occurred_at >= cutoff);
        Ok((before - state.events.len()) as u64)
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn preference_snapshot(&self, user_id: DbId) -> Result<PreferenceSnapshot, EventsError> {
        Ok(self
            .state()
            .preferences
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_global_setting(&self, user_id: DbId, setting: GlobalSetting) -> Result<(), EventsError> {
        self.state().preferences.entry(user_id).or_default().global = setting;
        Ok(())
    }

    async fn set_group_preference(
        &self,
        user_id: DbId,
        group_id: DbId,
        key: &str,
        setting: NotificationSetting,
    ) -> Result<(), EventsError> {
        self.state()
            .preferences
            .entry(user_id)
            .or_default()
            .set_group(group_id, key, setting);
        Ok(())
    }

    async fn set_multi_preference(
        &self,
        user_id: DbId,
        key: &str,
        setting: NotificationSetting,
    ) -> Result<(), EventsError> {
        self.state()
            .preferences
            .entry(user_id)
            .or_default()
            .set_multi(key, setting);
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for MemoryStore {
    async fn last_digest_sent(&self, frequency: DigestFrequency) -> Result<Option<Timestamp>, EventsError> {
        Ok(self.state().watermarks.get(&frequency).copied())
    }

    async fn set_last_digest_sent(&self, frequency: DigestFrequency, at: Timestamp) -> Result<(), EventsError> {
        self.state().watermarks.insert(frequency, at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use herald_core::alert::{AlertDisplay, AlertKind, ReasonKey};
    use herald_core::target::{ActorDisplay, ObjectRef};

    use super::*;

    fn at(hours: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
    }

    fn new_alert(item_hash: &str, last_event_at: Timestamp) -> NewNotificationAlert {
        NewNotificationAlert {
            recipient_id: 10,
            notification_type: "notes__comment_posted".to_string(),
            reason: ReasonKey::IsCreator,
            group_id: None,
            target: ObjectRef::new("note", 1),
            actor: ActorDisplay::default(),
            kind: AlertKind::Single,
            last_event_at,
            seen: false,
            display: AlertDisplay::default(),
            counter: 0,
            multi_user_list: Vec::new(),
            bundle_list: Vec::new(),
            item_hash: item_hash.to_string(),
            bundle_hash: "bundle".to_string(),
        }
    }

    #[tokio::test]
    async fn merge_decision_sees_newest_match_first() {
        let store = MemoryStore::new();
        store.insert_alert(new_alert("item", at(0))).await.unwrap();
        store.insert_alert(new_alert("item", at(2))).await.unwrap();
        store.insert_alert(new_alert("other", at(3))).await.unwrap();

        let lookup = MergeLookup::Item {
            recipient_id: 10,
            item_hash: "item".to_string(),
        };
        let write = store
            .merge_or_insert(
                lookup,
                Box::new(|mut found| {
                    assert_eq!(found.len(), 2);
                    let mut newest = found.remove(0);
                    assert_eq!(newest.last_event_at, at(2));
                    newest.seen = true;
                    Ok(AlertWrite::Update(newest))
                }),
            )
            .await
            .unwrap();
        assert!(!write.created);
        assert_eq!(store.unseen_count(10).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn bundle_lookup_ignores_stale_alerts() {
        let store = MemoryStore::new();
        store.insert_alert(new_alert("item", at(0))).await.unwrap();

        let lookup = MergeLookup::Bundle {
            recipient_id: 10,
            bundle_hash: "bundle".to_string(),
            since: at(1),
        };
        let write = store
            .merge_or_insert(
                lookup,
                Box::new(|found| {
                    assert!(found.is_empty());
                    Ok(AlertWrite::Insert(new_alert("item", at(4))))
                }),
            )
            .await
            .unwrap();
        assert!(write.created);
        assert_eq!(store.alerts().len(), 2);
    }

    #[tokio::test]
    async fn watermarks_are_per_frequency() {
        let store = MemoryStore::new();
        store.set_last_digest_sent(DigestFrequency::Daily, at(24)).await.unwrap();
        assert_eq!(
            store.last_digest_sent(DigestFrequency::Daily).await.unwrap(),
            Some(at(24))
        );
        assert_eq!(store.last_digest_sent(DigestFrequency::Weekly).await.unwrap(), None);
    }
}
