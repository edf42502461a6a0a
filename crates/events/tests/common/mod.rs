#![allow(dead_code)]

mod fakes;

pub use fakes::*;

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use herald_core::catalog;
use herald_core::config::HeraldConfig;
use herald_core::event::{NewNotificationEvent, NotificationEvent};
use herald_core::target::ObjectRef;
use herald_core::types::DbId;
use herald_events::store::EventStore;
use herald_events::{Collaborators, MemoryStore, NotificationEngine, NotificationSignal};

pub const GROUP: DbId = 7;
pub const OTHER_GROUP: DbId = 8;
/// Creator of every fixture object.
pub const CREATOR: DbId = 1;
pub const RECIPIENT: DbId = 10;
pub const OTHER_RECIPIENT: DbId = 11;
pub const MODERATOR: DbId = 50;

/// Monday 2026-03-02 09:00 UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn note(id: DbId) -> ObjectRef {
    ObjectRef::new("note", id)
}

pub fn email_of(user_id: DbId) -> String {
    format!("user{user_id}@example.org")
}

pub struct Harness {
    pub engine: NotificationEngine,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<StaticDirectory>,
    pub mailer: Arc<RecordingMailer>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(HeraldConfig::default())
    }

    /// Users 1 to 5 plus both recipients exist and are active; notes 100 to
    /// 104 live in [`GROUP`].
    pub fn with_config(config: HeraldConfig) -> Self {
        let registry = Arc::new(catalog::build_registry(&config.ignore_user_setting_types).unwrap());
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(StaticDirectory::new());
        let mailer = Arc::new(RecordingMailer::new());
        let clock = Arc::new(ManualClock::new(t0()));

        for user_id in [1, 2, 3, 4, 5, RECIPIENT, OTHER_RECIPIENT] {
            directory.add_user(active_user(user_id));
        }
        for id in 100..=104 {
            directory.add_object(object_in_group(note(id), Some(GROUP), CREATOR));
        }

        let deps = Collaborators {
            registry,
            store: store.clone(),
            objects: directory.clone(),
            users: directory.clone(),
            mailer: mailer.clone(),
            clock: clock.clone(),
        };
        let engine = NotificationEngine::new(config, deps);

        Self {
            engine,
            store,
            directory,
            mailer,
            clock,
        }
    }

    /// Fire one signal and wait until it is fully processed.
    pub async fn fire(&self, signal: NotificationSignal) {
        self.engine.fire(signal).unwrap();
        self.engine.shutdown().await;
    }

    pub async fn store_event(
        &self,
        notification_type: &str,
        actor_id: DbId,
        target: ObjectRef,
        group_id: Option<DbId>,
        audience: &[DbId],
        occurred_at: DateTime<Utc>,
    ) -> NotificationEvent {
        self.store
            .insert_event(NewNotificationEvent {
                notification_type: notification_type.to_string(),
                actor_id,
                target,
                group_id,
                audience: audience.to_vec(),
                extra: serde_json::json!({}),
                occurred_at,
            })
            .await
            .unwrap()
    }

    pub fn mails_to(&self, user_id: DbId) -> usize {
        self.mailer.sent_to(&email_of(user_id)).len()
    }
}
