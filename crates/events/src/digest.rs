//! Digest composition and the digest scheduler.
//!
//! [`DigestWindower::compose_digest`] turns the stored events of one
//! recipient and window into a [`ComposedDigest`] and never writes.
//! [`DigestWindower::run_digest`] does a whole frequency: every recipient
//! with events since the frequency's watermark gets one mail, then the
//! watermark moves to the end of the window. [`DigestScheduler`] calls it
//! periodically in the background.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use herald_core::clock::Clock;
use herald_core::digest::{drop_superseded, group_by_category, CategorySection};
use herald_core::event::NotificationEvent;
use herald_core::preference::{PreferenceResolver, RecipientProfile};
use herald_core::registry::NotificationRegistry;
use herald_core::setting::DigestFrequency;
use herald_core::target::{ActorDisplay, GroupDisplay, ObjectRef, TargetDisplay};
use herald_core::types::{DbId, Timestamp};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::delivery::{Mailer, OutgoingMail};
use crate::directory::{ObjectResolver, TargetInfo, UserDirectory};
use crate::engine::Collaborators;
use crate::error::EventsError;
use crate::preferences::PreferenceService;
use crate::store::NotificationStore;

// ---------------------------------------------------------------------------
// ComposedDigest
// ---------------------------------------------------------------------------

/// One event as shown in a digest.
#[derive(Debug, Clone, Serialize)]
pub struct DigestItem {
    pub event_id: DbId,
    pub notification_type: String,
    pub label: String,
    pub actor: ActorDisplay,
    pub target: ObjectRef,
    pub display: TargetDisplay,
    pub group: Option<GroupDisplay>,
    #[serde(skip)]
    pub group_id: Option<DbId>,
    pub occurred_at: Timestamp,
    /// `occurred_at` in the recipient's timezone.
    pub local_time: DateTime<FixedOffset>,
    pub extra: serde_json::Value,
}

/// Everything a digest template needs for one recipient.
#[derive(Debug, Clone, Serialize)]
pub struct ComposedDigest {
    pub recipient_id: DbId,
    #[serde(skip)]
    pub email: Option<String>,
    pub frequency: DigestFrequency,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub utc_offset_secs: i32,
    pub generated_at: DateTime<FixedOffset>,
    pub sections: Vec<CategorySection<DigestItem>>,
    pub event_count: usize,
}

impl ComposedDigest {
    /// Ids of every included event, in section order.
    pub fn event_ids(&self) -> Vec<DbId> {
        self.sections
            .iter()
            .flat_map(|s| s.clusters.iter())
            .flat_map(|c| c.items.iter())
            .map(|i| i.event_id)
            .collect()
    }

    fn mail(&self, to: String) -> Result<OutgoingMail, EventsError> {
        Ok(OutgoingMail {
            to,
            subject: format!(
                "Your {} digest: {} update{}",
                self.frequency.as_str(),
                self.event_count,
                if self.event_count == 1 { "" } else { "s" }
            ),
            template: format!("herald/digest/{}", self.frequency.as_str()),
            context: serde_json::to_value(self)?,
        })
    }
}

/// Result of one [`DigestWindower::run_digest`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestRunSummary {
    pub frequency: DigestFrequency,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub recipients: usize,
    pub sent: usize,
    pub failed: usize,
}

fn offset_of(profile: &RecipientProfile) -> FixedOffset {
    FixedOffset::east_opt(profile.utc_offset_secs).unwrap_or_else(|| Utc.fix())
}

// ---------------------------------------------------------------------------
// DigestWindower
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DigestWindower {
    registry: Arc<NotificationRegistry>,
    store: Arc<dyn NotificationStore>,
    objects: Arc<dyn ObjectResolver>,
    users: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    preferences: PreferenceService,
}

impl DigestWindower {
    pub fn new(deps: &Collaborators, preferences: PreferenceService) -> Self {
        Self {
            registry: Arc::clone(&deps.registry),
            store: Arc::clone(&deps.store),
            objects: Arc::clone(&deps.objects),
            users: Arc::clone(&deps.users),
            mailer: Arc::clone(&deps.mailer),
            clock: Arc::clone(&deps.clock),
            preferences,
        }
    }

    /// Compose the digest of `recipient_id` for events in `[from, to)`.
    ///
    /// `None` when nothing qualifies. Read-only: calling it again over the
    /// same window yields the same events.
    pub async fn compose_digest(
        &self,
        recipient_id: DbId,
        frequency: DigestFrequency,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Option<ComposedDigest>, EventsError> {
        let Some(profile) = self.users.profile(recipient_id).await? else {
            return Ok(None);
        };
        let prefs = self.preferences.snapshot(recipient_id).await?;
        let resolver = PreferenceResolver::new(&self.registry);

        let mut targets: HashMap<ObjectRef, Option<TargetInfo>> = HashMap::new();
        let mut actors: HashMap<DbId, Option<ActorDisplay>> = HashMap::new();
        let mut kept = Vec::new();

        for event in self.store.events_for_recipient(recipient_id, from, to).await? {
            if event.actor_id == recipient_id {
                continue;
            }
            let wanted = match resolver.wants_digest(
                &profile,
                event.actor_id,
                &event.notification_type,
                event.preference_group(),
                &prefs,
                frequency,
            ) {
                Ok(wanted) => wanted,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        event_id = event.id,
                        recipient_id,
                        "Skipping digest event of unknown type"
                    );
                    false
                }
            };
            if !wanted {
                continue;
            }

            if !actors.contains_key(&event.actor_id) {
                let actor = self.active_actor(event.actor_id).await?;
                actors.insert(event.actor_id, actor);
            }
            if actors.get(&event.actor_id).and_then(|a| a.as_ref()).is_none() {
                continue;
            }

            if !targets.contains_key(&event.target) {
                let info = self.objects.resolve(&event.target).await?;
                targets.insert(event.target.clone(), info);
            }
            let Some(Some(target)) = targets.get(&event.target) else {
                continue;
            };
            if !self.objects.can_read(recipient_id, target).await? {
                continue;
            }
            if !self.state_check_passes(&event, recipient_id, target).await? {
                continue;
            }

            kept.push(event);
        }

        let events = drop_superseded(kept, &self.registry);
        if events.is_empty() {
            return Ok(None);
        }

        let offset = offset_of(&profile);
        let items: Vec<DigestItem> = events
            .into_iter()
            .filter_map(|event| {
                let target = targets.get(&event.target)?.as_ref()?;
                let actor = actors.get(&event.actor_id)?.as_ref()?;
                let label = self
                    .registry
                    .get(&event.notification_type)
                    .map(|d| d.label.clone())
                    .unwrap_or_else(|_| event.notification_type.clone());
                Some(DigestItem {
                    event_id: event.id,
                    label,
                    actor: actor.clone(),
                    display: target.display.clone(),
                    group: target.group.clone(),
                    group_id: event.preference_group(),
                    local_time: event.occurred_at.with_timezone(&offset),
                    occurred_at: event.occurred_at,
                    notification_type: event.notification_type,
                    target: event.target,
                    extra: event.extra,
                })
            })
            .collect();

        let event_count = items.len();
        let sections = group_by_category(
            items,
            &self.registry,
            |i| i.notification_type.as_str(),
            |i| i.group_id,
        );

        Ok(Some(ComposedDigest {
            recipient_id,
            email: profile.email.clone(),
            frequency,
            window_start: from,
            window_end: to,
            utc_offset_secs: profile.utc_offset_secs,
            generated_at: self.clock.now().with_timezone(&offset),
            sections,
            event_count,
        }))
    }

    async fn active_actor(&self, actor_id: DbId) -> Result<Option<ActorDisplay>, EventsError> {
        let active = self
            .users
            .profile(actor_id)
            .await?
            .is_some_and(|p| p.is_active);
        if !active {
            return Ok(None);
        }
        Ok(Some(self.users.actor(actor_id).await?.unwrap_or_else(|| ActorDisplay {
            user_id: actor_id,
            ..ActorDisplay::default()
        })))
    }

    async fn state_check_passes(
        &self,
        event: &NotificationEvent,
        recipient_id: DbId,
        target: &TargetInfo,
    ) -> Result<bool, EventsError> {
        let Some(predicate) = self
            .registry
            .get(&event.notification_type)?
            .state_check
            .as_deref()
        else {
            return Ok(true);
        };
        self.objects.check_predicate(predicate, recipient_id, target).await
    }

    /// Whether a full period has passed since the frequency's last run.
    pub async fn is_due(&self, frequency: DigestFrequency, now: Timestamp) -> Result<bool, EventsError> {
        Ok(match self.store.last_digest_sent(frequency).await? {
            Some(last) => now - last >= frequency.period(),
            None => true,
        })
    }

    /// Compose and mail the digests of one frequency, then advance its
    /// watermark to `now`.
    ///
    /// The window starts at the watermark, or one period before `now` on
    /// the first run. Failures for single recipients are logged and counted;
    /// they do not hold the watermark back.
    pub async fn run_digest(
        &self,
        frequency: DigestFrequency,
        now: Timestamp,
    ) -> Result<DigestRunSummary, EventsError> {
        let from = self
            .store
            .last_digest_sent(frequency)
            .await?
            .unwrap_or(now - frequency.period());

        let mut summary = DigestRunSummary {
            frequency,
            window_start: from,
            window_end: now,
            recipients: 0,
            sent: 0,
            failed: 0,
        };
        if from >= now {
            return Ok(summary);
        }

        let recipients = self.store.digest_recipients(from, now).await?;
        summary.recipients = recipients.len();

        for recipient_id in recipients {
            match self.send_digest(recipient_id, frequency, from, now).await {
                Ok(true) => summary.sent += 1,
                Ok(false) => {}
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        error = %e,
                        recipient_id,
                        frequency = frequency.as_str(),
                        "Failed to send digest for user"
                    );
                }
            }
        }

        self.store.set_last_digest_sent(frequency, now).await?;

        tracing::info!(
            frequency = frequency.as_str(),
            recipients = summary.recipients,
            sent = summary.sent,
            failed = summary.failed,
            "Processed digest deliveries"
        );
        Ok(summary)
    }

    async fn send_digest(
        &self,
        recipient_id: DbId,
        frequency: DigestFrequency,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<bool, EventsError> {
        let Some(digest) = self.compose_digest(recipient_id, frequency, from, to).await? else {
            return Ok(false);
        };
        let Some(address) = digest.email.clone() else {
            return Ok(false);
        };
        self.mailer.send(&digest.mail(address)?).await?;
        tracing::debug!(
            recipient_id,
            frequency = frequency.as_str(),
            event_count = digest.event_count,
            "Digest delivered"
        );
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// DigestScheduler
// ---------------------------------------------------------------------------

/// Background service running every due digest frequency on a fixed poll
/// interval.
pub struct DigestScheduler {
    windower: DigestWindower,
    clock: Arc<dyn Clock>,
    check_interval: Duration,
}

impl DigestScheduler {
    pub fn new(windower: DigestWindower, clock: Arc<dyn Clock>, check_interval: Duration) -> Self {
        Self {
            windower,
            clock,
            check_interval,
        }
    }

    /// Run the scheduler loop until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.check_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Digest scheduler cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Run every frequency that is due now. Returns the summaries of the
    /// runs that happened.
    pub async fn tick(&self) -> Vec<DigestRunSummary> {
        let now = self.clock.now();
        let mut ran = Vec::new();

        for frequency in DigestFrequency::ALL {
            let due = match self.windower.is_due(frequency, now).await {
                Ok(due) => due,
                Err(e) => {
                    tracing::error!(error = %e, frequency = frequency.as_str(), "Failed to check digest watermark");
                    continue;
                }
            };
            if !due {
                continue;
            }
            match self.windower.run_digest(frequency, now).await {
                Ok(summary) => ran.push(summary),
                Err(e) => {
                    tracing::error!(error = %e, frequency = frequency.as_str(), "Failed to process digests");
                }
            }
        }
        ran
    }
}
