//! Alert creation and merging.
//!
//! [`AlertMerger::apply_event`] decides per recipient whether an event
//! warrants an alert, computes the hash keys and folds the event into an
//! existing multi-user or bundle alert or creates a new one. The merge
//! decision itself is pure ([`NotificationAlert::merge_multi_user`],
//! [`NotificationAlert::merge_bundle`]) and runs inside the store's merge
//! scope.

use std::collections::HashMap;
use std::sync::Arc;

use herald_core::alert::{AlertCandidate, AlertDisplay, NotificationAlert, ReasonFacts};
use herald_core::config::HeraldConfig;
use herald_core::error::CoreError;
use herald_core::hashing::{BundleKey, ItemKey};
use herald_core::registry::{MultiMergeKind, NotificationRegistry, NotificationTypeDescriptor};
use herald_core::target::{ActorDisplay, ObjectRef};
use herald_core::types::{DbId, Timestamp};
use tokio::sync::RwLock;

use crate::directory::{ObjectResolver, TargetInfo, UserDirectory};
use crate::error::EventsError;
use crate::store::{AlertWrite, MergeDecision, MergeLookup, NotificationStore};

// ---------------------------------------------------------------------------
// AlertEvent / AlertOutcome
// ---------------------------------------------------------------------------

/// The parts of an event the merger needs.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub notification_type: String,
    pub actor_id: DbId,
    pub target: ObjectRef,
    pub group_id: Option<DbId>,
    pub occurred_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    Created(NotificationAlert),
    MergedMultiUser(NotificationAlert),
    MergedBundle(NotificationAlert),
}

impl AlertOutcome {
    pub fn alert(&self) -> &NotificationAlert {
        match self {
            Self::Created(a) | Self::MergedMultiUser(a) | Self::MergedBundle(a) => a,
        }
    }
}

// ---------------------------------------------------------------------------
// UnseenCountCache
// ---------------------------------------------------------------------------

/// Cached unseen-alert counts per recipient. Any create or merge for a
/// recipient drops their entry.
#[derive(Debug, Default)]
pub struct UnseenCountCache {
    counts: RwLock<HashMap<DbId, i64>>,
}

impl UnseenCountCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, recipient_id: DbId) -> Option<i64> {
        self.counts.read().await.get(&recipient_id).copied()
    }

    pub async fn put(&self, recipient_id: DbId, count: i64) {
        self.counts.write().await.insert(recipient_id, count);
    }

    pub async fn invalidate(&self, recipient_id: DbId) {
        self.counts.write().await.remove(&recipient_id);
    }
}

// ---------------------------------------------------------------------------
// AlertMerger
// ---------------------------------------------------------------------------

/// Turns events into per-recipient alerts, merging into existing
/// multi-user or bundle alerts where the type allows it.
///
/// Clones share the store, the collaborators and the unseen-count cache.
#[derive(Clone)]
pub struct AlertMerger {
    registry: Arc<NotificationRegistry>,
    store: Arc<dyn NotificationStore>,
    objects: Arc<dyn ObjectResolver>,
    users: Arc<dyn UserDirectory>,
    unseen: Arc<UnseenCountCache>,
    portal_id: DbId,
    bundle_window: chrono::Duration,
    strict: bool,
}

impl AlertMerger {
    /// Reads the portal id, bundle window and strict flag from `config`.
    pub fn new(
        config: &HeraldConfig,
        registry: Arc<NotificationRegistry>,
        store: Arc<dyn NotificationStore>,
        objects: Arc<dyn ObjectResolver>,
        users: Arc<dyn UserDirectory>,
        unseen: Arc<UnseenCountCache>,
    ) -> Self {
        Self {
            registry,
            store,
            objects,
            users,
            unseen,
            portal_id: config.portal_id,
            bundle_window: config.bundle_window,
            strict: config.strict,
        }
    }

    /// Apply one event to every recipient that wants an alert for it.
    ///
    /// Failures are isolated per recipient: they are logged and the
    /// remaining recipients are still processed. Returns the outcomes in
    /// recipient order.
    pub async fn apply_event(
        &self,
        event: &AlertEvent,
        recipients: &[DbId],
    ) -> Result<Vec<(DbId, AlertOutcome)>, EventsError> {
        self.registry.get(&event.notification_type)?;

        let Some(target) = self.objects.resolve(&event.target).await? else {
            tracing::debug!(
                target = %event.target,
                notification_type = %event.notification_type,
                "Alert target no longer exists, skipping"
            );
            return Ok(Vec::new());
        };
        let actor = self.actor_display(event.actor_id).await?;
        self.apply_resolved(event, &target, &actor, recipients).await
    }

    /// [`apply_event`](Self::apply_event) for a caller that already resolved
    /// the target and the actor.
    pub async fn apply_resolved(
        &self,
        event: &AlertEvent,
        target: &TargetInfo,
        actor: &ActorDisplay,
        recipients: &[DbId],
    ) -> Result<Vec<(DbId, AlertOutcome)>, EventsError> {
        let descriptor = self.registry.get(&event.notification_type)?;
        if !descriptor.can_be_alert {
            return Ok(Vec::new());
        }

        let mut outcomes = Vec::new();
        for &recipient_id in recipients {
            match self
                .apply_for_recipient(event, descriptor, target, actor, recipient_id)
                .await
            {
                Ok(Some(outcome)) => outcomes.push((recipient_id, outcome)),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        recipient_id,
                        notification_type = %event.notification_type,
                        target = %event.target,
                        actor_id = event.actor_id,
                        "Failed to apply alert for recipient"
                    );
                }
            }
        }
        Ok(outcomes)
    }

    /// Display data of the actor, or a bare placeholder for unknown users.
    pub async fn actor_display(&self, actor_id: DbId) -> Result<ActorDisplay, EventsError> {
        Ok(self
            .users
            .actor(actor_id)
            .await?
            .unwrap_or_else(|| ActorDisplay {
                user_id: actor_id,
                ..ActorDisplay::default()
            }))
    }

    async fn apply_for_recipient(
        &self,
        event: &AlertEvent,
        descriptor: &NotificationTypeDescriptor,
        target: &TargetInfo,
        actor: &ActorDisplay,
        recipient_id: DbId,
    ) -> Result<Option<AlertOutcome>, EventsError> {
        let Some(profile) = self.users.profile(recipient_id).await? else {
            return Ok(None);
        };
        if !profile.passes_gate() || profile.is_anonymous {
            return Ok(None);
        }
        if recipient_id == event.actor_id && !descriptor.allow_creator_as_audience {
            return Ok(None);
        }

        let Some(reason) = self.reason_facts(descriptor, target, recipient_id).await?.reason() else {
            return Ok(None);
        };

        let candidate = AlertCandidate {
            recipient_id,
            notification_type: event.notification_type.clone(),
            reason,
            group_id: event.group_id,
            target: event.target.clone(),
            actor: actor.clone(),
            display: AlertDisplay::compose(&target.display, target.group.as_ref(), descriptor),
            occurred_at: event.occurred_at,
            item_key: ItemKey::new(
                self.portal_id,
                event.group_id,
                &event.target,
                &event.notification_type,
            ),
            bundle_key: BundleKey::new(
                self.portal_id,
                event.group_id,
                &event.target,
                &event.notification_type,
                event.actor_id,
            ),
        };

        let outcome = self.merge(descriptor.multi_merge, candidate).await?;
        self.unseen.invalidate(recipient_id).await;

        tracing::debug!(
            recipient_id,
            alert_id = outcome.alert().id,
            notification_type = %event.notification_type,
            kind = outcome.alert().kind.as_str(),
            "Alert applied"
        );
        Ok(Some(outcome))
    }

    /// Collect the reason facts in priority order, stopping at the first
    /// one that holds.
    async fn reason_facts(
        &self,
        descriptor: &NotificationTypeDescriptor,
        target: &TargetInfo,
        recipient_id: DbId,
    ) -> Result<ReasonFacts, EventsError> {
        let mut facts = ReasonFacts {
            target_is_group: target.target.is_group(),
            is_creator: target.creator_id == Some(recipient_id),
            ..ReasonFacts::default()
        };
        if facts.reason().is_some() {
            return Ok(facts);
        }

        if let Some(predicate) = &descriptor.reason_check {
            facts.special = self
                .objects
                .check_predicate(predicate, recipient_id, target)
                .await?;
            if facts.special {
                return Ok(facts);
            }
        }

        facts.follows_object = self.objects.is_following(recipient_id, &target.target).await?;
        if facts.follows_object {
            return Ok(facts);
        }

        if let Some(group_id) = target.group_id {
            facts.follows_group = self.objects.is_following_group(recipient_id, group_id).await?;
        }
        Ok(facts)
    }

    async fn merge(
        &self,
        kind: MultiMergeKind,
        candidate: AlertCandidate,
    ) -> Result<AlertOutcome, EventsError> {
        match kind {
            MultiMergeKind::None => {
                let alert = self.store.insert_alert(candidate.to_new_alert()).await?;
                Ok(AlertOutcome::Created(alert))
            }
            MultiMergeKind::MultiUser => {
                let lookup = MergeLookup::Item {
                    recipient_id: candidate.recipient_id,
                    item_hash: candidate.item_key.digest(),
                };
                let strict = self.strict;
                let decide: MergeDecision = Box::new(move |found| {
                    match pick_unique(found, strict, &candidate)? {
                        Some(mut alert) => {
                            alert.merge_multi_user(&candidate)?;
                            Ok(AlertWrite::Update(alert))
                        }
                        None => Ok(AlertWrite::Insert(candidate.to_new_alert())),
                    }
                });
                let write = self.store.merge_or_insert(lookup, decide).await?;
                Ok(if write.created {
                    AlertOutcome::Created(write.alert)
                } else {
                    AlertOutcome::MergedMultiUser(write.alert)
                })
            }
            MultiMergeKind::Bundle => {
                let since = candidate
                    .occurred_at
                    .checked_sub_signed(self.bundle_window)
                    .ok_or_else(|| {
                        CoreError::Validation(format!(
                            "bundle window reaches before the earliest timestamp from {}",
                            candidate.occurred_at
                        ))
                    })?;
                let lookup = MergeLookup::Bundle {
                    recipient_id: candidate.recipient_id,
                    bundle_hash: candidate.bundle_key.digest(),
                    since,
                };
                let strict = self.strict;
                let decide: MergeDecision = Box::new(move |found| {
                    match pick_unique(found, strict, &candidate)? {
                        Some(mut alert) => {
                            alert.merge_bundle(&candidate)?;
                            Ok(AlertWrite::Update(alert))
                        }
                        None => Ok(AlertWrite::Insert(candidate.to_new_alert())),
                    }
                });
                let write = self.store.merge_or_insert(lookup, decide).await?;
                Ok(if write.created {
                    AlertOutcome::Created(write.alert)
                } else {
                    AlertOutcome::MergedBundle(write.alert)
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub async fn list_alerts(&self, recipient_id: DbId, limit: i64) -> Result<Vec<NotificationAlert>, EventsError> {
        self.store.list_alerts(recipient_id, limit).await
    }

    /// Mark alerts up to `up_to` seen and drop the cached count.
    pub async fn mark_seen(&self, recipient_id: DbId, up_to: Timestamp) -> Result<u64, EventsError> {
        let changed = self.store.mark_seen(recipient_id, up_to).await?;
        self.unseen.invalidate(recipient_id).await;
        Ok(changed)
    }

    pub async fn unseen_count(&self, recipient_id: DbId) -> Result<i64, EventsError> {
        if let Some(count) = self.unseen.get(recipient_id).await {
            return Ok(count);
        }
        let count = self.store.unseen_count(recipient_id).await?;
        self.unseen.put(recipient_id, count).await;
        Ok(count)
    }
}

/// Pick the merge target among alerts that should be unique. More than one
/// match is an inconsistency: an error in strict mode, otherwise logged and
/// the newest match wins.
fn pick_unique(
    mut found: Vec<NotificationAlert>,
    strict: bool,
    candidate: &AlertCandidate,
) -> Result<Option<NotificationAlert>, CoreError> {
    if found.len() > 1 {
        let ids: Vec<DbId> = found.iter().map(|a| a.id).collect();
        if strict {
            return Err(CoreError::Inconsistency(format!(
                "{} alerts match one merge key for recipient {}: {ids:?}",
                found.len(),
                candidate.recipient_id
            )));
        }
        tracing::error!(
            recipient_id = candidate.recipient_id,
            notification_type = %candidate.notification_type,
            alert_ids = ?ids,
            "Multiple alerts match one merge key, using the newest"
        );
    }
    Ok(if found.is_empty() {
        None
    } else {
        Some(found.swap_remove(0))
    })
}
