//! Signal dispatch and per-action sessions.
//!
//! [`EventSessionCoordinator::fire`] is the only ingestion API. Signals that
//! share a session id belong to one logical user action: they are queued to
//! a single worker task that processes them strictly in order and remembers
//! which recipients were already mailed or alerted, so overlapping signals
//! (an edit that is also a mention) reach each recipient once. Signals
//! without a session id run as single-frame sessions.
//!
//! A session ends on an explicit `end_session` signal or after being idle
//! for the configured timeout. Queued frames live only in memory and are
//! lost if the process stops.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use herald_core::clock::Clock;
use herald_core::config::HeraldConfig;
use herald_core::event::NewNotificationEvent;
use herald_core::preference::{Decision, RecipientProfile};
use herald_core::registry::{NotificationRegistry, NotificationTypeDescriptor};
use herald_core::session::SessionLedger;
use herald_core::target::{ActorDisplay, ObjectRef};
use herald_core::types::{DbId, Timestamp};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::alerts::{AlertEvent, AlertMerger};
use crate::delivery::{Mailer, OutgoingMail};
use crate::directory::{ObjectResolver, TargetInfo, UserDirectory};
use crate::engine::Collaborators;
use crate::error::EventsError;
use crate::preferences::PreferenceService;
use crate::store::NotificationStore;

// ---------------------------------------------------------------------------
// NotificationSignal
// ---------------------------------------------------------------------------

/// One notification signal fired by application code.
///
/// Built with [`NotificationSignal::new`] and the `with_*` / session
/// builder methods.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationSignal {
    pub notification_type: String,
    pub actor_id: DbId,
    pub target: ObjectRef,
    /// Candidate recipients. Duplicates are ignored.
    pub audience: Vec<DbId>,
    pub session_id: Option<String>,
    pub end_session: bool,
    /// Type-specific data passed through to the stored event and to mails.
    pub extra: serde_json::Value,
    /// Defaults to the clock's current time when the signal is fired.
    pub occurred_at: Option<Timestamp>,
}

impl NotificationSignal {
    pub fn new(notification_type: impl Into<String>, actor_id: DbId, target: ObjectRef) -> Self {
        Self {
            notification_type: notification_type.into(),
            actor_id,
            target,
            audience: Vec::new(),
            session_id: None,
            end_session: false,
            extra: serde_json::Value::Object(Default::default()),
            occurred_at: None,
        }
    }

    pub fn with_audience(mut self, audience: impl IntoIterator<Item = DbId>) -> Self {
        self.audience = audience.into_iter().collect();
        self
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Close the session after this signal.
    pub fn ending_session(mut self) -> Self {
        self.end_session = true;
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }

    pub fn occurred_at(mut self, at: Timestamp) -> Self {
        self.occurred_at = Some(at);
        self
    }
}

/// A queued signal with its time fixed at `fire`.
#[derive(Debug, Clone)]
struct Frame {
    signal: NotificationSignal,
    occurred_at: Timestamp,
}

/// What one frame did, for logging.
#[derive(Debug, Default, Clone, Copy)]
struct FrameSummary {
    emailed: usize,
    deferred: usize,
    alerted: usize,
    event_stored: bool,
}

// ---------------------------------------------------------------------------
// EventSessionCoordinator
// ---------------------------------------------------------------------------

struct SessionHandle {
    sender: mpsc::UnboundedSender<Frame>,
    generation: u64,
}

#[derive(Default)]
struct Sessions {
    open: HashMap<String, SessionHandle>,
    next_generation: u64,
}

struct Inner {
    registry: Arc<NotificationRegistry>,
    store: Arc<dyn NotificationStore>,
    objects: Arc<dyn ObjectResolver>,
    users: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    preferences: PreferenceService,
    alerts: AlertMerger,
    idle_timeout: Duration,
    sessions: Mutex<Sessions>,
    tracker: TaskTracker,
}

/// Shared handle; clones talk to the same set of sessions.
#[derive(Clone)]
pub struct EventSessionCoordinator {
    inner: Arc<Inner>,
}

impl EventSessionCoordinator {
    pub fn new(
        config: &HeraldConfig,
        deps: &Collaborators,
        preferences: PreferenceService,
        alerts: AlertMerger,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Arc::clone(&deps.registry),
                store: Arc::clone(&deps.store),
                objects: Arc::clone(&deps.objects),
                users: Arc::clone(&deps.users),
                mailer: Arc::clone(&deps.mailer),
                clock: Arc::clone(&deps.clock),
                preferences,
                alerts,
                idle_timeout: config.session_idle_timeout,
                sessions: Mutex::new(Sessions::default()),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// A fresh opaque session id.
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Queue a signal for processing.
    ///
    /// Fails only when the notification type is unknown; everything after
    /// queuing is best effort and reported through logs.
    pub fn fire(&self, signal: NotificationSignal) -> Result<(), EventsError> {
        self.inner.registry.get(&signal.notification_type)?;

        let frame = Frame {
            occurred_at: signal.occurred_at.unwrap_or_else(|| self.inner.clock.now()),
            signal,
        };

        match frame.signal.session_id.clone() {
            None => {
                let inner = Arc::clone(&self.inner);
                self.inner.tracker.spawn(async move {
                    let mut ledger = SessionLedger::new();
                    inner.process_frame(&frame, &mut ledger, None).await;
                });
            }
            Some(session_id) => self.enqueue(session_id, frame),
        }
        Ok(())
    }

    /// Number of sessions currently accepting frames.
    pub fn open_sessions(&self) -> usize {
        self.inner.sessions().open.len()
    }

    /// Close every open session and wait until all queued frames are
    /// processed.
    pub async fn drain(&self) {
        // Dropping the senders lets each worker finish its queue and exit.
        self.inner.sessions().open.clear();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }

    fn enqueue(&self, session_id: String, frame: Frame) {
        let end_session = frame.signal.end_session;
        let mut sessions = self.inner.sessions();

        let frame = match sessions.open.get(&session_id) {
            Some(handle) => match handle.sender.send(frame) {
                Ok(()) => None,
                Err(mpsc::error::SendError(frame)) => Some(frame),
            },
            None => Some(frame),
        };

        if let Some(frame) = frame {
            let (sender, receiver) = mpsc::unbounded_channel();
            let generation = sessions.next_generation;
            sessions.next_generation += 1;
            // A fresh receiver is alive, so this send cannot fail.
            let _ = sender.send(frame);
            sessions
                .open
                .insert(session_id.clone(), SessionHandle { sender, generation });

            let inner = Arc::clone(&self.inner);
            let worker_session = session_id.clone();
            self.inner.tracker.spawn(async move {
                inner.run_session(worker_session, generation, receiver).await;
            });
            tracing::debug!(session_id = %session_id, "Session opened");
        }

        if end_session {
            sessions.open.remove(&session_id);
        }
    }
}

impl Inner {
    fn sessions(&self) -> MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Worker loop of one session: frames in arrival order until the
    /// session is closed or idles out.
    async fn run_session(
        &self,
        session_id: String,
        generation: u64,
        mut receiver: mpsc::UnboundedReceiver<Frame>,
    ) {
        let mut ledger = SessionLedger::new();

        loop {
            match tokio::time::timeout(self.idle_timeout, receiver.recv()).await {
                Ok(Some(frame)) => self.process_frame(&frame, &mut ledger, Some(&session_id)).await,
                Ok(None) => break,
                Err(_) => {
                    {
                        let mut sessions = self.sessions();
                        if sessions
                            .open
                            .get(&session_id)
                            .is_some_and(|h| h.generation == generation)
                        {
                            sessions.open.remove(&session_id);
                        }
                    }
                    tracing::debug!(session_id = %session_id, "Session idle, closing");
                    receiver.close();
                    while let Some(frame) = receiver.recv().await {
                        self.process_frame(&frame, &mut ledger, Some(&session_id)).await;
                    }
                    break;
                }
            }
        }

        tracing::debug!(
            session_id = %session_id,
            frames = ledger.frames(),
            emailed = ledger.emailed_count(),
            alerted = ledger.alerted_count(),
            "Session closed"
        );
    }

    /// Process one frame: instant mails, moderator fan-out, the digest event
    /// and alerts.
    async fn process_frame(&self, frame: &Frame, ledger: &mut SessionLedger, session_id: Option<&str>) {
        let signal = &frame.signal;
        let session_id = session_id.unwrap_or("-");

        let descriptor = match self.registry.get(&signal.notification_type) {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(error = %e, session_id, "Dropping frame of unknown type");
                return;
            }
        };

        let target = match self.objects.resolve(&signal.target).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                tracing::debug!(
                    session_id,
                    notification_type = %signal.notification_type,
                    target = %signal.target,
                    "Target no longer exists, skipping frame"
                );
                ledger.record_frame();
                return;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    session_id,
                    notification_type = %signal.notification_type,
                    target = %signal.target,
                    "Failed to resolve target"
                );
                ledger.record_frame();
                return;
            }
        };

        let actor = match self.alerts.actor_display(signal.actor_id).await {
            Ok(actor) => actor,
            Err(e) => {
                tracing::warn!(error = %e, actor_id = signal.actor_id, "Failed to load actor, using placeholder");
                ActorDisplay {
                    user_id: signal.actor_id,
                    ..ActorDisplay::default()
                }
            }
        };

        let audience = dedup(&signal.audience);
        let preference_group = target
            .group_id
            .or_else(|| signal.target.is_group().then_some(signal.target.object_id));
        let mut summary = FrameSummary::default();

        // -- Instant mail and digest interest ------------------------------
        for &recipient_id in &audience {
            match self
                .deliver(frame, descriptor, &target, &actor, preference_group, recipient_id, ledger)
                .await
            {
                Ok(Delivery::Emailed) => summary.emailed += 1,
                Ok(Delivery::Deferred) => summary.deferred += 1,
                Ok(Delivery::Nothing) => {}
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        session_id,
                        recipient_id,
                        notification_type = %signal.notification_type,
                        target = %signal.target,
                        "Failed to resolve delivery for recipient"
                    );
                }
            }
        }

        // -- Moderators -----------------------------------------------------
        match self
            .preferences
            .moderators_to_notify(signal.actor_id, &signal.notification_type, &target)
            .await
        {
            Ok(moderators) => {
                for moderator in moderators {
                    if ledger.claim_email(moderator.user_id)
                        && self.send_instant(frame, descriptor, &target, &actor, &moderator).await
                    {
                        summary.emailed += 1;
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    session_id,
                    notification_type = %signal.notification_type,
                    "Failed to load portal moderators"
                );
            }
        }

        // -- Digest event ---------------------------------------------------
        if summary.deferred > 0 {
            let event = NewNotificationEvent {
                notification_type: signal.notification_type.clone(),
                actor_id: signal.actor_id,
                target: signal.target.clone(),
                group_id: target.group_id,
                audience: audience.clone(),
                extra: signal.extra.clone(),
                occurred_at: frame.occurred_at,
            };
            match self.store.insert_event(event).await {
                Ok(_) => summary.event_stored = true,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        session_id,
                        notification_type = %signal.notification_type,
                        target = %signal.target,
                        "Failed to store digest event"
                    );
                }
            }
        }

        // -- Alerts ---------------------------------------------------------
        let pending: Vec<DbId> = audience
            .iter()
            .copied()
            .filter(|id| !ledger.was_alerted(*id))
            .collect();
        if !pending.is_empty() {
            let event = AlertEvent {
                notification_type: signal.notification_type.clone(),
                actor_id: signal.actor_id,
                target: signal.target.clone(),
                group_id: target.group_id,
                occurred_at: frame.occurred_at,
            };
            match self.alerts.apply_resolved(&event, &target, &actor, &pending).await {
                Ok(outcomes) => {
                    for (recipient_id, _) in &outcomes {
                        ledger.claim_alert(*recipient_id);
                    }
                    summary.alerted = outcomes.len();
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        session_id,
                        notification_type = %signal.notification_type,
                        "Failed to apply alerts"
                    );
                }
            }
        }

        ledger.record_frame();
        tracing::debug!(
            session_id,
            notification_type = %signal.notification_type,
            target = %signal.target,
            audience = audience.len(),
            emailed = summary.emailed,
            deferred = summary.deferred,
            alerted = summary.alerted,
            event_stored = summary.event_stored,
            "Frame processed"
        );
    }

    #[allow(clippy::too_many_arguments)]
    async fn deliver(
        &self,
        frame: &Frame,
        descriptor: &NotificationTypeDescriptor,
        target: &TargetInfo,
        actor: &ActorDisplay,
        preference_group: Option<DbId>,
        recipient_id: DbId,
        ledger: &mut SessionLedger,
    ) -> Result<Delivery, EventsError> {
        let signal = &frame.signal;
        let Some(profile) = self.users.profile(recipient_id).await? else {
            return Ok(Delivery::Nothing);
        };

        let decision = self
            .preferences
            .decide(&profile, signal.actor_id, &signal.notification_type, preference_group)
            .await?;

        match decision {
            Decision::SendNow => {
                if !ledger.claim_email(recipient_id) {
                    return Ok(Delivery::Nothing);
                }
                if self.send_instant(frame, descriptor, target, actor, &profile).await {
                    Ok(Delivery::Emailed)
                } else {
                    Ok(Delivery::Nothing)
                }
            }
            Decision::DeferDigest(_) => Ok(Delivery::Deferred),
            Decision::Suppress => {
                if self.registry.multi_preference_for(&signal.notification_type).is_none() {
                    return Ok(Delivery::Nothing);
                }
                let wanted = self
                    .preferences
                    .digest_interest(&profile, signal.actor_id, &signal.notification_type, preference_group)
                    .await?;
                Ok(if wanted {
                    Delivery::Deferred
                } else {
                    Delivery::Nothing
                })
            }
        }
    }

    /// Send one instant mail. Failures are logged, never propagated.
    async fn send_instant(
        &self,
        frame: &Frame,
        descriptor: &NotificationTypeDescriptor,
        target: &TargetInfo,
        actor: &ActorDisplay,
        recipient: &RecipientProfile,
    ) -> bool {
        let Some(address) = recipient.email.clone() else {
            return false;
        };
        let mail = instant_mail(address, frame, descriptor, target, actor, recipient);

        match self.mailer.send(&mail).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    recipient_id = recipient.user_id,
                    notification_type = %frame.signal.notification_type,
                    target = %frame.signal.target,
                    "Failed to send instant notification"
                );
                false
            }
        }
    }
}

enum Delivery {
    Emailed,
    Deferred,
    Nothing,
}

fn dedup(audience: &[DbId]) -> Vec<DbId> {
    let mut seen = HashSet::new();
    audience.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn instant_mail(
    to: String,
    frame: &Frame,
    descriptor: &NotificationTypeDescriptor,
    target: &TargetInfo,
    actor: &ActorDisplay,
    recipient: &RecipientProfile,
) -> OutgoingMail {
    let local_time = chrono::FixedOffset::east_opt(recipient.utc_offset_secs)
        .map(|offset| frame.occurred_at.with_timezone(&offset).to_rfc3339())
        .unwrap_or_else(|| frame.occurred_at.to_rfc3339());

    OutgoingMail {
        to,
        subject: format!("{}: {}", descriptor.label, target.display.title),
        template: descriptor.instant_template(),
        context: json!({
            "notification_type": descriptor.key,
            "label": descriptor.label,
            "actor": actor,
            "target": {
                "content_type": target.target.content_type,
                "object_id": target.target.object_id,
                "title": target.display.title,
                "url": target.display.url,
            },
            "group": target.group,
            "extra": frame.signal.extra,
            "occurred_at": frame.occurred_at.to_rfc3339(),
            "local_time": local_time,
        }),
    }
}
