//! Wiring of the runtime components around one set of collaborators.

use std::sync::Arc;

use herald_core::clock::Clock;
use herald_core::config::HeraldConfig;
use herald_core::registry::NotificationRegistry;

use crate::alerts::{AlertMerger, UnseenCountCache};
use crate::coordinator::{EventSessionCoordinator, NotificationSignal};
use crate::delivery::Mailer;
use crate::digest::{DigestScheduler, DigestWindower};
use crate::directory::{ObjectResolver, UserDirectory};
use crate::error::EventsError;
use crate::preferences::PreferenceService;
use crate::retention::RetentionSweeper;
use crate::store::NotificationStore;

/// External collaborators shared by the runtime components.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<NotificationRegistry>,
    pub store: Arc<dyn NotificationStore>,
    pub objects: Arc<dyn ObjectResolver>,
    pub users: Arc<dyn UserDirectory>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
}

/// Every runtime component built over one [`Collaborators`] set.
///
/// The alert merger, the coordinator and the digest windower share one
/// preference service and one unseen-count cache.
pub struct NotificationEngine {
    config: HeraldConfig,
    deps: Collaborators,
    preferences: PreferenceService,
    alerts: AlertMerger,
    coordinator: EventSessionCoordinator,
    windower: DigestWindower,
}

impl NotificationEngine {
    pub fn new(config: HeraldConfig, deps: Collaborators) -> Self {
        let preferences = PreferenceService::new(
            Arc::clone(&deps.registry),
            Arc::clone(&deps.store),
            Arc::clone(&deps.users),
        );
        let alerts = AlertMerger::new(
            &config,
            Arc::clone(&deps.registry),
            Arc::clone(&deps.store),
            Arc::clone(&deps.objects),
            Arc::clone(&deps.users),
            Arc::new(UnseenCountCache::new()),
        );
        let coordinator =
            EventSessionCoordinator::new(&config, &deps, preferences.clone(), alerts.clone());
        let windower = DigestWindower::new(&deps, preferences.clone());

        Self {
            config,
            deps,
            preferences,
            alerts,
            coordinator,
            windower,
        }
    }

    /// Signal dispatch; see [`EventSessionCoordinator::fire`].
    pub fn fire(&self, signal: NotificationSignal) -> Result<(), EventsError> {
        self.coordinator.fire(signal)
    }

    pub fn config(&self) -> &HeraldConfig {
        &self.config
    }

    pub fn registry(&self) -> &NotificationRegistry {
        &self.deps.registry
    }

    pub fn preferences(&self) -> &PreferenceService {
        &self.preferences
    }

    pub fn alerts(&self) -> &AlertMerger {
        &self.alerts
    }

    pub fn coordinator(&self) -> &EventSessionCoordinator {
        &self.coordinator
    }

    pub fn windower(&self) -> &DigestWindower {
        &self.windower
    }

    pub fn digest_scheduler(&self) -> DigestScheduler {
        DigestScheduler::new(
            self.windower.clone(),
            Arc::clone(&self.deps.clock),
            self.config.digest_check_interval,
        )
    }

    pub fn retention_sweeper(&self) -> RetentionSweeper {
        RetentionSweeper::new(&self.config, Arc::clone(&self.deps.store), Arc::clone(&self.deps.clock))
    }

    /// Close all sessions and wait for queued frames.
    pub async fn shutdown(&self) {
        self.coordinator.drain().await;
    }
}
