//! Herald notification runtime.
//!
//! This crate runs the notification pipeline on top of `herald-core`:
//!
//! - [`EventSessionCoordinator`] takes notification signals, groups them
//!   into sessions and handles instant mail, digest events and alerts.
//! - [`AlertMerger`] creates alerts and merges them into multi-user and
//!   bundle alerts.
//! - [`PreferenceService`] resolves stored preferences and handles
//!   preference writes.
//! - [`DigestWindower`] and [`DigestScheduler`] compose and send the
//!   periodic digests.
//! - [`RetentionSweeper`] deletes old events and alerts.
//! - [`store`], [`directory`] and [`delivery`] hold the capability traits
//!   for storage, object resolution and mail, with PostgreSQL, in-memory
//!   and SMTP implementations.

pub mod alerts;
pub mod coordinator;
pub mod delivery;
pub mod digest;
pub mod directory;
pub mod engine;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod preferences;
pub mod retention;
pub mod store;

pub use alerts::{AlertEvent, AlertMerger, AlertOutcome, UnseenCountCache};
pub use coordinator::{EventSessionCoordinator, NotificationSignal};
pub use delivery::email::{EmailConfig, EmailDelivery, LogMailer};
pub use delivery::{Mailer, OutgoingMail};
pub use digest::{ComposedDigest, DigestScheduler, DigestWindower};
pub use directory::{ObjectResolver, SqlDirectory, TargetInfo, UserDirectory};
pub use engine::{Collaborators, NotificationEngine};
pub use error::EventsError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use preferences::PreferenceService;
pub use retention::{RetentionSweeper, SweepSummary};
pub use store::NotificationStore;
