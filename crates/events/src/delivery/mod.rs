//! Outbound mail delivery.
//!
//! The engine only ever talks to the [`Mailer`] trait. [`EmailDelivery`]
//! sends through SMTP; [`LogMailer`] is used when no SMTP host is
//! configured and only logs what would have been sent.

pub mod email;

use async_trait::async_trait;
use serde::Serialize;

use self::email::EmailError;

pub use email::{EmailConfig, EmailDelivery, LogMailer};

/// One rendered-elsewhere mail: the template reference plus the JSON
/// context it is rendered with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub context: serde_json::Value,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), EmailError>;
}
