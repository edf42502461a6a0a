//! SMTP mail transport.
//!
//! [`EmailConfig::from_env`] yields `None` without `SMTP_HOST`; the worker
//! then uses [`LogMailer`]. Message bodies are plain text: the template
//! reference and its JSON context, for a renderer downstream of the relay.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{Mailer, OutgoingMail};

/// Errors from building or sending a mail.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Invalid mail address '{address}': {source}")]
    InvalidAddress {
        address: String,
        source: lettre::address::AddressError,
    },

    #[error("Could not assemble message: {0}")]
    Message(#[from] lettre::error::Error),

    /// The mailer declined the message before contacting any server.
    #[error("Mail to {0} refused")]
    Refused(String),

    #[error("Invalid mail configuration: {0}")]
    Config(String),
}

fn mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address.parse().map_err(|source| EmailError::InvalidAddress {
        address: address.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

const DEFAULT_FROM: &str = "Herald <noreply@herald.local>";

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain connect, then upgrade with STARTTLS (usually port 587).
    StartTls,
    /// TLS from the first byte (usually port 465).
    Tls,
    /// Plain connection, for local relays and test servers only.
    Plain,
}

impl SmtpSecurity {
    fn parse(value: &str) -> Result<Self, EmailError> {
        match value.to_ascii_lowercase().as_str() {
            "starttls" => Ok(Self::StartTls),
            "tls" => Ok(Self::Tls),
            "plain" | "none" => Ok(Self::Plain),
            other => Err(EmailError::Config(format!("unknown SMTP_SECURITY '{other}'"))),
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Self::StartTls => 587,
            Self::Tls => 465,
            Self::Plain => 25,
        }
    }
}

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Relay host name.
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
    /// Sender of every mail.
    pub from: Mailbox,
    /// User name and password, when the relay requires authentication.
    pub credentials: Option<(String, String)>,
}

impl EmailConfig {
    /// | Variable        | Default                          |
    /// |-----------------|----------------------------------|
    /// | `SMTP_HOST`     | unset: no SMTP delivery          |
    /// | `SMTP_SECURITY` | `starttls` (`tls`, `plain`)      |
    /// | `SMTP_PORT`     | 587 / 465 / 25 by security       |
    /// | `SMTP_FROM`     | `Herald <noreply@herald.local>`  |
    /// | `SMTP_USER`     | none                             |
    /// | `SMTP_PASSWORD` | none, used only with a user      |
    pub fn from_env() -> Result<Option<Self>, EmailError> {
        let Ok(host) = std::env::var("SMTP_HOST") else {
            return Ok(None);
        };

        let security = match std::env::var("SMTP_SECURITY") {
            Ok(value) => SmtpSecurity::parse(&value)?,
            Err(_) => SmtpSecurity::StartTls,
        };
        let port = match std::env::var("SMTP_PORT") {
            Ok(value) => value
                .parse()
                .map_err(|_| EmailError::Config(format!("SMTP_PORT '{value}' is not a port")))?,
            Err(_) => security.default_port(),
        };
        let from = mailbox(&std::env::var("SMTP_FROM").unwrap_or_else(|_| DEFAULT_FROM.to_string()))?;
        let credentials = std::env::var("SMTP_USER")
            .ok()
            .map(|user| (user, std::env::var("SMTP_PASSWORD").unwrap_or_default()));

        Ok(Some(Self {
            host,
            port,
            security,
            from,
            credentials,
        }))
    }
}

// ---------------------------------------------------------------------------
// EmailDelivery
// ---------------------------------------------------------------------------

/// [`Mailer`] over one pooled async SMTP transport.
pub struct EmailDelivery {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailDelivery {
    /// Build the transport. Fails only if the relay host cannot be used for
    /// the chosen TLS mode; no connection is made yet.
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let builder = match config.security {
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?,
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
            SmtpSecurity::Plain => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };
        let builder = match config.credentials {
            Some((user, password)) => builder.credentials(Credentials::new(user, password)),
            None => builder,
        };

        Ok(Self {
            from: config.from,
            transport: builder.port(config.port).build(),
        })
    }

    fn message(&self, mail: &OutgoingMail) -> Result<Message, EmailError> {
        Ok(Message::builder()
            .from(self.from.clone())
            .to(mailbox(&mail.to)?)
            .subject(mail.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(plain_text_body(mail))?)
    }
}

/// Template reference, blank line, pretty-printed context.
pub fn plain_text_body(mail: &OutgoingMail) -> String {
    let context = serde_json::to_string_pretty(&mail.context).unwrap_or_else(|_| mail.context.to_string());
    format!("Template: {}\n\n{context}", mail.template)
}

#[async_trait]
impl Mailer for EmailDelivery {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), EmailError> {
        let message = self.message(mail)?;
        self.transport.send(message).await?;
        tracing::debug!(to = %mail.to, template = %mail.template, "Mail handed to SMTP relay");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LogMailer
// ---------------------------------------------------------------------------

/// Logs every mail instead of sending it.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), EmailError> {
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            template = %mail.template,
            "SMTP not configured, mail logged only"
        );
        Ok(())
    }
}
