//! SMTP delivery through lettre's async transport.
//!
//! ## Outcome mapping
//!
//! | lettre result | [`SendOutcome`] / error |
//! |---|---|
//! | positive reply | `Delivered` |
//! | non-positive reply | `Rejected` |
//! | permanent (5xx) or transient (4xx) error | `Rejected` |
//! | anything else (I/O, TLS, timeout) | `Err(TransportError::Connection)` |

use crate::dispatch::transport::{MailTransport, OutgoingMail, SendOutcome};
use crate::error::{BatchError, TransportError};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Connection security for the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpSecurity {
    /// Implicit TLS (SMTPS), usually port 465.
    Tls,
    /// Plain connection upgraded with STARTTLS, usually port 587. (default)
    #[default]
    StartTls,
    /// No encryption. Local relays and test servers only.
    Plain,
}

impl SmtpSecurity {
    pub fn default_port(self) -> u16 {
        match self {
            SmtpSecurity::Tls => 465,
            SmtpSecurity::StartTls => 587,
            SmtpSecurity::Plain => 25,
        }
    }
}

impl FromStr for SmtpSecurity {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tls" | "ssl" | "smtps" => Ok(SmtpSecurity::Tls),
            "starttls" => Ok(SmtpSecurity::StartTls),
            "plain" | "none" => Ok(SmtpSecurity::Plain),
            other => Err(BatchError::InvalidConfig(format!(
                "unknown SMTP security '{other}' (expected tls, starttls or plain)"
            ))),
        }
    }
}

/// Relay connection settings.
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender mailbox, e.g. `Payroll <payroll@example.org>`.
    pub from: String,
    pub security: SmtpSecurity,
    pub timeout_secs: u64,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .field("security", &self.security)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SmtpSettings {
    /// Settings for `host` with the security's default port and no credentials.
    pub fn new(host: impl Into<String>, from: impl Into<String>, security: SmtpSecurity) -> Self {
        Self {
            host: host.into(),
            port: security.default_port(),
            username: None,
            password: None,
            from: from.into(),
            security,
            timeout_secs: 30,
        }
    }

    /// Read `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`,
    /// `SMTP_FROM` and `SMTP_SECURITY`.
    ///
    /// `Ok(None)` when `SMTP_HOST` is unset.
    pub fn from_env() -> Result<Option<Self>, BatchError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, BatchError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let Some(host) = get("SMTP_HOST") else {
            return Ok(None);
        };
        let security = match get("SMTP_SECURITY") {
            Some(s) => s.parse()?,
            None => SmtpSecurity::default(),
        };
        let port = match get("SMTP_PORT") {
            Some(p) => p.trim().parse::<u16>().map_err(|_| {
                BatchError::InvalidConfig(format!("SMTP_PORT is not a port number: '{p}'"))
            })?,
            None => security.default_port(),
        };
        let username = get("SMTP_USERNAME");
        let from = get("SMTP_FROM").or_else(|| username.clone()).ok_or_else(|| {
            BatchError::InvalidConfig("SMTP_FROM (or SMTP_USERNAME) must be set".into())
        })?;

        Ok(Some(Self {
            host,
            port,
            username,
            password: get("SMTP_PASSWORD"),
            from,
            security,
            timeout_secs: 30,
        }))
    }
}

/// [`MailTransport`] backed by an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build the transport. No connection is made until the first send.
    pub fn new(settings: &SmtpSettings) -> Result<Self, BatchError> {
        let from: Mailbox = settings.from.parse().map_err(|e| {
            BatchError::InvalidConfig(format!("invalid sender '{}': {}", settings.from, e))
        })?;

        let builder = match settings.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host),
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            }
            SmtpSecurity::Plain => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &settings.host,
            )),
        }
        .map_err(|e| BatchError::InvalidConfig(format!("SMTP relay '{}': {}", settings.host, e)))?;

        let mut builder = builder
            .port(settings.port)
            .timeout(Some(Duration::from_secs(settings.timeout_secs)));
        if let Some(user) = &settings.username {
            builder = builder.credentials(Credentials::new(
                user.clone(),
                settings.password.clone().unwrap_or_default(),
            ));
        }

        info!(
            "SMTP relay {}:{} ({:?})",
            settings.host, settings.port, settings.security
        );
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message, TransportError> {
        let message_error = |detail: String| TransportError::Message {
            to: mail.to.clone(),
            detail,
        };

        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| message_error(format!("invalid recipient: {e}")))?;
        let content_type = ContentType::parse(&mail.attachment.content_type)
            .map_err(|e| message_error(format!("invalid content type: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(mail.body.clone()))
                    .singlepart(
                        Attachment::new(mail.attachment.file_name.clone())
                            .body(mail.attachment.bytes.clone(), content_type),
                    ),
            )
            .map_err(|e| message_error(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<SendOutcome, TransportError> {
        let message = self.build_message(mail)?;

        match self.transport.send(message).await {
            Ok(response) if response.is_positive() => {
                debug!("{} accepted: {}", mail.to, response.code());
                Ok(SendOutcome::Delivered)
            }
            Ok(response) => Ok(SendOutcome::Rejected {
                reason: format!(
                    "{} {}",
                    response.code(),
                    response.first_line().unwrap_or_default()
                ),
            }),
            Err(e) if e.is_permanent() || e.is_transient() => {
                Ok(SendOutcome::Rejected { reason: e.to_string() })
            }
            Err(e) => Err(TransportError::Connection(e.to_string())),
        }
    }
}
