//! Dispatch: deliver each matched artifact to its recipient.
//!
//! Records are sent one at a time in page order. Every record ends in exactly
//! one terminal [`DispatchStatus`]:
//!
//! ```text
//! Pending ──(address fails validation)──────────▶ InvalidEmail
//!    │
//!    └──▶ send ──▶ Delivered ───────────────────▶ Sent
//!              ├─▶ Rejected ────────────────────▶ Failed
//!              └─▶ Err / panic / unreadable file ▶ FailedException
//! ```
//!
//! A failure on one record never stops the loop. After every send attempt
//! the loop pauses for `send_delay_ms` before the next record; validation
//! skips do not pause.

pub mod smtp;
pub mod status;
pub mod transport;

pub use smtp::{SmtpMailer, SmtpSecurity, SmtpSettings};
pub use status::{JsonlStatusLog, StatusRecord, StatusSink};
pub use transport::{
    DryRunTransport, MailAttachment, MailTransport, OutgoingMail, SendOutcome, PDF_CONTENT_TYPE,
};

use crate::config::BatchConfig;
use crate::error::TransportError;
use crate::output::{DispatchStatus, MatchResult};
use chrono::Utc;
use futures::FutureExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, info, warn};

static EMAIL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// Syntactic address check: `local@domain.tld`, no whitespace.
pub fn is_valid_email(address: &str) -> bool {
    EMAIL_SHAPE.is_match(address)
}

/// Send every record in order, filling in its terminal status.
pub async fn dispatch_all(
    records: &mut [MatchResult],
    transport: &dyn MailTransport,
    config: &BatchConfig,
) {
    let total = records.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_dispatch_start(total);
    }
    info!("Dispatching {} payslips", total);

    let delay = Duration::from_millis(config.send_delay_ms);
    for (position, record) in records.iter_mut().enumerate() {
        let attempted = dispatch_one(record, transport, config).await;

        if let Some(ref sink) = config.status_sink {
            if let Err(e) = sink.record(&StatusRecord::from(&*record)).await {
                warn!("Could not record status for {}: {}", record.identifier, e);
            }
        }
        if let Some(ref cb) = config.progress_callback {
            cb.on_record_dispatched(position + 1, total, record);
        }

        if attempted && position + 1 < total && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Dispatch a single record. Returns whether a send was attempted.
async fn dispatch_one(
    record: &mut MatchResult,
    transport: &dyn MailTransport,
    config: &BatchConfig,
) -> bool {
    if !is_valid_email(&record.email) {
        warn!(
            "{} ({}): invalid address '{}', not sent",
            record.identifier, record.name, record.email
        );
        record.dispatch_status = DispatchStatus::InvalidEmail;
        record.detail = Some(format!("invalid address '{}'", record.email));
        return false;
    }

    let outcome = match build_mail(record, config).await {
        Ok(mail) => AssertUnwindSafe(transport.send(&mail))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(TransportError::Connection(panic_message(panic)))),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(SendOutcome::Delivered) => {
            debug!("{} → {}: sent", record.identifier, record.email);
            record.dispatch_status = DispatchStatus::Sent;
            record.sent_at = Some(Utc::now());
        }
        Ok(SendOutcome::Rejected { reason }) => {
            warn!("{} → {}: rejected: {}", record.identifier, record.email, reason);
            record.dispatch_status = DispatchStatus::Failed;
            record.detail = Some(reason);
        }
        Err(e) => {
            warn!("{} → {}: {}", record.identifier, record.email, e);
            record.dispatch_status = DispatchStatus::FailedException;
            record.detail = Some(e.to_string());
        }
    }
    true
}

async fn build_mail(record: &MatchResult, config: &BatchConfig) -> Result<OutgoingMail, TransportError> {
    let bytes = tokio::fs::read(&record.artifact_path)
        .await
        .map_err(|source| TransportError::Attachment {
            path: record.artifact_path.clone(),
            source,
        })?;

    Ok(OutgoingMail {
        to: record.email.clone(),
        subject: config.render_subject(&record.name, &record.identifier),
        body: config.render_body(&record.name, &record.identifier),
        attachment: MailAttachment {
            file_name: record.file_name(),
            content_type: PDF_CONTENT_TYPE.to_string(),
            bytes,
        },
    })
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let msg = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("transport panicked: {msg}")
}
