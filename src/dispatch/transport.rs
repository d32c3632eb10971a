//! The mail transport seam.

use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Content type of every artifact.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A file attached to an outgoing message.
#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// One fully rendered message.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: MailAttachment,
}

/// What the transport said about a message it was able to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted for delivery.
    Delivered,
    /// Refused (bad mailbox, policy, quota…). Not retried.
    Rejected { reason: String },
}

/// Sends one message.
///
/// Return `Ok(SendOutcome::Rejected)` when the remote side refused the
/// message and `Err` when the attempt itself could not be carried out. The
/// dispatch loop records the first as `Failed` and the second as
/// `FailedException`.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<SendOutcome, TransportError>;
}

/// Accepts every message without sending anything.
#[derive(Debug, Default)]
pub struct DryRunTransport {
    accepted: AtomicUsize,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for DryRunTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<SendOutcome, TransportError> {
        self.accepted.fetch_add(1, Ordering::SeqCst);
        info!(
            "[dry-run] {} ← {} ({} bytes)",
            mail.to,
            mail.attachment.file_name,
            mail.attachment.bytes.len()
        );
        Ok(SendOutcome::Delivered)
    }
}
