//! Configuration types for a payslip batch.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. Callers set only the knobs they care about and
//! rely on the documented defaults for the rest.

use crate::dispatch::{MailTransport, SmtpSettings, StatusSink};
use crate::error::BatchError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Label printed in front of the staff identifier on each payslip.
pub const DEFAULT_IDENTIFIER_LABEL: &str = "IPPIS Number";

/// Default e-mail subject.
pub const DEFAULT_SUBJECT: &str = "Your Payslip";

/// Default e-mail body. `{name}` and `{staff_id}` are substituted per record.
pub const DEFAULT_BODY: &str =
    "Dear {name},\n\nPlease find attached your payslip.\n\nRegards,\nPayroll Office";

/// Configuration for one batch run.
///
/// Built via [`BatchConfig::builder()`] or using [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use payslip_mailer::{BatchConfig, MatchPolicy};
///
/// let config = BatchConfig::builder()
///     .send_delay_ms(1000)
///     .match_policy(MatchPolicy::LongestIdentifier)
///     .identifier_label("Staff No")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Directory under which the per-batch working directory is created.
    /// Default: the system temp directory.
    pub scratch_dir: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Phrase that precedes the identifier on each page. Default: `"IPPIS Number"`.
    ///
    /// Matched case-insensitively; whitespace inside the phrase is optional so
    /// OCR output such as `IPPISNumber` still matches.
    pub identifier_label: String,

    /// Roster header holding the identifier. If None, well-known aliases are
    /// tried (`IPPIS Number`, `Staff ID`, `Identifier`, …).
    pub identifier_column: Option<String>,

    /// Worksheet to read from a workbook roster. Default: the first sheet.
    pub roster_sheet: Option<String>,

    /// How a page containing several roster identifiers is resolved.
    pub match_policy: MatchPolicy,

    /// What happens to pages no roster entry matches.
    pub unmatched_policy: UnmatchedPolicy,

    /// Embedded text shorter than this (in characters, after whitespace
    /// normalisation) triggers the OCR fallback. Default: 30.
    pub min_text_chars: usize,

    /// Whether the OCR fallback runs at all. Default: true.
    pub ocr_enabled: bool,

    /// Rasterisation scale applied to the nominal page size before OCR.
    /// Range: 0.5–8.0. Default: 2.0.
    pub ocr_scale: f32,

    /// Tesseract language code(s), e.g. `"eng"` or `"eng+fra"`. Default: `"eng"`.
    pub ocr_language: String,

    /// Pause after each send attempt, in milliseconds. Default: 700.
    ///
    /// Keeps the batch under the outbound provider's rate limit. Not applied
    /// after records skipped for an invalid address.
    pub send_delay_ms: u64,

    /// E-mail subject. `{name}` and `{staff_id}` are substituted.
    pub subject: String,

    /// E-mail body. `{name}` and `{staff_id}` are substituted.
    pub body_template: String,

    /// Delete the uploaded document and roster once the batch ends. Default: true.
    pub remove_sources: bool,

    /// Pre-constructed mail transport. Takes precedence over `smtp`.
    pub transport: Option<Arc<dyn MailTransport>>,

    /// SMTP relay settings. If None along with `transport`, read from the
    /// `SMTP_*` environment variables.
    pub smtp: Option<SmtpSettings>,

    /// Receives one status record per dispatched payslip.
    pub status_sink: Option<Arc<dyn StatusSink>>,

    /// Progress events for the host application.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            password: None,
            identifier_label: DEFAULT_IDENTIFIER_LABEL.to_string(),
            identifier_column: None,
            roster_sheet: None,
            match_policy: MatchPolicy::default(),
            unmatched_policy: UnmatchedPolicy::default(),
            min_text_chars: 30,
            ocr_enabled: true,
            ocr_scale: 2.0,
            ocr_language: "eng".to_string(),
            send_delay_ms: 700,
            subject: DEFAULT_SUBJECT.to_string(),
            body_template: DEFAULT_BODY.to_string(),
            remove_sources: true,
            transport: None,
            smtp: None,
            status_sink: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("scratch_dir", &self.scratch_dir)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("identifier_label", &self.identifier_label)
            .field("identifier_column", &self.identifier_column)
            .field("roster_sheet", &self.roster_sheet)
            .field("match_policy", &self.match_policy)
            .field("unmatched_policy", &self.unmatched_policy)
            .field("min_text_chars", &self.min_text_chars)
            .field("ocr_enabled", &self.ocr_enabled)
            .field("ocr_scale", &self.ocr_scale)
            .field("ocr_language", &self.ocr_language)
            .field("send_delay_ms", &self.send_delay_ms)
            .field("subject", &self.subject)
            .field("remove_sources", &self.remove_sources)
            .field("transport", &self.transport.as_ref().map(|_| "<dyn MailTransport>"))
            .field("smtp", &self.smtp)
            .field("status_sink", &self.status_sink.as_ref().map(|_| "<dyn StatusSink>"))
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// Render the subject for one recipient.
    pub fn render_subject(&self, name: &str, staff_id: &str) -> String {
        fill_template(&self.subject, name, staff_id)
    }

    /// Render the body for one recipient.
    pub fn render_body(&self, name: &str, staff_id: &str) -> String {
        fill_template(&self.body_template, name, staff_id)
    }
}

fn fill_template(template: &str, name: &str, staff_id: &str) -> String {
    template
        .replace("{name}", name)
        .replace("{staff_id}", staff_id)
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn identifier_label(mut self, label: impl Into<String>) -> Self {
        self.config.identifier_label = label.into();
        self
    }

    pub fn identifier_column(mut self, column: impl Into<String>) -> Self {
        self.config.identifier_column = Some(column.into());
        self
    }

    pub fn roster_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.config.roster_sheet = Some(sheet.into());
        self
    }

    pub fn match_policy(mut self, policy: MatchPolicy) -> Self {
        self.config.match_policy = policy;
        self
    }

    pub fn unmatched_policy(mut self, policy: UnmatchedPolicy) -> Self {
        self.config.unmatched_policy = policy;
        self
    }

    pub fn min_text_chars(mut self, n: usize) -> Self {
        self.config.min_text_chars = n;
        self
    }

    pub fn ocr_enabled(mut self, v: bool) -> Self {
        self.config.ocr_enabled = v;
        self
    }

    pub fn ocr_scale(mut self, scale: f32) -> Self {
        self.config.ocr_scale = scale;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn send_delay_ms(mut self, ms: u64) -> Self {
        self.config.send_delay_ms = ms;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.config.subject = subject.into();
        self
    }

    pub fn body_template(mut self, body: impl Into<String>) -> Self {
        self.config.body_template = body.into();
        self
    }

    pub fn remove_sources(mut self, v: bool) -> Self {
        self.config.remove_sources = v;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn smtp(mut self, settings: SmtpSettings) -> Self {
        self.config.smtp = Some(settings);
        self
    }

    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.config.status_sink = Some(sink);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        if c.identifier_label.trim().is_empty() {
            return Err(BatchError::InvalidConfig(
                "Identifier label must not be empty".into(),
            ));
        }
        if !(0.5..=8.0).contains(&c.ocr_scale) {
            return Err(BatchError::InvalidConfig(format!(
                "OCR scale must be 0.5–8.0, got {}",
                c.ocr_scale
            )));
        }
        if c.ocr_enabled && c.ocr_language.trim().is_empty() {
            return Err(BatchError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a page that mentions more than one roster identifier is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchPolicy {
    /// The first roster entry (in roster order) whose pattern matches wins,
    /// regardless of where on the page the identifiers appear. (default)
    #[default]
    FirstMatch,
    /// Every entry is tested; the longest matching identifier wins, ties
    /// going to roster order. Stops `12345` from claiming a page that
    /// belongs to `123456`.
    LongestIdentifier,
}

/// What happens to pages no roster entry matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnmatchedPolicy {
    /// Log at debug level and drop.
    Ignore,
    /// Log a warning and drop.
    Warn,
    /// Log a warning and list the page in the batch report. (default)
    #[default]
    Report,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_documented_values() {
        let c = BatchConfig::default();
        assert_eq!(c.identifier_label, "IPPIS Number");
        assert_eq!(c.min_text_chars, 30);
        assert_eq!(c.ocr_scale, 2.0);
        assert_eq!(c.send_delay_ms, 700);
        assert_eq!(c.match_policy, MatchPolicy::FirstMatch);
        assert_eq!(c.unmatched_policy, UnmatchedPolicy::Report);
        assert!(c.remove_sources);
        assert!(c.ocr_enabled);
    }

    #[test]
    fn builder_rejects_empty_label() {
        let err = BatchConfig::builder().identifier_label("  ").build().unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_out_of_range_scale() {
        assert!(BatchConfig::builder().ocr_scale(0.1).build().is_err());
        assert!(BatchConfig::builder().ocr_scale(3.0).build().is_ok());
    }

    #[test]
    fn empty_language_is_fine_when_ocr_is_off() {
        assert!(BatchConfig::builder().ocr_language("").build().is_err());
        assert!(BatchConfig::builder()
            .ocr_enabled(false)
            .ocr_language("")
            .build()
            .is_ok());
    }

    #[test]
    fn templates_substitute_placeholders() {
        let c = BatchConfig::builder()
            .subject("Payslip for {staff_id}")
            .body_template("Hi {name} ({staff_id})")
            .build()
            .unwrap();
        assert_eq!(c.render_subject("Jane", "12345"), "Payslip for 12345");
        assert_eq!(c.render_body("Jane", "12345"), "Hi Jane (12345)");
    }

    #[test]
    fn debug_redacts_password() {
        let c = BatchConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }
}
