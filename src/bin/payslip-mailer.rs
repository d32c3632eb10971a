//! CLI binary for payslip-mailer.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BatchConfig` and prints the dispatch report.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use payslip_mailer::{
    process_batch, BatchConfig, BatchProgressCallback, BatchReport, BatchStats, DispatchStatus,
    DryRunTransport, JsonlStatusLog, MatchPolicy, MatchResult, PageOutcome, PageRecord,
    ProgressCallback, SmtpSecurity, SmtpSettings, UnmatchedPolicy,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the page scan, then the same bar
/// reset for dispatch, with a log line per unmatched page and per record.
struct CliProgressCallback {
    bar: ProgressBar,
    unmatched: AtomicUsize,
}

impl CliProgressCallback {
    /// The bar starts as a spinner; `on_batch_start` sets its length.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER_TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading roster…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            unmatched: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize, prefix: &'static str, unit: &str) {
        let template = format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  \
             [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  \
             ⏱ {{elapsed_precise}}  ETA {{eta_precise}}"
        );
        let progress_style = ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(SPINNER_TICKS);

        self.bar.set_position(0);
        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix(prefix);
        self.bar.reset_eta();
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_pages: usize, roster_entries: usize) {
        self.activate_bar(total_pages, "Scanning", "pages");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Scanning {total_pages} pages against {roster_entries} roster entries…"
            ))
        ));
    }

    fn on_page_scanned(
        &self,
        page_num: usize,
        total_pages: usize,
        record: &PageRecord,
        outcome: PageOutcome<'_>,
    ) {
        match outcome {
            PageOutcome::Matched(id) => self.bar.set_message(id.to_string()),
            PageOutcome::Unmatched => {
                self.unmatched.fetch_add(1, Ordering::SeqCst);
                let why = match record.error {
                    Some(ref e) => red(&e.to_string()),
                    None => dim("no identifier found"),
                };
                self.bar.println(format!(
                    "  {} Page {:>3}/{:<3}  {}",
                    yellow("?"),
                    page_num,
                    total_pages,
                    why
                ));
            }
            PageOutcome::ArtifactFailed => {
                self.bar.println(format!(
                    "  {} Page {:>3}/{:<3}  {}",
                    red("✗"),
                    page_num,
                    total_pages,
                    red("could not extract page")
                ));
            }
        }
        self.bar.inc(1);
    }

    fn on_dispatch_start(&self, total_records: usize) {
        self.activate_bar(total_records, "Sending", "payslips");
    }

    fn on_record_dispatched(&self, position: usize, total: usize, record: &MatchResult) {
        let mark = match record.dispatch_status {
            DispatchStatus::Sent => green("✓"),
            DispatchStatus::InvalidEmail => yellow("!"),
            _ => red("✗"),
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<12} {:<32} {}",
            mark,
            position,
            total,
            record.identifier,
            record.email,
            dim(record.dispatch_status.as_str()),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, stats: &BatchStats) {
        self.bar.finish_and_clear();
        let problems = stats.failed + stats.failed_exception + stats.invalid_email;
        eprintln!(
            "{} {}/{} payslips sent  ({} pages, {} unmatched{})",
            if problems == 0 { green("✔") } else { cyan("⚠") },
            bold(&stats.sent.to_string()),
            stats.matched_pages,
            stats.total_pages,
            self.unmatched.load(Ordering::SeqCst),
            if problems == 0 {
                String::new()
            } else {
                format!(", {} not delivered", red(&problems.to_string()))
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Send this month's payslips
  payslip-mailer payslips.pdf staff.xlsx

  # Rehearse without sending anything, keep the uploads
  payslip-mailer --dry-run --keep-sources payslips.pdf staff.csv

  # Different label and roster column
  payslip-mailer --label "Staff No" --id-column "Staff Number" slips.pdf roster.xlsx

  # Scanned batch in French, slower relay
  payslip-mailer --ocr-lang fra --ocr-scale 3 --send-delay-ms 1500 scan.pdf staff.ods

  # JSON report and a status log for the payroll database
  payslip-mailer --json --status-log sent.jsonl payslips.pdf staff.xlsx > report.json

ROSTER:
  First row is the header. Recognised columns (case-insensitive):
    identifier  IPPIS Number, IPPIS, Staff ID, Staff Number, Identifier, ID
    name        Name, Full Name, Staff Name, Employee Name
    email       Email, E-mail, Email Address, Mail
  Formats: .xlsx .xlsm .xls .ods .csv

ENVIRONMENT VARIABLES:
  SMTP_HOST               Mail relay host (required unless --dry-run)
  SMTP_PORT               Relay port (default: 465 tls, 587 starttls, 25 plain)
  SMTP_USERNAME           Relay login
  SMTP_PASSWORD           Relay password
  SMTP_FROM               Sender mailbox (default: SMTP_USERNAME)
  SMTP_SECURITY           tls | starttls | plain (default: starttls)
  PDFIUM_LIB_PATH         Path to libpdfium
  TESSDATA_PREFIX         Tesseract language data directory
  RUST_LOG                Log filter, overrides --verbose / --quiet
"#;

/// Split a bulk payslip PDF per employee and mail each page to its owner.
#[derive(Parser, Debug)]
#[command(
    name = "payslip-mailer",
    version,
    about = "Split a bulk payslip PDF per employee and mail each page to its owner",
    long_about = "Reads a staff roster, finds each employee's identifier on the pages of a bulk \
payslip PDF (falling back to OCR for scanned pages), extracts every matched page into its own \
PDF and e-mails it to the address on the roster.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Bulk payslip PDF.
    document: PathBuf,

    /// Staff roster (.xlsx, .xls, .ods or .csv).
    roster: PathBuf,

    /// Directory for the per-batch working directory.
    #[arg(long, env = "PAYSLIP_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAYSLIP_PASSWORD")]
    password: Option<String>,

    /// Label printed before the identifier on each payslip.
    #[arg(long, env = "PAYSLIP_LABEL", default_value = "IPPIS Number")]
    label: String,

    /// Roster header holding the identifier (default: well-known aliases).
    #[arg(long, env = "PAYSLIP_ID_COLUMN")]
    id_column: Option<String>,

    /// Worksheet to read (default: the first).
    #[arg(long, env = "PAYSLIP_SHEET")]
    sheet: Option<String>,

    /// How a page carrying several identifiers is resolved.
    #[arg(long, env = "PAYSLIP_MATCH_POLICY", value_enum, default_value = "first")]
    match_policy: MatchPolicyArg,

    /// What to do with pages no roster entry matches.
    #[arg(long, env = "PAYSLIP_UNMATCHED", value_enum, default_value = "report")]
    unmatched: UnmatchedArg,

    /// Embedded text shorter than this triggers OCR.
    #[arg(long, env = "PAYSLIP_MIN_TEXT_CHARS", default_value_t = 30)]
    min_text_chars: usize,

    /// Never fall back to OCR.
    #[arg(long, env = "PAYSLIP_NO_OCR")]
    no_ocr: bool,

    /// Rasterisation scale for OCR (0.5–8.0).
    #[arg(long, env = "PAYSLIP_OCR_SCALE", default_value_t = 2.0)]
    ocr_scale: f32,

    /// Tesseract language code(s), e.g. eng or eng+fra.
    #[arg(long, env = "PAYSLIP_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Pause after each send, in milliseconds.
    #[arg(long, env = "PAYSLIP_SEND_DELAY_MS", default_value_t = 700)]
    send_delay_ms: u64,

    /// E-mail subject; {name} and {staff_id} are substituted.
    #[arg(long, env = "PAYSLIP_SUBJECT")]
    subject: Option<String>,

    /// Text file holding the e-mail body; {name} and {staff_id} are substituted.
    #[arg(long, env = "PAYSLIP_BODY_FILE")]
    body_file: Option<PathBuf>,

    /// Do not delete the document and roster afterwards.
    #[arg(long, env = "PAYSLIP_KEEP_SOURCES")]
    keep_sources: bool,

    /// Append one JSON line per dispatched payslip to this file.
    #[arg(long, env = "PAYSLIP_STATUS_LOG")]
    status_log: Option<PathBuf>,

    /// Go through the whole batch but send nothing.
    #[arg(long, env = "PAYSLIP_DRY_RUN")]
    dry_run: bool,

    /// SMTP relay host.
    #[arg(long, env = "SMTP_HOST")]
    smtp_host: Option<String>,

    /// SMTP relay port.
    #[arg(long, env = "SMTP_PORT")]
    smtp_port: Option<u16>,

    /// SMTP login.
    #[arg(long, env = "SMTP_USERNAME")]
    smtp_username: Option<String>,

    /// SMTP password.
    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    smtp_password: Option<String>,

    /// Sender mailbox.
    #[arg(long, env = "SMTP_FROM")]
    smtp_from: Option<String>,

    /// Connection security.
    #[arg(long, env = "SMTP_SECURITY", value_enum, default_value = "starttls")]
    smtp_security: SecurityArg,

    /// Output the full report as JSON.
    #[arg(long, env = "PAYSLIP_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAYSLIP_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAYSLIP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAYSLIP_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MatchPolicyArg {
    First,
    Longest,
}

impl From<MatchPolicyArg> for MatchPolicy {
    fn from(v: MatchPolicyArg) -> Self {
        match v {
            MatchPolicyArg::First => MatchPolicy::FirstMatch,
            MatchPolicyArg::Longest => MatchPolicy::LongestIdentifier,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum UnmatchedArg {
    Ignore,
    Warn,
    Report,
}

impl From<UnmatchedArg> for UnmatchedPolicy {
    fn from(v: UnmatchedArg) -> Self {
        match v {
            UnmatchedArg::Ignore => UnmatchedPolicy::Ignore,
            UnmatchedArg::Warn => UnmatchedPolicy::Warn,
            UnmatchedArg::Report => UnmatchedPolicy::Report,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SecurityArg {
    Tls,
    Starttls,
    Plain,
}

impl From<SecurityArg> for SmtpSecurity {
    fn from(v: SecurityArg) -> Self {
        match v {
            SecurityArg::Tls => SmtpSecurity::Tls,
            SecurityArg::Starttls => SmtpSecurity::StartTls,
            SecurityArg::Plain => SmtpSecurity::Plain,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    let report = process_batch(&cli.document, &cli.roster, &config)
        .await
        .context("Batch failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else {
        print_table(&report);
        if !cli.quiet && !show_progress {
            let s = &report.stats;
            eprintln!(
                "Sent {}/{} payslips ({} pages, {} unmatched) in {}ms",
                s.sent, s.matched_pages, s.total_pages, s.unmatched_pages, s.total_duration_ms
            );
        }
    }

    Ok(())
}

/// Map CLI args to `BatchConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .identifier_label(cli.label.clone())
        .match_policy(cli.match_policy.into())
        .unmatched_policy(cli.unmatched.into())
        .min_text_chars(cli.min_text_chars)
        .ocr_enabled(!cli.no_ocr)
        .ocr_scale(cli.ocr_scale)
        .ocr_language(cli.ocr_lang.clone())
        .send_delay_ms(cli.send_delay_ms)
        .remove_sources(!cli.keep_sources);

    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref col) = cli.id_column {
        builder = builder.identifier_column(col.clone());
    }
    if let Some(ref sheet) = cli.sheet {
        builder = builder.roster_sheet(sheet.clone());
    }
    if let Some(ref subject) = cli.subject {
        builder = builder.subject(subject.clone());
    }
    if let Some(ref path) = cli.body_file {
        let body = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read body template from {:?}", path))?;
        builder = builder.body_template(body);
    }
    if let Some(ref path) = cli.status_log {
        builder = builder.status_sink(Arc::new(JsonlStatusLog::new(path)));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    if cli.dry_run {
        builder = builder.transport(Arc::new(DryRunTransport::new()));
    } else if let Some(ref host) = cli.smtp_host {
        let security: SmtpSecurity = cli.smtp_security.into();
        let from = cli
            .smtp_from
            .clone()
            .or_else(|| cli.smtp_username.clone())
            .context("--smtp-from (or --smtp-username) is required with --smtp-host")?;
        let mut settings = SmtpSettings::new(host.clone(), from, security);
        if let Some(port) = cli.smtp_port {
            settings.port = port;
        }
        settings.username = cli.smtp_username.clone();
        settings.password = cli.smtp_password.clone();
        builder = builder.smtp(settings);
    }

    builder.build().context("Invalid configuration")
}

fn print_table(report: &BatchReport) {
    println!(
        "{:<12} {:<28} {:<36} {}",
        "STAFF ID", "NAME", "EMAIL", "STATUS"
    );
    for row in report.summaries() {
        println!(
            "{:<12} {:<28} {:<36} {}",
            row.staff_id, row.name, row.email, row.status
        );
    }
    if !report.unmatched_pages.is_empty() {
        let pages: Vec<String> = report
            .unmatched_pages
            .iter()
            .map(|p| (p + 1).to_string())
            .collect();
        println!();
        println!("Unmatched pages: {}", pages.join(", "));
    }
    for err in &report.page_errors {
        println!("{err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["payslip-mailer"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn flags_map_onto_config() {
        let cli = parse(&[
            "--label",
            "Staff No",
            "--match-policy",
            "longest",
            "--unmatched",
            "ignore",
            "--no-ocr",
            "--send-delay-ms",
            "0",
            "--keep-sources",
            "--dry-run",
            "slips.pdf",
            "staff.csv",
        ]);
        let config = build_config(&cli, None).await.unwrap();
        assert_eq!(config.identifier_label, "Staff No");
        assert_eq!(config.match_policy, MatchPolicy::LongestIdentifier);
        assert_eq!(config.unmatched_policy, UnmatchedPolicy::Ignore);
        assert!(!config.ocr_enabled);
        assert!(!config.remove_sources);
        assert!(config.transport.is_some());
    }

    #[tokio::test]
    async fn smtp_flags_build_settings() {
        let cli = parse(&[
            "--smtp-host",
            "mail.local",
            "--smtp-port",
            "2525",
            "--smtp-from",
            "payroll@local.test",
            "--smtp-security",
            "plain",
            "slips.pdf",
            "staff.csv",
        ]);
        let config = build_config(&cli, None).await.unwrap();
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.port, 2525);
        assert_eq!(smtp.security, SmtpSecurity::Plain);
    }
}
