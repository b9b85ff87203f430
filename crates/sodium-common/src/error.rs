//! Error types for sodium.
//!
//! Two layers of failure exist:
//! - Per-strategy outcomes ([`CommandFailure`], no match, empty value) stay
//!   inside a property chain and are only recorded in the [`Attempt`] ledger
//! - Cross-cutting failures ([`Error`]) always reach the caller
//!
//! # Agent-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 31,
//!   "category": "extraction",
//!   "message": "property `screen_timeout`: cannot read \"N/A\" from `dumpsys power` as integer",
//!   "recoverable": false,
//!   "suggested_action": "report_pattern",
//!   "context": { "property": "screen_timeout" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for sodium operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of one command execution on the remote shell.
///
/// Recoverable inside a property chain: the resolver moves on to the next
/// strategy. Only the raw shell passthrough surfaces it directly.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandFailure {
    #[error("device unreachable: {message}")]
    Unreachable { message: String },

    #[error("command timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("command exited with non-zero status {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("failed to spawn transport: {message}")]
    Spawn { message: String },

    #[error("transport I/O error: {message}")]
    Io { message: String },

    #[error("session has no answer for command: {command}")]
    Unsupported { command: String },
}

impl CommandFailure {
    /// Whether the failure came from the per-command timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandFailure::Timeout { .. })
    }
}

/// Why a single strategy did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The command itself failed (transport, timeout, exit status).
    CommandFailed { reason: String },
    /// The narrowed output did not match the extraction pattern.
    NoMatch,
    /// The match was empty or equal to the chain's empty sentinel.
    Empty { value: String },
    /// Not executed because the chain deadline had already passed.
    Skipped,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::CommandFailed { reason } => write!(f, "command failed: {}", reason),
            AttemptOutcome::NoMatch => write!(f, "no match"),
            AttemptOutcome::Empty { value } if value.is_empty() => write!(f, "empty value"),
            AttemptOutcome::Empty { value } => write!(f, "empty sentinel {:?}", value),
            AttemptOutcome::Skipped => write!(f, "skipped (deadline)"),
        }
    }
}

/// One entry of the attempt ledger kept while resolving a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    /// Command line of the strategy.
    pub command: String,
    /// What happened.
    pub outcome: AttemptOutcome,
}

impl Attempt {
    pub fn new(command: impl Into<String>, outcome: AttemptOutcome) -> Self {
        Self {
            command: command.into(),
            outcome,
        }
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`: {}", self.command, self.outcome)
    }
}

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration and argument errors.
    Config,
    /// Remote shell transport errors.
    Transport,
    /// Property resolution and extraction errors.
    Extraction,
    /// Structured accessor errors reported by the session collaborator.
    Session,
    /// File I/O and serialization errors.
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Transport => write!(f, "transport"),
            ErrorCategory::Extraction => write!(f, "extraction"),
            ErrorCategory::Session => write!(f, "session"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested reactions for automation scripts consuming errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the read (possibly with a longer timeout).
    Retry,
    /// Run validation on the configuration.
    RunCheck,
    /// Skip the dependent test step.
    Skip,
    /// Mark the dependent test step inconclusive.
    MarkInconclusive,
    /// The extraction pattern no longer fits this device; report it.
    ReportPattern,
    /// Check the device connection.
    CheckConnection,
    /// Manual intervention required.
    ManualIntervention,
}

impl fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::RunCheck => write!(f, "run_check"),
            SuggestedAction::Skip => write!(f, "skip"),
            SuggestedAction::MarkInconclusive => write!(f, "mark_inconclusive"),
            SuggestedAction::ReportPattern => write!(f, "report_pattern"),
            SuggestedAction::CheckConnection => write!(f, "check_connection"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Unified error type for sodium.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown property: {0}")]
    UnknownProperty(String),

    // Transport errors (20-29)
    #[error("command `{command}` failed: {source}")]
    Command {
        command: String,
        #[source]
        source: CommandFailure,
    },

    // Extraction errors (30-39)
    #[error("property `{property}` unavailable after {} attempt(s)", .attempts.len())]
    PropertyUnavailable {
        property: String,
        attempts: Vec<Attempt>,
    },

    #[error("property `{property}`: cannot read {value:?} from `{command}` as {target}")]
    Coercion {
        property: String,
        command: String,
        value: String,
        target: String,
    },

    #[error("property `{property}` exceeded its {deadline_ms}ms deadline")]
    DeadlineExceeded {
        property: String,
        deadline_ms: u64,
        attempts: Vec<Attempt>,
    },

    // Session errors (40-49)
    #[error("device session error: {0}")]
    Session(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Transport errors
    /// - 30-39: Extraction errors
    /// - 40-49: Session errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::UnknownProperty(_) => 11,
            Error::Command { .. } => 20,
            Error::PropertyUnavailable { .. } => 30,
            Error::Coercion { .. } => 31,
            Error::DeadlineExceeded { .. } => 32,
            Error::Session(_) => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::UnknownProperty(_) => ErrorCategory::Config,
            Error::Command { .. } => ErrorCategory::Transport,
            Error::PropertyUnavailable { .. }
            | Error::Coercion { .. }
            | Error::DeadlineExceeded { .. } => ErrorCategory::Extraction,
            Error::Session(_) => ErrorCategory::Session,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether a later read of the same property may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::UnknownProperty(_) => false,
            Error::Command { source, .. } => !matches!(source, CommandFailure::Unsupported { .. }),
            Error::PropertyUnavailable { .. } => true,
            // A present but malformed value means the pattern is wrong for this device.
            Error::Coercion { .. } => false,
            Error::DeadlineExceeded { .. } => true,
            Error::Session(_) => true,
            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    /// Returns the suggested reaction for automation scripts.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) => SuggestedAction::RunCheck,
            Error::UnknownProperty(_) => SuggestedAction::ManualIntervention,
            Error::Command { source, .. } if source.is_timeout() => SuggestedAction::Retry,
            Error::Command { .. } => SuggestedAction::CheckConnection,
            Error::PropertyUnavailable { .. } => SuggestedAction::Skip,
            Error::Coercion { .. } => SuggestedAction::ReportPattern,
            Error::DeadlineExceeded { .. } => SuggestedAction::MarkInconclusive,
            Error::Session(_) => SuggestedAction::CheckConnection,
            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualIntervention,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Check config.json in the sodium config directory, or override with command-line flags."
            }
            Error::UnknownProperty(_) => "Run 'sodium list' to see the supported property names.",
            Error::Command { .. } => {
                "Check that the device is connected ('adb devices') and that the serial is correct."
            }
            Error::PropertyUnavailable { .. } => {
                "No known command reported this property on this device. Inspect the attempts with -vv."
            }
            Error::Coercion { .. } => {
                "The device printed a value in an unexpected format. Capture the raw output with 'sodium shell' and report it."
            }
            Error::DeadlineExceeded { .. } => {
                "The device answered too slowly. Raise --deadline-ms or --timeout-ms and retry."
            }
            Error::Session(_) => "Reconnect the device and retry.",
            Error::Io(_) => "Check permissions on the config directory and replay files.",
            Error::Json(_) => "Invalid JSON. Check the file syntax with 'jq .'.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::UnknownProperty(_) => "Unknown Property",
            Error::Command { .. } => "Command Failed",
            Error::PropertyUnavailable { .. } => "Property Unavailable",
            Error::Coercion { .. } => "Unexpected Value Format",
            Error::DeadlineExceeded { .. } => "Deadline Exceeded",
            Error::Session(_) => "Session Error",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }

    /// Name of the property this error belongs to, if any.
    pub fn property(&self) -> Option<&str> {
        match self {
            Error::PropertyUnavailable { property, .. }
            | Error::Coercion { property, .. }
            | Error::DeadlineExceeded { property, .. } => Some(property),
            _ => None,
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Suggested reaction for automation.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (property, attempts, command).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        if let Some(property) = err.property() {
            context.insert("property".to_string(), serde_json::json!(property));
        }

        match err {
            Error::Command { command, source } => {
                context.insert("command".to_string(), serde_json::json!(command));
                context.insert("failure".to_string(), serde_json::json!(source));
            }
            Error::PropertyUnavailable { attempts, .. } => {
                context.insert("attempts".to_string(), serde_json::json!(attempts));
            }
            Error::Coercion {
                command,
                value,
                target,
                ..
            } => {
                context.insert("command".to_string(), serde_json::json!(command));
                context.insert("value".to_string(), serde_json::json!(value));
                context.insert("target".to_string(), serde_json::json!(target));
            }
            Error::DeadlineExceeded {
                deadline_ms,
                attempts,
                ..
            } => {
                context.insert("deadline_ms".to_string(), serde_json::json!(deadline_ms));
                context.insert("attempts".to_string(), serde_json::json!(attempts));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    let mut out = format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    );

    if let Error::PropertyUnavailable { attempts, .. } | Error::DeadlineExceeded { attempts, .. } =
        err
    {
        for attempt in attempts {
            out.push_str(&format!("\n    - {}", attempt));
        }
    }

    out
}
