//! Exit codes for the `sodium` CLI.
//!
//! Exit code ranges:
//! - 0-1: Operational outcomes (value printed, or legitimately absent)
//! - 10-19: Device/environment errors (the caller can react)
//! - 20-29: Internal errors

use sodium_common::Error;

/// Exit codes for sodium operations.
///
/// These codes are a stable contract for automation scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Every requested value was read
    Ok = 0,

    /// An optional property has no value (e.g. Wi-Fi not connected)
    Absent = 1,

    /// Invalid arguments or unknown property
    ArgsError = 10,

    /// Every strategy of a required property was exhausted
    Unavailable = 11,

    /// A value was found but has an unexpected format
    CoercionError = 12,

    /// A command failed or the device is unreachable
    CommandFailed = 13,

    /// Invalid configuration
    ConfigError = 14,

    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,

    /// A property chain ran past its deadline
    DeadlineExceeded = 22,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        (self as i32) < 10
    }

    /// Codes 20 and above indicate bugs or host problems.
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20 && self != ExitCode::DeadlineExceeded
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Ok => "OK",
            ExitCode::Absent => "OK_ABSENT",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::Unavailable => "ERR_UNAVAILABLE",
            ExitCode::CoercionError => "ERR_COERCION",
            ExitCode::CommandFailed => "ERR_COMMAND",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::DeadlineExceeded => "ERR_DEADLINE",
        }
    }

    /// Exit code for a failed operation.
    pub fn for_error(err: &Error) -> Self {
        match err {
            Error::Config(_) => ExitCode::ConfigError,
            Error::UnknownProperty(_) => ExitCode::ArgsError,
            Error::Command { .. } | Error::Session(_) => ExitCode::CommandFailed,
            Error::PropertyUnavailable { .. } => ExitCode::Unavailable,
            Error::Coercion { .. } => ExitCode::CoercionError,
            Error::DeadlineExceeded { .. } => ExitCode::DeadlineExceeded,
            Error::Io(_) => ExitCode::IoError,
            Error::Json(_) => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
