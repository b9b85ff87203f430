//! Command execution boundary.
//!
//! The extraction layer depends on exactly one capability: run a shell-like
//! command on the device and get raw text back. Anything satisfying
//! [`CommandExecutor`] can drive a property chain.
//!
//! Structured records (geometry, packages, running app) come from the
//! session collaborator through [`SessionInspector`]; the extraction layer
//! passes them through untouched.

use sodium_common::{AppInfo, CommandFailure, Result, RunningApp, WindowSize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A command to run on the remote shell: either one shell line or an
/// argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandSpec {
    Line(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    pub fn line(line: impl Into<String>) -> Self {
        CommandSpec::Line(line.into())
    }

    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::Argv(args.into_iter().map(Into::into).collect())
    }

    /// The single line handed to the remote shell.
    ///
    /// Argument vectors are joined with POSIX single-quoting so that each
    /// element reaches the remote program as one argument.
    pub fn to_shell_line(&self) -> String {
        match self {
            CommandSpec::Line(line) => line.clone(),
            CommandSpec::Argv(args) => args
                .iter()
                .map(|arg| shell_quote(arg))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell_line())
    }
}

impl From<&str> for CommandSpec {
    fn from(line: &str) -> Self {
        CommandSpec::Line(line.to_string())
    }
}

impl From<String> for CommandSpec {
    fn from(line: String) -> Self {
        CommandSpec::Line(line)
    }
}

impl From<Vec<String>> for CommandSpec {
    fn from(args: Vec<String>) -> Self {
        CommandSpec::Argv(args)
    }
}

impl From<&[&str]> for CommandSpec {
    fn from(args: &[&str]) -> Self {
        CommandSpec::argv(args.iter().copied())
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Text produced by one command execution.
///
/// Owned by the call that produced it and dropped after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawOutput {
    text: String,
}

impl RawOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Decode bytes lossily; some vendor shells emit invalid UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            text: String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Runs commands on the remote shell.
pub trait CommandExecutor {
    /// Execute `command`, bounded by `timeout` when given.
    fn execute(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
    ) -> std::result::Result<RawOutput, CommandFailure>;
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for &T {
    fn execute(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
    ) -> std::result::Result<RawOutput, CommandFailure> {
        (**self).execute(command, timeout)
    }
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for Arc<T> {
    fn execute(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
    ) -> std::result::Result<RawOutput, CommandFailure> {
        (**self).execute(command, timeout)
    }
}

/// Fully parsed accessors exposed by the session collaborator.
pub trait SessionInspector {
    /// Whether the display is awake.
    fn is_screen_on(&self) -> Result<bool>;

    /// Display rotation in quarter turns (0..=3).
    fn rotation(&self) -> Result<u8>;

    /// Size as presented at `rotation`, swapped for odd quarter turns.
    fn window_size(&self, rotation: u8) -> Result<WindowSize>;

    /// Size of the panel in its natural orientation.
    fn physical_window_size(&self) -> Result<WindowSize>;

    /// IPv4 address of the wireless interface.
    fn wlan_ip(&self) -> Result<String>;

    fn list_packages(&self) -> Result<Vec<String>>;

    /// `None` when the package is not installed.
    fn app_info(&self, package: &str) -> Result<Option<AppInfo>>;

    fn current_app(&self) -> Result<RunningApp>;
}

/// A complete device session: raw shell plus structured accessors.
pub trait DeviceSession: CommandExecutor + SessionInspector {}

impl<T: CommandExecutor + SessionInspector> DeviceSession for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_passes_through() {
        let cmd = CommandSpec::from("dumpsys wifi | grep \"Wi-Fi is\"");
        assert_eq!(cmd.to_shell_line(), "dumpsys wifi | grep \"Wi-Fi is\"");
    }

    #[test]
    fn test_argv_quotes_only_when_needed() {
        let cmd = CommandSpec::argv(["settings", "get", "global", "bluetooth_on"]);
        assert_eq!(cmd.to_shell_line(), "settings get global bluetooth_on");

        let cmd = CommandSpec::argv(["echo", "it's here", ""]);
        assert_eq!(cmd.to_shell_line(), r"echo 'it'\''s here' ''");
    }

    #[test]
    fn test_argv_from_slice() {
        let cmd = CommandSpec::from(&["pm", "path", "com.example"][..]);
        assert_eq!(cmd.to_string(), "pm path com.example");
    }

    #[test]
    fn test_raw_output_lossy() {
        let out = RawOutput::from_bytes(b"name: Pixel\xff\n");
        assert!(out.as_str().starts_with("name: Pixel"));
        assert!(out.as_str().ends_with('\n'));
    }
}
