//! The `adb` transport.
//!
//! Every command runs as `adb [-H host] [-P port] [-s serial] shell <line>`
//! through a [`ProcessRunner`]. Structured accessors issue their own shell
//! commands and parse the output with the functions in [`inspect`].

pub mod inspect;
pub mod runner;

pub use runner::{ProcessOutput, ProcessRunner, RunError};

use crate::exec::{CommandExecutor, CommandSpec, RawOutput, SessionInspector};
use sodium_common::{AppInfo, CommandFailure, Error, Result, RunningApp, WindowSize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// stderr fragments printed by the adb client when no device answers.
const UNREACHABLE_MARKERS: &[&str] = &[
    "no devices/emulators found",
    "device offline",
    "device unauthorized",
    "not found",
    "cannot connect to daemon",
    "closed",
];

/// Connection settings for one device.
#[derive(Debug, Clone)]
pub struct AdbConfig {
    pub adb_path: PathBuf,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub serial: Option<String>,
    /// Timeout applied when the caller passes none.
    pub default_timeout: Option<Duration>,
    pub max_output_bytes: usize,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
            host: None,
            port: None,
            serial: None,
            default_timeout: Some(crate::resolve::DEFAULT_COMMAND_TIMEOUT),
            max_output_bytes: runner::DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl AdbConfig {
    /// Global adb arguments selecting the server and the device.
    pub fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(host) = &self.host {
            args.push("-H".to_string());
            args.push(host.clone());
        }
        if let Some(port) = self.port {
            args.push("-P".to_string());
            args.push(port.to_string());
        }
        if let Some(serial) = &self.serial {
            args.push("-s".to_string());
            args.push(serial.clone());
        }
        args
    }
}

/// A device reached through the local `adb` client.
#[derive(Debug, Clone)]
pub struct AdbSession {
    config: AdbConfig,
    runner: ProcessRunner,
}

impl AdbSession {
    pub fn new(config: AdbConfig) -> Self {
        let runner = ProcessRunner::new(config.adb_path.clone()).with_max_output(config.max_output_bytes);
        Self { config, runner }
    }

    pub fn config(&self) -> &AdbConfig {
        &self.config
    }

    /// Full argument vector for `adb shell <command>`.
    pub fn shell_args(&self, command: &CommandSpec) -> Vec<String> {
        let mut args = self.config.global_args();
        args.push("shell".to_string());
        args.push(command.to_shell_line());
        args
    }

    /// Run a shell line and return stdout, mapping failures to `Error::Session`.
    fn query(&self, line: &str) -> Result<String> {
        self.execute(&CommandSpec::line(line), None)
            .map(RawOutput::into_string)
            .map_err(|failure| Error::Session(format!("`{line}`: {failure}")))
    }
}

/// Classify a finished adb process.
pub fn classify_output(
    command: &str,
    output: ProcessOutput,
    timeout: Option<Duration>,
) -> std::result::Result<RawOutput, CommandFailure> {
    if output.timed_out {
        return Err(CommandFailure::Timeout {
            timeout: timeout.unwrap_or_default(),
        });
    }
    if output.truncated {
        warn!(command, bytes = output.stdout.len(), "output truncated at cap");
    }

    let stderr = output.stderr_str();
    if output.exit_code != Some(0) {
        let lowered = stderr.to_ascii_lowercase();
        let from_client = lowered.starts_with("error:") || lowered.starts_with("adb: ");
        if from_client && UNREACHABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
            return Err(CommandFailure::Unreachable {
                message: stderr.trim().to_string(),
            });
        }
        return Err(CommandFailure::NonZeroExit {
            // -1 when killed by a signal
            code: output.exit_code.unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(RawOutput::from_bytes(&output.stdout))
}

impl CommandExecutor for AdbSession {
    #[instrument(level = "debug", skip_all, fields(command = %command))]
    fn execute(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
    ) -> std::result::Result<RawOutput, CommandFailure> {
        let timeout = timeout.or(self.config.default_timeout);
        let args = self.shell_args(command);
        let output = self.runner.run(&args, timeout).map_err(|e| match e {
            RunError::NotFound(program) => CommandFailure::Spawn {
                message: format!("adb client not found at {program}"),
            },
            RunError::Spawn { message, .. } => CommandFailure::Spawn { message },
            RunError::Io(e) => CommandFailure::Io {
                message: e.to_string(),
            },
        })?;
        debug!(
            exit_code = ?output.exit_code,
            duration_ms = output.duration.as_millis() as u64,
            "adb shell finished"
        );
        classify_output(&command.to_shell_line(), output, timeout)
    }
}

impl SessionInspector for AdbSession {
    fn is_screen_on(&self) -> Result<bool> {
        let dump = self.query("dumpsys power")?;
        inspect::parse_screen_on(&dump)
            .ok_or_else(|| Error::Session("screen state not found in `dumpsys power`".into()))
    }

    fn rotation(&self) -> Result<u8> {
        let dump = self.query("dumpsys display")?;
        inspect::parse_rotation(&dump)
            .ok_or_else(|| Error::Session("rotation not found in `dumpsys display`".into()))
    }

    fn window_size(&self, rotation: u8) -> Result<WindowSize> {
        let size = inspect::parse_wm_size(&self.query("wm size")?)
            .ok_or_else(|| Error::Session("unexpected `wm size` output".into()))?;
        if rotation % 2 == 1 {
            Ok(size.rotated())
        } else {
            Ok(size)
        }
    }

    fn physical_window_size(&self) -> Result<WindowSize> {
        inspect::parse_physical_size(&self.query("wm size")?)
            .ok_or_else(|| Error::Session("physical size missing from `wm size`".into()))
    }

    fn wlan_ip(&self) -> Result<String> {
        for line in ["ip addr show wlan0", "ifconfig wlan0", "ip addr show eth0"] {
            match self.query(line) {
                Ok(out) => {
                    if let Some(ip) = inspect::parse_ipv4(&out) {
                        return Ok(ip);
                    }
                }
                Err(e) => debug!(command = line, error = %e, "interface query failed"),
            }
        }
        Err(Error::Session("no IPv4 address on wlan0 or eth0".into()))
    }

    fn list_packages(&self) -> Result<Vec<String>> {
        Ok(inspect::parse_package_list(&self.query("pm list packages")?))
    }

    fn app_info(&self, package: &str) -> Result<Option<AppInfo>> {
        let path_cmd = CommandSpec::argv(["pm", "path", package]);
        // `pm path` exits non-zero for unknown packages.
        let path = match self.execute(&path_cmd, None) {
            Ok(out) => inspect::parse_package_path(out.as_str()),
            Err(CommandFailure::NonZeroExit { .. }) => None,
            Err(failure) => return Err(Error::Session(format!("`{path_cmd}`: {failure}"))),
        };
        let Some(path) = path else {
            return Ok(None);
        };
        let dump_cmd = CommandSpec::argv(["dumpsys", "package", package]);
        let dump = self.query(&dump_cmd.to_shell_line())?;
        Ok(Some(inspect::parse_package_dump(package, &dump, Some(path))))
    }

    fn current_app(&self) -> Result<RunningApp> {
        if let Some(app) = inspect::parse_activity_top(&self.query("dumpsys activity top")?) {
            return Ok(app);
        }
        inspect::parse_focused_window(&self.query("dumpsys window windows")?)
            .ok_or_else(|| Error::Session("no focused activity".into()))
    }
}
