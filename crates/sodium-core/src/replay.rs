//! Offline sessions answered from captured command output.
//!
//! A replay file is JSON:
//!
//! ```json
//! {
//!   "commands": {
//!     "settings get global bluetooth_on": "1\n",
//!     "dumpsys wifi": { "fail": "unreachable", "message": "device offline" }
//!   },
//!   "screen_on": true,
//!   "rotation": 0,
//!   "physical_size": { "width": 1080, "height": 2400 },
//!   "wlan_ip": "192.168.1.23",
//!   "packages": ["com.android.settings"],
//!   "apps": { "com.android.settings": { "package_name": "com.android.settings" } },
//!   "current_app": { "package": "com.android.settings", "activity": ".Settings" }
//! }
//! ```
//!
//! Commands without an entry fail with [`CommandFailure::Unsupported`];
//! structured fields without a value fail with [`Error::Session`].

use crate::exec::{CommandExecutor, CommandSpec, RawOutput, SessionInspector};
use serde::{Deserialize, Serialize};
use sodium_common::{AppInfo, CommandFailure, Error, Result, RunningApp, WindowSize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// Scripted answer for one command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplayAnswer {
    Output(String),
    Failure(ReplayFailure),
}

/// A scripted command failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayFailure {
    pub fail: FailureKind,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unreachable,
    Timeout,
    NonZeroExit,
}

impl ReplayFailure {
    fn to_failure(&self, timeout: Option<Duration>) -> CommandFailure {
        match self.fail {
            FailureKind::Unreachable => CommandFailure::Unreachable {
                message: self.message.clone(),
            },
            FailureKind::Timeout => CommandFailure::Timeout {
                timeout: timeout.unwrap_or_default(),
            },
            FailureKind::NonZeroExit => CommandFailure::NonZeroExit {
                code: 1,
                stderr: self.message.clone(),
            },
        }
    }
}

/// Captured device state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayCorpus {
    pub commands: BTreeMap<String, ReplayAnswer>,
    pub screen_on: Option<bool>,
    pub rotation: Option<u8>,
    pub physical_size: Option<WindowSize>,
    pub wlan_ip: Option<String>,
    pub packages: Option<Vec<String>>,
    pub apps: BTreeMap<String, AppInfo>,
    pub current_app: Option<RunningApp>,
}

/// A [`DeviceSession`](crate::exec::DeviceSession) that replays a corpus
/// and counts how often each command was executed.
#[derive(Debug, Default)]
pub struct ReplaySession {
    corpus: ReplayCorpus,
    calls: Mutex<HashMap<String, usize>>,
}

impl ReplaySession {
    pub fn new(corpus: ReplayCorpus) -> Self {
        Self {
            corpus,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading replay corpus");
        Self::from_json(&content)
    }

    pub fn with_output(mut self, command: impl Into<String>, output: impl Into<String>) -> Self {
        self.corpus
            .commands
            .insert(command.into(), ReplayAnswer::Output(output.into()));
        self
    }

    pub fn with_failure(mut self, command: impl Into<String>, kind: FailureKind) -> Self {
        self.corpus.commands.insert(
            command.into(),
            ReplayAnswer::Failure(ReplayFailure {
                fail: kind,
                message: "scripted failure".into(),
            }),
        );
        self
    }

    pub fn corpus(&self) -> &ReplayCorpus {
        &self.corpus
    }

    pub fn corpus_mut(&mut self) -> &mut ReplayCorpus {
        &mut self.corpus
    }

    /// How many times `command` was executed.
    pub fn calls(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(command)
            .copied()
            .unwrap_or(0)
    }

    /// Total number of executed commands.
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    fn missing(field: &str) -> Error {
        Error::Session(format!("replay corpus has no `{field}`"))
    }
}

impl CommandExecutor for ReplaySession {
    fn execute(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
    ) -> std::result::Result<RawOutput, CommandFailure> {
        let line = command.to_shell_line();
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(line.clone())
            .or_default() += 1;
        trace!(command = %line, "replaying command");

        match self.corpus.commands.get(&line) {
            Some(ReplayAnswer::Output(text)) => Ok(RawOutput::new(text.clone())),
            Some(ReplayAnswer::Failure(failure)) => Err(failure.to_failure(timeout)),
            None => Err(CommandFailure::Unsupported { command: line }),
        }
    }
}

impl SessionInspector for ReplaySession {
    fn is_screen_on(&self) -> Result<bool> {
        self.corpus.screen_on.ok_or_else(|| Self::missing("screen_on"))
    }

    fn rotation(&self) -> Result<u8> {
        self.corpus.rotation.ok_or_else(|| Self::missing("rotation"))
    }

    fn window_size(&self, rotation: u8) -> Result<WindowSize> {
        let size = self.physical_window_size()?;
        Ok(if rotation % 2 == 1 { size.rotated() } else { size })
    }

    fn physical_window_size(&self) -> Result<WindowSize> {
        self.corpus
            .physical_size
            .ok_or_else(|| Self::missing("physical_size"))
    }

    fn wlan_ip(&self) -> Result<String> {
        self.corpus.wlan_ip.clone().ok_or_else(|| Self::missing("wlan_ip"))
    }

    fn list_packages(&self) -> Result<Vec<String>> {
        self.corpus.packages.clone().ok_or_else(|| Self::missing("packages"))
    }

    fn app_info(&self, package: &str) -> Result<Option<AppInfo>> {
        Ok(self.corpus.apps.get(package).cloned())
    }

    fn current_app(&self) -> Result<RunningApp> {
        self.corpus
            .current_app
            .clone()
            .ok_or_else(|| Self::missing("current_app"))
    }
}
