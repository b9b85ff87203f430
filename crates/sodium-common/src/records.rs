//! Structured device records.
//!
//! These are returned whole by the session collaborator; the extraction
//! layer never parses them itself.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The same size with width and height swapped.
    pub fn rotated(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// Whether the display is wider than it is tall.
    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    /// Parse the `WIDTHxHEIGHT` form printed by `wm size`.
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.trim().split_once('x')?;
        Some(Self {
            width: w.trim().parse().ok()?,
            height: h.trim().parse().ok()?,
        })
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Installed application metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    /// Package name, e.g. `com.android.settings`.
    pub package_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_code: Option<i64>,

    /// Package flags as printed between brackets by the package manager.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_install_time: Option<NaiveDateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<NaiveDateTime>,

    /// Path of the base APK on the device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl AppInfo {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            version_name: None,
            version_code: None,
            flags: Vec::new(),
            first_install_time: None,
            last_update_time: None,
            path: None,
        }
    }
}

/// The application currently in the foreground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningApp {
    pub package: String,
    pub activity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl fmt::Display for RunningApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.activity)
    }
}
