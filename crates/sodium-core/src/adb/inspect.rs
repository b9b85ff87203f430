//! Parsers for the structured accessors of an adb session.
//!
//! Each function takes the raw output of one shell command and returns
//! `None` when the output does not have the expected shape.

use chrono::NaiveDateTime;
use regex::Regex;
use sodium_common::{AppInfo, RunningApp, WindowSize};
use std::sync::OnceLock;

macro_rules! regex {
    ($re:literal) => {{
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new($re).expect("static regex"))
    }};
}

const PACKAGE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `dumpsys power`: the display holds its suspend blocker while awake.
///
/// Older builds only report `Display Power: state=ON`.
pub fn parse_screen_on(dumpsys_power: &str) -> Option<bool> {
    if let Some(caps) = regex!(r"mHoldingDisplaySuspendBlocker=(true|false)").captures(dumpsys_power) {
        return Some(&caps[1] == "true");
    }
    regex!(r"Display Power: state=(\w+)")
        .captures(dumpsys_power)
        .map(|caps| &caps[1] == "ON")
}

/// `dumpsys display`: first `orientation=N` of the default display.
pub fn parse_rotation(dumpsys_display: &str) -> Option<u8> {
    regex!(r"\borientation=(\d)\b")
        .captures(dumpsys_display)
        .and_then(|caps| caps[1].parse::<u8>().ok())
        .filter(|r| *r <= 3)
}

/// `wm size`: an override size wins over the physical size.
pub fn parse_wm_size(wm_size: &str) -> Option<WindowSize> {
    let find = |label: &str| {
        wm_size
            .lines()
            .find_map(|line| line.trim().strip_prefix(label))
            .and_then(|rest| WindowSize::parse(rest.trim()))
    };
    find("Override size:").or_else(|| find("Physical size:"))
}

/// `wm size`: the physical size only.
pub fn parse_physical_size(wm_size: &str) -> Option<WindowSize> {
    wm_size
        .lines()
        .find_map(|line| line.trim().strip_prefix("Physical size:"))
        .and_then(|rest| WindowSize::parse(rest.trim()))
}

/// `ip addr show <iface>` or `ifconfig <iface>`: the IPv4 address.
pub fn parse_ipv4(output: &str) -> Option<String> {
    if let Some(caps) = regex!(r"inet (\d+\.\d+\.\d+\.\d+)/").captures(output) {
        return Some(caps[1].to_string());
    }
    regex!(r"inet addr:(\d+\.\d+\.\d+\.\d+)")
        .captures(output)
        .map(|caps| caps[1].to_string())
}

/// `pm list packages`: one `package:<name>` per line.
pub fn parse_package_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// `pm path <pkg>`: first APK path, `None` when the package is unknown.
pub fn parse_package_path(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("package:"))
        .map(|path| path.trim().to_string())
}

/// `dumpsys package <pkg>` fields merged into an [`AppInfo`].
pub fn parse_package_dump(package: &str, dump: &str, path: Option<String>) -> AppInfo {
    let mut info = AppInfo::new(package);
    info.path = path;
    info.version_name = regex!(r"versionName=(\S+)")
        .captures(dump)
        .map(|caps| caps[1].to_string());
    info.version_code = regex!(r"versionCode=(\d+)")
        .captures(dump)
        .and_then(|caps| caps[1].parse().ok());
    info.flags = regex!(r"pkgFlags=\[\s*([^\]]*)\]")
        .captures(dump)
        .map(|caps| caps[1].split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    info.first_install_time = parse_timestamp(dump, regex!(r"firstInstallTime=(\d{4}-\d\d-\d\d \d\d:\d\d:\d\d)"));
    info.last_update_time = parse_timestamp(dump, regex!(r"lastUpdateTime=(\d{4}-\d\d-\d\d \d\d:\d\d:\d\d)"));
    info
}

fn parse_timestamp(dump: &str, re: &Regex) -> Option<NaiveDateTime> {
    let caps = re.captures(dump)?;
    NaiveDateTime::parse_from_str(&caps[1], PACKAGE_TIMESTAMP_FORMAT).ok()
}

/// `dumpsys activity top`: the last `ACTIVITY` entry is the resumed one.
pub fn parse_activity_top(output: &str) -> Option<RunningApp> {
    let re = regex!(r"ACTIVITY ([A-Za-z0-9_.$]+)/([A-Za-z0-9_.$]+) \w+ pid=(\d+)");
    let caps = re.captures_iter(output).last()?;
    Some(RunningApp {
        package: caps[1].to_string(),
        activity: expand_activity(&caps[1], &caps[2]),
        pid: caps[3].parse().ok(),
    })
}

/// `dumpsys window windows`: the focused window.
pub fn parse_focused_window(output: &str) -> Option<RunningApp> {
    let re = regex!(r"mCurrentFocus=Window\{\S+ \S+ ([A-Za-z0-9_.$]+)/([A-Za-z0-9_.$]+)\}");
    let caps = re.captures(output)?;
    Some(RunningApp {
        package: caps[1].to_string(),
        activity: expand_activity(&caps[1], &caps[2]),
        pid: None,
    })
}

/// Activities are often printed relative to their package (`.MainActivity`).
fn expand_activity(package: &str, activity: &str) -> String {
    if activity.starts_with('.') {
        format!("{package}{activity}")
    } else {
        activity.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_screen_on() {
        assert_eq!(parse_screen_on("  mHoldingDisplaySuspendBlocker=true\n"), Some(true));
        assert_eq!(parse_screen_on("  mHoldingDisplaySuspendBlocker=false\n"), Some(false));
        assert_eq!(parse_screen_on("Display Power: state=OFF\n"), Some(false));
        assert_eq!(parse_screen_on("mWakefulness=Awake\n"), None);
    }

    #[test]
    fn test_rotation() {
        let dump = "mViewports=[DisplayViewport{type=INTERNAL, valid=true, displayId=0, \
                    uniqueId='local:0', physicalPort=0, orientation=1, logicalFrame=Rect(0, 0 - 2400, 1080)}]";
        assert_eq!(parse_rotation(dump), Some(1));
        assert_eq!(parse_rotation("orientation=7"), None);
        assert_eq!(parse_rotation("nothing"), None);
    }

    #[test]
    fn test_wm_size_prefers_override() {
        let out = "Physical size: 1080x2400\nOverride size: 720x1600\n";
        assert_eq!(parse_wm_size(out), Some(WindowSize::new(720, 1600)));
        assert_eq!(parse_physical_size(out), Some(WindowSize::new(1080, 2400)));
        assert_eq!(parse_wm_size("Physical size: 1080x2400\r\n"), Some(WindowSize::new(1080, 2400)));
        assert_eq!(parse_wm_size("error"), None);
    }

    #[test]
    fn test_ipv4() {
        let ip = "3: wlan0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500\n    \
                  inet 192.168.1.23/24 brd 192.168.1.255 scope global wlan0\n";
        assert_eq!(parse_ipv4(ip).as_deref(), Some("192.168.1.23"));

        let ifconfig = "wlan0     Link encap:UNSPEC\n          inet addr:10.0.0.5  Bcast:10.0.0.255\n";
        assert_eq!(parse_ipv4(ifconfig).as_deref(), Some("10.0.0.5"));

        assert_eq!(parse_ipv4("Device not found"), None);
    }

    #[test]
    fn test_package_list() {
        let out = "package:com.android.settings\npackage:com.example.app\r\n\nwarning\n";
        assert_eq!(
            parse_package_list(out),
            vec!["com.android.settings", "com.example.app"]
        );
    }

    #[test]
    fn test_package_dump() {
        let dump = "\
Packages:
  Package [com.example.app] (a1b2c3):
    versionCode=4201 minSdk=24 targetSdk=34
    versionName=4.2.1
    pkgFlags=[ HAS_CODE ALLOW_CLEAR_USER_DATA ALLOW_BACKUP ]
    firstInstallTime=2024-03-01 09:15:42
    lastUpdateTime=2024-05-20 18:02:07
";
        let info = parse_package_dump(
            "com.example.app",
            dump,
            parse_package_path("package:/data/app/com.example.app/base.apk\n"),
        );
        assert_eq!(info.version_name.as_deref(), Some("4.2.1"));
        assert_eq!(info.version_code, Some(4201));
        assert_eq!(info.flags, vec!["HAS_CODE", "ALLOW_CLEAR_USER_DATA", "ALLOW_BACKUP"]);
        assert_eq!(
            info.first_install_time,
            NaiveDate::from_ymd_opt(2024, 3, 1).and_then(|d| d.and_hms_opt(9, 15, 42))
        );
        assert!(info.last_update_time.is_some());
        assert_eq!(info.path.as_deref(), Some("/data/app/com.example.app/base.apk"));
    }

    #[test]
    fn test_unknown_package_has_no_path() {
        assert_eq!(parse_package_path(""), None);
    }

    #[test]
    fn test_activity_top_uses_last_entry() {
        let out = "\
TASK 10 id=12 userId=0
  ACTIVITY com.android.launcher3/.Launcher 9d8e1a pid=1450
TASK 10 id=31 userId=0
  ACTIVITY com.example.app/.ui.MainActivity 4f2c7b pid=8812
";
        let app = parse_activity_top(out).unwrap();
        assert_eq!(app.package, "com.example.app");
        assert_eq!(app.activity, "com.example.app.ui.MainActivity");
        assert_eq!(app.pid, Some(8812));
    }

    #[test]
    fn test_focused_window() {
        let out = "  mCurrentFocus=Window{6a1b2c u0 com.android.settings/com.android.settings.Settings}\n";
        let app = parse_focused_window(out).unwrap();
        assert_eq!(app.package, "com.android.settings");
        assert_eq!(app.activity, "com.android.settings.Settings");
        assert_eq!(app.pid, None);
        assert_eq!(parse_focused_window("mCurrentFocus=null"), None);
    }
}
