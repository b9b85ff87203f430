//! Device facade.
//!
//! One accessor per device property, each a thin call into the resolver
//! with a chain fixed at construction. Nothing is cached: every call
//! re-queries the device.
//!
//! Command execution is serialized through an internal lock, so a `Device`
//! can be shared across threads even when the session cannot multiplex
//! concurrent commands.

mod properties;

pub use properties::PropertyTable;

use crate::coerce::Coercer;
use crate::exec::{CommandExecutor, CommandSpec, DeviceSession, RawOutput};
use crate::resolve::{PropertyChain, Resolver};
use serde::Serialize;
use sodium_common::{AppInfo, CommandFailure, Error, Result, RunningApp, StructuredError, WindowSize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info_span, instrument};

/// Parameterless device properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    BluetoothOn,
    WifiOn,
    AirplaneModeOn,
    ImeActive,
    ScreenOn,
    Brand,
    Orientation,
    Locale,
    SystemVersion,
    BuildNumber,
    DeviceModel,
    Packages,
    CurrentIme,
    WindowSize,
    ScreenTimeout,
    MaxVolumeLevel,
    MaxNotificationLevel,
    VolumeMusicSpeaker,
    VolumeNotificationSpeaker,
    CurrentSsid,
    WlanIp,
    BluetoothName,
    ScreenBrightness,
    CurrentApp,
}

impl Property {
    pub const ALL: [Property; 24] = [
        Property::BluetoothOn,
        Property::WifiOn,
        Property::AirplaneModeOn,
        Property::ImeActive,
        Property::ScreenOn,
        Property::Brand,
        Property::Orientation,
        Property::Locale,
        Property::SystemVersion,
        Property::BuildNumber,
        Property::DeviceModel,
        Property::Packages,
        Property::CurrentIme,
        Property::WindowSize,
        Property::ScreenTimeout,
        Property::MaxVolumeLevel,
        Property::MaxNotificationLevel,
        Property::VolumeMusicSpeaker,
        Property::VolumeNotificationSpeaker,
        Property::CurrentSsid,
        Property::WlanIp,
        Property::BluetoothName,
        Property::ScreenBrightness,
        Property::CurrentApp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Property::BluetoothOn => "bluetooth_on",
            Property::WifiOn => "wifi_on",
            Property::AirplaneModeOn => "airplane_mode_on",
            Property::ImeActive => "ime_active",
            Property::ScreenOn => "screen_on",
            Property::Brand => "brand",
            Property::Orientation => "orientation",
            Property::Locale => "locale",
            Property::SystemVersion => "system_version",
            Property::BuildNumber => "build_number",
            Property::DeviceModel => "device_model",
            Property::Packages => "packages",
            Property::CurrentIme => "current_ime",
            Property::WindowSize => "window_size",
            Property::ScreenTimeout => "screen_timeout",
            Property::MaxVolumeLevel => "max_volume_level",
            Property::MaxNotificationLevel => "max_notification_level",
            Property::VolumeMusicSpeaker => "volume_music_speaker",
            Property::VolumeNotificationSpeaker => "volume_notification_speaker",
            Property::CurrentSsid => "current_ssid",
            Property::WlanIp => "wlan_ip",
            Property::BluetoothName => "bluetooth_name",
            Property::ScreenBrightness => "screen_brightness",
            Property::CurrentApp => "current_app",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Property::BluetoothOn => "Bluetooth radio enabled",
            Property::WifiOn => "Wi-Fi enabled",
            Property::AirplaneModeOn => "Airplane mode enabled",
            Property::ImeActive => "Soft keyboard currently shown",
            Property::ScreenOn => "Display awake",
            Property::Brand => "ROM type, else manufacturer",
            Property::Orientation => "Surface orientation in quarter turns",
            Property::Locale => "System locale",
            Property::SystemVersion => "Android major version",
            Property::BuildNumber => "FOTA version, else display build id",
            Property::DeviceModel => "Device name, else product model",
            Property::Packages => "Installed packages",
            Property::CurrentIme => "Default input method component",
            Property::WindowSize => "Window size in the current orientation",
            Property::ScreenTimeout => "Screen-off timeout in milliseconds",
            Property::MaxVolumeLevel => "Maximum music stream level",
            Property::MaxNotificationLevel => "Maximum ring/notification stream level",
            Property::VolumeMusicSpeaker => "Music volume on the speaker",
            Property::VolumeNotificationSpeaker => "Ring or notification volume on the speaker",
            Property::CurrentSsid => "Connected Wi-Fi network, if any",
            Property::WlanIp => "IPv4 address of the wireless interface",
            Property::BluetoothName => "Bluetooth adapter name",
            Property::ScreenBrightness => "Screen brightness setting",
            Property::CurrentApp => "Foreground application",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Property {
    type Err = Error;

    /// Accepts `snake_case` and `kebab-case` names.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().replace('-', "_").to_ascii_lowercase();
        Property::ALL
            .into_iter()
            .find(|p| p.name() == normalized)
            .ok_or_else(|| Error::UnknownProperty(s.to_string()))
    }
}

/// A resolved property value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Text(String),
    Optional(Option<String>),
    Size(WindowSize),
    App(RunningApp),
    Packages(Vec<String>),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Integer(v) => write!(f, "{v}"),
            PropertyValue::Text(v) => f.write_str(v),
            PropertyValue::Optional(Some(v)) => f.write_str(v),
            PropertyValue::Optional(None) => f.write_str("-"),
            PropertyValue::Size(v) => write!(f, "{v}"),
            PropertyValue::App(v) => write!(f, "{v}"),
            PropertyValue::Packages(v) => f.write_str(&v.join("\n")),
        }
    }
}

/// Every property read once. Failures are collected, not raised.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub values: BTreeMap<Property, PropertyValue>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<Property, StructuredError>,
}

/// Executor view of a session that holds the device lock per command.
struct Serialized<'a, S> {
    session: &'a S,
    lock: &'a Mutex<()>,
}

impl<S: CommandExecutor> CommandExecutor for Serialized<'_, S> {
    fn execute(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
    ) -> std::result::Result<RawOutput, CommandFailure> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.session.execute(command, timeout)
    }
}

/// Typed read access to one device.
pub struct Device<S> {
    session: S,
    lock: Mutex<()>,
    resolver: Resolver,
    table: PropertyTable,
}

impl<S> fmt::Debug for Device<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl<S: DeviceSession> Device<S> {
    pub fn new(session: S) -> Self {
        Self::with_resolver(session, Resolver::default())
    }

    pub fn with_resolver(session: S, resolver: Resolver) -> Self {
        Self {
            session,
            lock: Mutex::new(()),
            resolver,
            table: PropertyTable::standard(),
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn table(&self) -> &PropertyTable {
        &self.table
    }

    fn executor(&self) -> Serialized<'_, S> {
        Serialized {
            session: &self.session,
            lock: &self.lock,
        }
    }

    fn required<C: Coercer>(&self, chain: &PropertyChain<C>) -> Result<C::Output> {
        self.resolver.require(&self.executor(), chain)
    }

    fn inspect<T>(&self, read: impl FnOnce(&S) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        read(&self.session)
    }

    pub fn bluetooth_on(&self) -> Result<bool> {
        self.required(&self.table.bluetooth_on)
    }

    pub fn wifi_on(&self) -> Result<bool> {
        self.required(&self.table.wifi_on)
    }

    pub fn airplane_mode_on(&self) -> Result<bool> {
        self.required(&self.table.airplane_mode_on)
    }

    /// Whether the soft keyboard is shown.
    pub fn ime_active(&self) -> Result<bool> {
        self.required(&self.table.ime_active)
    }

    pub fn screen_on(&self) -> Result<bool> {
        self.inspect(|s| s.is_screen_on())
    }

    pub fn brand(&self) -> Result<String> {
        self.required(&self.table.brand)
    }

    pub fn orientation(&self) -> Result<i64> {
        self.required(&self.table.orientation)
    }

    pub fn locale(&self) -> Result<String> {
        self.required(&self.table.locale)
    }

    /// Major Android version.
    pub fn system_version(&self) -> Result<i64> {
        self.required(&self.table.system_version)
    }

    pub fn build_number(&self) -> Result<String> {
        self.required(&self.table.build_number)
    }

    pub fn device_model(&self) -> Result<String> {
        self.required(&self.table.device_model)
    }

    pub fn packages(&self) -> Result<Vec<String>> {
        self.inspect(|s| s.list_packages())
    }

    pub fn current_ime(&self) -> Result<String> {
        self.required(&self.table.current_ime)
    }

    /// Physical size in the natural orientation, rotated size otherwise.
    pub fn window_size(&self) -> Result<WindowSize> {
        self.inspect(|s| match s.rotation()? {
            0 => s.physical_window_size(),
            rotation => s.window_size(rotation),
        })
    }

    pub fn screen_timeout(&self) -> Result<i64> {
        self.required(&self.table.screen_timeout)
    }

    pub fn max_volume_level(&self) -> Result<i64> {
        self.required(&self.table.max_volume_level)
    }

    pub fn max_notification_level(&self) -> Result<i64> {
        self.required(&self.table.max_notification_level)
    }

    pub fn volume_music_speaker(&self) -> Result<i64> {
        self.required(&self.table.volume_music_speaker)
    }

    pub fn volume_notification_speaker(&self) -> Result<i64> {
        self.required(&self.table.volume_notification_speaker)
    }

    /// `None` when no Wi-Fi network is connected.
    pub fn current_ssid(&self) -> Result<Option<String>> {
        self.resolver.resolve(&self.executor(), &self.table.current_ssid)
    }

    pub fn wlan_ip(&self) -> Result<String> {
        self.inspect(|s| s.wlan_ip())
    }

    pub fn bluetooth_name(&self) -> Result<String> {
        self.required(&self.table.bluetooth_name)
    }

    pub fn screen_brightness(&self) -> Result<i64> {
        self.required(&self.table.screen_brightness)
    }

    /// `None` when the package is not installed.
    pub fn app_info(&self, package: &str) -> Result<Option<AppInfo>> {
        self.inspect(|s| s.app_info(package))
    }

    pub fn current_app(&self) -> Result<RunningApp> {
        self.inspect(|s| s.current_app())
    }

    /// Run an arbitrary command and return its raw output.
    #[instrument(level = "debug", skip_all, fields(command = %command))]
    pub fn shell(&self, command: &CommandSpec, timeout: Option<Duration>) -> Result<String> {
        let timeout = timeout.or(self.resolver.default_timeout());
        self.executor()
            .execute(command, timeout)
            .map(RawOutput::into_string)
            .map_err(|source| Error::Command {
                command: command.to_string(),
                source,
            })
    }

    /// Read one property by name.
    pub fn read(&self, property: Property) -> Result<PropertyValue> {
        let _span = info_span!("read", property = property.name()).entered();
        let value = match property {
            Property::BluetoothOn => PropertyValue::Bool(self.bluetooth_on()?),
            Property::WifiOn => PropertyValue::Bool(self.wifi_on()?),
            Property::AirplaneModeOn => PropertyValue::Bool(self.airplane_mode_on()?),
            Property::ImeActive => PropertyValue::Bool(self.ime_active()?),
            Property::ScreenOn => PropertyValue::Bool(self.screen_on()?),
            Property::Brand => PropertyValue::Text(self.brand()?),
            Property::Orientation => PropertyValue::Integer(self.orientation()?),
            Property::Locale => PropertyValue::Text(self.locale()?),
            Property::SystemVersion => PropertyValue::Integer(self.system_version()?),
            Property::BuildNumber => PropertyValue::Text(self.build_number()?),
            Property::DeviceModel => PropertyValue::Text(self.device_model()?),
            Property::Packages => PropertyValue::Packages(self.packages()?),
            Property::CurrentIme => PropertyValue::Text(self.current_ime()?),
            Property::WindowSize => PropertyValue::Size(self.window_size()?),
            Property::ScreenTimeout => PropertyValue::Integer(self.screen_timeout()?),
            Property::MaxVolumeLevel => PropertyValue::Integer(self.max_volume_level()?),
            Property::MaxNotificationLevel => PropertyValue::Integer(self.max_notification_level()?),
            Property::VolumeMusicSpeaker => PropertyValue::Integer(self.volume_music_speaker()?),
            Property::VolumeNotificationSpeaker => {
                PropertyValue::Integer(self.volume_notification_speaker()?)
            }
            Property::CurrentSsid => PropertyValue::Optional(self.current_ssid()?),
            Property::WlanIp => PropertyValue::Text(self.wlan_ip()?),
            Property::BluetoothName => PropertyValue::Text(self.bluetooth_name()?),
            Property::ScreenBrightness => PropertyValue::Integer(self.screen_brightness()?),
            Property::CurrentApp => PropertyValue::App(self.current_app()?),
        };
        Ok(value)
    }

    /// Read every property, collecting failures per property.
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot {
            values: BTreeMap::new(),
            errors: BTreeMap::new(),
        };
        for property in Property::ALL {
            match self.read(property) {
                Ok(value) => {
                    snapshot.values.insert(property, value);
                }
                Err(e) => {
                    debug!(property = property.name(), error = %e, "snapshot entry failed");
                    snapshot.errors.insert(property, StructuredError::from(&e));
                }
            }
        }
        snapshot
    }
}
