//! The fixed property chains read by [`Device`](super::Device).

use crate::coerce::{FlagCoercer, IntegerCoercer, TextCoercer};
use crate::extract::{ExtractionPattern, Narrowing};
use crate::resolve::{PropertyChain, Strategy};

/// Printed by `settings get` for an unset key.
const UNSET: &str = "null";

/// `Max:` line of an audio stream block.
const STREAM_MAX: &str = r"(?m)Max: (\S+)\r?$";

/// Lines printed by `dumpsys audio` after each stream header.
const STREAM_BLOCK_LINES: usize = 5;

/// Every text-extracted property with its chain, coercion and presence.
#[derive(Debug, Clone)]
pub struct PropertyTable {
    pub bluetooth_on: PropertyChain<FlagCoercer>,
    pub wifi_on: PropertyChain<FlagCoercer>,
    pub airplane_mode_on: PropertyChain<FlagCoercer>,
    pub ime_active: PropertyChain<FlagCoercer>,
    pub brand: PropertyChain<TextCoercer>,
    pub orientation: PropertyChain<IntegerCoercer>,
    pub locale: PropertyChain<TextCoercer>,
    pub system_version: PropertyChain<IntegerCoercer>,
    pub build_number: PropertyChain<TextCoercer>,
    pub device_model: PropertyChain<TextCoercer>,
    pub current_ime: PropertyChain<TextCoercer>,
    pub screen_timeout: PropertyChain<IntegerCoercer>,
    pub max_volume_level: PropertyChain<IntegerCoercer>,
    pub max_notification_level: PropertyChain<IntegerCoercer>,
    pub volume_music_speaker: PropertyChain<IntegerCoercer>,
    pub volume_notification_speaker: PropertyChain<IntegerCoercer>,
    pub current_ssid: PropertyChain<TextCoercer>,
    pub bluetooth_name: PropertyChain<TextCoercer>,
    pub screen_brightness: PropertyChain<IntegerCoercer>,
}

impl Default for PropertyTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn getprop(key: &str) -> Strategy {
    Strategy::new(format!("getprop {key}"))
}

impl PropertyTable {
    pub fn standard() -> Self {
        Self {
            bluetooth_on: PropertyChain::required("bluetooth_on", FlagCoercer::equals("1"))
                .then(Strategy::new("settings get global bluetooth_on"))
                .empty_sentinel(UNSET),

            wifi_on: PropertyChain::required("wifi_on", FlagCoercer::equals("enabled")).then(
                Strategy::new("dumpsys wifi")
                    .narrow(Narrowing::lines_containing("Wi-Fi is"))
                    .pattern(ExtractionPattern::new(r"Wi-Fi is (\w+)")),
            ),

            airplane_mode_on: PropertyChain::required(
                "airplane_mode_on",
                FlagCoercer::contains("enable"),
            )
            .then(Strategy::new("cmd connectivity airplane-mode")),

            ime_active: PropertyChain::required("ime_active", FlagCoercer::equals("true")).then(
                Strategy::new("dumpsys input_method")
                    .narrow(Narrowing::lines_containing("mInputShown"))
                    .pattern(ExtractionPattern::new(r"mInputShown=(true|false)")),
            ),

            brand: PropertyChain::required("brand", TextCoercer)
                .then(getprop("persist.sys.romtype"))
                .then(getprop("ro.product.manufacturer")),

            orientation: PropertyChain::required("orientation", IntegerCoercer).then(
                Strategy::new("dumpsys input")
                    .narrow(Narrowing::lines_containing("SurfaceOrientation"))
                    .pattern(ExtractionPattern::new(r"SurfaceOrientation:\s*(\S+)")),
            ),

            locale: PropertyChain::required("locale", TextCoercer)
                .then(getprop("persist.sys.locale"))
                .then(getprop("ro.product.locale")),

            // Leading component: "8.1.0" reads as 8.
            system_version: PropertyChain::required("system_version", IntegerCoercer).then(
                getprop("ro.build.version.release")
                    .pattern(ExtractionPattern::new(r"(?m)^\s*([^.\s]+)")),
            ),

            build_number: PropertyChain::required("build_number", TextCoercer)
                .then(getprop("ro.fota.version"))
                .then(getprop("ro.build.display.id")),

            device_model: PropertyChain::required("device_model", TextCoercer)
                .then(getprop("persist.sys.device"))
                .then(getprop("ro.product.model")),

            current_ime: PropertyChain::required("current_ime", TextCoercer)
                .then(Strategy::new("settings get secure default_input_method"))
                .empty_sentinel(UNSET),

            screen_timeout: PropertyChain::required("screen_timeout", IntegerCoercer).then(
                Strategy::new("dumpsys power")
                    .narrow(Narrowing::lines_containing("mScreenOffTimeoutSetting"))
                    .pattern(ExtractionPattern::new(r"mScreenOffTimeoutSetting=(\S+)")),
            ),

            max_volume_level: PropertyChain::required("max_volume_level", IntegerCoercer).then(
                Strategy::new("dumpsys audio")
                    .narrow(Narrowing::lines_containing("STREAM_MUSIC").with_after(STREAM_BLOCK_LINES))
                    .pattern(ExtractionPattern::new(STREAM_MAX)),
            ),

            max_notification_level: PropertyChain::required(
                "max_notification_level",
                IntegerCoercer,
            )
            .then(
                Strategy::new("dumpsys audio")
                    .narrow(
                        Narrowing::lines_containing_any(["AUDIO_STREAM_RING", "STREAM_NOTIFICATION"])
                            .with_after(STREAM_BLOCK_LINES),
                    )
                    .pattern(ExtractionPattern::new(STREAM_MAX)),
            ),

            volume_music_speaker: PropertyChain::required("volume_music_speaker", IntegerCoercer)
                .then(speaker_volume("volume_music_speaker")),

            volume_notification_speaker: PropertyChain::required(
                "volume_notification_speaker",
                IntegerCoercer,
            )
            .then(speaker_volume("volume_ring_speaker"))
            .then(speaker_volume("volume_notification_speaker")),

            current_ssid: PropertyChain::optional("current_ssid", TextCoercer).then(
                Strategy::new("dumpsys netstats")
                    .narrow(Narrowing::lines_containing("iface=wlan"))
                    .pattern(ExtractionPattern::with_group(
                        r#"(networkId|wifiNetworkKey)="(.+?)""#,
                        2,
                    )),
            ),

            bluetooth_name: PropertyChain::required("bluetooth_name", TextCoercer).then(
                Strategy::new("dumpsys bluetooth_manager")
                    .narrow(Narrowing::lines_containing("name:"))
                    .pattern(ExtractionPattern::new(r"name: (.+)")),
            ),

            screen_brightness: PropertyChain::required("screen_brightness", IntegerCoercer)
                .then(Strategy::new("settings get system screen_brightness"))
                .empty_sentinel(UNSET),
        }
    }

    /// Every extraction pattern in the table, keyed by property name.
    pub fn patterns(&self) -> Vec<(&str, &ExtractionPattern)> {
        fn collect<'a, C>(out: &mut Vec<(&'a str, &'a ExtractionPattern)>, chain: &'a PropertyChain<C>)
        where
            C: crate::coerce::Coercer,
        {
            for strategy in chain.strategies() {
                if let Some(pattern) = strategy.extraction() {
                    out.push((chain.name(), pattern));
                }
            }
        }

        let mut out = Vec::new();
        collect(&mut out, &self.bluetooth_on);
        collect(&mut out, &self.wifi_on);
        collect(&mut out, &self.airplane_mode_on);
        collect(&mut out, &self.ime_active);
        collect(&mut out, &self.brand);
        collect(&mut out, &self.orientation);
        collect(&mut out, &self.locale);
        collect(&mut out, &self.system_version);
        collect(&mut out, &self.build_number);
        collect(&mut out, &self.device_model);
        collect(&mut out, &self.current_ime);
        collect(&mut out, &self.screen_timeout);
        collect(&mut out, &self.max_volume_level);
        collect(&mut out, &self.max_notification_level);
        collect(&mut out, &self.volume_music_speaker);
        collect(&mut out, &self.volume_notification_speaker);
        collect(&mut out, &self.current_ssid);
        collect(&mut out, &self.bluetooth_name);
        collect(&mut out, &self.screen_brightness);
        out
    }
}

fn speaker_volume(key: &str) -> Strategy {
    Strategy::new("settings list system")
        .narrow(Narrowing::lines_containing(key))
        .pattern(ExtractionPattern::new(r"speaker=(\S+)"))
}
