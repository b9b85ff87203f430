//! Sodium core library.
//!
//! Typed read access to Android device state over a remote shell:
//! - Command execution boundary and the `adb` transport
//! - Narrowing, pattern extraction and typed coercion
//! - Property chains resolved with ordered fallback
//! - The device facade with one accessor per property
//! - Configuration, logging and exit codes for the `sodium` binary

pub mod adb;
pub mod coerce;
pub mod config;
pub mod device;
pub mod exec;
pub mod exit_codes;
pub mod extract;
pub mod logging;
pub mod replay;
pub mod resolve;

pub use device::{Device, Property, PropertyTable, PropertyValue, Snapshot};
pub use exec::{CommandExecutor, CommandSpec, DeviceSession, RawOutput, SessionInspector};
pub use resolve::{Presence, PropertyChain, Resolver, Strategy};
