//! Sodium - typed Android device state over adb
//!
//! The `sodium` binary reads named device properties through the property
//! resolver and prints them as JSON or plain text:
//! - `get` one or more properties
//! - `snapshot` every property at once
//! - `shell` passthrough for anything not modeled as a property

use clap::{Args, Parser, Subcommand};
use sodium_common::error::format_error_human;
use sodium_common::{Error, OutputFormat, StructuredError};
use sodium_core::adb::AdbSession;
use sodium_core::config::{load_config, ConfigOptions, SodiumConfig};
use sodium_core::exit_codes::ExitCode;
use sodium_core::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use sodium_core::replay::ReplaySession;
use sodium_core::{CommandSpec, Device, DeviceSession, Property, PropertyValue};
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info_span};

/// Read typed Android device state over adb
#[derive(Parser)]
#[command(name = "sodium")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Device serial (defaults to ANDROID_SERIAL, then the only device)
    #[arg(short = 's', long, global = true)]
    serial: Option<String>,

    /// Path to the adb client
    #[arg(long, global = true)]
    adb: Option<PathBuf>,

    /// adb server host
    #[arg(long, global = true)]
    host: Option<String>,

    /// adb server port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Per-command timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Overall deadline per property in milliseconds
    #[arg(long, global = true)]
    deadline_ms: Option<u64>,

    /// Override config directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Answer commands from a captured replay file instead of a device
    #[arg(long, global = true)]
    replay: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log output format on stderr
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one or more properties
    Get(GetArgs),

    /// List readable properties
    List,

    /// Read every property, collecting failures
    Snapshot,

    /// Run a raw shell command on the device
    Shell(ShellArgs),

    /// Show metadata of an installed package
    AppInfo(AppInfoArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct GetArgs {
    /// Property names (snake_case or kebab-case)
    #[arg(required = true)]
    properties: Vec<String>,
}

#[derive(Args, Debug)]
struct ShellArgs {
    /// Timeout for this command in milliseconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Command line, or program and arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[derive(Args, Debug)]
struct AppInfoArgs {
    /// Package name, e.g. com.android.settings
    package: String,
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(
        LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet),
        cli.global.log_format,
    );
    init_logging(&log_config);

    let run_id = generate_run_id();
    let _span = info_span!("sodium", run_id = %run_id).entered();

    let exit_code = match &cli.command {
        Commands::List => {
            print_property_list(&cli.global);
            ExitCode::Ok
        }
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Ok
        }
        command => run_device_command(&cli.global, command, &run_id),
    };

    debug!(exit_code = %exit_code, "finished");
    std::process::exit(exit_code.as_i32());
}

fn config_options(global: &GlobalOpts) -> ConfigOptions {
    ConfigOptions {
        config_dir: global.config_dir.clone(),
        adb_path: global.adb.clone(),
        host: global.host.clone(),
        port: global.port,
        serial: global.serial.clone(),
        timeout_ms: global.timeout_ms,
        deadline_ms: global.deadline_ms,
    }
}

fn run_device_command(global: &GlobalOpts, command: &Commands, run_id: &str) -> ExitCode {
    let settings = match load_config(&config_options(global)) {
        Ok(resolved) => {
            debug!(config_path = ?resolved.config_path, "configuration resolved");
            resolved.settings
        }
        Err(e) => return report_error(global, &Error::from(e)),
    };

    match &global.replay {
        Some(path) => match ReplaySession::from_file(path) {
            Ok(session) => dispatch(global, command, &open(session, &settings), run_id),
            Err(e) => report_error(global, &e),
        },
        None => {
            let session = AdbSession::new(settings.adb_config());
            dispatch(global, command, &open(session, &settings), run_id)
        }
    }
}

fn open<S: DeviceSession>(session: S, settings: &SodiumConfig) -> Device<S> {
    Device::with_resolver(session, settings.resolver())
}

fn dispatch<S: DeviceSession>(
    global: &GlobalOpts,
    command: &Commands,
    device: &Device<S>,
    run_id: &str,
) -> ExitCode {
    match command {
        Commands::Get(args) => run_get(global, device, args, run_id),
        Commands::Snapshot => run_snapshot(global, device, run_id),
        Commands::Shell(args) => run_shell(global, device, args),
        Commands::AppInfo(args) => run_app_info(global, device, args),
        Commands::List | Commands::Version => ExitCode::Ok,
    }
}

fn run_get<S: DeviceSession>(
    global: &GlobalOpts,
    device: &Device<S>,
    args: &GetArgs,
    run_id: &str,
) -> ExitCode {
    let mut properties = Vec::with_capacity(args.properties.len());
    for name in &args.properties {
        match name.parse::<Property>() {
            Ok(property) => properties.push(property),
            Err(e) => return report_error(global, &e),
        }
    }

    let mut values = BTreeMap::new();
    for property in &properties {
        match device.read(*property) {
            Ok(value) => {
                values.insert(property.name(), value);
            }
            Err(e) => return report_error(global, &e),
        }
    }

    match global.format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "run_id": run_id,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "values": values,
            });
            print_json(&output);
        }
        OutputFormat::Text => {
            if let [property] = properties.as_slice() {
                if let Some(value) = values.get(property.name()) {
                    println!("{value}");
                }
            } else {
                for (name, value) in &values {
                    println!("{name}: {value}");
                }
            }
        }
    }

    let absent = values
        .values()
        .any(|v| matches!(v, PropertyValue::Optional(None)));
    if absent {
        ExitCode::Absent
    } else {
        ExitCode::Ok
    }
}

fn run_snapshot<S: DeviceSession>(global: &GlobalOpts, device: &Device<S>, run_id: &str) -> ExitCode {
    let snapshot = device.snapshot();
    match global.format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "run_id": run_id,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "snapshot": snapshot,
            });
            print_json(&output);
        }
        OutputFormat::Text => {
            for property in Property::ALL {
                if let Some(value) = snapshot.values.get(&property) {
                    match value {
                        PropertyValue::Packages(packages) => {
                            println!("{}: {} packages", property, packages.len())
                        }
                        other => println!("{property}: {other}"),
                    }
                } else if let Some(err) = snapshot.errors.get(&property) {
                    println!("{property}: error {} ({})", err.code, err.message);
                }
            }
        }
    }
    ExitCode::Ok
}

fn run_shell<S: DeviceSession>(global: &GlobalOpts, device: &Device<S>, args: &ShellArgs) -> ExitCode {
    let command = match args.command.as_slice() {
        [line] => CommandSpec::line(line.clone()),
        argv => CommandSpec::argv(argv.iter().cloned()),
    };
    let timeout = args.timeout.map(Duration::from_millis);

    match device.shell(&command, timeout) {
        Ok(output) => {
            match global.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "command": command.to_string(),
                    "output": output,
                })),
                OutputFormat::Text => print!("{output}"),
            }
            ExitCode::Ok
        }
        Err(e) => report_error(global, &e),
    }
}

fn run_app_info<S: DeviceSession>(global: &GlobalOpts, device: &Device<S>, args: &AppInfoArgs) -> ExitCode {
    let info = match device.app_info(&args.package) {
        Ok(info) => info,
        Err(e) => return report_error(global, &e),
    };

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "package": args.package,
            "app": info,
        })),
        OutputFormat::Text => match &info {
            Some(app) => {
                println!("package: {}", app.package_name);
                if let Some(version) = &app.version_name {
                    println!("version: {version}");
                }
                if let Some(code) = app.version_code {
                    println!("version_code: {code}");
                }
                if let Some(path) = &app.path {
                    println!("path: {path}");
                }
                if !app.flags.is_empty() {
                    println!("flags: {}", app.flags.join(" "));
                }
            }
            None => println!("{} is not installed", args.package),
        },
    }

    if info.is_some() {
        ExitCode::Ok
    } else {
        ExitCode::Absent
    }
}

fn print_property_list(global: &GlobalOpts) {
    match global.format {
        OutputFormat::Json => {
            let list: Vec<_> = Property::ALL
                .iter()
                .map(|p| serde_json::json!({ "name": p.name(), "description": p.description() }))
                .collect();
            print_json(&serde_json::json!({ "properties": list }));
        }
        OutputFormat::Text => {
            for property in Property::ALL {
                println!("{:<28} {}", property.name(), property.description());
            }
        }
    }
}

fn print_version(global: &GlobalOpts) {
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "sodium_version": env!("CARGO_PKG_VERSION"),
            "rust_version": env!("CARGO_PKG_RUST_VERSION"),
        })),
        OutputFormat::Text => println!("sodium {}", env!("CARGO_PKG_VERSION")),
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
}

/// Print an error to stderr and return its exit code.
fn report_error(global: &GlobalOpts, err: &Error) -> ExitCode {
    match global.format {
        OutputFormat::Json => eprintln!("{}", StructuredError::from(err).to_json_pretty()),
        OutputFormat::Text => {
            let use_color = !global.no_color && std::io::stderr().is_terminal();
            eprintln!("{}", format_error_human(err, use_color));
        }
    }
    ExitCode::for_error(err)
}
