use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult};
use crate::link::LinkArgs;
use crate::output::OutputFormat;

pub mod get;
pub mod info;
pub mod ports;
pub mod selftest;
pub mod send;
pub mod set;
pub mod stream;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports and mark likely bridges.
    Ports(PortsArgs),
    /// Handshake and print every readable setting.
    Info(InfoArgs),
    /// Read one setting.
    Get(GetArgs),
    /// Write one setting.
    Set(SetArgs),
    /// Send a raw `NAME[args]` command and print the response.
    Send(SendArgs),
    /// Start streaming, print periodic frames, stop on exit.
    Stream(StreamArgs),
    /// Exercise the command catalog against a bridge.
    Selftest(SelftestArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Ports(args) => ports::run(args, format),
        Command::Info(args) => info::run(args, link, format),
        Command::Get(args) => get::run(args, link, format),
        Command::Set(args) => set::run(args, link, format),
        Command::Send(args) => send::run(args, link, format),
        Command::Stream(args) => stream::run(args, link, format),
        Command::Selftest(args) => selftest::run(args, link, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Default)]
pub struct PortsArgs {
    /// Include ports that do not look like a micro:bit.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug, Default)]
pub struct InfoArgs {}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// channel, period, remote-id, bridge-id, sw-version or hw-version.
    pub setting: String,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// channel, period or remote-id.
    pub setting: String,
    pub value: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Command body, e.g. `RF[12]`. A bare name sends empty arguments.
    pub frame: String,
    /// Write the command and return without reading a response.
    #[arg(long)]
    pub no_wait: bool,
    /// Accept periodic frames that arrive before the response.
    #[arg(long)]
    pub allow_periodic: bool,
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Sensor selectors (P A B F M L T S).
    #[arg(default_value = "AB")]
    pub sensors: String,
    /// Request the fixed-width compact layout (accelerometer and buttons).
    #[arg(long)]
    pub compact: bool,
    /// Stop after N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Stop after this long (e.g. 10s, 500ms).
    #[arg(long)]
    pub duration: Option<String>,
    /// Set the streaming period in milliseconds before starting.
    #[arg(long)]
    pub period: Option<u32>,
}

#[derive(Args, Debug, Default)]
pub struct SelftestArgs {
    /// Skip the streaming check.
    #[arg(long)]
    pub no_stream: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `250ms` or a bare number of seconds.
pub fn parse_timeout(value: &str) -> CliResult<Duration> {
    let trimmed = value.trim();
    let invalid = || {
        CliError::usage(format!(
            "invalid timeout '{value}' (expected e.g. 5s, 250ms)"
        ))
    };

    let duration = if let Some(ms) = trimmed.strip_suffix("ms") {
        Duration::from_millis(ms.parse::<u64>().map_err(|_| invalid())?)
    } else if let Some(secs) = trimmed.strip_suffix('s') {
        Duration::from_secs(secs.parse::<u64>().map_err(|_| invalid())?)
    } else {
        Duration::from_secs(trimmed.parse::<u64>().map_err(|_| invalid())?)
    };

    if duration.is_zero() {
        return Err(CliError::usage("timeout must be greater than zero"));
    }
    Ok(duration)
}
