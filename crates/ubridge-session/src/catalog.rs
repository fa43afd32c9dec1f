//! The bridge's command catalog.
//!
//! | Command | Args | Response value |
//! |---|---|---|
//! | `HS` | none | protocol version |
//! | `RF` | optional channel 0-83 | current / new channel |
//! | `PER` | optional period in ms | current / new period |
//! | `SWVER`, `HWVER` | none | version strings |
//! | `MBID` | none | device id, signed 32-bit |
//! | `RMBID` | optional remote id, signed 32-bit | current / new remote id |
//! | `START` | sensor selectors | empty |
//! | `ZSTART` | optional selectors | empty |
//! | `STOP` | none | empty |

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SessionError};

/// Protocol version answered by `HS`.
pub const PROTOCOL_VERSION: &str = "1";
/// Highest radio channel.
pub const MAX_CHANNEL: u8 = 83;
/// Modulus used to derive the default channel from a device id.
pub const CHANNEL_MODULUS: u32 = 83;
/// Lowest streaming period accepted by default, in milliseconds.
pub const DEFAULT_MIN_PERIOD_MS: u32 = 10;

/// Default radio channel of a device: its id, read as unsigned, mod 83.
pub fn channel_from_id(id: i32) -> u8 {
    // The remainder is below 83, so the cast is lossless.
    ((id as u32) % CHANNEL_MODULUS) as u8
}

/// One sensor group a stream can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    Accelerometer,
    Buttons,
    Logo,
    Pins,
    Magnetometer,
    Temperature,
    Light,
    Sound,
}

impl Sensor {
    /// Every sensor, in the order of the `PABFMLTS` selector string.
    pub const ALL: [Sensor; 8] = [
        Sensor::Pins,
        Sensor::Accelerometer,
        Sensor::Buttons,
        Sensor::Logo,
        Sensor::Magnetometer,
        Sensor::Light,
        Sensor::Temperature,
        Sensor::Sound,
    ];

    pub fn selector(self) -> char {
        match self {
            Sensor::Accelerometer => 'A',
            Sensor::Buttons => 'B',
            Sensor::Logo => 'F',
            Sensor::Pins => 'P',
            Sensor::Magnetometer => 'M',
            Sensor::Temperature => 'T',
            Sensor::Light => 'L',
            Sensor::Sound => 'S',
        }
    }

    pub fn from_selector(selector: char) -> Option<Self> {
        Sensor::ALL.into_iter().find(|s| s.selector() == selector)
    }

    /// Keys this sensor contributes to a readable periodic frame.
    pub fn field_keys(self) -> &'static [&'static str] {
        match self {
            Sensor::Accelerometer => &["AX", "AY", "AZ"],
            Sensor::Magnetometer => &["CX", "CY", "CZ"],
            Sensor::Buttons => &["BA", "BB"],
            Sensor::Logo => &["BL"],
            Sensor::Pins => &["B0", "B1", "B2"],
            Sensor::Temperature => &["T"],
            Sensor::Light => &["L"],
            Sensor::Sound => &["S"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Sensor::Accelerometer => "accelerometer",
            Sensor::Buttons => "buttons",
            Sensor::Logo => "logo",
            Sensor::Pins => "pins",
            Sensor::Magnetometer => "magnetometer",
            Sensor::Temperature => "temperature",
            Sensor::Light => "light",
            Sensor::Sound => "sound",
        }
    }
}

/// An ordered, duplicate-free selection of sensors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorSet(Vec<Sensor>);

impl SensorSet {
    pub fn all() -> Self {
        Self(Sensor::ALL.to_vec())
    }

    pub fn new(sensors: impl IntoIterator<Item = Sensor>) -> Self {
        let mut set = Self::default();
        for sensor in sensors {
            set.insert(sensor);
        }
        set
    }

    pub fn insert(&mut self, sensor: Sensor) {
        if !self.0.contains(&sensor) {
            self.0.push(sensor);
        }
    }

    pub fn contains(&self, sensor: Sensor) -> bool {
        self.0.contains(&sensor)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Sensor> + '_ {
        self.0.iter().copied()
    }
}

impl FromStr for SensorSet {
    type Err = SessionError;

    fn from_str(selectors: &str) -> Result<Self> {
        let mut set = Self::default();
        for selector in selectors.chars() {
            let sensor = Sensor::from_selector(selector).ok_or_else(|| {
                SessionError::InvalidArgument(format!(
                    "unknown sensor selector '{selector}' (expected one of PABFMLTS)"
                ))
            })?;
            set.insert(sensor);
        }
        Ok(set)
    }
}

impl fmt::Display for SensorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|s| write!(f, "{}", s.selector()))
    }
}

/// How a response value is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect {
    /// The value must equal this literal.
    Exact(String),
    /// Any value; only the echoed name is checked.
    Any,
}

/// A catalog command with typed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Handshake,
    GetRadioChannel,
    SetRadioChannel(u8),
    GetPeriod,
    SetPeriod(u32),
    SoftwareVersion,
    HardwareVersion,
    BridgeId,
    GetRemoteId,
    /// Wider than `i32` so out-of-range ids reach validation (or the device).
    SetRemoteId(i64),
    Start(SensorSet),
    StartCompact(SensorSet),
    Stop,
}

impl Command {
    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Handshake => "HS",
            Command::GetRadioChannel | Command::SetRadioChannel(_) => "RF",
            Command::GetPeriod | Command::SetPeriod(_) => "PER",
            Command::SoftwareVersion => "SWVER",
            Command::HardwareVersion => "HWVER",
            Command::BridgeId => "MBID",
            Command::GetRemoteId | Command::SetRemoteId(_) => "RMBID",
            Command::Start(_) => "START",
            Command::StartCompact(_) => "ZSTART",
            Command::Stop => "STOP",
        }
    }

    /// Argument text placed between the brackets.
    pub fn args(&self) -> String {
        match self {
            Command::SetRadioChannel(channel) => channel.to_string(),
            Command::SetPeriod(period) => period.to_string(),
            Command::SetRemoteId(id) => id.to_string(),
            Command::Start(sensors) | Command::StartCompact(sensors) => sensors.to_string(),
            _ => String::new(),
        }
    }

    /// What the response value must look like.
    ///
    /// Setters echo their argument; stream control is a bare acknowledgement.
    pub fn expect(&self) -> Expect {
        match self {
            Command::SetRadioChannel(_) | Command::SetPeriod(_) | Command::SetRemoteId(_) => {
                Expect::Exact(self.args())
            }
            Command::Start(_) | Command::StartCompact(_) | Command::Stop => {
                Expect::Exact(String::new())
            }
            _ => Expect::Any,
        }
    }

    /// Whether periodic frames may precede the response by default.
    ///
    /// Frames already in flight when `STOP` arrives are expected.
    pub fn allows_periodic(&self) -> bool {
        matches!(self, Command::Stop)
    }

    /// Local argument checks, run before anything is sent.
    pub fn validate(&self, min_period_ms: u32) -> Result<()> {
        match self {
            Command::SetRadioChannel(channel) if *channel > MAX_CHANNEL => {
                Err(SessionError::InvalidArgument(format!(
                    "radio channel {channel} out of range 0-{MAX_CHANNEL}"
                )))
            }
            Command::SetPeriod(period) if *period < min_period_ms => {
                Err(SessionError::InvalidArgument(format!(
                    "period {period} ms below the {min_period_ms} ms floor"
                )))
            }
            Command::SetRemoteId(id) if i32::try_from(*id).is_err() => {
                Err(SessionError::InvalidArgument(format!(
                    "remote id {id} does not fit a signed 32-bit integer"
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name(), self.args())
    }
}

/// A named device setting, as exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    Channel,
    Period,
    RemoteId,
    BridgeId,
    SoftwareVersion,
    HardwareVersion,
}

impl Setting {
    pub const ALL: [Setting; 6] = [
        Setting::Channel,
        Setting::Period,
        Setting::RemoteId,
        Setting::BridgeId,
        Setting::SoftwareVersion,
        Setting::HardwareVersion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Setting::Channel => "channel",
            Setting::Period => "period",
            Setting::RemoteId => "remote-id",
            Setting::BridgeId => "bridge-id",
            Setting::SoftwareVersion => "sw-version",
            Setting::HardwareVersion => "hw-version",
        }
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Setting::Channel | Setting::Period | Setting::RemoteId)
    }

    /// Command that reads this setting.
    pub fn read_command(self) -> Command {
        match self {
            Setting::Channel => Command::GetRadioChannel,
            Setting::Period => Command::GetPeriod,
            Setting::RemoteId => Command::GetRemoteId,
            Setting::BridgeId => Command::BridgeId,
            Setting::SoftwareVersion => Command::SoftwareVersion,
            Setting::HardwareVersion => Command::HardwareVersion,
        }
    }

    /// Command that writes `value` to this setting.
    pub fn write_command(self, value: &str) -> Result<Command> {
        let invalid = |what: &str| {
            SessionError::InvalidArgument(format!("invalid {what} '{value}' for {}", self.as_str()))
        };
        match self {
            Setting::Channel => value
                .parse()
                .map(Command::SetRadioChannel)
                .map_err(|_| invalid("channel")),
            Setting::Period => value
                .parse()
                .map(Command::SetPeriod)
                .map_err(|_| invalid("period")),
            Setting::RemoteId => value
                .parse()
                .map(Command::SetRemoteId)
                .map_err(|_| invalid("id")),
            _ => Err(SessionError::InvalidArgument(format!(
                "{} is read-only",
                self.as_str()
            ))),
        }
    }
}

impl FromStr for Setting {
    type Err = SessionError;

    fn from_str(name: &str) -> Result<Self> {
        Setting::ALL
            .into_iter()
            .find(|s| s.as_str() == name)
            .ok_or_else(|| SessionError::InvalidArgument(format!("unknown setting '{name}'")))
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
