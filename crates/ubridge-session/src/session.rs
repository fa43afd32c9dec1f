use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};
use ubridge_frame::{
    IdGenerator, IdLengthPolicy, PeriodicFrame, ResponseFrame, ResponseValue, ERROR_NAME,
};
use ubridge_transport::LineTransport;

use crate::catalog::{Command, Expect, SensorSet, DEFAULT_MIN_PERIOD_MS};
use crate::engine::{
    Engine, EngineConfig, EngineState, Exchange, InvokeOptions, DEFAULT_POLL_INTERVAL,
    DEFAULT_RESPONSE_TIMEOUT,
};
use crate::error::{DeviceErrorCode, Result, SessionError};
use crate::handshake::{handshake, HandshakeConfig, HandshakeResult};

/// Configuration for a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Default response deadline.
    pub response_timeout: Duration,
    /// Slice length of each transport read.
    pub poll_interval: Duration,
    /// Length policy for generated correlation ids.
    pub id_length: IdLengthPolicy,
    /// Check arguments locally before sending. Turn off to let the device
    /// reject them instead.
    pub validate_arguments: bool,
    /// Lowest streaming period accepted by local validation.
    pub min_period_ms: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            id_length: IdLengthPolicy::default(),
            validate_arguments: true,
            min_period_ms: DEFAULT_MIN_PERIOD_MS,
        }
    }
}

impl SessionConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            response_timeout: self.response_timeout,
            poll_interval: self.poll_interval,
            id_length: self.id_length,
        }
    }
}

/// A decoded exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Command line as sent, without terminator.
    pub command: String,
    /// The response; `None` when the command was sent without waiting.
    pub frame: Option<ResponseFrame>,
    /// Decoded response value; `None` when the command was sent without
    /// waiting.
    pub value: Option<ResponseValue>,
    /// Periodic frames observed before the response.
    pub backlog: Vec<PeriodicFrame>,
}

impl Reply {
    /// Raw response value text, empty when there is none.
    pub fn text(&self) -> &str {
        self.frame.as_ref().map_or("", |frame| frame.value.as_str())
    }
}

/// How [`Session::drain`] treats lines that are not periodic frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// Fail with a protocol violation.
    Strict,
    /// Keep them in [`Drained::stray`].
    #[default]
    Lenient,
}

/// Lines collected by [`Session::drain`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drained {
    pub periodic: Vec<PeriodicFrame>,
    pub stray: Vec<Bytes>,
}

/// Everything the bridge reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub protocol_version: String,
    pub software_version: String,
    pub hardware_version: String,
    pub bridge_id: i32,
    pub remote_id: i32,
    pub radio_channel: u8,
    pub period_ms: u32,
}

/// A command session with one bridge.
#[derive(Debug)]
pub struct Session<T: LineTransport> {
    engine: Engine<T>,
    config: SessionConfig,
}

impl<T: LineTransport> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            engine: Engine::new(transport, config.engine_config()),
            config,
        }
    }

    /// Session with an explicit id generator, e.g. a seeded one.
    pub fn with_id_generator(transport: T, config: SessionConfig, ids: IdGenerator) -> Self {
        Self {
            engine: Engine::with_id_generator(transport, config.engine_config(), ids),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine<T> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<T> {
        &mut self.engine
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn transport(&self) -> &T {
        self.engine.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.engine.transport_mut()
    }

    pub fn into_inner(self) -> T {
        self.engine.into_inner()
    }

    /// Run a catalog command and check its response.
    pub fn invoke(&mut self, command: &Command, options: InvokeOptions) -> Result<Reply> {
        if self.config.validate_arguments {
            command.validate(self.config.min_period_ms)?;
        }
        let exchange = self
            .engine
            .invoke(command.name(), &command.args(), &options)?;
        let allow = options
            .allow_periodic
            .unwrap_or_else(|| command.allows_periodic());
        check(exchange, command.name(), &command.expect(), allow)
    }

    /// Run an arbitrary command, bypassing the catalog.
    ///
    /// Rejections, name echo and periodic traffic are still checked;
    /// periodic frames are tolerated by default only for `STOP`.
    pub fn invoke_raw(
        &mut self,
        name: &str,
        args: &str,
        options: InvokeOptions,
    ) -> Result<Reply> {
        let exchange = self.engine.invoke(name, args, &options)?;
        let allow = options.allow_periodic.unwrap_or(name == "STOP");
        check(exchange, name, &Expect::Any, allow)
    }

    fn call(&mut self, command: Command) -> Result<Reply> {
        self.invoke(&command, InvokeOptions::default())
    }

    fn call_value(&mut self, command: Command) -> Result<String> {
        let reply = self.call(command)?;
        Ok(reply.text().to_string())
    }

    fn call_number<N: std::str::FromStr>(&mut self, command: Command, what: &str) -> Result<N> {
        let reply = self.call(command)?;
        reply
            .text()
            .parse()
            .map_err(|_| SessionError::UnexpectedValue {
                command: reply.command.clone(),
                expected: what.to_string(),
                actual: reply.text().to_string(),
            })
    }

    /// `HS`: confirm the protocol version with default settings.
    pub fn handshake(&mut self) -> Result<HandshakeResult> {
        handshake(self, &HandshakeConfig::default())
    }

    /// `RF[]`
    pub fn radio_channel(&mut self) -> Result<u8> {
        self.call_number(Command::GetRadioChannel, "radio channel")
    }

    /// `RF[<channel>]`
    pub fn set_radio_channel(&mut self, channel: u8) -> Result<()> {
        self.call(Command::SetRadioChannel(channel)).map(drop)
    }

    /// `PER[]`
    pub fn period(&mut self) -> Result<u32> {
        self.call_number(Command::GetPeriod, "period in ms")
    }

    /// `PER[<ms>]`
    pub fn set_period(&mut self, period_ms: u32) -> Result<()> {
        self.call(Command::SetPeriod(period_ms)).map(drop)
    }

    /// `SWVER[]`
    pub fn software_version(&mut self) -> Result<String> {
        self.call_value(Command::SoftwareVersion)
    }

    /// `HWVER[]`
    pub fn hardware_version(&mut self) -> Result<String> {
        self.call_value(Command::HardwareVersion)
    }

    /// `MBID[]`
    pub fn bridge_id(&mut self) -> Result<i32> {
        self.call_number(Command::BridgeId, "signed 32-bit id")
    }

    /// `RMBID[]`
    pub fn remote_id(&mut self) -> Result<i32> {
        self.call_number(Command::GetRemoteId, "signed 32-bit id")
    }

    /// `RMBID[<id>]`
    pub fn set_remote_id(&mut self, id: i64) -> Result<()> {
        self.call(Command::SetRemoteId(id)).map(drop)
    }

    /// `START[<selectors>]`
    pub fn start(&mut self, sensors: &SensorSet) -> Result<()> {
        self.call(Command::Start(sensors.clone())).map(drop)
    }

    /// `ZSTART[<selectors>]`
    pub fn start_compact(&mut self, sensors: &SensorSet) -> Result<()> {
        self.call(Command::StartCompact(sensors.clone())).map(drop)
    }

    /// `STOP[]`. Returns the frames that were in flight before the
    /// acknowledgement.
    pub fn stop(&mut self) -> Result<Vec<PeriodicFrame>> {
        self.call(Command::Stop).map(|reply| reply.backlog)
    }

    /// Read every read-only value and the current configuration.
    pub fn device_info(&mut self) -> Result<DeviceInfo> {
        let protocol_version = self.handshake()?.protocol_version;
        Ok(DeviceInfo {
            protocol_version,
            software_version: self.software_version()?,
            hardware_version: self.hardware_version()?,
            bridge_id: self.bridge_id()?,
            remote_id: self.remote_id()?,
            radio_channel: self.radio_channel()?,
            period_ms: self.period()?,
        })
    }

    /// Wait up to `timeout` for the next periodic frame.
    ///
    /// Other lines are logged and skipped.
    pub fn poll_periodic(&mut self, timeout: Duration) -> Result<Option<PeriodicFrame>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(line) = self.engine.poll_line(remaining)? else {
                return Ok(None);
            };
            if is_periodic(&line) {
                return Ok(Some(PeriodicFrame::parse(line)));
            }
            warn!(line = %String::from_utf8_lossy(&line), "skipping non-periodic line");
            if remaining.is_zero() {
                return Ok(None);
            }
        }
    }

    /// Collect everything that arrives within `window`.
    pub fn drain(&mut self, window: Duration, policy: DrainPolicy) -> Result<Drained> {
        let deadline = Instant::now() + window;
        let mut drained = Drained::default();

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let slice = self.config.poll_interval.min(deadline - now);
            let Some(line) = self.engine.poll_line(slice)? else {
                continue;
            };
            if is_periodic(&line) {
                drained.periodic.push(PeriodicFrame::parse(line));
            } else if policy == DrainPolicy::Strict {
                return Err(SessionError::ProtocolViolation {
                    command: "(idle)".to_string(),
                    line: String::from_utf8_lossy(&line).into_owned(),
                });
            } else {
                warn!(line = %String::from_utf8_lossy(&line), "stray line while idle");
                drained.stray.push(line);
            }
        }

        debug!(
            periodic = drained.periodic.len(),
            stray = drained.stray.len(),
            "drained"
        );
        Ok(drained)
    }

    /// Discard input until the link is quiet and clear a suspect state.
    pub fn resync(&mut self, quiet: Duration) -> Result<Vec<Bytes>> {
        self.engine.resync(quiet)
    }
}

fn is_periodic(line: &[u8]) -> bool {
    line.first() == Some(&b'P')
}

fn check(exchange: Exchange, name: &str, expect: &Expect, allow_periodic: bool) -> Result<Reply> {
    let Exchange {
        command,
        response,
        backlog,
    } = exchange;

    let Some(frame) = response else {
        return Ok(Reply {
            command,
            frame: None,
            value: None,
            backlog,
        });
    };

    let value = frame.decoded();
    if let ResponseValue::Error(code) = value {
        return Err(SessionError::DeviceRejected {
            command,
            code: DeviceErrorCode::from_code(code),
        });
    }

    if frame.name != name {
        // An `ERROR` name without a numeric code still counts as a rejection.
        if frame.name == ERROR_NAME {
            return Err(SessionError::DeviceRejected {
                command,
                code: DeviceErrorCode::Other(0),
            });
        }
        return Err(SessionError::UnexpectedValue {
            command,
            expected: format!("{name}[...]"),
            actual: frame.body(),
        });
    }

    if let Expect::Exact(expected) = expect {
        if &frame.value != expected {
            return Err(SessionError::UnexpectedValue {
                command,
                expected: format!("{name}[{expected}]"),
                actual: frame.body(),
            });
        }
    }

    if !allow_periodic && !backlog.is_empty() {
        return Err(SessionError::UnexpectedPeriodic {
            command,
            count: backlog.len(),
        });
    }

    Ok(Reply {
        command,
        frame: Some(frame),
        value: Some(value),
        backlog,
    })
}
