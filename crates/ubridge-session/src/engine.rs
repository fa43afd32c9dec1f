//! Correlation engine.
//!
//! Owns the transport and at most one pending exchange. A command moves the
//! engine from `Idle` to `Sent`; the matching response (or the deadline)
//! brings it back to `Idle`. Any line that is neither the expected response
//! nor periodic data leaves it `Suspect` until [`Engine::resync`] runs.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace, warn};
use ubridge_frame::{
    classify, CommandFrame, CorrelationId, FrameKind, IdGenerator, IdLengthPolicy, PeriodicFrame,
    ResponseFrame,
};
use ubridge_transport::LineTransport;

use crate::error::{Result, SessionError};

/// Default wait for a response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default length of a single transport poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deadline for a response when the call does not override it.
    pub response_timeout: Duration,
    /// Slice length of each transport read while waiting.
    pub poll_interval: Duration,
    /// Length policy for generated correlation ids.
    pub id_length: IdLengthPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            id_length: IdLengthPolicy::default(),
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeOptions {
    /// Wait for the response. `false` sends and returns immediately.
    pub wait: bool,
    /// Response deadline; `None` uses the configured default.
    pub timeout: Option<Duration>,
    /// Tolerate periodic frames before the response; `None` uses the
    /// command's own policy.
    pub allow_periodic: Option<bool>,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            wait: true,
            timeout: None,
            allow_periodic: None,
        }
    }
}

impl InvokeOptions {
    /// Send without waiting for a response.
    pub fn fire_and_forget() -> Self {
        Self {
            wait: false,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn allowing_periodic(mut self, allow: bool) -> Self {
        self.allow_periodic = Some(allow);
        self
    }
}

/// Where the engine is in the exchange cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Sent,
    /// A violation or transport failure left the link in an unknown state.
    Suspect,
}

/// How the last awaited exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Matched,
    TimedOut,
    Violation,
}

/// The one exchange awaiting its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExchange {
    pub id: CorrelationId,
    /// Command line as sent, without terminator.
    pub command: String,
    pub sent_at: Instant,
    pub deadline: Instant,
}

/// Result of a finished exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Command line as sent, without terminator.
    pub command: String,
    /// The matched response; `None` for fire-and-forget sends.
    pub response: Option<ResponseFrame>,
    /// Periodic frames observed before the response, in arrival order.
    pub backlog: Vec<PeriodicFrame>,
}

/// Correlates commands with their responses over a [`LineTransport`].
#[derive(Debug)]
pub struct Engine<T: LineTransport> {
    transport: T,
    ids: IdGenerator,
    config: EngineConfig,
    state: EngineState,
    pending: Option<PendingExchange>,
    backlog: Vec<PeriodicFrame>,
    last_outcome: Option<Outcome>,
}

impl<T: LineTransport> Engine<T> {
    pub fn new(transport: T, config: EngineConfig) -> Self {
        Self::with_id_generator(transport, config, IdGenerator::new(config.id_length))
    }

    /// Engine with an explicit id generator, e.g. a seeded one.
    pub fn with_id_generator(transport: T, config: EngineConfig, ids: IdGenerator) -> Self {
        Self {
            transport,
            ids,
            config,
            state: EngineState::Idle,
            pending: None,
            backlog: Vec::new(),
            last_outcome: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }

    pub fn pending(&self) -> Option<&PendingExchange> {
        self.pending.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Send a command and open an exchange for it.
    ///
    /// With `options.wait == false` the engine stays `Idle` and no exchange
    /// is recorded.
    pub fn begin(
        &mut self,
        name: &str,
        args: &str,
        options: &InvokeOptions,
    ) -> Result<CorrelationId> {
        match self.state {
            EngineState::Idle => {}
            EngineState::Sent => return Err(SessionError::ExchangeInFlight),
            EngineState::Suspect => return Err(SessionError::ConnectionSuspect),
        }

        let frame = CommandFrame::new(self.ids.next_id(), name, args)?;
        let command = frame.to_string();
        self.backlog.clear();

        debug!(command = %command, "send");
        if let Err(err) = self.transport.write_bytes(&frame.encode()) {
            self.state = EngineState::Suspect;
            return Err(err.into());
        }

        if options.wait {
            let sent_at = Instant::now();
            let timeout = options.timeout.unwrap_or(self.config.response_timeout);
            self.pending = Some(PendingExchange {
                id: frame.id.clone(),
                command,
                sent_at,
                deadline: sent_at + timeout,
            });
            self.state = EngineState::Sent;
        }

        Ok(frame.id)
    }

    /// Wait for the response to the pending exchange.
    pub fn complete(&mut self) -> Result<Exchange> {
        let pending = match (self.state, self.pending.take()) {
            (EngineState::Sent, Some(pending)) => pending,
            _ => return Err(SessionError::NoExchangePending),
        };

        loop {
            let now = Instant::now();
            if now >= pending.deadline {
                self.state = EngineState::Idle;
                self.last_outcome = Some(Outcome::TimedOut);
                let timeout = pending.deadline - pending.sent_at;
                warn!(
                    command = %pending.command,
                    periodic = self.backlog.len(),
                    ?timeout,
                    "no response before deadline"
                );
                self.backlog.clear();
                return Err(SessionError::Timeout {
                    command: pending.command,
                    timeout,
                });
            }

            let slice = self.config.poll_interval.min(pending.deadline - now);
            let line = match self.transport.read_line(slice) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    trace!(command = %pending.command, "poll");
                    continue;
                }
                Err(err) => {
                    self.state = EngineState::Suspect;
                    return Err(err.into());
                }
            };

            match classify(line, &pending.id) {
                FrameKind::Periodic(frame) => {
                    trace!(line = %frame.text(), "periodic");
                    self.backlog.push(frame);
                }
                FrameKind::Response(response) => {
                    debug!(
                        response = %response,
                        elapsed = ?pending.sent_at.elapsed(),
                        periodic = self.backlog.len(),
                        "recv"
                    );
                    self.state = EngineState::Idle;
                    self.last_outcome = Some(Outcome::Matched);
                    return Ok(Exchange {
                        command: pending.command,
                        response: Some(response),
                        backlog: std::mem::take(&mut self.backlog),
                    });
                }
                FrameKind::Malformed(line) => {
                    let line = String::from_utf8_lossy(&line).into_owned();
                    warn!(command = %pending.command, line = %line, "unexpected line");
                    self.state = EngineState::Suspect;
                    self.last_outcome = Some(Outcome::Violation);
                    return Err(SessionError::ProtocolViolation {
                        command: pending.command,
                        line,
                    });
                }
            }
        }
    }

    /// Send a command and, unless told otherwise, wait for its response.
    pub fn invoke(
        &mut self,
        name: &str,
        args: &str,
        options: &InvokeOptions,
    ) -> Result<Exchange> {
        let id = self.begin(name, args, options)?;
        if options.wait {
            return self.complete();
        }
        Ok(Exchange {
            command: format!("C[{id}]{name}[{args}]"),
            response: None,
            backlog: Vec::new(),
        })
    }

    /// Discard input until the link stays silent for `quiet`, then return
    /// to `Idle`.
    ///
    /// Gives up waiting for silence after the response timeout, so a device
    /// that is still streaming cannot stall the caller.
    pub fn resync(&mut self, quiet: Duration) -> Result<Vec<Bytes>> {
        let deadline = Instant::now() + self.config.response_timeout;
        let mut discarded = Vec::new();

        self.pending = None;
        self.backlog.clear();

        while Instant::now() < deadline {
            match self.transport.read_line(quiet)? {
                Some(line) => {
                    warn!(line = %String::from_utf8_lossy(&line), "discarded during resync");
                    discarded.push(line);
                }
                None => break,
            }
        }

        debug!(discarded = discarded.len(), "resync complete");
        self.state = EngineState::Idle;
        Ok(discarded)
    }

    /// Read one raw line outside an exchange.
    pub fn poll_line(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        if self.state == EngineState::Sent {
            return Err(SessionError::ExchangeInFlight);
        }
        let line = self.transport.read_line(timeout)?;
        if let Some(line) = &line {
            trace!(line = %String::from_utf8_lossy(line), "poll");
        }
        Ok(line)
    }
}
