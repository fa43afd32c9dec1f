//! Command sessions with a micro:bit serial bridge.
//!
//! This is the layer most callers want. A [`Session`] owns a line
//! transport, tags every command with a fresh correlation id, waits for the
//! matching response while buffering periodic telemetry, and decodes the
//! typed command catalog.
//!
//! ```no_run
//! use ubridge_session::{SensorSet, Session, SessionConfig, SimulatedDevice};
//!
//! let mut session = Session::new(SimulatedDevice::default(), SessionConfig::default());
//! session.handshake()?;
//! session.set_radio_channel(42)?;
//! session.start(&"AB".parse::<SensorSet>()?)?;
//! let frame = session.poll_periodic(std::time::Duration::from_millis(100))?;
//! session.stop()?;
//! # let _ = frame;
//! # Ok::<(), ubridge_session::SessionError>(())
//! ```

pub mod catalog;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod session;
pub mod sim;

#[cfg(feature = "serial")]
pub mod connector;

pub use catalog::{
    channel_from_id, Command, Expect, Sensor, SensorSet, Setting, CHANNEL_MODULUS,
    DEFAULT_MIN_PERIOD_MS, MAX_CHANNEL, PROTOCOL_VERSION,
};
pub use engine::{
    Engine, EngineConfig, EngineState, Exchange, InvokeOptions, Outcome, PendingExchange,
    DEFAULT_POLL_INTERVAL, DEFAULT_RESPONSE_TIMEOUT,
};
pub use error::{DeviceErrorCode, Result, SessionError};
pub use handshake::{handshake, HandshakeConfig, HandshakeResult};
pub use session::{DeviceInfo, DrainPolicy, Drained, Reply, Session, SessionConfig};
pub use sim::{SimConfig, SimulatedDevice, DEFAULT_PERIOD_MS, DEFAULT_SIM_ID};

#[cfg(feature = "serial")]
pub use connector::{connect, connect_discovered, connect_with_config, SerialSession, FLUSH_QUIET};
