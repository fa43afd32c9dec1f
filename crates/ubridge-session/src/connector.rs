use std::time::Duration;

use tracing::{info, warn};
use ubridge_transport::{find_port, open_serial, LineStream, SerialConfig, SerialLink};
use ubridge_transport::{MICROBIT_PID, MICROBIT_VID};

use crate::error::Result;
use crate::handshake::{handshake, HandshakeConfig, HandshakeResult};
use crate::session::{Session, SessionConfig};

/// A session over a serial port.
pub type SerialSession = Session<LineStream<SerialLink>>;

/// How long the port must stay silent before the handshake.
pub const FLUSH_QUIET: Duration = Duration::from_millis(100);

/// Open `path` and handshake with default settings.
pub fn connect(path: &str) -> Result<SerialSession> {
    connect_with_config(
        &SerialConfig::new(path),
        SessionConfig::default(),
        &HandshakeConfig::default(),
    )
    .map(|(session, _)| session)
}

/// Discover the bridge by USB id, open it and handshake.
pub fn connect_discovered() -> Result<SerialSession> {
    let path = find_port(MICROBIT_VID, MICROBIT_PID)?;
    connect(&path)
}

/// Open a serial port, discard any residual input and handshake.
pub fn connect_with_config(
    serial: &SerialConfig,
    config: SessionConfig,
    handshake_config: &HandshakeConfig,
) -> Result<(SerialSession, HandshakeResult)> {
    let stream = open_serial(serial)?;
    let mut session = Session::new(stream, config);

    let discarded = session.resync(FLUSH_QUIET)?;
    if !discarded.is_empty() {
        warn!(
            path = %serial.path,
            lines = discarded.len(),
            "discarded residual input before handshake"
        );
    }

    let result = handshake(&mut session, handshake_config)?;
    info!(path = %serial.path, version = %result.protocol_version, "bridge connected");
    Ok((session, result))
}
