use std::time::Duration;

use tracing::{debug, info};
use ubridge_transport::LineTransport;

use crate::catalog::{Command, PROTOCOL_VERSION};
use crate::engine::InvokeOptions;
use crate::error::{Result, SessionError};
use crate::session::Session;

const MAX_VERSION_LEN: usize = 16;

/// Configuration for the `HS` handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Deadline for the handshake response.
    pub timeout: Duration,
    /// Protocol version the device must report.
    pub expected_version: String,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            expected_version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// Result of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResult {
    /// Version reported by the device.
    pub protocol_version: String,
    /// No periodic frames arrived before the response.
    pub backlog_empty: bool,
}

/// Perform the `HS` handshake.
///
/// The device must answer with the expected version and nothing else may
/// arrive first: periodic frames mean a stream is still running.
pub fn handshake<T: LineTransport>(
    session: &mut Session<T>,
    config: &HandshakeConfig,
) -> Result<HandshakeResult> {
    validate_version(&config.expected_version)?;

    let options = InvokeOptions::default()
        .with_timeout(config.timeout)
        .allowing_periodic(true);
    let reply = session.invoke(&Command::Handshake, options)?;

    if !reply.backlog.is_empty() {
        return Err(SessionError::HandshakeFailed(format!(
            "{} periodic frame(s) arrived before the handshake response; is a stream still running?",
            reply.backlog.len()
        )));
    }

    let version = reply.text();
    debug!(version, "handshake response");
    if version != config.expected_version {
        return Err(SessionError::HandshakeFailed(format!(
            "protocol version mismatch: device reports '{}', expected '{}'",
            version, config.expected_version
        )));
    }

    info!(version, "handshake complete");
    Ok(HandshakeResult {
        protocol_version: version.to_string(),
        backlog_empty: true,
    })
}

fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() || version.len() > MAX_VERSION_LEN {
        return Err(SessionError::HandshakeFailed(format!(
            "invalid expected version '{version}'"
        )));
    }
    if !version.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(SessionError::HandshakeFailed(format!(
            "invalid expected version '{version}': non-printable characters"
        )));
    }
    Ok(())
}
