use std::time::Duration;

use clap::Args;
use tracing::{debug, warn};
use ubridge::session::{
    handshake, HandshakeConfig, Session, SessionConfig, SimulatedDevice, FLUSH_QUIET,
};
use ubridge::transport::{
    find_port, open_serial, LineTransport, SerialConfig, DEFAULT_BAUD_RATE, MICROBIT_PID,
    MICROBIT_VID,
};

use crate::cmd::parse_timeout;
use crate::exit::{session_error, transport_error, CliResult};

/// Session over whichever link the flags selected.
pub type CliSession = Session<Box<dyn LineTransport>>;

/// How to reach the bridge.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Serial port of the bridge. Discovered by USB id when omitted.
    #[arg(long, short = 'p', env = "UBRIDGE_PORT", global = true, conflicts_with = "simulate")]
    pub port: Option<String>,

    /// Serial baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE, global = true)]
    pub baud: u32,

    /// Response deadline per command (e.g. 5s, 250ms).
    #[arg(long, default_value = "5s", global = true)]
    pub timeout: String,

    /// Talk to an in-process simulated bridge instead of hardware.
    #[arg(long, global = true)]
    pub simulate: bool,
}

impl LinkArgs {
    pub fn session_config(&self) -> CliResult<SessionConfig> {
        Ok(SessionConfig {
            response_timeout: parse_timeout(&self.timeout)?,
            ..SessionConfig::default()
        })
    }
}

/// Open the link and discard residual input. With `greet`, also run the
/// `HS` handshake before handing the session out.
pub fn open_session(args: &LinkArgs, greet: bool) -> CliResult<CliSession> {
    let config = args.session_config()?;
    let timeout = config.response_timeout;

    let transport: Box<dyn LineTransport> = if args.simulate {
        debug!("using simulated bridge");
        Box::new(SimulatedDevice::default())
    } else {
        let path = match &args.port {
            Some(path) => path.clone(),
            None => find_port(MICROBIT_VID, MICROBIT_PID)
                .map_err(|err| transport_error("port discovery failed", err))?,
        };
        let serial = SerialConfig {
            baud_rate: args.baud,
            ..SerialConfig::new(path)
        };
        debug!(path = %serial.path, baud = serial.baud_rate, "opening serial port");
        Box::new(
            open_serial(&serial).map_err(|err| transport_error("open failed", err))?,
        )
    };

    let mut session = Session::new(transport, config);
    let discarded = session
        .resync(FLUSH_QUIET)
        .map_err(|err| session_error("flush failed", err))?;
    if !discarded.is_empty() {
        warn!(lines = discarded.len(), "discarded residual input");
    }

    if greet {
        let handshake_config = HandshakeConfig {
            timeout,
            ..HandshakeConfig::default()
        };
        handshake(&mut session, &handshake_config)
            .map_err(|err| session_error("handshake failed", err))?;
    }
    Ok(session)
}

/// Window used to collect lines that trail a `STOP`.
pub fn straggler_window(config: &SessionConfig) -> Duration {
    config.poll_interval.max(Duration::from_millis(100))
}
