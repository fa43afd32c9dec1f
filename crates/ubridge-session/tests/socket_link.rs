#![cfg(unix)]

use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ubridge_session::{Session, SessionConfig, SimulatedDevice};
use ubridge_transport::{LineStream, LineTransport, TransportError};

/// Serve a simulated bridge on one end of a socket pair until `stop` is set
/// or the host hangs up.
fn serve(link: UnixStream, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut wire = LineStream::new(link);
        let mut device = SimulatedDevice::default();
        while !stop.load(Ordering::SeqCst) {
            match wire.read_line(Duration::from_millis(5)) {
                Ok(Some(line)) => {
                    let mut command = line.to_vec();
                    command.push(b'\n');
                    device.write_bytes(&command).unwrap();
                }
                Ok(None) => {}
                Err(TransportError::Closed) => break,
                Err(err) => panic!("device side failed: {err}"),
            }
            while let Some(reply) = device.read_line(Duration::ZERO).unwrap() {
                let mut out = reply.to_vec();
                out.extend_from_slice(b"\r\n");
                if wire.write_bytes(&out).is_err() {
                    return;
                }
            }
        }
    })
}

#[test]
fn session_over_socket_pair() {
    let (host, device) = UnixStream::pair().unwrap();
    let stop = Arc::new(AtomicBool::new(false));
    let server = serve(device, stop.clone());

    let mut session = Session::new(
        LineStream::new(host),
        SessionConfig {
            response_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
            ..SessionConfig::default()
        },
    );

    assert_eq!(session.handshake().unwrap().protocol_version, "1");
    session.set_radio_channel(33).unwrap();
    assert_eq!(session.radio_channel().unwrap(), 33);
    assert_eq!(session.software_version().unwrap(), "0.1.0");

    stop.store(true, Ordering::SeqCst);
    drop(session);
    server.join().unwrap();
}
