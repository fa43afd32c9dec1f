//! Configure a simulated bridge, stream a second of telemetry and stop.
//!
//! Run with: `cargo run -p ubridge --example sim-stream`

use std::time::{Duration, Instant};

use ubridge::session::{
    DrainPolicy, SensorSet, Session, SessionConfig, SessionError, SimConfig, SimulatedDevice,
};

fn main() -> Result<(), SessionError> {
    let device = SimulatedDevice::new(SimConfig {
        stop_stragglers: 1,
        ..SimConfig::default()
    });
    let mut session = Session::new(device, SessionConfig::default());

    let info = session.device_info()?;
    println!("bridge {} on channel {}", info.bridge_id, info.radio_channel);

    session.set_period(50)?;
    session.start(&"ABT".parse::<SensorSet>()?)?;

    let until = Instant::now() + Duration::from_secs(1);
    let mut frames = 0usize;
    while Instant::now() < until {
        if let Some(frame) = session.poll_periodic(Duration::from_millis(100))? {
            frames += 1;
            println!("{}", frame.text());
        }
    }

    let in_flight = session.stop()?;
    let late = session.drain(Duration::from_millis(100), DrainPolicy::Lenient)?;
    println!(
        "{frames} frames, {} in flight at STOP, {} after",
        in_flight.len(),
        late.periodic.len()
    );
    Ok(())
}
