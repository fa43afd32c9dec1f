use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use ubridge::session::{DrainPolicy, SensorSet};

use crate::cmd::{parse_timeout, StreamArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::link::{open_session, straggler_window, LinkArgs};
use crate::output::{print_periodic, OutputFormat};

const POLL_SLICE: Duration = Duration::from_millis(100);

pub fn run(args: StreamArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let sensors: SensorSet = args
        .sensors
        .parse()
        .map_err(|err| session_error("stream", err))?;
    let deadline = match &args.duration {
        Some(value) => Some(Instant::now() + parse_timeout(value)?),
        None => None,
    };

    let mut session = open_session(link, true)?;
    if let Some(period) = args.period {
        session
            .set_period(period)
            .map_err(|err| session_error("set period failed", err))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let started = if args.compact {
        session.start_compact(&sensors)
    } else {
        session.start(&sensors)
    };
    started.map_err(|err| session_error("start failed", err))?;
    info!(%sensors, compact = args.compact, "streaming");

    let mut printed = 0usize;
    let done = |printed: usize| args.count.is_some_and(|count| printed >= count);

    while running.load(Ordering::SeqCst) && !done(printed) {
        if deadline.is_some_and(|at| Instant::now() >= at) {
            break;
        }
        match session.poll_periodic(POLL_SLICE) {
            Ok(Some(frame)) => {
                print_periodic(&frame, format);
                printed += 1;
            }
            Ok(None) => {}
            Err(err) => {
                // Leave the bridge quiet before reporting.
                if let Err(stop_err) = session.stop() {
                    warn!(error = %stop_err, "STOP after stream failure failed");
                }
                return Err(session_error("stream failed", err));
            }
        }
    }

    let in_flight = session
        .stop()
        .map_err(|err| session_error("stop failed", err))?;
    for frame in &in_flight {
        if done(printed) {
            break;
        }
        print_periodic(frame, format);
        printed += 1;
    }

    let window = straggler_window(session.config());
    let late = session
        .drain(window, DrainPolicy::Lenient)
        .map_err(|err| session_error("drain failed", err))?;
    debug!(
        printed,
        stragglers = late.periodic.len(),
        stray = late.stray.len(),
        "stream stopped"
    );

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
