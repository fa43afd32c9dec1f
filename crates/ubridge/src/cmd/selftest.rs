use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;
use ubridge::session::{
    channel_from_id, DeviceErrorCode, DrainPolicy, EngineState, InvokeOptions, SensorSet,
    SessionError, FLUSH_QUIET, MAX_CHANNEL, PROTOCOL_VERSION,
};

use crate::cmd::SelftestArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::link::{open_session, straggler_window, CliSession, LinkArgs};
use crate::output::{print_json, OutputFormat};

const STREAM_WAIT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: &'static str,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn from_outcome(name: &'static str, outcome: Result<String, String>) -> Self {
        match outcome {
            Ok(detail) => Self {
                name,
                status: CheckStatus::Pass,
                detail,
            },
            Err(detail) => Self {
                name,
                status: CheckStatus::Fail,
                detail,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct SelftestOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

type Check = fn(&mut CliSession) -> Result<String, String>;

const CHECKS: [(&str, Check); 7] = [
    ("versions", versions),
    ("channel_round_trip", channel_round_trip),
    ("channel_out_of_range", channel_out_of_range),
    ("period_floor", period_floor),
    ("remote_id_range", remote_id_range),
    ("pairing", pairing),
    ("unknown_command", unknown_command),
];

pub fn run(args: SelftestArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let mut session = open_session(link, true)?;
    let mut checks = vec![CheckResult {
        name: "handshake",
        status: CheckStatus::Pass,
        detail: format!("protocol version {PROTOCOL_VERSION}"),
    }];

    for (name, check) in CHECKS {
        recover(&mut session);
        checks.push(CheckResult::from_outcome(name, check(&mut session)));
    }
    recover(&mut session);
    if args.no_stream {
        checks.push(CheckResult {
            name: "streaming",
            status: CheckStatus::Skip,
            detail: "--no-stream".to_string(),
        });
    } else {
        checks.push(CheckResult::from_outcome("streaming", streaming(&mut session)));
    }

    let has_fail = checks.iter().any(|c| c.status == CheckStatus::Fail);
    let output = SelftestOutput {
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };
    print_selftest(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_selftest(output: &SelftestOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("ubridge selftest\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<22} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => println!("{}", output.overall),
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Skip => "SKIP",
    }
}

/// Clear a suspect connection so one failed check does not fail the rest.
fn recover(session: &mut CliSession) {
    if session.state() != EngineState::Suspect {
        return;
    }
    match session.resync(FLUSH_QUIET) {
        Ok(discarded) => warn!(lines = discarded.len(), "resynced after failed check"),
        Err(err) => warn!(error = %err, "resync after failed check failed"),
    }
}

fn versions(session: &mut CliSession) -> Result<String, String> {
    let sw = session.software_version().map_err(describe)?;
    let hw = session.hardware_version().map_err(describe)?;
    Ok(format!("software {sw}, hardware {hw}"))
}

fn channel_round_trip(session: &mut CliSession) -> Result<String, String> {
    let original = session.radio_channel().map_err(describe)?;
    let probe = if original == MAX_CHANNEL { 0 } else { original + 1 };

    let result = session
        .set_radio_channel(probe)
        .and_then(|_| session.radio_channel());
    session.set_radio_channel(original).map_err(describe)?;

    match result.map_err(describe)? {
        read if read == probe => Ok(format!("{probe} read back, restored {original}")),
        read => Err(format!("wrote {probe}, read back {read}")),
    }
}

fn channel_out_of_range(session: &mut CliSession) -> Result<String, String> {
    let before = session.radio_channel().map_err(describe)?;
    let outcome = session.invoke_raw("RF", "84", InvokeOptions::default());
    expect_rejected(outcome, DeviceErrorCode::InvalidArgument)?;

    let after = session.radio_channel().map_err(describe)?;
    if after != before {
        return Err(format!("channel changed from {before} to {after}"));
    }
    Ok("RF[84] rejected, channel kept".to_string())
}

fn period_floor(session: &mut CliSession) -> Result<String, String> {
    let before = session.period().map_err(describe)?;
    let outcome = session.invoke_raw("PER", "5", InvokeOptions::default());
    expect_rejected(outcome, DeviceErrorCode::InvalidArgument)?;

    let after = session.period().map_err(describe)?;
    if after != before {
        return Err(format!("period changed from {before} to {after}"));
    }
    Ok(format!("PER[5] rejected, period kept at {before} ms"))
}

fn remote_id_range(session: &mut CliSession) -> Result<String, String> {
    let before = session.remote_id().map_err(describe)?;
    let outcome = session.invoke_raw("RMBID", "2147483648", InvokeOptions::default());
    expect_rejected(outcome, DeviceErrorCode::OutOfRange)?;

    let after = session.remote_id().map_err(describe)?;
    if after != before {
        return Err(format!("remote id changed from {before} to {after}"));
    }
    Ok("RMBID[2147483648] out of range".to_string())
}

fn pairing(session: &mut CliSession) -> Result<String, String> {
    let bridge_id = session.bridge_id().map_err(describe)?;
    let before = session.remote_id().map_err(describe)?;
    let channel_before = session.radio_channel().map_err(describe)?;
    let peer = bridge_id.wrapping_add(1);

    let result = pair_with(session, peer);
    session
        .set_remote_id(i64::from(before))
        .and_then(|_| session.set_radio_channel(channel_before))
        .map_err(describe)?;

    let channel = result?;
    Ok(format!(
        "paired with {peer} on channel {channel}, restored {before}"
    ))
}

fn pair_with(session: &mut CliSession, peer: i32) -> Result<u8, String> {
    session.set_remote_id(i64::from(peer)).map_err(describe)?;
    let read = session.remote_id().map_err(describe)?;
    if read != peer {
        return Err(format!("wrote remote id {peer}, read back {read}"));
    }
    let channel = session.radio_channel().map_err(describe)?;
    let expected = channel_from_id(peer);
    if channel != expected {
        return Err(format!(
            "channel {channel} after pairing, expected {expected}"
        ));
    }
    Ok(channel)
}

fn unknown_command(session: &mut CliSession) -> Result<String, String> {
    let outcome = session.invoke_raw("NOPE", "", InvokeOptions::default());
    expect_rejected(outcome, DeviceErrorCode::InvalidArgument)?;
    Ok("NOPE[] rejected".to_string())
}

fn streaming(session: &mut CliSession) -> Result<String, String> {
    let sensors: SensorSet = "AB".parse().map_err(describe)?;
    session.start(&sensors).map_err(describe)?;

    let until = Instant::now() + STREAM_WAIT;
    let mut first = None;
    while first.is_none() && Instant::now() < until {
        first = session
            .poll_periodic(Duration::from_millis(100))
            .map_err(describe)?;
    }

    session.stop().map_err(describe)?;
    let window = straggler_window(session.config());
    session
        .drain(window, DrainPolicy::Lenient)
        .map_err(describe)?;

    match first {
        Some(frame) if !frame.fields().is_empty() => Ok(format!("received {}", frame.text())),
        Some(frame) => Err(format!("unreadable frame {}", frame.text())),
        None => Err(format!("no periodic frame within {STREAM_WAIT:?}")),
    }
}

fn expect_rejected<T>(
    outcome: Result<T, SessionError>,
    expected: DeviceErrorCode,
) -> Result<(), String> {
    match outcome {
        Err(SessionError::DeviceRejected { code, .. }) if code == expected => Ok(()),
        Err(SessionError::DeviceRejected { code, .. }) => {
            Err(format!("rejected with {code}, expected {expected}"))
        }
        Err(err) => Err(describe(err)),
        Ok(_) => Err("accepted".to_string()),
    }
}

fn describe(err: SessionError) -> String {
    err.to_string()
}
