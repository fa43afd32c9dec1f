use std::time::Duration;

use ubridge_frame::{IdGenerator, IdLengthPolicy, PeriodicLayout};
use ubridge_session::{
    channel_from_id, Command, DeviceErrorCode, DrainPolicy, EngineState, InvokeOptions, SensorSet,
    Session, SessionConfig, SessionError, SimConfig, SimulatedDevice, MAX_CHANNEL,
};

fn config() -> SessionConfig {
    SessionConfig {
        response_timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(10),
        ..SessionConfig::default()
    }
}

fn session() -> Session<SimulatedDevice> {
    Session::new(SimulatedDevice::default(), config())
}

fn session_with(sim: SimConfig) -> Session<SimulatedDevice> {
    Session::new(SimulatedDevice::new(sim), config())
}

#[test]
fn handshake_reports_version_one_without_backlog() {
    let mut s = session();
    let result = s.handshake().unwrap();
    assert_eq!(result.protocol_version, "1");
    assert!(result.backlog_empty);

    let reply = s.invoke(&Command::Handshake, InvokeOptions::default()).unwrap();
    assert!(reply.backlog.is_empty());
}

#[test]
fn every_channel_round_trips() {
    let mut s = session();
    for channel in 0..=MAX_CHANNEL {
        s.set_radio_channel(channel).unwrap();
        assert_eq!(s.radio_channel().unwrap(), channel);
    }
}

#[test]
fn out_of_range_channel_is_rejected_and_kept() {
    let mut s = Session::new(
        SimulatedDevice::default(),
        SessionConfig {
            validate_arguments: false,
            ..config()
        },
    );
    s.set_radio_channel(7).unwrap();

    let err = s.set_radio_channel(84).unwrap_err();
    assert!(matches!(
        err,
        SessionError::DeviceRejected {
            code: DeviceErrorCode::InvalidArgument,
            ..
        }
    ));
    assert_eq!(s.radio_channel().unwrap(), 7);
}

#[test]
fn period_round_trips_above_floor() {
    let mut s = session();
    for period in [10, 20, 50, 1000] {
        s.set_period(period).unwrap();
        assert_eq!(s.period().unwrap(), period);
    }
}

#[test]
fn period_below_floor_is_rejected_and_kept() {
    let mut s = Session::new(
        SimulatedDevice::default(),
        SessionConfig {
            validate_arguments: false,
            ..config()
        },
    );
    s.set_period(30).unwrap();
    let err = s.set_period(5).unwrap_err();
    assert!(matches!(
        err,
        SessionError::DeviceRejected {
            code: DeviceErrorCode::InvalidArgument,
            ..
        }
    ));
    assert_eq!(s.period().unwrap(), 30);

    // With local validation the same request never leaves the host.
    let mut s = session();
    assert!(matches!(s.set_period(5), Err(SessionError::InvalidArgument(_))));
}

#[test]
fn remote_id_round_trips_within_i32() {
    let mut s = session();
    for id in [0i64, -1, 42, i64::from(i32::MIN), i64::from(i32::MAX)] {
        s.set_remote_id(id).unwrap();
        assert_eq!(i64::from(s.remote_id().unwrap()), id);
    }
}

#[test]
fn remote_id_outside_i32_is_out_of_range() {
    let mut s = Session::new(
        SimulatedDevice::default(),
        SessionConfig {
            validate_arguments: false,
            ..config()
        },
    );
    s.set_remote_id(99).unwrap();
    for id in [i64::from(i32::MAX) + 1, i64::from(i32::MIN) - 1] {
        let err = s.set_remote_id(id).unwrap_err();
        assert!(matches!(
            err,
            SessionError::DeviceRejected {
                code: DeviceErrorCode::OutOfRange,
                ..
            }
        ));
    }
    assert_eq!(s.remote_id().unwrap(), 99);
}

#[test]
fn remote_id_defaults_to_own_id() {
    let mut s = session();
    let own = s.bridge_id().unwrap();
    assert_eq!(s.remote_id().unwrap(), own);
}

#[test]
fn default_channel_derives_from_bridge_id() {
    for id in [0, 83, 12_345, -1, i32::MIN, i32::MAX] {
        let mut s = session_with(SimConfig {
            bridge_id: id,
            ..SimConfig::default()
        });
        let bridge_id = s.bridge_id().unwrap();
        assert_eq!(bridge_id, id);
        assert_eq!(s.radio_channel().unwrap(), channel_from_id(bridge_id));
        assert_eq!(u32::from(channel_from_id(id)), (id as u32) % 83);
    }
}

#[test]
fn read_only_versions() {
    let mut s = session();
    assert_eq!(s.software_version().unwrap(), "0.1.0");
    assert_eq!(s.hardware_version().unwrap(), "2");

    let err = s
        .invoke_raw("SWVER", "9.9.9", InvokeOptions::default())
        .unwrap_err();
    assert!(matches!(err, SessionError::DeviceRejected { .. }));
}

#[test]
fn streaming_start_drain_stop() {
    let mut s = session_with(SimConfig {
        period_ms: 10,
        stop_stragglers: 2,
        ..SimConfig::default()
    });

    let sensors: SensorSet = "PABFMLTS".parse().unwrap();
    let reply = s
        .invoke(&Command::Start(sensors), InvokeOptions::default())
        .unwrap();
    assert_eq!(reply.text(), "");
    assert!(reply.backlog.is_empty());

    let drained = s
        .drain(Duration::from_millis(60), DrainPolicy::Strict)
        .unwrap();
    assert!(!drained.periodic.is_empty());
    assert!(drained
        .periodic
        .iter()
        .all(|f| f.layout() == PeriodicLayout::Readable));
    let keys: Vec<String> = drained.periodic[0]
        .fields()
        .into_iter()
        .map(|f| f.key)
        .collect();
    assert_eq!(
        keys,
        [
            "AX", "AY", "AZ", "CX", "CY", "CZ", "BA", "BB", "BL", "B0", "B1", "B2", "T", "L", "S"
        ]
    );

    let reply = s
        .invoke(
            &Command::Stop,
            InvokeOptions::default().allowing_periodic(true),
        )
        .unwrap();
    assert_eq!(reply.frame.unwrap().body(), "STOP[]");

    // Stragglers after the acknowledgement are periodic, never violations.
    let after = s
        .drain(Duration::from_millis(40), DrainPolicy::Strict)
        .unwrap();
    assert_eq!(after.periodic.len(), 2);
    assert!(after.stray.is_empty());
    assert!(!s.transport().is_streaming());
}

#[test]
fn compact_streaming() {
    let mut s = session_with(SimConfig {
        period_ms: 10,
        ..SimConfig::default()
    });
    s.start_compact(&SensorSet::default()).unwrap();

    let frame = s
        .poll_periodic(Duration::from_millis(200))
        .unwrap()
        .unwrap();
    assert_eq!(frame.layout(), PeriodicLayout::Compact);
    assert_eq!(frame.as_bytes().len(), 13);
    let record = frame.compact().unwrap();
    assert!(record.accel.iter().all(|axis| (-2048..=2047).contains(axis)));

    s.stop().unwrap();
}

#[test]
fn command_while_streaming_sees_backlog() {
    let mut s = session_with(SimConfig {
        period_ms: 10,
        ..SimConfig::default()
    });
    s.start(&"T".parse().unwrap()).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let err = s.radio_channel().unwrap_err();
    assert!(matches!(err, SessionError::UnexpectedPeriodic { count, .. } if count > 0));

    let frames = s.stop().unwrap();
    assert!(!frames.is_empty());
}

#[test]
fn malformed_line_while_pending_is_a_violation() {
    let mut s = session();
    s.transport_mut().inject_line("not a frame");
    let err = s.radio_channel().unwrap_err();
    assert!(
        matches!(err, SessionError::ProtocolViolation { ref line, .. } if line == "not a frame")
    );
    assert_eq!(s.state(), EngineState::Suspect);
    assert!(matches!(s.radio_channel(), Err(SessionError::ConnectionSuspect)));

    // The response to the failed command is still on the line.
    let discarded = s.resync(Duration::from_millis(30)).unwrap();
    assert_eq!(discarded.len(), 1);
    assert!(s.radio_channel().is_ok());
}

#[test]
fn wrapped_responses_are_recovered() {
    let mut s = session();
    s.transport_mut().set_wrap_responses(Some("radio: 3 packets dropped"));
    assert_eq!(s.handshake().unwrap().protocol_version, "1");
    s.set_radio_channel(12).unwrap();
    assert_eq!(s.radio_channel().unwrap(), 12);
}

#[test]
fn wrapped_line_without_pending_id_is_a_violation() {
    let mut s = session();
    s.transport_mut().inject_line("t[diagnostic only]");
    assert!(matches!(
        s.radio_channel(),
        Err(SessionError::ProtocolViolation { .. })
    ));
}

#[test]
fn timeout_reports_command_text() {
    let mut s = session();
    s.transport_mut().set_muted(true);
    let err = s
        .invoke(
            &Command::GetPeriod,
            InvokeOptions::default().with_timeout(Duration::from_millis(60)),
        )
        .unwrap_err();
    match err {
        SessionError::Timeout { command, timeout } => {
            assert!(command.starts_with("C["));
            assert!(command.ends_with("]PER[]"));
            assert_eq!(timeout, Duration::from_millis(60));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(s.state(), EngineState::Idle);
}

#[test]
fn fire_and_forget_returns_no_value() {
    let mut s = session();
    let reply = s
        .invoke(&Command::SetRadioChannel(3), InvokeOptions::fire_and_forget())
        .unwrap();
    assert!(reply.value.is_none());
    assert!(reply.backlog.is_empty());
    assert_eq!(s.transport().channel(), 3);

    // The unread acknowledgement is left for the caller to drain.
    let drained = s
        .drain(Duration::from_millis(30), DrainPolicy::Lenient)
        .unwrap();
    assert_eq!(drained.stray.len(), 1);
}

#[test]
fn ids_of_every_length_are_accepted() {
    let mut s = Session::with_id_generator(
        SimulatedDevice::default(),
        config(),
        IdGenerator::seeded(IdLengthPolicy::Cycle, 11),
    );
    for _ in 0..16 {
        s.handshake().unwrap();
    }
    let lengths: Vec<usize> = s
        .transport()
        .received()
        .iter()
        .map(|line| line.find(']').unwrap() - 2)
        .collect();
    assert_eq!(lengths[..8], [1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn device_info_collects_everything() {
    let mut s = session_with(SimConfig {
        bridge_id: 1000,
        ..SimConfig::default()
    });
    let info = s.device_info().unwrap();
    assert_eq!(info.protocol_version, "1");
    assert_eq!(info.software_version, "0.1.0");
    assert_eq!(info.hardware_version, "2");
    assert_eq!(info.bridge_id, 1000);
    assert_eq!(info.remote_id, 1000);
    assert_eq!(info.radio_channel, channel_from_id(1000));
    assert_eq!(info.period_ms, 20);
}

#[test]
fn pairing_follows_remote_channel() {
    let mut s = session();
    let own = s.bridge_id().unwrap();
    assert_eq!(s.remote_id().unwrap(), own);

    let peer = 3_130_793_464u32 as i32;
    s.set_remote_id(i64::from(peer)).unwrap();
    assert_eq!(s.remote_id().unwrap(), peer);
    assert_eq!(s.radio_channel().unwrap(), channel_from_id(peer));
    assert_eq!(s.radio_channel().unwrap(), 15);

    // The channel can still be overridden after pairing.
    s.set_radio_channel(3).unwrap();
    assert_eq!(s.radio_channel().unwrap(), 3);
    assert_eq!(s.remote_id().unwrap(), peer);
}

#[test]
fn unknown_selector_is_rejected_by_device() {
    let mut s = session();
    for name in ["START", "ZSTART"] {
        let err = s.invoke_raw(name, "X", InvokeOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::DeviceRejected {
                code: DeviceErrorCode::InvalidArgument,
                ..
            }
        ));
        assert!(!s.transport().is_streaming());
    }
    assert_eq!(s.state(), EngineState::Idle);
}
