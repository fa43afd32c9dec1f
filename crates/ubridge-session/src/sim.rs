//! In-process stand-in for a bridge.
//!
//! [`SimulatedDevice`] answers the command catalog the way the firmware
//! does and streams periodic frames on wall-clock time, so sessions can be
//! exercised without hardware. A few switches inject the faults seen on
//! real links: diagnostic text in front of responses, lost responses, and
//! arbitrary lines.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};
use ubridge_frame::{CommandFrame, CompactRecord, Field, PeriodicFrame};
use ubridge_transport::{split_line, LineTransport};

use crate::catalog::{
    channel_from_id, Sensor, SensorSet, DEFAULT_MIN_PERIOD_MS, MAX_CHANNEL, PROTOCOL_VERSION,
};

/// Id of the simulated bridge unless configured otherwise.
pub const DEFAULT_SIM_ID: i32 = -1_794_106_052;
/// Streaming period after power-up.
pub const DEFAULT_PERIOD_MS: u32 = 20;

// Periods a slow reader may fall behind before frames are dropped.
const MAX_CATCH_UP: u32 = 64;

// Field groups appear in this order regardless of selector order.
const FIELD_ORDER: [Sensor; 8] = [
    Sensor::Accelerometer,
    Sensor::Magnetometer,
    Sensor::Buttons,
    Sensor::Logo,
    Sensor::Pins,
    Sensor::Temperature,
    Sensor::Light,
    Sensor::Sound,
];

/// Power-up state and behaviour of a [`SimulatedDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    pub bridge_id: i32,
    pub period_ms: u32,
    /// Shortest period `PER` accepts.
    pub min_period_ms: u32,
    pub software_version: String,
    pub hardware_version: String,
    /// Frames still emitted after the `STOP` acknowledgement.
    pub stop_stragglers: usize,
    /// Seed for sensor readings.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            bridge_id: DEFAULT_SIM_ID,
            period_ms: DEFAULT_PERIOD_MS,
            min_period_ms: DEFAULT_MIN_PERIOD_MS,
            software_version: "0.1.0".to_string(),
            hardware_version: "2".to_string(),
            stop_stragglers: 0,
            seed: 0x5EED,
        }
    }
}

#[derive(Debug, Clone)]
enum StreamMode {
    Readable(SensorSet),
    Compact,
}

/// A simulated bridge, usable anywhere a [`LineTransport`] is.
#[derive(Debug)]
pub struct SimulatedDevice {
    config: SimConfig,
    channel: u8,
    period: Duration,
    remote_id: i32,
    stream: Option<StreamMode>,
    next_frame: Instant,
    input: BytesMut,
    output: VecDeque<Bytes>,
    received: Vec<String>,
    wrap: Option<String>,
    muted: bool,
    rng: StdRng,
}

impl SimulatedDevice {
    pub fn new(config: SimConfig) -> Self {
        Self {
            channel: channel_from_id(config.bridge_id),
            period: Duration::from_millis(u64::from(config.period_ms)),
            remote_id: config.bridge_id,
            stream: None,
            next_frame: Instant::now(),
            input: BytesMut::new(),
            output: VecDeque::new(),
            received: Vec::new(),
            wrap: None,
            muted: false,
            rng: StdRng::seed_from_u64(config.seed),
            config,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn period_ms(&self) -> u32 {
        u32::try_from(self.period.as_millis()).unwrap_or(u32::MAX)
    }

    pub fn remote_id(&self) -> i32 {
        self.remote_id
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Command lines received so far, without terminators.
    pub fn received(&self) -> &[String] {
        &self.received
    }

    /// Prefix every response with `t[<text>] `.
    pub fn set_wrap_responses(&mut self, text: Option<&str>) {
        self.wrap = text.map(str::to_string);
    }

    /// Swallow responses; commands still take effect.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Queue an arbitrary line for the host.
    pub fn inject_line(&mut self, line: &str) {
        self.output.push_back(Bytes::from(line.to_string()));
    }

    pub fn set_stop_stragglers(&mut self, count: usize) {
        self.config.stop_stragglers = count;
    }

    fn handle_line(&mut self, line: &[u8]) {
        let text = String::from_utf8_lossy(line).into_owned();
        let frame = match CommandFrame::parse(line) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(line = %text, error = %err, "sim ignoring unparsable command");
                return;
            }
        };
        trace!(command = %text, "sim received");
        self.received.push(text);

        let value = match frame.name.as_str() {
            "HS" => Ok(PROTOCOL_VERSION.to_string()),
            "RF" => self.radio_channel(&frame.args),
            "PER" => self.period(&frame.args),
            "SWVER" => read_only(&frame.args, &self.config.software_version),
            "HWVER" => read_only(&frame.args, &self.config.hardware_version),
            "MBID" => read_only(&frame.args, &self.config.bridge_id.to_string()),
            "RMBID" => self.remote(&frame.args),
            "START" => self.start(&frame.args, false),
            "ZSTART" => self.start(&frame.args, true),
            "STOP" => {
                self.stop();
                Ok(String::new())
            }
            _ => {
                self.respond(format!("R[{}]ERROR[1]", frame.id));
                return;
            }
        };

        let value = value.unwrap_or_else(|code| format!("ERROR[{code}]"));
        self.respond(format!("R[{}]{}[{}]", frame.id, frame.name, value));

        if frame.name == "STOP" {
            for _ in 0..self.config.stop_stragglers {
                let line = self.sample_frame(&StreamMode::Readable(SensorSet::all()));
                self.output.push_back(line);
            }
        }
    }

    fn respond(&mut self, response: String) {
        if self.muted {
            trace!(response = %response, "sim muted");
            return;
        }
        let line = match &self.wrap {
            Some(text) => format!("t[{text}] {response}"),
            None => response,
        };
        self.output.push_back(Bytes::from(line));
    }

    fn radio_channel(&mut self, args: &str) -> Result<String, u32> {
        if !args.is_empty() {
            match args.parse::<u8>() {
                Ok(channel) if channel <= MAX_CHANNEL => self.channel = channel,
                _ => return Err(1),
            }
        }
        Ok(self.channel.to_string())
    }

    fn period(&mut self, args: &str) -> Result<String, u32> {
        if !args.is_empty() {
            match args.parse::<u32>() {
                Ok(ms) if ms >= self.config.min_period_ms => {
                    self.period = Duration::from_millis(u64::from(ms));
                }
                _ => return Err(1),
            }
        }
        Ok(self.period_ms().to_string())
    }

    fn remote(&mut self, args: &str) -> Result<String, u32> {
        if !args.is_empty() {
            let id: i64 = args.parse().map_err(|_| 1u32)?;
            self.remote_id = i32::try_from(id).map_err(|_| 2u32)?;
            // Pairing retunes the radio to the peer's channel.
            self.channel = channel_from_id(self.remote_id);
        }
        Ok(self.remote_id.to_string())
    }

    fn start(&mut self, args: &str, compact: bool) -> Result<String, u32> {
        let sensors: SensorSet = args.parse().map_err(|_| 1u32)?;
        self.stream = Some(if compact {
            StreamMode::Compact
        } else {
            StreamMode::Readable(sensors)
        });
        self.next_frame = Instant::now() + self.period;
        Ok(String::new())
    }

    fn stop(&mut self) {
        // The frame already queued in the UART goes out before the ack.
        if let Some(mode) = self.stream.take() {
            let line = self.sample_frame(&mode);
            self.output.push_back(line);
        }
    }

    fn emit_due_frames(&mut self, now: Instant) {
        let Some(mode) = self.stream.clone() else {
            return;
        };
        if now.saturating_duration_since(self.next_frame) > self.period * MAX_CATCH_UP {
            self.next_frame = now;
        }
        while self.next_frame <= now {
            let line = self.sample_frame(&mode);
            self.output.push_back(line);
            self.next_frame += self.period;
        }
    }

    fn sample_frame(&mut self, mode: &StreamMode) -> Bytes {
        match mode {
            StreamMode::Compact => CompactRecord {
                accel: [self.axis(), self.axis(), self.axis()],
                button_a: self.rng.gen_bool(0.1),
                button_b: self.rng.gen_bool(0.1),
                logo: self.rng.gen_bool(0.05),
            }
            .encode(),
            StreamMode::Readable(sensors) => {
                let mut fields = Vec::new();
                for sensor in FIELD_ORDER.into_iter().filter(|s| sensors.contains(*s)) {
                    for key in sensor.field_keys() {
                        let value = self.reading(sensor);
                        fields.push(Field::new(*key, value));
                    }
                }
                PeriodicFrame::readable(&fields).as_bytes().clone()
            }
        }
    }

    fn axis(&mut self) -> i16 {
        self.rng.gen_range(-1100..=1100)
    }

    fn reading(&mut self, sensor: Sensor) -> i32 {
        match sensor {
            Sensor::Accelerometer => i32::from(self.axis()),
            Sensor::Magnetometer => self.rng.gen_range(-40_000..=40_000),
            Sensor::Buttons | Sensor::Logo | Sensor::Pins => i32::from(self.rng.gen_bool(0.1)),
            Sensor::Temperature => self.rng.gen_range(18..=26),
            Sensor::Light | Sensor::Sound => self.rng.gen_range(0..=255),
        }
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

fn read_only(args: &str, value: &str) -> Result<String, u32> {
    if args.is_empty() {
        Ok(value.to_string())
    } else {
        Err(1)
    }
}

impl LineTransport for SimulatedDevice {
    fn write_bytes(&mut self, bytes: &[u8]) -> ubridge_transport::Result<()> {
        // Frames due before the command was received precede its response.
        self.emit_due_frames(Instant::now());
        self.input.extend_from_slice(bytes);
        while let Some(line) = split_line(&mut self.input) {
            self.handle_line(&line);
        }
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> ubridge_transport::Result<Option<Bytes>> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            self.emit_due_frames(now);
            if let Some(line) = self.output.pop_front() {
                return Ok(Some(line));
            }
            if now >= deadline {
                return Ok(None);
            }
            let wake = match self.stream {
                Some(_) => deadline.min(self.next_frame),
                None => deadline,
            };
            std::thread::sleep(wake.saturating_duration_since(now));
        }
    }
}
