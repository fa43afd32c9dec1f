use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::id::{is_valid_token, CorrelationId};
use crate::periodic::PeriodicFrame;

/// Leading tag of a command frame.
pub const COMMAND_TAG: &[u8] = b"C[";
/// Leading tag of a response frame.
pub const RESPONSE_TAG: &[u8] = b"R[";
/// Leading tag of a response prefixed with device diagnostics.
pub const WRAPPED_TAG: &[u8] = b"t[";
/// First byte of every periodic frame.
pub const PERIODIC_TAG: u8 = b'P';
/// Name used by the device for rejected commands.
pub const ERROR_NAME: &str = "ERROR";

/// An outgoing command: `C[<id>]<name>[<args>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub id: CorrelationId,
    pub name: String,
    pub args: String,
}

impl CommandFrame {
    /// Build a command frame, validating name and arguments.
    pub fn new(id: CorrelationId, name: &str, args: &str) -> Result<Self> {
        validate_name(name)?;
        validate_args(args)?;
        Ok(Self {
            id,
            name: name.to_string(),
            args: args.to_string(),
        })
    }

    /// Parse a command line (without terminator), as the device sees it.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let rest = line
            .strip_prefix(COMMAND_TAG)
            .ok_or_else(|| FrameError::InvalidCommand(lossy(line)))?;
        let close = rest
            .iter()
            .position(|&b| b == b']')
            .ok_or_else(|| FrameError::InvalidCommand(lossy(line)))?;
        let id = CorrelationId::new(lossy(&rest[..close]))?;
        let (name, args) = parse_body(&rest[close + 1..])?;
        Self::new(id, &name, &args)
    }

    /// Encode into wire bytes, terminator included.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        put_command(&self.id, &self.name, &self.args, &mut buf);
        buf.freeze()
    }

    /// Total wire size of this frame, terminator included.
    pub fn wire_size(&self) -> usize {
        COMMAND_TAG.len() + self.id.len() + 1 + self.name.len() + 1 + self.args.len() + 2
    }

    /// The `NAME[args]` part shared by commands and responses.
    pub fn body(&self) -> String {
        format!("{}[{}]", self.name, self.args)
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C[{}]{}[{}]", self.id, self.name, self.args)
    }
}

/// Encode a command frame into `dst`.
///
/// Wire format (ASCII):
/// ```text
/// C[<id>]<NAME>[<args>]\n
/// ```
pub fn encode_command(
    id: &CorrelationId,
    name: &str,
    args: &str,
    dst: &mut BytesMut,
) -> Result<()> {
    validate_name(name)?;
    validate_args(args)?;
    put_command(id, name, args, dst);
    Ok(())
}

fn put_command(id: &CorrelationId, name: &str, args: &str, dst: &mut BytesMut) {
    dst.reserve(COMMAND_TAG.len() + id.len() + name.len() + args.len() + 4);
    dst.put_slice(COMMAND_TAG);
    dst.put_slice(id.as_str().as_bytes());
    dst.put_u8(b']');
    dst.put_slice(name.as_bytes());
    dst.put_u8(b'[');
    dst.put_slice(args.as_bytes());
    dst.put_slice(b"]\n");
}

/// Split `NAME[args]` into its parts.
///
/// The argument text runs to the final `]`, so nested brackets survive.
pub fn parse_body(body: &[u8]) -> Result<(String, String)> {
    let text = std::str::from_utf8(body).map_err(|_| FrameError::InvalidArguments(lossy(body)))?;
    let open = text
        .find('[')
        .ok_or_else(|| FrameError::InvalidArguments(text.to_string()))?;
    let inner = text[open + 1..]
        .strip_suffix(']')
        .ok_or_else(|| FrameError::InvalidArguments(text.to_string()))?;
    let name = &text[..open];
    validate_name(name)?;
    Ok((name.to_string(), inner.to_string()))
}

fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(FrameError::InvalidCommandName(name.to_string()))
    }
}

fn validate_args(args: &str) -> Result<()> {
    let ok = args
        .bytes()
        .all(|b| (0x20..=0x7E).contains(&b) && b != b'[' && b != b']');
    if ok {
        Ok(())
    } else {
        Err(FrameError::InvalidArguments(args.to_string()))
    }
}

/// The value carried by a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseValue {
    /// Empty value: a pure acknowledgement.
    Ack,
    /// Command-specific value.
    Value(String),
    /// The device rejected the command with this code.
    Error(u32),
}

impl ResponseValue {
    /// Text form as it appeared on the wire.
    pub fn as_wire(&self) -> String {
        match self {
            ResponseValue::Ack => String::new(),
            ResponseValue::Value(value) => value.clone(),
            ResponseValue::Error(code) => format!("{ERROR_NAME}[{code}]"),
        }
    }
}

/// An incoming response: `R[<id>]<name>[<value>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub id: CorrelationId,
    pub name: String,
    pub value: String,
}

impl ResponseFrame {
    /// Parse a response line (without terminator).
    pub fn parse(line: &[u8]) -> Result<Self> {
        let rest = line
            .strip_prefix(RESPONSE_TAG)
            .ok_or_else(|| FrameError::InvalidResponse(lossy(line)))?;
        let (id, body) = split_id(rest).ok_or_else(|| FrameError::InvalidResponse(lossy(line)))?;
        let (name, value) =
            parse_body(body).map_err(|_| FrameError::InvalidResponse(lossy(line)))?;
        Ok(Self { id, name, value })
    }

    /// Decode the value, recognising both rejection forms:
    /// `R[id]RF[ERROR[1]]` and `R[id]ERROR[1]`.
    pub fn decoded(&self) -> ResponseValue {
        if self.name == ERROR_NAME {
            if let Ok(code) = self.value.parse() {
                return ResponseValue::Error(code);
            }
        }
        if let Some(code) = parse_error_value(&self.value) {
            return ResponseValue::Error(code);
        }
        if self.value.is_empty() {
            ResponseValue::Ack
        } else {
            ResponseValue::Value(self.value.clone())
        }
    }

    /// The `NAME[value]` part.
    pub fn body(&self) -> String {
        format!("{}[{}]", self.name, self.value)
    }
}

impl fmt::Display for ResponseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R[{}]{}[{}]", self.id, self.name, self.value)
    }
}

/// Parse an `ERROR[<code>]` value.
pub fn parse_error_value(value: &str) -> Option<u32> {
    value
        .strip_prefix(ERROR_NAME)?
        .strip_prefix('[')?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// How an incoming line relates to the pending exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// The response to the pending command.
    Response(ResponseFrame),
    /// Unsolicited telemetry.
    Periodic(PeriodicFrame),
    /// Anything else: a protocol violation while a command is pending.
    Malformed(Bytes),
}

/// Classify an incoming line against the id of the pending command.
///
/// - `R[<expected>]...` is the response;
/// - `t[...]` is searched for an embedded `R[<expected>]`, and the text from
///   there on is the response;
/// - anything starting with `P` is periodic;
/// - everything else, responses for other ids included, is malformed.
pub fn classify(line: Bytes, expected: &CorrelationId) -> FrameKind {
    let prefix = response_prefix(expected);

    if line.starts_with(&prefix) {
        return match ResponseFrame::parse(&line) {
            Ok(frame) => FrameKind::Response(frame),
            Err(_) => FrameKind::Malformed(line),
        };
    }

    if line.starts_with(WRAPPED_TAG) {
        let found = line
            .windows(prefix.len())
            .position(|window| window == prefix.as_slice());
        return match found.map(|start| ResponseFrame::parse(&line[start..])) {
            Some(Ok(frame)) => {
                trace!(line = %lossy(&line), "unwrapped diagnostic response");
                FrameKind::Response(frame)
            }
            _ => FrameKind::Malformed(line),
        };
    }

    if line.first() == Some(&PERIODIC_TAG) {
        return FrameKind::Periodic(PeriodicFrame::parse(line));
    }

    FrameKind::Malformed(line)
}

fn response_prefix(id: &CorrelationId) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(RESPONSE_TAG.len() + id.len() + 1);
    prefix.extend_from_slice(RESPONSE_TAG);
    prefix.extend_from_slice(id.as_str().as_bytes());
    prefix.push(b']');
    prefix
}

fn split_id(rest: &[u8]) -> Option<(CorrelationId, &[u8])> {
    let close = rest.iter().position(|&b| b == b']')?;
    let token = &rest[..close];
    if !is_valid_token(token) {
        return None;
    }
    let id = CorrelationId::new(String::from_utf8_lossy(token).into_owned()).ok()?;
    Some((id, &rest[close + 1..]))
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use crate::id::{IdGenerator, IdLengthPolicy};
    use crate::periodic::PeriodicLayout;

    use super::*;

    fn id(token: &str) -> CorrelationId {
        CorrelationId::new(token).unwrap()
    }

    #[test]
    fn encode_command_wire_format() {
        let mut buf = BytesMut::new();
        encode_command(&id("3A"), "RF", "42", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"C[3A]RF[42]\n");
    }

    #[test]
    fn encode_command_empty_args() {
        let frame = CommandFrame::new(id("F"), "HS", "").unwrap();
        let wire = frame.encode();
        assert_eq!(wire.as_ref(), b"C[F]HS[]\n");
        assert_eq!(frame.wire_size(), wire.len());
        assert_eq!(frame.to_string(), "C[F]HS[]");
        assert_eq!(frame.body(), "HS[]");
    }

    #[test]
    fn encode_rejects_bad_names_and_args() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_command(&id("1"), "rf", "", &mut buf),
            Err(FrameError::InvalidCommandName(_))
        ));
        assert!(matches!(
            encode_command(&id("1"), "", "", &mut buf),
            Err(FrameError::InvalidCommandName(_))
        ));
        assert!(matches!(
            encode_command(&id("1"), "RF", "4\n2", &mut buf),
            Err(FrameError::InvalidArguments(_))
        ));
        assert!(matches!(
            encode_command(&id("1"), "RF", "]", &mut buf),
            Err(FrameError::InvalidArguments(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn command_parse_roundtrip() {
        let frame = CommandFrame::parse(b"C[00FF]START[PABFMLTS]").unwrap();
        assert_eq!(frame.id.as_str(), "00FF");
        assert_eq!(frame.name, "START");
        assert_eq!(frame.args, "PABFMLTS");
        assert!(CommandFrame::parse(b"C[1]HS").is_err());
    }

    #[test]
    fn command_parse_names_the_fault() {
        assert!(matches!(
            CommandFrame::parse(b"R[1]HS[]"),
            Err(FrameError::InvalidCommand(_))
        ));
        assert!(matches!(
            CommandFrame::parse(b"C[12"),
            Err(FrameError::InvalidCommand(_))
        ));
        assert!(matches!(
            CommandFrame::parse(b"C[xyz]HS[]"),
            Err(FrameError::InvalidCorrelationId(ref id)) if id == "xyz"
        ));
        assert!(matches!(
            CommandFrame::parse(b"C[]HS[]"),
            Err(FrameError::InvalidCorrelationId(_))
        ));
        assert!(matches!(
            CommandFrame::parse(b"C[1]hs[]"),
            Err(FrameError::InvalidCommandName(_))
        ));
    }

    #[test]
    fn response_parse_with_value() {
        let frame = ResponseFrame::parse(b"R[1F]RF[42]").unwrap();
        assert_eq!(frame.id.as_str(), "1F");
        assert_eq!(frame.name, "RF");
        assert_eq!(frame.value, "42");
        assert_eq!(frame.decoded(), ResponseValue::Value("42".to_string()));
        assert_eq!(frame.body(), "RF[42]");
    }

    #[test]
    fn response_ack_and_errors() {
        let ack = ResponseFrame::parse(b"R[2]STOP[]").unwrap();
        assert_eq!(ack.decoded(), ResponseValue::Ack);

        let nested = ResponseFrame::parse(b"R[2]RF[ERROR[1]]").unwrap();
        assert_eq!(nested.value, "ERROR[1]");
        assert_eq!(nested.decoded(), ResponseValue::Error(1));

        let named = ResponseFrame::parse(b"R[2]ERROR[2]").unwrap();
        assert_eq!(named.decoded(), ResponseValue::Error(2));
        assert_eq!(ResponseValue::Error(2).as_wire(), "ERROR[2]");
    }

    #[test]
    fn response_parse_rejects_garbage() {
        for line in [
            &b"R[]HS[1]"[..],
            b"R[1]HS[1",
            b"R[1]HS",
            b"R[abc]HS[1]",
            b"R[1]hs[1]",
            b"X[1]HS[1]",
        ] {
            assert!(ResponseFrame::parse(line).is_err(), "{:?}", lossy(line));
        }
    }

    #[test]
    fn parse_error_value_forms() {
        assert_eq!(parse_error_value("ERROR[1]"), Some(1));
        assert_eq!(parse_error_value("ERROR[12]"), Some(12));
        assert_eq!(parse_error_value("ERROR[x]"), None);
        assert_eq!(parse_error_value("ERROR"), None);
        assert_eq!(parse_error_value("42"), None);
    }

    #[test]
    fn classify_matching_response() {
        let kind = classify(Bytes::from_static(b"R[A1]HS[1]"), &id("A1"));
        assert!(matches!(kind, FrameKind::Response(ref f) if f.value == "1"));
    }

    #[test]
    fn classify_other_id_is_malformed() {
        let kind = classify(Bytes::from_static(b"R[A2]HS[1]"), &id("A1"));
        assert!(matches!(kind, FrameKind::Malformed(_)));

        // A shorter pending id must not match a longer one sharing its prefix.
        let kind = classify(Bytes::from_static(b"R[A1]HS[1]"), &id("A"));
        assert!(matches!(kind, FrameKind::Malformed(_)));
    }

    #[test]
    fn classify_wrapped_response() {
        let line = Bytes::from_static(b"t[radio busy] retry R[7C]RF[12]");
        let kind = classify(line, &id("7C"));
        match kind {
            FrameKind::Response(frame) => {
                assert_eq!(frame.id.as_str(), "7C");
                assert_eq!(frame.body(), "RF[12]");
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn classify_wrapped_without_id_is_malformed() {
        let kind = classify(Bytes::from_static(b"t[diag] R[99]RF[12]"), &id("7C"));
        assert!(matches!(kind, FrameKind::Malformed(_)));
    }

    #[test]
    fn classify_periodic_layouts() {
        let readable = classify(Bytes::from_static(b"P[AX[1],AY[2]]"), &id("1"));
        assert!(
            matches!(readable, FrameKind::Periodic(ref p) if p.layout() == PeriodicLayout::Readable)
        );

        let compact = classify(Bytes::from_static(b"P0010020031010"), &id("1"));
        assert!(matches!(compact, FrameKind::Periodic(_)));
    }

    #[test]
    fn classify_unknown_lines_are_malformed() {
        for line in [&b""[..], b"hello", b"ERROR[1]", b"C[1]HS[]"] {
            let kind = classify(Bytes::copy_from_slice(line), &id("1"));
            assert!(matches!(kind, FrameKind::Malformed(_)), "{:?}", lossy(line));
        }
    }

    #[test]
    fn echoed_response_recovers_id_of_every_length() {
        let mut generator = IdGenerator::seeded(IdLengthPolicy::Cycle, 3);
        for _ in 0..16 {
            let command = CommandFrame::new(generator.next_id(), "RMBID", "-12345").unwrap();
            let wire = command.encode();
            let echoed = format!(
                "R{}",
                std::str::from_utf8(&wire[1..wire.len() - 1]).unwrap()
            );

            match classify(Bytes::from(echoed), &command.id) {
                FrameKind::Response(frame) => {
                    assert_eq!(frame.id, command.id);
                    assert_eq!(frame.name, "RMBID");
                    assert_eq!(frame.value, "-12345");
                }
                other => panic!("expected response, got {other:?}"),
            }
        }
    }
}
