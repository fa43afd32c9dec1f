use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{LineTransport, ReadTimeout};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 256;

/// Default maximum line length accepted before a terminator is seen.
pub const DEFAULT_MAX_LINE: usize = 1024;

/// Buffers a byte link and splits it into lines.
///
/// Handles partial reads internally: callers always get complete lines.
pub struct LineStream<T> {
    inner: T,
    buf: BytesMut,
    max_line: usize,
}

impl<T: Read + Write + ReadTimeout> LineStream<T> {
    /// Wrap a link with the default maximum line length.
    pub fn new(inner: T) -> Self {
        Self::with_max_line(inner, DEFAULT_MAX_LINE)
    }

    /// Wrap a link with an explicit maximum line length.
    pub fn with_max_line(inner: T, max_line: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_line,
        }
    }

    /// Borrow the underlying link.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying link.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the stream and return the link. Buffered bytes are lost.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Number of bytes received but not yet returned as a line.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    fn fill(&mut self, deadline: Instant) -> Result<bool> {
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        self.inner.set_read_timeout(deadline - now)?;

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match self.inner.read(&mut chunk) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(true),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(true)
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

impl<T: Read + Write + ReadTimeout> LineTransport for LineStream<T> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = split_line(&mut self.buf) {
                trace!(len = line.len(), "line received");
                return Ok(Some(line));
            }

            if self.buf.len() > self.max_line {
                let len = self.buf.len();
                self.buf.clear();
                return Err(TransportError::LineTooLong {
                    len,
                    max: self.max_line,
                });
            }

            if !self.fill(deadline)? {
                return Ok(None);
            }
        }
    }
}

/// Split one complete line off the front of `buf`, without its terminator.
///
/// Returns `None` if no `\n` has been received yet.
pub fn split_line(buf: &mut BytesMut) -> Option<Bytes> {
    let end = buf.iter().position(|&b| b == b'\n')?;
    let mut line = buf.split_to(end);
    buf.advance(1);
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    Some(line.freeze())
}

impl<T> std::fmt::Debug for LineStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStream")
            .field("buffered", &self.buf.len())
            .field("max_line", &self.max_line)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// Serves scripted read results, then times out forever.
    #[derive(Default)]
    struct ScriptedLink {
        reads: VecDeque<std::io::Result<Vec<u8>>>,
        written: Vec<u8>,
        timeouts: Vec<Duration>,
    }

    impl ScriptedLink {
        fn with_reads(reads: Vec<std::io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: reads.into(),
                ..Self::default()
            }
        }
    }

    impl Read for ScriptedLink {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Some(Err(err)) => Err(err),
                None => {
                    std::thread::sleep(Duration::from_millis(1));
                    Err(std::io::Error::from(ErrorKind::TimedOut))
                }
            }
        }
    }

    impl Write for ScriptedLink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl ReadTimeout for ScriptedLink {
        fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
            self.timeouts.push(timeout);
            Ok(())
        }
    }

    #[test]
    fn split_line_strips_crlf() {
        let mut buf = BytesMut::from(&b"R[A]HS[1]\r\nP[AX[1]]\n"[..]);
        assert_eq!(split_line(&mut buf).unwrap().as_ref(), b"R[A]HS[1]");
        assert_eq!(split_line(&mut buf).unwrap().as_ref(), b"P[AX[1]]");
        assert!(split_line(&mut buf).is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn split_line_keeps_partial_tail() {
        let mut buf = BytesMut::from(&b"R[A]HS[1]\nR[B"[..]);
        assert!(split_line(&mut buf).is_some());
        assert!(split_line(&mut buf).is_none());
        assert_eq!(buf.as_ref(), b"R[B");
    }

    #[test]
    fn reads_line_split_across_chunks() {
        let link = ScriptedLink::with_reads(vec![
            Ok(b"R[1F]".to_vec()),
            Ok(b"RF[4".to_vec()),
            Ok(b"2]\r\n".to_vec()),
        ]);
        let mut stream = LineStream::new(link);

        let line = stream
            .read_line(Duration::from_millis(100))
            .unwrap()
            .unwrap();
        assert_eq!(line.as_ref(), b"R[1F]RF[42]");
        assert_eq!(stream.buffered_len(), 0);
    }

    #[test]
    fn several_lines_in_one_chunk() {
        let link = ScriptedLink::with_reads(vec![Ok(b"P[T[21]]\nP[T[22]]\nR[7]".to_vec())]);
        let mut stream = LineStream::new(link);
        let timeout = Duration::from_millis(50);

        assert_eq!(stream.read_line(timeout).unwrap().unwrap().as_ref(), b"P[T[21]]");
        assert_eq!(stream.read_line(timeout).unwrap().unwrap().as_ref(), b"P[T[22]]");
        assert!(stream.read_line(timeout).unwrap().is_none());
        assert_eq!(stream.buffered_len(), 4);
    }

    #[test]
    fn timeout_returns_none_not_error() {
        let mut stream = LineStream::new(ScriptedLink::default());
        let started = Instant::now();
        let line = stream.read_line(Duration::from_millis(20)).unwrap();
        assert!(line.is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn read_timeout_is_bounded_by_deadline() {
        let mut stream = LineStream::new(ScriptedLink::default());
        stream.read_line(Duration::from_millis(10)).unwrap();
        let link = stream.into_inner();
        assert!(!link.timeouts.is_empty());
        assert!(link
            .timeouts
            .iter()
            .all(|t| *t <= Duration::from_millis(10)));
    }

    #[test]
    fn interrupted_and_would_block_are_retried() {
        let link = ScriptedLink::with_reads(vec![
            Err(std::io::Error::from(ErrorKind::Interrupted)),
            Err(std::io::Error::from(ErrorKind::WouldBlock)),
            Ok(b"R[A]STOP[]\n".to_vec()),
        ]);
        let mut stream = LineStream::new(link);
        let line = stream.read_line(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(line.as_ref(), b"R[A]STOP[]");
    }

    #[test]
    fn eof_is_closed() {
        let link = ScriptedLink::with_reads(vec![Ok(Vec::new())]);
        let mut stream = LineStream::new(link);
        let err = stream.read_line(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn other_io_errors_propagate() {
        let link = ScriptedLink::with_reads(vec![Err(std::io::Error::from(
            ErrorKind::BrokenPipe,
        ))]);
        let mut stream = LineStream::new(link);
        let err = stream.read_line(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TransportError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn oversized_line_rejected_and_buffer_reset() {
        let link = ScriptedLink::with_reads(vec![Ok(vec![b'x'; 40]), Ok(b"R[1]HS[1]\n".to_vec())]);
        let mut stream = LineStream::with_max_line(link, 16);
        let err = stream.read_line(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TransportError::LineTooLong { len: 40, max: 16 }));
        assert_eq!(stream.buffered_len(), 0);

        let line = stream.read_line(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(line.as_ref(), b"R[1]HS[1]");
    }

    #[test]
    fn write_bytes_reaches_link() {
        let mut stream = LineStream::new(ScriptedLink::default());
        stream.write_bytes(b"C[A]HS[]\n").unwrap();
        assert_eq!(stream.get_ref().written, b"C[A]HS[]\n");
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut host = LineStream::new(left);
        let mut device = LineStream::new(right);

        host.write_bytes(b"C[3C]RF[]\n").unwrap();
        let command = device.read_line(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(command.as_ref(), b"C[3C]RF[]");

        device.write_bytes(b"R[3C]RF[7]\r\n").unwrap();
        let response = host.read_line(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(response.as_ref(), b"R[3C]RF[7]");
    }

    #[test]
    #[cfg(unix)]
    fn socket_pair_times_out_quietly() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut host = LineStream::new(left);
        assert!(host
            .read_line(Duration::from_millis(15))
            .unwrap()
            .is_none());
    }
}
