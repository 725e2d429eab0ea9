//! Newline-framed serial transport.
//!
//! [`SerialConnection`] owns the open port for its whole lifetime; dropping it
//! closes the port, so every exit path out of a session (return, `?`,
//! cancellation) releases the device.
//!
//! # Timeouts
//!
//! A read timeout of [`Duration::ZERO`] makes [`read_line`](LineTransport::read_line)
//! a non-blocking poll: it returns an empty string immediately if no complete
//! line is buffered. A positive timeout blocks up to that long per read call.
//!
//! # Reset latency
//!
//! Opening the port toggles DTR, which resets most Arduino-style boards. The
//! firmware needs about two seconds before it will answer, so callers should
//! wait [`RESET_SETTLE`] after [`SerialConnection::open`] before the first
//! exchange.

use std::io::{self, ErrorKind, Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, trace, warn};

use super::error::{MountError, MountResult};

/// Time for the controller to come out of reset after the port opens.
pub const RESET_SETTLE: Duration = Duration::from_secs(2);

/// Longest partial frame kept while waiting for a newline.
pub const MAX_LINE_LEN: usize = 256;

/// Line-oriented request/response primitives.
pub trait LineTransport {
    /// Write one line. A trailing `\n` is appended if missing.
    fn write_line(&mut self, line: &str) -> MountResult<()>;

    /// Read one line with the delimiter and surrounding whitespace removed.
    ///
    /// Returns an empty string if no complete line arrived in time.
    fn read_line(&mut self) -> MountResult<String>;
}

/// An open, exclusively owned serial connection.
///
/// Generic over the byte stream so framing can be exercised against an
/// in-memory stream; on hardware it wraps a `Box<dyn SerialPort>`.
pub struct SerialConnection<S = Box<dyn SerialPort>> {
    stream: S,
    device: String,
    rx_buffer: Vec<u8>,
}

impl SerialConnection {
    /// Open `device` at `baud_rate` with the given read timeout.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::Connection`] if the port is missing, busy, or not
    /// accessible.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use hardware::mount::{LineTransport, SerialConnection, BAUD_RATE, RESET_SETTLE};
    ///
    /// let mut conn = SerialConnection::open("/dev/ttyACM0", BAUD_RATE, Duration::from_secs(2))?;
    /// std::thread::sleep(RESET_SETTLE);
    /// conn.write_line("PING")?;
    /// println!("{}", conn.read_line()?);
    /// # Ok::<(), hardware::mount::MountError>(())
    /// ```
    pub fn open(device: &str, baud_rate: u32, timeout: Duration) -> MountResult<Self> {
        let port = serialport::new(device, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| MountError::Connection {
                device: device.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Opened {device} at {baud_rate} baud, timeout {timeout:?}");
        Ok(Self::from_stream(port, device))
    }
}

impl<S> SerialConnection<S> {
    /// Wrap an already-open byte stream.
    pub fn from_stream(stream: S, device: impl Into<String>) -> Self {
        Self {
            stream,
            device: device.into(),
            rx_buffer: Vec::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Name of the device this connection was opened on.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Borrow the underlying stream.
    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Take the next complete frame out of the receive buffer.
    fn take_frame(&mut self) -> Option<String> {
        let pos = self.rx_buffer.iter().position(|&b| b == b'\n')?;
        let frame: Vec<u8> = self.rx_buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&frame[..pos]).trim().to_string();
        trace!("{} recv: {:?}", self.device, line);
        Some(line)
    }
}

impl<S: Read + Write> LineTransport for SerialConnection<S> {
    fn write_line(&mut self, line: &str) -> MountResult<()> {
        let mut msg = line.to_string();
        if !msg.ends_with('\n') {
            msg.push('\n');
        }

        debug!("{} send: {:?}", self.device, msg.trim_end());
        self.stream.write_all(msg.as_bytes())?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> MountResult<String> {
        let mut buf = [0u8; 64];

        loop {
            if let Some(line) = self.take_frame() {
                return Ok(line);
            }

            match self.stream.read(&mut buf) {
                Ok(0) => return Err(io::Error::from(ErrorKind::UnexpectedEof).into()),
                Ok(n) => {
                    self.rx_buffer.extend_from_slice(&buf[..n]);
                    if self.rx_buffer.len() > MAX_LINE_LEN && !self.rx_buffer.contains(&b'\n') {
                        warn!(
                            "{}: discarding {} bytes without line delimiter",
                            self.device,
                            self.rx_buffer.len()
                        );
                        self.rx_buffer.clear();
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    return Ok(String::new());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<S> Drop for SerialConnection<S> {
    fn drop(&mut self) {
        debug!("Released {}", self.device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory stream that hands out reads in fixed chunks, then times out.
    #[derive(Default)]
    struct ChunkedStream {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
    }

    impl ChunkedStream {
        fn with_chunks(chunks: &[&[u8]]) -> Self {
            Self {
                reads: chunks.iter().map(|c| Ok(c.to_vec())).collect(),
                written: Vec::new(),
            }
        }
    }

    impl Read for ChunkedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.reads.push_front(Ok(chunk[n..].to_vec()));
                    }
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(ErrorKind::TimedOut, "timed out")),
            }
        }
    }

    impl Write for ChunkedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_line_appends_newline() {
        let mut conn = SerialConnection::from_stream(ChunkedStream::default(), "mem");
        conn.write_line("GET_MPU").unwrap();
        conn.write_line("1.0,2.0\n").unwrap();
        assert_eq!(conn.stream().written, b"GET_MPU\n1.0,2.0\n");
    }

    #[test]
    fn test_read_line_reassembles_split_frames() {
        let stream = ChunkedStream::with_chunks(&[b"MPU:1", b"2.0,3.", b"5\r\nPO", b"NG\n"]);
        let mut conn = SerialConnection::from_stream(stream, "mem");
        assert_eq!(conn.read_line().unwrap(), "MPU:12.0,3.5");
        assert_eq!(conn.read_line().unwrap(), "PONG");
    }

    #[test]
    fn test_read_line_timeout_returns_empty() {
        let mut conn = SerialConnection::from_stream(ChunkedStream::default(), "mem");
        assert_eq!(conn.read_line().unwrap(), "");
    }

    #[test]
    fn test_partial_frame_survives_timeout() {
        let stream = ChunkedStream::with_chunks(&[b"MPU:1.0,"]);
        let mut conn = SerialConnection::from_stream(stream, "mem");
        assert_eq!(conn.read_line().unwrap(), "");

        conn.stream.reads.push_back(Ok(b"2.0\n".to_vec()));
        assert_eq!(conn.read_line().unwrap(), "MPU:1.0,2.0");
    }

    #[test]
    fn test_oversized_garbage_is_discarded() {
        let garbage = vec![b'x'; MAX_LINE_LEN + 1];
        let stream = ChunkedStream::with_chunks(&[&garbage, b"PONG\n"]);
        let mut conn = SerialConnection::from_stream(stream, "mem");
        assert_eq!(conn.read_line().unwrap(), "PONG");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let stream = ChunkedStream::with_chunks(&[b"MPU:\xff,1\n"]);
        let mut conn = SerialConnection::from_stream(stream, "mem");
        assert_eq!(conn.read_line().unwrap(), "MPU:\u{FFFD},1");
    }

    #[test]
    fn test_hard_read_error_propagates() {
        let mut stream = ChunkedStream::default();
        stream
            .reads
            .push_back(Err(io::Error::new(ErrorKind::BrokenPipe, "unplugged")));
        let mut conn = SerialConnection::from_stream(stream, "mem");
        assert!(matches!(conn.read_line(), Err(MountError::Io(_))));
    }

    #[test]
    fn test_eof_is_io_error() {
        let stream = ChunkedStream::with_chunks(&[b"MPU:1.0,2.0\n", b""]);
        let mut conn = SerialConnection::from_stream(stream, "mem");
        assert_eq!(conn.read_line().unwrap(), "MPU:1.0,2.0");
        match conn.read_line() {
            Err(MountError::Io(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_open_missing_device_is_connection_error() {
        let result = SerialConnection::open(
            "/dev/this-port-does-not-exist",
            9600,
            Duration::from_millis(10),
        );
        assert!(matches!(result, Err(MountError::Connection { .. })));
    }
}
