//! MJPEG-over-HTTP network camera.
//!
//! The camera answers a `GET` with a `multipart/x-mixed-replace` body of
//! JPEG images. Frames are cut out of the byte stream on the JPEG SOI
//! (`FF D8`) and EOI (`FF D9`) markers, so part headers and boundaries are
//! skipped without being parsed.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info};
use url::Url;

use crate::device::CaptureDevice;
use crate::error::CaptureError;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const READ_CHUNK: usize = 16 * 1024;
const MAX_HEADER_LINES: usize = 64;

pub struct NetworkStream {
    uri: String,
    read_timeout: Duration,
    max_frame_bytes: usize,
    conn: Option<BufReader<TcpStream>>,
    pending: BytesMut,
}

impl NetworkStream {
    pub fn new(uri: impl Into<String>, read_timeout: Duration, max_frame_bytes: usize) -> Self {
        Self {
            uri: uri.into(),
            read_timeout,
            max_frame_bytes,
            conn: None,
            pending: BytesMut::new(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn open_error(&self, reason: impl Into<String>) -> CaptureError {
        CaptureError::DeviceOpen {
            target: self.uri.clone(),
            reason: reason.into(),
        }
    }

    fn connect(&self) -> Result<BufReader<TcpStream>, CaptureError> {
        let url = Url::parse(&self.uri).map_err(|e| self.open_error(e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| self.open_error("missing host"))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| self.open_error("missing port"))?;

        let addrs = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| self.open_error(format!("resolve failed: {e}")))?;

        let mut last_error = None;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.read_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }
        let mut stream = stream.ok_or_else(|| match last_error {
            Some(e) => self.open_error(format!("connect failed: {e}")),
            None => self.open_error("no addresses resolved"),
        })?;

        stream
            .set_read_timeout(Some(self.read_timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.read_timeout)))
            .map_err(|e| self.open_error(e.to_string()))?;

        let path = &url[url::Position::BeforePath..];
        let request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}:{port}\r\n\
             User-Agent: maskvakt\r\n\
             Accept: multipart/x-mixed-replace, image/jpeg\r\n\
             Connection: keep-alive\r\n\r\n"
        );
        stream
            .write_all(request.as_bytes())
            .map_err(|e| self.open_error(format!("request failed: {e}")))?;

        let mut reader = BufReader::new(stream);
        self.read_response_head(&mut reader)?;
        Ok(reader)
    }

    fn read_response_head(&self, reader: &mut BufReader<TcpStream>) -> Result<(), CaptureError> {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|e| self.open_error(format!("no response: {e}")))?;

        let status = line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| self.open_error(format!("malformed status line: {}", line.trim())))?;
        if status != 200 {
            return Err(self.open_error(format!("HTTP status {status}")));
        }

        for _ in 0..MAX_HEADER_LINES {
            line.clear();
            let n = reader
                .read_line(&mut line)
                .map_err(|e| self.open_error(format!("truncated headers: {e}")))?;
            if n == 0 || line == "\r\n" || line == "\n" {
                return Ok(());
            }
        }
        Err(self.open_error("too many response headers"))
    }

    /// Cuts the next complete JPEG out of `pending`, discarding bytes before
    /// its SOI marker.
    fn take_frame(&mut self) -> Option<Bytes> {
        let start = match find(&self.pending, &SOI) {
            Some(start) => start,
            None => {
                // Keep a trailing 0xFF that may begin the next marker.
                let keep = usize::from(self.pending.last() == Some(&0xFF));
                let discard = self.pending.len() - keep;
                let _ = self.pending.split_to(discard);
                return None;
            }
        };
        let _ = self.pending.split_to(start);
        let end = find(&self.pending[SOI.len()..], &EOI)? + SOI.len() + EOI.len();
        Some(self.pending.split_to(end).freeze())
    }

    fn disconnect(&mut self) {
        self.conn = None;
        self.pending.clear();
    }
}

fn find(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}

impl CaptureDevice for NetworkStream {
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.conn.is_some() {
            return Ok(());
        }
        let conn = self.connect()?;
        info!(uri = %self.uri, "Network stream connected");
        self.conn = Some(conn);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Bytes, CaptureError> {
        if self.conn.is_none() {
            // Streams drop; reconnect lazily and let the loop retry on failure.
            let conn = self
                .connect()
                .map_err(|e| CaptureError::TransientRead(e.to_string()))?;
            debug!(uri = %self.uri, "Network stream reconnected");
            self.conn = Some(conn);
        }

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.take_frame() {
                return Ok(frame);
            }
            if self.pending.len() > self.max_frame_bytes {
                self.pending.clear();
                return Err(CaptureError::TransientRead(format!(
                    "frame exceeds {} bytes",
                    self.max_frame_bytes
                )));
            }

            let conn = self.conn.as_mut().ok_or(CaptureError::NotOpen)?;
            match conn.read(&mut chunk) {
                Ok(0) => {
                    self.disconnect();
                    return Err(CaptureError::TransientRead("stream closed".into()));
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    return Err(CaptureError::TransientRead("read timed out".into()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.disconnect();
                    return Err(CaptureError::TransientRead(e.to_string()));
                }
            }
        }
    }

    fn close(&mut self) {
        if self.conn.is_some() {
            info!(uri = %self.uri, "Network stream closed");
        }
        self.disconnect();
    }
}
