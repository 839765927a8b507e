//! HTTP framing for the SoftEther control plane.
//!
//! Every handshake step is one POST answered by one response whose body is a
//! Pack. After the welcome response the same connection carries the tunnel,
//! so the codec hands back whatever it buffered past the final body.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, Bytes, BytesMut};

use super::constants::{CONTENT_TYPE_PACK, MAX_HEADER_SIZE, MAX_PACK_SIZE};
use crate::error::{Error, Result};

/// HTTP response from server.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Protocol token from the status line, e.g. `HTTP/1.1`.
    pub version: String,
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers in arrival order, names lowercased.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Get a header value (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Get Content-Length header.
    pub fn content_length(&self) -> Option<usize> {
        self.get_header("content-length")
            .and_then(|v| v.parse().ok())
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Check that a response head announces a Pack body.
///
/// Runs before the body is read so a non-VPN peer is rejected without
/// buffering whatever it sends.
pub fn validate_pack_response(
    version: &str,
    status_code: u16,
    headers: &[(String, String)],
) -> Result<usize> {
    if version != "HTTP/1.1" {
        return Err(Error::NotAVpnServer(format!("protocol {version}")));
    }
    if status_code != 200 {
        return Err(Error::NotAVpnServer(format!("status {status_code}")));
    }
    match find_header(headers, "content-type") {
        Some(CONTENT_TYPE_PACK) => {}
        other => {
            return Err(Error::NotAVpnServer(format!(
                "content type {:?}",
                other.unwrap_or("")
            )))
        }
    }
    match find_header(headers, "content-length").and_then(|v| v.parse::<usize>().ok()) {
        Some(len) if len > 0 && len <= MAX_PACK_SIZE => Ok(len),
        Some(len) => Err(Error::NotAVpnServer(format!("content length {len}"))),
        None => Err(Error::NotAVpnServer("missing content length".into())),
    }
}

/// HTTP request builder.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: &'static str,
    path: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl HttpRequest {
    /// Create a new POST request.
    pub fn post(path: &str) -> Self {
        Self {
            method: "POST",
            path: path.to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Set a header, replacing an earlier value with the same name.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Build the HTTP request bytes.
    ///
    /// `Host` and `Content-Length` are always derived here.
    pub fn build(&self, host: &str) -> Bytes {
        let mut head = format!("{} {} HTTP/1.1\r\n", self.method, self.path);
        for (key, value) in &self.headers {
            if key.eq_ignore_ascii_case("host") || key.eq_ignore_ascii_case("content-length") {
                continue;
            }
            head.push_str(&format!("{key}: {value}\r\n"));
        }
        head.push_str(&format!("Host: {host}\r\n"));
        head.push_str(&format!("Content-Length: {}\r\n\r\n", self.body.len()));

        let mut buf = BytesMut::with_capacity(head.len() + self.body.len());
        buf.extend_from_slice(head.as_bytes());
        buf.extend_from_slice(&self.body);
        buf.freeze()
    }
}

/// HTTP response codec (streaming parser).
#[derive(Debug, Default)]
pub struct HttpCodec {
    state: CodecState,
    buffer: BytesMut,
    /// Head bytes already consumed for the current response.
    head_len: usize,
    /// Buffer offset already searched for CRLF.
    scanned: usize,
    version: String,
    status_code: u16,
    headers: Vec<(String, String)>,
}

#[derive(Debug, Default)]
enum CodecState {
    #[default]
    StatusLine,
    Headers,
    Body {
        content_length: usize,
    },
}

impl HttpCodec {
    /// Create a new HTTP codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed data into the codec.
    ///
    /// Returns `Some(HttpResponse)` when a complete Pack response is parsed.
    /// The head is validated with [`validate_pack_response`] as soon as it is
    /// complete. Bytes past the body stay buffered for [`Self::take_remaining`].
    pub fn feed(&mut self, data: &[u8]) -> Result<Option<HttpResponse>> {
        self.buffer.extend_from_slice(data);

        loop {
            match self.state {
                CodecState::StatusLine => {
                    let Some(pos) = self.next_head_line()? else {
                        return Ok(None);
                    };
                    let line = self.take_line(pos);
                    self.parse_status_line(&line)?;
                    self.state = CodecState::Headers;
                }
                CodecState::Headers => {
                    let Some(pos) = self.next_head_line()? else {
                        return Ok(None);
                    };
                    if pos == 0 {
                        self.buffer.advance(2);
                        self.head_len = 0;
                        self.scanned = 0;
                        let content_length =
                            validate_pack_response(&self.version, self.status_code, &self.headers)?;
                        self.state = CodecState::Body { content_length };
                    } else {
                        let line = self.take_line(pos);
                        self.parse_header(&line);
                    }
                }
                CodecState::Body { content_length } => {
                    if self.buffer.len() < content_length {
                        return Ok(None);
                    }
                    let body = self.buffer.split_to(content_length).freeze();
                    self.state = CodecState::StatusLine;
                    return Ok(Some(HttpResponse {
                        version: std::mem::take(&mut self.version),
                        status_code: std::mem::replace(&mut self.status_code, 0),
                        headers: std::mem::take(&mut self.headers),
                        body,
                    }));
                }
            }
        }
    }

    /// Locate the end of the next head line, enforcing [`MAX_HEADER_SIZE`].
    fn next_head_line(&mut self) -> Result<Option<usize>> {
        let pos = self.find_crlf();
        let line_len = pos.map_or(self.buffer.len(), |pos| pos + 2);
        if self.head_len + line_len > MAX_HEADER_SIZE {
            return Err(Error::NotAVpnServer(format!(
                "response head exceeds {MAX_HEADER_SIZE} bytes"
            )));
        }
        Ok(pos)
    }

    /// Search for CRLF, resuming where the previous search stopped.
    fn find_crlf(&mut self) -> Option<usize> {
        let start = self.scanned.saturating_sub(1);
        match self.buffer[start..].windows(2).position(|w| w == b"\r\n") {
            Some(pos) => Some(start + pos),
            None => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }

    /// Take a line from the buffer (excluding \r\n).
    fn take_line(&mut self, pos: usize) -> String {
        let line = String::from_utf8_lossy(&self.buffer[..pos]).into_owned();
        self.buffer.advance(pos + 2);
        self.head_len += pos + 2;
        self.scanned = 0;
        line
    }

    fn parse_status_line(&mut self, line: &str) -> Result<()> {
        // "HTTP/1.1 200 OK"
        let mut parts = line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/") {
            return Err(Error::NotAVpnServer(format!("bad status line {line:?}")));
        }
        self.version = version.to_string();
        self.status_code = parts
            .next()
            .and_then(|code| code.parse().ok())
            .ok_or_else(|| Error::NotAVpnServer(format!("bad status line {line:?}")))?;
        Ok(())
    }

    fn parse_header(&mut self, line: &str) {
        if let Some((key, value)) = line.split_once(':') {
            self.headers
                .push((key.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    /// Take any bytes buffered past the last complete response.
    pub fn take_remaining(&mut self) -> Bytes {
        self.scanned = 0;
        self.buffer.split().freeze()
    }

    /// Number of bytes buffered but not yet consumed.
    pub fn remaining_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Format a timestamp as an IMF-fixdate for the `Date` header.
pub fn http_date(time: SystemTime) -> String {
    const DAYS: [&str; 7] = ["Thu", "Fri", "Sat", "Sun", "Mon", "Tue", "Wed"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let days = secs / 86_400;
    let rem = secs % 86_400;

    // Civil date from day count (proleptic Gregorian, epoch 1970-01-01).
    let z = days as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        DAYS[(days % 7) as usize],
        day,
        MONTHS[(month - 1) as usize],
        year,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PACK_HEAD: &[u8] =
        b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 5\r\n\r\n";

    #[test]
    fn test_http_request_build() {
        let request = HttpRequest::post("/vpnsvc/vpn.cgi")
            .header("Content-Type", "application/octet-stream")
            .header("Connection", "Keep-Alive")
            .body("hello");

        let bytes = request.build("vpn.example.com");
        let text = String::from_utf8_lossy(&bytes);

        assert!(text.starts_with("POST /vpnsvc/vpn.cgi HTTP/1.1\r\n"));
        assert!(text.contains("Content-Type: application/octet-stream\r\n"));
        assert!(text.contains("Host: vpn.example.com\r\n"));
        assert!(text.contains("Content-Length: 5\r\n\r\nhello"));
    }

    #[test]
    fn test_header_replaces() {
        let request = HttpRequest::post("/").header("X-A", "1").header("x-a", "2");
        let text = String::from_utf8_lossy(&request.build("h")).into_owned();
        assert!(text.contains("x-a: 2\r\n"));
        assert!(!text.contains("X-A: 1"));
    }

    #[test]
    fn test_http_codec_parse() {
        let mut codec = HttpCodec::new();
        let mut data = PACK_HEAD.to_vec();
        data.extend_from_slice(b"helloTAIL");

        let response = codec.feed(&data).unwrap().unwrap();
        assert_eq!(response.version, "HTTP/1.1");
        assert_eq!(response.status_code, 200);
        assert_eq!(response.content_length(), Some(5));
        assert_eq!(response.body.as_ref(), b"hello");
        assert_eq!(codec.remaining_len(), 4);
        assert_eq!(codec.take_remaining().as_ref(), b"TAIL");
    }

    #[test]
    fn test_http_codec_streaming() {
        let mut codec = HttpCodec::new();
        for chunk in PACK_HEAD.chunks(7) {
            assert!(codec.feed(chunk).unwrap().is_none());
        }
        assert!(codec.feed(b"hel").unwrap().is_none());
        let result = codec.feed(b"lo").unwrap().unwrap();
        assert_eq!(result.body.as_ref(), b"hello");
    }

    #[test]
    fn test_rejects_non_vpn_responses() {
        let cases: [&[u8]; 6] = [
            b"HTTP/1.0 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 5\r\n\r\n",
            b"HTTP/1.1 403 Forbidden\r\nContent-Type: application/octet-stream\r\nContent-Length: 5\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 5\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 0\r\n\r\n",
            b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 536870913\r\n\r\n",
            b"SSH-2.0-OpenSSH_9.6\r\n",
        ];
        for case in cases {
            let err = HttpCodec::new().feed(case).unwrap_err();
            assert!(matches!(err, Error::NotAVpnServer(_)), "{err}");
        }
    }

    #[test]
    fn test_oversized_head_is_rejected() {
        let mut codec = HttpCodec::new();
        assert!(codec.feed(b"HTTP/1.1 200 OK\r\n").unwrap().is_none());
        let chunk = vec![b'x'; 4096];
        let mut result = Ok(None);
        for _ in 0..(MAX_HEADER_SIZE / chunk.len() + 1) {
            result = codec.feed(&chunk);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(Error::NotAVpnServer(_))));

        // Many short headers count towards the same cap.
        let mut codec = HttpCodec::new();
        let mut head = b"HTTP/1.1 200 OK\r\n".to_vec();
        while head.len() <= MAX_HEADER_SIZE {
            head.extend_from_slice(b"X-Filler: 0123456789\r\n");
        }
        assert!(matches!(codec.feed(&head), Err(Error::NotAVpnServer(_))));
    }

    #[test]
    fn test_head_at_limit_is_accepted() {
        let mut head = b"HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: 5\r\n".to_vec();
        let filler = MAX_HEADER_SIZE - head.len() - b"X-Pad: \r\n\r\n".len();
        head.extend_from_slice(b"X-Pad: ");
        head.extend(std::iter::repeat(b'a').take(filler));
        head.extend_from_slice(b"\r\n\r\nhello");
        assert_eq!(head.len(), MAX_HEADER_SIZE + 5);

        let mut codec = HttpCodec::new();
        let response = codec.feed(&head).unwrap().unwrap();
        assert_eq!(response.body.as_ref(), b"hello");
    }

    #[test]
    fn test_http_date() {
        let date = http_date(UNIX_EPOCH + Duration::from_secs(784_111_777));
        assert_eq!(date, "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(http_date(UNIX_EPOCH), "Thu, 01 Jan 1970 00:00:00 GMT");
        let leap = http_date(UNIX_EPOCH + Duration::from_secs(951_782_400));
        assert_eq!(leap, "Tue, 29 Feb 2000 00:00:00 GMT");
    }
}
