//! Hand-rolled, single-purpose HTTP/1.1 client.
//!
//! One [`FastClient`] is owned exclusively by one worker thread. It
//! keeps a single reusable response buffer and a pre-built request
//! buffer (with `{uuid}` placeholders) so a steady-state `fetch()`
//! call does not allocate.

pub mod fold;
pub mod url;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::HttpOptions;
use crate::uuidgen::SharedUuidSource;
use url::ParsedUrl;

pub const SOCKET_ERROR: i64 = -1;
const DEFAULT_RESPONSE_BUF: usize = 128 * 1024;
const MAX_HEADER_SCAN: usize = 1024 * 1024;
const UUID_PLACEHOLDER: &[u8; 36] = b"00000000-0000-0000-0000-000000000000";

/// Outcome of one `fetch()` call. `status_code` is the real HTTP
/// status on success, or a negative sentinel (only [`SOCKET_ERROR`] is
/// ever externally visible; an internal retry-once state never escapes
/// to the caller).
#[derive(Debug, Clone, Copy)]
pub struct FetchOutcome {
    pub status_code: i64,
    pub body_start: usize,
    pub body_end: usize,
    pub connect_time: Option<Duration>,
}

impl FetchOutcome {
    fn socket_error() -> Self {
        Self {
            status_code: SOCKET_ERROR,
            body_start: 0,
            body_end: 0,
            connect_time: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        is_ok_status(self.status_code)
    }
}

pub fn is_ok_status(code: i64) -> bool {
    (200..=299).contains(&code) || code == 418
}

#[derive(Debug)]
enum ReadError {
    Eof,
    Io(std::io::Error),
    Parse,
    HeaderTooLarge,
}

impl From<std::io::Error> for ReadError {
    fn from(e: std::io::Error) -> Self {
        ReadError::Io(e)
    }
}

#[derive(Debug)]
enum FetchError {
    RetryOnce,
    Fatal,
}

/// Owns one socket (or none, between requests) plus the buffers
/// reused across every `fetch()` call.
pub struct FastClient {
    opts: Arc<HttpOptions>,
    parsed: ParsedUrl,
    socket: Option<TcpStream>,
    request_buf: Vec<u8>,
    uuid_offsets: Vec<usize>,
    response_buf: Vec<u8>,
    response_len: usize,
    reuse_count: u32,
    reuse_limit: u32,
    rng: StdRng,
    uuid_source: Option<SharedUuidSource>,
    resolved_addr: Option<SocketAddr>,

    pub socket_count: u64,
    pub ip_usage: HashMap<IpAddr, u64>,
}

impl FastClient {
    pub fn new(
        opts: Arc<HttpOptions>,
        uuid_source: SharedUuidSource,
        worker_seed: u64,
    ) -> Result<Self, url::UrlParseError> {
        let parsed = url::parse(&opts.url)?;
        let (request_buf, uuid_offsets) = build_request(&opts, &parsed);
        let needs_uuid_source = !uuid_offsets.is_empty();
        let mut client = Self {
            opts,
            parsed,
            socket: None,
            request_buf,
            uuid_offsets,
            response_buf: vec![0u8; DEFAULT_RESPONSE_BUF],
            response_len: 0,
            reuse_count: 0,
            reuse_limit: 0,
            rng: StdRng::seed_from_u64(worker_seed),
            uuid_source: needs_uuid_source.then_some(uuid_source),
            resolved_addr: None,
            socket_count: 0,
            ip_usage: HashMap::new(),
        };
        client.reuse_limit = client.draw_reuse_limit();
        Ok(client)
    }

    fn draw_reuse_limit(&mut self) -> u32 {
        let (lo, hi) = self.opts.conn_reuse_range;
        if hi == 0 {
            0
        } else if lo >= hi {
            hi
        } else {
            self.rng.gen_range(lo..=hi)
        }
    }

    pub fn body(&self, outcome: &FetchOutcome) -> &[u8] {
        &self.response_buf[outcome.body_start..outcome.body_end]
    }

    pub fn close(&mut self) {
        self.socket = None;
    }

    /// Perform one request/response cycle.
    pub fn fetch(&mut self) -> FetchOutcome {
        self.apply_uuid_templates();
        let was_reused = self.socket.is_some();
        match self.try_fetch_once(was_reused) {
            Ok(outcome) => outcome,
            Err(FetchError::RetryOnce) => {
                tracing::debug!(url = %self.opts.url, "reused connection dropped, retrying once");
                self.close();
                match self.try_fetch_once(false) {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::debug!(url = %self.opts.url, "retry failed, reporting socket error");
                        FetchOutcome::socket_error()
                    }
                }
            }
            Err(FetchError::Fatal) => {
                tracing::debug!(url = %self.opts.url, "fetch failed, reporting socket error");
                FetchOutcome::socket_error()
            }
        }
    }

    fn try_fetch_once(&mut self, was_reused: bool) -> Result<FetchOutcome, FetchError> {
        let mut connect_time = None;
        if self.socket.is_none() {
            connect_time = Some(self.connect().map_err(|e| {
                tracing::debug!(url = %self.opts.url, error = %e, "connect failed");
                FetchError::Fatal
            })?);
        }

        if let Err(e) = self.write_request() {
            return if was_reused && is_broken_pipe(&e) {
                Err(FetchError::RetryOnce)
            } else {
                tracing::debug!(url = %self.opts.url, error = %e, "write_request failed");
                Err(FetchError::Fatal)
            };
        }

        self.response_len = 0;
        match self.read_response() {
            Ok((status_code, body_start, body_end, should_close)) => {
                if should_close {
                    self.close();
                } else {
                    self.reuse_count += 1;
                    if self.reuse_count >= self.reuse_limit.max(1) && self.reuse_limit > 0 {
                        self.close();
                        self.reuse_limit = self.draw_reuse_limit();
                    }
                }
                Ok(FetchOutcome {
                    status_code,
                    body_start,
                    body_end,
                    connect_time,
                })
            }
            Err(ReadError::Eof) if was_reused => Err(FetchError::RetryOnce),
            Err(e) => {
                tracing::debug!(url = %self.opts.url, error = ?e, "read_response failed");
                self.close();
                Err(FetchError::Fatal)
            }
        }
    }

    fn apply_uuid_templates(&mut self) {
        if self.uuid_offsets.is_empty() {
            return;
        }
        let source = self.uuid_source.as_ref().expect("uuid source present when offsets non-empty");
        for &offset in &self.uuid_offsets {
            let uuid = source.next();
            let text = uuid.hyphenated().to_string();
            self.request_buf[offset..offset + 36].copy_from_slice(text.as_bytes());
        }
    }

    fn resolve(&mut self) -> std::io::Result<SocketAddr> {
        if self.opts.no_resolve_each_conn {
            if let Some(addr) = self.resolved_addr {
                return Ok(addr);
            }
        }
        let addr = if let Some(ip) = self.opts.resolve {
            SocketAddr::new(ip, self.parsed.port)
        } else {
            (self.parsed.host.as_str(), self.parsed.port)
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"))?
        };
        self.resolved_addr = Some(addr);
        *self.ip_usage.entry(addr.ip()).or_insert(0) += 1;
        Ok(addr)
    }

    fn connect(&mut self) -> std::io::Result<Duration> {
        let addr = self.resolve()?;
        let start = Instant::now();
        let stream = TcpStream::connect_timeout(&addr, self.opts.request_timeout)?;
        let elapsed = start.elapsed();
        stream.set_nodelay(true).ok();
        stream.set_read_timeout(Some(self.opts.request_timeout))?;
        stream.set_write_timeout(Some(self.opts.request_timeout))?;
        self.socket = Some(stream);
        self.socket_count += 1;
        self.reuse_count = 0;
        Ok(elapsed)
    }

    fn write_request(&mut self) -> std::io::Result<()> {
        let socket = self.socket.as_mut().expect("socket present before write");
        socket.write_all(&self.request_buf)?;
        if self.opts.allow_half_close && !self.opts.keep_alive {
            let _ = socket.shutdown(Shutdown::Write);
        }
        Ok(())
    }

    fn read_more(&mut self) -> Result<usize, ReadError> {
        if self.response_len == self.response_buf.len() {
            if self.response_buf.len() >= MAX_HEADER_SCAN * 8 {
                return Err(ReadError::HeaderTooLarge);
            }
            self.response_buf.resize(self.response_buf.len() * 2, 0);
        }
        let socket = self.socket.as_mut().expect("socket present before read");
        let n = socket.read(&mut self.response_buf[self.response_len..])?;
        if n == 0 {
            return Err(ReadError::Eof);
        }
        self.response_len += n;
        Ok(n)
    }

    /// Returns `(status_code, body_start, body_end, should_close_socket)`.
    fn read_response(&mut self) -> Result<(i64, usize, usize, bool), ReadError> {
        let header_end = loop {
            if let Some(end) = find_subsequence(&self.response_buf[..self.response_len], b"\r\n\r\n") {
                break end + 4;
            }
            if self.response_len > MAX_HEADER_SCAN {
                return Err(ReadError::HeaderTooLarge);
            }
            self.read_more()?;
        };

        let head = &self.response_buf[..header_end];
        let status_code = parse_status_code(head);
        let content_length = parse_content_length(head);
        let chunked = is_chunked(head);
        let conn_close = has_connection_close(head) || self.opts.http_1_0 && !has_connection_keep_alive(head);

        if !is_ok_status(status_code) && self.opts.log_errors {
            tracing::warn!(status_code, url = %self.opts.url, "non-ok response");
            return Ok((status_code, header_end, self.response_len, true));
        }

        let body_end = if chunked {
            self.read_chunked_body(header_end)?
        } else if let Some(len) = content_length {
            let need = header_end + len;
            while self.response_len < need {
                self.read_more()?;
            }
            need
        } else {
            // No Content-Length, not chunked: body runs to EOF (HTTP/1.0 style).
            loop {
                match self.read_more() {
                    Ok(_) => continue,
                    Err(ReadError::Eof) => break,
                    Err(e) => return Err(e),
                }
            }
            self.response_len
        };

        let should_close = conn_close || !self.opts.keep_alive || content_length.is_none() && !chunked;
        Ok((status_code, header_end, body_end, should_close))
    }

    /// Sliding-window chunked body reader.
    fn read_chunked_body(&mut self, body_start: usize) -> Result<usize, ReadError> {
        let mut pos = body_start;
        let mut max = body_start;
        loop {
            while self.response_len < max {
                self.read_more()?;
            }
            let line_end = match find_subsequence(&self.response_buf[pos..self.response_len], b"\r\n") {
                Some(off) => pos + off,
                None => {
                    max = self.response_len + 1;
                    continue;
                }
            };
            let size_line = &self.response_buf[pos..line_end];
            let size_text = std::str::from_utf8(size_line).map_err(|_| ReadError::Parse)?;
            let size_text = size_text.split(';').next().unwrap_or(size_text).trim();
            let chunk_len = usize::from_str_radix(size_text, 16).map_err(|_| ReadError::Parse)?;
            let chunk_data_start = line_end + 2;

            if chunk_len == 0 {
                let end = chunk_data_start + 2; // terminating CRLF, no trailers
                while self.response_len < end {
                    self.read_more()?;
                }
                return Ok(end);
            }

            max = chunk_data_start + chunk_len + 2;
            while self.response_len < max {
                self.read_more()?;
            }
            pos = max;
        }
    }
}

fn is_broken_pipe(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
    )
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Status code lives at a fixed offset in a well-formed status line
/// (`HTTP/1.1 200 ...`): bytes 0-7 are the version, byte 8 is a
/// space, bytes 9..12 are the three status digits.
fn parse_status_code(head: &[u8]) -> i64 {
    let mut code: i64 = 0;
    let end = (12).min(head.len());
    for &b in &head[9.min(head.len())..end] {
        if b.is_ascii_digit() {
            code = code * 10 + (b - b'0') as i64;
        }
    }
    code
}

fn parse_content_length(head: &[u8]) -> Option<usize> {
    let idx = fold::fold_find(head, b"content-length:")?;
    let rest = &head[idx + "content-length:".len()..];
    let line_end = find_subsequence(rest, b"\r\n").unwrap_or(rest.len());
    std::str::from_utf8(&rest[..line_end]).ok()?.trim().parse().ok()
}

fn is_chunked(head: &[u8]) -> bool {
    match fold::fold_find(head, b"transfer-encoding:") {
        Some(idx) => {
            let rest = &head[idx + "transfer-encoding:".len()..];
            let line_end = find_subsequence(rest, b"\r\n").unwrap_or(rest.len());
            fold::fold_find(&rest[..line_end], b"chunked").is_some()
        }
        None => false,
    }
}

fn has_connection_close(head: &[u8]) -> bool {
    match fold::fold_find(head, b"connection:") {
        Some(idx) => {
            let rest = &head[idx + "connection:".len()..];
            let line_end = find_subsequence(rest, b"\r\n").unwrap_or(rest.len());
            fold::fold_find(&rest[..line_end], b"close").is_some()
        }
        None => false,
    }
}

fn has_connection_keep_alive(head: &[u8]) -> bool {
    match fold::fold_find(head, b"connection:") {
        Some(idx) => {
            let rest = &head[idx + "connection:".len()..];
            let line_end = find_subsequence(rest, b"\r\n").unwrap_or(rest.len());
            fold::fold_find(&rest[..line_end], b"keep-alive").is_some()
        }
        None => false,
    }
}

fn push_templated(buf: &mut Vec<u8>, offsets: &mut Vec<usize>, s: &str) {
    let mut rest = s;
    while let Some(idx) = rest.find("{uuid}") {
        buf.extend_from_slice(rest[..idx].as_bytes());
        offsets.push(buf.len());
        buf.extend_from_slice(UUID_PLACEHOLDER);
        rest = &rest[idx + 6..];
    }
    buf.extend_from_slice(rest.as_bytes());
}

/// Build the request bytes once; only `{uuid}` placeholder bytes are
/// ever rewritten afterward.
fn build_request(opts: &HttpOptions, parsed: &ParsedUrl) -> (Vec<u8>, Vec<usize>) {
    let mut buf = Vec::with_capacity(256 + opts.payload.len());
    let mut offsets = Vec::new();

    let version = if opts.http_1_0 { "HTTP/1.0" } else { "HTTP/1.1" };
    buf.extend_from_slice(b"GET ");
    push_templated(&mut buf, &mut offsets, &parsed.path_and_query);
    buf.extend_from_slice(b" ");
    buf.extend_from_slice(version.as_bytes());
    buf.extend_from_slice(b"\r\n");

    let host_header = opts.host_override.clone().unwrap_or_else(|| parsed.host.clone());
    buf.extend_from_slice(format!("Host: {host_header}\r\n").as_bytes());

    if opts.http_1_0 && opts.keep_alive {
        buf.extend_from_slice(b"Connection: keep-alive\r\n");
    } else if !opts.keep_alive {
        buf.extend_from_slice(b"Connection: close\r\n");
    }

    if !opts.payload.is_empty() {
        buf.extend_from_slice(format!("Content-Length: {}\r\n", opts.payload.len()).as_bytes());
    }
    if let Some(ct) = &opts.content_type {
        buf.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
    }
    buf.extend_from_slice(format!("User-Agent: barrage/{}\r\n", env!("CARGO_PKG_VERSION")).as_bytes());
    if let Some(header) = opts.basic_auth_header() {
        buf.extend_from_slice(format!("Authorization: {header}\r\n").as_bytes());
    }
    if opts.compression {
        buf.extend_from_slice(b"Accept-Encoding: gzip\r\n");
    }
    for (name, value) in &opts.extra_headers {
        push_templated(&mut buf, &mut offsets, &format!("{name}: {value}\r\n"));
    }
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(&opts.payload);

    (buf, offsets)
}
