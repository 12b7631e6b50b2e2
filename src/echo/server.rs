//! Echo/debug server: deterministically reproduces configurable status
//! codes, payload sizes, delays, and connection behavior so the load
//! runner has a known-behavior target.

use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::rngs::ThreadRng;

use super::grammar::{self, BoolGrammar, GrammarError, WeightedGrammar};

const DEFAULT_STATUS: i64 = 200;
/// Sentinel `size` meaning "echo the request body back verbatim".
const ECHO_BODY_SIZE: i64 = -1;
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Default)]
pub struct EchoDefaultParams {
    pub status: Option<String>,
    pub size: Option<String>,
    pub delay: Option<String>,
    pub close: Option<String>,
    pub gzip: Option<String>,
    pub headers: Vec<(String, String)>,
    pub max_delay: Option<Duration>,
}

/// Process-wide default response shape; individual query parameters on
/// a request override the matching knob entirely.
pub struct EchoDefaults {
    status: WeightedGrammar<i64>,
    size: WeightedGrammar<i64>,
    delay: WeightedGrammar<Duration>,
    close: BoolGrammar,
    gzip: BoolGrammar,
    extra_headers: Vec<(String, String)>,
    max_delay: Duration,
}

impl EchoDefaults {
    pub fn from_params(params: EchoDefaultParams) -> Result<Self, GrammarError> {
        Ok(Self {
            status: parse_status_grammar(params.status.as_deref().unwrap_or("200"))?,
            size: parse_size_grammar(params.size.as_deref().unwrap_or("-1"))?,
            delay: parse_delay_grammar(params.delay.as_deref().unwrap_or("0ms"))?,
            close: BoolGrammar::parse(params.close.as_deref().unwrap_or("false")),
            gzip: BoolGrammar::parse(params.gzip.as_deref().unwrap_or("false")),
            extra_headers: params.headers,
            max_delay: params.max_delay.unwrap_or(DEFAULT_MAX_DELAY),
        })
    }
}

impl Default for EchoDefaults {
    fn default() -> Self {
        Self::from_params(EchoDefaultParams::default()).expect("default echo params always parse")
    }
}

fn parse_int(s: &str) -> Result<i64, GrammarError> {
    s.trim().parse().map_err(|_| GrammarError::Malformed(s.to_string()))
}

fn parse_status_grammar(s: &str) -> Result<WeightedGrammar<i64>, GrammarError> {
    WeightedGrammar::parse(s, parse_int, DEFAULT_STATUS)
}

fn parse_size_grammar(s: &str) -> Result<WeightedGrammar<i64>, GrammarError> {
    WeightedGrammar::parse(s, parse_int, ECHO_BODY_SIZE)
}

fn parse_delay_grammar(s: &str) -> Result<WeightedGrammar<Duration>, GrammarError> {
    WeightedGrammar::parse(s, grammar::parse_duration, Duration::ZERO)
}

pub fn router(defaults: Arc<EchoDefaults>) -> Router {
    Router::new().fallback(echo_handler).with_state(defaults)
}

async fn echo_handler(
    State(defaults): State<Arc<EchoDefaults>>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (single, repeated_headers) = parse_query(raw_query.as_deref().unwrap_or(""));

    let (status, size, delay, close, gzip_requested) = {
        let mut rng = rand::thread_rng();
        let status = match resolve_status(&single, &defaults, &mut rng) {
            Ok(s) => s,
            Err(e) => return bad_request(&e),
        };
        let size = match resolve_size(&single, &defaults, &mut rng) {
            Ok(s) => s,
            Err(e) => return bad_request(&e),
        };
        let delay = match resolve_delay(&single, &defaults, &mut rng) {
            Ok(d) => d,
            Err(e) => return bad_request(&e),
        };
        let close = resolve_close(&single, &defaults, &mut rng);
        let gzip_requested = resolve_gzip(&single, &defaults, &mut rng);
        (status, size, delay, close, gzip_requested)
    };

    tracing::debug!(status, size, delay_ms = delay.as_millis() as u64, close, gzip_requested, "resolved echo response");

    if !delay.is_zero() {
        tokio::time::sleep(grammar::clamp_delay(delay, defaults.max_delay)).await;
    }

    let payload = if size == ECHO_BODY_SIZE {
        body.to_vec()
    } else {
        vec![b'a'; size.max(0) as usize]
    };

    let client_accepts_gzip = headers
        .get(axum::http::header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false);
    let use_gzip = gzip_requested && client_accepts_gzip;

    let body_bytes = if use_gzip {
        match gzip_compress(&payload) {
            Ok(compressed) => compressed,
            Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    } else {
        payload
    };

    let status_code = StatusCode::from_u16(status.clamp(100, 599) as u16).unwrap_or(StatusCode::OK);
    let mut response = (status_code, body_bytes).into_response();
    if use_gzip {
        response
            .headers_mut()
            .insert(axum::http::header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }
    for (name, value) in defaults.extra_headers.iter().chain(repeated_headers.iter()) {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
            response.headers_mut().insert(name, value);
        }
    }
    if close {
        response
            .headers_mut()
            .insert(axum::http::header::CONNECTION, HeaderValue::from_static("close"));
    }
    response
}

fn resolve_status(
    query: &HashMap<String, String>,
    defaults: &EchoDefaults,
    rng: &mut ThreadRng,
) -> Result<i64, GrammarError> {
    match query.get("status") {
        Some(raw) => Ok(parse_status_grammar(raw)?.roll(rng)),
        None => Ok(defaults.status.roll(rng)),
    }
}

fn resolve_size(query: &HashMap<String, String>, defaults: &EchoDefaults, rng: &mut ThreadRng) -> Result<i64, GrammarError> {
    match query.get("size") {
        Some(raw) => Ok(parse_size_grammar(raw)?.roll(rng)),
        None => Ok(defaults.size.roll(rng)),
    }
}

fn resolve_delay(
    query: &HashMap<String, String>,
    defaults: &EchoDefaults,
    rng: &mut ThreadRng,
) -> Result<Duration, GrammarError> {
    match query.get("delay") {
        Some(raw) => Ok(parse_delay_grammar(raw)?.roll(rng)),
        None => Ok(defaults.delay.roll(rng)),
    }
}

fn resolve_close(query: &HashMap<String, String>, defaults: &EchoDefaults, rng: &mut ThreadRng) -> bool {
    match query.get("close") {
        Some(raw) => BoolGrammar::parse(raw).roll(rng),
        None => defaults.close.roll(rng),
    }
}

fn resolve_gzip(query: &HashMap<String, String>, defaults: &EchoDefaults, rng: &mut ThreadRng) -> bool {
    match query.get("gzip") {
        Some(raw) => BoolGrammar::parse(raw).roll(rng),
        None => defaults.gzip.roll(rng),
    }
}

fn bad_request(e: &GrammarError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(serde_json::json!({
            "error": true,
            "message": e.to_string(),
            "exception": "GrammarError",
        })),
    )
        .into_response()
}

fn gzip_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Parses a raw query string into last-value-wins single params and a
/// separate list for repeatable `header=Name:Value` entries.
fn parse_query(raw: &str) -> (HashMap<String, String>, Vec<(String, String)>) {
    let mut single = HashMap::new();
    let mut headers = Vec::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = percent_decode(key);
        let value = percent_decode(value);
        if key == "header" {
            if let Some((name, v)) = value.split_once(':') {
                headers.push((name.trim().to_string(), v.trim().to_string()));
            }
        } else {
            single.insert(key, value);
        }
    }
    (single, headers)
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_query() {
        let (single, headers) = parse_query("status=418&size=10");
        assert_eq!(single.get("status").map(String::as_str), Some("418"));
        assert_eq!(single.get("size").map(String::as_str), Some("10"));
        assert!(headers.is_empty());
    }

    #[test]
    fn collects_repeated_header_params() {
        let (_, headers) = parse_query("header=X-One:1&header=X-Two:2");
        assert_eq!(headers, vec![("X-One".to_string(), "1".to_string()), ("X-Two".to_string(), "2".to_string())]);
    }

    #[test]
    fn percent_decodes_values() {
        assert_eq!(percent_decode("a%3Ab"), "a:b");
        assert_eq!(percent_decode("a+b"), "a b");
    }

    #[test]
    fn default_params_parse_to_literal_200() {
        let defaults = EchoDefaults::default();
        let mut rng = rand::thread_rng();
        assert_eq!(defaults.status.roll(&mut rng), 200);
        assert_eq!(defaults.size.roll(&mut rng), ECHO_BODY_SIZE);
    }
}
