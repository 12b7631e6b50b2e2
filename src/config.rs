//! Frozen run configuration (`RunOptions` / `HttpOptions`).
//!
//! Built once from CLI args, then shared read-only (behind `Arc`)
//! across every worker for the lifetime of a run.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use serde::Serialize;

/// How long a run should execute for.
#[derive(Debug, Clone, Copy, Serialize)]
pub enum RunDuration {
    Finite(Duration),
    UntilAbort,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOptions {
    /// Target queries per second. `-1.0` means "as fast as possible";
    /// callers building this from user input must reject any other
    /// negative value before constructing `RunOptions`.
    pub qps: f64,
    pub num_threads: usize,
    pub duration: RunDuration,
    /// Exact call count; per-worker share is `ceil(n / threads)`.
    pub exactly: Option<u64>,
    /// Histogram bucket width, in seconds.
    pub resolution: f64,
    /// Histogram origin, in seconds.
    pub offset: f64,
    pub percentiles: Vec<f64>,
    pub uniform: bool,
    pub jitter: bool,
    pub no_catch_up: bool,
    pub sequential_warmup: bool,
    pub allow_initial_errors: bool,
    /// Abort the whole run the first time a worker observes this code.
    pub abort_on: Option<i64>,
}

impl RunOptions {
    /// Per-thread share of the target rate; `None` when unpaced.
    pub fn per_thread_qps(&self) -> Option<f64> {
        if self.qps < 0.0 {
            None
        } else if self.qps == 0.0 {
            Some(DEFAULT_QPS / self.num_threads as f64)
        } else {
            Some(self.qps / self.num_threads as f64)
        }
    }

    /// Per-worker call budget when `exactly` is set (ceil distribution).
    pub fn per_thread_exactly(&self) -> Option<u64> {
        self.exactly
            .map(|n| n.div_ceil(self.num_threads as u64))
    }
}

pub const DEFAULT_QPS: f64 = 50.0;

#[derive(Debug, Clone, Serialize)]
pub struct HttpOptions {
    pub url: String,
    pub num_connections: usize,
    pub keep_alive: bool,
    pub http_1_0: bool,
    pub allow_half_close: bool,
    pub compression: bool,
    pub follow_redirects: bool,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub content_type: Option<String>,
    pub extra_headers: Vec<(String, String)>,
    pub host_override: Option<String>,
    pub request_timeout: Duration,
    pub log_errors: bool,
    pub user_credentials: Option<(String, String)>,
    pub insecure_tls: bool,
    pub resolve: Option<IpAddr>,
    /// `[min, max]` requests per connection before forced close.
    pub conn_reuse_range: (u32, u32),
    pub no_resolve_each_conn: bool,
}

impl HttpOptions {
    pub fn basic_auth_header(&self) -> Option<String> {
        self.user_credentials.as_ref().map(|(user, pass)| {
            use base64_lite::encode;
            format!("Basic {}", encode(format!("{user}:{pass}").as_bytes()))
        })
    }
}

/// Tiny inline base64 encoder so the crate doesn't need to pull in the
/// `base64` crate just for one header.
mod base64_lite {
    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    pub fn encode(data: &[u8]) -> String {
        let mut out = String::with_capacity((data.len() + 2) / 3 * 4);
        for chunk in data.chunks(3) {
            let b0 = chunk[0];
            let b1 = *chunk.get(1).unwrap_or(&0);
            let b2 = *chunk.get(2).unwrap_or(&0);
            out.push(TABLE[(b0 >> 2) as usize] as char);
            out.push(TABLE[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize] as char);
            out.push(if chunk.len() > 1 {
                TABLE[(((b1 & 0x0f) << 2) | (b2 >> 6)) as usize] as char
            } else {
                '='
            });
            out.push(if chunk.len() > 2 {
                TABLE[(b2 & 0x3f) as usize] as char
            } else {
                '='
            });
        }
        out
    }

}

pub type HeaderMap = HashMap<String, Vec<String>>;
