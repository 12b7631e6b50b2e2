//! Command-line surface: `load`, `curl`, and `server` subcommands.

use std::net::IpAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::{HttpOptions, RunDuration, RunOptions};
use crate::echo::server::EchoDefaultParams;
use crate::echo::grammar;
use crate::error::{AppError, Result};

#[derive(Debug, Parser)]
#[command(name = "barrage", version, about = "Load generator and echo/debug server suite for HTTP endpoints")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the full pacing/aggregation pipeline against a target URL.
    Load(LoadArgs),
    /// Issue a single request and print status + body.
    Curl(CurlArgs),
    /// Start the echo/debug server.
    Server(ServerArgs),
}

#[derive(Debug, Parser)]
pub struct LoadArgs {
    /// Target URL.
    pub url: String,

    /// Target queries per second. -1 runs as fast as possible (no other negative value is valid), 0 uses the built-in default.
    #[arg(long, short = 'q', default_value = "0")]
    pub qps: f64,

    /// Run duration (supports ns/us/ms/s/m/h); "0s" means run until aborted.
    #[arg(long, short = 't', default_value = "10s")]
    pub duration: String,

    /// Number of concurrent worker threads.
    #[arg(long, short = 'c', default_value = "10")]
    pub threads: usize,

    /// Stop after exactly this many total calls (overrides duration-based stopping).
    #[arg(long)]
    pub exactly: Option<u64>,

    /// Histogram bucket width, in seconds.
    #[arg(long, default_value = "0.0001")]
    pub resolution: f64,

    /// Histogram origin, in seconds.
    #[arg(long, default_value = "0.0")]
    pub offset: f64,

    /// Percentiles to report, comma-separated.
    #[arg(long, value_delimiter = ',', default_value = "50,90,99")]
    pub percentiles: Vec<f64>,

    /// Space requests evenly within each thread instead of Poisson.
    #[arg(long)]
    pub uniform: bool,

    /// Desynchronize each thread's start phase by a random fraction of one period.
    #[arg(long)]
    pub jitter: bool,

    /// When a thread falls behind schedule, re-plan from now instead of catching up.
    #[arg(long = "no-catch-up")]
    pub no_catch_up: bool,

    /// Run warmup requests one at a time instead of in parallel.
    #[arg(long)]
    pub sequential_warmup: bool,

    /// Proceed with the timed run even if warmup requests fail.
    #[arg(long)]
    pub allow_initial_errors: bool,

    /// Trip the global abort flag the first time this status code is observed.
    #[arg(long)]
    pub abort_on: Option<i64>,

    /// Print the result as JSON instead of a human-readable summary.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub http: HttpArgs,
}

#[derive(Debug, Parser)]
pub struct CurlArgs {
    pub url: String,

    #[command(flatten)]
    pub http: HttpArgs,
}

#[derive(Debug, Parser)]
pub struct HttpArgs {
    /// Draw each connection's request budget from `[min,max]` before forcing a new socket.
    #[arg(long = "conn-reuse-range", value_delimiter = ',', default_value = "0,0")]
    pub conn_reuse_range: Vec<u32>,

    /// Disable HTTP keep-alive.
    #[arg(long)]
    pub no_keep_alive: bool,

    /// Use HTTP/1.0 instead of HTTP/1.1.
    #[arg(long = "http10")]
    pub http_1_0: bool,

    /// Half-close the write side after sending before reading the response.
    #[arg(long)]
    pub allow_half_close: bool,

    /// Send `Accept-Encoding: gzip`.
    #[arg(long)]
    pub compression: bool,

    /// Request body, as a literal string.
    #[arg(long, default_value = "")]
    pub data: String,

    /// Content-Type header.
    #[arg(long)]
    pub content_type: Option<String>,

    /// Extra header in `Name: Value` form (repeatable).
    #[arg(long = "header", short = 'H', value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Override the Host header.
    #[arg(long)]
    pub host: Option<String>,

    /// Per-request timeout (supports ns/us/ms/s/m/h).
    #[arg(long, default_value = "5s")]
    pub timeout: String,

    /// Log non-ok responses via tracing.
    #[arg(long)]
    pub log_errors: bool,

    /// Basic auth credentials in `user:password` form.
    #[arg(long = "basic-auth")]
    pub basic_auth: Option<String>,

    /// Accept invalid TLS certificates (reserved; plain-http client does not yet use TLS).
    #[arg(long)]
    pub insecure: bool,

    /// Resolve the target to this IP instead of using DNS.
    #[arg(long)]
    pub resolve: Option<IpAddr>,

    /// Skip re-resolving DNS for every new connection.
    #[arg(long)]
    pub no_resolve_each_conn: bool,
}

#[derive(Debug, Parser)]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Default status grammar applied when a request has no `status=` override.
    #[arg(long)]
    pub default_status: Option<String>,

    /// Default size grammar applied when a request has no `size=` override.
    #[arg(long)]
    pub default_size: Option<String>,

    /// Default delay grammar applied when a request has no `delay=` override.
    #[arg(long)]
    pub default_delay: Option<String>,

    /// Default close grammar applied when a request has no `close=` override.
    #[arg(long)]
    pub default_close: Option<String>,

    /// Default gzip grammar applied when a request has no `gzip=` override.
    #[arg(long)]
    pub default_gzip: Option<String>,

    /// Default extra response header in `Name:Value` form (repeatable).
    #[arg(long = "default-header", value_parser = parse_colon_pair)]
    pub default_headers: Vec<(String, String)>,

    /// Ceiling applied to any requested delay.
    #[arg(long)]
    pub max_delay: Option<String>,
}

fn parse_header(s: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = s.split_once(':').ok_or_else(|| format!("expected 'Name: Value', got {s:?}"))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

fn parse_colon_pair(s: &str) -> std::result::Result<(String, String), String> {
    parse_header(s)
}

fn parse_duration_flag(s: &str) -> Result<Duration> {
    grammar::parse_duration(s).map_err(|e| AppError::InvalidOption(format!("bad duration {s:?}: {e}")))
}

impl LoadArgs {
    pub fn into_options(self) -> Result<(RunOptions, HttpOptions)> {
        if self.qps < 0.0 && self.qps != -1.0 {
            return Err(AppError::InvalidOption(format!(
                "--qps must be non-negative or exactly -1 (unpaced), got {}",
                self.qps
            )));
        }
        let duration = parse_duration_flag(&self.duration)?;
        let run_options = RunOptions {
            qps: self.qps,
            num_threads: self.threads.max(1),
            duration: if duration.is_zero() { RunDuration::UntilAbort } else { RunDuration::Finite(duration) },
            exactly: self.exactly,
            resolution: self.resolution,
            offset: self.offset,
            percentiles: self.percentiles,
            uniform: self.uniform,
            jitter: self.jitter,
            no_catch_up: self.no_catch_up,
            sequential_warmup: self.sequential_warmup,
            allow_initial_errors: self.allow_initial_errors,
            abort_on: self.abort_on,
        };
        let http_options = self.http.into_options(self.url)?;
        Ok((run_options, http_options))
    }
}

impl HttpArgs {
    pub fn into_options(self, url: String) -> Result<HttpOptions> {
        let reuse_range = match self.conn_reuse_range.as_slice() {
            [lo, hi] => (*lo, *hi),
            [only] => (*only, *only),
            _ => return Err(AppError::InvalidOption("--conn-reuse-range expects 1 or 2 values".into())),
        };
        let request_timeout = parse_duration_flag(&self.timeout)?;
        let user_credentials = self
            .basic_auth
            .map(|s| {
                s.split_once(':')
                    .map(|(u, p)| (u.to_string(), p.to_string()))
                    .ok_or_else(|| AppError::InvalidOption(format!("bad --basic-auth {s:?}, expected user:password")))
            })
            .transpose()?;

        Ok(HttpOptions {
            url,
            num_connections: 1,
            keep_alive: !self.no_keep_alive,
            http_1_0: self.http_1_0,
            allow_half_close: self.allow_half_close,
            compression: self.compression,
            follow_redirects: false,
            payload: self.data.into_bytes(),
            content_type: self.content_type,
            extra_headers: self.headers,
            host_override: self.host,
            request_timeout,
            log_errors: self.log_errors,
            user_credentials,
            insecure_tls: self.insecure,
            resolve: self.resolve,
            conn_reuse_range: reuse_range,
            no_resolve_each_conn: self.no_resolve_each_conn,
        })
    }
}

impl ServerArgs {
    pub fn into_defaults(self) -> Result<EchoDefaultParams> {
        let max_delay = self.max_delay.map(|s| parse_duration_flag(&s)).transpose()?;
        Ok(EchoDefaultParams {
            status: self.default_status,
            size: self.default_size,
            delay: self.default_delay,
            close: self.default_close,
            gzip: self.default_gzip,
            headers: self.default_headers,
            max_delay,
        })
    }
}
