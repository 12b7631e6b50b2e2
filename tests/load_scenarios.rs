//! End-to-end scenarios driving the runner against an in-process echo
//! server: deterministic status shaping, mixed-status convergence,
//! exact call counts, abort-on-code, and connection reuse accounting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use barrage::abort::AbortFlag;
use barrage::config::{HttpOptions, RunDuration, RunOptions};
use barrage::echo::server::{router, EchoDefaultParams, EchoDefaults};
use barrage::result::RunResult;
use barrage::runner::Runner;

async fn spawn_echo_server(params: EchoDefaultParams) -> SocketAddr {
    let defaults = Arc::new(EchoDefaults::from_params(params).unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(defaults);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn base_run_options() -> RunOptions {
    RunOptions {
        qps: 0.0,
        num_threads: 1,
        duration: RunDuration::Finite(Duration::from_secs(1)),
        exactly: None,
        resolution: 0.0001,
        offset: 0.0,
        percentiles: vec![50.0, 90.0, 99.0],
        uniform: false,
        jitter: false,
        no_catch_up: false,
        sequential_warmup: false,
        allow_initial_errors: false,
        abort_on: None,
    }
}

fn base_http_options(url: String) -> HttpOptions {
    HttpOptions {
        url,
        num_connections: 1,
        keep_alive: true,
        http_1_0: false,
        allow_half_close: false,
        compression: false,
        follow_redirects: false,
        payload: Vec::new(),
        content_type: None,
        extra_headers: Vec::new(),
        host_override: None,
        request_timeout: Duration::from_secs(3),
        log_errors: false,
        user_credentials: None,
        insecure_tls: false,
        resolve: None,
        conn_reuse_range: (0, 0),
        no_resolve_each_conn: false,
    }
}

async fn run(run_opts: RunOptions, http_opts: HttpOptions) -> RunResult {
    tokio::task::spawn_blocking(move || Runner::run(run_opts, http_opts, AbortFlag::new()))
        .await
        .unwrap()
}

#[tokio::test]
async fn deterministic_status_shaping() {
    let params = EchoDefaultParams {
        status: Some("418".to_string()),
        ..Default::default()
    };
    let addr = spawn_echo_server(params).await;

    let mut run_opts = base_run_options();
    run_opts.qps = 50.0;
    run_opts.num_threads = 2;
    run_opts.duration = RunDuration::Finite(Duration::from_secs(1));
    let http_opts = base_http_options(format!("http://{addr}/echo"));

    let result = run(run_opts, http_opts).await;
    assert_eq!(result.retcodes.len(), 1);
    assert_eq!(*result.retcodes.get(&418).unwrap(), result.histogram.count);
    let n = result.histogram.count;
    assert!((45..=55).contains(&n), "expected ~50 requests, got {n}");
}

#[tokio::test]
async fn mixed_status_distribution_converges() {
    let addr = spawn_echo_server(EchoDefaultParams::default()).await;

    let mut run_opts = base_run_options();
    run_opts.qps = -1.0;
    run_opts.num_threads = 4;
    run_opts.exactly = Some(5000);
    let http_opts = base_http_options(format!("http://{addr}/echo?status=503:20,404:10,403:0.5"));

    let result = run(run_opts, http_opts).await;
    let total = result.histogram.count as f64;
    let frac = |code: i64| *result.retcodes.get(&code).unwrap_or(&0) as f64 / total;

    assert!((0.17..0.23).contains(&frac(503)), "503 frac={}", frac(503));
    assert!((0.08..0.12).contains(&frac(404)), "404 frac={}", frac(404));
    assert!((0.002..0.01).contains(&frac(403)), "403 frac={}", frac(403));
    assert!((0.66..0.72).contains(&frac(200)), "200 frac={}", frac(200));
}

#[tokio::test]
async fn exact_call_count_is_honored() {
    let addr = spawn_echo_server(EchoDefaultParams::default()).await;

    let mut run_opts = base_run_options();
    run_opts.qps = 8.0;
    run_opts.num_threads = 4;
    run_opts.exactly = Some(40);
    run_opts.abort_on = Some(404);
    run_opts.duration = RunDuration::UntilAbort;
    let http_opts = base_http_options(format!("http://{addr}/echo"));

    let result = run(run_opts, http_opts).await;
    assert_eq!(result.histogram.count, 40);
    assert_eq!(*result.retcodes.get(&200).unwrap(), 40);
    assert!(
        (4.0..6.5).contains(&result.actual_duration.as_secs_f64()),
        "expected ~5s, got {:?}",
        result.actual_duration
    );
}

#[tokio::test]
async fn abort_on_code_bounds_total_calls() {
    let params = EchoDefaultParams {
        status: Some("404".to_string()),
        ..Default::default()
    };
    let addr = spawn_echo_server(params).await;

    let mut run_opts = base_run_options();
    run_opts.qps = 8.0;
    run_opts.num_threads = 4;
    run_opts.exactly = Some(40);
    run_opts.abort_on = Some(404);
    run_opts.duration = RunDuration::UntilAbort;
    let http_opts = base_http_options(format!("http://{addr}/echo"));
    let num_threads = run_opts.num_threads;

    let result = run(run_opts, http_opts).await;
    assert!(result.aborted);
    assert!(
        result.histogram.count <= num_threads as u64,
        "count={} threads={}",
        result.histogram.count,
        num_threads
    );
}

#[tokio::test]
async fn connection_reuse_range_bounds_socket_count() {
    let addr = spawn_echo_server(EchoDefaultParams::default()).await;

    let mut run_opts = base_run_options();
    run_opts.qps = -1.0;
    run_opts.num_threads = 1;
    run_opts.exactly = Some(10);
    let mut http_opts = base_http_options(format!("http://{addr}/echo"));
    http_opts.conn_reuse_range = (3, 3);

    let result = run(run_opts, http_opts).await;
    assert_eq!(result.histogram.count, 10);
    assert_eq!(result.socket_count, 4);
}
