//! Per-worker pacing loop.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::abort::AbortFlag;
use crate::client::FastClient;
use crate::config::RunDuration;
use crate::histogram::Histogram;
use crate::result::WorkerResult;
use crate::runner::schedule::Schedule;

pub struct WorkerPlan {
    pub id: usize,
    pub deadline: Option<Instant>,
    pub call_budget: Option<u64>,
    pub no_catch_up: bool,
    pub abort_on: Option<i64>,
    pub histogram_template: Histogram,
}

/// One untimed request used to establish the connection and surface
/// early errors before the clock starts.
pub fn warmup_fetch(client: &mut FastClient) -> i64 {
    let outcome = client.fetch();
    outcome.status_code
}

pub fn run_worker(
    mut client: FastClient,
    mut schedule: Schedule,
    plan: WorkerPlan,
    abort: AbortFlag,
) -> WorkerResult {
    let mut histogram = plan.histogram_template.clone_empty();
    let mut connect_histogram = plan.histogram_template.clone_empty();
    let mut codes: HashMap<i64, u64> = HashMap::new();
    let mut calls_done: u64 = 0;

    loop {
        if abort.is_set() {
            break;
        }
        if let Some(budget) = plan.call_budget {
            if calls_done >= budget {
                break;
            }
        }
        if let Some(deadline) = plan.deadline {
            if Instant::now() >= deadline {
                break;
            }
        }

        if let Some(scheduled) = schedule.next_scheduled() {
            let now = Instant::now();
            if scheduled > now {
                let delta = scheduled - now;
                if abort.sleep_or_abort(delta) {
                    break;
                }
            } else if now > scheduled && plan.no_catch_up {
                schedule.replan_from_now(now);
            }
            // else: behind schedule and catch-up allowed — fire immediately.
        }

        if abort.is_set() {
            break;
        }
        if let Some(deadline) = plan.deadline {
            if Instant::now() >= deadline {
                break;
            }
        }

        let t0 = Instant::now();
        let outcome = client.fetch();
        let elapsed = t0.elapsed();
        histogram.record(elapsed.as_secs_f64());
        if let Some(connect_time) = outcome.connect_time {
            connect_histogram.record(connect_time.as_secs_f64());
        }
        *codes.entry(outcome.status_code).or_insert(0) += 1;
        calls_done += 1;

        if let Some(code) = plan.abort_on {
            if outcome.status_code == code {
                tracing::warn!(worker = plan.id, code, "abort_on code observed, tripping abort flag");
                abort.abort();
                break;
            }
        }
    }

    WorkerResult {
        histogram,
        connect_histogram,
        codes,
        socket_count: client.socket_count,
        ip_usage: client.ip_usage,
    }
}

pub fn deadline_for(duration: RunDuration, start: Instant) -> Option<Instant> {
    match duration {
        RunDuration::Finite(d) => Some(start + d),
        RunDuration::UntilAbort => None,
    }
}

/// Sleeps out the finite duration (if any) then trips `abort`, giving
/// every worker a bounded, externally-visible stop signal even though
/// each worker also self-times against `plan.deadline`.
pub fn spawn_duration_timer(duration: RunDuration, abort: AbortFlag) -> Option<std::thread::JoinHandle<()>> {
    match duration {
        RunDuration::Finite(d) => Some(std::thread::spawn(move || {
            abort_after(abort, d);
        })),
        RunDuration::UntilAbort => None,
    }
}

fn abort_after(abort: AbortFlag, d: Duration) {
    abort.sleep_or_abort(d);
}
