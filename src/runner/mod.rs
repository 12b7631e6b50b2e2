//! Orchestrates a full load run: warmup, N OS-thread workers paced
//! independently, then serial aggregation of their results.

pub mod schedule;
pub mod worker;

use std::sync::Arc;
use std::time::Instant;

use rand::Rng;

use crate::abort::AbortFlag;
use crate::client::{FastClient, SOCKET_ERROR};
use crate::config::{HttpOptions, RunOptions};
use crate::histogram::Histogram;
use crate::result::{Aggregator, RunResult};
use crate::uuidgen::SharedUuidSource;
use schedule::Schedule;
use worker::{run_worker, spawn_duration_timer, warmup_fetch, WorkerPlan};

pub struct Runner;

impl Runner {
    pub fn run(run_opts: RunOptions, http_opts: HttpOptions, abort: AbortFlag) -> RunResult {
        let http_opts = Arc::new(http_opts);
        let uuid_source = SharedUuidSource::new();
        let base_seed: u64 = rand::thread_rng().gen();

        let mut clients = Vec::with_capacity(run_opts.num_threads);
        for id in 0..run_opts.num_threads {
            let seed = base_seed.wrapping_add(id as u64);
            match FastClient::new(http_opts.clone(), uuid_source.clone(), seed) {
                Ok(client) => clients.push(client),
                Err(e) => {
                    return Aggregator::error_result(run_opts, &format!("invalid target url: {e}"));
                }
            }
        }

        if let Err(message) = warmup(&mut clients, run_opts.sequential_warmup, run_opts.allow_initial_errors) {
            return Aggregator::error_result(run_opts, &message);
        }

        let histogram_template = Histogram::new(run_opts.offset, run_opts.resolution);
        let per_thread_qps = run_opts.per_thread_qps();
        let per_thread_budget = run_opts.per_thread_exactly();

        let start = Instant::now();
        let _duration_timer = spawn_duration_timer(run_opts.duration, abort.clone());

        let handles: Vec<_> = clients
            .into_iter()
            .enumerate()
            .map(|(id, client)| {
                let seed = base_seed.wrapping_add(id as u64).wrapping_add(0x9E37_79B9);
                let schedule = Schedule::new(start, per_thread_qps, run_opts.uniform, run_opts.jitter, seed);
                let plan = WorkerPlan {
                    id,
                    deadline: worker::deadline_for(run_opts.duration, start),
                    call_budget: per_thread_budget,
                    no_catch_up: run_opts.no_catch_up,
                    abort_on: run_opts.abort_on,
                    histogram_template: histogram_template.clone(),
                };
                let abort = abort.clone();
                std::thread::spawn(move || run_worker(client, schedule, plan, abort))
            })
            .collect();

        let mut aggregator = Aggregator::new(&histogram_template, &histogram_template);
        for handle in handles {
            match handle.join() {
                Ok(worker_result) => aggregator.absorb(worker_result),
                Err(_) => tracing::error!("a worker thread panicked; its results are lost"),
            }
        }

        let actual_duration = start.elapsed();
        let aborted = abort.is_set();
        aggregator.finish(run_opts, actual_duration, aborted)
    }
}

/// Issues one untimed request per client to establish connections and
/// surface configuration errors before the clock starts. Returns the
/// first failure message when warmup fails and errors are not allowed.
fn warmup(clients: &mut [FastClient], sequential: bool, allow_errors: bool) -> Result<(), String> {
    let failures: Vec<bool> = if sequential {
        clients.iter_mut().map(|c| warmup_fetch(c) == SOCKET_ERROR).collect()
    } else {
        std::thread::scope(|scope| {
            let handles: Vec<_> = clients
                .iter_mut()
                .map(|c| scope.spawn(|| warmup_fetch(c) == SOCKET_ERROR))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap_or(true)).collect()
        })
    };

    let failed = failures.iter().filter(|&&f| f).count();
    if failed > 0 && !allow_errors {
        return Err(format!("{failed} of {} warmup connections failed", clients.len()));
    }
    Ok(())
}
