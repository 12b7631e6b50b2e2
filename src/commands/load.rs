//! `load` subcommand: runs the full pacing/aggregation pipeline.

use crate::abort::AbortFlag;
use crate::cli::LoadArgs;
use crate::result::RunResult;
use crate::runner::Runner;

pub fn execute(args: LoadArgs) -> i32 {
    let json = args.json;
    let (run_opts, http_opts) = match args.into_options() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("error: {e}");
            return e.exit_code();
        }
    };

    let abort = AbortFlag::new();
    let result = Runner::run(run_opts, http_opts, abort);

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error serializing result: {e}");
                return 1;
            }
        }
    } else {
        print_summary(&result);
    }

    if result.init_error {
        1
    } else {
        0
    }
}

fn print_summary(result: &RunResult) {
    println!("Requests: {}", result.histogram.count);
    println!("Duration: {:.3}s", result.actual_duration.as_secs_f64());
    println!("Actual QPS: {:.2}", result.actual_qps);
    println!(
        "Latency: avg {:.3}ms, min {:.3}ms, max {:.3}ms, std_dev {:.3}ms",
        result.histogram.avg * 1000.0,
        result.histogram.min * 1000.0,
        result.histogram.max * 1000.0,
        result.histogram.std_dev * 1000.0,
    );
    for pv in &result.histogram.percentiles {
        println!("  p{:<6} {:.3}ms", pv.percentile, pv.value * 1000.0);
    }
    println!("Sockets opened: {}", result.socket_count);
    let mut codes: Vec<_> = result.retcodes.iter().collect();
    codes.sort_by_key(|(code, _)| **code);
    print!("Status codes:");
    for (code, count) in codes {
        print!(" {code}={count}");
    }
    println!();
    if result.aborted {
        println!("Run was aborted before completion.");
    }
}
