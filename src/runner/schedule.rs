//! Open-loop pacing: uniform or Poisson-spaced schedules with
//! catch-up/no-catch-up semantics.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub enum Schedule {
    /// `qps < 0`: run as fast as possible, no pacing at all.
    Unpaced,
    Paced(Paced),
}

pub struct Paced {
    origin: Instant,
    per_thread_qps: f64,
    uniform: bool,
    index: u64,
    poisson_cursor: Instant,
    rng: StdRng,
}

impl Schedule {
    pub fn new(
        start: Instant,
        per_thread_qps: Option<f64>,
        uniform: bool,
        jitter: bool,
        seed: u64,
    ) -> Self {
        match per_thread_qps {
            None => Schedule::Unpaced,
            Some(qps) => {
                let mut rng = StdRng::seed_from_u64(seed);
                let period = Duration::from_secs_f64(1.0 / qps);
                let origin = if jitter {
                    start + period.mul_f64(rng.gen_range(0.0..1.0))
                } else {
                    start
                };
                Schedule::Paced(Paced {
                    origin,
                    per_thread_qps: qps,
                    uniform,
                    index: 0,
                    poisson_cursor: origin,
                    rng,
                })
            }
        }
    }

    /// The next scheduled absolute time for a call, or `None` if unpaced.
    pub fn next_scheduled(&mut self) -> Option<Instant> {
        match self {
            Schedule::Unpaced => None,
            Schedule::Paced(p) => Some(p.next_scheduled()),
        }
    }

    /// Re-anchor the schedule at `now` — used when `no_catch_up` is
    /// set and a call arrived late, so the worker does not fire a
    /// burst of back-to-back catch-up calls.
    pub fn replan_from_now(&mut self, now: Instant) {
        if let Schedule::Paced(p) = self {
            p.origin = now;
            p.index = 0;
            p.poisson_cursor = now;
        }
    }
}

impl Paced {
    fn next_scheduled(&mut self) -> Instant {
        if self.uniform {
            let t = self.origin + Duration::from_secs_f64(self.index as f64 / self.per_thread_qps);
            self.index += 1;
            t
        } else {
            let t = self.poisson_cursor;
            // Exponential interarrival time with rate `per_thread_qps`.
            let u: f64 = self.rng.gen_range(f64::EPSILON..1.0);
            let interval = -u.ln() / self.per_thread_qps;
            self.poisson_cursor = t + Duration::from_secs_f64(interval);
            t
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpaced_schedule_never_sleeps() {
        let mut s = Schedule::new(Instant::now(), None, false, false, 1);
        assert!(s.next_scheduled().is_none());
    }

    #[test]
    fn uniform_schedule_spaces_calls_evenly() {
        let start = Instant::now();
        let mut s = Schedule::new(start, Some(10.0), true, false, 1);
        let t0 = s.next_scheduled().unwrap();
        let t1 = s.next_scheduled().unwrap();
        let t2 = s.next_scheduled().unwrap();
        let d1 = t1.duration_since(t0).as_secs_f64();
        let d2 = t2.duration_since(t1).as_secs_f64();
        assert!((d1 - 0.1).abs() < 1e-9);
        assert!((d2 - 0.1).abs() < 1e-9);
    }

    #[test]
    fn poisson_schedule_is_monotone_nondecreasing() {
        let mut s = Schedule::new(Instant::now(), Some(100.0), false, false, 7);
        let mut prev = s.next_scheduled().unwrap();
        for _ in 0..100 {
            let t = s.next_scheduled().unwrap();
            assert!(t >= prev);
            prev = t;
        }
    }

    #[test]
    fn replan_resets_uniform_baseline() {
        let start = Instant::now();
        let mut s = Schedule::new(start, Some(10.0), true, false, 1);
        let _ = s.next_scheduled();
        let _ = s.next_scheduled();
        let now = Instant::now();
        s.replan_from_now(now);
        let next = s.next_scheduled().unwrap();
        assert_eq!(next, now);
    }
}
