//! Fixed-configuration, logarithmically-bucketed latency histogram.
//!
//! Bucket 0..9 cover `[0, 10)` linearly (one unit per bucket); decades
//! 1..NUM_DECADES-1 cover `[10^d, 10^(d+1))` split into 10 equal-width
//! sub-buckets. Anything at or beyond the last decade, and anything
//! negative, is clamped into the histogram's range rather than rejected.

use serde::Serialize;

pub const NUM_DECADES: usize = 22;
pub const SUB_BUCKETS: usize = 10;
/// Main buckets plus one overflow bucket for values beyond the last decade.
pub const NUM_BUCKETS: usize = NUM_DECADES * SUB_BUCKETS + 1;
const OVERFLOW_BUCKET: usize = NUM_BUCKETS - 1;

/// A single latency histogram. Cheap to create, cheap to clone (counts
/// only — `offset`/`divider` are shared configuration).
#[derive(Debug, Clone)]
pub struct Histogram {
    offset: f64,
    divider: f64,
    bucket_counts: Vec<u64>,
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
    sum_of_squares: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramBucket {
    pub start: f64,
    pub end: f64,
    pub count: u64,
    pub cumulative_count: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramData {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub std_dev: f64,
    pub buckets: Vec<HistogramBucket>,
    pub percentiles: Vec<PercentileValue>,
}

impl Histogram {
    pub fn new(offset: f64, divider: f64) -> Self {
        assert!(divider > 0.0, "histogram divider must be positive");
        Self {
            offset,
            divider,
            bucket_counts: vec![0u64; NUM_BUCKETS],
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            sum_of_squares: 0.0,
        }
    }

    /// A same-configuration histogram with all counts zeroed.
    pub fn clone_empty(&self) -> Self {
        Self::new(self.offset, self.divider)
    }

    fn scale(&self, x: f64) -> f64 {
        (x - self.offset) / self.divider
    }

    /// Maps a scaled, non-negative-clamped value to a bucket index.
    fn bucket_index(v: f64) -> usize {
        if v < 0.0 {
            return 0;
        }
        if v < SUB_BUCKETS as f64 {
            return v.floor() as usize;
        }
        let decade = v.log10().floor();
        if decade >= NUM_DECADES as f64 {
            return OVERFLOW_BUCKET;
        }
        let decade_i = decade as usize;
        let base = 10f64.powi(decade_i as i32);
        let width = base * (SUB_BUCKETS as f64 - 1.0) / SUB_BUCKETS as f64;
        let sub = ((v - base) / width).floor().clamp(0.0, (SUB_BUCKETS - 1) as f64) as usize;
        decade_i * SUB_BUCKETS + sub
    }

    /// Lower edge (in scaled units) of the given bucket index.
    fn bucket_lower(index: usize) -> f64 {
        if index >= OVERFLOW_BUCKET {
            return 10f64.powi(NUM_DECADES as i32);
        }
        let decade = index / SUB_BUCKETS;
        let sub = index % SUB_BUCKETS;
        if decade == 0 {
            return sub as f64;
        }
        let base = 10f64.powi(decade as i32);
        let width = base * (SUB_BUCKETS as f64 - 1.0) / SUB_BUCKETS as f64;
        base + sub as f64 * width
    }

    fn bucket_upper(index: usize) -> f64 {
        Self::bucket_lower(index + 1)
    }

    /// Record one observation. Never fails; out-of-range values clamp
    /// into bucket 0 (underflow) or the overflow bucket.
    pub fn record(&mut self, x: f64) {
        self.count += 1;
        self.sum += x;
        self.sum_of_squares += x * x;
        if x < self.min {
            self.min = x;
        }
        if x > self.max {
            self.max = x;
        }
        let v = self.scale(x);
        let idx = Self::bucket_index(v);
        self.bucket_counts[idx] += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.max
        }
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let avg = self.avg();
        let variance = self.sum_of_squares / self.count as f64 - avg * avg;
        variance.max(0.0).sqrt()
    }

    /// Merge `other` into `self`; `other` is left zeroed.
    pub fn transfer(&mut self, other: &mut Histogram) {
        for (dst, src) in self.bucket_counts.iter_mut().zip(other.bucket_counts.iter()) {
            *dst += src;
        }
        self.count += other.count;
        self.sum += other.sum;
        self.sum_of_squares += other.sum_of_squares;
        if other.count > 0 {
            if other.min < self.min {
                self.min = other.min;
            }
            if other.max > self.max {
                self.max = other.max;
            }
        }
        *other = other.clone_empty();
    }

    /// Exact percentile via linear interpolation inside the chosen
    /// bucket. `ps` values are in `(0, 100]`.
    pub fn percentiles(&self, ps: &[f64]) -> Vec<PercentileValue> {
        if self.count == 0 {
            return ps
                .iter()
                .map(|&p| PercentileValue { percentile: p, value: 0.0 })
                .collect();
        }

        // Index of the first and last non-empty bucket, to know where
        // min/max substitute for the bucket's raw edges.
        let first_nonempty = self.bucket_counts.iter().position(|&c| c > 0).unwrap();
        let last_nonempty = self.bucket_counts.iter().rposition(|&c| c > 0).unwrap();

        ps.iter()
            .map(|&p| {
                let target = ((p / 100.0) * self.count as f64).ceil().max(1.0) as u64;
                let mut cumulative = 0u64;
                let mut chosen = OVERFLOW_BUCKET;
                let mut before = 0u64;
                for (i, &c) in self.bucket_counts.iter().enumerate() {
                    if c == 0 {
                        continue;
                    }
                    let new_cumulative = cumulative + c;
                    if new_cumulative >= target {
                        chosen = i;
                        before = cumulative;
                        break;
                    }
                    cumulative = new_cumulative;
                }

                let bucket_count = self.bucket_counts[chosen];
                let lower = if chosen == first_nonempty {
                    self.scale(self.min)
                } else {
                    Self::bucket_lower(chosen)
                };
                let upper = if chosen == last_nonempty {
                    self.scale(self.max)
                } else {
                    Self::bucket_upper(chosen)
                };

                let within = if bucket_count <= 1 {
                    0.0
                } else {
                    (target - before - 1) as f64 / (bucket_count - 1).max(1) as f64
                };
                let scaled_value = lower + within.clamp(0.0, 1.0) * (upper - lower);
                let value = scaled_value * self.divider + self.offset;
                PercentileValue {
                    percentile: p,
                    value: value.clamp(self.min, self.max),
                }
            })
            .collect()
    }

    pub fn export(&self, ps: &[f64]) -> HistogramData {
        let mut buckets = Vec::new();
        let mut cumulative = 0u64;
        for (i, &c) in self.bucket_counts.iter().enumerate() {
            if c == 0 {
                continue;
            }
            cumulative += c;
            let lower = Self::bucket_lower(i) * self.divider + self.offset;
            let upper = Self::bucket_upper(i) * self.divider + self.offset;
            buckets.push(HistogramBucket {
                start: lower,
                end: upper,
                count: c,
                cumulative_count: cumulative,
                percent: if self.count > 0 {
                    100.0 * cumulative as f64 / self.count as f64
                } else {
                    0.0
                },
            });
        }

        HistogramData {
            count: self.count,
            min: self.min(),
            max: self.max(),
            avg: self.avg(),
            std_dev: self.std_dev(),
            buckets,
            percentiles: self.percentiles(ps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_commutative_across_order() {
        let values = [0.1, 2.0, 55.0, 999.0, 0.0005, 12345.0];
        let mut forward = Histogram::new(0.0, 0.001);
        for &v in &values {
            forward.record(v);
        }
        let mut reversed = Histogram::new(0.0, 0.001);
        for &v in values.iter().rev() {
            reversed.record(v);
        }
        assert_eq!(forward.count(), reversed.count());
        assert_eq!(forward.min(), reversed.min());
        assert_eq!(forward.max(), reversed.max());
        assert!((forward.avg() - reversed.avg()).abs() < 1e-9);
        assert_eq!(forward.bucket_counts, reversed.bucket_counts);
    }

    #[test]
    fn clone_then_transfer_round_trips() {
        let mut h = Histogram::new(0.0, 0.001);
        for v in [1.0, 2.0, 3.0, 500.0, 1e6] {
            h.record(v);
        }
        let mut clone = h.clone();
        let mut empty = h.clone_empty();
        empty.transfer(&mut clone);
        assert_eq!(empty.count(), h.count());
        assert_eq!(empty.min(), h.min());
        assert_eq!(empty.max(), h.max());
        assert_eq!(empty.bucket_counts, h.bucket_counts);
        // `clone` must have been zeroed by transfer.
        assert_eq!(clone.count(), 0);
    }

    #[test]
    fn percentiles_monotone_and_bounded() {
        let mut h = Histogram::new(0.0, 0.001);
        for i in 1..=1000 {
            h.record(i as f64);
        }
        let ps = [1.0, 25.0, 50.0, 75.0, 90.0, 99.0, 99.9, 100.0];
        let values = h.percentiles(&ps);
        for w in values.windows(2) {
            assert!(w[0].value <= w[1].value, "percentiles must be non-decreasing");
        }
        for pv in &values {
            assert!(pv.value >= h.min() - 1e-6 && pv.value <= h.max() + 1e-6);
        }
    }

    #[test]
    fn sum_of_bucket_counts_equals_total_count() {
        let mut h = Histogram::new(0.0, 1.0);
        for v in [0.0, 5.0, 10.0, 99.0, 1e9, -5.0] {
            h.record(v);
        }
        let total: u64 = h.bucket_counts.iter().sum();
        assert_eq!(total, h.count());
    }

    #[test]
    fn negative_values_clamp_to_bucket_zero() {
        assert_eq!(Histogram::bucket_index(-5.0), 0);
        assert_eq!(Histogram::bucket_index(0.0), 0);
    }

    #[test]
    fn extreme_values_land_in_overflow_bucket() {
        assert_eq!(Histogram::bucket_index(1e30), OVERFLOW_BUCKET);
    }
}
