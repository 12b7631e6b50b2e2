//! Weighted grammar parsing and rolling for echo server response shaping.
//!
//! Grammar: a bare value (always selected) or a comma-separated list of
//! `value:percent` pairs whose residual probability (100 minus the sum)
//! selects a caller-supplied default.

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GrammarError {
    #[error("empty grammar entry")]
    Empty,
    #[error("malformed entry {0:?}")]
    Malformed(String),
    #[error("negative percent in entry {0:?}")]
    NegativePercent(String),
    #[error("percents sum to more than 100: {0}")]
    PercentOverflow(f64),
    #[error("malformed duration {0:?}")]
    BadDuration(String),
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    cumulative: f64,
}

/// A parsed `value:percent,...` grammar for some value type `T`.
#[derive(Debug, Clone)]
pub struct WeightedGrammar<T> {
    entries: Vec<Entry<T>>,
    default: T,
}

impl<T: Clone> WeightedGrammar<T> {
    pub fn parse(
        input: &str,
        parse_value: impl Fn(&str) -> Result<T, GrammarError>,
        default: T,
    ) -> Result<Self, GrammarError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(GrammarError::Empty);
        }
        if !input.contains(':') {
            let value = parse_value(input)?;
            return Ok(Self {
                entries: vec![Entry { value, cumulative: 100.0 }],
                default,
            });
        }

        let mut entries = Vec::new();
        let mut cumulative = 0.0f64;
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(GrammarError::Malformed(input.to_string()));
            }
            let (value_text, percent_text) = part
                .rsplit_once(':')
                .ok_or_else(|| GrammarError::Malformed(part.to_string()))?;
            let percent: f64 = percent_text
                .trim()
                .parse()
                .map_err(|_| GrammarError::Malformed(part.to_string()))?;
            if percent < 0.0 {
                return Err(GrammarError::NegativePercent(part.to_string()));
            }
            // Round to stabilize floating-point drift around "exactly 100".
            let percent = (percent * 1_000_000.0).round() / 1_000_000.0;
            cumulative += percent;
            if cumulative > 100.0 + 1e-9 {
                return Err(GrammarError::PercentOverflow(cumulative));
            }
            let value = parse_value(value_text.trim())?;
            entries.push(Entry { value, cumulative });
        }

        Ok(Self { entries, default })
    }

    /// Draw `r ∈ [0,100)` and walk the cumulative table; the first
    /// entry whose cumulative percent is `≥ r` wins, else the default.
    pub fn roll(&self, rng: &mut impl Rng) -> T {
        let r: f64 = rng.gen_range(0.0..100.0);
        for entry in &self.entries {
            if entry.cumulative >= r {
                return entry.value.clone();
            }
        }
        self.default.clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum BoolGrammar {
    Always,
    Never,
    Probability(f64),
}

impl BoolGrammar {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.eq_ignore_ascii_case("true") {
            return BoolGrammar::Always;
        }
        if input.eq_ignore_ascii_case("false") || input.is_empty() {
            return BoolGrammar::Never;
        }
        match input.parse::<f64>() {
            Ok(pct) => BoolGrammar::Probability(pct.clamp(0.0, 100.0)),
            Err(_) => BoolGrammar::Always,
        }
    }

    pub fn roll(&self, rng: &mut impl Rng) -> bool {
        match self {
            BoolGrammar::Always => true,
            BoolGrammar::Never => false,
            BoolGrammar::Probability(pct) => rng.gen_range(0.0..100.0) < *pct,
        }
    }
}

/// Parses `ns|us|ms|s|m|h` duration literals (e.g. `100ms`, `1.5s`).
pub fn parse_duration(input: &str) -> Result<Duration, GrammarError> {
    let input = input.trim();
    let split_at = input
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| GrammarError::BadDuration(input.to_string()))?;
    let (number, suffix) = input.split_at(split_at);
    let n: f64 = number.parse().map_err(|_| GrammarError::BadDuration(input.to_string()))?;
    let seconds = match suffix {
        "ns" => n / 1e9,
        "us" => n / 1e6,
        "ms" => n / 1e3,
        "s" => n,
        "m" => n * 60.0,
        "h" => n * 3600.0,
        _ => return Err(GrammarError::BadDuration(input.to_string())),
    };
    if seconds < 0.0 {
        return Err(GrammarError::BadDuration(input.to_string()));
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// Clamps a parsed delay to `max_delay` (default 1.5s per caller).
pub fn clamp_delay(d: Duration, max_delay: Duration) -> Duration {
    d.min(max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn parse_int(s: &str) -> Result<i64, GrammarError> {
        s.parse().map_err(|_| GrammarError::Malformed(s.to_string()))
    }

    #[test]
    fn single_literal_always_wins() {
        let g = WeightedGrammar::parse("418", parse_int, 200).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            assert_eq!(g.roll(&mut rng), 418);
        }
    }

    #[test]
    fn residual_probability_selects_default() {
        let g = WeightedGrammar::parse("503:20", parse_int, 200).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let mut defaults = 0;
        let mut fivezerothree = 0;
        for _ in 0..10_000 {
            match g.roll(&mut rng) {
                200 => defaults += 1,
                503 => fivezerothree += 1,
                other => panic!("unexpected value {other}"),
            }
        }
        let frac = fivezerothree as f64 / 10_000.0;
        assert!((0.17..0.23).contains(&frac), "frac={frac}");
        assert!(defaults > 0);
    }

    #[test]
    fn mixed_distribution_converges() {
        let g = WeightedGrammar::parse("503:20,404:10,403:0.5", parse_int, 200).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut counts = std::collections::HashMap::new();
        for _ in 0..10_000 {
            *counts.entry(g.roll(&mut rng)).or_insert(0u64) += 1;
        }
        let frac = |code: i64| *counts.get(&code).unwrap_or(&0) as f64 / 10_000.0;
        assert!((0.17..0.23).contains(&frac(503)), "503 frac={}", frac(503));
        assert!((0.08..0.12).contains(&frac(404)), "404 frac={}", frac(404));
        assert!((0.002..0.01).contains(&frac(403)), "403 frac={}", frac(403));
        assert!((0.66..0.72).contains(&frac(200)), "200 frac={}", frac(200));
    }

    #[test]
    fn rejects_percent_sum_over_100() {
        let err = WeightedGrammar::parse("a:60,b:50", |s| Ok(s.to_string()), "x".to_string()).unwrap_err();
        assert!(matches!(err, GrammarError::PercentOverflow(_)));
    }

    #[test]
    fn rejects_negative_percent() {
        let err = WeightedGrammar::parse("a:-5", |s| Ok(s.to_string()), "x".to_string()).unwrap_err();
        assert!(matches!(err, GrammarError::NegativePercent(_)));
    }

    #[test]
    fn bool_grammar_literals() {
        let mut rng = StdRng::seed_from_u64(4);
        assert!(BoolGrammar::parse("true").roll(&mut rng));
        assert!(!BoolGrammar::parse("false").roll(&mut rng));
        assert!(!BoolGrammar::parse("").roll(&mut rng));
        assert!(BoolGrammar::parse("notanumber").roll(&mut rng));
    }

    #[test]
    fn bool_grammar_probability_converges() {
        let g = BoolGrammar::parse("25");
        let mut rng = StdRng::seed_from_u64(5);
        let hits = (0..10_000).filter(|_| g.roll(&mut rng)).count();
        let frac = hits as f64 / 10_000.0;
        assert!((0.20..0.30).contains(&frac), "frac={frac}");
    }

    #[test]
    fn duration_suffixes_parse() {
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn delay_clamps_to_max() {
        let d = parse_duration("10s").unwrap();
        let clamped = clamp_delay(d, Duration::from_millis(1500));
        assert_eq!(clamped, Duration::from_millis(1500));
    }
}
