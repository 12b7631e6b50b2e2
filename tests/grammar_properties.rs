//! Property tests for the echo server's weighted grammar: every roll
//! must land on a declared value or the default, and single-literal
//! grammars must always win.

use barrage::echo::grammar::WeightedGrammar;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn parse_int(s: &str) -> Result<i64, barrage::echo::grammar::GrammarError> {
    s.parse().map_err(|_| barrage::echo::grammar::GrammarError::Malformed(s.to_string()))
}

proptest! {
    #[test]
    fn single_literal_grammar_always_returns_that_value(value in 100i64..600, seed in any::<u64>()) {
        let grammar = WeightedGrammar::parse(&value.to_string(), parse_int, 200).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..20 {
            prop_assert_eq!(grammar.roll(&mut rng), value);
        }
    }

    #[test]
    fn weighted_roll_only_yields_declared_values_or_default(
        a in 100i64..600,
        pct in 0.0f64..100.0,
        default in 100i64..600,
        seed in any::<u64>(),
    ) {
        let text = format!("{a}:{pct}");
        let grammar = WeightedGrammar::parse(&text, parse_int, default).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..50 {
            let rolled = grammar.roll(&mut rng);
            prop_assert!(rolled == a || rolled == default);
        }
    }
}
