//! Property tests for the clock and env parsing helpers.

use std::time::Duration;

use proptest::prelude::*;
use rampart_core::env::parse_flag;
use rampart_core::{Clock, ManualClock};

proptest! {
    #[test]
    fn prop_manual_clock_sums_advances(steps in prop::collection::vec(0u64..10_000, 0..50)) {
        let clock = ManualClock::new();
        let start = clock.now();
        let mut previous = start;

        for millis in &steps {
            clock.advance(Duration::from_millis(*millis));
            let now = clock.now();
            prop_assert!(now >= previous);
            previous = now;
        }

        let total = Duration::from_millis(steps.iter().sum());
        prop_assert_eq!(clock.now().duration_since(start), total);
        prop_assert_eq!(clock.elapsed(), total);
    }

    #[test]
    fn prop_flag_parsing_ignores_case_and_padding(
        word in prop::sample::select(vec!["true", "false", "yes", "no", "on", "off", "1", "0"]),
        upper in any::<bool>(),
        pad in 0usize..3,
    ) {
        let expected = matches!(word, "true" | "yes" | "on" | "1");
        let cased = if upper { word.to_ascii_uppercase() } else { word.to_string() };
        let raw = format!("{}{}{}", " ".repeat(pad), cased, " ".repeat(pad));
        prop_assert_eq!(parse_flag(&raw), Some(expected));
    }

    #[test]
    fn prop_unknown_flags_are_rejected(raw in "[a-z]{2,8}") {
        prop_assume!(!matches!(raw.as_str(), "true" | "false" | "yes" | "no" | "on" | "off"));
        prop_assert_eq!(parse_flag(&raw), None);
    }
}
