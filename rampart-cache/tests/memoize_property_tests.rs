//! Property tests for memoization keys.

use proptest::prelude::*;
use rampart_cache::{cache_key, CallArgs};

fn call(a: i64, kwargs: &[(&str, i64)]) -> CallArgs {
    kwargs
        .iter()
        .try_fold(CallArgs::new().arg(&a).expect("positional"), |args, (name, value)| {
            args.kwarg(*name, value)
        })
        .expect("keywords")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Keyword order never matters.
    #[test]
    fn prop_keyword_permutations_share_key(a in any::<i64>(), b in any::<i64>(), c in any::<i64>()) {
        let forward = call(a, &[("b", b), ("c", c)]);
        let reverse = call(a, &[("c", c), ("b", b)]);
        prop_assert_eq!(cache_key("memo", "f", &forward), cache_key("memo", "f", &reverse));
    }

    /// Any change to an argument value changes the key.
    #[test]
    fn prop_different_values_differ(a in any::<i64>(), b in any::<i64>(), other in any::<i64>(), c in any::<i64>()) {
        prop_assume!(b != other);
        let first = call(a, &[("b", b), ("c", c)]);
        let second = call(a, &[("b", other), ("c", c)]);
        prop_assert_ne!(cache_key("memo", "f", &first), cache_key("memo", "f", &second));
    }

    /// Swapping a keyword's name changes the key even when values match.
    #[test]
    fn prop_keyword_names_matter(a in any::<i64>(), v in any::<i64>()) {
        let as_b = call(a, &[("b", v)]);
        let as_c = call(a, &[("c", v)]);
        prop_assert_ne!(as_b.digest(), as_c.digest());
    }

    /// Keys have a fixed shape regardless of argument size.
    #[test]
    fn prop_key_length_is_bounded(values in prop::collection::vec(any::<String>(), 0..20)) {
        let args = CallArgs::new().arg(&values).expect("positional");
        let key = cache_key("memo", "f", &args);
        prop_assert_eq!(key.len(), "memo:f:".len() + 64);
    }

    /// Finite floats always encode and never collide with `None`; other
    /// floats are refused rather than encoded as `null`.
    #[test]
    fn prop_float_arguments_never_alias_none(x in any::<f64>()) {
        let none = CallArgs::new().arg(&None::<f64>).expect("none");
        match CallArgs::new().arg(&Some(x)) {
            Ok(args) => {
                prop_assert!(x.is_finite());
                prop_assert_ne!(cache_key("memo", "f", &args), cache_key("memo", "f", &none));
            }
            Err(_) => prop_assert!(!x.is_finite()),
        }
    }
}

#[test]
fn test_reordered_keywords_share_key() {
    let f1 = call(1, &[("b", 1), ("c", 2)]);
    let f2 = call(1, &[("c", 2), ("b", 1)]);
    let f3 = call(1, &[("b", 2), ("c", 2)]);
    assert_eq!(cache_key("", "f", &f1), cache_key("", "f", &f2));
    assert_ne!(cache_key("", "f", &f1), cache_key("", "f", &f3));
}
