//! Property-based tests for tessera-core values using proptest.

use proptest::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tessera_core::Value;

fn hash_of(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1_000_000i64..1_000_000).prop_map(Value::Int),
        (-1_000_000i64..1_000_000).prop_map(|i| Value::Float(i as f64 / 4.0)),
        "[a-z]{0,6}".prop_map(Value::String),
    ]
}

/// Numbers around 2^53, where f64 stops holding every integer.
fn wide_number() -> impl Strategy<Value = Value> {
    const EDGE: i64 = 1 << 53;
    prop_oneof![
        (-4i64..=4).prop_map(|d| Value::Int(EDGE + d)),
        (-4i64..=4).prop_map(|d| Value::Int(-EDGE + d)),
        (-4i64..=4).prop_map(|d| Value::Float((EDGE + d) as f64)),
        (-4i64..=4).prop_map(|d| Value::Float((-EDGE + d) as f64)),
        Just(Value::Int(i64::MAX)),
        Just(Value::Int(i64::MIN)),
        Just(Value::Float(9_223_372_036_854_775_808.0)),
        Just(Value::Float(-9_223_372_036_854_775_808.0)),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-c]", inner, 0..4).prop_map(Value::Object),
        ]
    })
}

proptest! {
    /// Equal values hash equally, including ints against integral floats.
    #[test]
    fn equal_values_hash_equally(a in value(), b in value()) {
        if a == b {
            prop_assert_eq!(hash_of(&a), hash_of(&b));
        }
    }

    #[test]
    fn integral_floats_equal_ints(i in -1_000_000i64..1_000_000) {
        let int = Value::Int(i);
        let float = Value::Float(i as f64);
        prop_assert_eq!(&int, &float);
        prop_assert_eq!(hash_of(&int), hash_of(&float));
    }

    /// The total order is antisymmetric and transitive.
    #[test]
    fn ordering_is_total(a in value(), b in value(), c in value()) {
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        if a <= b && b <= c {
            prop_assert!(a <= c);
        }
    }

    /// Int/Float comparison stays exact past 2^53.
    #[test]
    fn wide_numbers_order_consistently(a in wide_number(), b in wide_number(), c in wide_number()) {
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        if a <= b && b <= c {
            prop_assert!(a <= c);
        }
        if a == b {
            prop_assert_eq!(hash_of(&a), hash_of(&b));
        }
    }

    #[test]
    fn ints_past_float_precision_stay_distinct(d in 1i64..1_000) {
        let edge = 1i64 << 53;
        let float = Value::Float(edge as f64);
        prop_assert_eq!(Value::Int(edge), float.clone());
        prop_assert!(Value::Int(edge + 2 * d - 1) > float);
        prop_assert!(Value::Int(-edge - 2 * d + 1) < Value::Float(-edge as f64));
    }

    /// `compare` agrees with the total order where it answers at all.
    #[test]
    fn compare_refines_ordering(a in scalar(), b in scalar()) {
        match a.compare(&b) {
            Some(ordering) => prop_assert_eq!(ordering, a.cmp(&b)),
            None => prop_assert!(
                a.is_null()
                    || b.is_null()
                    || std::mem::discriminant(&a) != std::mem::discriminant(&b)
            ),
        }
    }

    /// Values survive a trip through serde_json.
    #[test]
    fn json_conversion_preserves_value(v in value()) {
        let json: serde_json::Value = v.clone().into();
        prop_assert_eq!(Value::from(json), v);
    }
}
