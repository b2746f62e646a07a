//! Property-based tests for where-clause combinators.

use proptest::prelude::*;
use serde_json::json;
use tessera_core::{Key, Value};
use tessera_query::{RecordView, Where};

struct Row {
    key: Key,
    data: Value,
}

impl RecordView for Row {
    fn key(&self) -> &Key {
        &self.key
    }

    fn data(&self) -> Option<Value> {
        Some(self.data.clone())
    }
}

fn clause(expected: bool) -> Where {
    Where::test(move |_| expected)
}

proptest! {
    #[test]
    fn and_matches_iff_all_match(outcomes in prop::collection::vec(any::<bool>(), 0..12)) {
        let row = Row { key: Value::Int(1), data: Value::from(json!({})) };
        let union = Where::and(outcomes.iter().copied().map(clause).collect());
        let expected = !outcomes.is_empty() && outcomes.iter().all(|o| *o);
        prop_assert_eq!(union.matches(&row), expected);
    }

    #[test]
    fn or_matches_iff_any_match(outcomes in prop::collection::vec(any::<bool>(), 0..12)) {
        let row = Row { key: Value::Int(1), data: Value::from(json!({})) };
        let union = Where::or(outcomes.iter().copied().map(clause).collect());
        prop_assert_eq!(union.matches(&row), outcomes.iter().any(|o| *o));
    }

    #[test]
    fn ordering_tests_agree_with_integers(field in -50i64..50, against in -50i64..50) {
        let row = Row { key: Value::Int(1), data: Value::from(json!({ "n": field })) };
        prop_assert_eq!(Where::field("n").gt(against).matches(&row), field > against);
        prop_assert_eq!(Where::field("n").lt(against).matches(&row), field < against);
        prop_assert_eq!(Where::field("n").gte(against).matches(&row), field >= against);
        prop_assert_eq!(Where::field("n").lte(against).matches(&row), field <= against);
        prop_assert_eq!(Where::field("n").eq(against).matches(&row), field == against);
        prop_assert_eq!(Where::field("n").ne(against).matches(&row), field != against);
    }
}
