use std::cmp::Ordering;

use remindly_storage::{Filter, FilterOp, Query};
use serde_json::Value;

/// Check if a document's fields satisfy every filter in the query.
pub fn matches_query(data: &Value, query: &Query) -> bool {
    query.filters.iter().all(|filter| matches_filter(data, filter))
}

/// Check a single `field <op> value` predicate.
///
/// A missing field never matches. Values of different JSON types never match,
/// so a range filter on a number field skips documents holding a string there.
pub fn matches_filter(data: &Value, filter: &Filter) -> bool {
    let Some(actual) = data.get(&filter.field) else {
        return false;
    };

    if filter.op == FilterOp::Eq {
        return match compare_values(actual, &filter.value) {
            Some(ordering) => ordering == Ordering::Equal,
            None => actual == &filter.value,
        };
    }

    let Some(ordering) = compare_values(actual, &filter.value) else {
        return false;
    };

    match filter.op {
        FilterOp::Eq => ordering == Ordering::Equal,
        FilterOp::Lt => ordering == Ordering::Less,
        FilterOp::Le => ordering != Ordering::Greater,
        FilterOp::Gt => ordering == Ordering::Greater,
        FilterOp::Ge => ordering != Ordering::Less,
    }
}

/// Orders two scalar JSON values of the same kind.
///
/// Integers compare exactly; mixed integer/float falls back to f64.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                return Some(a.cmp(&b));
            }
            a.as_f64()?.partial_cmp(&b.as_f64()?)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equality_filter() {
        let doc = json!({"status": "pending", "scheduleId": "s1"});
        assert!(matches_query(&doc, &Query::new().where_eq("status", "pending")));
        assert!(!matches_query(&doc, &Query::new().where_eq("status", "processing")));
        assert!(!matches_query(&doc, &Query::new().where_eq("missing", "x")));
    }

    #[test]
    fn test_half_open_range() {
        let query = Query::new()
            .where_le("notificationTime", 1_000)
            .where_gt("notificationTime", 700);

        assert!(matches_query(&json!({"notificationTime": 1_000}), &query));
        assert!(matches_query(&json!({"notificationTime": 701}), &query));
        assert!(!matches_query(&json!({"notificationTime": 700}), &query));
        assert!(!matches_query(&json!({"notificationTime": 1_001}), &query));
    }

    #[test]
    fn test_type_mismatch_never_matches() {
        let doc = json!({"notificationTime": "1000"});
        assert!(!matches_query(&doc, &Query::new().where_le("notificationTime", 2_000)));
        assert!(!matches_query(&doc, &Query::new().where_eq("notificationTime", 1_000)));
    }

    #[test]
    fn test_large_millis_compare_exactly() {
        let a = json!(1_700_000_000_001_i64);
        let b = json!(1_700_000_000_000_i64);
        assert_eq!(compare_values(&a, &b), Some(Ordering::Greater));
    }

    #[test]
    fn test_equality_on_non_scalar() {
        let doc = json!({"tags": ["a", "b"]});
        assert!(matches_query(&doc, &Query::new().where_eq("tags", json!(["a", "b"]))));
    }
}
