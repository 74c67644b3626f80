//! Merge operators used by query-time aggregation.

use std::cmp::Ordering;

use crate::model::Value;
use crate::schema::AggregateFunction;

/// Merge two values of one property. `existing` comes first in key order.
///
/// NULL is the identity for every function. Values of mismatched types keep
/// `existing`; the schema forbids that combination at load time.
pub fn merge(existing: Value, incoming: Value, function: AggregateFunction) -> Value {
    if existing.is_null() {
        return incoming;
    }
    if incoming.is_null() {
        return existing;
    }
    match function {
        AggregateFunction::First => existing,
        AggregateFunction::Last => incoming,
        AggregateFunction::Sum => match (&existing, &incoming) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.saturating_add(*b)),
            (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
            _ => existing,
        },
        AggregateFunction::Min => match existing.natural_cmp(&incoming) {
            Some(Ordering::Greater) => incoming,
            _ => existing,
        },
        AggregateFunction::Max => match existing.natural_cmp(&incoming) {
            Some(Ordering::Less) => incoming,
            _ => existing,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(function: AggregateFunction, values: &[i64]) -> Value {
        values
            .iter()
            .map(|v| Value::Int(*v))
            .fold(Value::Null, |acc, v| merge(acc, v, function))
    }

    #[test]
    fn test_sum_of_shards() {
        assert_eq!(fold(AggregateFunction::Sum, &[1, 3, 5]), Value::Int(9));
    }

    #[test]
    fn test_min_max_first_last() {
        assert_eq!(fold(AggregateFunction::Min, &[4, 1, 7]), Value::Int(1));
        assert_eq!(fold(AggregateFunction::Max, &[4, 1, 7]), Value::Int(7));
        assert_eq!(fold(AggregateFunction::First, &[4, 1, 7]), Value::Int(4));
        assert_eq!(fold(AggregateFunction::Last, &[4, 1, 7]), Value::Int(7));
    }

    #[test]
    fn test_null_is_identity() {
        assert_eq!(merge(Value::Int(3), Value::Null, AggregateFunction::Sum), Value::Int(3));
        assert_eq!(merge(Value::Null, Value::from("a"), AggregateFunction::Max), Value::from("a"));
    }

    #[test]
    fn test_sum_saturates() {
        assert_eq!(
            merge(Value::Int(i64::MAX), Value::Int(1), AggregateFunction::Sum),
            Value::Int(i64::MAX)
        );
    }

    #[test]
    fn test_string_max() {
        assert_eq!(
            merge(Value::from("apple"), Value::from("pear"), AggregateFunction::Max),
            Value::from("pear")
        );
    }
}
