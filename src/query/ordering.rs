//! Total order over JSON values for cross-partition merges.
//!
//! Values order first by type bracket, then within the bracket:
//! undefined < null < false < true < numbers < strings < arrays < objects.
//! Arrays and objects compare by canonical serialization, which is enough
//! for a deterministic total order even though the server never sorts on
//! them.

use std::cmp::Ordering;

use serde_json::Value;

use crate::planner::plan::SortDirection;

fn type_bracket(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Compares two optional values (`None` = undefined) in ascending order.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let bracket = type_bracket(a).cmp(&type_bracket(b));
    if bracket != Ordering::Equal {
        return bracket;
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x @ Value::Array(_)), Some(y @ Value::Array(_)))
        | (Some(x @ Value::Object(_)), Some(y @ Value::Object(_))) => {
            canonical(x).cmp(&canonical(y))
        }
        _ => Ordering::Equal,
    }
}

/// Compares two sort-key tuples column by column, honoring per-column
/// directions. Missing cells sort as undefined.
pub fn compare_key_tuples(
    a: &[Option<Value>],
    b: &[Option<Value>],
    directions: &[SortDirection],
) -> Ordering {
    let columns = a.len().max(b.len());
    for i in 0..columns {
        let ordering = compare_values(
            a.get(i).and_then(Option::as_ref),
            b.get(i).and_then(Option::as_ref),
        );
        if ordering != Ordering::Equal {
            return match directions.get(i).copied().unwrap_or(SortDirection::Asc) {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
        }
    }
    Ordering::Equal
}

/// Canonical serialization: object keys sorted, no whitespace. Used for
/// deterministic comparison and for distinct fingerprints.
pub fn canonical(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), canonical(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical).collect();
            format!("[{}]", rendered.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_bracket_order() {
        let undefined: Option<&Value> = None;
        let null = json!(null);
        let fals = json!(false);
        let tru = json!(true);
        let num = json!(1);
        let string = json!("a");

        assert_eq!(compare_values(undefined, Some(&null)), Ordering::Less);
        assert_eq!(compare_values(Some(&null), Some(&fals)), Ordering::Less);
        assert_eq!(compare_values(Some(&fals), Some(&tru)), Ordering::Less);
        assert_eq!(compare_values(Some(&tru), Some(&num)), Ordering::Less);
        assert_eq!(compare_values(Some(&num), Some(&string)), Ordering::Less);
    }

    #[test]
    fn test_numeric_order() {
        let a = json!(1.5);
        let b = json!(2);
        assert_eq!(compare_values(Some(&a), Some(&b)), Ordering::Less);
        assert_eq!(compare_values(Some(&b), Some(&a)), Ordering::Greater);
        assert_eq!(compare_values(Some(&b), Some(&json!(2.0))), Ordering::Equal);
    }

    #[test]
    fn test_tuple_directions() {
        let a = vec![Some(json!(1)), Some(json!("b"))];
        let b = vec![Some(json!(1)), Some(json!("a"))];
        assert_eq!(
            compare_key_tuples(&a, &b, &[SortDirection::Asc, SortDirection::Asc]),
            Ordering::Greater
        );
        assert_eq!(
            compare_key_tuples(&a, &b, &[SortDirection::Asc, SortDirection::Desc]),
            Ordering::Less
        );
    }

    #[test]
    fn test_canonical_sorts_object_keys() {
        let a = json!({"b": 1, "a": [2, {"z": 3, "y": 4}]});
        let b = json!({"a": [2, {"y": 4, "z": 3}], "b": 1});
        assert_eq!(canonical(&a), canonical(&b));
    }
}
