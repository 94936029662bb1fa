use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value};

pub type Document = Map<String, Value>;

pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

pub fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(child)) = doc.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

pub fn same_type(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b)
}

pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = compare_values(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Ordering::Equal,
        _ => a == b,
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        _ => true,
    }
}

/// Integral results come back as integers so group totals read naturally.
pub fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Value::Number(Number::from(value as i64));
    }
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Hashable identity for grouping and distinct: values that compare equal
/// under [`values_equal`] share a key, so `5` and `5.0` collapse.
pub fn canonical_key(value: &Value) -> String {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(number_value)
            .unwrap_or_else(|| value.clone())
            .to_string(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical_key).collect();
            format!("[{}]", inner.join(","))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_key(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        other => other.to_string(),
    }
}

/// Day-granularity ordering when either string is a bare date, so a
/// `$lte "2014-09-30"` bound still includes `2014-09-30T00:00:00Z`.
pub fn compare_dates(a: &str, b: &str) -> Option<Ordering> {
    if !is_bare_date(a) && !is_bare_date(b) {
        return None;
    }
    Some(parse_date(a)?.cmp(&parse_date(b)?))
}

fn is_bare_date(raw: &str) -> bool {
    let raw = raw.trim();
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .any(|fmt| NaiveDate::parse_from_str(raw, fmt).is_ok())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn lookup_follows_dotted_paths() {
        let d = doc(json!({"supplier": {"name": "Acme", "codes": ["a", "b"]}}));
        assert_eq!(lookup(&d, "supplier.name"), Some(&json!("Acme")));
        assert_eq!(lookup(&d, "supplier.codes.1"), Some(&json!("b")));
        assert_eq!(lookup(&d, "supplier.zip"), None);
    }

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert!(values_equal(&json!(5), &json!(5.0)));
        assert_eq!(compare_values(&json!(2), &json!(10.5)), Ordering::Less);
        assert_eq!(compare_values(&Value::Null, &json!(0)), Ordering::Less);
        assert_eq!(compare_values(&json!("a"), &json!(99)), Ordering::Greater);
    }

    #[test]
    fn parse_date_accepts_dataset_formats() {
        let expected = NaiveDate::from_ymd_opt(2014, 8, 15);
        assert_eq!(parse_date("2014-08-15"), expected);
        assert_eq!(parse_date("08/15/2014"), expected);
        assert_eq!(parse_date("2014-08-15T00:00:00"), expected);
        assert_eq!(parse_date("2014-08-15T10:00:00Z"), expected);
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn number_value_keeps_fractions() {
        assert_eq!(number_value(3.0), json!(3));
        assert_eq!(number_value(2.5), json!(2.5));
    }

    #[test]
    fn canonical_keys_merge_equal_numbers() {
        assert_eq!(canonical_key(&json!(5)), canonical_key(&json!(5.0)));
        assert_eq!(
            canonical_key(&json!({"fy": "2014-2015", "q": 1})),
            canonical_key(&json!({"fy": "2014-2015", "q": 1.0}))
        );
        assert_ne!(canonical_key(&json!(5)), canonical_key(&json!("5")));
        assert_ne!(canonical_key(&json!(5)), canonical_key(&json!(5.5)));
    }

    #[test]
    fn bare_dates_compare_by_day() {
        assert_eq!(
            compare_dates("2014-09-30T00:00:00Z", "2014-09-30"),
            Some(Ordering::Equal)
        );
        assert_eq!(
            compare_dates("2014-10-01T00:00:00", "2014-09-30"),
            Some(Ordering::Greater)
        );
        assert_eq!(compare_dates("2014-09-30T00:00:00Z", "2014-09-30T10:00:00Z"), None);
        assert_eq!(compare_dates("Corrections", "2014-09-30"), None);
    }
}
