use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::{Map, Value};

use super::types::StoreError;
use super::value::{
    compare_dates, compare_values, lookup, same_type, truthy, values_equal, Document,
};

/// Evaluates a MongoDB-style filter against one document.
///
/// `null` and `{}` match everything. Unknown operators are reported as
/// [`StoreError::Unsupported`] rather than silently ignored.
pub fn matches(doc: &Document, filter: &Value) -> Result<bool, StoreError> {
    match filter {
        Value::Null => Ok(true),
        Value::Object(clauses) => match_clauses(doc, clauses),
        other => Err(StoreError::InvalidFilter(format!(
            "filter must be an object, got {}",
            other
        ))),
    }
}

pub fn validate(filter: &Value) -> Result<(), StoreError> {
    matches(&Document::new(), filter).map(|_| ())
}

fn match_clauses(doc: &Document, clauses: &Map<String, Value>) -> Result<bool, StoreError> {
    let mut result = true;
    for (key, cond) in clauses {
        let ok = match key.as_str() {
            "$and" => logical(doc, key, cond)?.iter().all(|m| *m),
            "$or" => logical(doc, key, cond)?.iter().any(|m| *m),
            "$nor" => !logical(doc, key, cond)?.iter().any(|m| *m),
            op if op.starts_with('$') => return Err(StoreError::Unsupported(op.to_string())),
            field => match_field(lookup(doc, field), cond)?,
        };
        // keep evaluating so malformed clauses surface even after a miss
        result = result && ok;
    }
    Ok(result)
}

fn logical(doc: &Document, op: &str, cond: &Value) -> Result<Vec<bool>, StoreError> {
    let items = cond
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| StoreError::InvalidFilter(format!("{} expects a non-empty array", op)))?;
    items.iter().map(|item| matches(doc, item)).collect()
}

fn is_operator_object(cond: &Value) -> bool {
    cond.as_object()
        .map(|map| !map.is_empty() && map.keys().all(|k| k.starts_with('$')))
        .unwrap_or(false)
}

fn match_field(value: Option<&Value>, cond: &Value) -> Result<bool, StoreError> {
    if !is_operator_object(cond) {
        return Ok(eq_match(value, cond));
    }
    let ops = cond.as_object().cloned().unwrap_or_default();
    let mut result = true;
    for (op, target) in &ops {
        let ok = match op.as_str() {
            "$eq" => eq_match(value, target),
            "$ne" => !eq_match(value, target),
            "$gt" => cmp_match(value, target, |o| o == Ordering::Greater),
            "$gte" => cmp_match(value, target, |o| o != Ordering::Less),
            "$lt" => cmp_match(value, target, |o| o == Ordering::Less),
            "$lte" => cmp_match(value, target, |o| o != Ordering::Greater),
            "$in" => in_match(value, target, op)?,
            "$nin" => !in_match(value, target, op)?,
            "$exists" => value.is_some() == truthy(target),
            "$regex" => regex_match(value, target, ops.get("$options"))?,
            "$options" => {
                if !ops.contains_key("$regex") {
                    return Err(StoreError::InvalidFilter("$options requires $regex".to_string()));
                }
                true
            }
            "$not" => !match_field(value, target)?,
            other => return Err(StoreError::Unsupported(other.to_string())),
        };
        result = result && ok;
    }
    Ok(result)
}

fn eq_match(value: Option<&Value>, target: &Value) -> bool {
    match value {
        None => target.is_null(),
        Some(Value::Array(items)) if !target.is_array() => {
            items.iter().any(|item| values_equal(item, target))
        }
        Some(v) => values_equal(v, target),
    }
}

fn cmp_match(value: Option<&Value>, target: &Value, pred: impl Fn(Ordering) -> bool) -> bool {
    let candidates: Vec<&Value> = match value {
        None => return false,
        Some(Value::Array(items)) if !target.is_array() => items.iter().collect(),
        Some(v) => vec![v],
    };
    candidates.into_iter().any(|c| match (c, target) {
        (Value::String(a), Value::String(b)) => {
            pred(compare_dates(a, b).unwrap_or_else(|| a.cmp(b)))
        }
        _ => same_type(c, target) && pred(compare_values(c, target)),
    })
}

fn in_match(value: Option<&Value>, target: &Value, op: &str) -> Result<bool, StoreError> {
    let options = target
        .as_array()
        .ok_or_else(|| StoreError::InvalidFilter(format!("{} expects an array", op)))?;
    Ok(options.iter().any(|option| eq_match(value, option)))
}

fn regex_match(
    value: Option<&Value>,
    pattern: &Value,
    options: Option<&Value>,
) -> Result<bool, StoreError> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| StoreError::InvalidFilter("$regex expects a string".to_string()))?;
    let flags = options.and_then(|v| v.as_str()).unwrap_or("");
    let re = RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .build()
        .map_err(|err| StoreError::InvalidFilter(err.to_string()))?;
    Ok(match value {
        Some(Value::String(s)) => re.is_match(s),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .any(|s| re.is_match(s)),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn purchase() -> Document {
        json!({
            "department_name": "Technology Services",
            "fiscal_year": "2014-2015",
            "total_price": 12500.0,
            "has_lpa_number": true,
            "classification_codes": ["43211503", "43211507"],
            "purchase_date": "2014-08-15"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn implicit_equality_and_empty_filter() {
        let doc = purchase();
        assert!(matches(&doc, &json!({})).unwrap());
        assert!(matches(&doc, &json!({"fiscal_year": "2014-2015"})).unwrap());
        assert!(!matches(&doc, &json!({"fiscal_year": "2013-2014"})).unwrap());
        assert!(matches(&doc, &json!({"has_lpa_number": true})).unwrap());
    }

    #[test]
    fn comparison_operators_respect_type() {
        let doc = purchase();
        assert!(matches(&doc, &json!({"total_price": {"$gt": 10000}})).unwrap());
        assert!(!matches(&doc, &json!({"total_price": {"$gt": "10000"}})).unwrap());
        assert!(matches(
            &doc,
            &json!({"purchase_date": {"$gte": "2014-07-01", "$lte": "2014-09-30"}})
        )
        .unwrap());
    }

    #[test]
    fn regex_with_case_insensitive_option() {
        let doc = purchase();
        let filter = json!({"department_name": {"$regex": "technology", "$options": "i"}});
        assert!(matches(&doc, &filter).unwrap());
        let strict = json!({"department_name": {"$regex": "technology"}});
        assert!(!matches(&doc, &strict).unwrap());
    }

    #[test]
    fn array_fields_match_any_element() {
        let doc = purchase();
        assert!(matches(&doc, &json!({"classification_codes": "43211507"})).unwrap());
        assert!(matches(&doc, &json!({"classification_codes": {"$in": ["1", "43211503"]}})).unwrap());
    }

    #[test]
    fn quarter_bounds_include_midnight_timestamps() {
        let mut doc = purchase();
        doc.insert("purchase_date".into(), json!("2014-09-30T00:00:00Z"));
        let q1 = json!({"purchase_date": {"$gte": "2014-07-01", "$lte": "2014-09-30"}});
        assert!(matches(&doc, &q1).unwrap());
        let q2 = json!({"purchase_date": {"$gte": "2014-10-01", "$lte": "2014-12-31"}});
        assert!(!matches(&doc, &q2).unwrap());
        assert!(!matches(&doc, &json!({"purchase_date": {"$lt": "2014-09-30"}})).unwrap());
    }

    #[test]
    fn logical_and_exists() {
        let doc = purchase();
        let filter = json!({"$or": [{"fiscal_year": "2013-2014"}, {"supplier_name": {"$exists": false}}]});
        assert!(matches(&doc, &filter).unwrap());
        let filter = json!({"$nor": [{"total_price": {"$lt": 100}}]});
        assert!(matches(&doc, &filter).unwrap());
        assert!(matches(&doc, &json!({"total_price": {"$not": {"$lt": 100}}})).unwrap());
    }

    #[test]
    fn malformed_filters_are_errors() {
        let doc = purchase();
        assert!(matches(&doc, &json!([1, 2])).is_err());
        assert!(matches(&doc, &json!({"$where": "1"})).is_err());
        assert!(matches(&doc, &json!({"total_price": {"$near": 3}})).is_err());
        assert!(matches(&doc, &json!({"fiscal_year": {"$in": "2014-2015"}})).is_err());
        assert!(validate(&json!({"department_name": {"$regex": "("}})).is_err());
    }
}
