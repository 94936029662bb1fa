use std::collections::HashMap;

use chrono::Datelike;
use serde_json::{Map, Value};

use super::filter;
use super::types::StoreError;
use super::value::{
    canonical_key, compare_values, lookup, number_value, parse_date, remove_path, set_path, truthy,
    values_equal, Document,
};

pub fn run(mut docs: Vec<Document>, pipeline: &[Value]) -> Result<Vec<Document>, StoreError> {
    for stage in pipeline {
        let (name, spec) = single_key(stage, "pipeline stage")?;
        docs = match name {
            "$match" => {
                filter::validate(spec)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if filter::matches(&doc, spec)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$group" => group(docs, spec)?,
            "$sort" => {
                let keys = sort_keys(spec)?;
                sort_documents(&mut docs, &keys);
                docs
            }
            "$limit" => {
                let n = positive_int(spec, "$limit")?;
                docs.truncate(n);
                docs
            }
            "$skip" => {
                let n = spec
                    .as_u64()
                    .ok_or_else(|| invalid("$skip expects a non-negative integer"))?;
                docs.into_iter().skip(n as usize).collect()
            }
            "$project" => project(docs, spec)?,
            "$addFields" | "$set" => add_fields(docs, spec)?,
            "$count" => {
                let field = spec
                    .as_str()
                    .filter(|s| !s.is_empty() && !s.starts_with('$'))
                    .ok_or_else(|| invalid("$count expects a field name"))?;
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field.to_string(), Value::from(docs.len() as u64));
                    vec![out]
                }
            }
            "$unwind" => unwind(docs, spec)?,
            other => return Err(StoreError::Unsupported(other.to_string())),
        };
    }
    Ok(docs)
}

pub fn sort_documents(docs: &mut [Document], keys: &[(String, i64)]) {
    docs.sort_by(|a, b| {
        for (field, direction) in keys {
            let left = lookup(a, field).unwrap_or(&Value::Null);
            let right = lookup(b, field).unwrap_or(&Value::Null);
            let mut ord = compare_values(left, right);
            if *direction < 0 {
                ord = ord.reverse();
            }
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn invalid(message: &str) -> StoreError {
    StoreError::InvalidPipeline(message.to_string())
}

fn single_key<'a>(value: &'a Value, what: &str) -> Result<(&'a str, &'a Value), StoreError> {
    match value.as_object() {
        Some(map) if map.len() == 1 => {
            let (key, spec) = map.iter().next().ok_or_else(|| invalid(what))?;
            Ok((key.as_str(), spec))
        }
        _ => Err(StoreError::InvalidPipeline(format!(
            "{} must be an object with exactly one key: {}",
            what, value
        ))),
    }
}

fn positive_int(spec: &Value, op: &str) -> Result<usize, StoreError> {
    match spec.as_u64() {
        Some(n) if n > 0 => Ok(n as usize),
        _ => Err(StoreError::InvalidPipeline(format!("{} expects a positive integer", op))),
    }
}

fn sort_keys(spec: &Value) -> Result<Vec<(String, i64)>, StoreError> {
    let map = spec
        .as_object()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| invalid("$sort expects a non-empty object"))?;
    map.iter()
        .map(|(field, dir)| match dir.as_i64() {
            Some(1) => Ok((field.clone(), 1)),
            Some(-1) => Ok((field.clone(), -1)),
            _ => Err(StoreError::InvalidPipeline(format!(
                "$sort direction for {} must be 1 or -1",
                field
            ))),
        })
        .collect()
}

enum Accumulator {
    Sum(f64),
    Avg { total: f64, n: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
    First(Option<Value>),
    Last(Value),
    Push(Vec<Value>),
    AddToSet(Vec<Value>),
    Count(u64),
}

impl Accumulator {
    fn new(op: &str) -> Result<Self, StoreError> {
        Ok(match op {
            "$sum" => Accumulator::Sum(0.0),
            "$avg" => Accumulator::Avg { total: 0.0, n: 0 },
            "$min" => Accumulator::Min(None),
            "$max" => Accumulator::Max(None),
            "$first" => Accumulator::First(None),
            "$last" => Accumulator::Last(Value::Null),
            "$push" => Accumulator::Push(Vec::new()),
            "$addToSet" => Accumulator::AddToSet(Vec::new()),
            "$count" => Accumulator::Count(0),
            other => return Err(StoreError::Unsupported(other.to_string())),
        })
    }

    fn feed(&mut self, value: Value) {
        match self {
            Accumulator::Sum(total) => {
                if let Some(n) = value.as_f64() {
                    *total += n;
                }
            }
            Accumulator::Avg { total, n } => {
                if let Some(v) = value.as_f64() {
                    *total += v;
                    *n += 1;
                }
            }
            Accumulator::Min(current) => {
                if !value.is_null()
                    && current
                        .as_ref()
                        .map(|c| compare_values(&value, c).is_lt())
                        .unwrap_or(true)
                {
                    *current = Some(value);
                }
            }
            Accumulator::Max(current) => {
                if !value.is_null()
                    && current
                        .as_ref()
                        .map(|c| compare_values(&value, c).is_gt())
                        .unwrap_or(true)
                {
                    *current = Some(value);
                }
            }
            Accumulator::First(current) => {
                if current.is_none() {
                    *current = Some(value);
                }
            }
            Accumulator::Last(current) => *current = value,
            Accumulator::Push(items) => items.push(value),
            Accumulator::AddToSet(items) => {
                if !items.iter().any(|item| values_equal(item, &value)) {
                    items.push(value);
                }
            }
            Accumulator::Count(n) => *n += 1,
        }
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Sum(total) => number_value(total),
            Accumulator::Avg { total, n } => {
                if n == 0 {
                    Value::Null
                } else {
                    number_value(total / n as f64)
                }
            }
            Accumulator::Min(v) | Accumulator::Max(v) | Accumulator::First(v) => {
                v.unwrap_or(Value::Null)
            }
            Accumulator::Last(v) => v,
            Accumulator::Push(items) | Accumulator::AddToSet(items) => Value::Array(items),
            Accumulator::Count(n) => Value::from(n),
        }
    }
}

fn group(docs: Vec<Document>, spec: &Value) -> Result<Vec<Document>, StoreError> {
    let spec = spec
        .as_object()
        .ok_or_else(|| invalid("$group expects an object"))?;
    let key_expr = spec
        .get("_id")
        .ok_or_else(|| invalid("$group requires an _id expression"))?;

    let mut fields = Vec::new();
    for (name, acc) in spec.iter().filter(|(name, _)| name.as_str() != "_id") {
        let (op, expr) = single_key(acc, "accumulator")?;
        Accumulator::new(op)?;
        fields.push((name.clone(), op.to_string(), expr.clone()));
    }

    let mut order: Vec<(Value, Vec<Accumulator>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for doc in &docs {
        let key = eval(key_expr, doc)?;
        let canonical = canonical_key(&key);
        let slot = match index.get(&canonical) {
            Some(slot) => *slot,
            None => {
                let accs = fields
                    .iter()
                    .map(|(_, op, _)| Accumulator::new(op))
                    .collect::<Result<Vec<_>, _>>()?;
                index.insert(canonical, order.len());
                order.push((key, accs));
                order.len() - 1
            }
        };
        for ((_, _, expr), acc) in fields.iter().zip(order[slot].1.iter_mut()) {
            acc.feed(eval(expr, doc)?);
        }
    }

    Ok(order
        .into_iter()
        .map(|(key, accs)| {
            let mut out = Document::new();
            out.insert("_id".to_string(), key);
            for ((name, _, _), acc) in fields.iter().zip(accs) {
                out.insert(name.clone(), acc.finish());
            }
            out
        })
        .collect())
}

fn project(docs: Vec<Document>, spec: &Value) -> Result<Vec<Document>, StoreError> {
    let spec = spec
        .as_object()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| invalid("$project expects a non-empty object"))?;
    let is_exclusion = |v: &Value| matches!(v, Value::Bool(false)) || v.as_f64() == Some(0.0);
    let exclusion_mode = spec
        .iter()
        .filter(|(k, _)| k.as_str() != "_id")
        .all(|(_, v)| is_exclusion(v));
    let exclude_id = spec.get("_id").map(is_exclusion).unwrap_or(false);

    docs.into_iter()
        .map(|doc| {
            if exclusion_mode {
                let mut out = doc;
                for (field, _) in spec.iter() {
                    remove_path(&mut out, field);
                }
                return Ok(out);
            }
            let mut out = Document::new();
            if !exclude_id {
                if let Some(id) = doc.get("_id") {
                    out.insert("_id".to_string(), id.clone());
                }
            }
            for (field, rule) in spec.iter() {
                if field == "_id" && is_exclusion(rule) {
                    continue;
                }
                match rule {
                    Value::Bool(true) | Value::Number(_) => {
                        if let Some(v) = lookup(&doc, field) {
                            set_path(&mut out, field, v.clone());
                        }
                    }
                    Value::Bool(false) => {
                        return Err(invalid("$project cannot mix inclusion and exclusion"));
                    }
                    expr => set_path(&mut out, field, eval(expr, &doc)?),
                }
            }
            Ok(out)
        })
        .collect()
}

fn add_fields(docs: Vec<Document>, spec: &Value) -> Result<Vec<Document>, StoreError> {
    let spec = spec
        .as_object()
        .ok_or_else(|| invalid("$addFields expects an object"))?;
    docs.into_iter()
        .map(|mut doc| {
            for (field, expr) in spec {
                let value = eval(expr, &doc)?;
                set_path(&mut doc, field, value);
            }
            Ok(doc)
        })
        .collect()
}

fn unwind(docs: Vec<Document>, spec: &Value) -> Result<Vec<Document>, StoreError> {
    let (path, preserve) = match spec {
        Value::String(path) => (path.as_str(), false),
        Value::Object(map) => (
            map.get("path").and_then(|v| v.as_str()).unwrap_or(""),
            map.get("preserveNullAndEmptyArrays")
                .map(truthy)
                .unwrap_or(false),
        ),
        _ => ("", false),
    };
    let field = path
        .strip_prefix('$')
        .filter(|f| !f.is_empty())
        .ok_or_else(|| invalid("$unwind expects a field path like \"$field\""))?;

    let mut out = Vec::new();
    for doc in docs {
        match lookup(&doc, field).cloned() {
            Some(Value::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = doc.clone();
                    set_path(&mut copy, field, item);
                    out.push(copy);
                }
            }
            Some(Value::Array(_)) | Some(Value::Null) | None => {
                if preserve {
                    out.push(doc);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    Ok(out)
}

/// Evaluates an aggregation expression against a document.
pub fn eval(expr: &Value, doc: &Document) -> Result<Value, StoreError> {
    match expr {
        Value::String(s) if s == "$$ROOT" => Ok(Value::Object(doc.clone())),
        Value::String(s) if s.starts_with("$$") => Err(StoreError::Unsupported(s.clone())),
        Value::String(s) if s.starts_with('$') => {
            Ok(lookup(doc, &s[1..]).cloned().unwrap_or(Value::Null))
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| eval(item, doc))
                .collect::<Result<_, _>>()?,
        )),
        Value::Object(map) if map.len() == 1 && map.keys().all(|k| k.starts_with('$')) => {
            let (op, args) = single_key(expr, "expression")?;
            eval_operator(op, args, doc)
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                out.insert(key.clone(), eval(value, doc)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn eval_args(args: &Value, doc: &Document) -> Result<Vec<Value>, StoreError> {
    match args {
        Value::Array(items) => items.iter().map(|item| eval(item, doc)).collect(),
        single => Ok(vec![eval(single, doc)?]),
    }
}

fn two_args(op: &str, args: &Value, doc: &Document) -> Result<(Value, Value), StoreError> {
    let mut values = eval_args(args, doc)?;
    if values.len() != 2 {
        return Err(StoreError::InvalidPipeline(format!(
            "{} expects exactly two arguments",
            op
        )));
    }
    let right = values.pop().unwrap_or(Value::Null);
    let left = values.pop().unwrap_or(Value::Null);
    Ok((left, right))
}

fn numbers(op: &str, values: &[Value]) -> Result<Option<Vec<f64>>, StoreError> {
    if values.iter().any(Value::is_null) {
        return Ok(None);
    }
    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                StoreError::InvalidPipeline(format!("{} only supports numeric arguments, got {}", op, v))
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn eval_operator(op: &str, args: &Value, doc: &Document) -> Result<Value, StoreError> {
    match op {
        "$literal" => Ok(args.clone()),
        "$add" | "$multiply" => {
            let values = eval_args(args, doc)?;
            Ok(match numbers(op, &values)? {
                None => Value::Null,
                Some(ns) if op == "$add" => number_value(ns.iter().sum()),
                Some(ns) => number_value(ns.iter().product()),
            })
        }
        "$subtract" | "$divide" => {
            let (left, right) = two_args(op, args, doc)?;
            let ns = match numbers(op, &[left, right])? {
                None => return Ok(Value::Null),
                Some(ns) => ns,
            };
            if op == "$subtract" {
                return Ok(number_value(ns[0] - ns[1]));
            }
            if ns[1] == 0.0 {
                return Err(invalid("can't $divide by zero"));
            }
            Ok(number_value(ns[0] / ns[1]))
        }
        "$year" | "$month" | "$dayOfMonth" => {
            let value = eval(args, doc)?;
            let raw = match &value {
                Value::Null => return Ok(Value::Null),
                Value::String(s) => s,
                other => {
                    return Err(StoreError::InvalidPipeline(format!(
                        "{} expects a date, got {}",
                        op, other
                    )))
                }
            };
            let date = parse_date(raw).ok_or_else(|| {
                StoreError::InvalidPipeline(format!("{} cannot parse date {:?}", op, raw))
            })?;
            Ok(Value::from(match op {
                "$year" => date.year() as i64,
                "$month" => date.month() as i64,
                _ => date.day() as i64,
            }))
        }
        "$toLower" | "$toUpper" => {
            let value = eval(args, doc)?;
            let text = match value {
                Value::Null => String::new(),
                Value::String(s) => s,
                other => other.to_string(),
            };
            Ok(Value::String(if op == "$toLower" {
                text.to_lowercase()
            } else {
                text.to_uppercase()
            }))
        }
        "$concat" => {
            let mut out = String::new();
            for value in eval_args(args, doc)? {
                match value {
                    Value::Null => return Ok(Value::Null),
                    Value::String(s) => out.push_str(&s),
                    other => {
                        return Err(StoreError::InvalidPipeline(format!(
                            "$concat only supports strings, got {}",
                            other
                        )))
                    }
                }
            }
            Ok(Value::String(out))
        }
        "$ifNull" => {
            let (value, fallback) = two_args(op, args, doc)?;
            Ok(if value.is_null() { fallback } else { value })
        }
        "$cond" => {
            let (cond, then, otherwise) = match args {
                Value::Array(items) if items.len() == 3 => (&items[0], &items[1], &items[2]),
                Value::Object(map) => match (map.get("if"), map.get("then"), map.get("else")) {
                    (Some(c), Some(t), Some(e)) => (c, t, e),
                    _ => return Err(invalid("$cond requires if, then and else")),
                },
                _ => return Err(invalid("$cond requires if, then and else")),
            };
            if truthy(&eval(cond, doc)?) {
                eval(then, doc)
            } else {
                eval(otherwise, doc)
            }
        }
        "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
            let (left, right) = two_args(op, args, doc)?;
            let ord = compare_values(&left, &right);
            Ok(Value::Bool(match op {
                "$eq" => values_equal(&left, &right),
                "$ne" => !values_equal(&left, &right),
                "$gt" => ord.is_gt(),
                "$gte" => ord.is_ge(),
                "$lt" => ord.is_lt(),
                _ => ord.is_le(),
            }))
        }
        "$and" => Ok(Value::Bool(eval_args(args, doc)?.iter().all(truthy))),
        "$or" => Ok(Value::Bool(eval_args(args, doc)?.iter().any(truthy))),
        "$in" => {
            let (needle, haystack) = two_args(op, args, doc)?;
            let items = haystack
                .as_array()
                .ok_or_else(|| invalid("$in requires an array as the second argument"))?;
            Ok(Value::Bool(items.iter().any(|item| values_equal(item, &needle))))
        }
        other => Err(StoreError::Unsupported(other.to_string())),
    }
}
