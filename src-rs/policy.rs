//! Mechanical checks for the behavioral rules the prompt asks the model to follow.
//!
//! The reasoning engine is a black box, so the few rules that can be verified
//! from the transcript alone are enforced here instead of trusted.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::llm::ToolCall;
use crate::tools::{Observation, AGGREGATE_DATA, GET_SCHEMA_INFO};

const PLACEHOLDERS: &[&str] = &["unknown", "", "n/a", "na", "none", "null"];
const PRIMARY_HINTS: &[&str] = &["total", "sum", "spend", "amount"];
const SECONDARY_PREFIXES: &[&str] = &["min", "max", "avg", "average"];

fn zero_claim() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\$\s?0(?:\.0+)?(?:[^\d.,]|[.,]\D|[.,]$|$)|\bno data\b|\bno records\b")
            .expect("zero claim pattern")
    })
}

/// Rejects aggregations that total or group on `creation_date`.
pub fn check_tool_call(call: &ToolCall) -> Result<(), String> {
    if call.name != AGGREGATE_DATA {
        return Ok(());
    }
    let pipeline = match call.args.get("pipeline") {
        Some(Value::String(raw)) => raw.clone(),
        Some(other) => other.to_string(),
        None => return Ok(()),
    };
    let groups_or_totals = pipeline.contains("$group") || pipeline.contains("$sum");
    if groups_or_totals && pipeline.contains("creation_date") {
        return Err("spending totals, top-N groupings and quarter calculations must use \
                    purchase_date, never creation_date; rewrite the pipeline on purchase_date"
            .to_string());
    }
    Ok(())
}

/// Reviews a candidate final answer against the observations gathered so far.
///
/// Returns a correction to feed back to the model, or `None` when the answer
/// may stand.
pub fn review_answer(answer: &str, observations: &[(String, Observation)]) -> Option<String> {
    if claims_zero(answer) && !has_zero_evidence(answer, observations) {
        return Some(
            "Your answer reports $0 or no data, but no tool call returned a zero count, an \
             empty result or a zero total. Re-check the observations (filter quarters on \
             purchase_date across all fiscal years) and answer with the actual figures."
                .to_string(),
        );
    }
    placeholder_correction(answer, observations)
}

pub fn claims_zero(answer: &str) -> bool {
    zero_claim().is_match(answer)
}

/// A zero claim stands when the latest data lookup came back empty, or when
/// an aggregate row the answer refers to has a zero primary metric. With no
/// row named in the answer, every row of that result must be zero.
fn has_zero_evidence(answer: &str, observations: &[(String, Observation)]) -> bool {
    let data: Vec<&Map<String, Value>> = observations
        .iter()
        .filter(|(tool, _)| tool != GET_SCHEMA_INFO)
        .filter_map(|(_, obs)| obs.payload())
        .collect();

    let latest_empty = data.last().map_or(false, |payload| {
        let zero = |key: &str| payload.get(key).and_then(Value::as_f64) == Some(0.0);
        let no_rows = payload
            .get("results")
            .and_then(Value::as_array)
            .map_or(false, |rows| rows.is_empty());
        zero("count") || zero("total_found") || no_rows
    });
    if latest_empty {
        return true;
    }

    let answer = answer.to_lowercase();
    data.iter()
        .filter_map(|payload| payload.get("results").and_then(Value::as_array))
        .filter(|rows| !rows.is_empty())
        .any(|rows| {
            let rows: Vec<&Map<String, Value>> = rows.iter().filter_map(Value::as_object).collect();
            let is_zero = |row: &&Map<String, Value>| primary_metric(row) == Some(0.0);
            let named: Vec<&Map<String, Value>> = rows
                .iter()
                .copied()
                .filter(|row| {
                    let name = label(row.get("_id").unwrap_or(&Value::Null)).to_lowercase();
                    !name.is_empty() && name != "null" && answer.contains(&name)
                })
                .collect();
            if named.is_empty() {
                rows.iter().all(is_zero)
            } else {
                named.iter().any(is_zero)
            }
        })
}

/// The figure a row reports: a total-like field first, otherwise the first
/// numeric field that is not a min, max or average.
fn primary_metric(row: &Map<String, Value>) -> Option<f64> {
    let numeric = || {
        row.iter()
            .filter(|(k, v)| k.as_str() != "_id" && v.is_number())
            .map(|(k, v)| (k.to_lowercase(), v))
    };
    numeric()
        .find(|(k, _)| PRIMARY_HINTS.iter().any(|hint| k.contains(hint)))
        .or_else(|| {
            numeric().find(|(k, _)| !SECONDARY_PREFIXES.iter().any(|p| k.starts_with(p)))
        })
        .and_then(|(_, v)| v.as_f64())
}

fn is_placeholder(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => PLACEHOLDERS.contains(&s.trim().to_lowercase().as_str()),
        _ => false,
    }
}

fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn first_metric(row: &Map<String, Value>) -> Option<String> {
    row.iter()
        .find(|(k, v)| k.as_str() != "_id" && v.is_number())
        .map(|(_, v)| v.to_string())
}

fn placeholder_correction(answer: &str, observations: &[(String, Observation)]) -> Option<String> {
    let rows = observations
        .iter()
        .rev()
        .find(|(tool, obs)| tool == AGGREGATE_DATA && obs.is_success())
        .and_then(|(_, obs)| obs.payload())
        .and_then(|payload| payload.get("results"))
        .and_then(Value::as_array)?;
    let leader = rows.first()?.as_object()?;
    let runner_up = rows.get(1)?.as_object()?;
    let leader_id = leader.get("_id").unwrap_or(&Value::Null);
    if !is_placeholder(leader_id) {
        return None;
    }
    let runner_label = label(runner_up.get("_id").unwrap_or(&Value::Null));
    if runner_label.is_empty() || answer.to_lowercase().contains(&runner_label.to_lowercase()) {
        return None;
    }
    Some(format!(
        "The leading group is the placeholder value {:?} (count {}). Report that count and \
         also the next-ranked value {:?} with its count ({}).",
        label(leader_id),
        first_metric(leader).unwrap_or_else(|| "unknown".to_string()),
        runner_label,
        first_metric(runner_up).unwrap_or_else(|| "unknown".to_string()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(payload: Value) -> Observation {
        Observation::Ok(payload.as_object().cloned().unwrap())
    }

    #[test]
    fn detects_zero_dollar_claims() {
        assert!(claims_zero("Q4 spending was $0."));
        assert!(claims_zero("Total: $0.00"));
        assert!(claims_zero("There is no data for Q4"));
        assert!(!claims_zero("Q1 peaked at $1,250,000.50"));
        assert!(!claims_zero("Average of $0.50 per unit"));
        assert!(!claims_zero("$10 million"));
    }

    #[test]
    fn zero_claim_needs_evidence() {
        let nonzero = vec![(
            AGGREGATE_DATA.to_string(),
            ok(json!({"results": [{"_id": "2014-2015", "total": 1250000.5}]})),
        )];
        assert!(review_answer("Q1 highest spending was $0", &nonzero).is_some());

        let empty = vec![(AGGREGATE_DATA.to_string(), ok(json!({"results": []})))];
        assert!(review_answer("Q4 spending was $0", &empty).is_none());

        let zero_count = vec![("count_documents".to_string(), ok(json!({"count": 0})))];
        assert!(review_answer("There is no data for 2020", &zero_count).is_none());
    }

    #[test]
    fn unrelated_zero_fields_are_not_evidence() {
        let with_min = vec![(
            AGGREGATE_DATA.to_string(),
            ok(json!({"results": [{"_id": "2014-2015", "total": 5000, "min_price": 0}]})),
        )];
        assert!(review_answer("Q1 highest spending was $0.", &with_min).is_some());

        let other_group = vec![(
            AGGREGATE_DATA.to_string(),
            ok(json!({"results": [
                {"_id": "2013-2014", "total": 0},
                {"_id": "2014-2015", "total": 5000}
            ]})),
        )];
        assert!(review_answer("Q1 highest spending was $0.", &other_group).is_some());
        assert!(review_answer("FY 2014-2015 spent $0 in Q1.", &other_group).is_some());
        assert!(review_answer("FY 2013-2014 spent $0 in Q1.", &other_group).is_none());

        let stale_count = vec![
            ("count_documents".to_string(), ok(json!({"count": 0}))),
            (
                AGGREGATE_DATA.to_string(),
                ok(json!({"results": [{"_id": null, "total": 800}]})),
            ),
        ];
        assert!(review_answer("Q1 spending was $0", &stale_count).is_some());
    }

    #[test]
    fn zero_totals_from_a_single_row_are_evidence() {
        let obs = vec![
            (
                AGGREGATE_DATA.to_string(),
                ok(json!({"results": [{"_id": null, "total": 0, "orders": 3}]})),
            ),
            (GET_SCHEMA_INFO.to_string(), ok(json!({"fiscal_years": []}))),
        ];
        assert!(review_answer("Q4 spending was $0", &obs).is_none());
    }

    #[test]
    fn placeholder_leader_requires_runner_up() {
        let obs = vec![(
            AGGREGATE_DATA.to_string(),
            ok(json!({"results": [
                {"_id": "Unknown", "count": 900},
                {"_id": "Statewide Contract", "count": 450}
            ]})),
        )];
        let correction = review_answer("The most frequent method is Unknown (900).", &obs).unwrap();
        assert!(correction.contains("Statewide Contract"));
        assert!(correction.contains("450"));
        assert!(review_answer(
            "Unknown leads with 900, followed by Statewide Contract with 450.",
            &obs
        )
        .is_none());
    }

    #[test]
    fn creation_date_aggregations_are_rejected() {
        let bad = ToolCall {
            name: AGGREGATE_DATA.to_string(),
            args: json!({"pipeline": [{"$group": {"_id": {"$month": "$creation_date"}, "total": {"$sum": "$total_price"}}}]}),
        };
        assert!(check_tool_call(&bad).is_err());

        let good = ToolCall {
            name: AGGREGATE_DATA.to_string(),
            args: json!({"pipeline": [{"$group": {"_id": {"$month": "$purchase_date"}, "total": {"$sum": "$total_price"}}}]}),
        };
        assert!(check_tool_call(&good).is_ok());

        let count = ToolCall {
            name: "count_documents".to_string(),
            args: json!({"query": {"creation_date": {"$gte": "2014-07-01"}}}),
        };
        assert!(check_tool_call(&count).is_ok());
    }
}
