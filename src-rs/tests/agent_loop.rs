use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use procurement_agent_rs::agent::{Agent, StopReason};
use procurement_agent_rs::config::AgentConfig;
use procurement_agent_rs::llm::{
    CompletionRequest, Content, LLMResponse, ProviderAdapter, ProviderError, Role, ToolCall,
};
use procurement_agent_rs::store::{Document, MemoryStore};
use serde_json::{json, Value};

/// Replays canned engine replies in order; the last one repeats once the script runs out.
struct ScriptedEngine {
    replies: Mutex<VecDeque<Result<LLMResponse, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedEngine {
    fn new(replies: Vec<Result<LLMResponse, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn texts(texts: &[&str]) -> Arc<Self> {
        Self::new(texts.iter().map(|t| Ok(LLMResponse::text(*t))).collect())
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, idx: usize) -> CompletionRequest {
        self.requests.lock().unwrap()[idx].clone()
    }
}

impl ProviderAdapter for ScriptedEngine {
    fn complete(&self, request: CompletionRequest) -> Result<LLMResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap()
        }
    }
}

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn purchases() -> Arc<MemoryStore> {
    let mut docs = Vec::new();
    for i in 0..1234 {
        let department = if i % 2 == 0 { "Corrections" } else { "Water Resources" };
        docs.push(doc(json!({
            "department_name": department,
            "fiscal_year": "2014-2015",
            "total_price": 10,
            "purchase_date": "2014-08-01",
            "creation_date": "2014-08-02"
        })));
    }
    for _ in 0..6 {
        docs.push(doc(json!({
            "department_name": "Transportation",
            "fiscal_year": "2013-2014",
            "total_price": 250,
            "purchase_date": "2014-05-10",
            "creation_date": "2014-07-20"
        })));
    }
    Arc::new(MemoryStore::new("purchases", docs))
}

fn agent(engine: Arc<ScriptedEngine>, store: Arc<MemoryStore>, config: AgentConfig) -> Agent {
    Agent::new(config, engine, store).unwrap()
}

fn verbose() -> AgentConfig {
    AgentConfig {
        verbose: true,
        ..AgentConfig::default()
    }
}

fn last_tool_turn(request: &CompletionRequest) -> String {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Tool)
        .map(|m| m.content.normalize())
        .unwrap_or_default()
}

#[test]
fn counts_purchases_for_a_fiscal_year() {
    let engine = ScriptedEngine::texts(&[
        "Thought: this is a counting question\nAction: count_documents\nAction Input: {\"query\": {\"fiscal_year\": \"2014-2015\"}}",
        "Thought: I now know the final answer\nFinal Answer: There were 1234 purchases in fiscal year 2014-2015.",
    ]);
    let agent = agent(engine.clone(), purchases(), verbose());

    let result = agent.query("How many purchases in fiscal year 2014-2015?");

    assert_eq!(result.answer, "There were 1234 purchases in fiscal year 2014-2015.");
    assert_eq!(result.agent_steps, Some(vec!["count_documents".to_string()]));
    assert!(result.data.is_empty());
    assert_eq!(result.query_info, None);
    assert_eq!(result.record_count, 0);

    let observation = last_tool_turn(&engine.request(1));
    assert!(observation.starts_with("Observation: "));
    assert!(observation.contains("\"count\":1234"));
    assert!(observation.contains("\"success\":true"));
}

#[test]
fn steps_are_hidden_unless_verbose() {
    let engine = ScriptedEngine::texts(&["Final Answer: 6"]);
    let agent = agent(engine, purchases(), AgentConfig::default());
    let result = agent.query("How many Transportation purchases?");
    assert_eq!(result.answer, "6");
    assert_eq!(result.agent_steps, None);
}

#[test]
fn iteration_cap_stops_after_exactly_that_many_tool_cycles() {
    let looping = LLMResponse {
        content: Content::Text(String::new()),
        tool_calls: vec![ToolCall {
            name: "count_documents".to_string(),
            args: json!({"query": {}}),
        }],
        raw: None,
    };
    let engine = ScriptedEngine::new(vec![Ok(looping)]);
    let config = AgentConfig {
        max_iterations: 3,
        ..verbose()
    };
    let agent = agent(engine.clone(), purchases(), config);

    let run = agent.run("Keep counting").unwrap();
    assert_eq!(run.stop, StopReason::BudgetExhausted);
    assert_eq!(run.steps.len(), 3);
    assert_eq!(engine.calls(), 3);

    let result = agent.query("Keep counting");
    assert!(!result.answer.is_empty());
    assert!(!result.answer.starts_with("Error: "));
}

#[test]
fn malformed_action_input_is_reported_and_recovered() {
    let engine = ScriptedEngine::texts(&[
        "Action: count_documents\nAction Input: {query: {fiscal_year: 2014-2015}}",
        "Action: count_documents\nAction Input: {\"query\": {}}",
        "Final Answer: 1240 purchases in total.",
    ]);
    let agent = agent(engine.clone(), purchases(), verbose());

    let result = agent.query("How many purchases are there?");

    assert_eq!(result.answer, "1240 purchases in total.");
    assert_eq!(result.agent_steps, Some(vec!["count_documents".to_string()]));
    let observation = last_tool_turn(&engine.request(1));
    assert!(observation.contains("\"success\":false"));
    assert!(observation.contains("not valid JSON"));
}

#[test]
fn unknown_tool_becomes_an_observation() {
    let engine = ScriptedEngine::new(vec![
        Ok(LLMResponse {
            content: Content::Text("Let me look.".to_string()),
            tool_calls: vec![ToolCall {
                name: "drop_collection".to_string(),
                args: json!({}),
            }],
            raw: None,
        }),
        Ok(LLMResponse::text("Final Answer: I could not run that tool.")),
    ]);
    let agent = agent(engine.clone(), purchases(), verbose());

    let result = agent.query("Delete everything");

    assert_eq!(result.answer, "I could not run that tool.");
    assert_eq!(result.agent_steps, Some(Vec::new()));
    let observation = last_tool_turn(&engine.request(1));
    assert!(observation.contains("unknown tool"));
    assert!(observation.contains("count_documents"));
}

#[test]
fn zero_spending_claim_without_evidence_is_corrected() {
    let pipeline = r#"{"pipeline": [{"$match": {"purchase_date": {"$gte": "2014-04-01", "$lte": "2014-06-30"}}}, {"$group": {"_id": "$fiscal_year", "total": {"$sum": "$total_price"}}}, {"$sort": {"total": -1}}]}"#;
    let first = format!("Thought: Q4 totals\nAction: aggregate_data\nAction Input: {}", pipeline);
    let engine = ScriptedEngine::texts(&[
        first.as_str(),
        "Final Answer: Q4 highest spending was $0.",
        "Final Answer: Q4 highest spending was in 2013-2014 with $1,500.",
    ]);
    let agent = agent(engine.clone(), purchases(), verbose());

    let result = agent.query("What was the highest spending per quarter across all years?");

    assert_eq!(result.answer, "Q4 highest spending was in 2013-2014 with $1,500.");
    assert_eq!(engine.calls(), 3);
    let aggregate = last_tool_turn(&engine.request(1));
    assert!(aggregate.contains("\"total\":1500"));
    let correction = engine
        .request(2)
        .messages
        .last()
        .map(|m| m.content.normalize())
        .unwrap();
    assert!(correction.starts_with("Policy check:"));
}

#[test]
fn rejected_answers_never_become_the_budget_fallback() {
    let engine = ScriptedEngine::texts(&[
        "Thought: Q1 totals per fiscal year.\nAction: aggregate_data\nAction Input: {\"pipeline\": [{\"$match\": {\"purchase_date\": {\"$gte\": \"2014-07-01\", \"$lte\": \"2014-09-30\"}}}, {\"$group\": {\"_id\": \"$fiscal_year\", \"total\": {\"$sum\": \"$total_price\"}}}]}",
        "Final Answer: Q1 highest spending was $0.",
    ]);
    let config = AgentConfig {
        max_iterations: 3,
        ..verbose()
    };
    let agent = agent(engine.clone(), purchases(), config);

    let run = agent.run("Which fiscal year had the highest Q1 spending?").unwrap();
    assert_eq!(run.stop, StopReason::BudgetExhausted);
    assert_eq!(engine.calls(), 3);
    assert_eq!(run.answer, "Q1 totals per fiscal year.");

    let result = agent.query("Which fiscal year had the highest Q1 spending?");
    assert!(!result.answer.contains("$0"));
    assert!(!result.answer.starts_with("Error: "));
}

#[test]
fn zero_spending_claim_stands_when_the_aggregate_is_empty() {
    let engine = ScriptedEngine::texts(&[
        "Action: aggregate_data\nAction Input: {\"pipeline\": [{\"$match\": {\"fiscal_year\": \"2020-2021\"}}, {\"$group\": {\"_id\": null, \"total\": {\"$sum\": \"$total_price\"}}}]}",
        "Final Answer: Spending in 2020-2021 was $0 because there are no records for that year.",
    ]);
    let agent = agent(engine.clone(), purchases(), verbose());
    let result = agent.query("Spending in 2020-2021?");
    assert!(result.answer.contains("$0"));
    assert_eq!(engine.calls(), 2);
}

#[test]
fn placeholder_leader_requires_the_runner_up() {
    let docs = ["Unknown", "Unknown", "Unknown", "Statewide Contract", "Statewide Contract", "Informal Competitive"]
        .iter()
        .map(|method| doc(json!({"acquisition_method": method, "fiscal_year": "2014-2015"})))
        .collect();
    let store = Arc::new(MemoryStore::new("purchases", docs));
    let engine = ScriptedEngine::texts(&[
        "Action: aggregate_data\nAction Input: {\"pipeline\": [{\"$group\": {\"_id\": \"$acquisition_method\", \"count\": {\"$sum\": 1}}}, {\"$sort\": {\"count\": -1}}, {\"$limit\": 3}]}",
        "Final Answer: The most frequent acquisition method is Unknown (3).",
        "Final Answer: Unknown leads with 3 purchases; the most frequent known method is Statewide Contract with 2.",
    ]);
    let agent = agent(engine.clone(), store, verbose());

    let result = agent.query("What is the most frequent acquisition method?");

    assert!(result.answer.contains("Statewide Contract with 2"));
    let correction = engine
        .request(2)
        .messages
        .last()
        .map(|m| m.content.normalize())
        .unwrap();
    assert!(correction.contains("Statewide Contract"));
}

#[test]
fn policy_can_be_disabled() {
    let engine = ScriptedEngine::texts(&["Final Answer: There is no data for that."]);
    let config = AgentConfig {
        enforce_policy: false,
        ..AgentConfig::default()
    };
    let agent = agent(engine.clone(), purchases(), config);
    assert_eq!(agent.query("Anything?").answer, "There is no data for that.");
    assert_eq!(engine.calls(), 1);
}

#[test]
fn creation_date_totals_are_rejected_before_execution() {
    let engine = ScriptedEngine::texts(&[
        "Action: aggregate_data\nAction Input: {\"pipeline\": [{\"$group\": {\"_id\": {\"$month\": \"$creation_date\"}, \"total\": {\"$sum\": \"$total_price\"}}}]}",
        "Final Answer: Monthly totals need purchase_date.",
    ]);
    let agent = agent(engine.clone(), purchases(), verbose());
    agent.query("Monthly spending?");
    let observation = last_tool_turn(&engine.request(1));
    assert!(observation.contains("\"success\":false"));
    assert!(observation.contains("purchase_date"));
}

#[test]
fn engine_failure_yields_an_error_result() {
    let engine = ScriptedEngine::new(vec![Err(ProviderError::new("rate_limit", "quota exhausted", true))]);
    let agent = agent(engine, purchases(), verbose());

    let result = agent.query("How many purchases?");

    assert!(result.answer.starts_with("Error: "));
    assert!(result.answer.contains("quota exhausted"));
    assert!(result.data.is_empty());
    assert_eq!(result.record_count, 0);
    assert_eq!(result.agent_steps, None);
}

#[test]
fn schema_tool_reports_collection_shape() {
    let engine = ScriptedEngine::texts(&[
        "Action: get_schema_info\nAction Input: {}",
        "Final Answer: Fiscal years run July 1 to June 30.",
    ]);
    let agent = agent(engine.clone(), purchases(), verbose());
    agent.query("What is a fiscal year?");
    let observation = last_tool_turn(&engine.request(1));
    assert!(observation.contains("\"fiscal_years\":[\"2013-2014\",\"2014-2015\"]"));
    assert!(observation.contains("\"sample_departments\""));
}
