use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug)]
pub struct CLIConfig {
    pub base_url: String,
    pub debug: bool,
}

#[derive(Clone, Debug)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub record_count: u64,
    #[serde(default)]
    pub agent_steps: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
pub struct StatsResponse {
    pub total_records: u64,
    pub departments: usize,
    pub suppliers: usize,
    pub fiscal_years: Vec<String>,
    pub total_spending: f64,
    pub date_range: DateRange,
}
