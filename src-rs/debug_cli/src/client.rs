use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::models::{QueryRequest, QueryResponse, StatsResponse};

pub struct HTTPClient {
    pub base_url: String,
    client: Client,
}

impl HTTPClient {
    pub fn new(base_url: &str) -> Result<Self, String> {
        let client = Client::builder()
            // agent runs make several model round trips
            .timeout(Duration::from_secs(180))
            .build()
            .map_err(|err| err.to_string())?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn query(&self, question: &str) -> Result<QueryResponse, String> {
        let resp = self
            .client
            .post(format!("{}/api/query", self.base_url))
            .json(&QueryRequest {
                question: question.to_string(),
            })
            .send()
            .map_err(|err| err.to_string())?;
        // 422 still carries an error answer in the usual shape
        if resp.status().as_u16() == 422 {
            return resp.json::<QueryResponse>().map_err(|err| err.to_string());
        }
        decode(resp)
    }

    pub fn stats(&self) -> Result<StatsResponse, String> {
        self.get("/api/stats")
    }

    pub fn list(&self, path: &str, key: &str) -> Result<Vec<String>, String> {
        let value: Value = self.get(path)?;
        Ok(value
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, String> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .map_err(|err| err.to_string())?;
        decode(resp)
    }
}

fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, String> {
    if resp.status().is_success() {
        resp.json::<T>().map_err(|err| err.to_string())
    } else {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        Err(format!("http {}: {}", status.as_u16(), body))
    }
}
