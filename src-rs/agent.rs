use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::config::AgentConfig;
use crate::extract::{after_final_answer, extract_answer, has_final_answer, RawOutput};
use crate::llm::{CompletionRequest, LLMResponse, Message, ProviderAdapter, ProviderError, ToolCall};
use crate::policy;
use crate::prompt::build_system_prompt;
use crate::result::QueryResult;
use crate::store::DocumentStore;
use crate::tools::{register_procurement_tools, Observation, ToolRegistry};
use crate::transcript::Transcript;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("tool {tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("malformed tool call: {0}")]
    MalformedToolCall(String),

    #[error("stopped after {0} iterations without a final answer")]
    IterationBudgetExceeded(usize),

    #[error("{0}")]
    Fatal(String),

    #[error("reasoning engine error: {0}")]
    Provider(#[from] ProviderError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    FinalAnswer,
    BudgetExhausted,
}

/// Everything one question produced.
#[derive(Clone, Debug)]
pub struct AgentRun {
    pub answer: String,
    pub transcript: Transcript,
    /// Tool names in invocation order.
    pub steps: Vec<String>,
    pub iterations: usize,
    pub stop: StopReason,
}

enum Step {
    ToolSelected(Vec<ToolCall>),
    Malformed(AgentError),
    FinalAnswer,
}

/// Binds the reasoning engine to the procurement tools.
///
/// Holds no per-query state, so one instance serves concurrent requests.
pub struct Agent {
    pub config: AgentConfig,
    pub system_prompt: String,
    engine: Arc<dyn ProviderAdapter>,
    tools: ToolRegistry,
}

impl Agent {
    pub fn new(
        mut config: AgentConfig,
        engine: Arc<dyn ProviderAdapter>,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self, AgentError> {
        if config.model.is_empty() {
            config.model = AgentConfig::default().model;
        }
        if config.max_iterations == 0 {
            config.max_iterations = AgentConfig::default().max_iterations;
        }
        let tools = ToolRegistry::new();
        register_procurement_tools(&tools, store).map_err(|err| AgentError::Fatal(err.to_string()))?;
        let system_prompt = build_system_prompt(&tools);
        tracing::info!(
            model = %config.model,
            tools = tools.count(),
            max_iterations = config.max_iterations,
            "procurement agent initialized"
        );
        Ok(Self {
            config,
            system_prompt,
            engine,
            tools,
        })
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answers one question. Always yields a result; failures become an
    /// `Error: ...` answer.
    pub fn query(&self, question: &str) -> QueryResult {
        tracing::info!(question, "processing procurement query");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(question)))
            .unwrap_or_else(|payload| Err(AgentError::Fatal(panic_message(payload))));
        match outcome {
            Ok(run) => {
                tracing::info!(
                    iterations = run.iterations,
                    tools = run.steps.len(),
                    stop = ?run.stop,
                    "query answered"
                );
                let steps = if self.config.verbose { Some(run.steps) } else { None };
                QueryResult::answered(run.answer, steps)
            }
            Err(err) => {
                tracing::error!(error = %err, "agent run failed");
                QueryResult::error(err)
            }
        }
    }

    /// Drives the think/act/observe cycle until a final answer or the iteration cap.
    pub fn run(&self, question: &str) -> Result<AgentRun, AgentError> {
        let mut transcript = Transcript::new();
        transcript.push(Message::system(self.system_prompt.clone()));
        transcript.push(Message::user(question));

        let schemas = self.tools.get_schemas();
        let mut steps = Vec::new();
        let mut observations: Vec<(String, Observation)> = Vec::new();
        // Best answer so far from turns that were not rejected by the policy checks.
        let mut partial = String::new();

        for iteration in 1..=self.config.max_iterations {
            let request = CompletionRequest {
                messages: transcript.turns().to_vec(),
                tools: Some(schemas.clone()),
                temperature: Some(self.config.temperature),
                model: Some(self.config.model.clone()),
            };
            let response = self.engine.complete(request)?;
            let text = response.content.normalize();
            tracing::debug!(iteration, tool_calls = response.tool_calls.len(), "reasoning step");

            match self.next_step(&response, &text) {
                Step::FinalAnswer => {
                    if self.config.enforce_policy {
                        let candidate = after_final_answer(&text).unwrap_or_else(|_| text.clone());
                        if let Some(correction) = policy::review_answer(&candidate, &observations) {
                            tracing::warn!(iteration, %correction, "final answer rejected");
                            transcript.push(Message::assistant(response.content));
                            transcript.push(Message::user(format!("Policy check: {}", correction)));
                            continue;
                        }
                    }
                    transcript.push(Message::assistant(response.content));
                    let answer = extract_answer(&RawOutput::Run {
                        answer: None,
                        messages: transcript.turns().to_vec(),
                    });
                    return Ok(AgentRun {
                        answer,
                        transcript,
                        steps,
                        iterations: iteration,
                        stop: StopReason::FinalAnswer,
                    });
                }
                Step::Malformed(err) => {
                    tracing::warn!(iteration, error = %err, "malformed tool call");
                    if !text.trim().is_empty() {
                        let turn = cut_observation(&text);
                        keep_partial(&mut partial, &turn);
                        transcript.push(Message::assistant(turn));
                    }
                    let observation = Observation::Err(err.to_string());
                    transcript.push(Message::tool(format!("Observation: {}", observation.to_json())));
                }
                Step::ToolSelected(calls) => {
                    let turn = if response.tool_calls.is_empty() {
                        cut_observation(&text)
                    } else {
                        render_native_calls(&text, &calls)
                    };
                    keep_partial(&mut partial, &turn);
                    transcript.push(Message::assistant(turn));
                    for call in calls {
                        let observation = self.invoke(&call);
                        transcript.push(Message::tool(format!("Observation: {}", observation.to_json())));
                        steps.push(call.name.clone());
                        observations.push((call.name, observation));
                    }
                }
            }
        }

        let exceeded = AgentError::IterationBudgetExceeded(self.config.max_iterations);
        tracing::warn!(error = %exceeded, "iteration budget exhausted");
        let rejected = self.config.enforce_policy
            && policy::review_answer(&partial, &observations).is_some();
        let answer = if partial.is_empty() || rejected {
            exceeded.to_string()
        } else {
            partial
        };
        Ok(AgentRun {
            answer,
            transcript,
            steps,
            iterations: self.config.max_iterations,
            stop: StopReason::BudgetExhausted,
        })
    }

    fn invoke(&self, call: &ToolCall) -> Observation {
        if self.config.enforce_policy {
            if let Err(message) = policy::check_tool_call(call) {
                tracing::warn!(tool = %call.name, "tool call rejected by policy");
                return Observation::Err(message);
            }
        }
        tracing::debug!(tool = %call.name, args = %call.args, "executing tool");
        let observation = self.tools.execute(&call.name, call.args.clone());
        if let Observation::Err(message) = &observation {
            let err = AgentError::ToolExecution {
                tool: call.name.clone(),
                message: message.clone(),
            };
            tracing::debug!(error = %err, "tool failure returned to the model");
        }
        observation
    }

    fn next_step(&self, response: &LLMResponse, text: &str) -> Step {
        if !response.tool_calls.is_empty() {
            let mut calls = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                match self.resolve(&call.name, call.args.clone()) {
                    Ok(call) => calls.push(call),
                    Err(err) => return Step::Malformed(err),
                }
            }
            return Step::ToolSelected(calls);
        }
        if has_final_answer(text) {
            return Step::FinalAnswer;
        }
        match parse_action(text) {
            Some(Ok((name, input))) => match self.resolve(&name, Value::String(input)) {
                Ok(call) => Step::ToolSelected(vec![call]),
                Err(err) => Step::Malformed(err),
            },
            Some(Err(err)) => Step::Malformed(err),
            None if text.trim().is_empty() => {
                Step::Malformed(AgentError::MalformedToolCall("empty response".to_string()))
            }
            None => Step::FinalAnswer,
        }
    }

    /// Checks the tool name and decodes string-encoded arguments.
    fn resolve(&self, name: &str, args: Value) -> Result<ToolCall, AgentError> {
        if !self.tools.has(name) {
            return Err(AgentError::MalformedToolCall(format!(
                "unknown tool {:?}; available tools: {}",
                name,
                self.tools.names().join(", ")
            )));
        }
        let args = match args {
            Value::String(raw) => parse_action_input(&raw)?,
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        Ok(ToolCall {
            name: name.to_string(),
            args,
        })
    }
}

/// Finds `Action:` and `Action Input:` lines in ReAct text.
fn parse_action(text: &str) -> Option<Result<(String, String), AgentError>> {
    let text = cut_observation(text);
    let action_at = text
        .lines()
        .position(|line| line.trim_start().starts_with("Action:"))?;
    let lines: Vec<&str> = text.lines().collect();
    let name = lines[action_at]
        .trim_start()
        .trim_start_matches("Action:")
        .trim()
        .trim_matches('`')
        .to_string();
    if name.is_empty() {
        return Some(Err(AgentError::MalformedToolCall(
            "Action line names no tool".to_string(),
        )));
    }

    let rest = &lines[action_at + 1..];
    let input = match rest
        .iter()
        .position(|line| line.trim_start().starts_with("Action Input:"))
    {
        Some(idx) => {
            let first = rest[idx].trim_start().trim_start_matches("Action Input:");
            std::iter::once(first)
                .chain(rest[idx + 1..].iter().copied())
                .collect::<Vec<_>>()
                .join("\n")
        }
        None => String::new(),
    };
    Some(Ok((name, input)))
}

fn parse_action_input(raw: &str) -> Result<Value, AgentError> {
    let cleaned = strip_code_fence(raw.trim());
    if cleaned.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(cleaned).map_err(|err| {
        AgentError::MalformedToolCall(format!(
            "Action Input is not valid JSON ({}); use double-quoted JSON",
            err
        ))
    })
}

fn strip_code_fence(raw: &str) -> &str {
    let Some(inner) = raw.strip_prefix("```") else {
        return raw;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

// Models sometimes write the observation themselves; only the tool may.
fn cut_observation(text: &str) -> String {
    match text.find("\nObservation:") {
        Some(idx) => text[..idx].trim_end().to_string(),
        None => text.trim_end().to_string(),
    }
}

fn render_native_calls(text: &str, calls: &[ToolCall]) -> String {
    let mut out = text.trim().to_string();
    for call in calls {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("Action: {}\nAction Input: {}", call.name, call.args));
    }
    out
}

fn partial_answer(text: &str) -> String {
    if has_final_answer(text) {
        return after_final_answer(text).unwrap_or_default();
    }
    let thought: Vec<&str> = text
        .lines()
        .take_while(|line| !line.trim_start().starts_with("Action:"))
        .collect();
    thought
        .join("\n")
        .trim()
        .trim_start_matches("Thought:")
        .trim()
        .to_string()
}

fn keep_partial(partial: &mut String, turn: &str) {
    let candidate = partial_answer(turn);
    if !candidate.is_empty() {
        *partial = candidate;
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("agent panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("agent panicked: {}", msg)
    } else {
        "agent panicked".to_string()
    }
}
