use serde_json::Value;
use thiserror::Error;

use crate::transcript::Message;

const FINAL_ANSWER_MARKER: &str = "final answer:";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("marker offset {0} is not on a character boundary")]
    Boundary(usize),
}

/// What the loop hands over once it stops.
#[derive(Clone, Debug)]
pub enum RawOutput {
    Run {
        answer: Option<String>,
        messages: Vec<Message>,
    },
    Other(Value),
}

/// Produces the caller-facing answer text. Never fails: extraction problems
/// are reported inside the returned string.
pub fn extract_answer(raw: &RawOutput) -> String {
    match try_extract(raw) {
        Ok(answer) => answer,
        Err(err) => format!("Error extracting answer: {}", err),
    }
}

fn try_extract(raw: &RawOutput) -> Result<String, ExtractError> {
    let text = match raw {
        RawOutput::Run {
            answer: Some(answer),
            ..
        } if !answer.is_empty() => answer.clone(),
        RawOutput::Run { messages, .. } => match messages.last() {
            Some(last) => last.content.normalize(),
            None => return Ok(String::new()),
        },
        RawOutput::Other(Value::String(text)) => return Ok(text.clone()),
        RawOutput::Other(value) => return Ok(value.to_string()),
    };
    after_final_answer(&text)
}

pub fn has_final_answer(text: &str) -> bool {
    text.to_ascii_lowercase().contains(FINAL_ANSWER_MARKER)
}

/// Returns the trimmed text after the first case-insensitive `Final Answer:`,
/// or the whole trimmed text when the marker is absent.
pub fn after_final_answer(text: &str) -> Result<String, ExtractError> {
    // ASCII lowering keeps byte offsets aligned with the original text
    let lowered = text.to_ascii_lowercase();
    match lowered.find(FINAL_ANSWER_MARKER) {
        Some(idx) => {
            let start = idx + FINAL_ANSWER_MARKER.len();
            text.get(start..)
                .map(|rest| rest.trim().to_string())
                .ok_or(ExtractError::Boundary(start))
        }
        None => Ok(text.trim().to_string()),
    }
}
