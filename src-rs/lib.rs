pub mod agent;
pub mod config;
pub mod extract;
pub mod helpers;
pub mod policy;
pub mod prompt;
pub mod result;
pub mod transcript;

#[path = "llm/lib.rs"]
pub mod llm;
#[path = "tools/lib.rs"]
pub mod tools;
#[path = "store/lib.rs"]
pub mod store;
#[path = "api/lib.rs"]
pub mod api;

pub use agent::{Agent, AgentError, AgentRun, StopReason};
pub use config::{AgentConfig, Settings};
pub use result::QueryResult;
