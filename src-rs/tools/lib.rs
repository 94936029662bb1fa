pub mod procurement;
pub mod registry;
pub mod types;

pub use procurement::{register_procurement_tools, AGGREGATE_DATA, COUNT_DOCUMENTS, GET_SCHEMA_INFO, SEARCH_DATABASE};
pub use registry::ToolRegistry;
pub use types::{Observation, RegistryError, ToolEntry, ToolError, ToolHandler, ToolSchema};
