pub mod filter;
pub mod memory;
pub mod pipeline;
pub mod types;
pub mod value;

pub use memory::MemoryStore;
pub use types::{DocumentStore, FindOptions, StoreError};
pub use value::Document;
