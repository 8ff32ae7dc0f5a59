//! Tool-use agent for admin DMs: a fixed tool catalog over the store,
//! indexer and sharing orchestrator, driven by a bounded LLM loop.

pub mod context;
pub mod error;
pub mod history;
pub mod run;
pub mod tools;

pub use context::AgentContext;
pub use error::AgentError;
pub use run::AgentRunner;
