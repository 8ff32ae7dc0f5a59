//! Daily per-channel and server-wide news summaries: chunked LLM prompts,
//! strict JSON parsing (failures are data), monthly-thread posting under
//! Discord length rules, the top-content selector, and the aggregate
//! cross-channel digest.

pub mod engine;
pub mod error;
pub mod media_filter;
pub mod mentions;
pub mod parse;
pub mod post;
pub mod prompts;
pub mod top_content;

pub use engine::{RunReport, Summarizer};
pub use error::SummaryError;
pub use parse::{NewsItem, SubTopic, SummaryOutput};
