//! Consent-gated sharing of member media to external platforms: the
//! reactor ↔ bot ↔ author dialog state machine, LLM moderation with
//! fail-open transport semantics, handle extraction and publisher fan-out.

pub mod dialog;
pub mod error;
pub mod flow;
pub mod handles;
pub mod moderate;
pub mod publisher;

pub use dialog::{ConsentChoice, DialogRegistry};
pub use error::ShareError;
pub use flow::ShareFlow;
pub use publisher::{HttpPublisher, PublishResult, Publisher};
