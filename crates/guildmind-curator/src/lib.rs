//! Opt-in workflow curation: detect creator workflows on reacted posts
//! (JSON attachments or PNG metadata), collect consent, convert and upload
//! media, classify the base model and record the asset.

pub mod classify;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod png;

pub use error::CuratorError;
pub use pipeline::Curator;
