//! Discord session plumbing: the per-key exponential-backoff rate limiter,
//! connection health monitoring, chunked/safe send helpers, thread
//! management and rate-limited REST fetches. serenity owns the socket; this
//! crate wraps everything that crosses it.

pub mod error;
pub mod fetch;
pub mod monitor;
pub mod rate_limit;
pub mod send;
pub mod threads;

pub use error::{DiscordError, RetryClass, Retryable};
pub use monitor::{ConnectionMonitor, MonitorStatus};
pub use rate_limit::RateLimiter;
