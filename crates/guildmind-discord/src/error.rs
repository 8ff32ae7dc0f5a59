use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("discord api error: {0}")]
    Api(#[from] serenity::Error),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: String },

    #[error("not found: {0}")]
    NotFound(String),
}

/// How a failed call should be treated by the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Remote told us to slow down; sleep `retry_after` exactly if given.
    RateLimited { retry_after: Option<Duration> },
    /// Network-level trouble or 5xx — back off and try again.
    Transient,
    /// 4xx-class failure — retrying cannot help.
    Permanent,
}

pub trait Retryable {
    fn retry_class(&self) -> RetryClass;
}

impl Retryable for serenity::Error {
    fn retry_class(&self) -> RetryClass {
        match self {
            serenity::Error::Http(http_err) => match http_err {
                serenity::http::HttpError::UnsuccessfulRequest(resp) => {
                    let status = resp.status_code.as_u16();
                    if status == 429 {
                        RetryClass::RateLimited { retry_after: None }
                    } else if status >= 500 {
                        RetryClass::Transient
                    } else {
                        RetryClass::Permanent
                    }
                }
                _ => RetryClass::Transient,
            },
            serenity::Error::Gateway(_) | serenity::Error::Io(_) | serenity::Error::Tungstenite(_) => {
                RetryClass::Transient
            }
            _ => RetryClass::Permanent,
        }
    }
}

impl Retryable for DiscordError {
    fn retry_class(&self) -> RetryClass {
        match self {
            DiscordError::Api(e) => e.retry_class(),
            DiscordError::Exhausted { .. } => RetryClass::Permanent,
            DiscordError::NotFound(_) => RetryClass::Permanent,
        }
    }
}
