//! Outbound callback delivery.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CallbackError;

/// Delivers a fired callback. Only the response status is reported.
#[async_trait]
pub trait CallbackSender: Send + Sync {
    /// Issue a GET to `url` and return the response status code.
    async fn send(&self, url: &str) -> Result<u16, CallbackError>;
}

/// [`CallbackSender`] over HTTP with a bounded per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpCallbackSender {
    client: reqwest::Client,
}

impl HttpCallbackSender {
    /// Build a sender whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, CallbackError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dbgbridge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackSender for HttpCallbackSender {
    async fn send(&self, url: &str) -> Result<u16, CallbackError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CallbackError::Timeout {
                    url: url.to_string(),
                }
            } else {
                CallbackError::Request(e)
            }
        })?;
        Ok(response.status().as_u16())
    }
}

/// Deliver `url` on `sender` and log the outcome.
pub async fn deliver(sender: &dyn CallbackSender, url: &str) {
    match sender.send(url).await {
        Ok(status) => tracing::info!(url, status, "callback delivered"),
        Err(e) => tracing::warn!(url, "callback failed: {e}"),
    }
}
