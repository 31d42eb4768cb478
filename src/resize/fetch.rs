//! Outbound image fetches with a hard cap on payload size.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::header::USER_AGENT;
use tracing::debug;

use super::ResizeError;

/// Downloads source images.
///
/// Wraps a [`reqwest::Client`]; clones share its connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    user_agent: String,
    max_bytes: u64,
}

impl Fetcher {
    /// Builds a fetcher sending `user_agent`, giving up on a request after
    /// `timeout`, and refusing bodies longer than `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ResizeError::Request`] if the HTTP client cannot be built
    /// (e.g. the TLS backend fails to initialize).
    pub fn new(
        user_agent: impl Into<String>,
        timeout: Duration,
        max_bytes: u64,
    ) -> Result<Self, ResizeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            user_agent: user_agent.into(),
            max_bytes,
        })
    }

    /// Fetches `url`, returning the full body.
    ///
    /// # Errors
    ///
    /// - [`ResizeError::Request`]: connection failure, timeout, or a broken body stream.
    /// - [`ResizeError::Status`]: the origin answered with a non-2xx status.
    /// - [`ResizeError::PayloadTooLarge`]: the body exceeds the configured cap.
    pub async fn fetch(&self, url: &str) -> Result<Bytes, ResizeError> {
        debug!(url, "fetching");
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResizeError::Status(status.as_u16()));
        }

        if response
            .content_length()
            .is_some_and(|declared| declared > self.max_bytes)
        {
            return Err(ResizeError::PayloadTooLarge {
                max_bytes: self.max_bytes,
            });
        }

        // Content-Length may be absent or wrong, so count while streaming.
        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(ResizeError::PayloadTooLarge {
                    max_bytes: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body.freeze())
    }
}
