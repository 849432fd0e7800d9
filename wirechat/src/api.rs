//! REST API client for the message durability layer.
//!
//! The transport is a delivery-latency optimization only; these three
//! endpoints are where messages actually live:
//! - `GET /messages/{a}/{b}` — full conversation history
//! - `POST /messages` — persist a draft
//! - `PATCH /messages/{id}/seen` — idempotent seen flip (retried here,
//!   since re-marking a seen message is a no-op server-side)

use wirechat_proto::message::{Message, MessageDraft, MessageId, UserId};

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request failed at the HTTP level (connect, timeout, non-2xx).
    #[error("api request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Client for the backend's message endpoints.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    mark_seen_retries: u32,
}

impl ApiClient {
    /// Creates a client for the given base URL (e.g. `http://host:4000`).
    #[must_use]
    pub fn new(base_url: impl Into<String>, mark_seen_retries: u32) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            mark_seen_retries,
        }
    }

    /// Fetch the full history for the (a, b) pair, both directions,
    /// ordered by creation time.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] on connection failure, a non-2xx
    /// status, or a malformed response body.
    pub async fn history(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, ApiError> {
        let url = format!("{}/messages/{}/{}", self.base_url, a, b);
        let messages = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(messages)
    }

    /// Persist a draft; the backend assigns the id and timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] on connection failure, a non-2xx
    /// status, or a malformed response body.
    pub async fn persist(&self, draft: &MessageDraft) -> Result<Message, ApiError> {
        let url = format!("{}/messages", self.base_url);
        let stored = self
            .http
            .post(url)
            .json(draft)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(stored)
    }

    /// Mark a message as seen, retrying a bounded number of times.
    ///
    /// The endpoint is idempotent, so retrying after an ambiguous failure
    /// is safe. Client errors (4xx) are not retried — a 404 will not
    /// become anything else.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] once all attempts are exhausted.
    pub async fn mark_seen(&self, id: &MessageId) -> Result<(), ApiError> {
        let url = format!("{}/messages/{}/seen", self.base_url, id);
        let mut last_err = None;

        for attempt in 0..=self.mark_seen_retries {
            match self.http.patch(&url).send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(_) => return Ok(()),
                    Err(e) if e.status().is_some_and(|s| s.is_client_error()) => {
                        return Err(ApiError::Http(e));
                    }
                    Err(e) => {
                        tracing::debug!(attempt, id = %id, err = %e, "mark-seen failed, will retry");
                        last_err = Some(e);
                    }
                },
                Err(e) => {
                    tracing::debug!(attempt, id = %id, err = %e, "mark-seen failed, will retry");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .map(ApiError::Http)
            .unwrap_or_else(|| unreachable!("loop ran at least once")))
    }
}
