//! Typed HTTP client for the events API.
//!
//! Every call goes through [`Retry`], so transient failures (connection
//! errors, timeouts, 5xx responses) are retried with backoff while client
//! errors surface on the first attempt. Reads and writes use separate
//! policies from [`ClientConfig`].

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::models::{ApiResponse, Event, EventInput};
use crate::retry::{Retry, RetryConfig, RetryError, RetryObserver, Retryable};

/// Coarse classification of a failed API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Timeout,
    Server,
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Unknown,
}

impl ErrorKind {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 => ErrorKind::Validation,
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            s if s >= 500 => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        }
    }

    /// Network failures, timeouts and server errors are transient.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Server
        )
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::Network => "Unable to reach the server. Check your connection.",
            ErrorKind::Timeout => "The request timed out. Please try again shortly.",
            ErrorKind::Server => "The server ran into a problem. Please try again shortly.",
            ErrorKind::Unauthorized => "Authentication is required.",
            ErrorKind::Forbidden => "You do not have access to this resource.",
            ErrorKind::NotFound => "The requested item could not be found.",
            ErrorKind::Validation => "The submitted information is not valid.",
            ErrorKind::Unknown => "An unexpected error occurred. Please try again shortly.",
        }
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request failed with status {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("Request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Status { status, .. } => ErrorKind::from_status(*status),
            ClientError::Timeout(_) => ErrorKind::Timeout,
            ClientError::Network(_) => ErrorKind::Network,
            ClientError::Decode(_) | ClientError::Build(_) => ErrorKind::Unknown,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout(e)
        } else if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ClientError::Status {
                status,
                message: e.to_string(),
            }
        } else {
            ClientError::Network(e)
        }
    }
}

impl Retryable for ClientError {
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// HTTP client for the events API.
#[derive(Clone)]
pub struct EventClient {
    http: reqwest::Client,
    base_url: String,
    query_retry: RetryConfig,
    mutation_retry: RetryConfig,
    retry_statuses: Arc<[u16]>,
    observer: Option<Arc<dyn RetryObserver<ClientError>>>,
    cancel: Option<CancellationToken>,
}

impl EventClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            query_retry: config.retry,
            mutation_retry: config.mutation_retry,
            retry_statuses: config.retry_statuses.into(),
            observer: None,
            cancel: None,
        })
    }

    /// Notify `observer` before every retry (e.g. to show "retrying, attempt N of M").
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver<ClientError>>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Abandon pending retries once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// GET /events - every event.
    pub async fn list_events(&self) -> Result<Vec<Event>, RetryError<ClientError>> {
        self.executor(&self.query_retry)
            .run(|| self.request::<Vec<Event>, ()>(Method::GET, "/events", &[], None))
            .await
    }

    /// GET /events?month=M&year=Y - events overlapping one month.
    pub async fn list_month_events(
        &self,
        month: u32,
        year: i32,
    ) -> Result<Vec<Event>, RetryError<ClientError>> {
        let query = [("month", month.to_string()), ("year", year.to_string())];
        self.executor(&self.query_retry)
            .run(|| self.request::<Vec<Event>, ()>(Method::GET, "/events", &query, None))
            .await
    }

    pub async fn get_event(&self, id: Uuid) -> Result<Event, RetryError<ClientError>> {
        let path = format!("/events/{}", id);
        self.executor(&self.query_retry)
            .run(|| self.request::<Event, ()>(Method::GET, &path, &[], None))
            .await
    }

    pub async fn create_event(&self, input: &EventInput) -> Result<Event, RetryError<ClientError>> {
        self.executor(&self.mutation_retry)
            .run(|| self.request::<Event, _>(Method::POST, "/events", &[], Some(input)))
            .await
    }

    pub async fn update_event(
        &self,
        id: Uuid,
        input: &EventInput,
    ) -> Result<Event, RetryError<ClientError>> {
        let path = format!("/events/{}", id);
        self.executor(&self.mutation_retry)
            .run(|| self.request::<Event, _>(Method::PUT, &path, &[], Some(input)))
            .await
    }

    pub async fn delete_event(&self, id: Uuid) -> Result<(), RetryError<ClientError>> {
        let path = format!("/events/{}", id);
        self.executor(&self.mutation_retry)
            .run(|| self.request::<serde_json::Value, ()>(Method::DELETE, &path, &[], None))
            .await
            .map(|_| ())
    }

    fn executor(&self, config: &RetryConfig) -> Retry<ClientError> {
        let statuses = self.retry_statuses.clone();
        let mut retry = Retry::new(config.clone()).retry_if(move |e: &ClientError| {
            e.is_retryable()
                || e.status()
                    .is_some_and(|status| statuses.contains(&status.as_u16()))
        });
        if let Some(observer) = &self.observer {
            retry = retry.observer(observer.clone());
        }
        if let Some(token) = &self.cancel {
            retry = retry.cancel_on(token.clone());
        }
        retry
    }

    /// One attempt: send the request and unwrap the response envelope.
    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = match response.json::<ApiResponse<serde_json::Value>>().await {
                Ok(ApiResponse {
                    error: Some(error), ..
                }) => error.to_string(),
                _ => status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string(),
            };
            return Err(ClientError::Status { status, message });
        }

        let envelope = response.json::<ApiResponse<T>>().await?;
        envelope
            .data
            .ok_or_else(|| ClientError::Decode("response envelope has no data".to_string()))
    }
}
