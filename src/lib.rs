pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod range;
pub mod retry;
pub mod routes;
pub mod state;
pub mod validation;

pub use client::{ClientError, ErrorKind, EventClient};
pub use config::{ClientConfig, Config};
pub use db::{current_epoch_ms, init_pool, run_migrations};
pub use error::ApiError;
pub use models::{ApiResponse, ErrorMessage, Event, EventInput, EventPayload, MonthQuery};
pub use range::{events_overlapping_range, InvalidRangeError, MonthRange};
pub use retry::{execute_with_retry, Retry, RetryConfig, RetryError, RetryObserver, Retryable};
pub use routes::create_router;
pub use state::AppState;
pub use validation::Validator;
