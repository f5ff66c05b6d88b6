use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::db;
use crate::error::ApiError;
use crate::models::{ApiResponse, Event, EventInput, MonthQuery};
use crate::state::AppState;
use crate::validation::Validator;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/events", get(list_events).post(create_event))
        .route(
            "/api/events/{id}",
            get(get_event).put(update_event).delete(delete_event),
        )
}

/// GET /api/events?month=M&year=Y - Events overlapping a month, or all events
/// when no month is given.
async fn list_events(
    State(state): State<AppState>,
    query: Result<Query<MonthQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<Event>>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let events = match Validator::month_range(&query)? {
        Some(range) => {
            tracing::debug!(start = %range.start, end = %range.end, "Listing events for month");
            db::list_events_in_range(&state.pool, &range).await?
        }
        None => db::list_events(&state.pool).await?,
    };

    Ok(Json(ApiResponse::list(events)))
}

/// GET /api/events/{id}
async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Event>>, ApiError> {
    let id = Validator::parse_id(&id)?;

    let event = db::get_event(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(ApiResponse::ok(event)))
}

/// POST /api/events
async fn create_event(
    State(state): State<AppState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Event>>), ApiError> {
    let input = event_input(body)?;

    let event = db::insert_event(&state.pool, &input).await?;
    tracing::info!(id = %event.id, "Created event");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(event))))
}

/// PUT /api/events/{id}
async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<ApiResponse<Event>>, ApiError> {
    let id = Validator::parse_id(&id)?;
    let input = event_input(body)?;

    let event = db::update_event(&state.pool, id, &input)
        .await?
        .ok_or(ApiError::NotFound)?;
    tracing::info!(id = %event.id, "Updated event");

    Ok(Json(ApiResponse::ok(event)))
}

/// DELETE /api/events/{id}
async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let id = Validator::parse_id(&id)?;

    if !db::delete_event(&state.pool, id).await? {
        return Err(ApiError::NotFound);
    }
    tracing::info!(id = %id, "Deleted event");

    Ok(Json(ApiResponse::ok(serde_json::json!({}))))
}

/// Validate a create/update body. Malformed JSON is a plain 400; field
/// problems come back as a list of messages.
fn event_input(
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<EventInput, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let payload = Validator::payload_from_json(&body).map_err(ApiError::Validation)?;
    Validator::validate_event(&payload).map_err(ApiError::Validation)
}
