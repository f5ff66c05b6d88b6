use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{Event, EventInput};
use crate::range::MonthRange;

/// Get current time as milliseconds since Unix epoch.
pub fn current_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Initialize database connection pool with recommended pragmas.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
}

/// Run database migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(include_str!("../migrations/001_create_events.sql"))
        .execute(pool)
        .await?;
    Ok(())
}

/// An `events` row as stored, timestamps in epoch milliseconds.
#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: String,
    title: String,
    description: Option<String>,
    start_ms: i64,
    end_ms: Option<i64>,
    created_ms: i64,
    updated_ms: i64,
}

impl TryFrom<EventRow> for Event {
    type Error = sqlx::Error;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: Uuid::parse_str(&row.id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            title: row.title,
            description: row.description,
            start_date_time: from_epoch_ms(row.start_ms)?,
            end_date_time: row.end_ms.map(from_epoch_ms).transpose()?,
            created_at: from_epoch_ms(row.created_ms)?,
            updated_at: from_epoch_ms(row.updated_ms)?,
        })
    }
}

fn from_epoch_ms(ms: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| sqlx::Error::Decode(format!("timestamp out of range: {}", ms).into()))
}

fn into_events(rows: Vec<EventRow>) -> Result<Vec<Event>, sqlx::Error> {
    rows.into_iter().map(Event::try_from).collect()
}

/// Insert a new event and return it as stored.
pub async fn insert_event(pool: &SqlitePool, input: &EventInput) -> Result<Event, sqlx::Error> {
    let id = Uuid::new_v4();
    let now_ms = current_epoch_ms();

    sqlx::query(
        r#"
        INSERT INTO events (id, title, description, start_ms, end_ms, created_ms, updated_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&input.title)
    .bind(input.description.as_deref())
    .bind(input.start_date_time.timestamp_millis())
    .bind(input.end_date_time.map(|t| t.timestamp_millis()))
    .bind(now_ms)
    .bind(now_ms)
    .execute(pool)
    .await?;

    get_event(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
}

/// Get a single event by id.
pub async fn get_event(pool: &SqlitePool, id: Uuid) -> Result<Option<Event>, sqlx::Error> {
    let row = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, title, description, start_ms, end_ms, created_ms, updated_ms
        FROM events
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(Event::try_from).transpose()
}

/// Get all events ordered by start time, ties in insertion order.
pub async fn list_events(pool: &SqlitePool) -> Result<Vec<Event>, sqlx::Error> {
    let rows = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, title, description, start_ms, end_ms, created_ms, updated_ms
        FROM events
        ORDER BY start_ms ASC, rowid ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    into_events(rows)
}

/// Get events overlapping a month: starting inside it, ending inside it,
/// or spanning all of it.
pub async fn list_events_in_range(
    pool: &SqlitePool,
    range: &MonthRange,
) -> Result<Vec<Event>, sqlx::Error> {
    let (start_ms, end_ms) = (range.start_ms(), range.end_ms());

    let rows = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, title, description, start_ms, end_ms, created_ms, updated_ms
        FROM events
        WHERE (start_ms >= ?1 AND start_ms <= ?2)
           OR (end_ms >= ?1 AND end_ms <= ?2)
           OR (start_ms <= ?1 AND end_ms >= ?2)
        ORDER BY start_ms ASC, rowid ASC
        "#,
    )
    .bind(start_ms)
    .bind(end_ms)
    .fetch_all(pool)
    .await?;

    into_events(rows)
}

/// Replace the editable fields of an event. Returns None if it does not exist.
pub async fn update_event(
    pool: &SqlitePool,
    id: Uuid,
    input: &EventInput,
) -> Result<Option<Event>, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE events
        SET title = ?, description = ?, start_ms = ?, end_ms = ?, updated_ms = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.title)
    .bind(input.description.as_deref())
    .bind(input.start_date_time.timestamp_millis())
    .bind(input.end_date_time.map(|t| t.timestamp_millis()))
    .bind(current_epoch_ms())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get_event(pool, id).await
}

/// Delete an event. Returns true if a row was removed.
pub async fn delete_event(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM events WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
