use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{EventInput, EventPayload, MonthQuery};
use crate::range::MonthRange;

pub const TITLE_MIN_CHARS: usize = 2;
pub const TITLE_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

/// Years accepted by the monthly listing endpoint.
pub const MIN_YEAR: i32 = 2000;
pub const MAX_YEAR: i32 = 2100;

/// Validator for incoming event data and query parameters.
pub struct Validator;

impl Validator {
    /// Validate a create/update payload, collecting every field error.
    pub fn validate_event(payload: &EventPayload) -> Result<EventInput, Vec<String>> {
        let mut errors = Vec::new();

        let title = match payload.title.as_deref().map(str::trim) {
            None | Some("") => {
                errors.push("Title is required".to_string());
                None
            }
            Some(t) if t.chars().any(char::is_control) => {
                errors.push("Title must not contain control characters".to_string());
                None
            }
            Some(t) if t.chars().count() < TITLE_MIN_CHARS => {
                errors.push(format!(
                    "Title must be at least {} characters",
                    TITLE_MIN_CHARS
                ));
                None
            }
            Some(t) if t.chars().count() > TITLE_MAX_CHARS => {
                errors.push(format!(
                    "Title must be {} characters or fewer",
                    TITLE_MAX_CHARS
                ));
                None
            }
            Some(t) => Some(t.to_string()),
        };

        let description = payload
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        if let Some(d) = description {
            if d.chars().any(is_disallowed_in_text) {
                errors.push("Description must not contain control characters".to_string());
            } else if d.chars().count() > DESCRIPTION_MAX_CHARS {
                errors.push(format!(
                    "Description must be {} characters or fewer",
                    DESCRIPTION_MAX_CHARS
                ));
            }
        }

        let start = match payload.start_date_time.as_deref().map(str::trim) {
            None | Some("") => {
                errors.push("Start date/time is required".to_string());
                None
            }
            Some(s) => {
                let parsed = parse_date_time(s);
                if parsed.is_none() {
                    errors.push("Start date/time has an invalid format".to_string());
                }
                parsed
            }
        };

        let end = match payload.end_date_time.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => {
                let parsed = parse_date_time(s);
                match (start, parsed) {
                    (_, None) => errors.push("End date/time has an invalid format".to_string()),
                    (Some(start), Some(end)) if end <= start => {
                        errors.push("End date/time must be after start date/time".to_string())
                    }
                    _ => {}
                }
                parsed
            }
        };

        match (title, start) {
            (Some(title), Some(start_date_time)) if errors.is_empty() => Ok(EventInput {
                title,
                description: description.map(str::to_string),
                start_date_time,
                end_date_time: end,
            }),
            _ => Err(errors),
        }
    }

    /// Read an event payload from a JSON body.
    ///
    /// Fields must be strings or null; a field of any other type is reported
    /// as a field error rather than rejecting the whole body.
    pub fn payload_from_json(body: &Value) -> Result<EventPayload, Vec<String>> {
        let Some(fields) = body.as_object() else {
            return Err(vec!["Request body must be a JSON object".to_string()]);
        };

        let mut errors = Vec::new();
        let mut text_field = |key: &str, label: &str| match fields.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                errors.push(format!("{} must be a string", label));
                None
            }
        };

        let payload = EventPayload {
            title: text_field("title", "Title"),
            description: text_field("description", "Description"),
            start_date_time: text_field("startDateTime", "Start date/time"),
            end_date_time: text_field("endDateTime", "End date/time"),
        };

        if errors.is_empty() {
            Ok(payload)
        } else {
            Err(errors)
        }
    }

    /// Parse an event id path segment.
    pub fn parse_id(id: &str) -> Result<Uuid, ApiError> {
        Uuid::parse_str(id).map_err(|_| ApiError::BadRequest("Invalid ID format".to_string()))
    }

    /// Resolve the optional month filter of the list endpoint.
    ///
    /// Neither parameter means "no filter"; supplying only one is an error.
    pub fn month_range(query: &MonthQuery) -> Result<Option<MonthRange>, ApiError> {
        let month = query.month.as_deref().filter(|s| !s.trim().is_empty());
        let year = query.year.as_deref().filter(|s| !s.trim().is_empty());

        match (month, year) {
            (None, None) => Ok(None),
            (Some(month), Some(year)) => {
                let range = MonthRange::parse(month, year)?;
                Self::validate_year(range.start.year())?;
                Ok(Some(range))
            }
            _ => Err(ApiError::BadRequest(
                "Month and year must be provided together".to_string(),
            )),
        }
    }

    pub fn validate_year(year: i32) -> Result<(), ApiError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(ApiError::BadRequest(format!(
                "Year must be between {} and {}",
                MIN_YEAR, MAX_YEAR
            )));
        }
        Ok(())
    }
}

/// Line breaks and tabs are fine in a description; other control characters
/// are not (SQLite's `length()` stops at NUL).
fn is_disallowed_in_text(c: char) -> bool {
    c.is_control() && !matches!(c, '\n' | '\r' | '\t')
}

/// Parse a timestamp as sent by clients.
///
/// Accepts RFC 3339 with an offset, or a naive date-time / date which is read as UTC.
pub fn parse_date_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn payload(title: &str, start: &str, end: Option<&str>) -> EventPayload {
        EventPayload {
            title: Some(title.to_string()),
            description: None,
            start_date_time: Some(start.to_string()),
            end_date_time: end.map(str::to_string),
        }
    }

    #[test]
    fn test_valid_event() {
        let input = Validator::validate_event(&EventPayload {
            title: Some("  Team sync ".to_string()),
            description: Some("Weekly".to_string()),
            start_date_time: Some("2024-01-15T10:00:00Z".to_string()),
            end_date_time: Some("2024-01-15T12:00:00+01:00".to_string()),
        })
        .unwrap();

        assert_eq!(input.title, "Team sync");
        assert_eq!(input.description.as_deref(), Some("Weekly"));
        assert_eq!(
            input.start_date_time,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
        );
        assert_eq!(
            input.end_date_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_end_must_be_after_start() {
        // 11:00+01:00 is 10:00Z, equal to the start
        let errors = Validator::validate_event(&payload(
            "Equal",
            "2024-01-15T10:00:00Z",
            Some("2024-01-15T11:00:00+01:00"),
        ))
        .unwrap_err();
        assert_eq!(errors, vec!["End date/time must be after start date/time"]);

        let errors = Validator::validate_event(&payload(
            "Backwards",
            "2024-01-15T10:00:00Z",
            Some("2024-01-14T10:00:00Z"),
        ))
        .unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_end_is_optional() {
        let input =
            Validator::validate_event(&payload("Reminder", "2024-01-15T10:00:00Z", None)).unwrap();
        assert!(input.end_date_time.is_none());

        let input =
            Validator::validate_event(&payload("Reminder", "2024-01-15T10:00:00Z", Some("")))
                .unwrap();
        assert!(input.end_date_time.is_none());
    }

    #[test]
    fn test_title_rules() {
        let missing = Validator::validate_event(&EventPayload {
            start_date_time: Some("2024-01-15".to_string()),
            ..EventPayload::default()
        })
        .unwrap_err();
        assert_eq!(missing, vec!["Title is required"]);

        let short = Validator::validate_event(&payload(" a ", "2024-01-15", None)).unwrap_err();
        assert_eq!(short, vec!["Title must be at least 2 characters"]);

        assert!(Validator::validate_event(&payload(&"a".repeat(100), "2024-01-15", None)).is_ok());
        let long =
            Validator::validate_event(&payload(&"a".repeat(101), "2024-01-15", None)).unwrap_err();
        assert_eq!(long, vec!["Title must be 100 characters or fewer"]);

        // Characters, not bytes
        assert!(Validator::validate_event(&payload(&"일".repeat(100), "2024-01-15", None)).is_ok());
    }

    #[test]
    fn test_description_limit() {
        let mut p = payload("Notes", "2024-01-15", None);
        p.description = Some("d".repeat(500));
        assert!(Validator::validate_event(&p).is_ok());

        p.description = Some("d".repeat(501));
        assert_eq!(
            Validator::validate_event(&p).unwrap_err(),
            vec!["Description must be 500 characters or fewer"]
        );

        p.description = Some("   ".to_string());
        assert_eq!(Validator::validate_event(&p).unwrap().description, None);
    }

    #[test]
    fn test_control_characters_rejected() {
        let errors =
            Validator::validate_event(&payload("a\u{0}bc", "2024-01-15", None)).unwrap_err();
        assert_eq!(errors, vec!["Title must not contain control characters"]);

        let errors =
            Validator::validate_event(&payload("Tab\there", "2024-01-15", None)).unwrap_err();
        assert_eq!(errors, vec!["Title must not contain control characters"]);

        let mut p = payload("Notes", "2024-01-15", None);
        p.description = Some("first\u{0}second".to_string());
        assert_eq!(
            Validator::validate_event(&p).unwrap_err(),
            vec!["Description must not contain control characters"]
        );

        p.description = Some("line one\nline two\twith tab".to_string());
        assert!(Validator::validate_event(&p).is_ok());
    }

    #[test]
    fn test_payload_from_json() {
        let payload = Validator::payload_from_json(&serde_json::json!({
            "title": "Lunch",
            "description": null,
            "startDateTime": "2024-01-15T12:00:00Z",
            "unknown": 42
        }))
        .unwrap();
        assert_eq!(payload.title.as_deref(), Some("Lunch"));
        assert!(payload.description.is_none());
        assert_eq!(payload.start_date_time.as_deref(), Some("2024-01-15T12:00:00Z"));
        assert!(payload.end_date_time.is_none());

        let errors = Validator::payload_from_json(&serde_json::json!({
            "title": 123,
            "startDateTime": ["2024-01-15"]
        }))
        .unwrap_err();
        assert_eq!(
            errors,
            vec!["Title must be a string", "Start date/time must be a string"]
        );

        let errors = Validator::payload_from_json(&serde_json::json!([1, 2])).unwrap_err();
        assert_eq!(errors, vec!["Request body must be a JSON object"]);
    }

    #[test]
    fn test_collects_all_errors() {
        let errors = Validator::validate_event(&EventPayload {
            title: None,
            description: Some("x".repeat(600)),
            start_date_time: Some("not a date".to_string()),
            end_date_time: Some("also not a date".to_string()),
        })
        .unwrap_err();

        assert_eq!(
            errors,
            vec![
                "Title is required",
                "Description must be 500 characters or fewer",
                "Start date/time has an invalid format",
                "End date/time has an invalid format",
            ]
        );
    }

    #[test]
    fn test_parse_date_time_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap();
        assert_eq!(parse_date_time("2024-03-05T14:30:00Z"), Some(expected));
        assert_eq!(parse_date_time("2024-03-05T16:30:00+02:00"), Some(expected));
        assert_eq!(parse_date_time("2024-03-05T14:30:00.000"), Some(expected));
        assert_eq!(parse_date_time("2024-03-05T14:30"), Some(expected));
        assert_eq!(parse_date_time("2024-03-05 14:30:00"), Some(expected));
        assert_eq!(
            parse_date_time("2024-03-05"),
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date_time("2024-02-30"), None);
        assert_eq!(parse_date_time("yesterday"), None);
    }

    #[test]
    fn test_parse_id() {
        assert!(Validator::parse_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(matches!(
            Validator::parse_id("64b7f0c2a1b2c3d4e5f60718"),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_month_range_query() {
        let none = MonthQuery::default();
        assert!(Validator::month_range(&none).unwrap().is_none());

        let empty = MonthQuery {
            month: Some(String::new()),
            year: Some(String::new()),
        };
        assert!(Validator::month_range(&empty).unwrap().is_none());

        let both = MonthQuery {
            month: Some("1".to_string()),
            year: Some("2024".to_string()),
        };
        assert_eq!(
            Validator::month_range(&both).unwrap(),
            Some(MonthRange::resolve(1, 2024).unwrap())
        );

        let only_month = MonthQuery {
            month: Some("1".to_string()),
            year: None,
        };
        assert!(matches!(
            Validator::month_range(&only_month),
            Err(ApiError::BadRequest(_))
        ));

        let bad_month = MonthQuery {
            month: Some("13".to_string()),
            year: Some("2024".to_string()),
        };
        assert!(matches!(
            Validator::month_range(&bad_month),
            Err(ApiError::InvalidRange(_))
        ));

        let old_year = MonthQuery {
            month: Some("1".to_string()),
            year: Some("1999".to_string()),
        };
        assert!(matches!(
            Validator::month_range(&old_year),
            Err(ApiError::BadRequest(_))
        ));
    }
}
