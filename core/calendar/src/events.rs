//! Calendar event creation.

use std::sync::Arc;

use chrono::NaiveDateTime;
use reqwest::header;
use serde::Deserialize;
use tracing::info;

use gworks_auth::Connection;
use gworks_common::http::{decode_json, encode_path_segment};
use gworks_common::{Error, Result};

/// Google Calendar API base URL.
const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Time zone applied when the caller does not pick one.
pub const DEFAULT_TIME_ZONE: &str = "Europe/Brussels";

/// Wire format for event timestamps.
const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// An event to insert.
#[derive(Debug, Clone)]
pub struct EventDraft {
    /// Event title.
    pub summary: String,
    /// Event body text.
    pub description: String,
    /// Human-readable location, if any.
    pub location: Option<String>,
    /// Event start, interpreted in `time_zone`.
    pub start: NaiveDateTime,
    /// Event end, interpreted in `time_zone`.
    pub end: NaiveDateTime,
    /// IANA time zone the start and end times are expressed in.
    pub time_zone: String,
}

impl EventDraft {
    /// Create a draft with the default time zone and no location.
    pub fn new(
        summary: impl Into<String>,
        description: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Self {
        Self {
            summary: summary.into(),
            description: description.into(),
            location: None,
            start,
            end,
            time_zone: DEFAULT_TIME_ZONE.to_string(),
        }
    }

    /// Attach a location name.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Override the time zone.
    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self
    }

    /// Serialize to the Calendar v3 event shape.
    fn to_payload(&self) -> serde_json::Value {
        let mut event = serde_json::json!({
            "summary": self.summary,
            "description": self.description,
            "start": {
                "dateTime": self.start.format(EVENT_TIME_FORMAT).to_string(),
                "timeZone": self.time_zone,
            },
            "end": {
                "dateTime": self.end.format(EVENT_TIME_FORMAT).to_string(),
                "timeZone": self.time_zone,
            },
        });
        if let Some(location) = &self.location {
            event["location"] = serde_json::json!(location);
        }
        event
    }
}

/// A created event as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event ID.
    pub id: String,
    /// Provider status (`confirmed`, `tentative`, ...).
    #[serde(default)]
    pub status: Option<String>,
    /// Browser link to the event.
    #[serde(default)]
    pub html_link: Option<String>,
    /// Echoed title.
    #[serde(default)]
    pub summary: Option<String>,
}

/// Google Calendar facade.
pub struct Calendar {
    conn: Arc<Connection>,
    base_url: String,
}

impl Calendar {
    /// Create a facade on a shared connection.
    pub fn new(conn: Arc<Connection>) -> Self {
        Self {
            conn,
            base_url: CALENDAR_API_BASE.to_string(),
        }
    }

    /// Create a facade pointed at a non-default endpoint (tests, staging).
    pub fn with_base_url(conn: Arc<Connection>, base_url: impl Into<String>) -> Self {
        Self {
            conn,
            base_url: base_url.into(),
        }
    }

    /// Insert an event into a calendar.
    ///
    /// `calendar_id` is the target calendar address (for example
    /// `primary` or `team@group.calendar.google.com`).
    pub async fn insert_event(&self, calendar_id: &str, draft: &EventDraft) -> Result<Event> {
        if calendar_id.is_empty() {
            return Err(Error::InvalidInput("Calendar id cannot be empty".to_string()));
        }

        info!("Inserting event '{}' into calendar {}", draft.summary, calendar_id);

        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            encode_path_segment(calendar_id)
        );
        let token = self.conn.bearer_token().await?;

        let response = self
            .conn
            .http()
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&draft.to_payload())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to insert event: {}", e)))?;

        decode_json(response).await
    }
}
