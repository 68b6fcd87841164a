use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A calendar event as created on the remote calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub attendee: String,
    pub html_link: Option<String>,
    pub conference_link: Option<String>,
}
