//! Google Calendar gateway (`freeBusy` and `events.insert`).

use std::collections::HashMap;
use std::sync::Arc;

use ::google_calendar::Client;
use ::google_calendar::types::{
    ConferenceData, ConferenceSolutionKey, CreateConferenceRequest, Event, EventAttendee,
    EventDateTime, FreeBusyRequest, FreeBusyRequestItem, SendUpdates,
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clients::google_auth::{REDIRECT_URI, TokenStore};
use crate::config::GoogleSettings;
use crate::error::CalendarError;
use crate::models::event::EventRecord;
use crate::models::interval::Interval;
use crate::service::calendar_service::{CalendarGateway, ensure_event_range};

const MEET_SOLUTION: &str = "hangoutsMeet";

// `google_calendar::types::FreeBusyResponse` holds one calendar instead of
// the map keyed by calendar id that the API returns, so replies are read here.
#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, CalendarBusy>,
}

#[derive(Debug, Deserialize)]
struct CalendarBusy {
    #[serde(default)]
    busy: Vec<BusyPeriod>,
    #[serde(default)]
    errors: Vec<FreeBusyError>,
}

#[derive(Debug, Deserialize)]
struct BusyPeriod {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyError {
    #[serde(default)]
    domain: String,
    #[serde(default)]
    reason: String,
}

pub struct GoogleCalendarClient {
    settings: GoogleSettings,
    tokens: Arc<TokenStore>,
    http: reqwest::Client,
}

impl GoogleCalendarClient {
    pub fn new(settings: GoogleSettings, tokens: Arc<TokenStore>) -> Self {
        Self {
            settings,
            tokens,
            http: reqwest::Client::new(),
        }
    }

    /// API client carrying the current bearer token.
    async fn api(&self) -> Result<Client, CalendarError> {
        let bearer = self.tokens.access_token().await?;
        let mut client = Client::new("", "", REDIRECT_URI, bearer, "");
        client.with_host_override(&self.settings.api_base);
        Ok(client)
    }

    fn free_busy_request(
        &self,
        window_start: DateTime<FixedOffset>,
        window_end: DateTime<FixedOffset>,
    ) -> FreeBusyRequest {
        FreeBusyRequest {
            calendar_expansion_max: 0,
            group_expansion_max: 0,
            items: vec![FreeBusyRequestItem {
                id: self.settings.calendar_id.clone(),
            }],
            time_min: Some(window_start.with_timezone(&Utc)),
            time_max: Some(window_end.with_timezone(&Utc)),
            time_zone: String::new(),
        }
    }
}

/// Event body asking Google to attach a new Meet conference.
fn meeting_event(
    summary: &str,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    attendee_email: &str,
    request_id: Uuid,
) -> Event {
    let at = |instant: DateTime<FixedOffset>| EventDateTime {
        date: None,
        date_time: Some(instant.with_timezone(&Utc)),
        time_zone: String::new(),
    };

    Event {
        summary: summary.to_string(),
        start: Some(at(start)),
        end: Some(at(end)),
        attendees: vec![EventAttendee {
            additional_guests: 0,
            comment: String::new(),
            display_name: String::new(),
            email: attendee_email.to_string(),
            id: String::new(),
            optional: false,
            organizer: false,
            resource: false,
            response_status: String::new(),
            self_: false,
        }],
        conference_data: Some(ConferenceData {
            conference_id: String::new(),
            conference_solution: None,
            create_request: Some(CreateConferenceRequest {
                conference_solution_key: Some(ConferenceSolutionKey {
                    type_: MEET_SOLUTION.to_string(),
                }),
                request_id: format!("meet-{}", request_id),
                status: None,
            }),
            entry_points: Vec::new(),
            notes: String::new(),
            parameters: None,
            signature: String::new(),
        }),
        ..Default::default()
    }
}

/// `hangoutLink` is the Meet URL; some accounts only report it as a video entry point.
fn conference_link(event: &Event) -> Option<String> {
    if !event.hangout_link.is_empty() {
        return Some(event.hangout_link.clone());
    }
    event
        .conference_data
        .as_ref()?
        .entry_points
        .iter()
        .find(|entry| entry.entry_point_type == "video" && !entry.uri.is_empty())
        .map(|entry| entry.uri.clone())
}

#[async_trait]
impl CalendarGateway for GoogleCalendarClient {
    async fn fetch_busy_intervals(
        &self,
        day: NaiveDate,
        window_start: DateTime<FixedOffset>,
        window_end: DateTime<FixedOffset>,
    ) -> Result<Vec<Interval>, CalendarError> {
        let request = self.free_busy_request(window_start, window_end);
        let token = self.tokens.access_token().await?;

        debug!(%day, calendar = %self.settings.calendar_id, "querying free/busy");
        let response = self
            .http
            .post(format!("{}/freeBusy", self.settings.api_base))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        match status {
            s if s.is_success() => parse_busy_intervals(&text, &self.settings.calendar_id),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(CalendarError::AuthenticationFailed(format!(
                    "Calendar API returned {}: {}",
                    status, text
                )))
            }
            _ => Err(CalendarError::GatewayUnavailable(format!(
                "Calendar API returned {}: {}",
                status, text
            ))),
        }
    }

    async fn create_event(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        attendee_email: &str,
    ) -> Result<EventRecord, CalendarError> {
        ensure_event_range(&start, &end)?;

        let event = meeting_event(
            &self.settings.event_summary,
            start,
            end,
            attendee_email,
            Uuid::new_v4(),
        );
        let client = self.api().await?;
        let inserted = client
            .events()
            .insert(&self.settings.calendar_id, 1, 0, false, SendUpdates::All, false, &event)
            .await?
            .body;
        debug!(id = %inserted.id, "event created");

        Ok(EventRecord {
            conference_link: conference_link(&inserted),
            html_link: Some(inserted.html_link).filter(|link| !link.is_empty()),
            id: inserted.id,
            start,
            end,
            attendee: attendee_email.to_string(),
        })
    }
}

fn parse_busy_intervals(body: &str, calendar_id: &str) -> Result<Vec<Interval>, CalendarError> {
    let parsed: FreeBusyResponse = serde_json::from_str(body).map_err(|e| {
        CalendarError::GatewayUnavailable(format!("Failed to parse free/busy response: {}", e))
    })?;

    let Some(calendar) = parsed.calendars.get(calendar_id) else {
        return Err(CalendarError::GatewayUnavailable(format!(
            "Free/busy response has no entry for calendar {}",
            calendar_id
        )));
    };

    if let Some(err) = calendar.errors.first() {
        return Err(CalendarError::GatewayUnavailable(format!(
            "Free/busy lookup for {} failed: {} ({})",
            calendar_id, err.reason, err.domain
        )));
    }

    let mut intervals = Vec::with_capacity(calendar.busy.len());
    for period in &calendar.busy {
        match Interval::new(period.start, period.end) {
            Ok(interval) => intervals.push(interval),
            Err(err) => warn!(%err, "skipping empty busy period"),
        }
    }
    Ok(intervals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::google_auth::{DEFAULT_TOKEN_URI, StoredToken, save_token_file};
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const BEARER: &str = "ya29.test";

    fn settings(api_base: &str, calendar_id: &str) -> GoogleSettings {
        GoogleSettings {
            api_base: api_base.to_string(),
            calendar_id: calendar_id.to_string(),
            event_summary: "Meeting with lead".to_string(),
            credentials_file: PathBuf::from("credentials.json"),
            token_file: PathBuf::from("token.json"),
        }
    }

    /// Client against `api_base` with a valid token cached in a temp dir.
    fn client(dir: &TempDir, api_base: &str) -> GoogleCalendarClient {
        let path = dir.path().join("token.json");
        save_token_file(
            &path,
            &StoredToken {
                token: BEARER.to_string(),
                refresh_token: None,
                token_uri: DEFAULT_TOKEN_URI.to_string(),
                client_id: String::new(),
                client_secret: String::new(),
                scopes: Vec::new(),
                expiry: Some(Utc::now() + chrono::Duration::hours(1)),
            },
        )
        .unwrap();
        let tokens = Arc::new(TokenStore::new(path, dir.path().join("credentials.json")));
        GoogleCalendarClient::new(settings(api_base, "primary"), tokens)
    }

    fn at(raw: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(raw).unwrap()
    }

    #[test]
    fn parses_busy_periods_for_the_calendar() {
        let body = r#"{
            "kind": "calendar#freeBusy",
            "timeMin": "2025-08-02T06:00:00.000Z",
            "timeMax": "2025-08-02T15:00:00.000Z",
            "calendars": {
                "primary": {
                    "busy": [
                        {"start": "2025-08-02T07:00:00Z", "end": "2025-08-02T08:00:00Z"},
                        {"start": "2025-08-02T12:30:00+03:00", "end": "2025-08-02T13:00:00+03:00"}
                    ]
                }
            }
        }"#;
        let busy = parse_busy_intervals(body, "primary").unwrap();
        assert_eq!(busy.len(), 2);
        assert_eq!(busy[0].start().to_rfc3339(), "2025-08-02T07:00:00+00:00");
        assert_eq!(busy[1].end().to_rfc3339(), "2025-08-02T13:00:00+03:00");
    }

    #[test]
    fn typed_free_busy_reply_loses_the_calendar_map() {
        let body = r#"{"calendars":{"primary":{"busy":[{"start":"2025-08-02T07:00:00Z","end":"2025-08-02T08:00:00Z"}]}}}"#;
        let typed: ::google_calendar::types::FreeBusyResponse = serde_json::from_str(body).unwrap();
        let typed_busy = typed.calendars.map(|c| c.busy.len()).unwrap_or(0);
        assert_eq!(typed_busy, 0);
        assert_eq!(parse_busy_intervals(body, "primary").unwrap().len(), 1);
    }

    #[test]
    fn calendar_errors_are_gateway_failures() {
        let body = r#"{"calendars":{"primary":{"errors":[{"domain":"global","reason":"notFound"}],"busy":[]}}}"#;
        let err = parse_busy_intervals(body, "primary").unwrap_err();
        assert!(matches!(err, CalendarError::GatewayUnavailable(msg) if msg.contains("notFound")));
    }

    #[test]
    fn missing_calendar_entry_is_a_gateway_failure() {
        let body = r#"{"calendars":{}}"#;
        assert!(parse_busy_intervals(body, "primary").is_err());
    }

    #[test]
    fn event_body_requests_a_meet_conference() {
        let request_id = Uuid::new_v4();
        let event = meeting_event(
            "Meeting with lead",
            at("2025-08-02T14:00:00+03:00"),
            at("2025-08-02T14:30:00+03:00"),
            "lead@example.com",
            request_id,
        );
        let body = serde_json::to_value(&event).unwrap();
        assert_eq!(body["start"]["dateTime"], "2025-08-02T11:00:00.000Z");
        assert_eq!(body["end"]["dateTime"], "2025-08-02T11:30:00.000Z");
        assert_eq!(body["attendees"][0]["email"], "lead@example.com");
        let create = &body["conferenceData"]["createRequest"];
        assert_eq!(create["conferenceSolutionKey"]["type"], "hangoutsMeet");
        assert_eq!(create["requestId"], format!("meet-{}", request_id));
    }

    #[test]
    fn conference_link_falls_back_to_video_entry_point() {
        let mut event: Event = serde_json::from_value(json!({
            "id": "evt1",
            "conferenceData": {
                "entryPoints": [
                    {"entryPointType": "phone", "uri": "tel:+1-555-0100"},
                    {"entryPointType": "video", "uri": "https://meet.google.com/abc-defg-hij"}
                ]
            }
        }))
        .unwrap();
        assert_eq!(
            conference_link(&event).as_deref(),
            Some("https://meet.google.com/abc-defg-hij")
        );
        event.hangout_link = "https://meet.google.com/xyz-abcd-efg".to_string();
        assert_eq!(
            conference_link(&event).as_deref(),
            Some("https://meet.google.com/xyz-abcd-efg")
        );
    }

    #[test]
    fn client_errors_map_by_status() {
        let http_error = |status: StatusCode| ::google_calendar::ClientError::HttpError {
            status,
            headers: reqwest::header::HeaderMap::new(),
            error: "{}".to_string(),
        };
        assert!(matches!(
            CalendarError::from(http_error(StatusCode::UNAUTHORIZED)),
            CalendarError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            CalendarError::from(http_error(StatusCode::FORBIDDEN)),
            CalendarError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            CalendarError::from(http_error(StatusCode::SERVICE_UNAVAILABLE)),
            CalendarError::GatewayUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn free_busy_sends_the_window_and_reads_the_reply() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/freeBusy")
            .match_header("authorization", format!("Bearer {}", BEARER).as_str())
            .match_body(Matcher::PartialJson(json!({
                "timeMin": "2025-08-02T06:00:00.000Z",
                "timeMax": "2025-08-02T15:00:00.000Z",
                "items": [{"id": "primary"}]
            })))
            .with_status(200)
            .with_body(r#"{"calendars":{"primary":{"busy":[{"start":"2025-08-02T07:00:00Z","end":"2025-08-02T08:00:00Z"}]}}}"#)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        let busy = client(&dir, &server.url())
            .fetch_busy_intervals(
                NaiveDate::from_ymd_opt(2025, 8, 2).unwrap(),
                at("2025-08-02T09:00:00+03:00"),
                at("2025-08-02T18:00:00+03:00"),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].start().to_rfc3339(), "2025-08-02T07:00:00+00:00");
    }

    #[tokio::test]
    async fn unavailable_free_busy_is_a_gateway_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/freeBusy")
            .with_status(503)
            .with_body("backend unavailable")
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        let err = client(&dir, &server.url())
            .fetch_busy_intervals(
                NaiveDate::from_ymd_opt(2025, 8, 2).unwrap(),
                at("2025-08-02T09:00:00+03:00"),
                at("2025-08-02T18:00:00+03:00"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CalendarError::GatewayUnavailable(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn rejected_free_busy_token_is_an_authentication_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/freeBusy")
            .with_status(401)
            .with_body(r#"{"error":{"code":401,"status":"UNAUTHENTICATED"}}"#)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        let err = client(&dir, &server.url())
            .fetch_busy_intervals(
                NaiveDate::from_ymd_opt(2025, 8, 2).unwrap(),
                at("2025-08-02T09:00:00+03:00"),
                at("2025-08-02T18:00:00+03:00"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CalendarError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn created_event_carries_links() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/calendars/primary/events")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("conferenceDataVersion".into(), "1".into()),
                Matcher::UrlEncoded("sendUpdates".into(), "all".into()),
            ]))
            .match_header("authorization", format!("Bearer {}", BEARER).as_str())
            .match_body(Matcher::PartialJson(json!({
                "summary": "Meeting with lead",
                "conferenceData": {"createRequest": {"conferenceSolutionKey": {"type": "hangoutsMeet"}}}
            })))
            .with_status(200)
            .with_body(r#"{"id":"evt1","htmlLink":"https://calendar.google.com/event?eid=1","hangoutLink":"https://meet.google.com/abc-defg-hij"}"#)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        let record = client(&dir, &server.url())
            .create_event(
                at("2025-08-02T14:00:00+03:00"),
                at("2025-08-02T14:30:00+03:00"),
                "lead@example.com",
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(record.id, "evt1");
        assert_eq!(record.attendee, "lead@example.com");
        assert_eq!(
            record.html_link.as_deref(),
            Some("https://calendar.google.com/event?eid=1")
        );
        assert_eq!(
            record.conference_link.as_deref(),
            Some("https://meet.google.com/abc-defg-hij")
        );
    }

    #[tokio::test]
    async fn rejected_insert_token_is_an_authentication_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", Matcher::Regex(r"^/calendars/primary/events".to_string()))
            .with_status(401)
            .with_body(r#"{"error":{"code":401,"status":"UNAUTHENTICATED"}}"#)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        let err = client(&dir, &server.url())
            .create_event(
                at("2025-08-02T14:00:00+03:00"),
                at("2025-08-02T14:30:00+03:00"),
                "lead@example.com",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CalendarError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn unavailable_insert_is_a_gateway_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", Matcher::Regex(r"^/calendars/primary/events".to_string()))
            .with_status(503)
            .with_body("backend unavailable")
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();

        // The client's transport retries 503 a few times with backoff first
        let err = client(&dir, &server.url())
            .create_event(
                at("2025-08-02T14:00:00+03:00"),
                at("2025-08-02T14:30:00+03:00"),
                "lead@example.com",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CalendarError::GatewayUnavailable(_)));
    }

    #[tokio::test]
    async fn reversed_range_fails_before_any_request() {
        let dir = TempDir::new().unwrap();
        let err = client(&dir, "http://127.0.0.1:9")
            .create_event(
                at("2025-08-02T14:30:00+03:00"),
                at("2025-08-02T14:00:00+03:00"),
                "lead@example.com",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::InvalidEventRange { .. }));
    }
}
