use std::convert::Infallible;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::error;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::error::{AgentError, CalendarError};
use crate::service::agent::Agent;
use crate::service::conversation::ConversationStore;

/// Upper bound on request bodies; both payloads are a few short fields.
pub const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Debug, Deserialize)]
pub struct SlotsRequest {
    pub date: NaiveDate,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub email: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SlotsResponse {
    pub slots: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EventResponse {
    pub confirmation: String,
}

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<Agent>,
    pub conversations: Arc<Mutex<ConversationStore>>,
}

#[derive(Debug)]
pub struct ApiFailure(pub AgentError);

impl warp::reject::Reject for ApiFailure {}

pub fn slots_instruction(date: NaiveDate) -> String {
    format!("Show free slots for {}", date.format("%Y-%m-%d"))
}

pub fn booking_instruction(
    start: &DateTime<FixedOffset>,
    end: &DateTime<FixedOffset>,
    email: &str,
) -> String {
    format!(
        "Book a meeting from {} to {} with {}",
        start.to_rfc3339(),
        end.to_rfc3339(),
        email
    )
}

/// Runs one agent turn inside the caller's session, without holding the
/// store lock across model or calendar calls.
async fn converse(state: &ApiState, session_id: Option<&str>, text: &str) -> Result<String, AgentError> {
    let mut conversation = state.conversations.lock().await.checkout(session_id);
    let result = state.agent.run(&mut conversation, text).await;
    state.conversations.lock().await.checkin(session_id, conversation);
    result
}

pub async fn get_free_slots(state: &ApiState, body: SlotsRequest) -> Result<SlotsResponse, AgentError> {
    let slots = converse(state, body.session_id.as_deref(), &slots_instruction(body.date)).await?;
    Ok(SlotsResponse { slots })
}

pub async fn create_event(state: &ApiState, body: EventRequest) -> Result<EventResponse, AgentError> {
    let text = booking_instruction(&body.start, &body.end, &body.email);
    let confirmation = converse(state, body.session_id.as_deref(), &text).await?;
    Ok(EventResponse { confirmation })
}

async fn get_free_slots_handler(body: SlotsRequest, state: ApiState) -> Result<impl Reply, Rejection> {
    match get_free_slots(&state, body).await {
        Ok(response) => Ok(warp::reply::json(&response)),
        Err(err) => Err(warp::reject::custom(ApiFailure(err))),
    }
}

async fn create_event_handler(body: EventRequest, state: ApiState) -> Result<impl Reply, Rejection> {
    match create_event(&state, body).await {
        Ok(response) => Ok(warp::reply::json(&response)),
        Err(err) => Err(warp::reject::custom(ApiFailure(err))),
    }
}

pub fn status_for(err: &AgentError) -> StatusCode {
    match err {
        AgentError::Calendar(CalendarError::InvalidEventRange { .. }) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    if let Some(ApiFailure(err)) = rejection.find::<ApiFailure>() {
        error!(%err, "request failed");
        return Ok(warp::reply::with_status(err.to_string(), status_for(err)));
    }
    if rejection.is_not_found() {
        return Ok(warp::reply::with_status(
            "Not Found".to_string(),
            StatusCode::NOT_FOUND,
        ));
    }
    if let Some(err) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        return Ok(warp::reply::with_status(
            err.to_string(),
            StatusCode::BAD_REQUEST,
        ));
    }
    if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(warp::reply::with_status(
            "Payload Too Large".to_string(),
            StatusCode::PAYLOAD_TOO_LARGE,
        ));
    }
    if rejection.find::<warp::reject::LengthRequired>().is_some() {
        return Ok(warp::reply::with_status(
            "Length Required".to_string(),
            StatusCode::LENGTH_REQUIRED,
        ));
    }
    if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(warp::reply::with_status(
            "Method Not Allowed".to_string(),
            StatusCode::METHOD_NOT_ALLOWED,
        ));
    }
    Ok(warp::reply::with_status(
        "Bad Request".to_string(),
        StatusCode::BAD_REQUEST,
    ))
}

fn with_state(state: ApiState) -> impl Filter<Extract = (ApiState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// `POST /get_free_slots` and `POST /create_event`.
pub fn routes(state: ApiState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let slots = warp::path("get_free_slots")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(get_free_slots_handler);

    let event = warp::path("create_event")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(create_event_handler);

    slots.or(event).recover(handle_rejection)
}
