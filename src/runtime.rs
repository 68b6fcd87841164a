use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Mutex;
use tracing::info;

use crate::clients::google_auth::TokenStore;
use crate::clients::google_calendar::GoogleCalendarClient;
use crate::config::Settings;
use crate::handlers::http::{self, ApiState};
use crate::service::agent::{Agent, system_prompt};
use crate::service::calendar_service::CalendarService;
use crate::service::conversation::ConversationStore;
use crate::service::openai_service::OpenAIService;

pub fn build_calendar(settings: &Settings) -> Arc<CalendarService> {
    let tokens = Arc::new(TokenStore::new(
        settings.google.token_file.clone(),
        settings.google.credentials_file.clone(),
    ));
    let gateway = Arc::new(GoogleCalendarClient::new(settings.google.clone(), tokens));
    Arc::new(CalendarService::new(gateway, settings.scheduling))
}

pub fn build_agent(settings: &Settings, calendar: Arc<CalendarService>) -> anyhow::Result<Agent> {
    let openai = OpenAIService::from_settings(&settings.openai)?;
    Ok(Agent::new(Arc::new(openai), calendar))
}

pub fn conversation_store(settings: &Settings) -> ConversationStore {
    ConversationStore::new(
        system_prompt(&settings.scheduling.offset),
        settings.history_limit,
        settings.max_sessions,
    )
}

pub async fn run_api(settings: Settings) -> anyhow::Result<()> {
    let calendar = build_calendar(&settings);
    let agent = build_agent(&settings, calendar).context("Cannot start the API")?;

    let state = ApiState {
        agent: Arc::new(agent),
        conversations: Arc::new(Mutex::new(conversation_store(&settings))),
    };

    info!(addr = %settings.bind_addr, "serving calendar API");
    warp::serve(http::routes(state)).run(settings.bind_addr).await;
    Ok(())
}
