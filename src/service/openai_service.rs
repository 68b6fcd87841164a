use async_trait::async_trait;

use crate::clients::openai_client::{self, OpenAIMessage, ToolSpec};
use crate::config::OpenAISettings;
use crate::error::{AgentError, ConfigError};

#[async_trait]
pub trait OpenAIClient: Send + Sync {
    /// One chat-completions round trip; `tools` may be empty.
    async fn chat(
        &self,
        messages: &[OpenAIMessage],
        tools: &[ToolSpec],
    ) -> Result<OpenAIMessage, AgentError>;
}

pub struct OpenAIService {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAIService {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            model,
            base_url,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_settings(settings: &OpenAISettings) -> Result<Self, ConfigError> {
        Ok(Self::new(
            settings.require_api_key()?,
            settings.model.clone(),
            settings.base_url.clone(),
        ))
    }
}

#[async_trait]
impl OpenAIClient for OpenAIService {
    async fn chat(
        &self,
        messages: &[OpenAIMessage],
        tools: &[ToolSpec],
    ) -> Result<OpenAIMessage, AgentError> {
        openai_client::query_openai(
            &self.http,
            &self.base_url,
            &self.api_key,
            &self.model,
            messages,
            tools,
        )
        .await
    }
}
