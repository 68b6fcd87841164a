//! Language-model function dispatch.
//!
//! The model only decides: its reply is turned into an [`AgentDecision`]. The
//! [`Dispatcher`] executes the decision against the calendar, and the result
//! is handed back to the model to phrase the final answer.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::clients::openai_client::{OpenAIMessage, ToolSpec};
use crate::error::{AgentError, CalendarError};
use crate::service::calendar_service::CalendarService;
use crate::service::conversation::Conversation;
use crate::service::openai_service::OpenAIClient;

pub const LIST_SLOTS_TOOL: &str = "get_free_slots";
pub const CREATE_EVENT_TOOL: &str = "create_event";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentDecision {
    NoAction {
        reply: String,
    },
    ListSlots {
        date: NaiveDate,
    },
    CreateEvent {
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        email: String,
    },
}

#[derive(Deserialize)]
struct ListSlotsArgs {
    date: String,
}

#[derive(Deserialize)]
struct CreateEventArgs {
    start: String,
    end: String,
    email: String,
}

impl AgentDecision {
    /// Reads the model's choice. Only the first tool call is honoured.
    pub fn from_message(message: &OpenAIMessage) -> Result<Self, AgentError> {
        let Some(call) = message.first_tool_call() else {
            return match message.content.as_deref().map(str::trim) {
                Some(reply) if !reply.is_empty() => Ok(AgentDecision::NoAction {
                    reply: reply.to_string(),
                }),
                _ => Err(AgentError::EmptyReply),
            };
        };

        match call.function.name.as_str() {
            LIST_SLOTS_TOOL => {
                let args: ListSlotsArgs = parse_arguments(&call.function.arguments)?;
                let date = NaiveDate::parse_from_str(args.date.trim(), "%Y-%m-%d").map_err(|e| {
                    AgentError::InvalidToolCall(format!("date {:?}: {}", args.date, e))
                })?;
                Ok(AgentDecision::ListSlots { date })
            }
            CREATE_EVENT_TOOL => {
                let args: CreateEventArgs = parse_arguments(&call.function.arguments)?;
                let email = args.email.trim().to_string();
                if email.is_empty() {
                    return Err(AgentError::InvalidToolCall("email is empty".to_string()));
                }
                Ok(AgentDecision::CreateEvent {
                    start: parse_timestamp("start", &args.start)?,
                    end: parse_timestamp("end", &args.end)?,
                    email,
                })
            }
            other => Err(AgentError::InvalidToolCall(format!("unknown tool {}", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentDecision::NoAction { .. } => "no_action",
            AgentDecision::ListSlots { .. } => LIST_SLOTS_TOOL,
            AgentDecision::CreateEvent { .. } => CREATE_EVENT_TOOL,
        }
    }
}

fn parse_arguments<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T, AgentError> {
    serde_json::from_str(raw)
        .map_err(|e| AgentError::InvalidToolCall(format!("arguments {:?}: {}", raw, e)))
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<FixedOffset>, AgentError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|e| AgentError::InvalidToolCall(format!("{} {:?}: {}", field, raw, e)))
}

pub fn system_prompt(offset: &FixedOffset) -> String {
    format!(
        "You are an assistant that schedules meetings for the client automatically. \
         Use {list} to look up free slots for a date and {create} to book a meeting. \
         All times are in UTC{offset}.",
        list = LIST_SLOTS_TOOL,
        create = CREATE_EVENT_TOOL,
        offset = offset
    )
}

pub fn tool_specs(offset: &FixedOffset) -> Vec<ToolSpec> {
    let example_start = format!("2025-08-01T14:00:00{}", offset);
    let example_end = format!("2025-08-01T14:30:00{}", offset);
    vec![
        ToolSpec::function(
            LIST_SLOTS_TOOL,
            "List the free meeting slots on the given date",
            json!({
                "type": "object",
                "properties": {
                    "date": {"type": "string", "description": "Date in YYYY-MM-DD format"}
                },
                "required": ["date"]
            }),
        ),
        ToolSpec::function(
            CREATE_EVENT_TOOL,
            "Schedule a meeting in the calendar",
            json!({
                "type": "object",
                "properties": {
                    "start": {"type": "string", "description": format!("Meeting start in ISO format, e.g. {}", example_start)},
                    "end": {"type": "string", "description": format!("Meeting end in ISO format, e.g. {}", example_end)},
                    "email": {"type": "string", "description": "Email of the meeting attendee"}
                },
                "required": ["start", "end", "email"]
            }),
        ),
    ]
}

pub struct Dispatcher {
    calendar: Arc<CalendarService>,
}

impl Dispatcher {
    pub fn new(calendar: Arc<CalendarService>) -> Self {
        Self { calendar }
    }

    /// Runs a decision; `NoAction` has nothing to execute.
    pub async fn execute(&self, decision: &AgentDecision) -> Result<Option<Value>, CalendarError> {
        match decision {
            AgentDecision::NoAction { .. } => Ok(None),
            AgentDecision::ListSlots { date } => {
                let slots = self.calendar.free_slots(*date).await?;
                Ok(Some(json!({
                    "date": date.format("%Y-%m-%d").to_string(),
                    "slots": slots,
                })))
            }
            AgentDecision::CreateEvent { start, end, email } => {
                let record = self.calendar.create_event(*start, *end, email).await?;
                Ok(Some(json!(record)))
            }
        }
    }
}

pub struct Agent {
    model: Arc<dyn OpenAIClient>,
    dispatcher: Dispatcher,
    tools: Vec<ToolSpec>,
}

impl Agent {
    pub fn new(model: Arc<dyn OpenAIClient>, calendar: Arc<CalendarService>) -> Self {
        let tools = tool_specs(&calendar.policy().offset);
        Self {
            model,
            dispatcher: Dispatcher::new(calendar),
            tools,
        }
    }

    /// One user turn: decide, execute at most one tool, reply.
    pub async fn run(&self, conversation: &mut Conversation, text: &str) -> Result<String, AgentError> {
        let result = self.run_turn(conversation, text).await;
        conversation.trim();
        result
    }

    async fn run_turn(&self, conversation: &mut Conversation, text: &str) -> Result<String, AgentError> {
        conversation.push(OpenAIMessage::user(text));

        let reply = self.model.chat(&conversation.messages(), &self.tools).await?;
        let decision = AgentDecision::from_message(&reply)?;
        info!(decision = decision.name(), "model decision");

        if let AgentDecision::NoAction { reply: answer } = &decision {
            conversation.push(OpenAIMessage::assistant(answer));
            return Ok(answer.clone());
        }

        let call = reply
            .first_tool_call()
            .cloned()
            .ok_or_else(|| AgentError::InvalidToolCall("missing tool call".to_string()))?;
        let outcome = self.dispatcher.execute(&decision).await?.unwrap_or(Value::Null);
        debug!(tool = %call.function.name, result = %outcome, "tool executed");

        conversation.push(OpenAIMessage {
            role: "assistant".to_string(),
            content: reply.content.clone(),
            tool_calls: Some(vec![call.clone()]),
            tool_call_id: None,
        });
        conversation.push(OpenAIMessage::tool_result(&call.id, outcome.to_string()));

        let final_reply = self.model.chat(&conversation.messages(), &[]).await?;
        let answer = final_reply
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AgentError::EmptyReply)?;
        conversation.push(OpenAIMessage::assistant(&answer));
        Ok(answer)
    }
}
