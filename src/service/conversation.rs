//! Per-session chat history with a bounded length.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::clients::openai_client::OpenAIMessage;

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    system: OpenAIMessage,
    history: VecDeque<OpenAIMessage>,
    limit: usize,
}

impl Conversation {
    pub fn new(system_prompt: &str, limit: usize) -> Self {
        Self {
            system: OpenAIMessage::system(system_prompt),
            history: VecDeque::new(),
            limit,
        }
    }

    pub fn push(&mut self, message: OpenAIMessage) {
        self.history.push_back(message);
    }

    /// System message followed by the retained history.
    pub fn messages(&self) -> Vec<OpenAIMessage> {
        std::iter::once(self.system.clone())
            .chain(self.history.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Drops the oldest turns until at most `limit` messages remain. The
    /// history always restarts at a user message so tool results never lose
    /// the call they answer.
    pub fn trim(&mut self) {
        while self.history.len() > self.limit {
            self.history.pop_front();
        }
        while self
            .history
            .front()
            .is_some_and(|message| message.role != "user")
        {
            self.history.pop_front();
        }
    }
}

pub struct ConversationStore {
    system_prompt: String,
    history_limit: usize,
    max_sessions: usize,
    sessions: HashMap<String, (Conversation, u64)>,
    clock: u64,
}

impl ConversationStore {
    pub fn new(system_prompt: String, history_limit: usize, max_sessions: usize) -> Self {
        Self {
            system_prompt,
            history_limit,
            max_sessions,
            sessions: HashMap::new(),
            clock: 0,
        }
    }

    pub fn fresh(&self) -> Conversation {
        Conversation::new(&self.system_prompt, self.history_limit)
    }

    /// A copy of the session's conversation, or a fresh one.
    pub fn checkout(&mut self, session_id: Option<&str>) -> Conversation {
        let Some(id) = session_id else {
            return self.fresh();
        };
        self.clock += 1;
        let now = self.clock;
        match self.sessions.get_mut(id) {
            Some((conversation, last_used)) => {
                *last_used = now;
                conversation.clone()
            }
            None => self.fresh(),
        }
    }

    /// Stores the conversation back; anonymous conversations are discarded.
    pub fn checkin(&mut self, session_id: Option<&str>, conversation: Conversation) {
        let Some(id) = session_id else {
            return;
        };
        self.clock += 1;
        self.sessions.insert(id.to_string(), (conversation, self.clock));

        while self.sessions.len() > self.max_sessions {
            let Some(oldest) = self
                .sessions
                .iter()
                .min_by_key(|(_, (_, last_used))| *last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            debug!(session = %oldest, "evicting least recently used conversation");
            self.sessions.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }
}
