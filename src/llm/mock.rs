//! Scripted chat backend for tests and offline runs

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatBackend, ChatRequest, ChatResponse};
use crate::error::{LlmError, LlmResult};

/// One scripted turn: a canned response or a failure
pub enum ScriptItem {
    Reply(ChatResponse),
    Fail,
}

/// A backend that replays a fixed script.
///
/// Each `chat` call pops the next item; `Fail` items produce a network
/// error (exercising the failover path), and an exhausted script returns a
/// plain acknowledgement.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<ScriptItem>>,
    fail_all: bool,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self::from_script(responses.into_iter().map(ScriptItem::Reply).collect())
    }

    pub fn from_script(script: Vec<ScriptItem>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fail_all: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A backend whose every call fails with a network error
    pub fn failing() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fail_all: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of chat calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Requests observed so far
    pub fn recorded_calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        self.calls.lock().unwrap().push(request);

        if self.fail_all {
            return Err(LlmError::Network("scripted failure".to_string()));
        }

        match self.script.lock().unwrap().pop_front() {
            Some(ScriptItem::Reply(response)) => Ok(response),
            Some(ScriptItem::Fail) => Err(LlmError::Network("scripted failure".to_string())),
            None => Ok(ChatResponse {
                content: "Understood.".to_string(),
                tool_calls: Vec::new(),
            }),
        }
    }
}
