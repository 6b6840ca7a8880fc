//! Backend transport abstraction.
//!
//! The engine never talks to the network directly. A [`Transport`] delivers
//! one already-formed command string together with an idempotency token and
//! returns the raw JSON result text.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Delivers commands to the backend.
pub trait Transport: Send + Sync {
    /// Execute `command`, returning the raw JSON result.
    ///
    /// Implementations report delivery problems and backend-side failures as
    /// [`Error::Transport`].
    fn execute(&self, command: &str, idempotency_token: &str) -> Result<String>;
}

/// Scripted reply for a command.
#[derive(Debug, Clone)]
enum Reply {
    Ok(String),
    Fail(String),
}

#[derive(Debug, Default)]
struct MockState {
    replies: BTreeMap<String, VecDeque<Reply>>,
    commands: Vec<String>,
    tokens: Vec<String>,
}

/// In-memory transport for tests.
///
/// Replies are queued per exact command text. The last queued reply for a
/// command is sticky: it is returned again once the queue is drained.
/// Commands with no scripted reply get `{}`. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a mock with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response for `command`.
    pub fn respond(&self, command: &str, response: &str) {
        self.push(command, Reply::Ok(response.to_string()));
    }

    /// Queue a transport failure for `command`.
    pub fn fail(&self, command: &str, message: &str) {
        self.push(command, Reply::Fail(message.to_string()));
    }

    fn push(&self, command: &str, reply: Reply) {
        let mut state = self.state.lock().unwrap();
        state
            .replies
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Commands executed so far, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Idempotency tokens received so far, in order.
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().tokens.clone()
    }
}

impl Transport for MockTransport {
    fn execute(&self, command: &str, idempotency_token: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.to_string());
        state.tokens.push(idempotency_token.to_string());

        let reply = match state.replies.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match reply {
            Some(Reply::Ok(response)) => Ok(response),
            Some(Reply::Fail(message)) => Err(Error::transport(message)),
            None => Ok("{}".to_string()),
        }
    }
}
