//! Dialogue Engine
//!
//! Keeps the conversation history, decides through a gating ("filter") call
//! whether the assistant should answer an utterance at all, and produces the
//! answer either in one piece or as a stream of fragments.

use crate::{
    history::{ConversationHistory, Message, Role},
    llm_client::{CompletionClient, CompletionError, CompletionRequest, CompletionStream},
};
use futures::{Stream, StreamExt, stream};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tracing::{debug, info, warn};

/// How timed-out completion calls are re-issued.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Pause between a timeout and the next attempt.
    pub backoff: Duration,
    /// Total attempts per call, first one included. `None` keeps retrying for
    /// as long as the service keeps timing out.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(100),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Runs `call` until it succeeds, fails with something other than a
    /// timeout, or the attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, CompletionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CompletionError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match call().await {
                Err(CompletionError::Timeout)
                    if self.max_attempts.is_none_or(|max| attempt < max) =>
                {
                    warn!(call = label, attempt, "Completion call timed out, retrying");
                    tokio::time::sleep(self.backoff).await;
                    attempt = attempt.saturating_add(1);
                }
                outcome => return outcome,
            }
        }
    }
}

/// Fixed configuration of a [`DialogueEngine`].
#[derive(Debug, Clone)]
pub struct DialogueConfig {
    /// System prompt for generating replies.
    pub chat_prompt: String,
    /// Messages considered when generating a reply.
    pub chat_horizon: i64,
    /// Output token ceiling for a reply.
    pub chat_tokens: u32,
    pub temperature: f32,
    /// Yield replies as fragments instead of one string.
    pub stream: bool,
    /// System prompt for the gating call.
    pub filter_prompt: String,
    /// Messages considered by the gating call. Zero or less disables gating.
    pub filter_horizon: i64,
    /// Output token ceiling for the gating call.
    pub filter_tokens: u32,
    /// Case-insensitive substrings of the gating answer that mean "respond".
    pub filter_keys: Vec<String>,
    /// How the assistant is named when the transcript is shown to the gate.
    pub assistant_name: String,
    pub retry: RetryPolicy,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            chat_prompt: "You are a virtual assistant".to_string(),
            chat_horizon: 10,
            chat_tokens: 100,
            temperature: 0.5,
            stream: false,
            filter_prompt: "Who should respond to this? Reply with 'USER', 'ASSISTANT' or 'BOTH'"
                .to_string(),
            filter_horizon: 0,
            filter_tokens: 5,
            filter_keys: vec!["ASSISTANT".to_string(), "BOTH".to_string()],
            assistant_name: "assistant".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// A completion call that failed in a way that is not retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DialogueError {
    #[error("gating call failed: {0}")]
    Gating(CompletionError),
    #[error("generation call failed: {0}")]
    Generation(CompletionError),
}

impl DialogueError {
    pub fn completion_error(&self) -> &CompletionError {
        match self {
            DialogueError::Gating(e) | DialogueError::Generation(e) => e,
        }
    }

    /// The service answered with something we could not read.
    pub fn is_malformed_response(&self) -> bool {
        matches!(
            self.completion_error(),
            CompletionError::MalformedResponse(_)
        )
    }
}

/// The outcome of [`DialogueEngine::reply`].
///
/// Which variant is produced depends only on the engine's `stream` setting.
/// An empty `Immediate` or an empty `Streamed` sequence means the assistant
/// stays silent this turn.
pub enum Reply<'a> {
    Immediate(String),
    Streamed(ReplyStream<'a>),
}

impl Reply<'_> {
    /// Drains the reply into a single string.
    pub async fn into_text(self) -> String {
        match self {
            Reply::Immediate(text) => text,
            Reply::Streamed(stream) => stream.collect::<String>().await,
        }
    }
}

/// Fragments of a reply as the completion service produces them.
///
/// The concatenated text is recorded in the history once the sequence is
/// exhausted. Dropping the stream early records nothing. The stream holds the
/// engine's history mutably, so no other `reply` can start while it is alive.
pub struct ReplyStream<'a> {
    inner: Option<CompletionStream>,
    collected: String,
    history: &'a mut ConversationHistory,
}

impl<'a> ReplyStream<'a> {
    fn new(inner: CompletionStream, history: &'a mut ConversationHistory) -> Self {
        Self {
            inner: Some(inner),
            collected: String::new(),
            history,
        }
    }

    fn silent(history: &'a mut ConversationHistory) -> Self {
        Self {
            inner: None,
            collected: String::new(),
            history,
        }
    }

    fn record(&mut self) {
        self.inner = None;
        let text = std::mem::take(&mut self.collected);
        debug!(chars = text.chars().count(), "Streamed reply complete");
        self.history.push_assistant(text);
    }
}

impl Stream for ReplyStream<'_> {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(fragment))) => {
                this.collected.push_str(&fragment);
                Poll::Ready(Some(fragment))
            }
            Poll::Ready(Some(Err(e))) => {
                warn!(error = %e, "Reply stream interrupted");
                // Only what was actually handed out goes into the history.
                if this.collected.is_empty() {
                    this.inner = None;
                } else {
                    this.record();
                }
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                this.record();
                Poll::Ready(None)
            }
        }
    }
}

/// Opens a completion stream and waits for its first item, so a failure
/// before any text arrives is reported like a failed batch call.
async fn open_stream(
    client: &dyn CompletionClient,
    request: CompletionRequest,
) -> Result<CompletionStream, CompletionError> {
    let mut fragments = client.complete_stream(request).await?;
    match fragments.next().await {
        Some(Ok(first)) => Ok(Box::pin(stream::iter([Ok(first)]).chain(fragments))),
        Some(Err(e)) => Err(e),
        None => Ok(fragments),
    }
}

/// Drives one conversation against a completion service.
pub struct DialogueEngine {
    config: DialogueConfig,
    client: Arc<dyn CompletionClient>,
    history: ConversationHistory,
}

impl DialogueEngine {
    pub fn new(config: DialogueConfig, client: Arc<dyn CompletionClient>) -> Self {
        Self {
            config,
            client,
            history: ConversationHistory::new(),
        }
    }

    pub fn config(&self) -> &DialogueConfig {
        &self.config
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Records `utterance` and, if the gate lets it through, answers it.
    ///
    /// The user message is kept even when gating or generation fails.
    pub async fn reply(&mut self, utterance: &str) -> Result<Reply<'_>, DialogueError> {
        self.history.push_user(utterance);

        if !self.should_respond().await? {
            info!("Gate decided the assistant should stay silent");
            return Ok(if self.config.stream {
                Reply::Streamed(ReplyStream::silent(&mut self.history))
            } else {
                Reply::Immediate(String::new())
            });
        }

        let request = CompletionRequest {
            system_prompt: self.config.chat_prompt.clone(),
            messages: self.history.window(self.config.chat_horizon).to_vec(),
            temperature: self.config.temperature,
            max_tokens: self.config.chat_tokens,
        };
        let client = &self.client;

        if self.config.stream {
            let stream = self
                .config
                .retry
                .run("generation", || open_stream(client.as_ref(), request.clone()))
                .await
                .map_err(DialogueError::Generation)?;
            Ok(Reply::Streamed(ReplyStream::new(stream, &mut self.history)))
        } else {
            let text = self
                .config
                .retry
                .run("generation", || client.complete(request.clone()))
                .await
                .map_err(DialogueError::Generation)?;
            self.history.push_assistant(text.clone());
            Ok(Reply::Immediate(text))
        }
    }

    /// Asks the gate whether the latest utterance deserves an answer.
    async fn should_respond(&self) -> Result<bool, DialogueError> {
        if self.config.filter_horizon <= 0 {
            return Ok(true);
        }

        let transcript = self
            .history
            .window(self.config.filter_horizon)
            .iter()
            .map(|m| format!("{}: {}", self.speaker(m.role()), m.content()))
            .collect::<Vec<_>>()
            .join("\n");
        let request = CompletionRequest {
            system_prompt: self.config.filter_prompt.clone(),
            messages: vec![Message::user(transcript)],
            temperature: 0.0,
            max_tokens: self.config.filter_tokens,
        };
        let client = &self.client;

        let verdict = self
            .config
            .retry
            .run("gating", || client.complete(request.clone()))
            .await
            .map_err(DialogueError::Gating)?
            .to_uppercase();
        let respond = self
            .config
            .filter_keys
            .iter()
            .any(|key| verdict.contains(&key.to_uppercase()));
        debug!(%verdict, respond, "Gate answered");
        Ok(respond)
    }

    fn speaker(&self, role: Role) -> &str {
        match role {
            Role::User => "user",
            Role::Assistant => &self.config.assistant_name,
        }
    }
}
