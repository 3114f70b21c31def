//! Completion Service Boundary
//!
//! The dialogue engine only ever talks to a [`CompletionClient`]: one call that
//! returns the whole completion, and one that yields it as text fragments.
//! [`OpenAICompatibleClient`] implements it for any OpenAI-compatible chat API.

use crate::history::{Message, Role};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::{pin::Pin, time::Duration};

/// Failures reported by a completion service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    /// The service did not answer in time. Safe to re-issue the same call.
    #[error("completion service timed out")]
    Timeout,
    /// The service answered, but not in the shape we expected.
    #[error("unexpected completion response: {0}")]
    MalformedResponse(String),
    /// The service rejected the call or the transport failed.
    #[error("completion service error: {0}")]
    Service(String),
    /// The request could not be assembled.
    #[error("invalid completion request: {0}")]
    Request(String),
}

impl CompletionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CompletionError::Timeout)
    }
}

impl From<OpenAIError> for CompletionError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::Reqwest(e) if e.is_timeout() => CompletionError::Timeout,
            OpenAIError::JSONDeserialize(e) => CompletionError::MalformedResponse(e.to_string()),
            OpenAIError::InvalidArgument(msg) => CompletionError::Request(msg),
            OpenAIError::StreamError(msg) => stream_error(msg),
            other => CompletionError::Service(other.to_string()),
        }
    }
}

/// Classifies a streaming failure. The event source only hands over the
/// rendered error, so transport failures are recognised by their message and
/// count as timeouts.
fn stream_error(message: String) -> CompletionError {
    const TRANSPORT: [&str; 3] = [
        "error sending request",
        "error decoding response body",
        "timed out",
    ];
    if TRANSPORT.iter().any(|marker| message.contains(marker)) {
        CompletionError::Timeout
    } else if message.starts_with("Invalid header value") {
        CompletionError::MalformedResponse(message)
    } else {
        CompletionError::Service(message)
    }
}

/// One call to the completion service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A lazily produced completion, one text fragment at a time.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

/// A text-completion service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the whole completion for `request`.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;

    /// Opens an incremental completion for `request`.
    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, CompletionError>;
}

/// An implementation of `CompletionClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL of the service.
    /// * `model` - The chat model to use (e.g., "gpt-3.5-turbo").
    /// * `request_timeout` - Upper bound for a single HTTP exchange. Exceeding
    ///   it surfaces as [`CompletionError::Timeout`].
    pub fn new(
        config: OpenAIConfig,
        model: String,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client),
            model,
        })
    }

    fn build_request(
        &self,
        request: CompletionRequest,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, CompletionError> {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(request.messages.len() + 1);
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system_prompt)
                .build()?
                .into(),
        );
        for message in request.messages {
            let converted: ChatCompletionRequestMessage = match message.role() {
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content())
                    .build()?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content())
                    .build()?
                    .into(),
            };
            messages.push(converted);
        }

        #[allow(deprecated)]
        let built = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .stream(stream)
            .build()?;
        Ok(built)
    }
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let request = self.build_request(request, false)?;
        let response = self.client.chat().create(request).await?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| CompletionError::MalformedResponse("no choices".to_string()))?;
        choice
            .message
            .content
            .clone()
            .ok_or_else(|| CompletionError::MalformedResponse("no message content".to_string()))
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, CompletionError> {
        let request = self.build_request(request, true)?;
        let stream = self.client.chat().create_stream(request).await?;

        Ok(Box::pin(stream.filter_map(|result| async move {
            match result {
                Ok(response) => {
                    let content = response.choices.first()?.delta.content.clone()?;
                    if content.is_empty() {
                        None
                    } else {
                        Some(Ok(content))
                    }
                }
                Err(e) => Some(Err(CompletionError::from(e))),
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_error_display() {
        assert_eq!(
            CompletionError::Timeout.to_string(),
            "completion service timed out"
        );
        assert_eq!(
            CompletionError::MalformedResponse("no choices".into()).to_string(),
            "unexpected completion response: no choices"
        );
        assert!(CompletionError::Timeout.is_timeout());
        assert!(!CompletionError::Service("boom".into()).is_timeout());
    }

    #[test]
    fn test_invalid_argument_maps_to_request_error() {
        let err = CompletionError::from(OpenAIError::InvalidArgument("bad".into()));
        assert!(matches!(err, CompletionError::Request(msg) if msg == "bad"));
    }

    #[test]
    fn test_stream_transport_failures_are_timeouts() {
        let sending = OpenAIError::StreamError(
            "error sending request for url (http://127.0.0.1:9/v1/chat/completions)".into(),
        );
        assert!(CompletionError::from(sending).is_timeout());
        assert!(CompletionError::from(OpenAIError::StreamError("operation timed out".into())).is_timeout());

        let status = CompletionError::from(OpenAIError::StreamError(
            "Invalid status code: 401 Unauthorized".into(),
        ));
        assert!(matches!(status, CompletionError::Service(_)));
        let content_type = CompletionError::from(OpenAIError::StreamError(
            "Invalid header value: \"text/html\"".into(),
        ));
        assert!(matches!(content_type, CompletionError::MalformedResponse(_)));
    }

    /// A server that accepts connections and never answers.
    async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}/v1")
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "be brief".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.5,
            max_tokens: 10,
        }
    }

    #[tokio::test]
    async fn test_unanswered_requests_time_out_in_both_modes() {
        let client = OpenAICompatibleClient::new(
            OpenAIConfig::new()
                .with_api_key("test")
                .with_api_base(silent_server().await),
            "gpt-3.5-turbo".to_string(),
            Duration::from_millis(200),
        )
        .unwrap();

        let batch = client.complete(request()).await;
        assert!(matches!(batch, Err(CompletionError::Timeout)));

        let mut stream = client.complete_stream(request()).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap();
        assert!(matches!(first, Some(Err(CompletionError::Timeout))));
    }

    #[test]
    fn test_build_request_prepends_system_prompt() {
        let client = OpenAICompatibleClient::new(
            OpenAIConfig::new().with_api_key("test"),
            "gpt-3.5-turbo".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        let built = client
            .build_request(
                CompletionRequest {
                    system_prompt: "be brief".into(),
                    messages: vec![Message::user("hi"), Message::assistant("hello")],
                    temperature: 0.0,
                    max_tokens: 5,
                },
                true,
            )
            .unwrap();

        assert_eq!(built.model, "gpt-3.5-turbo");
        assert_eq!(built.messages.len(), 3);
        assert!(matches!(
            built.messages[0],
            ChatCompletionRequestMessage::System(_)
        ));
        assert!(matches!(
            built.messages[2],
            ChatCompletionRequestMessage::Assistant(_)
        ));
        assert_eq!(built.stream, Some(true));
        assert_eq!(built.temperature, Some(0.0));
    }
}
