//! Core chat session management.
//!
//! The [`Orchestrator`] owns the conversation and is the only thing that
//! mutates it.  Requests run as separate tasks and report back through a
//! channel of [`FlowEvent`]s; [`ChatSession`] wires the two together and
//! drives a [`Renderer`] from the same events.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::backend::ChatBackend;
use crate::chat::commands::{Submission, parse_submission};
use crate::chat::config::ChatConfig;
use crate::chat::conversation::{Conversation, MessageId};
use crate::error::{Error, Result};
use crate::render::Renderer;
use crate::types::{ChatMessage, ImageResult};

/// Assistant message appended when an image generation fails and failures
/// are surfaced.
pub const IMAGE_FAILURE_NOTICE: &str = "Não foi possível gerar a imagem. Tente novamente.";

/// What a failed image generation leaves in the conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageFailurePolicy {
    /// Append an assistant message saying the generation failed.
    #[default]
    Surface,

    /// Append nothing; the user's command stays without a reply.
    Drop,
}

/// The request currently in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Busy {
    /// A text reply is streaming.
    Streaming,

    /// An image is being generated for this prompt.
    GeneratingImage(String),
}

/// The request a submission started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Stream a reply to the whole conversation so far.
    StreamText {
        /// Every message, in order, ending with the new user message.
        history: Vec<ChatMessage>,
    },

    /// Generate an image.
    GenerateImage {
        /// The prompt, without the command token.
        prompt: String,
    },
}

/// A report from a request task to the orchestrator.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// A fragment of the streamed reply.
    Token(String),

    /// The reply finished normally.
    StreamClosed,

    /// The reply could not start or broke off.
    StreamFailed(Error),

    /// The image is ready.
    ImageReady {
        /// The prompt the image was generated for.
        prompt: String,
        /// The image.
        image: ImageResult,
    },

    /// The image could not be generated.
    ImageFailed {
        /// The prompt the image was requested for.
        prompt: String,
        /// Why.
        error: Error,
    },
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// The number of messages in the conversation.
    pub message_count: usize,
    /// Text replies requested.
    pub text_turns: u64,
    /// Text replies that failed or broke off.
    pub stream_failures: u64,
    /// Images generated.
    pub images_generated: u64,
    /// Image generations that failed.
    pub image_failures: u64,
}

/// Single owner of the conversation.
#[derive(Debug)]
pub struct Orchestrator {
    conversation: Conversation,
    busy: Option<Busy>,
    streaming: Option<MessageId>,
    policy: ImageFailurePolicy,
    stats: SessionStats,
}

impl Orchestrator {
    pub fn new(policy: ImageFailurePolicy) -> Self {
        Self {
            conversation: Conversation::new(),
            busy: None,
            streaming: None,
            policy,
            stats: SessionStats::default(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn busy(&self) -> Option<&Busy> {
        self.busy.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    pub fn policy(&self) -> ImageFailurePolicy {
        self.policy
    }

    /// Accept user input.
    ///
    /// Returns the request to start, `None` when the input is ignored, or a
    /// busy error while another request is in flight.
    pub fn submit(&mut self, input: &str) -> Result<Option<Action>> {
        let Some(submission) = parse_submission(input) else {
            return Ok(None);
        };
        if self.is_busy() {
            return Err(Error::busy("wait for the current reply to finish"));
        }
        match submission {
            Submission::Text(request) => {
                self.conversation.push_user(request.input);
                self.busy = Some(Busy::Streaming);
                self.stats.text_turns += 1;
                Ok(Some(Action::StreamText {
                    history: self.conversation.history(),
                }))
            }
            Submission::Image(command) => {
                self.conversation.push_user(command.input);
                self.busy = Some(Busy::GeneratingImage(command.prompt.clone()));
                Ok(Some(Action::GenerateImage {
                    prompt: command.prompt,
                }))
            }
        }
    }

    /// Fold one flow event into the conversation.
    ///
    /// Returns the message the event created or extended, if any.  Events
    /// that do not belong to the request in flight are ignored.
    pub fn apply(&mut self, event: FlowEvent) -> Option<MessageId> {
        let busy = self.busy.clone();
        match (event, busy) {
            (FlowEvent::Token(text), Some(Busy::Streaming)) => match self.streaming {
                Some(id) => match self.conversation.append(id, &text) {
                    Ok(()) => Some(id),
                    Err(err) => {
                        tracing::warn!(error = %err, "dropping token");
                        None
                    }
                },
                None => {
                    let id = self.conversation.push_assistant(text);
                    self.streaming = Some(id);
                    Some(id)
                }
            },
            (FlowEvent::StreamClosed, Some(Busy::Streaming)) => {
                self.busy = None;
                self.streaming.take()
            }
            (FlowEvent::StreamFailed(error), Some(Busy::Streaming)) => {
                tracing::warn!(error = %error, "text reply failed");
                self.stats.stream_failures += 1;
                self.busy = None;
                self.streaming.take()
            }
            (FlowEvent::ImageReady { prompt, image }, Some(Busy::GeneratingImage(_))) => {
                self.busy = None;
                self.stats.images_generated += 1;
                Some(
                    self.conversation
                        .push_assistant(image_markdown(&prompt, &image)),
                )
            }
            (FlowEvent::ImageFailed { prompt, error }, Some(Busy::GeneratingImage(_))) => {
                tracing::error!(error = %error, prompt_len = prompt.len(), "image generation failed");
                self.busy = None;
                self.stats.image_failures += 1;
                match self.policy {
                    ImageFailurePolicy::Surface => {
                        Some(self.conversation.push_assistant(IMAGE_FAILURE_NOTICE))
                    }
                    ImageFailurePolicy::Drop => None,
                }
            }
            (event, busy) => {
                tracing::warn!(?busy, event = event_name(&event), "ignoring stale flow event");
                None
            }
        }
    }

    /// The event standing in for a request task that went away without
    /// reporting its outcome.
    fn abandoned(&self) -> Option<FlowEvent> {
        let error = Error::streaming("request task ended without a result", None);
        match &self.busy {
            Some(Busy::Streaming) => Some(FlowEvent::StreamFailed(error)),
            Some(Busy::GeneratingImage(prompt)) => Some(FlowEvent::ImageFailed {
                prompt: prompt.clone(),
                error,
            }),
            None => None,
        }
    }

    /// Clears the conversation history.  Ignored while busy.
    pub fn clear(&mut self) -> bool {
        if self.is_busy() {
            return false;
        }
        self.conversation.clear();
        true
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            message_count: self.conversation.len(),
            ..self.stats.clone()
        }
    }
}

/// The assistant message for a generated image.  Brackets and backslashes in
/// the prompt are escaped so the alt text cannot end the image early.
fn image_markdown(prompt: &str, image: &ImageResult) -> String {
    let mut alt = String::with_capacity(prompt.len());
    for c in prompt.chars() {
        if matches!(c, '[' | ']' | '\\') {
            alt.push('\\');
        }
        alt.push(c);
    }
    format!("![Gerada: {alt}]({})", image.data_uri())
}

fn event_name(event: &FlowEvent) -> &'static str {
    match event {
        FlowEvent::Token(_) => "token",
        FlowEvent::StreamClosed => "stream_closed",
        FlowEvent::StreamFailed(_) => "stream_failed",
        FlowEvent::ImageReady { .. } => "image_ready",
        FlowEvent::ImageFailed { .. } => "image_failed",
    }
}

/// A chat session: an orchestrator, a backend, and the tasks between them.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    orchestrator: Orchestrator,
}

impl ChatSession {
    /// Creates a new chat session with the given backend and configuration.
    pub fn new<B: ChatBackend + 'static>(backend: B, config: &ChatConfig) -> Self {
        Self::with_backend(Arc::new(backend), config.image_failure_policy)
    }

    /// Creates a new chat session over a shared backend.
    pub fn with_backend(backend: Arc<dyn ChatBackend>, policy: ImageFailurePolicy) -> Self {
        Self {
            backend,
            orchestrator: Orchestrator::new(policy),
        }
    }

    /// Submits user input and renders the outcome.
    ///
    /// This method:
    /// 1. Classifies the input and records the user message
    /// 2. Starts the text or image request on its own task
    /// 3. Renders and applies flow events until the request settles
    ///
    /// Request failures are rendered and recorded per the session's policy;
    /// only a rejected submission is returned as an error.
    pub async fn send(&mut self, input: &str, renderer: &mut dyn Renderer) -> Result<()> {
        let Some(action) = self.orchestrator.submit(input)? else {
            return Ok(());
        };
        let (tx, rx) = mpsc::unbounded_channel();
        match action {
            Action::StreamText { history } => {
                tokio::spawn(text_flow(Arc::clone(&self.backend), history, tx));
            }
            Action::GenerateImage { prompt } => {
                renderer.start_generating(&prompt);
                tokio::spawn(image_flow(Arc::clone(&self.backend), prompt, tx));
            }
        }
        self.drive(rx, renderer).await;
        Ok(())
    }

    async fn drive(&mut self, mut rx: UnboundedReceiver<FlowEvent>, renderer: &mut dyn Renderer) {
        while self.orchestrator.is_busy() {
            let event = match rx.recv().await {
                Some(event) => event,
                None => match self.orchestrator.abandoned() {
                    Some(event) => event,
                    None => break,
                },
            };
            render_event(&event, self.orchestrator.policy(), renderer);
            self.orchestrator.apply(event);
        }
    }

    /// Clears the conversation history.
    pub fn clear(&mut self) {
        self.orchestrator.clear();
    }

    /// Returns the conversation.
    pub fn conversation(&self) -> &Conversation {
        self.orchestrator.conversation()
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.orchestrator.conversation().len()
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        self.orchestrator.stats()
    }
}

fn render_event(event: &FlowEvent, policy: ImageFailurePolicy, renderer: &mut dyn Renderer) {
    match event {
        FlowEvent::Token(text) => renderer.print_text(text),
        FlowEvent::StreamClosed => renderer.finish_response(),
        FlowEvent::StreamFailed(error) => {
            renderer.finish_response();
            renderer.print_error(&error.to_string());
        }
        FlowEvent::ImageReady { prompt, image } => {
            renderer.finish_generating();
            renderer.print_image(prompt, image);
        }
        FlowEvent::ImageFailed { error, .. } => {
            renderer.finish_generating();
            renderer.print_error(&error.to_string());
            if policy == ImageFailurePolicy::Surface {
                renderer.print_text(IMAGE_FAILURE_NOTICE);
                renderer.finish_response();
            }
        }
    }
}

async fn text_flow(
    backend: Arc<dyn ChatBackend>,
    history: Vec<ChatMessage>,
    tx: UnboundedSender<FlowEvent>,
) {
    let mut tokens = match backend.stream_chat(history).await {
        Ok(tokens) => tokens,
        Err(err) => {
            let _ = tx.send(FlowEvent::StreamFailed(err));
            return;
        }
    };
    while let Some(token) = tokens.next().await {
        let event = match token {
            Ok(text) => FlowEvent::Token(text),
            Err(err) => {
                let _ = tx.send(FlowEvent::StreamFailed(err));
                return;
            }
        };
        if tx.send(event).is_err() {
            return;
        }
    }
    let _ = tx.send(FlowEvent::StreamClosed);
}

async fn image_flow(backend: Arc<dyn ChatBackend>, prompt: String, tx: UnboundedSender<FlowEvent>) {
    let event = match backend.generate_image(&prompt).await {
        Ok(image) => FlowEvent::ImageReady { prompt, image },
        Err(error) => FlowEvent::ImageFailed { prompt, error },
    };
    let _ = tx.send(event);
}
