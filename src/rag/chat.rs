//! Conversational retrieval over an index.
//!
//! Each turn condenses the follow-up question against the history into a standalone
//! question, retrieves context for it, and streams an answer from the model with the
//! context as system prompt. The exchange is appended to the history once the answer
//! stream has been fully consumed.

use super::backends::Backends;
use super::index::VectorIndex;
use super::{RagError, RagTokenStream, prompt};
use crate::generation::{ChatMessage, ChatRole, TokenStream};
use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Stateful chat bound to one index snapshot.
pub struct ChatEngine {
    index: Arc<VectorIndex>,
    history: Arc<Mutex<Vec<ChatMessage>>>,
    top_k: usize,
    history_limit: usize,
}

impl ChatEngine {
    /// Create an engine with empty history.
    pub fn new(index: Arc<VectorIndex>, top_k: usize, history_limit: usize) -> Self {
        Self {
            index,
            history: Arc::new(Mutex::new(Vec::new())),
            top_k,
            history_limit,
        }
    }

    /// Messages exchanged so far, oldest first.
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().await.clone()
    }

    /// Stream an answer to `question`, recording the turn when the stream completes.
    pub async fn stream_chat(
        &self,
        backends: &Backends,
        question: &str,
    ) -> Result<RagTokenStream, RagError> {
        let history = self.history().await;

        let standalone = if history.is_empty() {
            question.to_string()
        } else {
            let condensed = backends
                .llm()
                .complete(vec![ChatMessage::user(prompt::condense_question(
                    &history, question,
                ))])
                .await?;
            let condensed = condensed.trim();
            if condensed.is_empty() {
                question.to_string()
            } else {
                condensed.to_string()
            }
        };
        tracing::debug!(standalone = %standalone, turns = history.len() / 2, "Condensed question");

        let passages = backends.retrieve(&self.index, &standalone, self.top_k).await?;
        let context = prompt::build_context(&passages);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(prompt::chat_context_system(&context)));
        messages.extend(
            history
                .into_iter()
                .filter(|message| message.role != ChatRole::System),
        );
        messages.push(ChatMessage::user(question));

        let tokens = backends.llm().stream(messages).await?;
        Ok(Box::pin(record_turn(
            tokens,
            Arc::clone(&self.history),
            self.history_limit,
            question.to_string(),
        )))
    }
}

fn record_turn(
    mut tokens: TokenStream,
    history: Arc<Mutex<Vec<ChatMessage>>>,
    history_limit: usize,
    question: String,
) -> impl Stream<Item = Result<String, RagError>> + Send {
    try_stream! {
        let mut answer = String::new();
        while let Some(token) = tokens.next().await {
            let token = token?;
            answer.push_str(&token);
            yield token;
        }

        let mut history = history.lock().await;
        history.push(ChatMessage::user(question));
        history.push(ChatMessage::assistant(answer));
        if history.len() > history_limit {
            let excess = history.len() - history_limit;
            history.drain(..excess);
        }
    }
}
