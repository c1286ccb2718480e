//! Prompt templates for question answering, summaries and conversational retrieval.

use super::index::RetrievedPassage;
use super::types::UNKNOWN_SOURCE;
use crate::generation::{ChatMessage, ChatRole};

/// Render retrieved passages as a context block, each tagged with its source.
pub fn build_context(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(|passage| {
            format!(
                "source: {}\n\n{}",
                passage.source.as_deref().unwrap_or(UNKNOWN_SOURCE),
                passage.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Single-shot question answering prompt grounded in `context`.
pub fn question_answer(context: &str, question: &str) -> String {
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {question}\n\
         Answer: "
    )
}

/// Summary instruction; `max_length` is advisory.
pub fn summary_instruction(max_length: usize) -> String {
    format!(
        "Provide a comprehensive summary of all the documents in approximately {max_length} words. \
         Focus on the main ideas, key points, and important details."
    )
}

/// Ask the model to rewrite a follow-up question so it stands on its own.
pub fn condense_question(history: &[ChatMessage], question: &str) -> String {
    let transcript = history
        .iter()
        .map(|message| {
            let speaker = match message.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
                ChatRole::System => "system",
            };
            format!("{speaker}: {}", message.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Given the following conversation between a user and an AI assistant and a follow up \
         question from user, rephrase the follow up question to be a standalone question.\n\n\
         Chat History:\n\
         {transcript}\n\
         Follow Up Input: {question}\n\
         Standalone question:"
    )
}

/// System prompt carrying retrieved context for the chat engine.
pub fn chat_context_system(context: &str) -> String {
    format!(
        "The following is a friendly conversation between a user and an AI assistant.\n\
         The assistant is talkative and provides lots of specific details from its context.\n\
         If the assistant does not know the answer to a question, it truthfully says it does not know.\n\n\
         Here are the relevant documents for the context:\n\n\
         {context}\n\n\
         Instruction: Based on the above documents, provide a detailed answer for the user question below.\n\
         Answer \"don't know\" if not present in the document."
    )
}
