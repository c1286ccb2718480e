use super::backends::Backends;
use super::chat::ChatEngine;
use super::index::VectorIndex;
use super::types::{Document, SourceInfo};
use super::{RagError, RagTokenStream, prompt};
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::generation::{ChatMessage, LlmClient};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

const DEFAULT_CHAT_HISTORY_LIMIT: usize = 20;

/// Builds the model clients the first time the service needs them.
pub type BackendFactory = Box<dyn Fn() -> Result<Backends, RagError> + Send + Sync>;

/// Retrieval tuning shared by every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RagSettings {
    /// Passages retrieved for questions and chat turns.
    pub similarity_top_k: usize,
    /// Passages retrieved when summarizing.
    pub summary_top_k: usize,
    /// Messages kept in the chat history (user and assistant turns both count).
    pub chat_history_limit: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            similarity_top_k: 3,
            summary_top_k: 2,
            chat_history_limit: DEFAULT_CHAT_HISTORY_LIMIT,
        }
    }
}

impl RagSettings {
    /// Settings taken from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            similarity_top_k: config.similarity_top_k,
            summary_top_k: config.summary_top_k,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct RagState {
    index: Option<Arc<VectorIndex>>,
    chat_engine: Option<Arc<ChatEngine>>,
    documents: Vec<String>,
}

/// Owns the index, the chat engine and the list of indexed document names.
///
/// Read operations work on `Arc` snapshots taken under a short read lock, so a slow model
/// call never blocks ingestion or reset. A reset while a request is in flight lets that
/// request finish against the snapshot it started with.
pub struct RagService {
    settings: RagSettings,
    factory: BackendFactory,
    backends: OnceCell<Arc<Backends>>,
    state: RwLock<RagState>,
}

impl RagService {
    /// Create a service whose backends are built lazily by `factory`.
    pub fn new(settings: RagSettings, factory: BackendFactory) -> Self {
        Self {
            settings,
            factory,
            backends: OnceCell::new(),
            state: RwLock::new(RagState::default()),
        }
    }

    /// Create a service using the providers selected by `config`.
    pub fn from_config(config: &Config) -> Self {
        let config = config.clone();
        Self::new(
            RagSettings::from_config(&config),
            Box::new(move || Backends::from_config(&config)),
        )
    }

    /// Create a service around already constructed clients, chunking with `cl100k_base`.
    pub fn with_clients(
        settings: RagSettings,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self::new(
            settings,
            Box::new(move || -> Result<Backends, RagError> {
                let splitter = super::Splitter::new(chunk_size, chunk_overlap)?;
                Ok(Backends::new(embedder.clone(), llm.clone(), splitter))
            }),
        )
    }

    async fn backends(&self) -> Result<Arc<Backends>, RagError> {
        self.backends
            .get_or_try_init(|| async {
                tracing::info!("Initializing RAG backends");
                (self.factory)().map(Arc::new)
            })
            .await
            .cloned()
    }

    /// Index a single text under `source_name`.
    pub async fn create_index_from_text(
        &self,
        text: &str,
        source_name: &str,
    ) -> Result<(), RagError> {
        self.create_index_from_documents(vec![Document::new(text, source_name)])
            .await
    }

    /// Index several documents at once, extending the current index if there is one.
    ///
    /// Names of documents that carry a source are appended to the indexed-document list in
    /// input order once their chunks are stored.
    pub async fn create_index_from_documents(
        &self,
        documents: Vec<Document>,
    ) -> Result<(), RagError> {
        let backends = self.backends().await?;
        let nodes = backends.build_nodes(&documents).await?;
        let node_count = nodes.len();

        let mut state = self.state.write().await;
        let mut index = state
            .index
            .as_deref()
            .cloned()
            .unwrap_or_default();
        index.insert(nodes)?;

        let index = Arc::new(index);
        state.chat_engine = Some(Arc::new(ChatEngine::new(
            Arc::clone(&index),
            self.settings.similarity_top_k,
            self.settings.chat_history_limit,
        )));
        state.index = Some(index);
        state
            .documents
            .extend(documents.into_iter().filter_map(|document| document.source));

        tracing::info!(
            nodes = node_count,
            documents = state.documents.len(),
            "Indexed documents"
        );
        Ok(())
    }

    /// Retrieve the passages most relevant to `question` without generating an answer.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SourceInfo>, RagError> {
        let index = self.index_snapshot().await?;
        let backends = self.backends().await?;
        let passages = backends
            .retrieve(&index, question, self.settings.similarity_top_k)
            .await?;
        Ok(passages
            .iter()
            .map(|passage| {
                SourceInfo::excerpt(passage.source.as_deref(), &passage.text, Some(passage.score))
            })
            .collect())
    }

    /// Answer `question` from the indexed documents.
    pub async fn query(&self, question: &str) -> Result<(String, Vec<SourceInfo>), RagError> {
        let index = self.index_snapshot().await?;
        let backends = self.backends().await?;
        let passages = backends
            .retrieve(&index, question, self.settings.similarity_top_k)
            .await?;

        let context = prompt::build_context(&passages);
        let answer = backends
            .llm()
            .complete(vec![ChatMessage::user(prompt::question_answer(
                &context, question,
            ))])
            .await?;

        let sources = passages
            .iter()
            .map(|passage| {
                SourceInfo::excerpt(passage.source.as_deref(), &passage.text, Some(passage.score))
            })
            .collect();
        Ok((answer, sources))
    }

    /// Stream an answer through the conversational engine, which remembers earlier turns.
    pub async fn stream_query(&self, question: &str) -> Result<RagTokenStream, RagError> {
        let chat_engine = {
            let state = self.state.read().await;
            state.chat_engine.clone().ok_or(RagError::NoDocuments)?
        };
        let backends = self.backends().await?;
        chat_engine.stream_chat(&backends, question).await
    }

    /// Summarize the indexed documents in roughly `max_length` words.
    pub async fn summarize(&self, max_length: usize) -> Result<String, RagError> {
        let index = self.index_snapshot().await?;
        let backends = self.backends().await?;
        let instruction = prompt::summary_instruction(max_length);
        let passages = backends
            .retrieve(&index, &instruction, self.settings.summary_top_k)
            .await?;

        let context = prompt::build_context(&passages);
        let summary = backends
            .llm()
            .complete(vec![ChatMessage::user(prompt::question_answer(
                &context,
                &instruction,
            ))])
            .await?;
        Ok(summary)
    }

    /// Drop the index, the chat history and the document list.
    pub async fn reset_index(&self) {
        let mut state = self.state.write().await;
        *state = RagState::default();
        tracing::info!("Index reset");
    }

    /// Names of the indexed documents, in ingestion order.
    pub async fn get_indexed_documents(&self) -> Vec<String> {
        self.state.read().await.documents.clone()
    }

    /// Whether an index exists.
    pub async fn has_documents(&self) -> bool {
        self.state.read().await.index.is_some()
    }

    async fn index_snapshot(&self) -> Result<Arc<VectorIndex>, RagError> {
        self.state
            .read()
            .await
            .index
            .clone()
            .ok_or(RagError::NoDocuments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use crate::generation::{GenerationError, TokenStream};
    use async_trait::async_trait;
    use futures_util::{StreamExt, stream};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with a fixed answer and records every prompt it receives.
    struct ScriptedLlm {
        answer: String,
        prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        fn new(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: answer.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<Vec<ChatMessage>> {
            self.prompts.lock().expect("prompts lock").clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
            self.prompts.lock().expect("prompts lock").push(messages);
            Ok(self.answer.clone())
        }

        async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TokenStream, GenerationError> {
            self.prompts.lock().expect("prompts lock").push(messages);
            let tokens: Vec<Result<String, GenerationError>> = self
                .answer
                .split_inclusive(' ')
                .map(|token| Ok(token.to_string()))
                .collect();
            Ok(Box::pin(stream::iter(tokens)))
        }
    }

    fn service(llm: Arc<ScriptedLlm>) -> RagService {
        RagService::with_clients(
            RagSettings::default(),
            Arc::new(HashEmbeddingClient::new(64)),
            llm,
            1024,
            20,
        )
    }

    #[tokio::test]
    async fn operations_require_documents() {
        let service = service(ScriptedLlm::new("unused"));
        assert!(!service.has_documents().await);
        assert!(matches!(
            service.query("anything").await,
            Err(RagError::NoDocuments)
        ));
        assert!(matches!(service.summarize(100).await, Err(RagError::NoDocuments)));
        assert!(matches!(
            service.stream_query("anything").await,
            Err(RagError::NoDocuments)
        ));
        assert_eq!(
            RagError::NoDocuments.to_string(),
            "No documents indexed. Please upload a document first."
        );
    }

    #[tokio::test]
    async fn query_returns_answer_and_sources() {
        let llm = ScriptedLlm::new("Blue.");
        let service = service(llm.clone());
        service
            .create_index_from_text("The sky is blue.", "doc1.pdf")
            .await
            .expect("index");

        let (answer, sources) = service.query("What color is the sky?").await.expect("query");
        assert_eq!(answer, "Blue.");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].file_name, "doc1.pdf");
        assert_eq!(sources[0].text, "The sky is blue.");
        assert!(sources[0].score.is_some());

        let prompts = llm.prompts();
        let prompt = &prompts[0][0].content;
        assert!(prompt.contains("The sky is blue."));
        assert!(prompt.contains("Query: What color is the sky?"));
    }

    #[tokio::test]
    async fn sources_are_capped_and_truncated() {
        let service = service(ScriptedLlm::new("ok"));
        let long = "word ".repeat(200);
        let documents = (0..5)
            .map(|n| Document::new(format!("{n} {long}"), format!("doc{n}.pdf")))
            .chain(std::iter::once(Document::anonymous("anonymous text")))
            .collect();
        service
            .create_index_from_documents(documents)
            .await
            .expect("index");

        let (_, sources) = service.query("word").await.expect("query");
        assert_eq!(sources.len(), 3);
        for source in &sources {
            assert!(source.text.chars().count() <= 300);
        }

        let (_, sources) = service.query("anonymous text").await.expect("query");
        assert!(sources.iter().any(|source| source.file_name == "Unknown"));
    }

    #[tokio::test]
    async fn documents_accumulate_in_order_and_reset_clears_them() {
        let service = service(ScriptedLlm::new("ok"));
        service
            .create_index_from_text("first", "a.pdf")
            .await
            .expect("index");
        service
            .create_index_from_documents(vec![
                Document::new("second", "b"),
                Document::anonymous("third"),
                Document::new("fourth", "c"),
            ])
            .await
            .expect("index");

        assert!(service.has_documents().await);
        assert_eq!(service.get_indexed_documents().await, vec!["a.pdf", "b", "c"]);

        service.reset_index().await;
        assert!(!service.has_documents().await);
        assert!(service.get_indexed_documents().await.is_empty());
        assert!(matches!(service.query("first").await, Err(RagError::NoDocuments)));
    }

    #[tokio::test]
    async fn empty_text_still_creates_an_index() {
        let service = service(ScriptedLlm::new("nothing"));
        service
            .create_index_from_text("", "blank.pdf")
            .await
            .expect("index");
        assert!(service.has_documents().await);

        let (answer, sources) = service.query("anything").await.expect("query");
        assert_eq!(answer, "nothing");
        assert!(sources.is_empty());
    }

    #[tokio::test]
    async fn summarize_uses_summary_instruction() {
        let llm = ScriptedLlm::new("A short summary.");
        let service = service(llm.clone());
        service
            .create_index_from_text("Rust is a systems language.", "rust.pdf")
            .await
            .expect("index");

        let summary = service.summarize(120).await.expect("summary");
        assert_eq!(summary, "A short summary.");
        let prompts = llm.prompts();
        assert!(prompts[0][0].content.contains("approximately 120 words"));
    }

    #[tokio::test]
    async fn stream_query_yields_tokens_and_records_history() {
        let llm = ScriptedLlm::new("The sky is blue.");
        let service = service(llm.clone());
        service
            .create_index_from_text("The sky is blue.", "doc1.pdf")
            .await
            .expect("index");

        let tokens: Vec<String> = service
            .stream_query("Color?")
            .await
            .expect("stream")
            .map(|token| token.expect("token"))
            .collect()
            .await;
        assert!(tokens.len() > 1);
        assert_eq!(tokens.concat(), "The sky is blue.");

        // Second turn condenses against the recorded history before answering.
        let _: Vec<_> = service
            .stream_query("Why?")
            .await
            .expect("stream")
            .collect()
            .await;
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1][0].content.contains("user: Color?"));
        let chat_turn = &prompts[2];
        assert_eq!(chat_turn[0].role, crate::generation::ChatRole::System);
        assert!(chat_turn[0].content.contains("The sky is blue."));
        assert_eq!(chat_turn.last().map(|m| m.content.as_str()), Some("Why?"));
        assert_eq!(chat_turn.len(), 4);
    }

    #[tokio::test]
    async fn backends_are_built_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let llm = ScriptedLlm::new("ok");
        let service = RagService::new(
            RagSettings::default(),
            Box::new(move || -> Result<Backends, RagError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Backends::new(
                    Arc::new(HashEmbeddingClient::new(16)),
                    llm.clone(),
                    crate::rag::Splitter::whitespace(64, 0)?,
                ))
            }),
        );

        service
            .create_index_from_text("one", "a")
            .await
            .expect("index");
        service.query("one").await.expect("query");
        service.summarize(10).await.expect("summary");
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_initialization_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let service = RagService::new(
            RagSettings::default(),
            Box::new(move || -> Result<Backends, RagError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RagError::Initialization("provider offline".into()))
            }),
        );

        let error = service
            .create_index_from_text("text", "a")
            .await
            .expect_err("init failure");
        assert!(matches!(error, RagError::Initialization(_)));
        assert!(service.create_index_from_text("text", "a").await.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(!service.has_documents().await);
        assert!(service.get_indexed_documents().await.is_empty());
    }
}
