use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
const DEFAULT_CHUNK_SIZE: usize = 1024;
const DEFAULT_CHUNK_OVERLAP: usize = 20;
const DEFAULT_SIMILARITY_TOP_K: usize = 3;
const DEFAULT_SUMMARY_TOP_K: usize = 2;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the DocSense server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Text-generation backend answering questions and writing summaries.
    pub llm_provider: LlmProvider,
    /// Credential for the hosted generation backend. Absent only for Ollama.
    pub llm_api_key: Option<String>,
    /// Model identifier passed to the generation backend.
    pub llm_model: String,
    /// Optional base URL override for the generation backend.
    pub llm_base_url: Option<String>,
    /// Embedding backend used to vectorize chunks and questions.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Optional base URL override for the embedding backend.
    pub embedding_base_url: Option<String>,
    /// Credential for hosted embedding backends.
    pub embedding_api_key: Option<String>,
    /// Base URL of the local Ollama runtime.
    pub ollama_url: String,
    /// Interface the HTTP server binds to.
    pub host: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Directory receiving uploaded files.
    pub upload_dir: PathBuf,
    /// Largest accepted upload, in bytes.
    pub max_file_size: usize,
    /// Token budget for each indexed chunk.
    pub chunk_size: usize,
    /// Tokens shared between adjacent chunks.
    pub chunk_overlap: usize,
    /// Number of passages retrieved for question answering.
    pub similarity_top_k: usize,
    /// Number of passages retrieved for summaries.
    pub summary_top_k: usize,
}

/// Supported text-generation backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Google Gemini (`generateContent`).
    Gemini,
    /// Groq's OpenAI-compatible chat completions API.
    Groq,
    /// Local Ollama runtime.
    Ollama,
}

/// Supported embedding backends for the indexing pipeline.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Deterministic byte-hashing embedder that needs no external service.
    Hash,
}

impl LlmProvider {
    /// Model used when `LLM_MODEL` is not set.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.5-flash",
            Self::Groq => "llama-3.1-8b-instant",
            Self::Ollama => "llama3.1",
        }
    }

    /// Provider-specific variable consulted when `LLM_API_KEY` is absent.
    fn api_key_variable(self) -> Option<&'static str> {
        match self {
            Self::Gemini => Some("GOOGLE_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::Ollama => None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm_provider = load_env_optional("LLM_PROVIDER")
            .map(|value| {
                value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("LLM_PROVIDER".into()))
            })
            .transpose()?
            .unwrap_or(LlmProvider::Gemini);

        let llm_api_key = load_env_optional("LLM_API_KEY").or_else(|| {
            llm_provider
                .api_key_variable()
                .and_then(load_env_optional)
        });
        if llm_api_key.is_none() {
            if let Some(variable) = llm_provider.api_key_variable() {
                return Err(ConfigError::MissingVariable(format!(
                    "LLM_API_KEY (or {variable})"
                )));
            }
        }

        let embedding_provider = load_env_optional("EMBEDDING_PROVIDER")
            .map(|value| {
                value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
            })
            .transpose()?
            .unwrap_or(EmbeddingProvider::Ollama);

        Ok(Self {
            llm_provider,
            llm_api_key,
            llm_model: load_env_optional("LLM_MODEL")
                .unwrap_or_else(|| llm_provider.default_model().to_string()),
            llm_base_url: load_env_optional("LLM_BASE_URL"),
            embedding_provider,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: load_parsed("EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?,
            embedding_base_url: load_env_optional("EMBEDDING_BASE_URL"),
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY")
                .or_else(|| load_env_optional("OPENAI_API_KEY")),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            host: load_env_optional("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: load_parsed("PORT", DEFAULT_PORT)?,
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            max_file_size: load_parsed("MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?,
            chunk_size: load_parsed("TEXT_SPLITTER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            chunk_overlap: load_parsed("TEXT_SPLITTER_CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
            similarity_top_k: load_parsed("SIMILARITY_TOP_K", DEFAULT_SIMILARITY_TOP_K)?,
            summary_top_k: load_parsed("SUMMARY_TOP_K", DEFAULT_SUMMARY_TOP_K)?,
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|parsed| parsed.unwrap_or(default))
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "groq" => Ok(Self::Groq),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        llm_provider = ?config.llm_provider,
        llm_model = %config.llm_model,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        upload_dir = %config.upload_dir.display(),
        port = config.port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!("Gemini".parse::<LlmProvider>(), Ok(LlmProvider::Gemini));
        assert_eq!(" groq ".parse::<LlmProvider>(), Ok(LlmProvider::Groq));
        assert_eq!("OLLAMA".parse::<LlmProvider>(), Ok(LlmProvider::Ollama));
        assert!("claude".parse::<LlmProvider>().is_err());

        assert_eq!(
            "OpenAI".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::OpenAI)
        );
        assert_eq!("hash".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Hash));
        assert!("bge".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn hosted_providers_name_their_fallback_key() {
        assert_eq!(
            LlmProvider::Gemini.api_key_variable(),
            Some("GOOGLE_API_KEY")
        );
        assert_eq!(LlmProvider::Groq.api_key_variable(), Some("GROQ_API_KEY"));
        assert_eq!(LlmProvider::Ollama.api_key_variable(), None);
    }

    #[test]
    fn default_models_follow_provider() {
        assert_eq!(LlmProvider::Gemini.default_model(), "gemini-2.5-flash");
        assert!(!LlmProvider::Groq.default_model().is_empty());
        assert!(!LlmProvider::Ollama.default_model().is_empty());
    }
}
