#![deny(missing_docs)]

//! Core library for the DocSense document question-answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// PDF and web page text extraction.
pub mod document;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text-generation client abstraction and adapters.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Retrieval-augmented generation over indexed documents.
pub mod rag;
