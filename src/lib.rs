#![deny(missing_docs)]

//! Core library for the logistics document Q&A service.

/// HTTP routing and REST handlers.
pub mod api;
/// Language-model client abstraction and adapters.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Active document index and vector store backends.
pub mod index;
/// Upload parsing for PDF, Word, and text files.
pub mod loader;
/// Structured logging and tracing setup.
pub mod logging;
/// Service activity counters.
pub mod metrics;
/// Document pipeline: chunking, answering, and extraction.
pub mod processing;
/// Qdrant REST integration.
pub mod qdrant;
