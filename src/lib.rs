//! NL2SQL Assistant - Schema Context Retrieval for Text-to-SQL
//!
//! A Rust library that turns a natural-language question about a data
//! warehouse into a single SQL statement by sending a hosted language model
//! only the schema context that matters.
//!
//! # Features
//!
//! - Load table descriptors from plain-text schema documents
//! - Rank tables or columns by relevance (lexical or embedding scoring)
//! - Assemble prompts under a character budget
//! - Validate the model's answer down to exactly one query

/// Schema catalog loading and lookup
pub mod catalog;
/// Completion response cache
pub mod cache;
/// Configuration management
pub mod config;
/// Embedding-based relevance scoring
pub mod embedding;
/// Error types
pub mod error;
/// Completion call and SQL extraction
pub mod gateway;
/// Gemini API adapter
pub mod gemini;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Text normalization for lexical scoring
pub mod nlp;
/// Prompt assembly
pub mod prompt;
/// Completion and embedding capabilities
pub mod provider;
/// Context ranking
pub mod ranker;
/// Schema document parsing
pub mod schema;
/// End-to-end question pipeline
pub mod service;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use catalog::{SchemaCatalog, SchemaDocument};
pub use error::{AssistantError, Result};
pub use gateway::GenerationGateway;
pub use models::{
    ColumnDescriptor, FallbackReason, GenerationResult, Prompt, RankedContextItem, RefusalCause,
    TableDescriptor,
};
pub use prompt::PromptAssembler;
pub use provider::{CompletionError, CompletionProvider, EmbeddingProvider};
pub use ranker::{ContextRanker, ScoringStrategy};
pub use service::{Answer, AssistantService, PipelineSettings};
