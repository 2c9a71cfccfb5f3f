//! # docvault-embed
//!
//! Text embedding providers behind one async trait. A provider turns a batch
//! of texts into fixed-length `f32` vectors, in input order, or fails as a
//! whole.
//!
//! ## Providers
//!
//! - [`HashingEmbedProvider`]: deterministic feature hashing, no model files
//!   or network access. Used by default and in tests.
//! - [`FastEmbedProvider`]: local ONNX models through fastembed, loaded once
//!   and cached process-wide.
//! - [`HttpEmbedProvider`]: OpenAI-compatible or Azure OpenAI embeddings
//!   endpoints over HTTPS.
//!
//! ## Quick Start
//!
//! ```
//! use docvault_embed::{create_provider, HashingConfig, ProviderConfig};
//!
//! # async fn example() -> docvault_embed::Result<()> {
//! let provider = create_provider(&ProviderConfig::Hashing(HashingConfig::new(64))).await?;
//!
//! let texts = vec!["Server uptime".to_string(), "Budget review".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! assert_eq!(result.len(), 2);
//! assert_eq!(result.dimension, provider.embedding_dimension());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`] type.
//! Network and runtime failures are reported as transient (see
//! [`EmbedError::is_transient`]) so callers can tell them apart from
//! configuration mistakes.

pub mod config;
pub mod error;
pub mod hashing;
pub mod http;
pub mod provider;

// Re-export main types for easy access
pub use config::{EmbedConfig, HashingConfig, HttpConfig, HttpFlavor, LocalModel, ProviderConfig};
pub use error::{EmbedError, Result};
pub use hashing::HashingEmbedProvider;
pub use http::HttpEmbedProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, create_provider};
