//! docvault-retriever: document store with exact nearest-neighbor search
//!
//! This crate stores chunked documents next to one vector per chunk and
//! answers k-nearest-neighbor queries over them. The whole store lives in
//! memory and is snapshotted to a directory after every change, so a restart
//! picks up where the last run left off.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: The service, chunking strategy, flat index and TF-IDF backend
//! - **[`storage`]**: Chunk metadata records and the snapshot persistence layer
//! - **[`config`]**: TOML-loadable service configuration
//! - **[`status`]**: Store statistics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docvault_retriever::{RetrievalService, RetrieverConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let service = RetrievalService::open(RetrieverConfig::new("/tmp/docvault")).await?;
//! service
//!     .add_document("Server uptime is 99.8%. Budget utilization is 92%.", "brief.txt")
//!     .await?;
//!
//! for result in service.search("uptime", 3).await? {
//!     println!("{} {:.3} {}", result.rank, result.distance, result.chunk.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Document → ChunkingStrategy → EmbeddingProvider / TfIdfVectorizer
//!                                        ↓
//!              Search ← FlatIndex + MetadataStore → PersistenceLayer
//! ```

pub mod config;
pub mod error;
pub mod retrieval;
pub mod status;
pub mod storage;

pub use config::{Backend, RetrieverConfig};
pub use error::{PersistError, Result, RetrievalError};
pub use retrieval::service::{AddOutcome, RetrievalService, SearchResult};
pub use status::StoreStats;
pub use storage::{Chunk, ChunkExtra};
