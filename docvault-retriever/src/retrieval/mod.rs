pub mod chunking_strategy;
pub mod flat_index;
pub mod parser;
pub mod service;
pub mod tfidf;
