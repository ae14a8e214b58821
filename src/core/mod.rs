//! Core module containing the query orchestration pipeline
//!
//! This module contains:
//! - Task registry and access policy
//! - RAG (Retrieval Augmented Generation) index and retrieval modes
//! - Prompt building and query classification
//! - The orchestrator state machine tying them together

pub mod classifier;
pub mod environment;
pub mod orchestrator;
pub mod policy;
pub mod prompt;
pub mod rag;
pub mod registry;
pub mod retrieval;
#[cfg(test)]
pub(crate) mod testing;

pub use classifier::*;
pub use environment::*;
pub use orchestrator::*;
pub use registry::*;
pub use retrieval::*;
