//! The conversation service façade.
//!
//! [`ConversationService`] is what front-ends (HTTP layers, CLIs) talk
//! to: it loads the affected conversation's graph from the store,
//! validates and mutates it in memory, and writes it back atomically.
//! Writes on one conversation are serialized by an async per-conversation
//! lock with a soft acquisition deadline (`Busy`); reads run against the
//! load-time snapshot without locking. Chat streams chunks while holding
//! the lock for the whole turn, and the merge pipeline holds it from
//! eligibility through commit.

mod config;
mod deadline;
mod error;
mod locks;
mod service;
mod views;

pub use config::ServiceConfig;
pub use error::ServiceError;
pub use service::ConversationService;
pub use views::{ChatChunk, ChatStream, ConversationSummary, GraphView, MergeReport, NodeView};

pub use forky_store::SearchRow;
