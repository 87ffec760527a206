//! SQLite persistence for conversation graphs.
//!
//! [`ConversationStore`] is the crate's public surface: create, load,
//! save, list, rename, delete, and search conversations. Saves rewrite a
//! conversation's rows inside one transaction after the graph validates,
//! so a reader never observes partial state; loads rebuild the in-memory
//! DAG and surface invariant violations as [`StoreError::Corrupt`].
//!
//! Writes are serialized per conversation; operations on different
//! conversations proceed in parallel.

mod conversations;
mod error;
mod nodes;
mod schema;
mod store;

pub use conversations::ConversationRecord;
pub use error::StoreError;
pub use store::{ConversationStore, SearchRow};
