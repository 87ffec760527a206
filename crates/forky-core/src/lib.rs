//! Core types shared by every Forky crate.
//!
//! This crate defines the vocabulary of the conversation engine: branded
//! identifiers, the immutable [`node::Node`] record, the role-tagged
//! [`messages::ChatMessage`] union sent to models, the structured
//! [`state::StateRecord`] family used by the three-way merge, and the
//! [`model::ModelClient`] capability trait that the engine requires from
//! provider adapters. [`mock::MockModelClient`] provides a scripted client
//! for deterministic tests.

pub mod ids;
pub mod messages;
pub mod mock;
pub mod model;
pub mod node;
pub mod state;

pub use ids::{AttachmentId, ConversationId, NodeId};
pub use messages::ChatMessage;
pub use model::{ModelClient, ModelError, ModelInfo};
pub use node::{AttachmentRef, MergeMetadata, Node, Role};
pub use state::{Category, ChangedItem, ConflictKind, ConflictRecord, StateDiff, StateRecord};
