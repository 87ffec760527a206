//! High-level transactional [`ConversationStore`] API.
//!
//! The store owns a single SQLite connection guarded by a
//! `parking_lot::Mutex` (rusqlite connections are not `Sync`), bootstrapped
//! with WAL mode, foreign keys, and the schema DDL on open. A database
//! written by a different schema version is refused at open time rather
//! than silently reinterpreted.
//!
//! Every write method runs inside a single SQLite transaction under a
//! per-conversation lock — callers never observe partial state, and two
//! writers on the same conversation are serialized while writers on
//! different conversations proceed concurrently.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use forky_core::node::FORK_MARKER;
use forky_core::ConversationId;
use forky_graph::ConversationGraph;

use crate::conversations::{ConversationRecord, ConversationRepo};
use crate::error::StoreError;
use crate::nodes::NodeRepo;
use crate::schema;

/// One full-text search hit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRow {
    pub conversation_id: ConversationId,
    pub conversation_name: String,
    pub node_id: forky_core::NodeId,
    pub role: String,
    pub snippet: String,
}

/// Durable store for conversation graphs.
#[derive(Debug)]
pub struct ConversationStore {
    conn: Arc<Mutex<Connection>>,
    write_locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl ConversationStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        bootstrap(&conn)?;
        info!(path = %path.display(), "conversation store opened");
        Ok(Self::with_connection(conn))
    }

    /// Open a store backed by an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::with_connection(memory_connection()?))
    }

    fn with_connection(conn: Connection) -> Self {
        Self { conn: Arc::new(Mutex::new(conn)), write_locks: Mutex::new(HashMap::new()) }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        f(&conn)
    }

    fn write_lock(&self, id: &ConversationId) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock();
        if locks.len() > 128 {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }
        if let Some(existing) = locks.get(id.as_str()).and_then(Weak::upgrade) {
            return existing;
        }
        let lock = Arc::new(Mutex::new(()));
        let _ = locks.insert(id.as_str().to_string(), Arc::downgrade(&lock));
        lock
    }

    fn with_write_lock<T>(
        &self,
        id: &ConversationId,
        f: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let lock = self.write_lock(id);
        let _guard = lock.lock();
        f()
    }

    // ── Conversation lifecycle ────────────────────────────────────────

    /// Create a conversation with a fresh single-root graph.
    ///
    /// A missing name defaults to a short tag derived from the id.
    #[instrument(skip(self))]
    pub fn create_conversation(
        &self,
        name: Option<&str>,
    ) -> Result<(ConversationRecord, ConversationGraph), StoreError> {
        let id = ConversationId::new();
        let name = match name {
            Some(n) => n.to_string(),
            None => format!("conv-{}", &id.as_str()[id.as_str().len().saturating_sub(12)..]),
        };
        let graph = ConversationGraph::new();
        let created_at = Utc::now().to_rfc3339();

        self.with_write_lock(&id, || {
            self.with_conn(|conn| {
                let tx = conn.unchecked_transaction()?;
                ConversationRepo::insert(&tx, &id, &name, &created_at)?;
                for node in graph.nodes_by_creation() {
                    NodeRepo::insert(&tx, &id, node)?;
                }
                let _ = ConversationRepo::update_current(&tx, &id, graph.current_node_id())?;
                tx.commit()?;
                Ok(())
            })
        })?;

        debug!(conversation_id = %id, "conversation created");
        let record = self
            .get_record(&id)?
            .ok_or_else(|| StoreError::UnknownConversation(id.to_string()))?;
        Ok((record, graph))
    }

    /// Load a conversation and rebuild its graph, validating every
    /// invariant. A graph that fails validation is reported as corrupt.
    #[instrument(skip(self), fields(conversation_id = %id))]
    pub fn load(
        &self,
        id: &ConversationId,
    ) -> Result<(ConversationRecord, ConversationGraph), StoreError> {
        let record = self
            .get_record(id)?
            .ok_or_else(|| StoreError::UnknownConversation(id.to_string()))?;
        let nodes = self.with_conn(|conn| NodeRepo::load_all(conn, id))?;
        let current = record
            .current_node_id
            .clone()
            .ok_or_else(|| StoreError::Corrupt(format!("conversation {id} has no current node")))?;
        let graph = ConversationGraph::from_nodes(nodes, current)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok((record, graph))
    }

    /// Persist the whole conversation atomically: all node rows, parent
    /// edges, and the checkout pointer, or nothing. The graph is validated
    /// first so an invariant violation can never reach disk.
    #[instrument(skip(self, graph), fields(conversation_id = %id, nodes = graph.len()))]
    pub fn save(&self, id: &ConversationId, graph: &ConversationGraph) -> Result<(), StoreError> {
        graph.validate().map_err(|e| StoreError::Corrupt(e.to_string()))?;

        self.with_write_lock(id, || {
            self.with_conn(|conn| {
                let exists = ConversationRepo::get(conn, id)?.is_some();
                if !exists {
                    return Err(StoreError::UnknownConversation(id.to_string()));
                }
                let tx = conn.unchecked_transaction()?;
                let _ = NodeRepo::delete_all(&tx, id)?;
                for node in graph.nodes_by_creation() {
                    NodeRepo::insert(&tx, id, node)?;
                }
                let _ = ConversationRepo::update_current(&tx, id, graph.current_node_id())?;
                tx.commit()?;
                Ok(())
            })
        })
    }

    pub fn get_record(&self, id: &ConversationId) -> Result<Option<ConversationRecord>, StoreError> {
        self.with_conn(|conn| ConversationRepo::get(conn, id))
    }

    pub fn list_conversations(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        self.with_conn(ConversationRepo::list)
    }

    pub fn rename_conversation(&self, id: &ConversationId, name: &str) -> Result<(), StoreError> {
        self.with_write_lock(id, || {
            self.with_conn(|conn| {
                if ConversationRepo::rename(conn, id, name)? {
                    Ok(())
                } else {
                    Err(StoreError::UnknownConversation(id.to_string()))
                }
            })
        })
    }

    /// Mark a conversation active, clearing the flag on all others.
    pub fn set_active(&self, id: &ConversationId) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            if ConversationRepo::set_active(conn, id)? {
                Ok(())
            } else {
                Err(StoreError::UnknownConversation(id.to_string()))
            }
        })
    }

    /// Delete a conversation and all of its nodes.
    #[instrument(skip(self), fields(conversation_id = %id))]
    pub fn delete_conversation(&self, id: &ConversationId) -> Result<(), StoreError> {
        let deleted = self.with_write_lock(id, || {
            self.with_conn(|conn| {
                let tx = conn.unchecked_transaction()?;
                let _ = NodeRepo::delete_all(&tx, id)?;
                let deleted = ConversationRepo::delete(&tx, id)?;
                tx.commit()?;
                Ok(deleted)
            })
        })?;
        if deleted {
            let _ = self.write_locks.lock().remove(id.as_str());
            Ok(())
        } else {
            Err(StoreError::UnknownConversation(id.to_string()))
        }
    }

    // ── Search ────────────────────────────────────────────────────────

    /// Full-text search across all conversations. Structural system nodes
    /// (root markers, fork markers) are excluded.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT f.conversation_id, c.name, f.node_id, n.role,
                        snippet(nodes_fts, 2, '[', ']', '…', 12)
                 FROM nodes_fts f
                 JOIN conversations c ON c.id = f.conversation_id
                 JOIN nodes n ON n.id = f.node_id
                 WHERE nodes_fts MATCH ?1
                   AND NOT (n.role = 'system' AND (n.content = ?2 OR n.content = 'Root'))
                 ORDER BY rank
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![query, FORK_MARKER, limit as i64], |row| {
                    Ok(SearchRow {
                        conversation_id: ConversationId::from_raw(row.get::<_, String>(0)?),
                        conversation_name: row.get(1)?,
                        node_id: forky_core::NodeId::from_raw(row.get::<_, String>(2)?),
                        role: row.get(3)?,
                        snippet: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection bootstrap
// ─────────────────────────────────────────────────────────────────────────────

/// Prepare a raw connection for use: pragmas, DDL, and the schema
/// version stamp.
///
/// A fresh database is stamped with [`schema::SCHEMA_VERSION`]. An
/// existing database carrying any other version is refused as corrupt —
/// there is no migration path across persisted formats, so failing loudly
/// beats misreading rows.
fn bootstrap(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(schema::PRAGMAS)?;
    conn.execute_batch(schema::CREATE_TABLES)?;

    let stamped: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()?;
    match stamped {
        None => {
            let _ = conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [schema::SCHEMA_VERSION],
            )?;
        }
        Some(version) if version == schema::SCHEMA_VERSION => {}
        Some(version) => {
            return Err(StoreError::Corrupt(format!(
                "database has schema version {version}, this build reads version {}",
                schema::SCHEMA_VERSION
            )));
        }
    }
    Ok(())
}

/// A bootstrapped in-memory connection, for repository tests.
pub(crate) fn memory_connection() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    bootstrap(&conn)?;
    Ok(conn)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
