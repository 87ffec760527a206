//! Conversation row repository — stateless, every method takes `&Connection`.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use forky_core::{ConversationId, NodeId};

use crate::error::StoreError;

/// A stored conversation row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub name: String,
    pub created_at: String,
    pub is_active: bool,
    pub current_node_id: Option<NodeId>,
}

pub(crate) struct ConversationRepo;

impl ConversationRepo {
    pub fn insert(
        conn: &Connection,
        id: &ConversationId,
        name: &str,
        created_at: &str,
    ) -> Result<(), StoreError> {
        let _ = conn.execute(
            "INSERT INTO conversations (id, name, created_at, is_active) VALUES (?1, ?2, ?3, 0)",
            params![id.as_str(), name, created_at],
        )?;
        Ok(())
    }

    pub fn get(conn: &Connection, id: &ConversationId) -> Result<Option<ConversationRecord>, StoreError> {
        let row = conn
            .query_row(
                "SELECT id, name, created_at, is_active, current_node_id
                 FROM conversations WHERE id = ?1",
                params![id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All conversations, newest first.
    pub fn list(conn: &Connection) -> Result<Vec<ConversationRecord>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, name, created_at, is_active, current_node_id
             FROM conversations ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn rename(conn: &Connection, id: &ConversationId, name: &str) -> Result<bool, StoreError> {
        let changed = conn.execute(
            "UPDATE conversations SET name = ?1 WHERE id = ?2",
            params![name, id.as_str()],
        )?;
        Ok(changed > 0)
    }

    pub fn update_current(
        conn: &Connection,
        id: &ConversationId,
        current_node_id: &NodeId,
    ) -> Result<bool, StoreError> {
        let changed = conn.execute(
            "UPDATE conversations SET current_node_id = ?1 WHERE id = ?2",
            params![current_node_id.as_str(), id.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Mark one conversation active and clear the flag everywhere else.
    pub fn set_active(conn: &Connection, id: &ConversationId) -> Result<bool, StoreError> {
        let _ = conn.execute("UPDATE conversations SET is_active = 0 WHERE is_active = 1", [])?;
        let changed = conn.execute(
            "UPDATE conversations SET is_active = 1 WHERE id = ?1",
            params![id.as_str()],
        )?;
        Ok(changed > 0)
    }

    pub fn delete(conn: &Connection, id: &ConversationId) -> Result<bool, StoreError> {
        let changed =
            conn.execute("DELETE FROM conversations WHERE id = ?1", params![id.as_str()])?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRecord> {
        Ok(ConversationRecord {
            id: ConversationId::from_raw(row.get::<_, String>(0)?),
            name: row.get(1)?,
            created_at: row.get(2)?,
            is_active: row.get(3)?,
            current_node_id: row.get::<_, Option<String>>(4)?.map(NodeId::from_raw),
        })
    }
}
