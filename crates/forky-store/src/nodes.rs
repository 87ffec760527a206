//! Node row repository: node rows plus the `node_parents` edge table.
//!
//! Parent edges carry an `ordinal`; ordinal 0 is the primary (left)
//! parent, which is how the history walk through merge nodes is recovered
//! deterministically after a reload.

use rusqlite::{params, Connection};

use forky_core::node::{AttachmentRef, MergeMetadata, Node, Role};
use forky_core::{ConversationId, NodeId};

use crate::error::StoreError;

pub(crate) struct NodeRepo;

impl NodeRepo {
    pub fn insert(
        conn: &Connection,
        conversation_id: &ConversationId,
        node: &Node,
    ) -> Result<(), StoreError> {
        let merge_metadata = node
            .merge_metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let attachments = if node.attachments.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&node.attachments)?)
        };

        let _ = conn.execute(
            "INSERT INTO nodes (id, conversation_id, role, content, created_at, branch_name, merge_metadata, attachments)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                node.id.as_str(),
                conversation_id.as_str(),
                node.role.to_string(),
                node.content,
                node.created_at,
                node.branch_name,
                merge_metadata,
                attachments,
            ],
        )?;

        for (ordinal, parent) in node.parent_ids.iter().enumerate() {
            let _ = conn.execute(
                "INSERT INTO node_parents (node_id, parent_id, ordinal) VALUES (?1, ?2, ?3)",
                params![node.id.as_str(), parent.as_str(), ordinal as i64],
            )?;
        }
        Ok(())
    }

    /// Load every node of a conversation with its ordered parent list.
    pub fn load_all(
        conn: &Connection,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Node>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, role, content, created_at, branch_name, merge_metadata, attachments
             FROM nodes WHERE conversation_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let mut nodes = stmt
            .query_map(params![conversation_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(id, role, content, created_at, branch_name, merge_metadata, attachments)| {
                Ok(Node {
                    id: NodeId::from_raw(id.clone()),
                    role: role.parse::<Role>().map_err(|e| {
                        StoreError::Corrupt(format!("node {id} has an invalid role: {e}"))
                    })?,
                    content,
                    parent_ids: Vec::new(),
                    created_at,
                    branch_name,
                    merge_metadata: merge_metadata
                        .map(|raw| {
                            serde_json::from_str::<MergeMetadata>(&raw).map_err(|e| {
                                StoreError::Corrupt(format!(
                                    "node {id} has invalid merge metadata: {e}"
                                ))
                            })
                        })
                        .transpose()?,
                    attachments: attachments
                        .map(|raw| {
                            serde_json::from_str::<Vec<AttachmentRef>>(&raw).map_err(|e| {
                                StoreError::Corrupt(format!(
                                    "node {id} has invalid attachments: {e}"
                                ))
                            })
                        })
                        .transpose()?
                        .unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<Node>, StoreError>>()?;

        let mut parent_stmt = conn.prepare(
            "SELECT parent_id FROM node_parents WHERE node_id = ?1 ORDER BY ordinal ASC",
        )?;
        for node in &mut nodes {
            node.parent_ids = parent_stmt
                .query_map(params![node.id.as_str()], |row| {
                    Ok(NodeId::from_raw(row.get::<_, String>(0)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
        }
        Ok(nodes)
    }

    /// Remove every node row of a conversation (edges cascade).
    pub fn delete_all(
        conn: &Connection,
        conversation_id: &ConversationId,
    ) -> Result<usize, StoreError> {
        let deleted = conn.execute(
            "DELETE FROM nodes WHERE conversation_id = ?1",
            params![conversation_id.as_str()],
        )?;
        Ok(deleted)
    }

    pub fn count(
        conn: &Connection,
        conversation_id: &ConversationId,
    ) -> Result<i64, StoreError> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE conversation_id = ?1",
            params![conversation_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::ConversationRepo;
    use crate::store::memory_connection;
    use forky_core::state::{Category, ConflictKind, ConflictRecord};

    fn setup() -> (Connection, ConversationId) {
        let conn = memory_connection().unwrap();
        let conv = ConversationId::new();
        ConversationRepo::insert(&conn, &conv, "test", "2026-01-01T00:00:00Z").unwrap();
        (conn, conv)
    }

    #[test]
    fn roundtrip_plain_node() {
        let (conn, conv) = setup();
        let root = Node::root();
        let child = Node::message(Role::User, "hello", vec![root.id.clone()]);
        NodeRepo::insert(&conn, &conv, &root).unwrap();
        NodeRepo::insert(&conn, &conv, &child).unwrap();
        let loaded = NodeRepo::load_all(&conn, &conv).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], root);
        assert_eq!(loaded[1], child);
    }

    #[test]
    fn roundtrip_merge_node_with_ordinals() {
        let (conn, conv) = setup();
        let root = Node::root();
        let left = Node::message(Role::User, "l", vec![root.id.clone()]);
        let right = Node::message(Role::User, "r", vec![root.id.clone()]);
        let merge = Node::merge(
            "combined",
            MergeMetadata {
                lca_id: root.id.clone(),
                left_parent_id: left.id.clone(),
                right_parent_id: right.id.clone(),
                conflicts: vec![ConflictRecord {
                    category: Category::Decisions,
                    left_item: "use postgres".into(),
                    right_item: "use sqlite".into(),
                    kind: ConflictKind::BothModified,
                }],
            },
        );
        for node in [&root, &left, &right, &merge] {
            NodeRepo::insert(&conn, &conv, node).unwrap();
        }
        let loaded = NodeRepo::load_all(&conn, &conv).unwrap();
        let reloaded = loaded.iter().find(|n| n.id == merge.id).unwrap();
        // Ordinal 0 must come back as the left parent.
        assert_eq!(reloaded.parent_ids, vec![left.id.clone(), right.id.clone()]);
        assert_eq!(reloaded.merge_metadata, merge.merge_metadata);
    }

    #[test]
    fn roundtrip_attachments() {
        let (conn, conv) = setup();
        let root = Node::root();
        let mut node = Node::message(Role::User, "see file", vec![root.id.clone()]);
        node.attachments.push(AttachmentRef {
            id: forky_core::AttachmentId::new(),
            name: Some("notes.txt".into()),
            mime_type: Some("text/plain".into()),
        });
        NodeRepo::insert(&conn, &conv, &root).unwrap();
        NodeRepo::insert(&conn, &conv, &node).unwrap();
        let loaded = NodeRepo::load_all(&conn, &conv).unwrap();
        let reloaded = loaded.iter().find(|n| n.id == node.id).unwrap();
        assert_eq!(reloaded.attachments, node.attachments);
    }

    #[test]
    fn corrupt_role_surfaces_as_corrupt() {
        let (conn, conv) = setup();
        let _ = conn
            .execute(
                "INSERT INTO nodes (id, conversation_id, role, content, created_at)
                 VALUES ('node_bad', ?1, 'robot', 'hm', '2026-01-01T00:00:00Z')",
                params![conv.as_str()],
            )
            .unwrap();
        let err = NodeRepo::load_all(&conn, &conv).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn delete_all_cascades_edges() {
        let (conn, conv) = setup();
        let root = Node::root();
        let child = Node::message(Role::User, "x", vec![root.id.clone()]);
        NodeRepo::insert(&conn, &conv, &root).unwrap();
        NodeRepo::insert(&conn, &conv, &child).unwrap();
        assert_eq!(NodeRepo::delete_all(&conn, &conv).unwrap(), 2);
        let edges: i64 = conn
            .query_row("SELECT COUNT(*) FROM node_parents", [], |row| row.get(0))
            .unwrap();
        assert_eq!(edges, 0);
        assert_eq!(NodeRepo::count(&conn, &conv).unwrap(), 0);
    }
}
