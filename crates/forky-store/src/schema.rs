/// SQL DDL for the conversation store.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 0,
    current_node_id TEXT
);

CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    branch_name TEXT,
    merge_metadata TEXT,
    attachments TEXT
);

CREATE TABLE IF NOT EXISTS node_parents (
    node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    parent_id TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    PRIMARY KEY (node_id, ordinal)
);

CREATE INDEX IF NOT EXISTS idx_nodes_conversation ON nodes(conversation_id);
CREATE INDEX IF NOT EXISTS idx_node_parents_parent ON node_parents(parent_id);
CREATE INDEX IF NOT EXISTS idx_conversations_active ON conversations(is_active);

CREATE VIRTUAL TABLE IF NOT EXISTS nodes_fts USING fts5(
    node_id UNINDEXED,
    conversation_id UNINDEXED,
    content,
    role UNINDEXED
);

CREATE TRIGGER IF NOT EXISTS nodes_fts_ai AFTER INSERT ON nodes BEGIN
    INSERT INTO nodes_fts(node_id, conversation_id, content, role)
    VALUES (NEW.id, NEW.conversation_id, NEW.content, NEW.role);
END;

CREATE TRIGGER IF NOT EXISTS nodes_fts_ad AFTER DELETE ON nodes BEGIN
    DELETE FROM nodes_fts WHERE node_id = OLD.id;
END;

CREATE TRIGGER IF NOT EXISTS nodes_fts_au AFTER UPDATE ON nodes BEGIN
    UPDATE nodes_fts SET content = NEW.content, role = NEW.role
    WHERE node_id = OLD.id;
END;

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
