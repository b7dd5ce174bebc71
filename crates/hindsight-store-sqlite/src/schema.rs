//! SQL schema for the hindsight SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! layout version; future migrations will be gated on it. Column lists here
//! must stay in step with [`hindsight_core::Table::columns`].

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS facts (
    id          INTEGER PRIMARY KEY,
    content     TEXT NOT NULL,
    category    TEXT NOT NULL DEFAULT 'general',
    source      TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_info (
    id          INTEGER PRIMARY KEY,
    key         TEXT NOT NULL UNIQUE,
    value       TEXT NOT NULL,
    category    TEXT,            -- 'default' | 'shortcut' | 'alias' | free-form
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Append-only.
CREATE TABLE IF NOT EXISTS actions (
    id           INTEGER PRIMARY KEY,
    tool_name    TEXT NOT NULL,
    action_name  TEXT NOT NULL,
    arguments    TEXT,           -- JSON object
    result       TEXT,           -- JSON
    success      INTEGER NOT NULL DEFAULT 1,
    duration_ms  INTEGER,
    error        TEXT,
    session_id   TEXT,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS corrections (
    id               INTEGER PRIMARY KEY,
    trigger_pattern  TEXT NOT NULL,
    wrong_behavior   TEXT,
    correct_behavior TEXT NOT NULL,
    tool_name        TEXT,
    action_name      TEXT,
    argument_name    TEXT,
    confidence       REAL NOT NULL DEFAULT 1.0,
    use_count        INTEGER NOT NULL DEFAULT 0,
    session_id       TEXT,
    is_permanent     INTEGER NOT NULL DEFAULT 1,
    last_used        TEXT,
    decayed_at       TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    CHECK (confidence >= 0.0 AND confidence <= 1.0)
);

-- Immutable apart from `applied`.
CREATE TABLE IF NOT EXISTS feedback (
    id               INTEGER PRIMARY KEY,
    kind             TEXT NOT NULL,  -- 'correction' | 'positive' | 'negative' | 'preference'
    feedback_type    TEXT,
    message          TEXT NOT NULL,
    prior_action     TEXT,           -- JSON
    corrected_action TEXT,           -- JSON
    applied          INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS error_patterns (
    id               INTEGER PRIMARY KEY,
    tool_name        TEXT NOT NULL,
    action_name      TEXT NOT NULL,
    error_type       TEXT NOT NULL,
    error_message    TEXT,
    occurrence_count INTEGER NOT NULL DEFAULT 1,
    solution         TEXT,
    last_occurred    TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    UNIQUE (tool_name, action_name, error_type)
);

CREATE TABLE IF NOT EXISTS tool_patterns (
    id              INTEGER PRIMARY KEY,
    tool_name       TEXT NOT NULL,
    action_name     TEXT NOT NULL,
    use_count       INTEGER NOT NULL DEFAULT 0,
    success_count   INTEGER NOT NULL DEFAULT 0,
    success_rate    REAL NOT NULL DEFAULT 0.0,
    avg_duration_ms REAL NOT NULL DEFAULT 0.0,
    last_used       TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE (tool_name, action_name)
);

-- Append-only.
CREATE TABLE IF NOT EXISTS exchanges (
    id           INTEGER PRIMARY KEY,
    session_id   TEXT,
    user_input   TEXT NOT NULL,
    ai_response  TEXT NOT NULL,
    tools_used   TEXT,           -- JSON array
    mood         TEXT,
    topics       TEXT,           -- JSON array
    feedback_id  INTEGER,        -- feedback.id this exchange provoked
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notes (
    id          INTEGER PRIMARY KEY,
    title       TEXT,
    content     TEXT NOT NULL,
    tags        TEXT,            -- JSON array
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id           INTEGER PRIMARY KEY,
    title        TEXT NOT NULL,
    description  TEXT,
    status       TEXT NOT NULL DEFAULT 'pending',
    priority     INTEGER NOT NULL DEFAULT 0,
    due_at       TEXT,
    completed_at TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topics (
    id              INTEGER PRIMARY KEY,
    name            TEXT NOT NULL UNIQUE,
    mention_count   INTEGER NOT NULL DEFAULT 1,
    first_discussed TEXT NOT NULL,
    last_discussed  TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS locations (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    path        TEXT NOT NULL,
    kind        TEXT,            -- 'app_path' | 'folder' | 'script' | ...
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (name, path)
);

-- Mirror of the indexable tables; never the source of truth.
CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
    content,
    source UNINDEXED,
    source_id UNINDEXED,
    tokenize = 'porter unicode61'
);

CREATE INDEX IF NOT EXISTS actions_created_idx      ON actions(created_at);
CREATE INDEX IF NOT EXISTS actions_tool_idx         ON actions(tool_name, action_name);
CREATE INDEX IF NOT EXISTS corrections_trigger_idx  ON corrections(trigger_pattern);
CREATE INDEX IF NOT EXISTS corrections_session_idx  ON corrections(session_id);
CREATE INDEX IF NOT EXISTS exchanges_created_idx    ON exchanges(created_at);
CREATE INDEX IF NOT EXISTS exchanges_session_idx    ON exchanges(session_id);
CREATE INDEX IF NOT EXISTS facts_category_idx       ON facts(category);

PRAGMA user_version = 1;
";
