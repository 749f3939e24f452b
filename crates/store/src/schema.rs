//! Schema DDL. Applied idempotently on every open.

use fc_domain::Result;
use rusqlite::Connection;

use crate::db_err;

pub(crate) fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS clipboard_items (
            id               TEXT PRIMARY KEY,
            content          TEXT NOT NULL,
            content_type     TEXT NOT NULL,
            timestamp        TEXT NOT NULL,
            source_app       TEXT,
            window_title     TEXT,
            screenshot_path  TEXT,
            surrounding_text TEXT,
            analysis         TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_items_ts ON clipboard_items(timestamp DESC);
        CREATE INDEX IF NOT EXISTS idx_items_source ON clipboard_items(source_app);

        CREATE VIRTUAL TABLE IF NOT EXISTS clipboard_search USING fts5(
            item_id UNINDEXED,
            content,
            window_title,
            surrounding_text,
            tags
        );

        CREATE TABLE IF NOT EXISTS tags (
            name TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS item_tags (
            item_id  TEXT NOT NULL,
            tag_name TEXT NOT NULL,
            PRIMARY KEY (item_id, tag_name),
            FOREIGN KEY (item_id) REFERENCES clipboard_items(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_name) REFERENCES tags(name) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS clipboard_sessions (
            id              TEXT PRIMARY KEY,
            session_type    TEXT NOT NULL,
            session_label   TEXT NOT NULL,
            status          TEXT NOT NULL,
            start_time      TEXT NOT NULL,
            last_activity   TEXT NOT NULL,
            context_summary TEXT,
            intent_analysis TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_activity
            ON clipboard_sessions(last_activity DESC);
        CREATE INDEX IF NOT EXISTS idx_sessions_status ON clipboard_sessions(status);

        CREATE TABLE IF NOT EXISTS session_members (
            session_id        TEXT NOT NULL,
            clipboard_item_id TEXT NOT NULL,
            sequence_order    INTEGER NOT NULL,
            PRIMARY KEY (session_id, clipboard_item_id),
            FOREIGN KEY (session_id) REFERENCES clipboard_sessions(id) ON DELETE CASCADE,
            FOREIGN KEY (clipboard_item_id) REFERENCES clipboard_items(id) ON DELETE CASCADE
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_members_item
            ON session_members(clipboard_item_id);

        CREATE TABLE IF NOT EXISTS ai_tasks (
            id                TEXT PRIMARY KEY,
            clipboard_item_id TEXT NOT NULL,
            task_type         TEXT NOT NULL,
            status            TEXT NOT NULL,
            result            TEXT,
            error             TEXT,
            attempts          INTEGER NOT NULL DEFAULT 0,
            created_at        TEXT NOT NULL,
            completed_at      TEXT,
            FOREIGN KEY (clipboard_item_id) REFERENCES clipboard_items(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_item ON ai_tasks(clipboard_item_id);

        CREATE TABLE IF NOT EXISTS workflow_results (
            id                TEXT PRIMARY KEY,
            clipboard_item_id TEXT NOT NULL,
            workflow_type     TEXT NOT NULL,
            executed_at       TEXT NOT NULL,
            payload           TEXT NOT NULL,
            confidence        REAL,
            FOREIGN KEY (clipboard_item_id) REFERENCES clipboard_items(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_results_item
            ON workflow_results(clipboard_item_id, executed_at DESC);
        "#,
    )
    .map_err(db_err)
}
