use rusqlite::Connection;

use crate::error::StoreError;

/// JSON-typed columns: stored as TEXT locally, surfaced as real JSON values
/// so both backends return the same row shape.
pub const JSON_COLUMNS: &[&str] = &[
    "attachments",
    "embeds",
    "reactors",
    "role_ids",
    "notifications",
    "extra",
    "categories",
    "media_urls",
];

/// Boolean-typed columns: stored as 0/1 locally, surfaced as JSON booleans.
pub const BOOL_COLUMNS: &[&str] = &[
    "nsfw",
    "setup_complete",
    "enriched",
    "is_pinned",
    "is_deleted",
    "dm_preference",
    "sharing_consent",
    "permission_to_curate",
];

/// Initialise all tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            message_id      INTEGER PRIMARY KEY,
            channel_id      INTEGER NOT NULL,
            author_id       INTEGER NOT NULL,
            content         TEXT NOT NULL DEFAULT '',
            created_at      TEXT NOT NULL,
            edited_at       TEXT,
            attachments     TEXT NOT NULL DEFAULT '[]',
            embeds          TEXT NOT NULL DEFAULT '[]',
            reaction_count  INTEGER NOT NULL DEFAULT 0,
            reactors        TEXT NOT NULL DEFAULT '[]',
            reference_id    INTEGER,
            thread_id       INTEGER,
            is_pinned       INTEGER NOT NULL DEFAULT 0,
            is_deleted      INTEGER NOT NULL DEFAULT 0,
            jump_url        TEXT NOT NULL DEFAULT '',
            indexed_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_channel_created
            ON messages(channel_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_indexed
            ON messages(indexed_at);

        CREATE TABLE IF NOT EXISTS members (
            member_id           INTEGER PRIMARY KEY,
            username            TEXT NOT NULL,
            global_name         TEXT,
            server_nick         TEXT,
            avatar_url          TEXT,
            discord_created_at  TEXT,
            guild_join_date     TEXT,
            role_ids            TEXT NOT NULL DEFAULT '[]',
            sharing_consent     INTEGER,
            dm_preference       INTEGER NOT NULL DEFAULT 1,
            permission_to_curate INTEGER,
            notifications       TEXT NOT NULL DEFAULT '[]',
            twitter_handle      TEXT,
            instagram_handle    TEXT,
            youtube_handle      TEXT
        );

        CREATE TABLE IF NOT EXISTS channels (
            channel_id        INTEGER PRIMARY KEY,
            name              TEXT NOT NULL,
            category_id       INTEGER,
            nsfw              INTEGER NOT NULL DEFAULT 0,
            description       TEXT,
            suitable_posts    TEXT,
            unsuitable_posts  TEXT,
            rules             TEXT,
            setup_complete    INTEGER NOT NULL DEFAULT 0,
            enriched          INTEGER NOT NULL DEFAULT 0,
            summary_thread_id INTEGER
        );

        CREATE TABLE IF NOT EXISTS daily_summaries (
            date          TEXT NOT NULL,
            channel_id    INTEGER NOT NULL,
            full_summary  TEXT,
            short_summary TEXT,
            thread_id     INTEGER,
            status        TEXT NOT NULL DEFAULT 'pending',
            error         TEXT,
            PRIMARY KEY (date, channel_id)
        );

        CREATE TABLE IF NOT EXISTS system_logs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp   TEXT NOT NULL,
            level       TEXT NOT NULL,
            logger_name TEXT NOT NULL,
            message     TEXT NOT NULL,
            module      TEXT,
            function    TEXT,
            line        INTEGER,
            exception   TEXT,
            extra       TEXT NOT NULL DEFAULT '{}',
            hostname    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_syslog_time
            ON system_logs(timestamp);

        CREATE TABLE IF NOT EXISTS assets (
            asset_id    TEXT PRIMARY KEY,
            author_id   INTEGER NOT NULL,
            message_id  INTEGER NOT NULL,
            workflow_url TEXT NOT NULL,
            model       TEXT,
            variant     TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS asset_media (
            asset_id   TEXT NOT NULL,
            media_url  TEXT NOT NULL,
            media_type TEXT,
            PRIMARY KEY (asset_id, media_url)
        );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }
}
