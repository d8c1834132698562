use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            name        TEXT NOT NULL,
            avatar_url  TEXT,
            bio         TEXT,
            status      TEXT NOT NULL DEFAULT 'offline',
            last_seen   TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS channels (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            is_private  INTEGER NOT NULL DEFAULT 0,
            created_by  TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS channel_members (
            channel_id  TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id),
            joined_at   TEXT NOT NULL,
            PRIMARY KEY (channel_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_channel_members_user
            ON channel_members(user_id);

        -- seq orders messages; ids are opaque
        CREATE TABLE IF NOT EXISTS messages (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            channel_id  TEXT NOT NULL REFERENCES channels(id),
            author_id   TEXT NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            thread_id   TEXT REFERENCES messages(id),
            pinned_by   TEXT REFERENCES users(id),
            pinned_at   TEXT,
            edited_at   TEXT,
            deleted_at  TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, thread_id, seq);

        CREATE INDEX IF NOT EXISTS idx_messages_thread
            ON messages(thread_id, seq);

        -- Every read path selects from here, never from messages directly
        CREATE VIEW IF NOT EXISTS live_messages AS
            SELECT * FROM messages WHERE deleted_at IS NULL;

        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id),
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id, emoji)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);

        CREATE TABLE IF NOT EXISTS files (
            id           TEXT PRIMARY KEY,
            uploader_id  TEXT NOT NULL REFERENCES users(id),
            message_id   TEXT REFERENCES messages(id) ON DELETE CASCADE,
            name         TEXT NOT NULL,
            mime_type    TEXT NOT NULL,
            size         INTEGER NOT NULL,
            locator      TEXT NOT NULL,
            url          TEXT NOT NULL,
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_files_message
            ON files(message_id);

        -- last_read_seq survives a hard delete of the pointed-to message
        CREATE TABLE IF NOT EXISTS channel_reads (
            user_id               TEXT NOT NULL REFERENCES users(id),
            channel_id            TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            last_read_message_id  TEXT NOT NULL,
            last_read_seq         INTEGER NOT NULL,
            updated_at            TEXT NOT NULL,
            PRIMARY KEY (user_id, channel_id)
        );

        CREATE TABLE IF NOT EXISTS direct_messages (
            seq           INTEGER PRIMARY KEY AUTOINCREMENT,
            id            TEXT NOT NULL UNIQUE,
            sender_id     TEXT NOT NULL REFERENCES users(id),
            recipient_id  TEXT NOT NULL REFERENCES users(id),
            content       TEXT NOT NULL,
            read_at       TEXT,
            deleted_at    TEXT,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_direct_messages_pair
            ON direct_messages(sender_id, recipient_id, seq);

        CREATE VIEW IF NOT EXISTS live_direct_messages AS
            SELECT * FROM direct_messages WHERE deleted_at IS NULL;
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
