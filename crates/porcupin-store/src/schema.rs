use rusqlite::Connection;

/// Create the schema if it does not already exist.
///
/// No separate migration framework: this mirrors the teacher's "open or
/// create tree" approach in its sled-backed store, just expressed as
/// `CREATE TABLE IF NOT EXISTS`.
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS accounts (
            address           TEXT PRIMARY KEY,
            alias             TEXT,
            sync_owned        INTEGER NOT NULL DEFAULT 1,
            sync_created      INTEGER NOT NULL DEFAULT 1,
            last_synced_level INTEGER NOT NULL DEFAULT 0,
            last_synced_at    TEXT
        );

        CREATE TABLE IF NOT EXISTS tokens (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            contract       TEXT NOT NULL,
            token_id       TEXT NOT NULL,
            wallet_address TEXT NOT NULL,
            name           TEXT,
            description    TEXT,
            creator        TEXT,
            artifact_uri   TEXT,
            display_uri    TEXT,
            thumbnail_uri  TEXT,
            raw_metadata   TEXT,
            UNIQUE(contract, token_id)
        );

        CREATE TABLE IF NOT EXISTS pin_intents (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            uri          TEXT NOT NULL UNIQUE,
            token_id     INTEGER NOT NULL REFERENCES tokens(id),
            role         TEXT NOT NULL,
            mime_type    TEXT,
            size_bytes   INTEGER,
            status       TEXT NOT NULL DEFAULT 'pending',
            retry_count  INTEGER NOT NULL DEFAULT 0,
            error_msg    TEXT,
            pinned_at    TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_pin_intents_status ON pin_intents(status);
        CREATE INDEX IF NOT EXISTS idx_pin_intents_token_id ON pin_intents(token_id);

        CREATE TABLE IF NOT EXISTS settings (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
}
