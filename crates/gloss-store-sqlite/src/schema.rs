//! SQL schema for the gloss SQLite store.
//!
//! Executed once when the store is initialised. Future migrations will be
//! gated on `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS pages (
    url           TEXT PRIMARY KEY,
    content_hash  TEXT NOT NULL,
    last_visited  TEXT NOT NULL     -- ISO 8601 UTC
);

-- AUTOINCREMENT keeps ids monotonic: a deleted highlight's id is never
-- handed out again, so stale markers cannot point at a new record.
CREATE TABLE IF NOT EXISTS highlights (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    page_url   TEXT NOT NULL,       -- soft reference to pages(url)
    text       TEXT NOT NULL,
    locators   TEXT NOT NULL,       -- JSON-encoded Locators
    timestamp  TEXT NOT NULL
);

-- highlight_id is deliberately not a FOREIGN KEY: dangling references are
-- stored as-is.
CREATE TABLE IF NOT EXISTS flashcards (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    highlight_id  INTEGER,          -- NULL for cards with no anchored text
    page_url      TEXT NOT NULL,
    question      TEXT NOT NULL,
    answer        TEXT NOT NULL,
    timestamp     TEXT NOT NULL
);

-- Flat key-value collections (legacy records live under 'flashcards').
CREATE TABLE IF NOT EXISTS bags (
    name        TEXT PRIMARY KEY,
    value_json  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS pages_visited_idx        ON pages(last_visited);
CREATE INDEX IF NOT EXISTS highlights_page_idx      ON highlights(page_url);
CREATE INDEX IF NOT EXISTS highlights_timestamp_idx ON highlights(timestamp);
CREATE INDEX IF NOT EXISTS flashcards_highlight_idx ON flashcards(highlight_id);
CREATE INDEX IF NOT EXISTS flashcards_page_idx      ON flashcards(page_url);

PRAGMA user_version = 1;
";
