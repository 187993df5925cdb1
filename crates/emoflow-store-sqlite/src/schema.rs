//! SQL schema for the emoflow SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision for future migrations.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Every owned row carries exactly one of user_id / device_id.
CREATE TABLE IF NOT EXISTS notes (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id      TEXT,
    device_id    TEXT,
    title        TEXT NOT NULL,
    trigger_text TEXT NOT NULL,
    created_at   TEXT NOT NULL,   -- RFC 3339 UTC, microseconds; server-assigned
    CHECK ((user_id IS NULL) != (device_id IS NULL))
);

CREATE TABLE IF NOT EXISTS thoughts (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    note_id           INTEGER NOT NULL REFERENCES notes(id),
    emotion           TEXT NOT NULL,
    automatic_thought TEXT NOT NULL,
    created_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cognitive_errors (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    note_id     INTEGER NOT NULL REFERENCES notes(id),
    label       TEXT NOT NULL,
    description TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alternatives (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    note_id     INTEGER NOT NULL REFERENCES notes(id),
    alternative TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS behaviors (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    note_id     INTEGER NOT NULL REFERENCES notes(id),
    label       TEXT NOT NULL,
    description TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS flows (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     TEXT,
    device_id   TEXT,
    title       TEXT,
    description TEXT,
    created_at  TEXT NOT NULL,
    CHECK ((user_id IS NULL) != (device_id IS NULL))
);

-- Sole source of truth for flow membership.
CREATE TABLE IF NOT EXISTS flow_notes (
    flow_id    INTEGER NOT NULL REFERENCES flows(id),
    note_id    INTEGER NOT NULL REFERENCES notes(id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (flow_id, note_id)
);

-- Middles are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS middles (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id      TEXT,
    device_id    TEXT,
    from_note_id INTEGER NOT NULL REFERENCES notes(id),
    to_note_id   INTEGER NOT NULL REFERENCES notes(id),
    flow_id      INTEGER NOT NULL REFERENCES flows(id),
    created_at   TEXT NOT NULL,
    CHECK ((user_id IS NULL) != (device_id IS NULL))
);

CREATE INDEX IF NOT EXISTS notes_user_idx       ON notes(user_id);
CREATE INDEX IF NOT EXISTS notes_device_idx     ON notes(device_id);
CREATE INDEX IF NOT EXISTS notes_created_idx    ON notes(created_at);
CREATE INDEX IF NOT EXISTS thoughts_note_idx    ON thoughts(note_id);
CREATE INDEX IF NOT EXISTS errors_note_idx      ON cognitive_errors(note_id);
CREATE INDEX IF NOT EXISTS alternatives_note_idx ON alternatives(note_id);
CREATE INDEX IF NOT EXISTS behaviors_note_idx   ON behaviors(note_id);
CREATE INDEX IF NOT EXISTS flow_notes_note_idx  ON flow_notes(note_id);
CREATE INDEX IF NOT EXISTS middles_flow_idx     ON middles(flow_id);

PRAGMA user_version = 1;
";
