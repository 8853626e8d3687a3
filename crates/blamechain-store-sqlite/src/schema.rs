//! SQL schema for the Blamechain SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Live content, one table per source kind. Each row is a cache of the
-- latest revision's content once the record is under ledger management.
CREATE TABLE IF NOT EXISTS chat_messages (
    id          INTEGER PRIMARY KEY,
    content     TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS transcripts (
    id          INTEGER PRIMARY KEY,
    content     TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS direct_messages (
    id          INTEGER PRIMARY KEY,
    content     TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Revisions are strictly append-only; the triggers below reject any
-- UPDATE or DELETE.
CREATE TABLE IF NOT EXISTS revisions (
    source_kind     TEXT    NOT NULL,   -- discriminant of SourceKind
    record_id       INTEGER NOT NULL,
    version_number  INTEGER NOT NULL CHECK (version_number >= 1),
    content         TEXT    NOT NULL,
    editor_id       TEXT,               -- NULL for a bootstrapped original
    edit_reason     TEXT,
    created_at      TEXT    NOT NULL,   -- RFC 3339 UTC, microseconds
    content_hash    TEXT    NOT NULL,
    previous_hash   TEXT    NOT NULL,   -- 'GENESIS' for version 1
    chain_hash      TEXT    NOT NULL,
    hash_algorithm  TEXT    NOT NULL,
    PRIMARY KEY (source_kind, record_id, version_number)
);

CREATE TRIGGER IF NOT EXISTS revisions_no_update
BEFORE UPDATE ON revisions
BEGIN
    SELECT RAISE(ABORT, 'revisions are append-only');
END;

CREATE TRIGGER IF NOT EXISTS revisions_no_delete
BEFORE DELETE ON revisions
BEGIN
    SELECT RAISE(ABORT, 'revisions are append-only');
END;

-- Evidence bundles. The snapshot is frozen at export; only the dispute
-- status columns ever change.
CREATE TABLE IF NOT EXISTS evidence_bundles (
    bundle_id         TEXT    PRIMARY KEY,
    source_kind       TEXT    NOT NULL,
    record_id         INTEGER NOT NULL,
    snapshot_json     TEXT    NOT NULL,
    snapshot_digest   TEXT    NOT NULL,
    status            TEXT    NOT NULL DEFAULT 'open',
    status_changed_at TEXT    NOT NULL,
    resolution_notes  TEXT
);

CREATE TRIGGER IF NOT EXISTS evidence_snapshot_frozen
BEFORE UPDATE OF bundle_id, source_kind, record_id, snapshot_json, snapshot_digest
ON evidence_bundles
BEGIN
    SELECT RAISE(ABORT, 'evidence snapshots are immutable');
END;

-- Dispute markers on individual revisions. Kept apart from `revisions` so
-- flagging never rewrites a revision row.
CREATE TABLE IF NOT EXISTS revision_flags (
    source_kind    TEXT    NOT NULL,
    record_id      INTEGER NOT NULL,
    version_number INTEGER NOT NULL,
    bundle_id      TEXT    NOT NULL REFERENCES evidence_bundles(bundle_id),
    flagged_at     TEXT    NOT NULL,
    PRIMARY KEY (source_kind, record_id, version_number, bundle_id),
    FOREIGN KEY (source_kind, record_id, version_number)
        REFERENCES revisions(source_kind, record_id, version_number)
);

CREATE INDEX IF NOT EXISTS evidence_record_idx ON evidence_bundles(source_kind, record_id);

PRAGMA user_version = 1;
";
