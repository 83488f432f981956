//! SQL schema for the fleet SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Provisioned outside the pipeline; read-only to it.
CREATE TABLE IF NOT EXISTS vehicles (
    entity_id    TEXT PRIMARY KEY,
    vehicle_id   TEXT NOT NULL UNIQUE,   -- external code used in topics
    vehicle_type TEXT,
    brand        TEXT,
    model        TEXT,
    year         INTEGER,
    status       TEXT,
    created_at   TEXT NOT NULL,
    deleted_at   TEXT
);

-- Exactly one row per vehicle, upserted by the sync engine.
CREATE TABLE IF NOT EXISTS current_locations (
    vehicle_entity_id TEXT PRIMARY KEY REFERENCES vehicles(entity_id),
    entity_id         TEXT NOT NULL UNIQUE,
    latitude          REAL NOT NULL,
    longitude         REAL NOT NULL,
    timestamp         INTEGER NOT NULL,   -- sample time, epoch seconds
    created_at        TEXT NOT NULL,
    updated_at        TEXT
);

-- Strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS location_history (
    entity_id         TEXT PRIMARY KEY,   -- UUID v7, time-ordered
    vehicle_entity_id TEXT NOT NULL REFERENCES vehicles(entity_id),
    latitude          REAL NOT NULL,
    longitude         REAL NOT NULL,
    timestamp         INTEGER NOT NULL,
    created_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS points_of_interest (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    description TEXT,
    latitude    REAL NOT NULL,
    longitude   REAL NOT NULL,
    attributes  TEXT NOT NULL DEFAULT '{}',   -- JSON object
    created_at  TEXT NOT NULL,
    deleted_at  TEXT
);

-- Conditional-set-with-expiry cells backing the per-entity lock.
CREATE TABLE IF NOT EXISTS locks (
    key           TEXT PRIMARY KEY,
    token         TEXT NOT NULL,
    expires_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS history_vehicle_ts_idx
    ON location_history(vehicle_entity_id, timestamp);

PRAGMA user_version = 1;
";
