/// Table whose presence marks an initialised catalog.
pub const MARKER_TABLE: &str = "snapshots";

pub const TABLES: &[&str] = &[
    "hosts", "versions", "motds", "icons", "players", "snapshots", "liveness", "runs", "blacklist",
];

pub const SCHEMA_V1: &str = r#"
CREATE TABLE hosts (
  host_id         INTEGER PRIMARY KEY AUTOINCREMENT,
  address         TEXT NOT NULL UNIQUE
);

CREATE TABLE versions (
  version_id      INTEGER PRIMARY KEY AUTOINCREMENT,
  text            TEXT NOT NULL UNIQUE
);

CREATE TABLE motds (
  motd_id         INTEGER PRIMARY KEY AUTOINCREMENT,
  text            TEXT NOT NULL UNIQUE,
  plain           TEXT NOT NULL
);

CREATE TABLE icons (
  icon_id         INTEGER PRIMARY KEY AUTOINCREMENT,
  data            TEXT NOT NULL UNIQUE
);

CREATE TABLE players (
  player_id       INTEGER PRIMARY KEY AUTOINCREMENT,
  username        TEXT NOT NULL,
  uuid            TEXT NOT NULL UNIQUE,
  validity        TEXT NOT NULL DEFAULT 'waiting' CHECK (validity IN ('true','false','waiting'))
);

CREATE TABLE snapshots (
  snapshot_id     INTEGER PRIMARY KEY AUTOINCREMENT,
  host_id         INTEGER NOT NULL REFERENCES hosts(host_id),
  port            INTEGER NOT NULL CHECK (port BETWEEN 0 AND 65535),
  captured_at     REAL NOT NULL,
  players_online  INTEGER NOT NULL,
  players_max     INTEGER NOT NULL,
  version_id      INTEGER NOT NULL REFERENCES versions(version_id),
  protocol        INTEGER NOT NULL,
  motd_id         INTEGER NOT NULL REFERENCES motds(motd_id),
  player_ids      TEXT NOT NULL DEFAULT '[]',
  enforces_secure_chat INTEGER CHECK (enforces_secure_chat IN (0,1)),
  icon_id         INTEGER NOT NULL REFERENCES icons(icon_id),
  latency_ms      REAL NOT NULL
);

CREATE TABLE liveness (
  event_id        INTEGER PRIMARY KEY AUTOINCREMENT,
  snapshot_id     INTEGER NOT NULL REFERENCES snapshots(snapshot_id),
  online          INTEGER NOT NULL CHECK (online IN (0,1)),
  observed_at     REAL NOT NULL
);

CREATE TABLE runs (
  run_id          TEXT PRIMARY KEY,
  mode            TEXT NOT NULL CHECK (mode IN ('ingest','update','verify')),
  started_at      INTEGER NOT NULL,
  finished_at     INTEGER,
  tool_version    TEXT NOT NULL,
  endpoint_count  INTEGER DEFAULT 0,
  online_count    INTEGER DEFAULT 0,
  error_count     INTEGER DEFAULT 0
);

CREATE TABLE blacklist (
  address         TEXT NOT NULL,
  port            INTEGER NOT NULL CHECK (port BETWEEN 0 AND 65535),
  UNIQUE (address, port)
);

CREATE INDEX idx_snapshots_endpoint ON snapshots(host_id, port, snapshot_id);
CREATE INDEX idx_liveness_snapshot ON liveness(snapshot_id);
CREATE INDEX idx_players_validity ON players(validity);
"#;
