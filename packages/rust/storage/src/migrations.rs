//! SQL migration definitions for the DealScout database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: source_configurations, extraction_runs, candidate_deals",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Saved search recipes
CREATE TABLE IF NOT EXISTS source_configurations (
    id                    TEXT PRIMARY KEY,
    name                  TEXT NOT NULL UNIQUE,
    source_type           TEXT NOT NULL,
    source_urls_json      TEXT NOT NULL,
    include_keywords_json TEXT NOT NULL,
    exclude_keywords_json TEXT NOT NULL,
    is_active             INTEGER NOT NULL DEFAULT 1,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL
);

-- One row per orchestrator run
CREATE TABLE IF NOT EXISTS extraction_runs (
    id          TEXT PRIMARY KEY,
    config_id   TEXT REFERENCES source_configurations(id) ON DELETE SET NULL,
    source_type TEXT NOT NULL,
    tier        TEXT NOT NULL,
    status      TEXT,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_started ON extraction_runs(started_at);

-- Candidates produced by a run, in run order
CREATE TABLE IF NOT EXISTS candidate_deals (
    id                    TEXT PRIMARY KEY,
    run_id                TEXT NOT NULL REFERENCES extraction_runs(id) ON DELETE CASCADE,
    position              INTEGER NOT NULL,
    fingerprint           TEXT NOT NULL,
    deal_name             TEXT NOT NULL,
    company_name          TEXT NOT NULL,
    amount                REAL NOT NULL,
    company_url           TEXT NOT NULL,
    contact_email         TEXT NOT NULL,
    notes                 TEXT NOT NULL,
    confidence_score      INTEGER,
    source_url            TEXT NOT NULL,
    matched_keywords_json TEXT NOT NULL,
    relevance_score       REAL,
    created_at            TEXT NOT NULL,
    UNIQUE(run_id, position)
);

CREATE INDEX IF NOT EXISTS idx_candidates_run ON candidate_deals(run_id);
CREATE INDEX IF NOT EXISTS idx_candidates_fingerprint ON candidate_deals(fingerprint);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Promoted deals",
            sql: r#"
CREATE TABLE IF NOT EXISTS deals (
    id           TEXT PRIMARY KEY,
    candidate_id TEXT REFERENCES candidate_deals(id) ON DELETE SET NULL,
    fingerprint  TEXT NOT NULL UNIQUE,
    deal_name    TEXT NOT NULL,
    company_name TEXT NOT NULL,
    amount       REAL NOT NULL,
    source_url   TEXT NOT NULL,
    stage        TEXT NOT NULL DEFAULT 'sourced',
    created_at   TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
