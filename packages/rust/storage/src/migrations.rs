//! SQL migration definitions for the LeadLens database.
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
    vec![Migration {
        version: 1,
        description: "Initial schema: leads, enrichment_logs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One mutable row per lead
CREATE TABLE IF NOT EXISTS leads (
    id                       TEXT PRIMARY KEY,
    company_name             TEXT NOT NULL,
    contact_name             TEXT,
    email                    TEXT,
    location                 TEXT,
    industry                 TEXT,
    domain                   TEXT,
    enrichment_source        TEXT,
    enrichment_confidence    INTEGER,
    domain_valid             INTEGER,
    domain_parked            INTEGER,
    domain_validation_reason TEXT,
    match_score              INTEGER,
    match_score_source       TEXT,
    distance_miles           REAL,
    domain_relevance_score   INTEGER,
    industry_relevance_score INTEGER,
    socials_json             TEXT NOT NULL DEFAULT '{}',
    contact_socials_json     TEXT NOT NULL DEFAULT '{}',
    diagnosis_json           TEXT,
    current_stage            TEXT,
    last_pipeline_ms         INTEGER,
    created_at               TEXT NOT NULL,
    updated_at               TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_leads_domain ON leads(domain);

-- Append-only audit trail; rowid order is insertion order
CREATE TABLE IF NOT EXISTS enrichment_logs (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    lead_id    TEXT NOT NULL REFERENCES leads(id) ON DELETE CASCADE,
    step       TEXT NOT NULL,
    entry_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_enrichment_logs_lead ON enrichment_logs(lead_id, id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
