//! Embedded libSQL record store for leads and their enrichment logs.
//!
//! The [`Storage`] struct wraps a libSQL database holding a single mutable
//! `leads` table plus an append-only `enrichment_logs` list per lead.
//!
//! **Write semantics:** partial updates are read-modify-write
//! ([`Storage::update_lead`]), serialized within one process so concurrent
//! patches touching different fields all land. Across processes writers are
//! last-write-wins. Log appends are plain inserts and never clobber each other.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use leadlens_shared::{
    Diagnosis, EnrichmentLogEntry, Lead, LeadId, LeadLensError, LeadPatch, Result, SocialProfiles,
};
use libsql::{Connection, Database, params};
use tokio::sync::Mutex;

/// Column list shared by every lead query; order matches [`row_to_lead`].
const LEAD_COLUMNS: &str = "id, company_name, contact_name, email, location, industry, domain,
     enrichment_source, enrichment_confidence, domain_valid, domain_parked,
     domain_validation_reason, match_score, match_score_source, distance_miles,
     domain_relevance_score, industry_relevance_score, socials_json,
     contact_socials_json, diagnosis_json, current_stage, last_pipeline_ms,
     created_at, updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    /// Held across the read and write of [`Storage::update_lead`].
    patch_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeadLensError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LeadLensError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| LeadLensError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            patch_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        LeadLensError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Lead operations
    // -----------------------------------------------------------------------

    /// Insert a lead, or overwrite every column of an existing one.
    pub async fn upsert_lead(&self, lead: &Lead) -> Result<()> {

        let socials_json = to_json(&lead.socials)?;
        let contact_socials_json = to_json(&lead.contact_socials)?;
        let diagnosis_json = lead.diagnosis.as_ref().map(to_json).transpose()?;

        self.conn
            .execute(
                "INSERT INTO leads (id, company_name, contact_name, email, location, industry, domain,
                   enrichment_source, enrichment_confidence, domain_valid, domain_parked,
                   domain_validation_reason, match_score, match_score_source, distance_miles,
                   domain_relevance_score, industry_relevance_score, socials_json,
                   contact_socials_json, diagnosis_json, current_stage, last_pipeline_ms,
                   created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                         ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)
                 ON CONFLICT(id) DO UPDATE SET
                   company_name = excluded.company_name,
                   contact_name = excluded.contact_name,
                   email = excluded.email,
                   location = excluded.location,
                   industry = excluded.industry,
                   domain = excluded.domain,
                   enrichment_source = excluded.enrichment_source,
                   enrichment_confidence = excluded.enrichment_confidence,
                   domain_valid = excluded.domain_valid,
                   domain_parked = excluded.domain_parked,
                   domain_validation_reason = excluded.domain_validation_reason,
                   match_score = excluded.match_score,
                   match_score_source = excluded.match_score_source,
                   distance_miles = excluded.distance_miles,
                   domain_relevance_score = excluded.domain_relevance_score,
                   industry_relevance_score = excluded.industry_relevance_score,
                   socials_json = excluded.socials_json,
                   contact_socials_json = excluded.contact_socials_json,
                   diagnosis_json = excluded.diagnosis_json,
                   current_stage = excluded.current_stage,
                   last_pipeline_ms = excluded.last_pipeline_ms,
                   updated_at = excluded.updated_at",
                params![
                    lead.id.to_string(),
                    lead.company_name.as_str(),
                    lead.contact_name.as_deref(),
                    lead.email.as_deref(),
                    lead.location.as_deref(),
                    lead.industry.as_deref(),
                    lead.domain.as_deref(),
                    lead.enrichment_source.as_deref(),
                    lead.enrichment_confidence.map(i64::from),
                    lead.domain_valid.map(i64::from),
                    lead.domain_parked.map(i64::from),
                    lead.domain_validation_reason.as_deref(),
                    lead.match_score.map(i64::from),
                    lead.match_score_source.as_deref(),
                    lead.distance_miles,
                    lead.domain_relevance_score.map(i64::from),
                    lead.industry_relevance_score.map(i64::from),
                    socials_json,
                    contact_socials_json,
                    diagnosis_json,
                    lead.current_stage.as_deref(),
                    lead.last_pipeline_ms.map(|v| v as i64),
                    lead.created_at.to_rfc3339(),
                    lead.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| LeadLensError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a lead by ID.
    pub async fn get_lead(&self, id: &LeadId) -> Result<Option<Lead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(|e| LeadLensError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(LeadLensError::Storage(e.to_string())),
        }
    }

    /// List all leads, oldest first.
    pub async fn list_leads(&self) -> Result<Vec<Lead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads ORDER BY created_at, id");
        let mut rows = self
            .conn
            .query(&sql, params![])
            .await
            .map_err(|e| LeadLensError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_lead(&row)?);
        }
        Ok(results)
    }

    /// Apply a partial update and return the updated lead.
    ///
    /// Read-modify-write under the handle's patch lock. Full-row writes made
    /// through [`Storage::upsert_lead`] meanwhile are still last-write-wins.
    pub async fn update_lead(&self, id: &LeadId, patch: LeadPatch) -> Result<Lead> {
        let _guard = self.patch_lock.lock().await;
        let mut lead = self
            .get_lead(id)
            .await?
            .ok_or_else(|| LeadLensError::not_found(id))?;

        if patch.is_empty() {
            return Ok(lead);
        }

        lead.apply(patch);
        self.upsert_lead(&lead).await?;
        Ok(lead)
    }

    // -----------------------------------------------------------------------
    // Enrichment log operations
    // -----------------------------------------------------------------------

    /// Append an entry to a lead's enrichment log.
    pub async fn append_log(&self, lead_id: &LeadId, entry: &EnrichmentLogEntry) -> Result<()> {
        let entry_json = to_json(entry)?;
        self.conn
            .execute(
                "INSERT INTO enrichment_logs (lead_id, step, entry_json, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    lead_id.to_string(),
                    entry.step.as_str(),
                    entry_json,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| LeadLensError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All log entries for a lead, in insertion order.
    pub async fn list_logs(&self, lead_id: &LeadId) -> Result<Vec<EnrichmentLogEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT entry_json FROM enrichment_logs WHERE lead_id = ?1 ORDER BY id",
                params![lead_id.to_string()],
            )
            .await
            .map_err(|e| LeadLensError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let json: String = row
                .get(0)
                .map_err(|e| LeadLensError::Storage(e.to_string()))?;
            let entry = serde_json::from_str(&json)
                .map_err(|e| LeadLensError::parse(format!("invalid log entry: {e}")))?;
            results.push(entry);
        }
        Ok(results)
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| LeadLensError::Storage(e.to_string()))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LeadLensError::Storage(format!("invalid date: {e}")))
}

fn opt_u8(row: &libsql::Row, idx: i32) -> Option<u8> {
    row.get::<i64>(idx).ok().map(|v| v.clamp(0, 100) as u8)
}

fn opt_bool(row: &libsql::Row, idx: i32) -> Option<bool> {
    row.get::<i64>(idx).ok().map(|v| v != 0)
}

/// Convert a database row to a [`Lead`].
fn row_to_lead(row: &libsql::Row) -> Result<Lead> {
    let id: String = row
        .get(0)
        .map_err(|e| LeadLensError::Storage(e.to_string()))?;
    let socials: String = row
        .get(17)
        .map_err(|e| LeadLensError::Storage(e.to_string()))?;
    let contact_socials: String = row
        .get(18)
        .map_err(|e| LeadLensError::Storage(e.to_string()))?;
    let diagnosis: Option<String> = row.get::<String>(19).ok();
    let created_at: String = row
        .get(22)
        .map_err(|e| LeadLensError::Storage(e.to_string()))?;
    let updated_at: String = row
        .get(23)
        .map_err(|e| LeadLensError::Storage(e.to_string()))?;

    Ok(Lead {
        id: id
            .parse()
            .map_err(|e| LeadLensError::Storage(format!("invalid lead id {id}: {e}")))?,
        company_name: row
            .get::<String>(1)
            .map_err(|e| LeadLensError::Storage(e.to_string()))?,
        contact_name: row.get::<String>(2).ok(),
        email: row.get::<String>(3).ok(),
        location: row.get::<String>(4).ok(),
        industry: row.get::<String>(5).ok(),
        domain: row.get::<String>(6).ok(),
        enrichment_source: row.get::<String>(7).ok(),
        enrichment_confidence: opt_u8(row, 8),
        domain_valid: opt_bool(row, 9),
        domain_parked: opt_bool(row, 10),
        domain_validation_reason: row.get::<String>(11).ok(),
        match_score: opt_u8(row, 12),
        match_score_source: row.get::<String>(13).ok(),
        distance_miles: row.get::<f64>(14).ok(),
        domain_relevance_score: opt_u8(row, 15),
        industry_relevance_score: opt_u8(row, 16),
        socials: serde_json::from_str::<SocialProfiles>(&socials)
            .map_err(|e| LeadLensError::Storage(format!("invalid socials: {e}")))?,
        contact_socials: serde_json::from_str::<SocialProfiles>(&contact_socials)
            .map_err(|e| LeadLensError::Storage(format!("invalid contact socials: {e}")))?,
        diagnosis: diagnosis
            .map(|d| serde_json::from_str::<Diagnosis>(&d))
            .transpose()
            .map_err(|e| LeadLensError::Storage(format!("invalid diagnosis: {e}")))?,
        current_stage: row.get::<String>(20).ok(),
        last_pipeline_ms: row.get::<i64>(21).ok().map(|v| v.max(0) as u64),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
