//! The record-store seam: one mutable lead row plus an append-only log.

use std::collections::HashMap;

use async_trait::async_trait;
use leadlens_shared::{EnrichmentLogEntry, Lead, LeadId, LeadLensError, LeadPatch, Result};
use leadlens_storage::Storage;
use tokio::sync::Mutex;

/// Lead persistence as seen by the pipeline.
///
/// Errors from a store are fatal to a pipeline run.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn get(&self, lead_id: &LeadId) -> Result<Lead>;
    async fn update(&self, lead_id: &LeadId, patch: LeadPatch) -> Result<Lead>;
    async fn append_log(&self, lead_id: &LeadId, entry: &EnrichmentLogEntry) -> Result<()>;
    /// Log entries in insertion order.
    async fn logs(&self, lead_id: &LeadId) -> Result<Vec<EnrichmentLogEntry>>;
}

#[async_trait]
impl LeadStore for Storage {
    async fn get(&self, lead_id: &LeadId) -> Result<Lead> {
        self.get_lead(lead_id)
            .await?
            .ok_or_else(|| LeadLensError::not_found(lead_id))
    }

    async fn update(&self, lead_id: &LeadId, patch: LeadPatch) -> Result<Lead> {
        self.update_lead(lead_id, patch).await
    }

    async fn append_log(&self, lead_id: &LeadId, entry: &EnrichmentLogEntry) -> Result<()> {
        Storage::append_log(self, lead_id, entry).await
    }

    async fn logs(&self, lead_id: &LeadId) -> Result<Vec<EnrichmentLogEntry>> {
        self.list_logs(lead_id).await
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    leads: HashMap<LeadId, Lead>,
    logs: HashMap<LeadId, Vec<EnrichmentLogEntry>>,
}

/// In-process store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, lead: Lead) {
        let mut state = self.state.lock().await;
        state.leads.insert(lead.id.clone(), lead);
    }

    /// Seed log entries (e.g. history from an earlier run).
    pub async fn seed_logs(&self, lead_id: &LeadId, entries: Vec<EnrichmentLogEntry>) {
        let mut state = self.state.lock().await;
        state.logs.entry(lead_id.clone()).or_default().extend(entries);
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn get(&self, lead_id: &LeadId) -> Result<Lead> {
        let state = self.state.lock().await;
        state
            .leads
            .get(lead_id)
            .cloned()
            .ok_or_else(|| LeadLensError::not_found(lead_id))
    }

    async fn update(&self, lead_id: &LeadId, patch: LeadPatch) -> Result<Lead> {
        let mut state = self.state.lock().await;
        let lead = state
            .leads
            .get_mut(lead_id)
            .ok_or_else(|| LeadLensError::not_found(lead_id))?;
        lead.apply(patch);
        Ok(lead.clone())
    }

    async fn append_log(&self, lead_id: &LeadId, entry: &EnrichmentLogEntry) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.leads.contains_key(lead_id) {
            return Err(LeadLensError::not_found(lead_id));
        }
        state
            .logs
            .entry(lead_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn logs(&self, lead_id: &LeadId) -> Result<Vec<EnrichmentLogEntry>> {
        let state = self.state.lock().await;
        Ok(state.logs.get(lead_id).cloned().unwrap_or_default())
    }
}
