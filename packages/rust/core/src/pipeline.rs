//! Lead enrichment pipeline: discovery → validation → fallback → scoring →
//! social search → conditional deep enrichment.
//!
//! A contact-enrichment track and company enrichment run as spawned tasks
//! alongside the main track and are joined before the run finishes. Progress
//! is streamed as [`PipelineEvent`]s; the run's result is a [`PipelineReport`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use leadlens_discovery::{AttemptOutcome, DiscoveryQuery};
use leadlens_shared::{
    Coordinates, Diagnosis, EnrichmentLogEntry, Lead, LeadId, LeadPatch, LogStep, MatchScore,
    Notification, PipelineConfig, Result, Severity, SocialNetwork, SocialProfile, SocialProfiles,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::collaborators::{Collaborators, CompanyProfile, LeadContext, SoftError, bounded};
use crate::events::{EventSink, PipelineEvent, PipelineOutcome, Stage};
use crate::fallback::{FallbackSelector, validate_within, validation_entry};
use crate::geo::distance_miles;
use crate::score::{ScoreInputs, calculate_match_score, rejected_domain_score, score_for_lead};
use crate::store::LeadStore;

/// Headlines kept in a `news` log entry.
const NEWS_HEADLINES_LOGGED: usize = 5;

// ---------------------------------------------------------------------------
// Settings and report
// ---------------------------------------------------------------------------

/// Tunables for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Upper bound on any single collaborator call.
    pub call_timeout: Duration,
    /// Scores strictly above this run deep enrichment.
    pub deep_enrichment_threshold: u8,
    /// Where distances are measured from.
    pub business_location: Option<Coordinates>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            call_timeout: config.call_timeout(),
            deep_enrichment_threshold: config.deep_enrichment_threshold,
            business_location: config.business_location,
        }
    }
}

/// A stage that failed softly: logged, skipped, run continued.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoftFailure {
    pub stage: Stage,
    pub error: String,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub lead_id: LeadId,
    pub outcome: PipelineOutcome,
    /// Working domain at the end of the run.
    pub domain: Option<String>,
    pub domain_validated: bool,
    pub domain_swapped: bool,
    pub match_score: Option<MatchScore>,
    pub socials_searched: bool,
    pub socials_found: usize,
    pub diagnosis: Option<Diagnosis>,
    pub soft_failures: Vec<SoftFailure>,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Transient state for one run; everything durable goes through the store.
struct PipelineRun {
    lead_id: LeadId,
    events: EventSink,
    domain_validated: bool,
    socials_searched: bool,
    working_domain: Option<String>,
    domain_swapped: bool,
    score: Option<MatchScore>,
    socials_found: usize,
    diagnosis: Option<Diagnosis>,
    failures: Vec<SoftFailure>,
    background: Vec<(Stage, JoinHandle<Vec<SoftFailure>>)>,
}

impl PipelineRun {
    fn new(lead_id: LeadId, events: EventSink) -> Self {
        Self {
            lead_id,
            events,
            domain_validated: false,
            socials_searched: false,
            working_domain: None,
            domain_swapped: false,
            score: None,
            socials_found: 0,
            diagnosis: None,
            failures: Vec::new(),
            background: Vec::new(),
        }
    }

    fn note_failure(&mut self, stage: Stage, error: String) {
        self.events.emit(PipelineEvent::StageFailed {
            lead_id: self.lead_id.clone(),
            stage,
            error: error.clone(),
        });
        self.failures.push(SoftFailure { stage, error });
    }

    fn report(&self, outcome: PipelineOutcome, elapsed: Duration) -> PipelineReport {
        PipelineReport {
            lead_id: self.lead_id.clone(),
            outcome,
            domain: self.working_domain.clone(),
            domain_validated: self.domain_validated,
            domain_swapped: self.domain_swapped,
            match_score: self.score.clone(),
            socials_searched: self.socials_searched,
            socials_found: self.socials_found,
            diagnosis: self.diagnosis.clone(),
            soft_failures: self.failures.clone(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// State shared with spawned tasks.
struct Shared {
    store: Arc<dyn LeadStore>,
    collab: Collaborators,
    settings: PipelineSettings,
}

impl Shared {
    /// Log a soft failure as a `failed` entry for `step` and announce it.
    async fn soft_failure(
        &self,
        lead_id: &LeadId,
        events: &EventSink,
        stage: Stage,
        step: LogStep,
        error: &SoftError,
    ) -> Result<SoftFailure> {
        warn!(%lead_id, %stage, %error, "stage failed; continuing");
        let entry = EnrichmentLogEntry::new(step, "failed", stage.as_str())
            .with_detail("error", error.to_string());
        self.store.append_log(lead_id, &entry).await?;
        events.emit(PipelineEvent::StageFailed {
            lead_id: lead_id.clone(),
            stage,
            error: error.to_string(),
        });
        Ok(SoftFailure {
            stage,
            error: error.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs the enrichment pipeline for one lead at a time per lead id.
pub struct Orchestrator {
    shared: Arc<Shared>,
    /// One async mutex per lead with a run in flight.
    locks: StdMutex<HashMap<LeadId, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn LeadStore>,
        collab: Collaborators,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                collab,
                settings,
            }),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.shared.settings
    }

    /// Run the pipeline for `lead_id`.
    ///
    /// A second run for the same lead waits for the first to finish. Soft
    /// failures are collected in the report; a store failure aborts the run,
    /// sends a "Pipeline Failed" notification, and is returned after the
    /// finalizer (duration + stage reset) has run.
    #[instrument(skip_all, fields(lead_id = %lead_id))]
    pub async fn run(
        &self,
        lead_id: &LeadId,
        events: Option<UnboundedSender<PipelineEvent>>,
    ) -> Result<PipelineReport> {
        let lock = self.lead_lock(lead_id);
        let _guard = lock.lock().await;

        let start = Instant::now();
        let mut run = PipelineRun::new(lead_id.clone(), EventSink::new(events));
        info!("starting enrichment pipeline");

        let result = self.execute(&mut run).await;

        // Finalizer: every path ends here.
        self.join_background(&mut run).await;
        let elapsed = start.elapsed();
        self.finalize(&run, elapsed, &result).await;

        match result {
            Ok(outcome) => {
                let report = run.report(outcome, elapsed);
                info!(
                    outcome = ?report.outcome,
                    domain = report.domain.as_deref().unwrap_or("-"),
                    score = report.match_score.as_ref().map(|s| s.score),
                    soft_failures = report.soft_failures.len(),
                    elapsed_ms = report.elapsed_ms,
                    "enrichment pipeline complete"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "enrichment pipeline failed");
                Err(e)
            }
        }
    }

    fn lead_lock(&self, lead_id: &LeadId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Drop locks no run holds any more.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(lead_id.clone()).or_default())
    }

    async fn execute(&self, run: &mut PipelineRun) -> Result<PipelineOutcome> {
        let s = Arc::clone(&self.shared);
        let mut lead = s.store.get(&run.lead_id).await?;

        // Domain-derived fields from an earlier run must not leak into this one.
        s.store.update(&run.lead_id, LeadPatch::clear_domain()).await?;
        lead.apply(LeadPatch::clear_domain());
        let ctx = LeadContext::from(&lead);

        // --- Stage 1: Contact track (concurrent) ---
        let track = tokio::spawn(contact_track(
            Arc::clone(&s),
            ctx.clone(),
            run.events.clone(),
        ));
        run.background.push((Stage::ContactTrack, track));

        // --- Stage 2: Domain discovery ---
        self.enter(run, Stage::Discovery).await?;
        let discovery = s.collab.discovery.run(&DiscoveryQuery::from_lead(&lead)).await;
        for attempt in &discovery.attempts {
            s.store
                .append_log(&run.lead_id, &attempt.to_log_entry())
                .await?;
            if let AttemptOutcome::Failed(error) = &attempt.outcome {
                run.note_failure(Stage::Discovery, format!("{}: {error}", attempt.adapter));
            }
        }

        // --- Stage 3: No domain ---
        let Some(candidate) = discovery.best else {
            return self.no_domain(run, &lead, &ctx).await;
        };

        info!(
            domain = %candidate.domain,
            source = %candidate.source,
            confidence = candidate.confidence,
            "domain discovered"
        );
        let patch = LeadPatch {
            domain: Some(Some(candidate.domain.clone())),
            enrichment_source: Some(Some(candidate.source.clone())),
            enrichment_confidence: Some(Some(candidate.confidence)),
            ..LeadPatch::default()
        };
        s.store.update(&run.lead_id, patch).await?;
        run.working_domain = Some(candidate.domain.clone());
        let ctx = ctx.with_domain(Some(candidate.domain.as_str()));

        // --- Stage 4: Company enrichment (concurrent) + validation ---
        let company = tokio::spawn(company_enrichment(
            Arc::clone(&s),
            ctx.clone(),
            run.events.clone(),
        ));
        run.background.push((Stage::CompanyEnrichment, company));

        self.enter(run, Stage::Validation).await?;
        let validation = validate_within(
            s.collab.validator.as_ref(),
            &candidate.domain,
            s.settings.call_timeout,
        )
        .await;
        s.store
            .update(&run.lead_id, LeadPatch::validation(&validation))
            .await?;
        s.store
            .append_log(&run.lead_id, &validation_entry(&validation))
            .await?;
        run.domain_validated = true;

        // --- Stage 5: Fallback ---
        let usable = if validation.is_usable() {
            Some(candidate.domain.clone())
        } else {
            info!(reason = %validation.reason, parked = validation.is_parked, "domain rejected");
            self.fallback(run, &candidate.domain, validation.is_parked)
                .await?
        };

        // --- Stage 6: Geocode, relevance, score ---
        let ctx = ctx.with_domain(run.working_domain.as_deref());
        if let Some(domain) = &usable {
            self.score_domain(run, &ctx, domain).await?;
        }

        // --- Stage 7: Social track ---
        self.social_track(run, &ctx).await?;

        // --- Stage 8: Branch on score ---
        let score = run.score.as_ref().map(|m| m.score).unwrap_or(0);
        let outcome = if score > s.settings.deep_enrichment_threshold {
            self.deep_enrichment(run, &ctx).await?;
            PipelineOutcome::FullComplete
        } else {
            debug!(score, "score at or below deep-enrichment threshold");
            PipelineOutcome::Partial
        };

        self.join_background(run).await;
        Ok(outcome)
    }

    /// No domain discovered: low score, socials, diagnosis.
    async fn no_domain(
        &self,
        run: &mut PipelineRun,
        lead: &Lead,
        ctx: &LeadContext,
    ) -> Result<PipelineOutcome> {
        info!("no domain discovered");

        self.enter(run, Stage::Scoring).await?;
        let score = calculate_match_score(&ScoreInputs::without_domain(lead));
        self.record_score(run, score).await?;

        self.social_track(run, ctx).await?;
        self.diagnose(run, ctx).await?;

        self.join_background(run).await;
        Ok(PipelineOutcome::NoDomain)
    }

    /// Search the log for a replacement domain. Returns the new working
    /// domain, or records the rejection score and returns `None`.
    async fn fallback(
        &self,
        run: &mut PipelineRun,
        rejected: &str,
        parked: bool,
    ) -> Result<Option<String>> {
        let s = &self.shared;
        self.enter(run, Stage::Fallback).await?;

        let log = s.store.logs(&run.lead_id).await?;
        let selector = FallbackSelector::new(
            s.store.as_ref(),
            s.collab.validator.as_ref(),
            s.settings.call_timeout,
        );
        let outcome = selector
            .find_fallback(&run.lead_id, rejected, &log, &[])
            .await?;

        match outcome.domain {
            Some(domain) if outcome.success => {
                run.events.emit(PipelineEvent::DomainSwapped {
                    lead_id: run.lead_id.clone(),
                    from: rejected.to_string(),
                    to: domain.clone(),
                });
                run.working_domain = Some(domain.clone());
                run.domain_swapped = true;
                Ok(Some(domain))
            }
            _ => {
                self.enter(run, Stage::Scoring).await?;
                self.record_score(run, rejected_domain_score(parked)).await?;
                Ok(None)
            }
        }
    }

    /// Geocode, distance, textual relevance, then the match score.
    async fn score_domain(
        &self,
        run: &mut PipelineRun,
        ctx: &LeadContext,
        domain: &str,
    ) -> Result<()> {
        let s = Arc::clone(&self.shared);
        let limit = s.settings.call_timeout;

        self.enter(run, Stage::Geocode).await?;
        match bounded(limit, s.collab.geocoder.geocode(domain, ctx)).await {
            Ok(Some(coords)) => {
                let mut entry = EnrichmentLogEntry::new(LogStep::Geocode, "found", "geocoder")
                    .with_detail("lat", coords.lat)
                    .with_detail("lon", coords.lon);
                match s.settings.business_location {
                    Some(home) => {
                        let miles = distance_miles(coords, home);
                        entry = entry.with_detail("distance_miles", miles);
                        let patch = LeadPatch {
                            distance_miles: Some(Some(miles)),
                            ..LeadPatch::default()
                        };
                        s.store.update(&run.lead_id, patch).await?;
                    }
                    None => debug!("no business location configured; distance not computed"),
                }
                s.store.append_log(&run.lead_id, &entry).await?;
            }
            Ok(None) => {
                let entry = EnrichmentLogEntry::new(LogStep::Geocode, "not_found", "geocoder");
                s.store.append_log(&run.lead_id, &entry).await?;
            }
            Err(e) => {
                let failure = s
                    .soft_failure(&run.lead_id, &run.events, Stage::Geocode, LogStep::Geocode, &e)
                    .await?;
                run.failures.push(failure);
            }
        }

        self.enter(run, Stage::Relevance).await?;
        match bounded(limit, s.collab.relevance.domain_relevance(ctx, domain)).await {
            Ok(relevance) => {
                let relevance = relevance.min(100);
                let patch = LeadPatch {
                    domain_relevance_score: Some(Some(relevance)),
                    ..LeadPatch::default()
                };
                s.store.update(&run.lead_id, patch).await?;
                let entry =
                    EnrichmentLogEntry::new(LogStep::DomainRelevance, "scored", "relevance_scorer")
                        .with_detail("score", relevance);
                s.store.append_log(&run.lead_id, &entry).await?;
            }
            Err(e) => {
                let failure = s
                    .soft_failure(
                        &run.lead_id,
                        &run.events,
                        Stage::Relevance,
                        LogStep::DomainRelevance,
                        &e,
                    )
                    .await?;
                run.failures.push(failure);
            }
        }

        // Re-read so concurrent writers (company enrichment) are visible.
        self.enter(run, Stage::Scoring).await?;
        let lead = s.store.get(&run.lead_id).await?;
        self.record_score(run, score_for_lead(&lead)).await
    }

    async fn record_score(&self, run: &mut PipelineRun, score: MatchScore) -> Result<()> {
        let s = &self.shared;
        s.store
            .update(&run.lead_id, LeadPatch::score(&score))
            .await?;
        let entry = EnrichmentLogEntry::new(LogStep::MatchScore, "computed", &score.source)
            .with_detail("score", score.score);
        s.store.append_log(&run.lead_id, &entry).await?;

        info!(score = score.score, source = %score.source, "match score recorded");
        run.events.emit(PipelineEvent::ScoreComputed {
            lead_id: run.lead_id.clone(),
            score: score.clone(),
        });
        run.score = Some(score);
        Ok(())
    }

    /// Search all networks concurrently, then validate what was found.
    async fn social_track(&self, run: &mut PipelineRun, ctx: &LeadContext) -> Result<()> {
        let s = Arc::clone(&self.shared);
        let limit = s.settings.call_timeout;
        let search = s.collab.social_search.as_ref();

        self.enter(run, Stage::SocialSearch).await?;
        let (linkedin, facebook, instagram) = tokio::join!(
            bounded(limit, search.search(SocialNetwork::Linkedin, ctx)),
            bounded(limit, search.search(SocialNetwork::Facebook, ctx)),
            bounded(limit, search.search(SocialNetwork::Instagram, ctx)),
        );

        let mut found = SocialProfiles::default();
        let results = [linkedin, facebook, instagram];
        for (network, result) in SocialNetwork::ALL.into_iter().zip(results) {
            match result {
                Ok(Some(url)) => {
                    let entry =
                        EnrichmentLogEntry::new(LogStep::SocialSearch, "found", "social_search")
                            .with_detail("network", network.as_str())
                            .with_detail("url", url.as_str());
                    s.store.append_log(&run.lead_id, &entry).await?;
                    found.set(network, Some(SocialProfile::unvalidated(url)));
                }
                Ok(None) => {
                    let entry =
                        EnrichmentLogEntry::new(LogStep::SocialSearch, "not_found", "social_search")
                            .with_detail("network", network.as_str());
                    s.store.append_log(&run.lead_id, &entry).await?;
                }
                Err(e) => {
                    let failure = s
                        .soft_failure(
                            &run.lead_id,
                            &run.events,
                            Stage::SocialSearch,
                            LogStep::SocialSearch,
                            &SoftError::Unavailable(format!("{network}: {e}")),
                        )
                        .await?;
                    run.failures.push(failure);
                }
            }
        }

        if !found.is_empty() {
            self.enter(run, Stage::SocialValidation).await?;
            match bounded(limit, s.collab.social_validator.validate(ctx, &found)).await {
                Ok(verdicts) => {
                    for network in SocialNetwork::ALL {
                        if let Some(profile) = found.get(network).cloned() {
                            let validated = verdicts.get(network).and_then(|p| p.validated);
                            found.set(network, Some(SocialProfile { validated, ..profile }));
                        }
                    }
                    let valid = SocialNetwork::ALL
                        .iter()
                        .filter(|n| found.get(**n).and_then(|p| p.validated) == Some(true))
                        .count();
                    let entry = EnrichmentLogEntry::new(
                        LogStep::SocialValidation,
                        "validated",
                        "social_validator",
                    )
                    .with_detail("found", found.found_count())
                            .with_detail("valid", valid);
                    s.store.append_log(&run.lead_id, &entry).await?;
                }
                Err(e) => {
                    let failure = s
                        .soft_failure(
                            &run.lead_id,
                            &run.events,
                            Stage::SocialValidation,
                            LogStep::SocialValidation,
                            &e,
                        )
                        .await?;
                    run.failures.push(failure);
                }
            }

            // Networks not found this time keep their earlier profile.
            let mut socials = s.store.get(&run.lead_id).await?.socials;
            for network in SocialNetwork::ALL {
                if let Some(profile) = found.get(network) {
                    socials.set(network, Some(profile.clone()));
                }
            }
            let patch = LeadPatch {
                socials: Some(socials),
                ..LeadPatch::default()
            };
            s.store.update(&run.lead_id, patch).await?;
        }

        run.socials_found = found.found_count();
        run.socials_searched = true;
        Ok(())
    }

    /// Deep company enrichment, contact discovery, then news, in order.
    async fn deep_enrichment(&self, run: &mut PipelineRun, ctx: &LeadContext) -> Result<()> {
        let s = Arc::clone(&self.shared);
        let limit = s.settings.call_timeout;

        self.enter(run, Stage::DeepEnrichment).await?;
        match bounded(limit, s.collab.company.deep_enrich(ctx)).await {
            Ok(profile) => {
                let patch = company_patch(&profile);
                if !patch.is_empty() {
                    s.store.update(&run.lead_id, patch).await?;
                }
                let entry = company_entry(LogStep::DeepEnrichment, &profile);
                s.store.append_log(&run.lead_id, &entry).await?;
            }
            Err(e) => {
                let failure = s
                    .soft_failure(
                        &run.lead_id,
                        &run.events,
                        Stage::DeepEnrichment,
                        LogStep::DeepEnrichment,
                        &e,
                    )
                    .await?;
                run.failures.push(failure);
            }
        }

        self.enter(run, Stage::ContactDiscovery).await?;
        match bounded(limit, s.collab.contacts.discover_contacts(ctx)).await {
            Ok(contacts) => {
                let names: Vec<String> = contacts.iter().filter_map(|c| c.name.clone()).collect();
                let entry = EnrichmentLogEntry::new(
                    LogStep::ContactDiscovery,
                    "completed",
                    "contact_finder",
                )
                .with_detail("count", contacts.len())
                .with_detail("names", names);
                s.store.append_log(&run.lead_id, &entry).await?;
            }
            Err(e) => {
                let failure = s
                    .soft_failure(
                        &run.lead_id,
                        &run.events,
                        Stage::ContactDiscovery,
                        LogStep::ContactDiscovery,
                        &e,
                    )
                    .await?;
                run.failures.push(failure);
            }
        }

        self.enter(run, Stage::News).await?;
        match bounded(limit, s.collab.news.news(ctx)).await {
            Ok(items) => {
                let headlines: Vec<String> = items
                    .iter()
                    .take(NEWS_HEADLINES_LOGGED)
                    .map(|n| n.title.clone())
                    .collect();
                let entry = EnrichmentLogEntry::new(LogStep::News, "completed", "news")
                    .with_detail("count", items.len())
                    .with_detail("headlines", headlines);
                s.store.append_log(&run.lead_id, &entry).await?;
            }
            Err(e) => {
                let failure = s
                    .soft_failure(&run.lead_id, &run.events, Stage::News, LogStep::News, &e)
                    .await?;
                run.failures.push(failure);
            }
        }
        Ok(())
    }

    async fn diagnose(&self, run: &mut PipelineRun, ctx: &LeadContext) -> Result<()> {
        let s = Arc::clone(&self.shared);
        self.enter(run, Stage::Diagnosis).await?;

        let logs = s.store.logs(&run.lead_id).await?;
        match bounded(s.settings.call_timeout, s.collab.diagnoser.diagnose(ctx, &logs)).await {
            Ok(diagnosis) => {
                let patch = LeadPatch {
                    diagnosis: Some(Some(diagnosis.clone())),
                    ..LeadPatch::default()
                };
                s.store.update(&run.lead_id, patch).await?;
                let entry = EnrichmentLogEntry::new(LogStep::Diagnosis, "completed", "diagnoser")
                    .with_detail("category", diagnosis.category.as_str());
                s.store.append_log(&run.lead_id, &entry).await?;
                info!(category = %diagnosis.category, "failure diagnosed");
                run.diagnosis = Some(diagnosis);
            }
            Err(e) => {
                let failure = s
                    .soft_failure(
                        &run.lead_id,
                        &run.events,
                        Stage::Diagnosis,
                        LogStep::Diagnosis,
                        &e,
                    )
                    .await?;
                run.failures.push(failure);
            }
        }
        Ok(())
    }

    /// Mark `stage` as current on the lead and announce it.
    async fn enter(&self, run: &PipelineRun, stage: Stage) -> Result<()> {
        debug!(%stage, "entering stage");
        self.shared
            .store
            .update(&run.lead_id, LeadPatch::stage(Some(stage.as_str())))
            .await?;
        run.events.emit(PipelineEvent::StageStarted {
            lead_id: run.lead_id.clone(),
            stage,
        });
        Ok(())
    }

    /// Await every spawned task and collect its soft failures.
    async fn join_background(&self, run: &mut PipelineRun) {
        for (stage, handle) in std::mem::take(&mut run.background) {
            match handle.await {
                Ok(failures) => run.failures.extend(failures),
                Err(e) => {
                    warn!(%stage, error = %e, "background task did not complete");
                    run.note_failure(stage, format!("task aborted: {e}"));
                }
            }
        }
    }

    /// Record duration, clear the stage, notify. Never fails.
    async fn finalize(
        &self,
        run: &PipelineRun,
        elapsed: Duration,
        result: &Result<PipelineOutcome>,
    ) {
        let s = &self.shared;
        let elapsed_ms = elapsed.as_millis() as u64;

        let patch = LeadPatch {
            current_stage: Some(None),
            last_pipeline_ms: Some(Some(elapsed_ms)),
            ..LeadPatch::default()
        };
        if let Err(e) = s.store.update(&run.lead_id, patch).await {
            warn!(error = %e, "could not record pipeline duration");
        }

        let (notification, entry) = match result {
            Ok(outcome) => (
                Notification {
                    title: outcome.title().to_string(),
                    description: summary(run, *outcome, elapsed_ms),
                    severity: match outcome {
                        PipelineOutcome::FullComplete => Severity::Success,
                        PipelineOutcome::NoDomain => Severity::Warning,
                        PipelineOutcome::Partial => Severity::Info,
                    },
                },
                EnrichmentLogEntry::new(LogStep::Pipeline, "completed", "orchestrator")
                    .with_detail("outcome", outcome.as_str())
                    .with_detail("elapsed_ms", elapsed_ms),
            ),
            Err(e) => (
                Notification {
                    title: "Pipeline Failed".to_string(),
                    description: e.to_string(),
                    severity: Severity::Error,
                },
                EnrichmentLogEntry::new(LogStep::Pipeline, "failed", "orchestrator")
                    .with_detail("error", e.to_string())
                    .with_detail("elapsed_ms", elapsed_ms),
            ),
        };

        if let Err(e) = s.store.append_log(&run.lead_id, &entry).await {
            warn!(error = %e, "could not log pipeline result");
        }
        let sent = bounded(s.settings.call_timeout, s.collab.notifier.notify(&notification)).await;
        if let Err(e) = sent {
            debug!(error = %e, "notification dropped");
        }

        run.events
            .finished(&run.lead_id, result.as_ref().ok().copied(), elapsed);
    }
}

fn summary(run: &PipelineRun, outcome: PipelineOutcome, elapsed_ms: u64) -> String {
    let domain = run.working_domain.as_deref().unwrap_or("no domain");
    let score = run
        .score
        .as_ref()
        .map(|s| format!("{} ({})", s.score, s.source))
        .unwrap_or_else(|| "unscored".to_string());
    let mut text = format!(
        "{domain}, score {score}, {} social profile(s), {:.1}s",
        run.socials_found,
        elapsed_ms as f64 / 1000.0
    );
    if run.domain_swapped {
        text.push_str(", fallback domain applied");
    }
    if !run.failures.is_empty() {
        text.push_str(&format!(", {} stage(s) degraded", run.failures.len()));
    }
    if outcome == PipelineOutcome::NoDomain {
        if let Some(d) = &run.diagnosis {
            text.push_str(&format!(", diagnosis: {}", d.category));
        }
    }
    text
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

fn company_patch(profile: &CompanyProfile) -> LeadPatch {
    LeadPatch {
        industry: profile.industry.clone().map(Some),
        industry_relevance_score: profile
            .industry_relevance_score
            .map(|score| Some(score.min(100))),
        ..LeadPatch::default()
    }
}

fn company_entry(step: LogStep, profile: &CompanyProfile) -> EnrichmentLogEntry {
    let mut entry = EnrichmentLogEntry::new(step, "completed", "company_enricher");
    if let Some(industry) = &profile.industry {
        entry = entry.with_detail("industry", industry.as_str());
    }
    if let Some(score) = profile.industry_relevance_score {
        entry = entry.with_detail("industry_relevance_score", score);
    }
    if let Some(count) = profile.employee_count {
        entry = entry.with_detail("employee_count", count);
    }
    entry
}

/// Contact track: look up the contact person, store their socials, and
/// forward a LinkedIn profile to the CRM. Never fails the run.
async fn contact_track(
    shared: Arc<Shared>,
    ctx: LeadContext,
    events: EventSink,
) -> Vec<SoftFailure> {
    let mut failures = Vec::new();
    if let Err(e) = run_contact_track(&shared, &ctx, &events, &mut failures).await {
        warn!(lead_id = %ctx.lead_id, error = %e, "contact track could not persist results");
        failures.push(SoftFailure {
            stage: Stage::ContactTrack,
            error: e.to_string(),
        });
    }
    failures
}

async fn run_contact_track(
    shared: &Shared,
    ctx: &LeadContext,
    events: &EventSink,
    failures: &mut Vec<SoftFailure>,
) -> Result<()> {
    let lead_id = &ctx.lead_id;
    let limit = shared.settings.call_timeout;

    if ctx.email.as_deref().is_none_or(|e| e.trim().is_empty()) {
        let entry = EnrichmentLogEntry::new(LogStep::ContactEnrichment, "skipped", "contact_finder")
            .with_detail("reason", "no email");
        return shared.store.append_log(lead_id, &entry).await;
    }

    events.emit(PipelineEvent::StageStarted {
        lead_id: lead_id.clone(),
        stage: Stage::ContactTrack,
    });

    let contact = match bounded(limit, shared.collab.contacts.find_contact(ctx)).await {
        Ok(contact) => contact,
        Err(e) => {
            let failure = shared
                .soft_failure(lead_id, events, Stage::ContactTrack, LogStep::ContactEnrichment, &e)
                .await?;
            failures.push(failure);
            return Ok(());
        }
    };

    if !contact.socials.is_empty() {
        let patch = LeadPatch {
            contact_socials: Some(contact.socials.clone()),
            ..LeadPatch::default()
        };
        shared.store.update(lead_id, patch).await?;
    }
    let entry = EnrichmentLogEntry::new(LogStep::ContactEnrichment, "found", "contact_finder")
        .with_detail("socials", contact.socials.found_count());
    shared.store.append_log(lead_id, &entry).await?;

    let Some(linkedin) = contact.socials.linkedin.as_ref() else {
        return Ok(());
    };
    match bounded(limit, shared.collab.crm.sync_contact(ctx, &linkedin.url)).await {
        Ok(()) => {
            let entry = EnrichmentLogEntry::new(LogStep::CrmSync, "synced", "crm")
                .with_detail("linkedin", linkedin.url.as_str());
            shared.store.append_log(lead_id, &entry).await?;
        }
        Err(e) => {
            let failure = shared
                .soft_failure(lead_id, events, Stage::ContactTrack, LogStep::CrmSync, &e)
                .await?;
            failures.push(failure);
        }
    }
    Ok(())
}

/// Company enrichment for the discovered domain; persists its own results.
async fn company_enrichment(
    shared: Arc<Shared>,
    ctx: LeadContext,
    events: EventSink,
) -> Vec<SoftFailure> {
    let mut failures = Vec::new();
    if let Err(e) = run_company_enrichment(&shared, &ctx, &events, &mut failures).await {
        warn!(lead_id = %ctx.lead_id, error = %e, "company enrichment could not persist results");
        failures.push(SoftFailure {
            stage: Stage::CompanyEnrichment,
            error: e.to_string(),
        });
    }
    failures
}

async fn run_company_enrichment(
    shared: &Shared,
    ctx: &LeadContext,
    events: &EventSink,
    failures: &mut Vec<SoftFailure>,
) -> Result<()> {
    let lead_id = &ctx.lead_id;
    events.emit(PipelineEvent::StageStarted {
        lead_id: lead_id.clone(),
        stage: Stage::CompanyEnrichment,
    });

    match bounded(shared.settings.call_timeout, shared.collab.company.enrich_company(ctx)).await {
        Ok(profile) => {
            let patch = company_patch(&profile);
            if !patch.is_empty() {
                shared.store.update(lead_id, patch).await?;
            }
            let entry = company_entry(LogStep::CompanyEnrichment, &profile);
            shared.store.append_log(lead_id, &entry).await?;
        }
        Err(e) => {
            let failure = shared
                .soft_failure(
                    lead_id,
                    events,
                    Stage::CompanyEnrichment,
                    LogStep::CompanyEnrichment,
                    &e,
                )
                .await?;
            failures.push(failure);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use leadlens_shared::{DomainCandidate, LeadLensError, score_sources, sources};
    use tokio::sync::mpsc;

    use super::*;
    use crate::collaborators::ContactProfile;
    use crate::store::MemoryStore;
    use crate::testing::{Fakes, ScriptedValidator, candidate, collaborators};

    const HOME: Coordinates = Coordinates {
        lat: 44.9778,
        lon: -93.2650,
    };

    fn settings() -> PipelineSettings {
        PipelineSettings {
            call_timeout: Duration::from_millis(500),
            deep_enrichment_threshold: 50,
            business_location: Some(HOME),
        }
    }

    fn found(domain: &str, confidence: u8, source: &str) -> EnrichmentLogEntry {
        EnrichmentLogEntry::new(LogStep::DiscoverDomain, "found", source)
            .with_domain(domain)
            .with_confidence(confidence)
    }

    async fn store_with(lead: Lead) -> (Arc<MemoryStore>, LeadId) {
        let store = Arc::new(MemoryStore::new());
        let id = lead.id.clone();
        store.insert(lead).await;
        (store, id)
    }

    fn orchestrator(
        store: &Arc<MemoryStore>,
        fakes: &Arc<Fakes>,
        validator: &Arc<ScriptedValidator>,
        discovered: Option<DomainCandidate>,
        settings: PipelineSettings,
    ) -> Orchestrator {
        let store: Arc<dyn LeadStore> = store.clone();
        Orchestrator::new(store, collaborators(fakes, validator.clone(), discovered), settings)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn verified_email_domain_runs_full_pipeline() {
        let mut lead = Lead::new("Acme");
        lead.email = Some("jane@acme.com".into());
        let (store, id) = store_with(lead).await;

        let fakes = Arc::new(Fakes {
            contact: ContactProfile {
                name: Some("Jane Doe".into()),
                socials: SocialProfiles {
                    linkedin: Some(SocialProfile::unvalidated("https://linkedin.com/in/janedoe")),
                    ..SocialProfiles::default()
                },
                ..ContactProfile::default()
            },
            socials: [(SocialNetwork::Linkedin, "https://linkedin.com/company/acme".to_string())]
                .into_iter()
                .collect(),
            ..Fakes::default()
        });
        let validator = Arc::new(ScriptedValidator::default().with("acme.com", true, false));
        let orch = orchestrator(
            &store,
            &fakes,
            &validator,
            Some(candidate("acme.com", 95, sources::EMAIL_DOMAIN_VERIFIED)),
            settings(),
        );

        let report = orch.run(&id, None).await.unwrap();

        assert_eq!(report.outcome, PipelineOutcome::FullComplete);
        assert_eq!(report.match_score, Some(MatchScore::new(99, score_sources::EMAIL_DOMAIN)));
        assert!(report.domain_validated);
        assert!(report.socials_searched);
        assert_eq!(report.socials_found, 1);
        assert!(report.soft_failures.is_empty());

        for call in ["deep_enrich", "discover_contacts", "news", "find_contact", "crm_sync"] {
            assert_eq!(fakes.count(call), 1, "{call}");
        }
        assert_eq!(fakes.count("social_search"), 3);

        let lead = store.get(&id).await.unwrap();
        assert_eq!(lead.domain.as_deref(), Some("acme.com"));
        assert_eq!(lead.match_score, Some(99));
        assert_eq!(lead.domain_valid, Some(true));
        assert_eq!(lead.current_stage, None);
        assert!(lead.last_pipeline_ms.is_some());
        assert!(lead.contact_socials.linkedin.is_some());
        assert_eq!(lead.socials.linkedin.as_ref().and_then(|p| p.validated), Some(true));

        let notifications = fakes.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "Full pipeline complete");
        assert_eq!(notifications[0].severity, Severity::Success);
    }

    #[tokio::test]
    async fn nearby_relevant_domain_gets_blended_score() {
        let mut lead = Lead::new("Acme");
        lead.industry_relevance_score = Some(100);
        let (store, id) = store_with(lead).await;

        let fakes = Arc::new(Fakes {
            coordinates: Some(HOME),
            relevance: 100,
            ..Fakes::default()
        });
        let validator = Arc::new(ScriptedValidator::default().with("acme.com", true, false));
        let orch = orchestrator(
            &store,
            &fakes,
            &validator,
            Some(candidate("acme.com", 60, sources::WEB_SEARCH)),
            settings(),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let report = orch.run(&id, Some(tx)).await.unwrap();

        assert_eq!(report.match_score, Some(MatchScore::new(70, score_sources::CALCULATED)));
        assert_eq!(report.outcome, PipelineOutcome::FullComplete);

        let lead = store.get(&id).await.unwrap();
        assert!(lead.distance_miles.unwrap().abs() < 1e-6);
        assert_eq!(lead.domain_relevance_score, Some(100));
        assert_eq!(lead.industry.as_deref(), Some("Manufacturing"));

        // No email: the contact track only logs a skip.
        assert_eq!(fakes.count("find_contact"), 0);
        let logs = store.logs(&id).await.unwrap();
        assert!(logs
            .iter()
            .any(|e| e.step == LogStep::ContactEnrichment && e.action == "skipped"));

        let events = drain(&mut rx);
        assert_eq!(
            events.first(),
            Some(&PipelineEvent::StageStarted {
                lead_id: id.clone(),
                stage: Stage::Discovery,
            })
        );
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::Finished {
                outcome: Some(PipelineOutcome::FullComplete),
                ..
            })
        ));
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::ScoreComputed { .. })));
    }

    #[tokio::test]
    async fn parked_domain_without_alternatives_scores_twenty_five() {
        let (store, id) = store_with(Lead::new("Acme")).await;
        let fakes = Arc::new(Fakes::default());
        let validator = Arc::new(ScriptedValidator::default().with("parked.com", false, true));
        let orch = orchestrator(
            &store,
            &fakes,
            &validator,
            Some(candidate("parked.com", 60, sources::WEB_SEARCH)),
            settings(),
        );

        let report = orch.run(&id, None).await.unwrap();

        assert_eq!(report.outcome, PipelineOutcome::Partial);
        assert_eq!(report.match_score, Some(MatchScore::new(25, score_sources::PARKED_DOMAIN)));
        assert!(!report.domain_swapped);
        assert_eq!(validator.calls(), vec!["parked.com"]);
        assert_eq!(fakes.count("geocode"), 0);
        assert_eq!(fakes.count("deep_enrich"), 0);
        assert_eq!(fakes.count("social_search"), 3);

        let lead = store.get(&id).await.unwrap();
        assert_eq!(lead.domain_parked, Some(true));
        assert_eq!(lead.match_score_source.as_deref(), Some("parked_domain"));

        let logs = store.logs(&id).await.unwrap();
        assert!(logs
            .iter()
            .any(|e| e.step == LogStep::DomainFallback && e.action == "exhausted"));
        assert_eq!(fakes.notifications()[0].title, "Partial pipeline complete");
    }

    #[tokio::test]
    async fn missing_domain_runs_diagnosis() {
        let (store, id) = store_with(Lead::new("Tiny Shop")).await;
        let fakes = Arc::new(Fakes::default());
        let validator = Arc::new(ScriptedValidator::default());
        let orch = orchestrator(&store, &fakes, &validator, None, settings());

        let report = orch.run(&id, None).await.unwrap();

        assert_eq!(report.outcome, PipelineOutcome::NoDomain);
        assert_eq!(report.match_score, Some(MatchScore::new(0, score_sources::CALCULATED)));
        assert!(!report.domain_validated);
        assert!(report.socials_searched);
        assert!(validator.calls().is_empty());
        assert_eq!(fakes.count("diagnose"), 1);
        assert_eq!(fakes.count("enrich_company"), 0);

        let lead = store.get(&id).await.unwrap();
        assert_eq!(
            lead.diagnosis.as_ref().map(|d| d.category.as_str()),
            Some("no_web_presence")
        );

        let notifications = fakes.notifications();
        assert_eq!(notifications[0].title, "No-domain pipeline complete");
        assert_eq!(notifications[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn rerun_does_not_reuse_previous_domain_signals() {
        let mut lead = Lead::new("Acme");
        lead.domain = Some("oldco.com".into());
        lead.domain_valid = Some(true);
        lead.distance_miles = Some(0.0);
        lead.domain_relevance_score = Some(100);
        let (store, id) = store_with(lead).await;

        // Geocoder finds nothing and the new domain has no textual relevance.
        let fakes = Arc::new(Fakes::default());
        let validator = Arc::new(ScriptedValidator::default().with("newco.com", true, false));
        let orch = orchestrator(
            &store,
            &fakes,
            &validator,
            Some(candidate("newco.com", 60, sources::WEB_SEARCH)),
            settings(),
        );

        let report = orch.run(&id, None).await.unwrap();

        assert_eq!(report.match_score, Some(MatchScore::new(0, score_sources::CALCULATED)));
        let lead = store.get(&id).await.unwrap();
        assert_eq!(lead.domain.as_deref(), Some("newco.com"));
        assert_eq!(lead.distance_miles, None);
        assert_eq!(lead.domain_relevance_score, Some(0));
    }

    #[tokio::test]
    async fn rerun_without_domain_forgets_previous_domain() {
        let mut lead = Lead::new("Tiny Shop");
        lead.domain = Some("oldco.com".into());
        lead.enrichment_source = Some(sources::EMAIL_DOMAIN_VERIFIED.into());
        lead.domain_valid = Some(true);
        lead.distance_miles = Some(2.0);
        let (store, id) = store_with(lead).await;

        let fakes = Arc::new(Fakes::default());
        let validator = Arc::new(ScriptedValidator::default());
        let orch = orchestrator(&store, &fakes, &validator, None, settings());

        let report = orch.run(&id, None).await.unwrap();

        assert_eq!(report.outcome, PipelineOutcome::NoDomain);
        assert_eq!(report.domain, None);
        let lead = store.get(&id).await.unwrap();
        assert_eq!(lead.domain, None);
        assert_eq!(lead.enrichment_source, None);
        assert_eq!(lead.domain_valid, None);
        assert_eq!(lead.distance_miles, None);
        assert_eq!(score_for_lead(&lead).score, 0);
    }

    #[tokio::test]
    async fn earlier_sighting_of_rejected_domain_is_not_retried() {
        let (store, id) = store_with(Lead::new("Acme")).await;
        store
            .seed_logs(&id, vec![found("WWW.Acme.com", 90, sources::GOOGLE_KNOWLEDGE_GRAPH)])
            .await;
        let fakes = Arc::new(Fakes::default());
        let validator = Arc::new(ScriptedValidator::default());
        let orch = orchestrator(
            &store,
            &fakes,
            &validator,
            Some(candidate("acme.com", 60, sources::WEB_SEARCH)),
            settings(),
        );

        let report = orch.run(&id, None).await.unwrap();

        assert_eq!(validator.calls(), vec!["acme.com"]);
        assert_eq!(report.match_score, Some(MatchScore::new(0, score_sources::INVALID_DOMAIN)));
    }

    #[tokio::test]
    async fn invalid_domain_swaps_to_logged_alternative() {
        let (store, id) = store_with(Lead::new("Acme")).await;
        store
            .seed_logs(&id, vec![found("alt.com", 80, sources::GOOGLE_KNOWLEDGE_GRAPH)])
            .await;
        let fakes = Arc::new(Fakes {
            relevance: 100,
            ..Fakes::default()
        });
        let validator = Arc::new(ScriptedValidator::default().with("alt.com", true, false));
        let orch = orchestrator(
            &store,
            &fakes,
            &validator,
            Some(candidate("bad.com", 60, sources::WEB_SEARCH)),
            settings(),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let report = orch.run(&id, Some(tx)).await.unwrap();

        assert!(report.domain_swapped);
        assert_eq!(report.domain.as_deref(), Some("alt.com"));
        assert_eq!(validator.calls(), vec!["bad.com", "alt.com"]);
        assert_eq!(fakes.count("geocode"), 1);
        // Fallback provenance is not a direct tier: blended (0 + 100 + 0) / 3 * 0.7.
        assert_eq!(report.match_score, Some(MatchScore::new(23, score_sources::CALCULATED)));
        assert_eq!(report.outcome, PipelineOutcome::Partial);

        let lead = store.get(&id).await.unwrap();
        assert_eq!(lead.domain.as_deref(), Some("alt.com"));
        assert_eq!(
            lead.enrichment_source.as_deref(),
            Some("fallback:google_knowledge_graph")
        );

        let events = drain(&mut rx);
        assert!(events.contains(&PipelineEvent::DomainSwapped {
            lead_id: id.clone(),
            from: "bad.com".into(),
            to: "alt.com".into(),
        }));
    }

    #[tokio::test]
    async fn collaborator_failures_are_soft() {
        let (store, id) = store_with(Lead::new("Acme")).await;
        let fakes = Arc::new(Fakes {
            failing: HashSet::from(["geocode", "social_search", "notify"]),
            slow: HashMap::from([("domain_relevance", Duration::from_secs(5))]),
            ..Fakes::default()
        });
        let validator = Arc::new(ScriptedValidator::default().with("acme.com", true, false));
        let settings = PipelineSettings {
            call_timeout: Duration::from_millis(50),
            ..settings()
        };
        let orch = orchestrator(
            &store,
            &fakes,
            &validator,
            Some(candidate("acme.com", 60, sources::WEB_SEARCH)),
            settings,
        );

        let report = orch.run(&id, None).await.unwrap();

        let stages: Vec<Stage> = report.soft_failures.iter().map(|f| f.stage).collect();
        assert!(stages.contains(&Stage::Geocode));
        assert!(stages.contains(&Stage::Relevance));
        assert_eq!(stages.iter().filter(|s| **s == Stage::SocialSearch).count(), 3);
        assert!(report.match_score.is_some());
        assert_eq!(report.socials_found, 0);

        let logs = store.logs(&id).await.unwrap();
        assert!(logs
            .iter()
            .any(|e| e.step == LogStep::Geocode && e.action == "failed"));
        let relevance_failure = logs
            .iter()
            .find(|e| e.step == LogStep::DomainRelevance)
            .unwrap();
        assert_eq!(relevance_failure.action, "failed");
        assert!(relevance_failure.details["error"]
            .as_str()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn score_equal_to_threshold_skips_deep_enrichment() {
        let (store, id) = store_with(Lead::new("Acme")).await;
        let fakes = Arc::new(Fakes::default());
        let validator = Arc::new(ScriptedValidator::default().with("acme.com", true, false));
        let settings = PipelineSettings {
            deep_enrichment_threshold: 95,
            ..settings()
        };
        let orch = orchestrator(
            &store,
            &fakes,
            &validator,
            Some(candidate("acme.com", 90, sources::GOOGLE_KNOWLEDGE_GRAPH)),
            settings,
        );

        let report = orch.run(&id, None).await.unwrap();

        assert_eq!(report.match_score.map(|s| s.score), Some(95));
        assert_eq!(report.outcome, PipelineOutcome::Partial);
        assert_eq!(fakes.count("deep_enrich"), 0);
        assert_eq!(fakes.count("news"), 0);
    }

    #[tokio::test]
    async fn contact_track_failure_does_not_block_run() {
        let mut lead = Lead::new("Acme");
        lead.email = Some("jane@acme.com".into());
        let (store, id) = store_with(lead).await;
        let fakes = Arc::new(Fakes {
            failing: HashSet::from(["find_contact"]),
            ..Fakes::default()
        });
        let validator = Arc::new(ScriptedValidator::default());
        let orch = orchestrator(&store, &fakes, &validator, None, settings());

        let report = orch.run(&id, None).await.unwrap();

        assert_eq!(report.outcome, PipelineOutcome::NoDomain);
        assert_eq!(
            report.soft_failures,
            vec![SoftFailure {
                stage: Stage::ContactTrack,
                error: "unavailable: find_contact is down".into(),
            }]
        );
        assert_eq!(fakes.count("crm_sync"), 0);
    }

    /// Store whose log reads always fail.
    struct BrokenLogs(MemoryStore);

    #[async_trait]
    impl LeadStore for BrokenLogs {
        async fn get(&self, lead_id: &LeadId) -> Result<Lead> {
            self.0.get(lead_id).await
        }

        async fn update(&self, lead_id: &LeadId, patch: LeadPatch) -> Result<Lead> {
            self.0.update(lead_id, patch).await
        }

        async fn append_log(&self, lead_id: &LeadId, entry: &EnrichmentLogEntry) -> Result<()> {
            self.0.append_log(lead_id, entry).await
        }

        async fn logs(&self, _lead_id: &LeadId) -> Result<Vec<EnrichmentLogEntry>> {
            Err(LeadLensError::Storage("log table unreadable".into()))
        }
    }

    #[tokio::test]
    async fn store_failure_aborts_but_still_finalizes() {
        let lead = Lead::new("Tiny Shop");
        let id = lead.id.clone();
        let inner = MemoryStore::new();
        inner.insert(lead).await;
        let store = Arc::new(BrokenLogs(inner));

        let fakes = Arc::new(Fakes::default());
        let validator = Arc::new(ScriptedValidator::default());
        let orch = Orchestrator::new(
            store.clone(),
            collaborators(&fakes, validator, None),
            settings(),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let err = orch.run(&id, Some(tx)).await.unwrap_err();
        assert!(matches!(err, LeadLensError::Storage(_)));

        assert_eq!(fakes.count("diagnose"), 0);
        let notifications = fakes.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "Pipeline Failed");
        assert_eq!(notifications[0].severity, Severity::Error);

        let lead = store.get(&id).await.unwrap();
        assert_eq!(lead.current_stage, None);
        assert!(lead.last_pipeline_ms.is_some());

        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::Finished { outcome: None, .. })
        ));
    }

    #[tokio::test]
    async fn runs_for_the_same_lead_are_serialized() {
        let (store, id) = store_with(Lead::new("Acme")).await;
        let fakes = Arc::new(Fakes {
            slow: HashMap::from([("geocode", Duration::from_millis(100))]),
            ..Fakes::default()
        });
        let validator = Arc::new(ScriptedValidator::default().with("acme.com", true, false));
        let orch = orchestrator(
            &store,
            &fakes,
            &validator,
            Some(candidate("acme.com", 60, sources::WEB_SEARCH)),
            settings(),
        );

        let (first, second) = tokio::join!(orch.run(&id, None), orch.run(&id, None));
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(fakes.count("geocode"), 2);
        assert_eq!(fakes.max_concurrent_geocodes(), 1);
        assert_eq!(fakes.notifications().len(), 2);
    }
}
