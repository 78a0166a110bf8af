//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use leadlens_core::relevance::TextualRelevance;
use leadlens_core::{
    Collaborators, FallbackSelector, NotificationSink, Orchestrator, PipelineEvent,
    PipelineReport, PipelineSettings, score_for_lead,
};
use leadlens_discovery::DiscoveryChain;
use leadlens_services::{LogNotifier, ServiceClient, WebhookNotifier};
use leadlens_shared::{
    AppConfig, EnrichmentLogEntry, Lead, LeadId, LeadPatch, LogStep, expand_home, init_config,
    load_config, load_config_from,
};
use leadlens_storage::Storage;
use leadlens_validator::{DomainValidator, ValidatorOptions};
use tokio::sync::mpsc;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LeadLens: find, validate, and score the company behind a lead.
#[derive(Parser)]
#[command(
    name = "leadlens",
    version,
    about = "Enrich business leads: discover and validate company domains, score fit, find socials.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.leadlens/leadlens.toml).
    #[arg(long, global = true, env = "LEADLENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file, overriding `[storage] db_path`.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create and inspect leads.
    Lead {
        #[command(subcommand)]
        action: LeadAction,
    },

    /// Run the enrichment pipeline for a lead.
    Enrich {
        /// Lead ID.
        id: String,
    },

    /// Validate a domain and print the verdict as JSON.
    Validate {
        /// Domain or URL to check.
        domain: String,
    },

    /// Recompute and store a lead's match score.
    Score {
        /// Lead ID.
        id: String,
    },

    /// Look for a replacement domain in a lead's enrichment log.
    Fallback {
        /// Lead ID.
        id: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Lead subcommands.
#[derive(Subcommand)]
pub(crate) enum LeadAction {
    /// Create a lead.
    Add {
        /// Company name.
        #[arg(long)]
        company: String,

        /// Contact email.
        #[arg(long)]
        email: Option<String>,

        /// Contact person's name.
        #[arg(long)]
        contact: Option<String>,

        /// Free-form location, e.g. "Minneapolis, MN".
        #[arg(long)]
        location: Option<String>,

        /// Known industry.
        #[arg(long)]
        industry: Option<String>,
    },
    /// List all leads.
    List,
    /// Print a lead as JSON.
    Show {
        /// Lead ID.
        id: String,
    },
    /// Print a lead's enrichment log.
    Logs {
        /// Lead ID.
        id: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadlens=info",
        1 => "leadlens=debug",
        _ => "leadlens=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        config_path: cli.config,
        db_path: cli.db,
    };
    match cli.command {
        Command::Lead { action } => match action {
            LeadAction::Add {
                company,
                email,
                contact,
                location,
                industry,
            } => {
                let mut lead = Lead::new(company);
                lead.email = email;
                lead.contact_name = contact;
                lead.location = location;
                lead.industry = industry;
                cmd_lead_add(&ctx, lead).await
            }
            LeadAction::List => cmd_lead_list(&ctx).await,
            LeadAction::Show { id } => cmd_lead_show(&ctx, &id).await,
            LeadAction::Logs { id } => cmd_lead_logs(&ctx, &id).await,
        },
        Command::Enrich { id } => cmd_enrich(&ctx, &id).await,
        Command::Validate { domain } => cmd_validate(&ctx, &domain).await,
        Command::Score { id } => cmd_score(&ctx, &id).await,
        Command::Fallback { id } => cmd_fallback(&ctx, &id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&ctx).await,
        },
    }
}

/// Global flag overrides shared by every command.
struct Context {
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
}

impl Context {
    fn config(&self) -> Result<AppConfig> {
        let config = match &self.config_path {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        Ok(config)
    }

    async fn storage(&self, config: &AppConfig) -> Result<Storage> {
        let path = match &self.db_path {
            Some(path) => path.clone(),
            None => expand_home(&config.storage.db_path)?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| eyre!("cannot create {}: {e}", parent.display()))?;
        }
        Ok(Storage::open(&path).await?)
    }
}

fn parse_id(id: &str) -> Result<LeadId> {
    id.parse()
        .map_err(|e| eyre!("invalid lead id '{id}': {e}"))
}

async fn require_lead(storage: &Storage, id: &LeadId) -> Result<Lead> {
    storage
        .get_lead(id)
        .await?
        .ok_or_else(|| eyre!("no lead with id {id}"))
}

fn validator(config: &AppConfig) -> Result<DomainValidator> {
    Ok(DomainValidator::new(&ValidatorOptions::from(&config.validator))?)
}

/// Wire the live collaborators from config.
fn build_orchestrator(config: &AppConfig, storage: Storage) -> Result<Orchestrator> {
    let settings = PipelineSettings::from(&config.pipeline);

    let discovery = DiscoveryChain::from_config(&config.discovery)?
        .with_call_timeout(settings.call_timeout);
    let services = Arc::new(ServiceClient::from_config(&config.services)?);
    let notifier: Arc<dyn NotificationSink> = match &config.notifications.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(
            url,
            Duration::from_secs(config.services.timeout_secs),
        )?),
        None => Arc::new(LogNotifier),
    };

    info!(
        adapters = ?discovery.adapter_names(),
        services = %services.base_url(),
        "pipeline collaborators ready"
    );

    let collab = Collaborators {
        discovery: Arc::new(discovery),
        validator: Arc::new(validator(config)?),
        company: services.clone(),
        contacts: services.clone(),
        news: services.clone(),
        social_search: services.clone(),
        social_validator: services.clone(),
        geocoder: services.clone(),
        relevance: Arc::new(TextualRelevance),
        diagnoser: services.clone(),
        crm: services,
        notifier,
    };
    Ok(Orchestrator::new(Arc::new(storage), collab, settings))
}

// ---------------------------------------------------------------------------
// Lead commands
// ---------------------------------------------------------------------------

async fn cmd_lead_add(ctx: &Context, lead: Lead) -> Result<()> {
    let config = ctx.config()?;
    let storage = ctx.storage(&config).await?;
    storage.upsert_lead(&lead).await?;

    info!(lead_id = %lead.id, company = %lead.company_name, "lead created");
    println!("{}", lead.id);
    Ok(())
}

async fn cmd_lead_list(ctx: &Context) -> Result<()> {
    let config = ctx.config()?;
    let storage = ctx.storage(&config).await?;
    let leads = storage.list_leads().await?;

    if leads.is_empty() {
        println!("No leads yet. Add one with `leadlens lead add --company <name>`.");
        return Ok(());
    }

    println!("{:<36}  {:<28}  {:<24}  {:>5}", "ID", "COMPANY", "DOMAIN", "SCORE");
    for lead in &leads {
        let score = lead
            .match_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<36}  {:<28}  {:<24}  {:>5}",
            lead.id,
            clip(&lead.company_name, 28),
            clip(lead.domain.as_deref().unwrap_or("-"), 24),
            score
        );
    }
    Ok(())
}

fn clip(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let cut: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{cut}…")
}

async fn cmd_lead_show(ctx: &Context, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let config = ctx.config()?;
    let storage = ctx.storage(&config).await?;
    let lead = require_lead(&storage, &id).await?;

    println!("{}", serde_json::to_string_pretty(&lead)?);
    Ok(())
}

async fn cmd_lead_logs(ctx: &Context, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let config = ctx.config()?;
    let storage = ctx.storage(&config).await?;
    require_lead(&storage, &id).await?;

    for entry in storage.list_logs(&id).await? {
        println!("{}", format_log_entry(&entry));
    }
    Ok(())
}

fn format_log_entry(entry: &EnrichmentLogEntry) -> String {
    let mut line = format!(
        "{}  {:<18} {:<10} {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.step.as_str(),
        entry.action,
        entry.source
    );
    if let Some(domain) = &entry.domain {
        line.push_str(&format!("  domain={domain}"));
    }
    if let Some(confidence) = entry.confidence {
        line.push_str(&format!("  confidence={confidence}"));
    }
    for (key, value) in &entry.details {
        line.push_str(&format!("  {key}={value}"));
    }
    line
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_enrich(ctx: &Context, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let config = ctx.config()?;
    let storage = ctx.storage(&config).await?;
    require_lead(&storage, &id).await?;

    let orchestrator = build_orchestrator(&config, storage)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = CliProgress::new();
    let render = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            progress.handle(&event);
        }
        progress.finish();
    });

    let result = orchestrator.run(&id, Some(tx)).await;
    render.await?;
    print_report(&result?);
    Ok(())
}

fn print_report(report: &PipelineReport) {
    println!();
    println!("  {}", report.outcome.title());
    println!("  Lead:     {}", report.lead_id);
    match &report.domain {
        Some(domain) if report.domain_swapped => println!("  Domain:   {domain} (fallback)"),
        Some(domain) => println!("  Domain:   {domain}"),
        None => println!("  Domain:   none found"),
    }
    if let Some(score) = &report.match_score {
        println!("  Score:    {} ({})", score.score, score.source);
    }
    println!("  Socials:  {} found", report.socials_found);
    if let Some(diagnosis) = &report.diagnosis {
        println!("  Diagnosis: {} - {}", diagnosis.category, diagnosis.recommendation);
    }
    if !report.soft_failures.is_empty() {
        println!("  Degraded stages:");
        for failure in &report.soft_failures {
            println!("    {}: {}", failure.stage, failure.error);
        }
    }
    println!("  Time:     {:.1}s", report.elapsed_ms as f64 / 1000.0);
    println!();
}

/// Renders pipeline events on an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn handle(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageStarted { stage, .. } => {
                self.spinner.set_message(stage.label());
            }
            PipelineEvent::StageFailed { stage, error, .. } => {
                self.spinner.println(format!("  ! {} failed: {error}", stage.label()));
            }
            PipelineEvent::DomainSwapped { from, to, .. } => {
                self.spinner.println(format!("  ↻ {from} rejected, using {to}"));
            }
            PipelineEvent::ScoreComputed { score, .. } => {
                self.spinner
                    .println(format!("  ★ match score {} ({})", score.score, score.source));
            }
            PipelineEvent::Finished { .. } => self.spinner.finish_and_clear(),
        }
    }

    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

async fn cmd_validate(ctx: &Context, domain: &str) -> Result<()> {
    let config = ctx.config()?;
    let result = validator(&config)?.check(domain).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_score(ctx: &Context, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let config = ctx.config()?;
    let storage = ctx.storage(&config).await?;
    let lead = require_lead(&storage, &id).await?;

    let score = score_for_lead(&lead);
    storage.update_lead(&id, LeadPatch::score(&score)).await?;
    let entry = EnrichmentLogEntry::new(LogStep::MatchScore, "recomputed", &score.source)
        .with_detail("score", score.score);
    storage.append_log(&id, &entry).await?;

    println!("{} ({})", score.score, score.source);
    Ok(())
}

async fn cmd_fallback(ctx: &Context, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let config = ctx.config()?;
    let storage = ctx.storage(&config).await?;
    let lead = require_lead(&storage, &id).await?;
    let current = lead
        .domain
        .ok_or_else(|| eyre!("lead {id} has no domain to replace"))?;

    let validator = validator(&config)?;
    let log = storage.list_logs(&id).await?;
    let selector = FallbackSelector::new(&storage, &validator, config.pipeline.call_timeout());
    let outcome = selector.find_fallback(&id, &current, &log, &[]).await?;

    match (&outcome.domain, outcome.success) {
        (Some(domain), true) => {
            println!(
                "Switched {current} -> {domain} (source {}, confidence {})",
                outcome.source.as_deref().unwrap_or("-"),
                outcome.confidence.unwrap_or(0)
            );
            println!("Match score was cleared; run `leadlens score {id}` or `leadlens enrich {id}`.");
        }
        _ => println!(
            "No usable fallback. Tried: {}",
            outcome.tried_domains.join(", ")
        ),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(ctx: &Context) -> Result<()> {
    let config = ctx.config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    if let Some(path) = ctx.config_path.as_deref().map(Path::display) {
        println!("# loaded from {path}");
    }
    Ok(())
}
