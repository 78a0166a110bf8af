//! Match score calculation.
//!
//! An ordered list of rules; the first rule that applies produces the score.
//! The final blended rule always applies.

use leadlens_shared::{Lead, MatchScore, score_sources, sources};

/// Score for a domain verified against the company name through the email.
const VERIFIED_EMAIL_SCORE: u8 = 99;
/// Score for a confident knowledge-graph hit.
const KNOWLEDGE_GRAPH_SCORE: u8 = 95;
/// Minimum knowledge-graph confidence for [`KNOWLEDGE_GRAPH_SCORE`].
const KNOWLEDGE_GRAPH_MIN_CONFIDENCE: u8 = 25;
/// Share of the blend kept, leaving headroom for the direct tiers.
const BLEND_WEIGHT: f64 = 0.7;
/// Distance assumed when none is known.
const UNKNOWN_DISTANCE_MILES: f64 = 999.0;

/// Distance decay breakpoints `(miles, score)`, linear between points.
const DISTANCE_CURVE: &[(f64, f64)] = &[(0.0, 100.0), (20.0, 70.0), (60.0, 30.0), (100.0, 0.0)];

/// Lead fields the calculator reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreInputs {
    pub enrichment_source: Option<String>,
    pub enrichment_confidence: Option<u8>,
    pub distance_miles: Option<f64>,
    pub domain_relevance: Option<u8>,
    pub industry_relevance: Option<u8>,
}

impl ScoreInputs {
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            enrichment_source: lead.enrichment_source.clone(),
            enrichment_confidence: lead.enrichment_confidence,
            distance_miles: lead.distance_miles,
            domain_relevance: lead.domain_relevance_score,
            industry_relevance: lead.industry_relevance_score,
        }
    }

    /// Inputs for a lead without a domain: domain-derived signals are ignored.
    pub fn without_domain(lead: &Lead) -> Self {
        Self {
            industry_relevance: lead.industry_relevance_score,
            ..Self::default()
        }
    }
}

type Rule = fn(&ScoreInputs) -> Option<MatchScore>;

/// Scoring tiers, in priority order.
const RULES: &[Rule] = &[verified_email, knowledge_graph, blended];

fn verified_email(inputs: &ScoreInputs) -> Option<MatchScore> {
    (inputs.enrichment_source.as_deref() == Some(sources::EMAIL_DOMAIN_VERIFIED))
        .then(|| MatchScore::new(VERIFIED_EMAIL_SCORE, score_sources::EMAIL_DOMAIN))
}

fn knowledge_graph(inputs: &ScoreInputs) -> Option<MatchScore> {
    let from_graph = inputs.enrichment_source.as_deref() == Some(sources::GOOGLE_KNOWLEDGE_GRAPH);
    let confident = inputs.enrichment_confidence.unwrap_or(0) >= KNOWLEDGE_GRAPH_MIN_CONFIDENCE;
    (from_graph && confident).then(|| {
        MatchScore::new(KNOWLEDGE_GRAPH_SCORE, score_sources::GOOGLE_KNOWLEDGE_GRAPH)
    })
}

fn blended(inputs: &ScoreInputs) -> Option<MatchScore> {
    let distance = distance_score(inputs.distance_miles);
    let domain = f64::from(inputs.domain_relevance.unwrap_or(0).min(100));
    let industry = f64::from(inputs.industry_relevance.unwrap_or(0).min(100));

    let combined = (distance + domain + industry) / 3.0;
    let score = (combined * BLEND_WEIGHT).round().clamp(0.0, 100.0) as u8;
    Some(MatchScore::new(score, score_sources::CALCULATED))
}

/// Piecewise-linear distance decay: 100 at 0 mi down to 0 at 100 mi and beyond.
pub fn distance_score(miles: Option<f64>) -> f64 {
    let miles = match miles {
        Some(m) if m.is_finite() => m.max(0.0),
        _ => UNKNOWN_DISTANCE_MILES,
    };

    for pair in DISTANCE_CURVE.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if miles <= x1 {
            return y0 + (miles - x0) * (y1 - y0) / (x1 - x0);
        }
    }
    0.0
}

/// Compute the match score for `inputs`.
pub fn calculate_match_score(inputs: &ScoreInputs) -> MatchScore {
    RULES
        .iter()
        .find_map(|rule| rule(inputs))
        .unwrap_or_else(|| MatchScore::new(0, score_sources::CALCULATED))
}

/// Score used when no usable domain survived validation and fallback.
pub fn rejected_domain_score(parked: bool) -> MatchScore {
    if parked {
        MatchScore::new(25, score_sources::PARKED_DOMAIN)
    } else {
        MatchScore::new(0, score_sources::INVALID_DOMAIN)
    }
}

/// Score a stored lead the way the pipeline would at its current state.
pub fn score_for_lead(lead: &Lead) -> MatchScore {
    if lead.domain.is_none() {
        return calculate_match_score(&ScoreInputs::without_domain(lead));
    }
    match (lead.domain_valid, lead.domain_parked) {
        (_, Some(true)) => rejected_domain_score(true),
        (Some(false), _) => rejected_domain_score(false),
        _ => calculate_match_score(&ScoreInputs::from_lead(lead)),
    }
}
