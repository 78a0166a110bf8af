//! Local textual relevance of a domain to a company name.

use async_trait::async_trait;
use leadlens_shared::{company_tokens, registrable_label, squashed_name};

use crate::collaborators::{LeadContext, RelevanceScorer, SoftError};

/// Ceiling for partial token matches, below the containment score.
const TOKEN_SHARE_MAX: f64 = 80.0;

/// Score how well `domain`'s registrable label matches `company`.
///
/// 100 when the squashed name equals the label, 85 when one contains the
/// other, otherwise the share of name tokens found in the label scaled to
/// 0–80.
pub fn textual_relevance(company: &str, domain: &str) -> u8 {
    let label: String = registrable_label(domain)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    let name = squashed_name(company);

    if label.is_empty() || name.is_empty() {
        return 0;
    }
    if label == name {
        return 100;
    }
    if label.contains(&name) || name.contains(&label) {
        return 85;
    }

    let tokens = company_tokens(company);
    if tokens.is_empty() {
        return 0;
    }
    let hits = tokens.iter().filter(|t| label.contains(t.as_str())).count();
    (hits as f64 / tokens.len() as f64 * TOKEN_SHARE_MAX).round() as u8
}

/// [`RelevanceScorer`] backed by [`textual_relevance`].
pub struct TextualRelevance;

#[async_trait]
impl RelevanceScorer for TextualRelevance {
    async fn domain_relevance(&self, ctx: &LeadContext, domain: &str) -> Result<u8, SoftError> {
        Ok(textual_relevance(&ctx.company, domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_contained_names() {
        assert_eq!(textual_relevance("Acme Widgets, Inc.", "acmewidgets.com"), 100);
        assert_eq!(textual_relevance("Acme", "acme-corp.co.uk"), 85);
        assert_eq!(textual_relevance("Acme Widgets", "acme.com"), 85);
    }

    #[test]
    fn partial_token_share() {
        // One of "northern", "acme", "widgets" appears.
        assert_eq!(textual_relevance("Northern Acme Widgets", "acmetools.com"), 27);
        assert_eq!(textual_relevance("Acme Widgets", "globex.com"), 0);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(textual_relevance("", "acme.com"), 0);
        assert_eq!(textual_relevance("The Co", "acme.com"), 0);
    }
}
