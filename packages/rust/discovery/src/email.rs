//! Email-derived domain discovery.

use async_trait::async_trait;
use leadlens_shared::{
    DomainCandidate, company_tokens, normalize_domain, registrable_label, sources,
};

use crate::{DiscoveryError, DiscoveryQuery, DomainDiscoverer};

/// Confidence when the email domain's label contains a company-name token.
const VERIFIED_CONFIDENCE: u8 = 95;
/// Confidence for any other business email domain.
const UNVERIFIED_CONFIDENCE: u8 = 70;

/// Free mailbox providers; their domains say nothing about the company.
const PERSONAL_PROVIDERS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "ymail.com",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "msn.com",
    "aol.com",
    "icloud.com",
    "me.com",
    "mac.com",
    "proton.me",
    "protonmail.com",
    "gmx.com",
    "gmx.net",
    "mail.com",
    "zoho.com",
    "yandex.com",
    "comcast.net",
    "att.net",
    "verizon.net",
    "sbcglobal.net",
    "charter.net",
];

/// True for free mailbox domains (`gmail.com`, `yahoo.co.uk`, ...).
pub fn is_personal_provider(domain: &str) -> bool {
    let domain = domain.trim().to_lowercase();
    if PERSONAL_PROVIDERS.contains(&domain.as_str()) {
        return true;
    }
    // Regional variants: yahoo.co.uk, hotmail.fr, outlook.de
    matches!(
        registrable_label(&domain),
        "gmail" | "yahoo" | "hotmail" | "outlook" | "live" | "aol" | "icloud" | "gmx"
    )
}

/// Proposes the lead's business email domain.
pub struct EmailDomain;

impl EmailDomain {
    fn email_domain(query: &DiscoveryQuery) -> Option<String> {
        let (_, domain) = query.email.as_deref()?.trim().rsplit_once('@')?;
        normalize_domain(domain)
    }
}

#[async_trait]
impl DomainDiscoverer for EmailDomain {
    fn name(&self) -> &'static str {
        sources::EMAIL_DOMAIN
    }

    fn skip_reason(&self, query: &DiscoveryQuery) -> Option<String> {
        match Self::email_domain(query) {
            None => Some("no usable email".into()),
            Some(d) if is_personal_provider(&d) => Some(format!("personal email provider {d}")),
            Some(_) => None,
        }
    }

    async fn discover(
        &self,
        query: &DiscoveryQuery,
    ) -> Result<Option<DomainCandidate>, DiscoveryError> {
        let Some(domain) = Self::email_domain(query) else {
            return Ok(None);
        };
        if is_personal_provider(&domain) {
            return Ok(None);
        }

        let label = registrable_label(&domain).to_string();
        let verified = company_tokens(&query.company)
            .iter()
            .any(|t| label.contains(t.as_str()));

        let (source, confidence) = if verified {
            (sources::EMAIL_DOMAIN_VERIFIED, VERIFIED_CONFIDENCE)
        } else {
            (sources::EMAIL_DOMAIN, UNVERIFIED_CONFIDENCE)
        };

        Ok(Some(DomainCandidate {
            domain,
            confidence,
            source: source.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(company: &str, email: Option<&str>) -> DiscoveryQuery {
        DiscoveryQuery {
            company: company.into(),
            location: None,
            email: email.map(String::from),
        }
    }

    #[test]
    fn personal_providers_are_recognized() {
        assert!(is_personal_provider("gmail.com"));
        assert!(is_personal_provider("Yahoo.co.uk"));
        assert!(is_personal_provider("hotmail.fr"));
        assert!(!is_personal_provider("acme.com"));
    }

    #[tokio::test]
    async fn verified_when_label_matches_company() {
        let q = query("Acme Widgets LLC", Some("jane@acmewidgets.com"));
        assert!(EmailDomain.skip_reason(&q).is_none());

        let c = EmailDomain.discover(&q).await.unwrap().unwrap();
        assert_eq!(c.domain, "acmewidgets.com");
        assert_eq!(c.source, sources::EMAIL_DOMAIN_VERIFIED);
        assert_eq!(c.confidence, 95);
    }

    #[tokio::test]
    async fn unverified_business_domain() {
        let q = query("Acme Widgets", Some("jane@northstar-holdings.com"));
        let c = EmailDomain.discover(&q).await.unwrap().unwrap();
        assert_eq!(c.source, sources::EMAIL_DOMAIN);
        assert_eq!(c.confidence, 70);
    }

    #[tokio::test]
    async fn personal_and_missing_emails_are_skipped() {
        let q = query("Acme", Some("jane@gmail.com"));
        assert!(EmailDomain.skip_reason(&q).is_some());
        assert!(EmailDomain.discover(&q).await.unwrap().is_none());

        let q = query("Acme", None);
        assert!(EmailDomain.skip_reason(&q).is_some());
    }
}
