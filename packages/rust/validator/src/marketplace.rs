//! Known domain-marketplace and parking hosts.

/// Hosts whose presence in a redirect target means the domain is for sale or parked.
const BUILTIN_MARKETPLACE_HOSTS: &[&str] = &[
    "sedo.com",
    "sedoparking.com",
    "afternic.com",
    "dan.com",
    "hugedomains.com",
    "buydomains.com",
    "godaddy.com",
    "bodis.com",
    "parkingcrew.net",
    "above.com",
    "undeveloped.com",
    "namecheap.com",
    "squadhelp.com",
    "atom.com",
    "epik.com",
    "sav.com",
    "domainmarket.com",
    "brandbucket.com",
    "efty.com",
    "uniregistry.com",
];

/// Marketplace host list: the built-ins plus any configured extras.
#[derive(Debug, Clone)]
pub struct MarketplaceHosts {
    hosts: Vec<String>,
}

impl MarketplaceHosts {
    pub fn new(extra: &[String]) -> Self {
        let mut hosts: Vec<String> = BUILTIN_MARKETPLACE_HOSTS
            .iter()
            .map(|h| h.to_string())
            .collect();
        hosts.extend(extra.iter().map(|h| h.trim().to_lowercase()));
        Self { hosts }
    }

    /// True when `host` is a listed marketplace or a subdomain of one.
    pub fn contains(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_lowercase();
        self.hosts
            .iter()
            .any(|m| host == *m || host.ends_with(&format!(".{m}")))
    }
}

impl Default for MarketplaceHosts {
    fn default() -> Self {
        Self::new(&[])
    }
}
