//! Domain-name and company-name helpers shared by discovery, validation, and scoring.

use url::Url;

/// Words that carry no signal when matching a company name against a domain.
const NAME_STOP_WORDS: &[&str] = &[
    "inc", "llc", "ltd", "co", "corp", "corporation", "company", "the", "and", "group", "of",
    "services", "gmbh", "plc", "limited",
];

/// Second-level labels used under two-letter country TLDs (`acme.co.uk`).
const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "org", "net", "ac", "gov", "edu"];

/// Normalize a URL or bare domain to a lowercase host without `www.`.
///
/// Accepts `https://www.Acme.com/about`, `acme.com`, `ACME.com.` and returns
/// `acme.com`. Returns `None` for empty input or anything that has no dotted
/// host.
pub fn normalize_domain(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&with_scheme).ok()?;
    let host = url.host_str()?.trim_end_matches('.').to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    if !host.contains('.') || host.starts_with('.') || host.ends_with('.') {
        return None;
    }
    match url.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host),
    }
}

/// Compare two hosts ignoring case and a leading `www.`.
pub fn same_host(a: &str, b: &str) -> bool {
    let strip = |h: &str| {
        let h = h.trim().trim_end_matches('.').to_lowercase();
        h.strip_prefix("www.").map(String::from).unwrap_or(h)
    };
    strip(a) == strip(b)
}

/// The label a company name is expected to appear in (`acme` for
/// `shop.acme.co.uk`).
pub fn registrable_label(domain: &str) -> &str {
    let host = domain.split(':').next().unwrap_or(domain);
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    match labels.len() {
        0 => host,
        1 => labels[0],
        n => {
            let tld = labels[n - 1];
            let second = labels[n - 2];
            if n >= 3 && tld.len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&second) {
                labels[n - 3]
            } else {
                second
            }
        }
    }
}

/// Lowercase alphanumeric tokens of a company name, stop words and tokens
/// shorter than three characters removed.
pub fn company_tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() >= 3 && !NAME_STOP_WORDS.contains(t))
        .map(String::from)
        .collect()
}

/// The company name squashed to a single lowercase alphanumeric string,
/// stop words removed (`"The Acme Widget Co."` → `acmewidget`).
pub fn squashed_name(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty() && !NAME_STOP_WORDS.contains(t))
        .collect()
}
