use url::Url;

/// Hosts whose "registrable domain" is noise rather than a referrer:
/// local traffic plus our own apex domain.
const EXCLUDED_DOMAINS: [&str; 3] = ["localhost", "127.0.0.1", "dropcatch.com"];

/// Registrable domain of a referrer URL, lowercased. Returns None on any
/// parse failure or when the domain is in the exclusion set; never errors.
pub fn normalize_referrer(referrer: &str) -> Option<String> {
    let trimmed = referrer.trim();
    if trimmed.is_empty() {
        return None;
    }
    let url = Url::parse(trimmed).ok()?;
    let host = url.host_str()?;
    let domain = psl::domain_str(host)?.to_lowercase();
    if EXCLUDED_DOMAINS.contains(&domain.as_str()) {
        return None;
    }
    Some(domain)
}

/// Normalize a bare domain string: strip scheme/path/query/fragment, then
/// reduce to the registrable domain. Falls back to the cleaned host when no
/// public suffix matches (intranet names and the like), None when nothing
/// usable remains.
pub fn normalize_domain(domain: &str) -> Option<String> {
    let mut cleaned = domain.trim().to_lowercase();
    for prefix in ["http://", "https://", "ftp://"] {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest.to_string();
            break;
        }
    }
    let cleaned = cleaned
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .to_string();
    if cleaned.is_empty() {
        return None;
    }
    match psl::domain_str(&cleaned) {
        Some(registrable) => Some(registrable.to_lowercase()),
        None => Some(cleaned),
    }
}
