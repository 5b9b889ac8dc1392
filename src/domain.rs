/// Domain normalization and matching for cookie hosts
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)*[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$")
        .expect("domain pattern is valid")
});

/// Normalize a domain as typed by a user or stored by the cookie API
///
/// Examples:
/// - " .Example.com " → "example.com"
/// - "https://shop.example.com/cart" → "shop.example.com"
pub fn normalize_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    let host = if trimmed.contains("://") {
        host_from_url(trimmed).unwrap_or_default()
    } else {
        trimmed.to_string()
    };

    host.trim_start_matches('.').to_lowercase()
}

/// Check that a normalized domain is syntactically a hostname
pub fn is_valid_domain(domain: &str) -> bool {
    domain == "localhost" || is_ip_address(domain) || DOMAIN_PATTERN.is_match(domain)
}

/// Extract the lowercase host from an absolute URL
pub fn host_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_lowercase)
}

/// True when `cookie_domain` equals `protected` or is one of its subdomains
pub fn domain_matches(cookie_domain: &str, protected: &str) -> bool {
    let cookie_domain = normalize_domain(cookie_domain);
    let protected = normalize_domain(protected);

    if protected.is_empty() {
        return false;
    }

    cookie_domain == protected || cookie_domain.ends_with(&format!(".{}", protected))
}

/// First protected entry covering `cookie_domain`, if any
pub fn find_protected<'a>(cookie_domain: &str, protected: &'a [String]) -> Option<&'a str> {
    protected
        .iter()
        .find(|entry| domain_matches(cookie_domain, entry))
        .map(String::as_str)
}

/// URL the cookie API needs to address a cookie on `domain` + `path`
pub fn cookie_url(domain: &str, path: &str, secure: bool) -> String {
    let scheme = if secure { "https" } else { "http" };
    let host = domain.trim().trim_start_matches('.');
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    format!("{}://{}{}", scheme, host, path)
}

/// Check if a string looks like an IP address
fn is_ip_address(s: &str) -> bool {
    s.chars().next().map_or(false, |c| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_digit() || c == '.')
}
