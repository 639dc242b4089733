//! Canonicalization
//!
//! Maps cosmetic variants of the same value onto one canonical string:
//! - IPv4: dotted quad, no leading zeros
//! - IPv6: compressed, lowercase
//! - Domain: lowercase, no trailing dot, label syntax checked
//! - URL: trimmed, lowercase scheme + host
//! - Hash: lowercase hex, algorithm from length
//! - Names: trimmed, lowercase, whitespace collapsed

use std::net::Ipv6Addr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::logic::objects::ObservableKind;

static DOMAIN_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]([a-z0-9_-]{0,61}[a-z0-9])?$").expect("valid regex"));

static URL_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9+.-]*$").expect("valid regex"));

/// Max length of a fully qualified domain name
const MAX_DOMAIN_LEN: usize = 253;

// ============================================================================
// HASHES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Key used in STIX `hashes` dictionaries
    pub fn stix_name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }

    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(HashAlgorithm::Md5),
            40 => Some(HashAlgorithm::Sha1),
            64 => Some(HashAlgorithm::Sha256),
            128 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Accepts both STIX keys and vendor spellings (`sha256`, `md5`, ...)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().replace(['_', '-'], "").as_str() {
            "MD5" => Some(HashAlgorithm::Md5),
            "SHA1" => Some(HashAlgorithm::Sha1),
            "SHA256" => Some(HashAlgorithm::Sha256),
            "SHA512" => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Id preference order: SHA-256 first, then SHA-1, MD5, SHA-512
    pub fn preference(&self) -> u8 {
        match self {
            HashAlgorithm::Sha256 => 0,
            HashAlgorithm::Sha1 => 1,
            HashAlgorithm::Md5 => 2,
            HashAlgorithm::Sha512 => 3,
        }
    }
}

/// Lowercase hex hash with its inferred algorithm
pub fn hash(raw: &str) -> Result<(HashAlgorithm, String), String> {
    let value = raw.trim().to_lowercase();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("not a hex digest".to_string());
    }
    let algo = HashAlgorithm::from_hex_len(value.len())
        .ok_or_else(|| format!("unsupported digest length {}", value.len()))?;
    Ok((algo, value))
}

// ============================================================================
// NETWORK VALUES
// ============================================================================

/// Dotted quad without leading zeros; an optional `/prefix` is kept
pub fn ipv4(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    let (addr, prefix) = split_prefix(trimmed, 32)?;

    let parts: Vec<&str> = addr.split('.').collect();
    if parts.len() != 4 {
        return Err("expected four octets".to_string());
    }

    let mut octets = Vec::with_capacity(4);
    for part in parts {
        if part.is_empty() || part.len() > 3 || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("bad octet '{}'", part));
        }
        let octet: u8 = part.parse().map_err(|_| format!("octet out of range '{}'", part))?;
        octets.push(octet.to_string());
    }

    let mut canonical = octets.join(".");
    if let Some(prefix) = prefix {
        canonical.push_str(&format!("/{}", prefix));
    }
    Ok(canonical)
}

/// Compressed lowercase form; an optional `/prefix` is kept
pub fn ipv6(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let (addr, prefix) = split_prefix(trimmed, 128)?;
    let parsed: Ipv6Addr = addr.parse().map_err(|_| "not an IPv6 address".to_string())?;

    let mut canonical = parsed.to_string();
    if let Some(prefix) = prefix {
        canonical.push_str(&format!("/{}", prefix));
    }
    Ok(canonical)
}

fn split_prefix(raw: &str, max: u8) -> Result<(&str, Option<u8>), String> {
    match raw.split_once('/') {
        None => Ok((raw, None)),
        Some((addr, prefix)) => {
            let prefix: u8 = prefix.parse().map_err(|_| "bad prefix length".to_string())?;
            if prefix > max {
                return Err(format!("prefix length {} exceeds {}", prefix, max));
            }
            Ok((addr, Some(prefix)))
        }
    }
}

pub fn domain(raw: &str) -> Result<String, String> {
    let value = raw.trim().to_lowercase();
    let value = value.strip_suffix('.').unwrap_or(&value);

    if value.is_empty() || value.len() > MAX_DOMAIN_LEN {
        return Err("domain length out of range".to_string());
    }

    let labels: Vec<&str> = value.split('.').collect();
    if labels.len() < 2 {
        return Err("domain needs at least two labels".to_string());
    }
    if let Some(bad) = labels.iter().find(|label| !DOMAIN_LABEL.is_match(label)) {
        return Err(format!("bad label '{}'", bad));
    }
    // A numeric TLD means this was an IP address
    if labels.last().is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit())) {
        return Err("numeric top-level label".to_string());
    }

    Ok(value.to_string())
}

/// Lowercases scheme and authority, keeps path/query/fragment as-is
pub fn url(raw: &str) -> Result<String, String> {
    let value = raw.trim();
    let (scheme, rest) = value
        .split_once("://")
        .ok_or_else(|| "missing scheme".to_string())?;

    let scheme = scheme.to_lowercase();
    if !URL_SCHEME.is_match(&scheme) {
        return Err(format!("bad scheme '{}'", scheme));
    }

    let split_at = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(split_at);
    if authority.is_empty() {
        return Err("missing host".to_string());
    }

    Ok(format!("{}://{}{}", scheme, authority.to_lowercase(), tail))
}

pub fn email(raw: &str) -> Result<String, String> {
    let value = raw.trim().to_lowercase();
    let mut parts = value.split('@');
    let (local, host) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(host), None) => (local, host),
        _ => return Err("expected exactly one '@'".to_string()),
    };

    if local.is_empty() || local.chars().any(char::is_whitespace) {
        return Err("bad local part".to_string());
    }
    let host = domain(host)?;
    Ok(format!("{}@{}", local, host))
}

/// Accepts `13335`, `"13335"` and `"AS13335"`
pub fn as_number(raw: &str) -> Result<u64, String> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("AS")
        .or_else(|| trimmed.strip_prefix("as"))
        .unwrap_or(trimmed);
    digits
        .parse()
        .map_err(|_| format!("not an AS number '{}'", raw))
}

/// TCP/UDP port, `8080` or `"8080"`
pub fn port(raw: &str) -> Result<u16, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("not a port '{}'", raw))
}

/// Lowercase protocol name, e.g. `TCP` → `tcp`
pub fn protocol(raw: &str) -> Result<String, String> {
    let proto = raw.trim().to_lowercase();
    if proto.is_empty() || !proto.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!("not a protocol '{}'", raw));
    }
    Ok(proto)
}

/// Canonical string form of any single-value observable
pub fn observable_value(kind: ObservableKind, raw: &str) -> Result<String, String> {
    match kind {
        ObservableKind::Ipv4Addr => ipv4(raw),
        ObservableKind::Ipv6Addr => ipv6(raw),
        ObservableKind::DomainName => domain(raw),
        ObservableKind::Url => url(raw),
        ObservableKind::EmailAddr => email(raw),
        ObservableKind::File => hash(raw).map(|(_, digest)| digest),
        ObservableKind::AutonomousSystem => as_number(raw).map(|n| n.to_string()),
    }
}

// ============================================================================
// NAMES
// ============================================================================

/// Trimmed, lowercase, internal whitespace collapsed to one space
pub fn name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// True for ids shaped `type--uuid`
pub fn is_object_id(value: &str) -> bool {
    match value.split_once("--") {
        Some((kind, uuid)) => !kind.is_empty() && uuid::Uuid::parse_str(uuid).is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_strips_leading_zeros() {
        assert_eq!(ipv4(" 001.002.003.004 ").unwrap(), "1.2.3.4");
        assert_eq!(ipv4("10.0.0.0/8").unwrap(), "10.0.0.0/8");
        assert!(ipv4("256.1.1.1").is_err());
        assert!(ipv4("1.2.3").is_err());
        assert!(ipv4("1.2.3.4/33").is_err());
        assert!(ipv4("a.b.c.d").is_err());
    }

    #[test]
    fn test_ipv6_compressed() {
        assert_eq!(
            ipv6("2001:0DB8:0000:0000:0000:0000:0000:0001").unwrap(),
            "2001:db8::1"
        );
        assert_eq!(ipv6("[::1]").unwrap(), "::1");
        assert!(ipv6("1.2.3.4").is_err());
    }

    #[test]
    fn test_domain() {
        assert_eq!(domain("Example.COM.").unwrap(), "example.com");
        assert_eq!(domain("sub.evil-site.org").unwrap(), "sub.evil-site.org");
        assert!(domain("localhost").is_err());
        assert!(domain("1.2.3.4").is_err());
        assert!(domain("-bad.com").is_err());
        assert!(domain("a..com").is_err());
    }

    #[test]
    fn test_url() {
        assert_eq!(
            url(" HTTP://Evil.COM/Path?Q=1 ").unwrap(),
            "http://evil.com/Path?Q=1"
        );
        assert!(url("evil.com/path").is_err());
        assert!(url("http:///path").is_err());
    }

    #[test]
    fn test_hash_algorithm_by_length() {
        let (algo, value) = hash("D41D8CD98F00B204E9800998ECF8427E").unwrap();
        assert_eq!(algo, HashAlgorithm::Md5);
        assert_eq!(value, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hash(&"a".repeat(64)).unwrap().0, HashAlgorithm::Sha256);
        assert!(hash("xyz").is_err());
        assert!(hash(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_email_and_names() {
        assert_eq!(email("Bad.Guy@Evil.COM").unwrap(), "bad.guy@evil.com");
        assert!(email("a@b@c.com").is_err());
        assert_eq!(name("  Emotet \t Loader "), "emotet loader");
        assert_eq!(as_number("AS13335").unwrap(), 13335);
    }

    #[test]
    fn test_port_and_protocol() {
        assert_eq!(port(" 443 ").unwrap(), 443);
        assert!(port("70000").is_err());
        assert!(port("-1").is_err());
        assert_eq!(protocol(" TCP ").unwrap(), "tcp");
        assert!(protocol("").is_err());
        assert!(protocol("tcp/udp").is_err());
    }

    #[test]
    fn test_object_id_shape() {
        assert!(is_object_id("ipv4-addr--00abedb4-aa42-466c-9c01-fed23315a9b7"));
        assert!(!is_object_id("ipv4-addr"));
        assert!(!is_object_id("x--not-a-uuid"));
    }
}
