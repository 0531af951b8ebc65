//! Address scanner: finds email-shaped substrings in extracted text.

use std::sync::LazyLock;

use regex::Regex;

/// Address-shaped pattern: ASCII local part (letters, digits, `._%+-`),
/// `@`, then a domain with at least one dot and a 2+ letter suffix.
const ADDRESS_PATTERN: &str = r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}";

static SCAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ADDRESS_PATTERN).expect("address pattern compiles"));

static EXACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{ADDRESS_PATTERN}$")).expect("anchored address pattern compiles")
});

/// Yield candidate addresses in the order they appear in `text`.
///
/// No deduplication is performed: a document containing the same address
/// twice yields two candidates, and two dispatches if it validates. This is
/// documented behavior, not an oversight.
pub fn scan_addresses(text: &str) -> impl Iterator<Item = &str> {
    SCAN_RE.find_iter(text).map(|m| m.as_str())
}

/// Whole-string syntax check against the same pattern the scanner uses.
pub fn is_address(candidate: &str) -> bool {
    EXACT_RE.is_match(candidate)
}

/// The domain part of an address (everything after the last `@`).
pub fn domain_of(address: &str) -> &str {
    address.rsplit('@').next().unwrap_or(address)
}
