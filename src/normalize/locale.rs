use std::sync::LazyLock;

use regex::Regex;

/// "us" standing alone. Hyphens and slashes do not delimit it, so `en-us` and
/// `/us/` paths in markup are not markers.
static US_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s(,;])us(?:$|[\s),.;])").unwrap());

const EXPLICIT_PHRASES: &[&str] = &["remote - us", "remote (us)"];

/// Heuristic: is this a remote role open to US-based candidates?
///
/// Leans towards `false`; a bare "remote" without a US marker is not enough.
pub fn is_remote_us(location: &str, page_text: &str) -> bool {
    let text = format!("{} {}", location, page_text).to_lowercase();

    if EXPLICIT_PHRASES.iter().any(|p| text.contains(p)) {
        return true;
    }

    text.contains("remote") && (text.contains("united states") || US_TOKEN_RE.is_match(&text))
}
