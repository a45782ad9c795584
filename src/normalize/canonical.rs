use url::Url;

/// Query parameter name prefixes that only carry referral tracking.
const TRACKING_PREFIXES: &[&str] = &["utm_", "gh_src", "lever-source"];

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_lowercase();
    TRACKING_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Reduce a raw link to the identity string postings are keyed by.
///
/// Drops the fragment and tracking parameters, lowercases the host and
/// re-encodes the surviving parameters sorted by name. Anything that does not
/// parse as an absolute URL is returned untouched.
pub fn canonicalize(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    url.set_fragment(None);

    if let Some(host) = url.host_str() {
        if host.chars().any(|c| c.is_ascii_uppercase()) {
            let lower = host.to_ascii_lowercase();
            // Only non-special schemes keep host casing; a failure here leaves it as is.
            let _ = url.set_host(Some(&lower));
        }
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    // Stable: repeated keys keep their relative order.
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(&pairs);
    }

    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tracking_params_and_fragment() {
        let raw = "https://boards.greenhouse.io/acme/jobs/123?utm_source=google&gh_src=abc#apply";
        assert_eq!(canonicalize(raw), "https://boards.greenhouse.io/acme/jobs/123");
    }

    #[test]
    fn tracking_prefixes_match_any_casing() {
        let raw = "https://jobs.lever.co/acme/42?UTM_Campaign=x&Lever-Source=linkedin&GH_SRC=1&Utm_medium=y";
        assert_eq!(canonicalize(raw), "https://jobs.lever.co/acme/42");
    }

    #[test]
    fn keeps_other_params_sorted() {
        let raw = "https://apply.workable.com/acme/j/1?z=last&utm_term=q&a=first";
        assert_eq!(canonicalize(raw), "https://apply.workable.com/acme/j/1?a=first&z=last");
    }

    #[test]
    fn repeated_keys_keep_their_order() {
        let raw = "https://jobs.ashbyhq.com/acme?b=2&a=x&b=1";
        assert_eq!(canonicalize(raw), "https://jobs.ashbyhq.com/acme?a=x&b=2&b=1");
    }

    #[test]
    fn lowercases_host_but_not_path() {
        let raw = "https://Boards.GreenHouse.IO/Acme/Jobs/9";
        assert_eq!(canonicalize(raw), "https://boards.greenhouse.io/Acme/Jobs/9");
    }

    #[test]
    fn malformed_input_is_returned_unchanged() {
        assert_eq!(canonicalize("not a url"), "not a url");
        assert_eq!(canonicalize(""), "");
        assert_eq!(canonicalize("http://[::1"), "http://[::1");
    }

    #[test]
    fn is_idempotent() {
        let inputs = [
            "https://boards.greenhouse.io/acme/jobs/123?utm_source=google&gh_src=abc#apply",
            "https://jobs.lever.co/acme/42?lever-source=x&team=QA%20Eng&b=1&a=2",
            "https://Example.COM/path?q=a+b&utm_x=1",
            "https://example.com/?",
            "not a url",
        ];
        for raw in inputs {
            let once = canonicalize(raw);
            assert_eq!(canonicalize(&once), once, "input: {raw}");
        }
    }

    #[test]
    fn tracking_variants_share_one_identity() {
        let a = canonicalize("https://jobs.lever.co/acme/42?lever-source=linkedin");
        let b = canonicalize("https://jobs.lever.co/acme/42?utm_source=google#top");
        assert_eq!(a, b);
    }
}
