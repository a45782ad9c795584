use std::sync::LazyLock;

use regex::Regex;

static K_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{2,3})\s*k").unwrap());
static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{2,3}(?:,\d{3})?").unwrap());

/// Turn free salary text into a USD range.
///
/// `k` amounts win over literal amounts. One number gives `min == max`; with
/// more, the first and last are the bounds, ordered so that `min <= max`.
/// `(None, None)` means the text had no recognizable amount.
pub fn parse_salary(raw: &str) -> (Option<i64>, Option<i64>) {
    if raw.is_empty() {
        return (None, None);
    }

    let lower = raw.to_lowercase();
    let thousands: Vec<i64> = K_RE
        .captures_iter(&lower)
        .filter_map(|c| c[1].parse::<i64>().ok())
        .map(|n| n * 1000)
        .collect();
    if let Some(range) = bounds(&thousands) {
        return range;
    }

    let literal: Vec<i64> = MONEY_RE
        .find_iter(raw)
        .filter_map(|m| m.as_str().replace(',', "").parse::<i64>().ok())
        .collect();
    bounds(&literal).unwrap_or((None, None))
}

fn bounds(nums: &[i64]) -> Option<(Option<i64>, Option<i64>)> {
    let first = *nums.first()?;
    let last = *nums.last()?;
    Some((Some(first.min(last)), Some(first.max(last))))
}
