//! Identity label helpers for issued keys.

const MIN_LEN: usize = 3;
const MAX_LEN: usize = 32;

/// Reduce `raw` to a panel-safe label: lowercase `a-z`, `0-9` and `_`.
///
/// Labels shorter than three characters get `_<now % 10000>` appended; the
/// result is capped at 32 characters.
#[must_use]
pub fn sanitize_identity(raw: &str, now_secs: u64) -> String {
    let mut label: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect();
    if label.len() < MIN_LEN {
        label.push_str(&format!("_{}", now_secs % 10_000));
    }
    label.truncate(MAX_LEN);
    label
}

/// Append a time-derived suffix so repeated requests for the same name don't collide.
#[must_use]
pub fn unique_identity(label: &str, now_secs: u64) -> String {
    let suffix = format!("_{}", now_secs % 100_000);
    let keep = MAX_LEN.saturating_sub(suffix.len());
    let head: String = label.chars().take(keep).collect();
    format!("{head}{suffix}")
}

/// Label of key `index` (1-based) in a batch of `count`.
///
/// In a batch, `base` is shortened so `<base>_<index>` stays within 32 characters.
#[must_use]
pub fn key_identity(base: &str, index: u32, count: u32) -> String {
    if count <= 1 {
        return base.to_string();
    }
    let keep = MAX_LEN.saturating_sub(format!("_{count}").len());
    let head: String = base.chars().take(keep).collect();
    format!("{head}_{index}")
}
