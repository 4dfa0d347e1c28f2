//! Small pure text helpers.

/// Truncate a string to a maximum length, adding `...` if needed.
///
/// Uses `char` count (not bytes) to avoid splitting Unicode scalar values.
#[must_use]
pub fn truncate_with_ellipsis(raw: &str, max: usize) -> String {
    let max = max.max(3);
    let raw = raw.trim();
    if raw.chars().count() <= max {
        return raw.to_string();
    }
    let head: String = raw.chars().take(max - 3).collect();
    format!("{head}...")
}

/// Keep the last `max` characters of command output, prefixed with `...`.
///
/// Failing commands usually report the cause at the end of their output.
#[must_use]
pub fn tail_excerpt(raw: &str, max: usize) -> String {
    let max = max.max(3);
    let raw = raw.trim();
    let count = raw.chars().count();
    if count <= max {
        return raw.to_string();
    }
    let tail: String = raw.chars().skip(count - (max - 3)).collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::{tail_excerpt, truncate_with_ellipsis};

    #[test]
    fn truncate_short_string_unchanged() {
        assert_eq!(truncate_with_ellipsis("hello", 10), "hello");
    }

    #[test]
    fn truncate_adds_ellipsis() {
        assert_eq!(truncate_with_ellipsis("hello world", 8), "hello...");
    }

    #[test]
    fn tail_keeps_end_of_output() {
        assert_eq!(tail_excerpt("error: first\nerror: last", 9), "...: last");
        assert_eq!(tail_excerpt("  ok  ", 10), "ok");
    }
}
