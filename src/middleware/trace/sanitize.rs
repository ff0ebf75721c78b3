//! Bounding and cleaning of tag keys and values.
//!
//! Lengths are counted in characters, and cuts always land on a character
//! boundary.

/// Default ceiling for a tag value, in characters.
pub const MAX_TAG_VALUE_LEN: usize = 200;

/// Default ceiling for a tag key, in characters.
pub const MAX_TAG_KEY_LEN: usize = 32;

const ELLIPSIS: &str = "...";

/// Ceilings every tag written to a [`Span`](super::Span) is held to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TagLimits {
    /// Maximum value length, in characters.
    pub value: usize,
    /// Maximum key length, in characters.
    pub key: usize,
}

impl Default for TagLimits {
    fn default() -> Self {
        Self { value: MAX_TAG_VALUE_LEN, key: MAX_TAG_KEY_LEN }
    }
}

/// Collapses CR, LF and TAB to single spaces and cuts the value to at most
/// `max` characters, ending in `...` when something was cut.
pub fn sanitize_value(value: &str, max: usize) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| match c {
            '\r' | '\n' | '\t' => ' ',
            c => c,
        })
        .collect();

    if cleaned.chars().count() <= max {
        return cleaned;
    }

    if max < ELLIPSIS.len() {
        return ELLIPSIS[..max].to_owned();
    }

    let keep = max - ELLIPSIS.len();
    let mut out: String = cleaned.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Cuts a tag key to at most `max` characters. No marker is added.
pub fn truncate_key(key: &str, max: usize) -> &str {
    match key.char_indices().nth(max) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn short_values_pass_through() {
        let s = "i3WEG3605Kj7".repeat(9);
        assert_eq!(sanitize_value(&s, MAX_TAG_VALUE_LEN), s);
        assert_eq!(sanitize_value("", MAX_TAG_VALUE_LEN), "");
    }

    #[test]
    fn line_breaks_and_tabs_become_spaces() {
        assert_eq!(sanitize_value("a\r\nb\tc", MAX_TAG_VALUE_LEN), "a  b c");
    }

    #[test]
    fn long_values_are_cut_with_marker() {
        let s = format!("05Kj7\n{}", "z".repeat(300));
        let got = sanitize_value(&s, MAX_TAG_VALUE_LEN);
        assert_eq!(got.chars().count(), MAX_TAG_VALUE_LEN);
        assert!(got.starts_with("05Kj7 zzz"));
        assert!(got.ends_with("z..."));
    }

    #[test]
    fn exactly_max_is_not_cut() {
        let s = "a".repeat(MAX_TAG_VALUE_LEN);
        assert_eq!(sanitize_value(&s, MAX_TAG_VALUE_LEN), s);
        let s = "a".repeat(MAX_TAG_VALUE_LEN + 1);
        assert_eq!(
            sanitize_value(&s, MAX_TAG_VALUE_LEN),
            format!("{}...", "a".repeat(MAX_TAG_VALUE_LEN - 3)),
        );
    }

    #[test]
    fn multibyte_values_cut_on_char_boundary() {
        let s = "é".repeat(10);
        assert_eq!(sanitize_value(&s, 6), "ééé...");
    }

    #[test]
    fn tiny_limits_still_respect_the_ceiling() {
        assert_eq!(sanitize_value("abcdef", 2), "..");
        assert_eq!(sanitize_value("abcdef", 0), "");
    }

    #[test]
    fn keys_are_truncated_without_marker() {
        assert_eq!(truncate_key("req.header.Content-Type", MAX_TAG_KEY_LEN), "req.header.Content-Type");
        let long = "resp.header.Access-Control-Allow-Credentials";
        let cut = truncate_key(long, MAX_TAG_KEY_LEN);
        assert_eq!(cut.chars().count(), MAX_TAG_KEY_LEN);
        assert!(long.starts_with(cut));
        assert_eq!(truncate_key("ключ", 2), "кл");
    }

    proptest! {
        #[test]
        fn value_never_exceeds_max(value in any::<String>(), max in 0usize..300) {
            let out = sanitize_value(&value, max);
            prop_assert!(out.chars().count() <= max);
            prop_assert!(!out.contains(['\r', '\n', '\t']));
        }

        #[test]
        fn short_value_only_loses_line_breaks(value in any::<String>(), slack in 0usize..50) {
            let max = value.chars().count() + slack;
            let expected = value.replace(['\r', '\n', '\t'], " ");
            prop_assert_eq!(sanitize_value(&value, max), expected);
        }

        #[test]
        fn sanitize_is_idempotent(value in any::<String>(), max in 0usize..300) {
            let once = sanitize_value(&value, max);
            prop_assert_eq!(sanitize_value(&once, max), once.clone());
        }

        #[test]
        fn key_is_a_bounded_prefix(key in any::<String>(), max in 0usize..64) {
            let cut = truncate_key(&key, max);
            prop_assert!(cut.chars().count() <= max);
            prop_assert!(key.starts_with(cut));
            if key.chars().count() <= max {
                prop_assert_eq!(cut, key.as_str());
            }
        }
    }
}
