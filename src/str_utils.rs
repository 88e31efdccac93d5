use std::borrow::Cow;

/// Safely returns a prefix of the string with at most `max_chars` characters.
/// This respects UTF-8 character boundaries.
pub fn prefix_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Short, single-line rendering of a payload for log lines.
pub fn preview(s: &str, max_chars: usize) -> Cow<'_, str> {
    let head = prefix_chars(s, max_chars);
    let needs_escape = head.contains(|c: char| c == '\n' || c == '\r');
    match (head.len() < s.len(), needs_escape) {
        (false, false) => Cow::Borrowed(s),
        (truncated, _) => {
            let mut out = head.replace('\n', "\\n").replace('\r', "\\r");
            if truncated {
                out.push('…');
            }
            Cow::Owned(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_respects_char_boundaries() {
        assert_eq!(prefix_chars("αβγδ", 2), "αβ");
        assert_eq!(prefix_chars("ab", 10), "ab");
    }

    #[test]
    fn preview_truncates_and_escapes() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdef", 3), "abc…");
        assert_eq!(preview("a\nb", 10), "a\\nb");
    }
}
