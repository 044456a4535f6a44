//! Frontmatter extraction (`spec.md` §4.2).
//!
//! Treats a leading `---`-fenced block as opaque bytes: never parses the
//! YAML, so round-trip holds even when the block is malformed.

/// Splits `content` into `(frontmatter_raw, remainder)`.
///
/// `frontmatter_raw` includes both `---` delimiter lines and the trailing
/// newline of the closing delimiter. If `content` does not begin with a line
/// that is exactly `---` (trailing whitespace ignored only for the match),
/// returns `("", content)`.
#[must_use]
pub fn extract(content: &str) -> (&str, &str) {
    let mut lines = content.split_inclusive('\n');
    let Some(first_line) = lines.next() else {
        return ("", content);
    };
    if first_line.trim_end() != "---" {
        return ("", content);
    }

    let mut offset = first_line.len();
    for line in lines {
        offset += line.len();
        if line.trim_end() == "---" {
            return content.split_at(offset);
        }
    }

    // Unterminated fence: no closing `---` found, so there is no frontmatter.
    ("", content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_simple_fence() {
        let input = "---\ntitle: T\n---\n# A\n";
        let (raw, rest) = extract(input);
        assert_eq!(raw, "---\ntitle: T\n---\n");
        assert_eq!(rest, "# A\n");
        assert_eq!(format!("{raw}{rest}"), input);
    }

    #[test]
    fn absent_when_no_leading_fence() {
        let input = "# A\nbody\n";
        let (raw, rest) = extract(input);
        assert_eq!(raw, "");
        assert_eq!(rest, input);
    }

    #[test]
    fn absent_when_fence_unterminated() {
        let input = "---\ntitle: T\n# A\n";
        let (raw, rest) = extract(input);
        assert_eq!(raw, "");
        assert_eq!(rest, input);
    }

    #[test]
    fn trailing_whitespace_on_delimiter_still_matches() {
        let input = "---  \ntitle: T\n---\t\n# A\n";
        let (raw, rest) = extract(input);
        assert_eq!(raw, "---  \ntitle: T\n---\t\n");
        assert_eq!(rest, "# A\n");
    }

    #[test]
    fn is_left_inverse_of_emit() {
        let input = "---\na: 1\nb: 2\n---\nbody\nmore\n";
        let (raw, rest) = extract(input);
        assert_eq!(format!("{raw}{rest}"), input);
    }
}
