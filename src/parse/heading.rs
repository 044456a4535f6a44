//! ATX heading parser (`spec.md` §4.3, format `markdown_headings`).
//!
//! Splits the post-frontmatter remainder into a hierarchical section tree.
//! Code fences (``` or ~~~) are honored: headings inside a fenced block are
//! plain text, not section boundaries.

use crate::types::{Diagnostic, DiagnosticSeverity, ParsedSection, SectionKind};

struct Heading {
    level: u8,
    title: String,
    /// Line index (0-based) of the heading line itself.
    line_idx: usize,
}

fn is_fence_delimiter(trimmed: &str) -> bool {
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn heading_level(trimmed: &str) -> Option<(u8, &str)> {
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    // An ATX heading requires the `#`s to be followed by a space or EOL.
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some((hashes as u8, rest.strip_prefix(' ').unwrap_or(rest)))
}

/// Splits `s` into lines, each retaining its trailing `\n` (if any) so
/// concatenation reconstructs the original bytes exactly.
fn split_keep_newline(s: &str) -> Vec<&str> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split_inclusive('\n').collect()
}

struct Building {
    parent: Option<usize>,
    level: u8,
    title: String,
    content: String,
    line_start: usize,
    line_end: usize,
    is_leading: bool,
}

/// Parses `remainder` (post-frontmatter bytes) into a flat arena of
/// `ParsedSection`s plus any diagnostics.
#[must_use]
pub fn parse(remainder: &str) -> (Vec<ParsedSection>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let lines = split_keep_newline(remainder);

    let mut headings = Vec::new();
    let mut inside_fence = false;
    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        let trimmed_start = trimmed.trim_start();
        if is_fence_delimiter(trimmed_start) {
            inside_fence = !inside_fence;
            continue;
        }
        if inside_fence {
            continue;
        }
        if let Some((level, title)) = heading_level(trimmed) {
            headings.push(Heading {
                level,
                title: title.to_string(),
                line_idx: idx,
            });
        }
    }

    if headings.is_empty() {
        diagnostics.push(Diagnostic {
            severity: DiagnosticSeverity::Info,
            message: "no headings found; entire content stored as a single leading section"
                .to_string(),
            line: None,
        });
        let content = lines.concat();
        let section = ParsedSection {
            parent: None,
            order_index: 0,
            kind: SectionKind::Leading,
            title: String::new(),
            content,
            closing_tag_prefix: String::new(),
            line_start: 1,
            line_end: lines.len().max(1),
        };
        return (vec![section], diagnostics);
    }

    let mut building: Vec<Building> = Vec::new();

    // Leading content before the first heading.
    if headings[0].line_idx > 0 {
        let content = lines[..headings[0].line_idx].concat();
        building.push(Building {
            parent: None,
            level: 0,
            title: String::new(),
            content,
            line_start: 1,
            line_end: headings[0].line_idx,
            is_leading: true,
        });
    }

    // A monotonic stack of (level, index-into-building) gives each heading's
    // parent in one linear pass (per the arena/stack guidance for hierarchy
    // rebuilds).
    let mut stack: Vec<(u8, usize)> = Vec::new();

    for (hi, heading) in headings.iter().enumerate() {
        let body_start = heading.line_idx + 1;
        let body_end = headings
            .get(hi + 1)
            .map_or(lines.len(), |next| next.line_idx);
        let content = lines[body_start..body_end].concat();

        while let Some(&(top_level, _)) = stack.last() {
            if top_level >= heading.level {
                stack.pop();
            } else {
                break;
            }
        }
        let parent = stack.last().map(|&(_, idx)| idx);

        let section_idx = building.len();
        building.push(Building {
            parent,
            level: heading.level,
            title: heading.title.clone(),
            content,
            line_start: heading.line_idx + 1,
            line_end: body_end,
            is_leading: false,
        });
        stack.push((heading.level, section_idx));
    }

    let mut next_order_index = vec![0i32; building.len() + 1];
    let result = building
        .into_iter()
        .map(|s| {
            let parent_key = s.parent.map_or(0, |p| p + 1);
            let order_index = next_order_index[parent_key];
            next_order_index[parent_key] += 1;
            ParsedSection {
                parent: s.parent,
                order_index,
                kind: if s.is_leading {
                    SectionKind::Leading
                } else {
                    SectionKind::Heading(s.level)
                },
                title: s.title,
                content: s.content,
                closing_tag_prefix: String::new(),
                line_start: s.line_start,
                line_end: s.line_end,
            }
        })
        .collect();

    (result, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_headings_yields_single_leading_section() {
        let (sections, diags) = parse("just text\nmore text\n");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].kind, SectionKind::Leading);
        assert_eq!(sections[0].content, "just text\nmore text\n");
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn heading_starts_file_no_leading_section() {
        let (sections, _) = parse("# A\nbody1\n## B\nbody2\n");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].kind, SectionKind::Heading(1));
        assert_eq!(sections[0].title, "A");
        assert_eq!(sections[0].content, "body1\n");
        assert_eq!(sections[1].kind, SectionKind::Heading(2));
        assert_eq!(sections[1].parent, Some(0));
        assert_eq!(sections[1].content, "body2\n");
    }

    #[test]
    fn fenced_code_hides_headings() {
        let input = "# A\n```\n# not a heading\n```\nbody\n";
        let (sections, _) = parse(input);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "```\n# not a heading\n```\nbody\n");
    }

    #[test]
    fn sibling_or_shallower_closes_deeper_sections() {
        let input = "# A\na\n## B\nb\n## C\nc\n# D\nd\n";
        let (sections, _) = parse(input);
        // A, B(parent A), C(parent A), D
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[1].parent, Some(0));
        assert_eq!(sections[2].parent, Some(0));
        assert_eq!(sections[2].order_index, 1);
        assert_eq!(sections[3].parent, None);
        assert_eq!(sections[3].order_index, 1);
    }

    #[test]
    fn leading_content_becomes_level_zero_section() {
        let input = "intro text\n# A\nbody\n";
        let (sections, _) = parse(input);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].kind, SectionKind::Leading);
        assert_eq!(sections[0].content, "intro text\n");
    }
}
