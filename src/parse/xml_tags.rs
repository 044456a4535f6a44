//! XML-tag parser (`spec.md` §4.4, format `xml_tags`).
//!
//! A section begins with a line whose trimmed content matches `<name>`
//! (lowercase letters, digits, underscore) and ends with the matching
//! `</name>`. Nesting is expressed via `parent_id`; interior blank lines and
//! indentation are preserved verbatim in `content`.

use std::collections::HashMap;

use crate::types::{ParsedSection, SectionKind};

fn opening_tag(trimmed: &str) -> Option<&str> {
    let inner = trimmed.strip_prefix('<')?.strip_suffix('>')?;
    if inner.is_empty()
        || !inner
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return None;
    }
    Some(inner)
}

fn closing_tag(trimmed: &str, name: &str) -> bool {
    trimmed.strip_prefix("</").and_then(|s| s.strip_suffix('>')) == Some(name)
}

struct Frame {
    name: String,
    own_index: usize,
    parent: Option<usize>,
    order_index: i32,
    body_start: usize,
    /// Line index this frame has captured up through; advanced past each
    /// child's closing line so `content` only holds bytes this tag owns
    /// directly, never a child's span (that child re-emits its own bytes on
    /// recompose, so including them here would double them).
    cursor: usize,
    /// Gaps captured so far: text before the first child, between children,
    /// and (once closed) after the last child.
    content_parts: Vec<String>,
}

/// Parses `remainder` into a flat arena of `ParsedSection`s. Returns an error
/// message (not yet wrapped in `Error`) if a tag is left unclosed.
pub fn parse(remainder: &str) -> Result<Vec<ParsedSection>, String> {
    let lines: Vec<&str> = if remainder.is_empty() {
        Vec::new()
    } else {
        remainder.split_inclusive('\n').collect()
    };

    let mut slots: Vec<Option<ParsedSection>> = Vec::new();
    let mut order_counters: HashMap<Option<usize>, i32> = HashMap::new();
    let mut stack: Vec<Frame> = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let bare = line.trim_end_matches(['\n', '\r']);
        let trimmed = bare.trim();

        if let Some(top) = stack.last() {
            if closing_tag(trimmed, &top.name) {
                let mut frame = stack.pop().unwrap();
                let indent_len = bare.len() - bare.trim_start().len();
                let closing_tag_prefix = bare[..indent_len].to_string();
                frame.content_parts.push(lines[frame.cursor..idx].concat());
                let content = frame.content_parts.concat();
                slots[frame.own_index] = Some(ParsedSection {
                    parent: frame.parent,
                    order_index: frame.order_index,
                    kind: SectionKind::Tag,
                    title: frame.name,
                    content,
                    closing_tag_prefix,
                    line_start: frame.body_start,
                    line_end: idx,
                });
                if let Some(parent) = stack.last_mut() {
                    parent.cursor = idx + 1;
                }
                continue;
            }
        }

        if let Some(name) = opening_tag(trimmed) {
            let parent = stack.last().map(|f| f.own_index);
            if let Some(top) = stack.last_mut() {
                top.content_parts.push(lines[top.cursor..idx].concat());
            }
            let order_index = *order_counters.entry(parent).or_insert(0);
            *order_counters.get_mut(&parent).unwrap() += 1;
            let own_index = slots.len();
            slots.push(None);
            stack.push(Frame {
                name: name.to_string(),
                own_index,
                parent,
                order_index,
                body_start: idx + 1,
                cursor: idx + 1,
                content_parts: Vec::new(),
            });
        }
    }

    if !stack.is_empty() {
        let unclosed: Vec<_> = stack.iter().map(|f| f.name.clone()).collect();
        return Err(format!("unclosed xml tag(s): {}", unclosed.join(", ")));
    }

    slots
        .into_iter()
        .map(|s| s.ok_or_else(|| "internal error: unfilled xml section slot".to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_round_trip_shape() {
        let input = "<outer>\n  <inner>\n  x\n  </inner>\n</outer>\n";
        let sections = parse(input).unwrap();
        assert_eq!(sections.len(), 2);
        let inner = sections.iter().find(|s| s.title == "inner").unwrap();
        assert_eq!(inner.closing_tag_prefix, "  ");
        assert_eq!(inner.content, "  x\n");
        let outer = sections.iter().find(|s| s.title == "outer").unwrap();
        assert_eq!(outer.closing_tag_prefix, "");
        assert_eq!(outer.content, "");
    }

    #[test]
    fn nested_tags_round_trip_through_parse_file() {
        let input = "<outer>\n  <inner>\n  x\n  </inner>\n</outer>\n";
        let parsed = crate::parse::parse_file("f.xml", input).unwrap();
        let file = crate::types::File {
            id: 0,
            path: "f.xml".to_string(),
            kind: parsed.kind,
            format: parsed.format,
            content_hash: parsed.content_hash.clone(),
            frontmatter_raw: parsed.document.frontmatter_raw.clone(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let sections: Vec<crate::types::Section> = parsed
            .document
            .sections
            .iter()
            .enumerate()
            .map(|(i, s)| crate::types::Section {
                id: i as i64,
                file_id: 0,
                parent_id: s.parent.map(|p| p as i64),
                order_index: s.order_index,
                kind: s.kind,
                title: s.title.clone(),
                content: s.content.clone(),
                closing_tag_prefix: s.closing_tag_prefix.clone(),
                line_start: s.line_start,
                line_end: s.line_end,
                file_type: None,
            })
            .collect();
        let recomposed = crate::recompose::recompose(&file, &sections).unwrap();
        assert_eq!(recomposed, input);
    }

    #[test]
    fn unclosed_tag_errors() {
        let input = "<outer>\nbody\n";
        assert!(parse(input).is_err());
    }

    #[test]
    fn siblings_preserve_order() {
        let input = "<a>\n1\n</a>\n<b>\n2\n</b>\n";
        let sections = parse(input).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "a");
        assert_eq!(sections[0].order_index, 0);
        assert_eq!(sections[1].title, "b");
        assert_eq!(sections[1].order_index, 1);
    }

    #[test]
    fn sibling_children_under_different_parents_both_start_at_zero() {
        let input = "<a>\n<x>\n1\n</x>\n</a>\n<b>\n<y>\n2\n</y>\n</b>\n";
        let sections = parse(input).unwrap();
        let x = sections.iter().find(|s| s.title == "x").unwrap();
        let y = sections.iter().find(|s| s.title == "y").unwrap();
        assert_eq!(x.order_index, 0);
        assert_eq!(y.order_index, 0);
    }
}
