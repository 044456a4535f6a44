//! Deterministic serializer: section tree → byte-identical original
//! (`spec.md` §4.7). Pure functions over the in-memory arena, no I/O.

use crate::error::{Error, Result};
use crate::parse::content_hash;
use crate::types::{File, FileFormat, Section, SectionKind};

/// Index of a section alongside its children, built once from a flat,
/// `(parent_id, order_index)`-ordered `Section` list.
struct Node<'a> {
    section: &'a Section,
    children: Vec<Node<'a>>,
}

fn build_tree<'a>(sections: &'a [Section], parent_id: Option<i64>) -> Vec<Node<'a>> {
    let mut nodes: Vec<Node<'a>> = sections
        .iter()
        .filter(|s| s.parent_id == parent_id)
        .map(|s| Node {
            section: s,
            children: build_tree(sections, Some(s.id)),
        })
        .collect();
    nodes.sort_by_key(|n| n.section.order_index);
    nodes
}

fn emit_markdown(nodes: &[Node<'_>], out: &mut String) {
    for node in nodes {
        match node.section.kind {
            SectionKind::Leading => {}
            SectionKind::Heading(level) => {
                out.push_str(&"#".repeat(level as usize));
                out.push(' ');
                out.push_str(&node.section.title);
                out.push('\n');
            }
            _ => unreachable!("markdown_headings sections must be Leading or Heading"),
        }
        out.push_str(&node.section.content);
        emit_markdown(&node.children, out);
    }
}

fn emit_xml(nodes: &[Node<'_>], out: &mut String) {
    for node in nodes {
        // The opening line's indentation isn't tracked separately; documents
        // indent an element's open/close tags symmetrically, so the closing
        // prefix doubles as the opening one.
        out.push_str(&node.section.closing_tag_prefix);
        out.push('<');
        out.push_str(&node.section.title);
        out.push_str(">\n");
        out.push_str(&node.section.content);
        emit_xml(&node.children, out);
        out.push_str(&node.section.closing_tag_prefix);
        out.push_str("</");
        out.push_str(&node.section.title);
        out.push_str(">\n");
    }
}

fn emit_script(sections: &[Section], out: &mut String) {
    let mut ordered: Vec<&Section> = sections.iter().collect();
    ordered.sort_by_key(|s| s.order_index);
    for s in ordered {
        out.push_str(&s.content);
    }
}

/// Recomposes `file` + its `sections` (which must all belong to `file`) into
/// the original byte sequence, verifying the result against
/// `file.content_hash`.
pub fn recompose(file: &File, sections: &[Section]) -> Result<String> {
    let bytes = recompose_unchecked(file.format, &file.frontmatter_raw, sections);

    let actual = content_hash(&bytes);
    if actual != file.content_hash {
        return Err(Error::RoundTripViolation {
            path: file.path.clone(),
            actual,
            expected: file.content_hash.clone(),
        });
    }
    Ok(bytes)
}

/// Recomposes without verifying against a stored hash; used by the Composer,
/// which computes its own hash over freshly produced output.
#[must_use]
pub fn recompose_unchecked(format: FileFormat, frontmatter_raw: &str, sections: &[Section]) -> String {
    let mut out = String::new();
    out.push_str(frontmatter_raw);

    match format {
        FileFormat::JsonUnit => {
            // frontmatter_raw holds the entire file; sections is empty (I5).
        }
        FileFormat::MarkdownHeadings => {
            let roots = build_tree(sections, None);
            emit_markdown(&roots, &mut out);
        }
        FileFormat::XmlTags => {
            let roots = build_tree(sections, None);
            emit_xml(&roots, &mut out);
        }
        FileFormat::ScriptPython
        | FileFormat::ScriptJs
        | FileFormat::ScriptTs
        | FileFormat::ScriptShell => {
            emit_script(sections, &mut out);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn mk_file(format: FileFormat, frontmatter_raw: &str, hash: &str) -> File {
        File {
            id: 1,
            path: "f".to_string(),
            kind: crate::types::FileKind::Documentation,
            format,
            content_hash: hash.to_string(),
            frontmatter_raw: frontmatter_raw.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn mk_section(
        id: i64,
        parent_id: Option<i64>,
        order_index: i32,
        kind: SectionKind,
        title: &str,
        content: &str,
        closing_tag_prefix: &str,
    ) -> Section {
        Section {
            id,
            file_id: 1,
            parent_id,
            order_index,
            kind,
            title: title.to_string(),
            content: content.to_string(),
            closing_tag_prefix: closing_tag_prefix.to_string(),
            line_start: 1,
            line_end: 1,
            file_type: None,
        }
    }

    #[test]
    fn markdown_round_trip() {
        let input = "---\ntitle: T\n---\n# A\nbody1\n## B\nbody2\n";
        let hash = content_hash(input);
        let file = mk_file(FileFormat::MarkdownHeadings, "---\ntitle: T\n---\n", &hash);
        let sections = vec![
            mk_section(1, None, 0, SectionKind::Heading(1), "A", "body1\n", ""),
            mk_section(2, Some(1), 0, SectionKind::Heading(2), "B", "body2\n", ""),
        ];
        let out = recompose(&file, &sections).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn xml_round_trip_with_indented_closer() {
        let input = "<outer>\n  <inner>\n  x\n  </inner>\n</outer>\n";
        let hash = content_hash(input);
        let file = mk_file(FileFormat::XmlTags, "", &hash);
        let sections = vec![
            mk_section(1, None, 0, SectionKind::Tag, "outer", "", ""),
            mk_section(2, Some(1), 0, SectionKind::Tag, "inner", "  x\n", "  "),
        ];
        let out = recompose(&file, &sections).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn mismatch_raises_round_trip_violation() {
        let file = mk_file(FileFormat::MarkdownHeadings, "", "deadbeef");
        let sections = vec![mk_section(1, None, 0, SectionKind::Heading(1), "A", "x\n", "")];
        let err = recompose(&file, &sections).unwrap_err();
        assert!(matches!(err, Error::RoundTripViolation { .. }));
    }

    #[test]
    fn script_round_trip_is_plain_concatenation() {
        let input = "\"\"\"m\"\"\"\n\ndef a():\n    return 1\n";
        let hash = content_hash(input);
        let file = mk_file(FileFormat::ScriptPython, "", &hash);
        let sections = vec![
            mk_section(1, None, 0, SectionKind::Module, "module", "\"\"\"m\"\"\"\n\n", ""),
            mk_section(
                2,
                None,
                1,
                SectionKind::Symbol,
                "a",
                "def a():\n    return 1\n",
                "",
            ),
        ];
        let out = recompose(&file, &sections).unwrap();
        assert_eq!(out, input);
    }
}
