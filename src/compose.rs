//! The Composer (`spec.md` §4.10): assembles a new markdown_headings
//! document from previously-stored sections, in caller-specified order.

use std::collections::HashMap;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::parse::content_hash;
use crate::recompose::recompose_unchecked;
use crate::storage::Storage;
use crate::types::{FileFormat, FileKind, Section, SectionKind};

/// Caller-supplied metadata overrides for the generated frontmatter. Any
/// field left `None`/empty gets a sensible default.
#[derive(Debug, Clone, Default)]
pub struct ComposeOverrides {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
}

/// Result of a successful composition.
#[derive(Debug, Clone)]
pub struct ComposedDocument {
    /// Full byte content, including generated frontmatter.
    pub content: String,
    /// SHA-256 hex of `content`.
    pub content_hash: String,
    /// Most common owning-file kind among the source sections.
    pub kind: FileKind,
}

fn escape_yaml_scalar(s: &str) -> String {
    if s.is_empty() || s.contains(['\n', ':', '#']) || s.trim() != s {
        format!("{:?}", s)
    } else {
        s.to_string()
    }
}

fn yaml_list(items: &[String]) -> String {
    if items.is_empty() {
        return "[]\n".to_string();
    }
    let mut out = String::new();
    for item in items {
        out.push_str("  - ");
        out.push_str(&escape_yaml_scalar(item));
        out.push('\n');
    }
    out
}

fn generate_frontmatter(
    overrides: &ComposeOverrides,
    source_paths: &[String],
    source_section_ids: &[i64],
) -> String {
    let title = overrides.title.clone().unwrap_or_else(|| "Composed Document".to_string());
    let description = overrides.description.clone().unwrap_or_default();
    let author = overrides.author.clone().unwrap_or_default();
    let created_at = Utc::now().to_rfc3339();

    let ids_yaml: Vec<String> = source_section_ids.iter().map(i64::to_string).collect();

    format!(
        "---\ntitle: {}\ndescription: {}\nauthor: {}\ncreated_at: {}\nsource_paths:\n{}source_section_ids:\n{}tags:\n{}---\n",
        escape_yaml_scalar(&title),
        escape_yaml_scalar(&description),
        escape_yaml_scalar(&author),
        created_at,
        yaml_list(source_paths),
        yaml_list(&ids_yaml),
        yaml_list(&overrides.tags),
    )
}

/// Picks the most frequent `FileKind` among `kinds`, ties broken by the
/// kind's first occurrence position in the input (Open Question #1).
fn dominant_kind(kinds: &[FileKind]) -> FileKind {
    let mut counts: Vec<(FileKind, usize)> = Vec::new();
    for &k in kinds {
        if let Some(entry) = counts.iter_mut().find(|(existing, _)| *existing == k) {
            entry.1 += 1;
        } else {
            counts.push((k, 1));
        }
    }
    counts
        .into_iter()
        .enumerate()
        .max_by_key(|(index, (_, count))| (*count, std::cmp::Reverse(*index)))
        .map(|(_, (k, _))| k)
        .unwrap_or(FileKind::Documentation)
}

/// Composes `section_ids` (in the given order) into a new markdown document.
pub fn compose(
    storage: &Storage,
    section_ids: &[i64],
    overrides: &ComposeOverrides,
) -> Result<ComposedDocument> {
    if section_ids.is_empty() {
        return Err(Error::EmptyComposition);
    }

    let mut sources = Vec::with_capacity(section_ids.len());
    for &id in section_ids {
        let section = storage.get_section(id).map_err(|e| match e {
            Error::NotFound(_) => Error::UnknownSection(id),
            other => other,
        })?;
        let path = storage.get_file_path(section.file_id)?;
        sources.push((section, path));
    }

    let kinds: Vec<FileKind> = sources
        .iter()
        .map(|(s, _)| s.file_type.unwrap_or(FileKind::Documentation))
        .collect();
    let kind = dominant_kind(&kinds);

    let mut source_paths: Vec<String> = Vec::new();
    for (_, path) in &sources {
        if !source_paths.contains(path) {
            source_paths.push(path.clone());
        }
    }

    // Hierarchy is reassigned from scratch: each section becomes a child of
    // the nearest preceding section with a strictly smaller level, root
    // otherwise. Original `parent_id`/`order_index` are discarded.
    let mut stack: Vec<(u8, usize)> = Vec::new();
    let mut parents: Vec<Option<usize>> = Vec::with_capacity(sources.len());
    for (i, (section, _)) in sources.iter().enumerate() {
        let level = section.kind.level();
        while let Some(&(top_level, _)) = stack.last() {
            if top_level >= level {
                stack.pop();
            } else {
                break;
            }
        }
        parents.push(stack.last().map(|&(_, idx)| idx));
        stack.push((level, i));
    }

    let mut order_counters: HashMap<Option<i64>, i32> = HashMap::new();
    let mut composed_sections = Vec::with_capacity(sources.len());
    for (i, (section, _)) in sources.iter().enumerate() {
        let parent_id = parents[i].map(|idx| (idx + 1) as i64);
        let order_index = {
            let counter = order_counters.entry(parent_id).or_insert(0);
            let value = *counter;
            *counter += 1;
            value
        };
        composed_sections.push(Section {
            id: (i + 1) as i64,
            file_id: 0,
            parent_id,
            order_index,
            kind: SectionKind::Heading(section.kind.level().max(1)),
            title: section.title.clone(),
            content: section.content.clone(),
            closing_tag_prefix: String::new(),
            line_start: 0,
            line_end: 0,
            file_type: None,
        });
    }

    let frontmatter = generate_frontmatter(overrides, &source_paths, section_ids);
    let content = recompose_unchecked(FileFormat::MarkdownHeadings, &frontmatter, &composed_sections);
    let hash = content_hash(&content);

    Ok(ComposedDocument {
        content,
        content_hash: hash,
        kind,
    })
}
