//! Format Detector (`spec.md` §4.1).
//!
//! Decides `(FileKind, FileFormat)` from a path and the first bytes of
//! content (the contract allows sniffing up to 8 KiB; callers are expected
//! to pass at most that much).

use crate::error::{Error, Result};
use crate::types::{FileFormat, FileKind};

/// Maximum bytes of content the detector will look at when sniffing.
pub const SNIFF_LIMIT: usize = 8 * 1024;

fn kind_from_stem(stem: &str) -> FileKind {
    match stem {
        "plugin" => FileKind::Plugin,
        "hooks" | "hook" => FileKind::Hook,
        "skill" | "SKILL" => FileKind::Skill,
        "command" | "commands" => FileKind::Command,
        "agent" | "agents" => FileKind::Agent,
        "output-style" | "output_style" => FileKind::OutputStyle,
        "reference" => FileKind::Reference,
        _ => FileKind::Documentation,
    }
}

fn looks_like_xml_tag_line(line: &str) -> bool {
    let trimmed = line.trim();
    let Some(inner) = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
    else {
        return false;
    };
    !inner.is_empty()
        && inner
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Sniffs `content` (post-frontmatter, if any) for the first non-blank line
/// and reports whether it looks like an xml-tag section opener.
fn sniff_is_xml(content: &str) -> bool {
    content
        .lines()
        .find(|l| !l.trim().is_empty())
        .is_some_and(looks_like_xml_tag_line)
}

/// Detects `(kind, format)` for a file at `path` given its full content (or
/// at least the first [`SNIFF_LIMIT`] bytes of it).
pub fn detect(path: &str, content: &str) -> Result<(FileKind, FileFormat)> {
    let lower = path.to_ascii_lowercase();
    let file_stem = std::path::Path::new(&lower)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    if lower.ends_with(".json") {
        let kind = if lower.ends_with(".mcp.json") {
            FileKind::Config
        } else {
            match file_stem {
                "plugin" => FileKind::Plugin,
                "hooks" => FileKind::Hook,
                _ => FileKind::Config,
            }
        };
        return Ok((kind, FileFormat::JsonUnit));
    }

    if lower.ends_with(".py") {
        return Ok((FileKind::Script, FileFormat::ScriptPython));
    }
    if lower.ends_with(".js") || lower.ends_with(".mjs") || lower.ends_with(".cjs") {
        return Ok((FileKind::Script, FileFormat::ScriptJs));
    }
    if lower.ends_with(".ts") {
        return Ok((FileKind::Script, FileFormat::ScriptTs));
    }
    if lower.ends_with(".sh") || lower.ends_with(".bash") {
        return Ok((FileKind::Script, FileFormat::ScriptShell));
    }

    if lower.ends_with(".md") || lower.ends_with(".markdown") {
        let sniff_window = &content[..content.len().min(SNIFF_LIMIT)];
        let (_, remainder) = crate::parse::frontmatter::extract(sniff_window);
        let kind = kind_from_stem(file_stem);
        return if sniff_is_xml(remainder) {
            Ok((kind, FileFormat::XmlTags))
        } else {
            Ok((kind, FileFormat::MarkdownHeadings))
        };
    }

    // Ambiguous/unknown extension: sniff content directly.
    let sniff_window = &content[..content.len().min(SNIFF_LIMIT)];
    let (_, remainder) = crate::parse::frontmatter::extract(sniff_window);
    if remainder.lines().any(|l| !l.trim().is_empty()) {
        let kind = kind_from_stem(file_stem);
        return if sniff_is_xml(remainder) {
            Ok((kind, FileFormat::XmlTags))
        } else {
            Ok((kind, FileFormat::MarkdownHeadings))
        };
    }

    Err(Error::UnsupportedFormat(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_markdown_by_extension() {
        let (kind, format) = detect("notes/readme.md", "# hi\n").unwrap();
        assert_eq!(format, FileFormat::MarkdownHeadings);
        assert_eq!(kind, FileKind::Documentation);
    }

    #[test]
    fn detects_plugin_json() {
        let (kind, format) = detect("plugin.json", "{}\n").unwrap();
        assert_eq!(format, FileFormat::JsonUnit);
        assert_eq!(kind, FileKind::Plugin);
    }

    #[test]
    fn detects_mcp_json_as_config() {
        let (kind, format) = detect("foo.mcp.json", "{}\n").unwrap();
        assert_eq!(format, FileFormat::JsonUnit);
        assert_eq!(kind, FileKind::Config);
    }

    #[test]
    fn detects_script_by_extension() {
        let (kind, format) = detect("tool.py", "def f():\n    pass\n").unwrap();
        assert_eq!(format, FileFormat::ScriptPython);
        assert_eq!(kind, FileKind::Script);
    }

    #[test]
    fn md_extension_sniffs_xml_tags() {
        let (_, format) = detect("weird.md", "<outer>\nbody\n</outer>\n").unwrap();
        assert_eq!(format, FileFormat::XmlTags);
    }

    #[test]
    fn unknown_extension_inconclusive_sniff_fails() {
        let err = detect("data.xyz", "").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }
}
