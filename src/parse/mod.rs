//! Parsing entry point: detect → extract frontmatter → dispatch to the
//! format-specific parser, producing a [`ParsedDocument`] plus the original
//! content hash (`spec.md` §4.1–§4.6, §9's sum-type dispatch guidance).

pub mod detect;
pub mod frontmatter;
pub mod heading;
pub mod json_unit;
pub mod script;
pub mod xml_tags;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::types::{FileFormat, FileKind, ParsedDocument};

/// Hex-encoded SHA-256 of `bytes`.
#[must_use]
pub fn content_hash(bytes: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_bytes());
    hex::encode(hasher.finalize())
}

/// The result of running the Format Detector + format-specific parser over a
/// file's content.
pub struct Parsed {
    pub kind: FileKind,
    pub format: FileFormat,
    pub content_hash: String,
    pub document: ParsedDocument,
}

/// Parses `content` (the full, original bytes of a file at `path`) into a
/// [`Parsed`] result, ready to be handed to the Recomposer for round-trip
/// verification and then to the Store.
pub fn parse_file(path: &str, content: &str) -> Result<Parsed> {
    let (kind, format) = detect::detect(path, content)?;
    let hash = content_hash(content);

    let document = match format {
        FileFormat::JsonUnit => ParsedDocument {
            frontmatter_raw: json_unit::extract(content).to_string(),
            sections: Vec::new(),
            diagnostics: Vec::new(),
        },
        FileFormat::MarkdownHeadings => {
            let (raw, remainder) = frontmatter::extract(content);
            let (sections, diagnostics) = heading::parse(remainder);
            ParsedDocument {
                frontmatter_raw: raw.to_string(),
                sections,
                diagnostics,
            }
        }
        FileFormat::XmlTags => {
            let (raw, remainder) = frontmatter::extract(content);
            let sections = xml_tags::parse(remainder).map_err(Error::Parse)?;
            ParsedDocument {
                frontmatter_raw: raw.to_string(),
                sections,
                diagnostics: Vec::new(),
            }
        }
        FileFormat::ScriptPython
        | FileFormat::ScriptJs
        | FileFormat::ScriptTs
        | FileFormat::ScriptShell => ParsedDocument {
            frontmatter_raw: String::new(),
            sections: script::parse(format, content),
            diagnostics: Vec::new(),
        },
    };

    Ok(Parsed {
        kind,
        format,
        content_hash: hash,
        document,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_markdown_file_end_to_end() {
        let input = "---\ntitle: T\n---\n# A\nbody1\n## B\nbody2\n";
        let parsed = parse_file("skills/thing/SKILL.md", input).unwrap();
        assert_eq!(parsed.format, FileFormat::MarkdownHeadings);
        assert_eq!(parsed.document.frontmatter_raw, "---\ntitle: T\n---\n");
        assert_eq!(parsed.document.sections.len(), 2);
    }

    #[test]
    fn json_unit_has_no_sections() {
        let input = "{\"name\": \"x\"}\n";
        let parsed = parse_file("plugin.json", input).unwrap();
        assert_eq!(parsed.format, FileFormat::JsonUnit);
        assert!(parsed.document.sections.is_empty());
        assert_eq!(parsed.document.frontmatter_raw, input);
    }
}
