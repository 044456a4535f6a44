//! Core data structures for the skill-split content library.
//!
//! Mirrors the File/Section data model in `spec.md` §3: a `File` owns an
//! ordered, hierarchical tree of `Section`s. Sections are stored in an arena
//! (`Vec<Section>`, parent/child by index) rather than as a pointer-heavy
//! tree, per the redesign guidance in `spec.md` §9.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of library entry a `File` represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Skill,
    Command,
    Reference,
    Agent,
    Plugin,
    Hook,
    OutputStyle,
    Config,
    Documentation,
    Script,
}

impl FileKind {
    /// All kinds, in a stable order used to break ties when picking a
    /// dominant kind during composition.
    #[must_use]
    pub fn all() -> &'static [FileKind] {
        &[
            FileKind::Skill,
            FileKind::Command,
            FileKind::Reference,
            FileKind::Agent,
            FileKind::Plugin,
            FileKind::Hook,
            FileKind::OutputStyle,
            FileKind::Config,
            FileKind::Documentation,
            FileKind::Script,
        ]
    }
}

/// The parse strategy selected for a `File`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    MarkdownHeadings,
    XmlTags,
    JsonUnit,
    ScriptPython,
    ScriptJs,
    ScriptTs,
    ScriptShell,
}

impl FileFormat {
    /// True for any of the `script_*` variants.
    #[must_use]
    pub fn is_script(self) -> bool {
        matches!(
            self,
            FileFormat::ScriptPython
                | FileFormat::ScriptJs
                | FileFormat::ScriptTs
                | FileFormat::ScriptShell
        )
    }
}

/// Sentinel discriminator for a `Section`'s `level` field, replacing the
/// magic "tag"/"symbol"/"unit" sentinel values described in `spec.md` §3/§9
/// with a proper enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// `markdown_headings`: numeric heading level 1..=N.
    Heading(u8),
    /// `markdown_headings`: synthetic leading content before the first heading.
    Leading,
    /// `xml_tags`: a tag-delimited block; nesting is via `parent_id`.
    Tag,
    /// `script_*`: everything before the first detected symbol.
    Module,
    /// `script_*`: a detected top-level symbol (function/class/etc).
    Symbol,
    /// `script_*`: everything after the last symbol's terminator line.
    Footer,
}

impl SectionKind {
    /// Numeric level for markdown headings, or `0` for every other kind
    /// (matching the "sentinel" framing in `spec.md` §3).
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            SectionKind::Heading(l) => l,
            _ => 0,
        }
    }
}

/// A parsed, stored file: unique by absolute path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    /// Database-assigned identifier. `0` before the file has been stored.
    pub id: i64,
    /// Absolute filesystem path; unique across the store.
    pub path: String,
    /// What kind of library entry this is.
    pub kind: FileKind,
    /// Which parser/recomposer strategy applies.
    pub format: FileFormat,
    /// Hex-encoded SHA-256 of the original bytes.
    pub content_hash: String,
    /// Leading fenced metadata block, exact bytes including delimiters; empty
    /// if the file has none. For `json_unit` files this holds the entire
    /// file.
    pub frontmatter_raw: String,
    /// When this file was first stored.
    pub created_at: DateTime<Utc>,
    /// When this file was last re-stored.
    pub updated_at: DateTime<Utc>,
}

impl File {
    /// True when this file's format carries zero sections by construction
    /// (invariant I5).
    #[must_use]
    pub fn is_json_unit(&self) -> bool {
        self.format == FileFormat::JsonUnit
    }
}

/// A single section of a `File`: an ordered, hierarchical byte range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Database-assigned identifier. `0` before the section has been stored.
    pub id: i64,
    /// Owning file id.
    pub file_id: i64,
    /// Parent section id, or `None` at the root of the file's tree.
    pub parent_id: Option<i64>,
    /// 0-based, dense position among siblings (invariant I2).
    pub order_index: i32,
    /// Sentinel discriminator replacing numeric magic values (§9).
    pub kind: SectionKind,
    /// Heading text (markdown), tag name (XML), symbol/`module`/`footer`
    /// name (script). Never includes the heading `#`s or the XML angle
    /// brackets.
    pub title: String,
    /// Body bytes exactly as they will be re-emitted, excluding the
    /// heading/opening-delimiter line the Recomposer reconstructs from
    /// `title` + `kind`.
    pub content: String,
    /// For `xml_tags` sections: the exact whitespace preceding `</tag>`.
    /// Empty for every other format.
    pub closing_tag_prefix: String,
    /// 1-based inclusive start line, for diagnostics/navigation only.
    pub line_start: usize,
    /// 1-based inclusive end line, for diagnostics/navigation only.
    pub line_end: usize,
    /// Denormalized from the owning `File` on read, for query convenience.
    pub file_type: Option<FileKind>,
}

/// Severity of a parser diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    Info,
    Warn,
    Error,
}

/// A non-fatal observation made while parsing (e.g. "no headings found").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub line: Option<usize>,
}

/// The in-memory result of parsing a file, before it is transferred into the
/// `Store`. `sections` is a flat arena; `parent_id`/`order_index` encode the
/// tree.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub frontmatter_raw: String,
    pub sections: Vec<ParsedSection>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A parsed section prior to database assignment of ids.
#[derive(Debug, Clone)]
pub struct ParsedSection {
    /// Index of the parent section within `ParsedDocument::sections`, or
    /// `None` for a root section.
    pub parent: Option<usize>,
    pub order_index: i32,
    pub kind: SectionKind,
    pub title: String,
    pub content: String,
    pub closing_tag_prefix: String,
    pub line_start: usize,
    pub line_end: usize,
}

/// A table-of-contents style navigation entry (used by `tree`/`list` CLI
/// output); mirrors the section hierarchy without content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocEntry {
    pub section_id: i64,
    pub title: String,
    pub level: u8,
    pub children: Vec<TocEntry>,
}

/// Lifecycle state of a logged [`Checkout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Deployed,
    CheckedIn,
}

/// A logged deployment of a stored `File` to the filesystem (`spec.md`
/// §4.11): one row per `checkout` call, updated in place by `checkin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    pub id: i64,
    pub file_id: i64,
    pub target_path: String,
    /// Every path written during the deploy (primary + related files), in
    /// the order they were written.
    pub deployed_paths: Vec<String>,
    pub user_id: Option<String>,
    pub status: CheckoutStatus,
    pub created_at: DateTime<Utc>,
    pub checked_in_at: Option<DateTime<Utc>>,
}
