//! skill-split: a section-level content library.
//!
//! Decomposes structured text files into an addressable hierarchy of
//! sections, stores them in a relational index, and provides byte-perfect
//! reconstruction, progressive disclosure, ranked/hybrid search, and
//! composition of new documents from stored sections.

pub mod backup;
pub mod checkout;
pub mod compose;
pub mod embedding;
pub mod error;
pub mod parse;
pub mod recompose;
pub mod search;
pub mod secrets;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
pub use types::{File, FileFormat, FileKind, Section, SectionKind};

/// Crate version, re-exported for CLI `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
