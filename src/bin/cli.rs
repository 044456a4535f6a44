//! skill-split CLI
//!
//! Command-line interface over the skill-split content library.

use std::io::{self, Write};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use skillsplit::backup;
use skillsplit::checkout;
use skillsplit::compose::{self, ComposeOverrides};
use skillsplit::embedding::{Embedder, TfIdfEmbedder};
use skillsplit::error::Result;
use skillsplit::recompose::recompose;
use skillsplit::search::{Query, SearchStrategy, DEFAULT_VECTOR_WEIGHT};
use skillsplit::storage::{Storage, StorageConfig, StorageMode};
use skillsplit::types::FileKind;

const DEFAULT_MODEL: &str = "tfidf-local";
const DEFAULT_DIMENSIONS: usize = 128;

#[derive(Parser)]
#[command(name = "skillsplit")]
#[command(about = "A section-level content library for structured text files")]
#[command(version)]
struct Cli {
    /// Database path
    #[arg(long, env = "SKILLSPLIT_DB_PATH", default_value = "~/.local/share/skillsplit/library.db")]
    db_path: String,

    /// Use the DELETE journal instead of WAL (required on cloud-synced folders)
    #[arg(long, env = "SKILLSPLIT_CLOUD_SAFE")]
    cloud_safe: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dry run: show the detected section tree without writing anything
    Parse {
        path: String,
    },
    /// Parse and verify round-trip without storing
    Validate {
        path: String,
    },
    /// Parse, store, and verify round-trip; aborts on a round-trip violation
    Store {
        path: String,
    },
    /// List sections for a stored file
    List {
        path: String,
    },
    /// Hierarchical view of a stored file's sections, with ids
    Tree {
        path: String,
    },
    /// Print one section by id
    GetSection {
        id: i64,
    },
    /// Progressive disclosure: first child (with --child) or next sibling
    Next {
        id: i64,
        path: String,
        #[arg(long)]
        child: bool,
    },
    /// Ranked BM25 text search
    Search {
        query: String,
        #[arg(long)]
        file: Option<String>,
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },
    /// Hybrid keyword + vector search (degrades to text-only without embeddings)
    SearchSemantic {
        query: String,
        #[arg(long, default_value_t = DEFAULT_VECTOR_WEIGHT)]
        vector_weight: f32,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Parse + round-trip SHA-256 compare against the stored file
    Verify {
        path: String,
    },
    /// Atomically deploy a stored file (and any related files) to the filesystem
    Checkout {
        file_id: i64,
        target_path: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Delete a deployed file and update its checkout record
    Checkin {
        target_path: String,
    },
    /// List active (deployed) checkouts
    Status,
    /// Write a new file assembled from stored sections
    Compose {
        #[arg(long, value_delimiter = ',')]
        sections: Vec<i64>,
        #[arg(long)]
        output: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Write a compressed logical dump of the store
    Backup {
        #[arg(long)]
        filename: Option<String>,
    },
    /// Restore a store from a dump produced by `backup`
    Restore {
        dump_path: String,
        #[arg(long)]
        overwrite: bool,
    },
    /// Bulk-store every file under a directory
    Ingest {
        path: String,
    },
    /// List every stored file
    ListLibrary {
        #[arg(long)]
        kind: Option<String>,
    },
    /// Search stored files by path
    SearchLibrary {
        query: String,
    },
    /// Interactive REPL over search and progressive disclosure
    Interactive,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let db_path = shellexpand::tilde(&cli.db_path).to_string();
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let storage_mode = if cli.cloud_safe { StorageMode::CloudSafe } else { StorageMode::Local };
    let storage = Storage::open(StorageConfig { db_path: db_path.clone(), storage_mode })?;

    match cli.command {
        Commands::Parse { path } => {
            let content = std::fs::read_to_string(&path)?;
            let parsed = skillsplit::parse::parse_file(&path, &content)?;
            println!("kind: {:?}, format: {:?}", parsed.kind, parsed.format);
            for (idx, section) in parsed.document.sections.iter().enumerate() {
                println!("[{idx}] {:?} {:?}: {} bytes", section.kind, section.title, section.content.len());
            }
            for diagnostic in &parsed.document.diagnostics {
                println!("diagnostic: {:?} {}", diagnostic.severity, diagnostic.message);
            }
        }

        Commands::Validate { path } | Commands::Verify { path } => {
            let content = std::fs::read_to_string(&path)?;
            let parsed = skillsplit::parse::parse_file(&path, &content)?;
            let file = skillsplit::types::File {
                id: 0,
                path: path.clone(),
                kind: parsed.kind,
                format: parsed.format,
                content_hash: parsed.content_hash.clone(),
                frontmatter_raw: parsed.document.frontmatter_raw.clone(),
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            };
            let sections: Vec<skillsplit::types::Section> = parsed
                .document
                .sections
                .iter()
                .enumerate()
                .map(|(i, s)| skillsplit::types::Section {
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
            let recomposed = recompose(&file, &sections)?;
            if recomposed == content {
                println!("ok: round-trip verified ({} sections)", sections.len());
            } else {
                println!("FAILED: recomposed content does not match original bytes");
                std::process::exit(1);
            }
        }

        Commands::Store { path } => {
            let content = std::fs::read_to_string(&path)?;
            let file_id = storage.store(&path, &content)?;
            println!("stored {path} as file #{file_id}");
        }

        Commands::List { path } => {
            let (_, sections) = storage.get_file(&path)?;
            for section in &sections {
                println!("#{} [{:?}] {}", section.id, section.kind, section.title);
            }
        }

        Commands::Tree { path } => {
            let (_, sections) = storage.get_file(&path)?;
            let toc = Storage::build_toc(&sections);
            print_toc(&toc, 0);
        }

        Commands::GetSection { id } => {
            let query = Query::new(storage);
            let section = query.get_section(id)?;
            println!("#{} [{:?}] {}", section.id, section.kind, section.title);
            println!("{}", section.content);
        }

        Commands::Next { id, path, child } => {
            let (file, _) = storage.get_file(&path)?;
            let _ = file;
            let query = Query::new(storage);
            match query.next(id, child)? {
                Some(next_id) => println!("{next_id}"),
                None => println!("(none)"),
            }
        }

        Commands::Search { query, file, limit } => {
            let file_id = match file {
                Some(path) => Some(storage.get_file(&path)?.0.id),
                None => None,
            };
            let results = Query::new(storage).search(&query, file_id, limit)?;
            for m in results {
                println!("#{} (score {:.3}) [{}] {}", m.section_id, m.score, m.level, m.title);
            }
        }

        Commands::SearchSemantic { query, vector_weight, limit } => {
            let embedder = TfIdfEmbedder::new(DEFAULT_DIMENSIONS);
            let query_vector = embedder.embed(&query).ok();
            let results = Query::new(storage).search_hybrid(
                SearchStrategy::Hybrid,
                &query,
                query_vector.as_deref(),
                DEFAULT_MODEL,
                vector_weight,
                None,
                limit,
            )?;
            for hit in results {
                println!("#{} (score {:.3}) [{}] {}", hit.section_id, hit.score, hit.level, hit.title);
            }
        }

        Commands::Checkout { file_id, target_path, user } => {
            let deployed = checkout::checkout(&storage, file_id, &target_path, user.as_deref())?;
            println!("checked out to {deployed}");
        }

        Commands::Checkin { target_path } => {
            let active = storage.list_checkouts(Some("deployed"))?;
            let record = active
                .into_iter()
                .find(|c| c.target_path == target_path)
                .ok_or_else(|| skillsplit::error::Error::NotFound(format!("active checkout: {target_path}")))?;
            checkout::checkin(&storage, record.id)?;
            println!("checked in {target_path}");
        }

        Commands::Status => {
            for c in checkout::list_active(&storage)? {
                println!(
                    "#{} file={} target={} user={} since={}",
                    c.id,
                    c.file_id,
                    c.target_path,
                    c.user_id.as_deref().unwrap_or("-"),
                    c.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        Commands::Compose { sections, output, title, description, author, tags } => {
            let overrides = ComposeOverrides { title, description, author, tags };
            let doc = compose::compose(&storage, &sections, &overrides)?;
            std::fs::write(&output, &doc.content)?;
            println!("composed {} sections into {output} ({:?})", sections.len(), doc.kind);
        }

        Commands::Backup { filename } => {
            let filename = filename.unwrap_or_else(backup::default_filename);
            let size = backup::backup(&storage, &filename)?;
            println!("wrote {filename} ({size} bytes)");
        }

        Commands::Restore { dump_path, overwrite } => {
            drop(storage);
            let report = backup::restore(&dump_path, &db_path, overwrite)?;
            println!(
                "restored {} files, {} sections, {} checkouts, {} embeddings",
                report.files, report.sections, report.checkouts, report.embeddings
            );
            if report.round_trip_ok {
                println!("round-trip check: ok");
            } else {
                println!("round-trip check: FAILED for {} file(s):", report.failures.len());
                for failure in &report.failures {
                    println!("  {failure}");
                }
                std::process::exit(1);
            }
        }

        Commands::Ingest { path } => {
            let mut count = 0usize;
            for entry in walk_files(&path)? {
                let content = match std::fs::read_to_string(&entry) {
                    Ok(c) => c,
                    Err(_) => continue, // skip unreadable/binary files
                };
                match storage.store(&entry, &content) {
                    Ok(_) => count += 1,
                    Err(e) => eprintln!("skipping {entry}: {e}"),
                }
            }
            println!("ingested {count} file(s) under {path}");
        }

        Commands::ListLibrary { kind } => {
            let kind_filter = kind
                .map(|k| serde_json::from_value::<FileKind>(serde_json::Value::String(k.clone())))
                .transpose()
                .map_err(|_| skillsplit::error::Error::UnsupportedFormat("unknown --kind".to_string()))?;
            for file in storage.list_files(kind_filter)? {
                println!("#{} [{:?}] {}", file.id, file.kind, file.path);
            }
        }

        Commands::SearchLibrary { query } => {
            for file in storage.list_files(None)? {
                if file.path.to_lowercase().contains(&query.to_lowercase()) {
                    println!("#{} [{:?}] {}", file.id, file.kind, file.path);
                }
            }
        }

        Commands::Interactive => run_interactive(storage)?,
    }

    Ok(())
}

fn print_toc(entries: &[skillsplit::types::TocEntry], depth: usize) {
    for entry in entries {
        println!("{}#{} {}", "  ".repeat(depth), entry.section_id, entry.title);
        print_toc(&entry.children, depth + 1);
    }
}

/// Recursively lists every regular file under `root` (used by `ingest`).
fn walk_files(root: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let metadata = std::fs::metadata(root)?;
    if metadata.is_file() {
        out.push(root.to_string());
        return Ok(out);
    }
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk_files(&path.to_string_lossy())?);
        } else {
            out.push(path.to_string_lossy().to_string());
        }
    }
    Ok(out)
}

fn run_interactive(storage: Storage) -> Result<()> {
    println!("skill-split interactive mode");
    println!("Type 'help' for commands, 'quit' to exit\n");

    let query = Query::new(storage);
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("skillsplit> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "quit" | "exit" => break,
            "help" => {
                println!("Commands:");
                println!("  search <query>  - ranked text search");
                println!("  next <id>       - next sibling section");
                println!("  quit            - exit");
            }
            _ if line.starts_with("search ") => {
                let text = line[7..].trim();
                match query.search(text, None, 10) {
                    Ok(results) => {
                        for m in results {
                            println!("#{} ({:.2}) {}", m.section_id, m.score, m.title);
                        }
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }
            _ if line.starts_with("next ") => {
                if let Ok(id) = line[5..].trim().parse::<i64>() {
                    match query.next(id, false) {
                        Ok(Some(next_id)) => println!("{next_id}"),
                        Ok(None) => println!("(none)"),
                        Err(e) => println!("Error: {e}"),
                    }
                } else {
                    println!("Invalid id");
                }
            }
            _ => println!("Unknown command. Type 'help' for available commands."),
        }
    }

    println!("Goodbye!");
    Ok(())
}
