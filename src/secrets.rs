//! Layered secret resolution (`spec.md` §6 "Environment"): config file → OS
//! keyring → environment variable. Modeled on the teacher's
//! `StorageConfig`/`EmbeddingConfig` structs and its `#[arg(long, env =
//! "...")]` CLI pattern, generalized into an explicit ordered chain of
//! [`SecretSource`]s so the keyring/cloud-vendor specifics (out of scope,
//! `SPEC_FULL.md` §1) stay a pluggable seam rather than baked into callers.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// One layer of the secret resolution chain.
pub trait SecretSource: Send + Sync {
    /// Looks up `key` in this source, if present.
    fn get(&self, key: &str) -> Option<String>;

    /// Short, stable name for logging which layer resolved (or missed) a key.
    fn name(&self) -> &'static str;
}

/// A simple `key=value` config file (one per line, `#` comments, blank lines
/// ignored). Not the YAML frontmatter grammar used elsewhere in this crate —
/// deliberately the simplest format that satisfies the "config file" layer
/// of the resolution order.
pub struct ConfigFileSource {
    values: HashMap<String, String>,
}

impl ConfigFileSource {
    /// Loads `path`; a missing file resolves to an empty source rather than
    /// an error, since the config file is optional in the resolution chain.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let values = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            parse_key_value(&content)
        } else {
            HashMap::new()
        };
        Ok(Self { values })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self { values: HashMap::new() }
    }
}

fn parse_key_value(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            out.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    out
}

impl SecretSource for ConfigFileSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn name(&self) -> &'static str {
        "config_file"
    }
}

/// Seam for an OS keyring integration. Vendoring a real keyring crate is out
/// of scope (Non-goal: no vendored credential stores, `SPEC_FULL.md` §1), so
/// this is the in-process stand-in: it never yields a value, but a real
/// implementation can be dropped in behind [`SecretSource`] without touching
/// the resolution order or call sites.
pub struct NullKeyringSource;

impl SecretSource for NullKeyringSource {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn name(&self) -> &'static str {
        "os_keyring"
    }
}

/// Resolves `key` from the process environment, upper-snake-cased the way
/// `clap`'s `env = "..."` attributes do.
pub struct EnvSource;

impl SecretSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn name(&self) -> &'static str {
        "environment"
    }
}

/// Resolves secrets through an ordered chain of [`SecretSource`]s, stopping
/// at the first hit (`spec.md` §6: config file → OS keyring → environment
/// variable).
pub struct SecretResolver {
    sources: Vec<Box<dyn SecretSource>>,
}

impl SecretResolver {
    #[must_use]
    pub fn new(sources: Vec<Box<dyn SecretSource>>) -> Self {
        Self { sources }
    }

    /// The standard chain: config file, then the keyring seam, then env.
    #[must_use]
    pub fn standard(config_file: ConfigFileSource) -> Self {
        Self::new(vec![
            Box::new(config_file),
            Box::new(NullKeyringSource),
            Box::new(EnvSource),
        ])
    }

    /// Resolves `key`, returning [`Error::SecretNotFound`] if no source in
    /// the chain yields a value.
    pub fn resolve(&self, key: &str) -> Result<String> {
        for source in &self.sources {
            if let Some(value) = source.get(key) {
                tracing::debug!(key, source = source.name(), "resolved secret");
                return Ok(value);
            }
        }
        Err(Error::SecretNotFound(key.to_string()))
    }

    /// Like [`resolve`](Self::resolve), but returns `None` instead of an
    /// error when nothing yields a value — for optional credentials (e.g. an
    /// embedding provider key that's only needed for `search-semantic`).
    #[must_use]
    pub fn resolve_optional(&self, key: &str) -> Option<String> {
        self.resolve(key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_takes_priority_over_env() {
        std::env::set_var("SKILLSPLIT_TEST_KEY_A", "from-env");
        let mut config = ConfigFileSource::empty();
        config.values.insert("SKILLSPLIT_TEST_KEY_A".to_string(), "from-config".to_string());

        let resolver = SecretResolver::standard(config);
        assert_eq!(resolver.resolve("SKILLSPLIT_TEST_KEY_A").unwrap(), "from-config");
        std::env::remove_var("SKILLSPLIT_TEST_KEY_A");
    }

    #[test]
    fn falls_back_to_env_when_config_misses() {
        std::env::set_var("SKILLSPLIT_TEST_KEY_B", "from-env");
        let resolver = SecretResolver::standard(ConfigFileSource::empty());
        assert_eq!(resolver.resolve("SKILLSPLIT_TEST_KEY_B").unwrap(), "from-env");
        std::env::remove_var("SKILLSPLIT_TEST_KEY_B");
    }

    #[test]
    fn missing_everywhere_is_secret_not_found() {
        let resolver = SecretResolver::standard(ConfigFileSource::empty());
        let err = resolver.resolve("SKILLSPLIT_TEST_KEY_DOES_NOT_EXIST").unwrap_err();
        assert!(matches!(err, Error::SecretNotFound(_)));
        assert!(resolver.resolve_optional("SKILLSPLIT_TEST_KEY_DOES_NOT_EXIST").is_none());
    }

    #[test]
    fn parses_key_value_config_file() {
        let parsed = parse_key_value("# comment\nFOO=bar\n\nBAZ = qux \n");
        assert_eq!(parsed.get("FOO"), Some(&"bar".to_string()));
        assert_eq!(parsed.get("BAZ"), Some(&"qux".to_string()));
    }
}
