//! Typed configuration and per-language limit resolution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use bytesize::ByteSize;
use serde::Deserialize;

use crate::error::{Error, Kind};

/// Top-level, process-wide configuration snapshot.
///
/// Constructed once at startup via [`Settings::load`] and handed to every
/// component by `Arc` reference; nothing mutates it afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,

    /// Build all language images in parallel rather than sequentially.
    pub build_concurrently: bool,
    /// Pre-create one container per language at startup.
    pub prepare_containers: bool,
    /// Minutes between periodic reap passes.
    pub cleanup_interval_minutes: u64,
    /// Directory containing one subdirectory per language.
    pub languages_path: PathBuf,

    pub default_language: LanguageOverride,
    pub languages: HashMap<String, LanguageOverride>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: default_host(),
            port: default_port(),
            build_concurrently: false,
            prepare_containers: false,
            cleanup_interval_minutes: 30,
            languages_path: default_languages_path(),
            default_language: LanguageOverride::defaults(),
            languages: HashMap::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_languages_path() -> PathBuf {
    PathBuf::from("./languages")
}

/// Per-language overrides as they appear on the wire; every field is
/// optional so a language block only needs to set what it diverges on.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LanguageOverride {
    pub memory: Option<ByteSize>,
    pub cpus: Option<f64>,
    pub timeout: Option<u64>,
    pub concurrent: Option<u32>,
    pub retries: Option<u32>,
    pub output_limit: Option<ByteSize>,
}

impl LanguageOverride {
    /// The compiled-in `defaultLanguage` block (mirrors the source's
    /// `config.SetDefaults`).
    fn defaults() -> Self {
        LanguageOverride {
            memory: Some(ByteSize::mb(256)),
            cpus: Some(0.25),
            timeout: Some(20),
            concurrent: Some(5),
            retries: Some(10),
            output_limit: Some(ByteSize::kb(4)),
        }
    }
}

/// Fully resolved, directly usable limits for one language: every field has
/// fallen back to the default block if the language didn't override it.
#[derive(Debug, Clone, Copy)]
pub struct LanguageConfig {
    pub memory_bytes: u64,
    pub cpus: f64,
    pub timeout: Duration,
    pub concurrent: usize,
    pub retries: u32,
    pub output_limit_bytes: u64,
}

impl LanguageConfig {
    /// Nano-CPU value as sent to the container engine: `cpus * 1e9`.
    pub fn nano_cpus(&self) -> i64 {
        (self.cpus * 1_000_000_000f64) as i64
    }
}

impl Settings {
    /// Load configuration from a TOML file, falling back to compiled-in
    /// defaults (plus whatever languages exist on disk) if none of the
    /// conventional paths has a file.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = explicit_path
            .map(PathBuf::from)
            .or_else(find_conventional_config_path);

        let mut settings = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Settings::default(),
        };

        if settings.languages.is_empty() {
            settings.languages = discover_languages(&settings.languages_path);
        }

        Ok(settings)
    }

    /// Override `languages_path` (CLI `-l`/`--languages` or
    /// `MYRIAG_LANGUAGES_PATH`, applied after file load). Only triggers
    /// rediscovery if the config file didn't define an explicit `languages`
    /// table — an explicit table always wins over filesystem discovery.
    pub fn set_languages_path(&mut self, path: PathBuf) {
        self.languages_path = path;
        if self.languages.is_empty() {
            self.languages = discover_languages(&self.languages_path);
        }
    }

    /// Names of every configured language, in no particular order.
    pub fn language_names(&self) -> Vec<String> {
        self.languages.keys().cloned().collect()
    }

    /// `true` if `lang` is present in the Config Registry.
    pub fn supports(&self, lang: &str) -> bool {
        self.languages.contains_key(lang)
    }

    /// Resolve the effective limits for `lang`, falling back field-by-field
    /// to the `defaultLanguage` block. Fails with [`Kind::LanguageNotFound`]
    /// if `lang` is not a configured language.
    pub fn resolve(&self, lang: &str) -> Result<LanguageConfig, Error> {
        let over = self
            .languages
            .get(lang)
            .ok_or_else(|| Error::new("config.resolve", Kind::LanguageNotFound, lang))?;
        let def = &self.default_language;

        Ok(LanguageConfig {
            memory_bytes: over
                .memory
                .or(def.memory)
                .unwrap_or(ByteSize::mb(256))
                .as_u64(),
            cpus: over.cpus.or(def.cpus).unwrap_or(0.25),
            timeout: Duration::from_secs(over.timeout.or(def.timeout).unwrap_or(20)),
            concurrent: over.concurrent.or(def.concurrent).unwrap_or(5) as usize,
            retries: over.retries.or(def.retries).unwrap_or(10),
            output_limit_bytes: over
                .output_limit
                .or(def.output_limit)
                .unwrap_or(ByteSize::kb(4))
                .as_u64(),
        })
    }
}

fn find_conventional_config_path() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("./config.toml"),
        dirs_home().map(|h| h.join(".myriag/config.toml")).unwrap_or_default(),
        PathBuf::from("/etc/myriag/config.toml"),
    ];
    candidates.into_iter().find(|p| p.is_file())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// When no `languages` table is configured, fall back to the subdirectories
/// of `languages_path`, each with no overrides.
fn discover_languages(languages_path: &Path) -> HashMap<String, LanguageOverride> {
    let mut found = HashMap::new();
    let Ok(entries) = std::fs::read_dir(languages_path) else {
        return found;
    };
    for entry in entries.flatten() {
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                found.insert(name.to_string(), LanguageOverride::default());
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(languages: HashMap<String, LanguageOverride>) -> Settings {
        Settings {
            languages,
            ..Settings::default()
        }
    }

    #[test]
    fn language_with_no_overrides_resolves_to_default_block() {
        let mut langs = HashMap::new();
        langs.insert("echo".to_string(), LanguageOverride::default());
        let settings = settings_with(langs);

        let resolved = settings.resolve("echo").unwrap();
        assert_eq!(resolved.memory_bytes, ByteSize::mb(256).as_u64());
        assert_eq!(resolved.cpus, 0.25);
        assert_eq!(resolved.timeout, Duration::from_secs(20));
        assert_eq!(resolved.concurrent, 5);
        assert_eq!(resolved.retries, 10);
        assert_eq!(resolved.output_limit_bytes, ByteSize::kb(4).as_u64());
    }

    #[test]
    fn partial_override_resolves_field_by_field() {
        let mut langs = HashMap::new();
        langs.insert(
            "python".to_string(),
            LanguageOverride {
                timeout: Some(5),
                concurrent: Some(2),
                ..Default::default()
            },
        );
        let settings = settings_with(langs);

        let resolved = settings.resolve("python").unwrap();
        assert_eq!(resolved.timeout, Duration::from_secs(5));
        assert_eq!(resolved.concurrent, 2);
        // Untouched fields still come from the default block.
        assert_eq!(resolved.cpus, 0.25);
        assert_eq!(resolved.retries, 10);
    }

    #[test]
    fn unknown_language_is_language_not_found() {
        let settings = settings_with(HashMap::new());
        let err = settings.resolve("ghost").unwrap_err();
        assert_eq!(err.kind(), Kind::LanguageNotFound);
    }

    #[test]
    fn nano_cpus_scales_by_one_billion() {
        let cfg = LanguageConfig {
            memory_bytes: 0,
            cpus: 0.5,
            timeout: Duration::from_secs(1),
            concurrent: 1,
            retries: 0,
            output_limit_bytes: 0,
        };
        assert_eq!(cfg.nano_cpus(), 500_000_000);
    }

    #[test]
    fn toml_parses_minimal_document() {
        let doc = r#"
            host = "127.0.0.1"
            port = 9000

            [languages.echo]
            timeout = 5
        "#;
        let settings: Settings = toml::from_str(doc).unwrap();
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 9000);
        assert!(settings.supports("echo"));
    }
}
