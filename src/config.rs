//! Harness configuration, resolved once from environment variables.
//!
//! Everything is materialized into a single [`HarnessConfig`] value before
//! the run starts; no component re-reads the environment afterwards. Config
//! file parsing and CLI flags live outside this crate.

use std::time::Duration;

use crate::error::ConfigError;

/// SMTP (outbound) endpoint configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    /// Optional pause between sends, to stay under provider rate limits.
    pub send_delay: Duration,
}

/// IMAP (inspection) endpoint configuration.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// The configured folder-to-category table.
///
/// Declared order is load-bearing: it defines the deterministic folder
/// search order and the tie-break winner for multi-folder hits.
#[derive(Debug, Clone, Default)]
pub struct CategoryMap {
    entries: Vec<(String, String)>,
}

/// Reserved label for messages found in a folder with no mapping.
pub const UNCATEGORIZED: &str = "uncategorized";

impl CategoryMap {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// Category for a folder, or `None` if the folder is unmapped.
    pub fn category_for(&self, folder: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(f, _)| f == folder)
            .map(|(_, c)| c.as_str())
    }

    /// Mapped folder names in declared order.
    pub fn folders(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(f, _)| f.as_str())
    }

    /// Distinct category labels in declared order.
    pub fn categories(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for (_, c) in &self.entries {
            if !seen.iter().any(|s| s == c) {
                seen.push(c.clone());
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse `folder=category,folder=category` pairs.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (folder, category) =
                pair.split_once('=')
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: "ROUTECHECK_FOLDER_MAP".into(),
                        message: format!("expected folder=category, got {pair:?}"),
                    })?;
            entries.push((folder.trim().to_string(), category.trim().to_string()));
        }
        Ok(Self { entries })
    }
}

/// Complete, fully-resolved harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub smtp: SmtpConfig,
    pub imap: ImapConfig,
    /// Address the pipeline under test watches.
    pub target_inbox: String,
    /// Folder-to-category table, loaded once per run.
    pub mapping: CategoryMap,
    /// Declared category labels, in report ordering.
    pub categories: Vec<String>,
    /// Settlement window before inspection begins.
    pub settle: Duration,
    /// Delete located test messages after the report is produced.
    pub cleanup: bool,
    /// Bound on concurrent sends / searches within a phase.
    pub max_concurrency: usize,
    pub corpus_path: String,
    pub output_dir: String,
}

impl HarnessConfig {
    /// Build config from environment variables.
    ///
    /// Connection details and the target inbox are required; everything
    /// else has defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let require = |key: &str| {
            std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
        };

        let smtp_host = require("ROUTECHECK_SMTP_HOST")?;
        let imap_host = require("ROUTECHECK_IMAP_HOST")?;
        let username = require("ROUTECHECK_USERNAME")?;
        let password = require("ROUTECHECK_PASSWORD")?;
        let target_inbox = require("ROUTECHECK_TARGET_INBOX")?;

        let smtp_port: u16 = env_parse("ROUTECHECK_SMTP_PORT", 587)?;
        let imap_port: u16 = env_parse("ROUTECHECK_IMAP_PORT", 993)?;

        let from_address =
            std::env::var("ROUTECHECK_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        let send_delay_ms: u64 = env_parse("ROUTECHECK_SEND_DELAY_MS", 0)?;
        let settle_secs: u64 = env_parse("ROUTECHECK_SETTLE_SECS", 120)?;
        let max_concurrency: usize = env_parse("ROUTECHECK_MAX_CONCURRENCY", 4)?;

        let cleanup = std::env::var("ROUTECHECK_CLEANUP")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        let mapping = match std::env::var("ROUTECHECK_FOLDER_MAP") {
            Ok(spec) => CategoryMap::parse(&spec)?,
            Err(_) => CategoryMap::default(),
        };
        if mapping.is_empty() {
            return Err(ConfigError::MissingEnvVar("ROUTECHECK_FOLDER_MAP".into()));
        }

        // Category order defaults to mapping declaration order; an explicit
        // list wins so reports can carry categories no folder maps to yet.
        let categories = match std::env::var("ROUTECHECK_CATEGORIES") {
            Ok(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => mapping.categories(),
        };

        let corpus_path = std::env::var("ROUTECHECK_CORPUS")
            .unwrap_or_else(|_| "testdata/corpus.json".to_string());
        let output_dir =
            std::env::var("ROUTECHECK_OUTPUT_DIR").unwrap_or_else(|_| "results".to_string());

        Ok(Self {
            smtp: SmtpConfig {
                host: smtp_host,
                port: smtp_port,
                username: username.clone(),
                password: password.clone(),
                from_address,
                send_delay: Duration::from_millis(send_delay_ms),
            },
            imap: ImapConfig {
                host: imap_host,
                port: imap_port,
                username,
                password,
            },
            target_inbox,
            mapping,
            categories,
            settle: Duration::from_secs(settle_secs),
            cleanup,
            max_concurrency: max_concurrency.max(1),
            corpus_path,
            output_dir,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}
