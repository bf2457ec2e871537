//! Error types for the routing validation harness.
//!
//! Only connectivity failures during pre-flight are fatal. Every other error
//! class (a failed send, a token found nowhere or in two places, a deletion
//! that did not stick) is recorded into the run's stores and surfaces in the
//! report instead of propagating.

/// Top-level error type for the harness.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connectivity error: {0}")]
    Connectivity(#[from] ConnectivityError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Inspection error: {0}")]
    Inspect(#[from] InspectError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Pre-flight connectivity failures. Fatal: the run aborts before any
/// message is dispatched.
#[derive(Debug, thiserror::Error)]
pub enum ConnectivityError {
    #[error("SMTP server {host}:{port} not reachable: {reason}")]
    Smtp {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("IMAP server {host}:{port} not reachable: {reason}")]
    Imap {
        host: String,
        port: u16,
        reason: String,
    },
}

/// Test corpus loading errors.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("Failed to read corpus file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse corpus file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Corpus is empty: {path}")]
    Empty { path: String },
}

/// A per-message send failure. Recorded as a not-sent dispatch outcome;
/// never fails the run.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message for case {case_id}: {reason}")]
    BuildFailed { case_id: String, reason: String },

    #[error("SMTP send failed for case {case_id}: {reason}")]
    SendFailed { case_id: String, reason: String },
}

/// IMAP protocol errors during inspection. A failed search for one token
/// degrades that token to not-located; a broken session surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("IMAP connection failed: {0}")]
    Connect(String),

    #[error("IMAP login failed for user {username}")]
    Login { username: String },

    #[error("IMAP command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A per-message deletion failure during cleanup. Logged, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("Failed to delete message {uid} in folder {folder}: {reason}")]
    DeleteFailed {
        folder: String,
        uid: u32,
        reason: String,
    },
}

/// Report export errors.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Failed to write report {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type alias for the harness.
pub type Result<T> = std::result::Result<T, Error>;
