//! Inspection & resolution: locate each sent token in the mailbox and map
//! its folder to a predicted category.
//!
//! Search is two-pass. The header pass is the fast path; the body-marker
//! pass runs only when the header pass finds nothing anywhere, which is
//! what defeats header-stripping intermediaries. Both passes walk folders
//! in the configured order, so a token found in several folders resolves
//! deterministically to the lowest-ordered one and is flagged ambiguous.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{CategoryMap, UNCATEGORIZED};
use crate::dispatch::DispatchRecord;
use crate::mail::{MailboxInspector, MessageRef};
use crate::run::CancelToken;
use crate::token::{CorrelationToken, TOKEN_HEADER};

/// Where one sent token was (or was not) found.
#[derive(Debug, Clone)]
pub struct ResolutionRecord {
    pub token: CorrelationToken,
    pub case_id: String,
    pub expected_category: String,
    pub located: bool,
    /// Winning folder, if located.
    pub folder: Option<String>,
    /// True when the token turned up in more than one folder.
    pub ambiguous: bool,
    /// Mapped category, `uncategorized` for unmapped folders, `None` iff
    /// not located.
    pub predicted_category: Option<String>,
    /// Identity of the winning message, kept for cleanup.
    pub message: Option<MessageRef>,
    pub resolved_at: DateTime<Utc>,
}

impl ResolutionRecord {
    pub fn is_correct(&self) -> bool {
        self.located && self.predicted_category.as_deref() == Some(&self.expected_category)
    }
}

/// Run-scoped, append-only store of resolution records.
#[derive(Debug, Default)]
pub struct ResolutionStore {
    records: Mutex<Vec<ResolutionRecord>>,
}

impl ResolutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: ResolutionRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn snapshot(&self) -> Vec<ResolutionRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }

    pub fn located_count(&self) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.located)
            .count()
    }
}

/// Deterministic folder search order: mapped folders in declared order,
/// then INBOX, then any remaining server folders lexically.
pub fn search_order(mapping: &CategoryMap, server_folders: &[String]) -> Vec<String> {
    let mut order: Vec<String> = mapping.folders().map(str::to_string).collect();

    if !order.iter().any(|f| f == "INBOX") {
        order.push("INBOX".to_string());
    }

    let extra: BTreeSet<&String> = server_folders
        .iter()
        .filter(|f| !order.iter().any(|o| o == *f))
        .collect();
    order.extend(extra.into_iter().cloned());

    order
}

/// Search every sent record with bounded concurrency and append one
/// resolution record per token.
pub async fn run_inspection(
    inspector: Arc<dyn MailboxInspector>,
    sent: Vec<DispatchRecord>,
    mapping: &CategoryMap,
    folders: Vec<String>,
    max_concurrency: usize,
    store: Arc<ResolutionStore>,
    cancel: &CancelToken,
) {
    let semaphore = Arc::new(Semaphore::new(max_concurrency));
    let mut tasks = JoinSet::new();
    let folders = Arc::new(folders);
    let mapping = Arc::new(mapping.clone());

    // A cancel that only ended the settlement wait early must not skip
    // inspection; this phase stops on cancels issued after it started.
    let baseline = cancel.generation();

    for record in sent {
        if cancel.generation() > baseline {
            tracing::warn!(
                case_id = %record.case_id,
                "Inspection cancelled; remaining tokens will not be searched"
            );
            break;
        }

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let inspector = Arc::clone(&inspector);
        let store = Arc::clone(&store);
        let folders = Arc::clone(&folders);
        let mapping = Arc::clone(&mapping);

        tasks.spawn(async move {
            let hits = locate_token(inspector.as_ref(), &folders, &record.token).await;
            store.push(resolve(&record, hits, &mapping));
            drop(permit);
        });
    }

    while tasks.join_next().await.is_some() {}

    tracing::info!(
        located = store.located_count(),
        searched = store.len(),
        "Inspection phase complete"
    );
}

/// Both search passes for one token. A failed search of an individual
/// folder is logged and skipped; the token simply is not found there.
async fn locate_token(
    inspector: &dyn MailboxInspector,
    folders: &[String],
    token: &CorrelationToken,
) -> Vec<MessageRef> {
    let mut hits = Vec::new();

    for folder in folders {
        match inspector
            .search_header(folder, TOKEN_HEADER, token.as_str())
            .await
        {
            Ok(found) => hits.extend(found),
            Err(e) => {
                tracing::warn!(%folder, %token, error = %e, "Header search failed")
            }
        }
    }

    if !hits.is_empty() {
        return hits;
    }

    // Header channel yielded nothing anywhere; fall back to the body marker.
    let marker = token.marker_line();
    for folder in folders {
        match inspector.search_body(folder, &marker).await {
            Ok(found) => hits.extend(found),
            Err(e) => tracing::warn!(%folder, %token, error = %e, "Body search failed"),
        }
    }

    hits
}

/// Turn search hits into a resolution record. Hits arrive in folder search
/// order, so the first one is the deterministic winner.
fn resolve(record: &DispatchRecord, hits: Vec<MessageRef>, mapping: &CategoryMap) -> ResolutionRecord {
    let distinct_folders: BTreeSet<&str> = hits.iter().map(|h| h.folder.as_str()).collect();
    let ambiguous = distinct_folders.len() > 1;
    let winner = hits.into_iter().next();

    let (located, folder, predicted) = match &winner {
        Some(hit) => {
            let category = mapping
                .category_for(&hit.folder)
                .unwrap_or(UNCATEGORIZED)
                .to_string();
            (true, Some(hit.folder.clone()), Some(category))
        }
        None => (false, None, None),
    };

    if ambiguous {
        tracing::warn!(
            case_id = %record.case_id,
            token = %record.token,
            winner = folder.as_deref().unwrap_or(""),
            "Token found in multiple folders; resolving to lowest-ordered"
        );
    }

    ResolutionRecord {
        token: record.token.clone(),
        case_id: record.case_id.clone(),
        expected_category: record.expected_category.clone(),
        located,
        folder,
        ambiguous,
        predicted_category: predicted,
        message: winner,
        resolved_at: Utc::now(),
    }
}
