//! Correlation & dispatch: mint a token per test case, send it over the
//! outbound transport, and record what happened.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::HarnessConfig;
use crate::corpus::TestCase;
use crate::mail::{OutboundMessage, OutboundTransport};
use crate::run::CancelToken;
use crate::token::CorrelationToken;

/// Outcome of one send attempt. Set exactly once, at record creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Send failed; the case is excluded from all downstream resolution
    /// and reported under its own count, never as not-found.
    NotSent { reason: String },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// One dispatched test case. Immutable once appended.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub token: CorrelationToken,
    pub case_id: String,
    pub expected_category: String,
    pub subject: String,
    pub sender: String,
    pub dispatched_at: DateTime<Utc>,
    pub outcome: SendOutcome,
}

/// Run-scoped, append-only store of dispatch records. Safe for concurrent
/// insertion from the send pool.
#[derive(Debug, Default)]
pub struct DispatchStore {
    records: Mutex<Vec<DispatchRecord>>,
}

impl DispatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: DispatchRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn snapshot(&self) -> Vec<DispatchRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }

    pub fn sent_count(&self) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.outcome.is_sent())
            .count()
    }
}

/// Send every corpus case through the transport with bounded concurrency.
///
/// Cancellation stops issuing new sends; in-flight sends drain and their
/// records are still appended. A per-message failure is recorded as
/// not-sent and processing continues.
pub async fn run_dispatch(
    transport: Arc<dyn OutboundTransport>,
    corpus: &[TestCase],
    config: &HarnessConfig,
    store: Arc<DispatchStore>,
    cancel: &CancelToken,
) {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
    let mut tasks = JoinSet::new();

    for case in corpus {
        if cancel.is_cancelled() {
            tracing::warn!(
                case_id = %case.id,
                "Dispatch cancelled; remaining cases will not be sent"
            );
            break;
        }

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let token = CorrelationToken::mint();
        let message = OutboundMessage {
            case_id: case.id.clone(),
            to: config.target_inbox.clone(),
            sender: case.sender.clone(),
            subject: case.subject.clone(),
            body: token.append_marker(&case.body),
            token: token.clone(),
        };

        let transport = Arc::clone(&transport);
        let store = Arc::clone(&store);
        let case = case.clone();
        let send_delay = config.smtp.send_delay;

        tasks.spawn(async move {
            let outcome = match transport.send(&message).await {
                Ok(()) => SendOutcome::Sent,
                Err(e) => {
                    tracing::warn!(case_id = %case.id, error = %e, "Send failed");
                    SendOutcome::NotSent {
                        reason: e.to_string(),
                    }
                }
            };

            store.push(DispatchRecord {
                token,
                case_id: case.id,
                expected_category: case.expected_category,
                subject: case.subject,
                sender: case.sender,
                dispatched_at: Utc::now(),
                outcome,
            });

            if !send_delay.is_zero() {
                tokio::time::sleep(send_delay).await;
            }
            drop(permit);
        });
    }

    while tasks.join_next().await.is_some() {}

    tracing::info!(
        sent = store.sent_count(),
        total = store.len(),
        "Dispatch phase complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(case_id: &str, outcome: SendOutcome) -> DispatchRecord {
        DispatchRecord {
            token: CorrelationToken::mint(),
            case_id: case_id.into(),
            expected_category: "invoice".into(),
            subject: "s".into(),
            sender: "a@example.com".into(),
            dispatched_at: Utc::now(),
            outcome,
        }
    }

    #[test]
    fn store_counts_sent_separately() {
        let store = DispatchStore::new();
        store.push(record("case_001", SendOutcome::Sent));
        store.push(record(
            "case_002",
            SendOutcome::NotSent {
                reason: "boom".into(),
            },
        ));
        store.push(record("case_003", SendOutcome::Sent));

        assert_eq!(store.len(), 3);
        assert_eq!(store.sent_count(), 2);
    }

    #[test]
    fn store_concurrent_push() {
        let store = Arc::new(DispatchStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        store.push(record(&format!("case_{i}_{j}"), SendOutcome::Sent));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 400);
    }
}
