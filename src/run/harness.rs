//! Phase-sequential run orchestrator.

use std::sync::Arc;

use crate::config::HarnessConfig;
use crate::corpus::TestCase;
use crate::dispatch;
use crate::error::Result;
use crate::inspect::{self, ResolutionRecord};
use crate::mail::{MailboxInspector, OutboundTransport};
use crate::report::{self, RunReport};
use crate::run::context::{CancelToken, RunContext};
use crate::run::phase::RunPhase;

/// The validation harness: dispatch, settle, inspect, report, clean.
///
/// Both endpoints are trait objects so tests can run the full lifecycle
/// against in-memory backends.
pub struct Harness {
    config: HarnessConfig,
    transport: Arc<dyn OutboundTransport>,
    inspector: Arc<dyn MailboxInspector>,
}

impl Harness {
    pub fn new(
        config: HarnessConfig,
        transport: Arc<dyn OutboundTransport>,
        inspector: Arc<dyn MailboxInspector>,
    ) -> Self {
        Self {
            config,
            transport,
            inspector,
        }
    }

    /// Run one full validation pass over the corpus.
    ///
    /// Fails only on pre-flight connectivity; every later problem degrades
    /// into the report. Cancellation mid-run still yields a partial report
    /// covering whatever completed.
    pub async fn execute(&self, corpus: &[TestCase], cancel: CancelToken) -> Result<RunReport> {
        let ctx = RunContext::new(cancel);
        tracing::info!(run_id = %ctx.run_id, cases = corpus.len(), "Run starting");

        // Pre-flight: both endpoints must answer before any side effect.
        if let Err(e) = self.transport.check().await {
            ctx.advance(RunPhase::Failed);
            return Err(e.into());
        }
        if let Err(e) = self.inspector.check().await {
            ctx.advance(RunPhase::Failed);
            return Err(e.into());
        }

        ctx.advance(RunPhase::Dispatching);
        dispatch::run_dispatch(
            Arc::clone(&self.transport),
            corpus,
            &self.config,
            Arc::clone(&ctx.dispatches),
            &ctx.cancel,
        )
        .await;

        let sent: Vec<_> = ctx
            .dispatches
            .snapshot()
            .into_iter()
            .filter(|r| r.outcome.is_sent())
            .collect();

        if sent.is_empty() {
            tracing::warn!("No message was sent; reporting without inspection");
            ctx.advance(RunPhase::Reporting);
            let report = self.build(&ctx);
            ctx.advance(RunPhase::Done);
            return Ok(report);
        }

        ctx.advance(RunPhase::Waiting);
        self.settle(&ctx.cancel).await;

        ctx.advance(RunPhase::Inspecting);
        let folders = match self.inspector.list_folders().await {
            Ok(folders) => folders,
            Err(e) => {
                // Degrade: search only the configured folders.
                tracing::warn!(error = %e, "Folder listing failed; using configured folders only");
                Vec::new()
            }
        };
        let order = inspect::search_order(&self.config.mapping, &folders);
        inspect::run_inspection(
            Arc::clone(&self.inspector),
            sent,
            &self.config.mapping,
            order,
            self.config.max_concurrency,
            Arc::clone(&ctx.resolutions),
            &ctx.cancel,
        )
        .await;

        ctx.advance(RunPhase::Reporting);
        let report = self.build(&ctx);

        if self.config.cleanup {
            ctx.advance(RunPhase::Cleaning);
            self.clean(&ctx.resolutions.snapshot()).await;
        }

        ctx.advance(RunPhase::Done);
        tracing::info!(run_id = %ctx.run_id, accuracy = report.overall_accuracy, "Run complete");
        Ok(report)
    }

    /// The settlement barrier: one uniform wait for the whole batch.
    /// Cancellation short-circuits into inspection with elapsed time.
    async fn settle(&self, cancel: &CancelToken) {
        let settle = self.config.settle;
        tracing::info!(secs = settle.as_secs(), "Waiting for pipeline to settle");

        let started = tokio::time::Instant::now();
        tokio::select! {
            _ = tokio::time::sleep(settle) => {
                tracing::info!("Settlement window elapsed");
            }
            _ = cancel.cancelled() => {
                let elapsed = started.elapsed();
                tracing::warn!(
                    elapsed_secs = elapsed.as_secs(),
                    "Settlement wait cancelled; inspecting with elapsed time"
                );
            }
        }
    }

    fn build(&self, ctx: &RunContext) -> RunReport {
        report::build_report(
            ctx.run_id,
            &self.config,
            &ctx.dispatches.snapshot(),
            &ctx.resolutions.snapshot(),
        )
    }

    /// Best-effort deletion of every located message. Failures are logged
    /// and never retract anything from the already-produced report.
    async fn clean(&self, resolutions: &[ResolutionRecord]) {
        let mut deleted = 0usize;
        let mut residual = 0usize;

        for record in resolutions {
            match &record.message {
                Some(message) => match self.inspector.delete(message).await {
                    Ok(()) => deleted += 1,
                    Err(e) => {
                        tracing::warn!(case_id = %record.case_id, error = %e, "Cleanup delete failed");
                    }
                },
                // Unknown location: nothing to delete.
                None => residual += 1,
            }
        }

        tracing::info!(deleted, "Cleanup complete");
        if residual > 0 {
            tracing::warn!(
                residual,
                "Not-located test messages remain on the server and need manual cleanup"
            );
        }
    }
}

/// Convenience constructor wiring the real SMTP/IMAP backends.
pub fn with_real_backends(config: HarnessConfig) -> Result<Harness> {
    let transport = Arc::new(crate::mail::SmtpSender::new(&config.smtp)?);
    let inspector = Arc::new(crate::mail::ImapInspector::new(&config.imap));
    Ok(Harness::new(config, transport, inspector))
}
