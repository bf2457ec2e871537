//! Aggregate report: build, print, export.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::HarnessConfig;
use crate::dispatch::DispatchRecord;
use crate::error::ReportError;
use crate::inspect::ResolutionRecord;
use crate::metrics::{self, CategoryMetrics, ConfusionMatrix};

/// One misrouted (located but wrongly categorized) case.
#[derive(Debug, Clone, Serialize)]
pub struct MisroutedCase {
    pub case_id: String,
    pub expected: String,
    pub predicted: String,
    pub location: String,
}

/// One row of the tabular per-message record, for every located token.
#[derive(Debug, Clone, Serialize)]
pub struct LocatedRow {
    pub token: String,
    pub case_id: String,
    pub location: String,
    pub expected: String,
    pub predicted: String,
    pub correct: bool,
    pub timestamp: DateTime<Utc>,
}

/// Machine-readable aggregate for one run. Derived, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub settle_secs: u64,

    pub overall_accuracy: f64,
    pub total_sent: u64,
    pub total_not_sent: u64,
    pub total_found: u64,
    pub total_not_found: u64,
    pub correct: u64,
    pub incorrect: u64,

    pub per_category: BTreeMap<String, CategoryMetrics>,
    pub confusion_matrix: ConfusionMatrix,

    pub not_found_tokens: Vec<String>,
    pub ambiguous_tokens: Vec<String>,
    pub misrouted: Vec<MisroutedCase>,
    pub rows: Vec<LocatedRow>,
}

/// Build the aggregate from the run's two stores.
///
/// Resolutions are ordered by case id before anything is derived, so the
/// report content does not depend on search-pool completion order.
pub fn build_report(
    run_id: Uuid,
    config: &HarnessConfig,
    dispatches: &[DispatchRecord],
    resolutions: &[ResolutionRecord],
) -> RunReport {
    let mut resolutions: Vec<ResolutionRecord> = resolutions.to_vec();
    resolutions.sort_by(|a, b| a.case_id.cmp(&b.case_id));

    let total_sent = dispatches.iter().filter(|d| d.outcome.is_sent()).count() as u64;
    let total_not_sent = dispatches.len() as u64 - total_sent;

    let pairs: Vec<(String, String)> = resolutions
        .iter()
        .filter(|r| r.located)
        .filter_map(|r| {
            r.predicted_category
                .clone()
                .map(|p| (r.expected_category.clone(), p))
        })
        .collect();

    let labels = metrics::label_order(&config.categories, &pairs);
    let overall_accuracy = metrics::accuracy(&pairs);
    let per_category = metrics::per_category(&labels, &pairs);
    let confusion_matrix = metrics::confusion_matrix(&labels, &pairs);

    let total_found = pairs.len() as u64;
    let total_not_found = resolutions.iter().filter(|r| !r.located).count() as u64;
    let correct = resolutions.iter().filter(|r| r.is_correct()).count() as u64;
    let incorrect = total_found - correct;

    let not_found_tokens = resolutions
        .iter()
        .filter(|r| !r.located)
        .map(|r| r.token.to_string())
        .collect();

    let ambiguous_tokens = resolutions
        .iter()
        .filter(|r| r.ambiguous)
        .map(|r| r.token.to_string())
        .collect();

    let misrouted = resolutions
        .iter()
        .filter(|r| r.located && !r.is_correct())
        .map(|r| MisroutedCase {
            case_id: r.case_id.clone(),
            expected: r.expected_category.clone(),
            predicted: r.predicted_category.clone().unwrap_or_default(),
            location: r.folder.clone().unwrap_or_default(),
        })
        .collect();

    let rows = resolutions
        .iter()
        .filter(|r| r.located)
        .map(|r| LocatedRow {
            token: r.token.to_string(),
            case_id: r.case_id.clone(),
            location: r.folder.clone().unwrap_or_default(),
            expected: r.expected_category.clone(),
            predicted: r.predicted_category.clone().unwrap_or_default(),
            correct: r.is_correct(),
            timestamp: r.resolved_at,
        })
        .collect();

    RunReport {
        run_id,
        generated_at: Utc::now(),
        settle_secs: config.settle.as_secs(),
        overall_accuracy,
        total_sent,
        total_not_sent,
        total_found,
        total_not_found,
        correct,
        incorrect,
        per_category,
        confusion_matrix,
        not_found_tokens,
        ambiguous_tokens,
        misrouted,
        rows,
    }
}

/// Human-readable summary on stderr.
pub fn print_summary(report: &RunReport) {
    eprintln!();
    eprintln!("── Routing validation report ──────────────────────────");
    eprintln!(
        "   Accuracy: {:.1}% ({}/{} located tokens correct)",
        report.overall_accuracy * 100.0,
        report.correct,
        report.total_found
    );
    eprintln!(
        "   Sent: {}  Not sent: {}  Found: {}  Not found: {}",
        report.total_sent, report.total_not_sent, report.total_found, report.total_not_found
    );

    eprintln!();
    eprintln!(
        "   {:<28} {:>9} {:>9} {:>9} {:>8}",
        "Category", "Precision", "Recall", "F1", "Support"
    );
    for (category, m) in &report.per_category {
        eprintln!(
            "   {:<28} {:>9.3} {:>9.3} {:>9.3} {:>8}",
            category, m.precision, m.recall, m.f1, m.support
        );
    }

    if !report.misrouted.is_empty() {
        eprintln!();
        eprintln!("   Misrouted:");
        for m in &report.misrouted {
            eprintln!(
                "     {} expected {} but landed in {} ({})",
                m.case_id, m.expected, m.location, m.predicted
            );
        }
    }

    if !report.ambiguous_tokens.is_empty() {
        eprintln!();
        eprintln!(
            "   ⚠ {} token(s) found in multiple folders",
            report.ambiguous_tokens.len()
        );
    }
    if !report.not_found_tokens.is_empty() {
        eprintln!(
            "   ⚠ {} token(s) not found anywhere",
            report.not_found_tokens.len()
        );
    }
    eprintln!("───────────────────────────────────────────────────────");
}

/// Write the JSON aggregate; returns the file path.
pub fn export_json(report: &RunReport, output_dir: impl AsRef<Path>) -> Result<PathBuf, ReportError> {
    let path = timestamped(output_dir.as_ref(), report, "routing_report", "json")?;
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, json).map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(path)
}

/// Write the per-message rows as CSV; returns the file path.
pub fn export_csv(report: &RunReport, output_dir: impl AsRef<Path>) -> Result<PathBuf, ReportError> {
    let path = timestamped(output_dir.as_ref(), report, "routing_rows", "csv")?;

    let mut out = String::from("token,case_id,location,expected,predicted,correct,timestamp\n");
    for row in &report.rows {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            row.token,
            row.case_id,
            row.location,
            row.expected,
            row.predicted,
            row.correct,
            row.timestamp.to_rfc3339()
        ));
    }

    std::fs::write(&path, out).map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(path)
}

fn timestamped(
    dir: &Path,
    report: &RunReport,
    stem: &str,
    ext: &str,
) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(dir).map_err(|source| ReportError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    let ts = report.generated_at.format("%Y%m%d_%H%M%S");
    Ok(dir.join(format!("{stem}_{ts}.{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CategoryMap, ImapConfig, SmtpConfig};
    use crate::dispatch::SendOutcome;
    use crate::mail::MessageRef;
    use crate::token::CorrelationToken;
    use std::time::Duration;

    fn config() -> HarnessConfig {
        HarnessConfig {
            smtp: SmtpConfig {
                host: "smtp.example.com".into(),
                port: 587,
                username: "u".into(),
                password: "p".into(),
                from_address: "u@example.com".into(),
                send_delay: Duration::ZERO,
            },
            imap: ImapConfig {
                host: "imap.example.com".into(),
                port: 993,
                username: "u".into(),
                password: "p".into(),
            },
            target_inbox: "inbox@example.com".into(),
            mapping: CategoryMap::parse("FA=A,FB=B,FC=C").unwrap(),
            categories: vec!["A".into(), "B".into(), "C".into()],
            settle: Duration::from_secs(5),
            cleanup: false,
            max_concurrency: 2,
            corpus_path: "corpus.json".into(),
            output_dir: "results".into(),
        }
    }

    fn dispatch(case_id: &str, expected: &str, token: &CorrelationToken) -> DispatchRecord {
        DispatchRecord {
            token: token.clone(),
            case_id: case_id.into(),
            expected_category: expected.into(),
            subject: "s".into(),
            sender: "a@example.com".into(),
            dispatched_at: Utc::now(),
            outcome: SendOutcome::Sent,
        }
    }

    fn located(
        case_id: &str,
        expected: &str,
        folder: &str,
        predicted: &str,
        token: &CorrelationToken,
    ) -> ResolutionRecord {
        ResolutionRecord {
            token: token.clone(),
            case_id: case_id.into(),
            expected_category: expected.into(),
            located: true,
            folder: Some(folder.into()),
            ambiguous: false,
            predicted_category: Some(predicted.into()),
            message: Some(MessageRef {
                folder: folder.into(),
                uid: 1,
                subject: None,
            }),
            resolved_at: Utc::now(),
        }
    }

    fn not_located(case_id: &str, expected: &str, token: &CorrelationToken) -> ResolutionRecord {
        ResolutionRecord {
            token: token.clone(),
            case_id: case_id.into(),
            expected_category: expected.into(),
            located: false,
            folder: None,
            ambiguous: false,
            predicted_category: None,
            message: None,
            resolved_at: Utc::now(),
        }
    }

    #[test]
    fn concrete_four_case_scenario() {
        let cfg = config();
        let tokens: Vec<_> = (0..4).map(|_| CorrelationToken::mint()).collect();
        let dispatches = vec![
            dispatch("case_1", "A", &tokens[0]),
            dispatch("case_2", "A", &tokens[1]),
            dispatch("case_3", "B", &tokens[2]),
            dispatch("case_4", "C", &tokens[3]),
        ];
        let resolutions = vec![
            located("case_1", "A", "FA", "A", &tokens[0]),
            located("case_2", "A", "FB", "B", &tokens[1]),
            located("case_3", "B", "FB", "B", &tokens[2]),
            located("case_4", "C", "FC", "C", &tokens[3]),
        ];

        let report = build_report(Uuid::new_v4(), &cfg, &dispatches, &resolutions);

        assert_eq!(report.correct, 3);
        assert_eq!(report.total_found, 4);
        assert_eq!(report.overall_accuracy, 0.75);
        assert_eq!(report.confusion_matrix.labels, vec!["A", "B", "C"]);
        assert_eq!(report.confusion_matrix.rows[0], vec![1, 1, 0]);
        assert_eq!(report.confusion_matrix.rows[1], vec![0, 1, 0]);
        assert_eq!(report.confusion_matrix.rows[2], vec![0, 0, 1]);
        assert_eq!(report.misrouted.len(), 1);
        assert_eq!(report.misrouted[0].case_id, "case_2");
    }

    #[test]
    fn not_found_scenario() {
        let cfg = config();
        let t1 = CorrelationToken::mint();
        let t2 = CorrelationToken::mint();
        let dispatches = vec![dispatch("case_1", "A", &t1), dispatch("case_2", "B", &t2)];
        let resolutions = vec![
            located("case_1", "A", "FA", "A", &t1),
            not_located("case_2", "B", &t2),
        ];

        let report = build_report(Uuid::new_v4(), &cfg, &dispatches, &resolutions);

        assert_eq!(report.total_sent, 2);
        assert_eq!(report.total_found, 1);
        assert_eq!(report.total_not_found, 1);
        assert_eq!(report.not_found_tokens, vec![t2.to_string()]);
        // Accuracy is computed over the single found token only.
        assert_eq!(report.overall_accuracy, 1.0);
    }

    #[test]
    fn zero_located_accuracy_is_zero() {
        let cfg = config();
        let t = CorrelationToken::mint();
        let dispatches = vec![dispatch("case_1", "A", &t)];
        let resolutions = vec![not_located("case_1", "A", &t)];

        let report = build_report(Uuid::new_v4(), &cfg, &dispatches, &resolutions);
        assert_eq!(report.overall_accuracy, 0.0);
        assert_eq!(report.total_found, 0);
    }

    #[test]
    fn not_sent_counted_separately_from_not_found() {
        let cfg = config();
        let t1 = CorrelationToken::mint();
        let t2 = CorrelationToken::mint();
        let mut d2 = dispatch("case_2", "B", &t2);
        d2.outcome = SendOutcome::NotSent {
            reason: "boom".into(),
        };
        let dispatches = vec![dispatch("case_1", "A", &t1), d2];
        // Only the sent case gets a resolution record.
        let resolutions = vec![located("case_1", "A", "FA", "A", &t1)];

        let report = build_report(Uuid::new_v4(), &cfg, &dispatches, &resolutions);
        assert_eq!(report.total_sent, 1);
        assert_eq!(report.total_not_sent, 1);
        assert_eq!(report.total_not_found, 0);
    }

    #[test]
    fn report_content_independent_of_resolution_order() {
        let cfg = config();
        let tokens: Vec<_> = (0..3).map(|_| CorrelationToken::mint()).collect();
        let dispatches = vec![
            dispatch("case_1", "A", &tokens[0]),
            dispatch("case_2", "B", &tokens[1]),
            dispatch("case_3", "C", &tokens[2]),
        ];
        let forward = vec![
            located("case_1", "A", "FA", "A", &tokens[0]),
            located("case_2", "B", "FB", "B", &tokens[1]),
            located("case_3", "C", "FA", "A", &tokens[2]),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let run_id = Uuid::new_v4();
        let a = build_report(run_id, &cfg, &dispatches, &forward);
        let b = build_report(run_id, &cfg, &dispatches, &reversed);

        assert_eq!(a.confusion_matrix, b.confusion_matrix);
        assert_eq!(a.per_category, b.per_category);
        assert_eq!(
            a.rows.iter().map(|r| &r.case_id).collect::<Vec<_>>(),
            b.rows.iter().map(|r| &r.case_id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn export_writes_json_and_csv() {
        let cfg = config();
        let t = CorrelationToken::mint();
        let dispatches = vec![dispatch("case_1", "A", &t)];
        let resolutions = vec![located("case_1", "A", "FA", "A", &t)];
        let report = build_report(Uuid::new_v4(), &cfg, &dispatches, &resolutions);

        let dir = tempfile::tempdir().unwrap();
        let json_path = export_json(&report, dir.path()).unwrap();
        let csv_path = export_csv(&report, dir.path()).unwrap();

        let json = std::fs::read_to_string(&json_path).unwrap();
        assert!(json.contains("\"overall_accuracy\": 1.0"));

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "token,case_id,location,expected,predicted,correct,timestamp"
        );
        assert!(lines.next().unwrap().starts_with(&t.to_string()));
    }
}
