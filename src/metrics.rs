//! Classification metrics, re-derived from the (expected, predicted) pairs.
//!
//! No statistics dependency: the formulas and their zero-division rules are
//! spelled out here so the numbers are reproducible and testable. Every
//! output is ordered by a single fixed label ordering, so identical inputs
//! always produce byte-identical reports.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Precision/recall/F1 for one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of pairs whose expected label is this category.
    pub support: u64,
}

/// Expected-by-predicted count table over a fixed label ordering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    /// Row and column labels, in order.
    pub labels: Vec<String>,
    /// `rows[i][j]` = count of pairs expected `labels[i]`, predicted `labels[j]`.
    pub rows: Vec<Vec<u64>>,
}

/// Fixed label ordering: declared categories first (in declared order),
/// then any label seen only in the pairs, lexically. Stable across runs.
pub fn label_order(declared: &[String], pairs: &[(String, String)]) -> Vec<String> {
    let mut labels: Vec<String> = declared.to_vec();

    let extras: BTreeSet<&String> = pairs
        .iter()
        .flat_map(|(expected, predicted)| [expected, predicted])
        .filter(|label| !labels.contains(*label))
        .collect();
    labels.extend(extras.into_iter().cloned());

    labels
}

/// Overall accuracy over located pairs. Zero pairs → 0.0, never a fault.
pub fn accuracy(pairs: &[(String, String)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    let correct = pairs.iter().filter(|(e, p)| e == p).count();
    correct as f64 / pairs.len() as f64
}

/// Per-category precision, recall, and F1 with standard multi-class
/// definitions. Any undefined ratio (zero predicted or zero actual
/// instances) yields 0.
pub fn per_category(
    labels: &[String],
    pairs: &[(String, String)],
) -> BTreeMap<String, CategoryMetrics> {
    let mut metrics = BTreeMap::new();

    for label in labels {
        let tp = pairs.iter().filter(|(e, p)| e == label && p == label).count() as f64;
        let predicted = pairs.iter().filter(|(_, p)| p == label).count() as f64;
        let actual = pairs.iter().filter(|(e, _)| e == label).count() as f64;

        let precision = if predicted > 0.0 { tp / predicted } else { 0.0 };
        let recall = if actual > 0.0 { tp / actual } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        metrics.insert(
            label.clone(),
            CategoryMetrics {
                precision,
                recall,
                f1,
                support: actual as u64,
            },
        );
    }

    metrics
}

/// Confusion matrix over the fixed label ordering. Rows are expected
/// categories, columns predicted.
pub fn confusion_matrix(labels: &[String], pairs: &[(String, String)]) -> ConfusionMatrix {
    let index: BTreeMap<&str, usize> = labels
        .iter()
        .enumerate()
        .map(|(i, l)| (l.as_str(), i))
        .collect();

    let mut rows = vec![vec![0u64; labels.len()]; labels.len()];
    for (expected, predicted) in pairs {
        if let (Some(&i), Some(&j)) = (index.get(expected.as_str()), index.get(predicted.as_str()))
        {
            rows[i][j] += 1;
        }
    }

    ConfusionMatrix {
        labels: labels.to_vec(),
        rows,
    }
}
