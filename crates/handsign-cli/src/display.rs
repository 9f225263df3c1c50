//! Human-readable rendering of aggregation reports, model artifacts,
//! predictions and landmark tables.

use std::fmt::Write;
use std::path::Path;

use arrow::util::pretty::pretty_format_batches;
use handsign_ai::{AggregateReport, Classifier, ModelArtifact, Prediction};
use handsign_core::FeatureTable;

/// Columns shown by [`format_table_stats`]: the wrist landmark and the label.
const PREVIEW_COLUMNS: &[&str] = &["x_0", "y_0", "z_0", "label"];

// ── Aggregation ──

pub fn format_report(report: &AggregateReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {:<20} {:>6} {:>10} {:>10}",
        "class", "rows", "no hand", "unreadable"
    );
    for class in &report.classes {
        let _ = writeln!(
            out,
            "  {:<20} {:>6} {:>10} {:>10}",
            class.label, class.rows, class.skipped_no_hand, class.skipped_decode
        );
    }
    let _ = writeln!(
        out,
        "Total samples: {} ({} skipped)",
        report.total_rows(),
        report.total_skipped()
    );
    out
}

// ── Models ──

pub fn format_artifact(artifact: &ModelArtifact, path: &Path) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", path.display());
    let _ = writeln!(out, "  {:<18} {}", "kind", artifact.classifier.kind());
    let _ = writeln!(out, "  {:<18} {}", "trained_at", artifact.trained_at);
    let _ = writeln!(out, "  {:<18} {}", "format_version", artifact.format_version);

    match &artifact.classifier {
        Classifier::Network(net) => {
            let _ = writeln!(out, "  {:<18} {}", "inputs", net.input_width());
        }
        Classifier::Forest(forest) => {
            let nodes: usize = forest.trees().iter().map(|t| t.node_count()).sum();
            let _ = writeln!(out, "  {:<18} {}", "trees", forest.trees().len());
            let _ = writeln!(out, "  {:<18} {}", "nodes", nodes);
        }
    }
    let _ = writeln!(out);

    let metrics = &artifact.metrics;
    let _ = writeln!(out, "Metrics");
    let _ = writeln!(out, "  {:<18} {}", "train_rows", metrics.train_rows);
    let _ = writeln!(out, "  {:<18} {}", "validation_rows", metrics.validation_rows);
    let _ = writeln!(out, "  {:<18} {:.4}", "accuracy", metrics.accuracy);
    if let Some(loss) = metrics.loss {
        let _ = writeln!(out, "  {:<18} {:.4}", "loss", loss);
    }
    if let Some(last) = metrics.history.last() {
        let _ = writeln!(out, "  {:<18} {}", "epochs", last.epoch);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Classes ({})", artifact.encoding.len());
    for (code, label) in artifact.encoding.classes().iter().enumerate() {
        let _ = writeln!(out, "  {code:>3}  {label}");
    }
    out
}

pub fn format_prediction(prediction: &Prediction, artifact: &ModelArtifact) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Prediction: {} ({:.1}%)",
        prediction.label,
        prediction.confidence * 100.0
    );

    let mut ranked: Vec<(usize, f32)> = prediction.probabilities.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    for (code, p) in ranked.into_iter().take(5) {
        let label = artifact.encoding.decode(code).unwrap_or("?");
        let _ = writeln!(out, "  {label:<20} {:>6.1}%", p * 100.0);
    }
    out
}

// ── Tables ──

/// Per-class row counts followed by the first `head` rows as an Arrow table.
pub fn format_table_stats(table: &FeatureTable, head: usize) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "{} rows", table.len())?;
    for (label, count) in table.class_counts() {
        writeln!(out, "  {label:<20} {count:>6}")?;
    }

    if head > 0 && !table.is_empty() {
        let batch = table.to_record_batch()?;
        let indices = PREVIEW_COLUMNS
            .iter()
            .map(|name| batch.schema().index_of(name))
            .collect::<Result<Vec<_>, _>>()?;
        let preview = batch.project(&indices)?.slice(0, head.min(batch.num_rows()));
        writeln!(out)?;
        writeln!(out, "{}", pretty_format_batches(&[preview])?)?;
    }
    Ok(out)
}
