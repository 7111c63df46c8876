//! Text renderings of clusters and mining results for reports and audit logs.

use crate::cluster::{render_template, Cluster, ClusterStore};
use crate::drain::MiningResult;
use serde_json::{json, Value};
use std::fmt::Display;
use std::io::{self, Write};

/// `ID=<id> : size=<size>: <template>`, id padded to 5 and size to 10 columns.
pub fn format_cluster(cluster: &Cluster, marker: &str) -> String {
    format!("ID={:<5} : size={:<10}: {}", cluster.id, cluster.size, cluster.template_string(marker))
}

/// Writes every cluster, largest first, one per line. Returns the number written.
pub fn write_cluster_report<W: Write>(out: &mut W, store: &ClusterStore, marker: &str) -> io::Result<usize> {
    let clusters = store.export_by_size();
    for cluster in &clusters {
        writeln!(out, "{}", format_cluster(cluster, marker))?;
    }
    out.flush()?;
    Ok(clusters.len())
}

/// Audit record of the input line behind a cluster change, logged just
/// before its [`result_json`].
pub fn audit_input(line_no: u64, line: &str) -> String {
    format!("Input ({line_no}): {line}")
}

pub fn result_json(result: &MiningResult, marker: &str) -> Value {
    json!({
        "change_type": result.change_type.as_str(),
        "cluster_id": result.cluster_id,
        "cluster_size": result.cluster_size,
        "template_mined": render_template(&result.template, marker),
        "cluster_count": result.cluster_count,
    })
}

/// One row of the per-line events file: `<when> ; <cluster_id> ; <template>`.
/// `when` is the line's bracketed date and time, or its line number in the
/// file when it has none (see [`crate::input::bracket_timestamp`]).
pub fn event_line(when: impl Display, result: &MiningResult, marker: &str) -> String {
    format!("{} ; {} ; {}", when, result.cluster_id, render_template(&result.template, marker))
}
