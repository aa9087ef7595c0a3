//! Plot lists merged across harvesters.
//!
//! The farmer reports one entry per connected harvester, each with its own plot
//! list and problem file lists. [`merge_harvesters`] flattens them into one
//! [`PlotsSummary`], tagging every item with the harvester it came from.

use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
struct HarvesterConnection {
    #[serde(default)]
    node_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HarvesterReport {
    #[serde(default)]
    connection: HarvesterConnection,
    #[serde(default)]
    plots: Vec<Value>,
    #[serde(default)]
    failed_to_open_filenames: Vec<String>,
    #[serde(default, alias = "no_key_filenames")]
    not_found_filenames: Vec<String>,
    #[serde(default)]
    duplicates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarvesterPlot {
    pub node_id: Option<String>,
    pub filename: String,
    /// Plot size parameter `k`.
    pub size: u64,
    pub file_size: Option<u64>,
    pub plot_id: Option<String>,
    /// The plot record as reported.
    pub data: Value,
}

/// A file reported by a harvester outside its plot list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlotFile {
    pub node_id: Option<String>,
    pub filename: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlotsSummary {
    /// Largest `k` first, then by filename.
    pub plots: Vec<HarvesterPlot>,
    pub counts_by_size: BTreeMap<u64, usize>,
    pub total_file_size: u64,
    pub failed_to_open: Vec<PlotFile>,
    pub not_found: Vec<PlotFile>,
    pub duplicates: Vec<PlotFile>,
}

impl PlotsSummary {
    pub fn plot_count(&self) -> usize {
        self.plots.len()
    }

    pub fn has_problems(&self) -> bool {
        !(self.failed_to_open.is_empty() && self.not_found.is_empty() && self.duplicates.is_empty())
    }
}

/// Merge harvester reports (`getHarvesters` data, or single `getPlots` results).
pub fn merge_harvesters(harvesters: &[Value]) -> Result<PlotsSummary> {
    let mut summary = PlotsSummary::default();

    for harvester in harvesters {
        let report: HarvesterReport = serde_json::from_value(harvester.clone())?;
        let node_id = report.connection.node_id;

        for plot in report.plots {
            let tagged = tag_plot(node_id.clone(), plot);
            *summary.counts_by_size.entry(tagged.size).or_default() += 1;
            summary.total_file_size += tagged.file_size.unwrap_or(0);
            summary.plots.push(tagged);
        }

        summary
            .failed_to_open
            .extend(plot_files(&node_id, report.failed_to_open_filenames));
        summary
            .not_found
            .extend(plot_files(&node_id, report.not_found_filenames));
        summary
            .duplicates
            .extend(plot_files(&node_id, report.duplicates));
    }

    summary
        .plots
        .sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.filename.cmp(&b.filename)));

    Ok(summary)
}

fn plot_files(
    node_id: &Option<String>,
    names: Vec<String>,
) -> impl Iterator<Item = PlotFile> + '_ {
    names.into_iter().map(move |filename| PlotFile {
        node_id: node_id.clone(),
        filename,
    })
}

fn tag_plot(node_id: Option<String>, plot: Value) -> HarvesterPlot {
    HarvesterPlot {
        node_id,
        filename: plot
            .get("filename")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        size: plot.get("size").and_then(Value::as_u64).unwrap_or(0),
        file_size: plot.get("file_size").and_then(Value::as_u64),
        plot_id: plot
            .get("plot_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        data: plot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_sorts_by_size_then_filename() {
        let harvesters = vec![
            json!({
                "connection": {"node_id": "a"},
                "plots": [
                    {"filename": "b.plot", "size": 32, "file_size": 100},
                    {"filename": "k33.plot", "size": 33, "file_size": 200},
                ],
                "failed_to_open_filenames": ["broken.plot"],
            }),
            json!({
                "connection": {"node_id": "b"},
                "plots": [{"filename": "a.plot", "size": 32, "file_size": 100}],
                "no_key_filenames": ["nokey.plot"],
                "duplicates": ["a.plot"],
            }),
        ];

        let summary = merge_harvesters(&harvesters).unwrap();
        let order: Vec<_> = summary.plots.iter().map(|p| p.filename.as_str()).collect();
        assert_eq!(order, vec!["k33.plot", "a.plot", "b.plot"]);
        assert_eq!(summary.plots[1].node_id.as_deref(), Some("b"));
        assert_eq!(summary.counts_by_size.get(&32), Some(&2));
        assert_eq!(summary.counts_by_size.get(&33), Some(&1));
        assert_eq!(summary.total_file_size, 400);
        assert_eq!(summary.failed_to_open[0].node_id.as_deref(), Some("a"));
        assert_eq!(summary.not_found[0].filename, "nokey.plot");
        assert_eq!(summary.duplicates.len(), 1);
        assert!(summary.has_problems());
    }

    #[test]
    fn test_merge_empty() {
        let summary = merge_harvesters(&[]).unwrap();
        assert_eq!(summary, PlotsSummary::default());
        assert!(!summary.has_problems());
    }

    #[test]
    fn test_merge_rejects_malformed_report() {
        assert!(merge_harvesters(&[json!({"plots": "not a list"})]).is_err());
    }
}
