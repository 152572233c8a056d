/// Printing of clusters to stdout: names, YAML, JSON or a table
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use std::io::Write;

use crate::api::{Cluster, ClusterList, API_GROUP};
use crate::error::Result;

/// Output format
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Columnar table
    Table,
    Yaml,
    Json,
    /// `clusters.<group>/<name>`
    Name,
}

/// Prints clusters in one output format
#[derive(Debug, Clone)]
pub enum Printer {
    /// `clusters.<group>/<name> <operation>`
    Name { operation: &'static str },
    Yaml,
    Json,
    Table,
}

impl Printer {
    /// Printer for a format; `operation` only shows up in name output
    pub fn new(format: OutputFormat, operation: &'static str) -> Self {
        match format {
            OutputFormat::Name => Printer::Name { operation },
            OutputFormat::Yaml => Printer::Yaml,
            OutputFormat::Json => Printer::Json,
            OutputFormat::Table => Printer::Table,
        }
    }

    pub fn print_obj(&self, cluster: &Cluster, out: &mut dyn Write) -> Result<()> {
        match self {
            Printer::Name { operation } if operation.is_empty() => {
                writeln!(out, "clusters.{}/{}", API_GROUP, cluster.name)?;
            }
            Printer::Name { operation } => {
                writeln!(out, "clusters.{}/{} {}", API_GROUP, cluster.name, operation)?;
            }
            Printer::Yaml => write!(out, "{}", serde_yaml::to_string(cluster)?)?,
            Printer::Json => writeln!(out, "{}", serde_json::to_string_pretty(cluster)?)?,
            Printer::Table => write_table(std::slice::from_ref(cluster), out)?,
        }
        Ok(())
    }

    /// Print several clusters. YAML and JSON wrap them in a ClusterList.
    pub fn print_list(&self, clusters: Vec<Cluster>, out: &mut dyn Write) -> Result<()> {
        match self {
            Printer::Name { .. } => {
                for cluster in &clusters {
                    self.print_obj(cluster, out)?;
                }
            }
            Printer::Yaml => write!(out, "{}", serde_yaml::to_string(&ClusterList::new(clusters))?)?,
            Printer::Json => writeln!(
                out,
                "{}",
                serde_json::to_string_pretty(&ClusterList::new(clusters))?
            )?,
            Printer::Table => write_table(&clusters, out)?,
        }
        Ok(())
    }
}

/// Format a timestamp as a short age, e.g. "2d", "5h", "30m", "15s"
pub fn format_age(timestamp: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(*timestamp);

    let total_secs = duration.num_seconds();
    if total_secs < 0 {
        return "0s".to_string();
    }
    if duration.num_days() > 0 {
        return format!("{}d", duration.num_days());
    }
    if duration.num_hours() > 0 {
        return format!("{}h", duration.num_hours());
    }
    if duration.num_minutes() > 0 {
        return format!("{}m", duration.num_minutes());
    }
    format!("{}s", total_secs)
}

fn write_table(clusters: &[Cluster], out: &mut dyn Write) -> Result<()> {
    let headers = ["CURRENT", "NAME", "PRODUCT", "AGE", "CPUS"];
    let now = Utc::now();

    let rows: Vec<[String; 5]> = clusters
        .iter()
        .map(|cluster| {
            [
                (if cluster.status.current { "*" } else { "" }).to_string(),
                cluster.name.clone(),
                cluster.product.map(|p| p.to_string()).unwrap_or_default(),
                cluster
                    .status
                    .creation_timestamp
                    .as_ref()
                    .map(|ts| format_age(ts, now))
                    .unwrap_or_else(|| "<unknown>".to_string()),
                cluster.status.cpus.to_string(),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let header_row = headers.map(String::from);
    for row in std::iter::once(&header_row).chain(&rows) {
        let line: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        writeln!(out, "{}", line.join("   ").trim_end())?;
    }
    Ok(())
}
