//! Run artifacts: `summary.csv`, `backward.csv`, `forward.csv`, the raw JSON
//! dump and network exports.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::SecondsFormat;
use cocite_core::{ContributionStats, GraphStructure, NoveltyRelation, RawData, SummaryRecord};
use serde::Serialize;

pub const SUMMARY_FILE: &str = "summary.csv";
pub const BACKWARD_FILE: &str = "backward.csv";
pub const FORWARD_FILE: &str = "forward.csv";
pub const RAW_FILE: &str = "detailed_references_citations.json";
pub const LOG_FILE: &str = "cli.log";

// ─── CSV ─────────────────────────────────────────────────────────────────────

fn finish_csv<W: Write>(writer: csv::Writer<W>) -> Result<W> {
    writer
        .into_inner()
        .map_err(|e| anyhow!("failed to flush CSV output: {}", e.error()))
}

fn create_csv(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

/// Per-provider columns for one direction, in `providers` order.
fn stats_header(direction: &str, providers: &[String]) -> Vec<String> {
    let mut columns = Vec::new();
    for name in providers {
        columns.push(format!("{direction}_{name}"));
        columns.push(format!("{direction}_{name}_unique"));
    }
    columns.push(format!("{direction}_overlap"));
    columns.push(format!("{direction}_total_unique"));
    columns
}

fn stats_cells(stats: Option<&ContributionStats>, providers: &[String]) -> Vec<String> {
    let width = providers.len() * 2 + 2;
    let Some(stats) = stats else {
        return vec![String::new(); width];
    };
    let mut cells = Vec::with_capacity(width);
    for name in providers {
        match stats.provider(name) {
            Some(p) => {
                cells.push(p.count.to_string());
                cells.push(p.unique.to_string());
            }
            None => cells.extend([String::new(), String::new()]),
        }
    }
    cells.push(stats.overlap.to_string());
    cells.push(stats.total_unique.to_string());
    cells
}

pub fn render_summary<W: Write>(
    out: W,
    records: &[SummaryRecord],
    providers: &[String],
) -> Result<W> {
    let mut header = vec![
        "identifier".to_string(),
        "references_found".to_string(),
        "citations_found".to_string(),
        "provider".to_string(),
        "retrieved_at".to_string(),
    ];
    header.extend(stats_header("references", providers));
    header.extend(stats_header("citations", providers));

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&header)?;
    for record in records {
        let mut row = vec![
            record.identifier.to_string(),
            record.references_found.to_string(),
            record.citations_found.to_string(),
            record.provider.clone(),
            record.retrieved_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ];
        row.extend(stats_cells(record.reference_stats.as_ref(), providers));
        row.extend(stats_cells(record.citation_stats.as_ref(), providers));
        writer.write_record(&row)?;
    }
    finish_csv(writer)
}

/// `seed_column` names the second column, e.g. `citing_seed` for backward
/// results.
pub fn render_relations<W: Write>(
    out: W,
    relations: &[NoveltyRelation],
    seed_column: &str,
) -> Result<W> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["novel", seed_column])?;
    for relation in relations {
        writer.write_record([relation.novel.as_str(), relation.seed.as_str()])?;
    }
    finish_csv(writer)
}

// ─── Writers ─────────────────────────────────────────────────────────────────

pub fn write_summary(dir: &Path, records: &[SummaryRecord], providers: &[String]) -> Result<PathBuf> {
    let path = dir.join(SUMMARY_FILE);
    render_summary(create_csv(&path)?, records, providers)?;
    Ok(path)
}

pub fn write_backward(dir: &Path, relations: &[NoveltyRelation]) -> Result<PathBuf> {
    let path = dir.join(BACKWARD_FILE);
    render_relations(create_csv(&path)?, relations, "citing_seed")?;
    Ok(path)
}

pub fn write_forward(dir: &Path, relations: &[NoveltyRelation]) -> Result<PathBuf> {
    let path = dir.join(FORWARD_FILE);
    render_relations(create_csv(&path)?, relations, "cited_seed")?;
    Ok(path)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_file(path, &json)
}

pub fn write_raw(dir: &Path, raw: &RawData) -> Result<PathBuf> {
    let path = dir.join(RAW_FILE);
    write_json(&path, raw)?;
    Ok(path)
}

pub fn read_raw(path: &Path) -> Result<RawData> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not a valid citations file", path.display()))
}

pub fn write_network(path: &Path, graph: &GraphStructure) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_json(path, &graph.to_vosviewer())
}
