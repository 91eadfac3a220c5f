//! Markdown report generation.
//!
//! This module renders the case results into a Markdown document or a
//! JSON dump. Values arrive already rounded; nothing here recomputes them.

use crate::models::{
    CaseReport, Column, DatasetOverview, Finding, PresentedRow, Report, ReportMetadata, Section,
};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Heart-Attack Risk Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata, report.degraded_cases()));
    output.push_str(&generate_table_of_contents(report));
    output.push_str(&generate_dataset_section(&report.dataset));

    for case in &report.cases {
        output.push_str(&generate_case_section(case));
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata, degraded: usize) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Version:** {}\n", metadata.version));
    section.push_str(&format!("- **Cases Run:** {}\n", metadata.cases_run));
    if degraded > 0 {
        section.push_str(&format!("- **Cases Without Data:** {}\n", degraded));
    }
    section.push_str(&format!(
        "- **Duration:** {:.2}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Anchor used for a case heading.
fn case_anchor(case: &CaseReport) -> String {
    format!("case-{}-{}", case.number, case.slug)
}

/// Generate the table of contents.
fn generate_table_of_contents(report: &Report) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Dataset](#dataset)\n");

    for case in &report.cases {
        toc.push_str(&format!(
            "- [Case {}: {}](#{})\n",
            case.number,
            case.title,
            case_anchor(case)
        ));
    }

    toc.push('\n');

    toc
}

/// Generate the dataset overview section.
fn generate_dataset_section(dataset: &DatasetOverview) -> String {
    let mut section = String::new();

    section.push_str("## Dataset\n\n");
    section.push_str(&format!("- **Source:** `{}`\n", dataset.source));
    section.push_str(&format!("- **Outcome:** `{}`\n", dataset.outcome));
    if !dataset.filters.is_empty() {
        let filters: Vec<String> = dataset.filters.iter().map(|f| format!("`{}`", f)).collect();
        section.push_str(&format!("- **Restricted To:** {}\n", filters.join(", ")));
    }

    if dataset.available {
        section.push_str(&format!("- **Records:** {}\n", dataset.rows));
        section.push_str(&format!("- **Columns:** {}\n\n", dataset.columns));
    } else {
        section.push_str("- **Status:** unavailable\n\n");
        if let Some(ref error) = dataset.error {
            section.push_str(&format!("> ⚠️ {}\n\n", error));
        }
    }

    section
}

/// Generate the section for one study case.
fn generate_case_section(case: &CaseReport) -> String {
    let mut section = String::new();

    section.push_str(&format!(
        "## Case {}: {} {{#{}}}\n\n",
        case.number,
        case.title,
        case_anchor(case)
    ));
    section.push_str(&format!("*{}*\n\n", case.question));

    if let Some(ref warning) = case.warning {
        section.push_str(&format!("> ⚠️ {}\n\n", warning));
    }

    let titled = case.sections.len() > 1;
    for table in &case.sections {
        if titled || table.title != case.title {
            section.push_str(&format!("### {}\n\n", table.title));
        }
        section.push_str(&generate_table(table));
    }

    if !case.findings.is_empty() {
        section.push_str(&generate_findings(&case.findings));
    }

    section.push_str("---\n\n");

    section
}

/// Generate one Markdown table.
fn generate_table(table: &Section) -> String {
    if table.table.is_empty() {
        return "_No data available._\n\n".to_string();
    }

    let headers: Vec<&str> = table
        .key_columns
        .iter()
        .map(String::as_str)
        .chain(table.columns.iter().map(|column| column.header()))
        .collect();

    let mut out = String::new();
    out.push_str(&format!("| {} |\n", headers.join(" | ")));

    let align: Vec<&str> = table
        .key_columns
        .iter()
        .map(|_| ":---")
        .chain(table.columns.iter().map(|_| "---:"))
        .collect();
    out.push_str(&format!("|{}|\n", align.join("|")));

    for row in &table.table {
        let cells: Vec<String> = row
            .labels
            .iter()
            .cloned()
            .chain(table.columns.iter().map(|column| cell(row, *column)))
            .collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out.push('\n');

    out
}

/// Formats the value of `column` for `row`.
fn cell(row: &PresentedRow, column: Column) -> String {
    match column {
        Column::Population => row.total_population.to_string(),
        Column::Cases => row.case_count.to_string(),
        Column::IncidenceRatio => row.incidence_ratio.to_string(),
        Column::CaseShare => row.global_case_share.to_string(),
        Column::AbsoluteIncrease => row
            .absolute_increase
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string()),
        Column::GroupShare => row
            .group_share
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string()),
        Column::Annotation => row.annotation.clone().unwrap_or_else(|| "-".to_string()),
    }
}

/// Generate the findings list of a case.
fn generate_findings(findings: &[Finding]) -> String {
    let mut out = String::new();

    out.push_str("**Findings**\n\n");
    for finding in findings {
        out.push_str(&format!("- {}\n", finding.sentence()));
    }
    out.push('\n');

    out
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("*Incidence Ratio: cases per 100 members of a group. ");
    footer.push_str("Share of All Cases: the group's cases as a percentage of all cases.*\n\n");
    footer.push_str(&format!(
        "*Report generated by HeartRisk v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
