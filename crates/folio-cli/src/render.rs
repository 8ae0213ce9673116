//! Plain-text rendering of classified units and enrichment reports.

use std::fmt::Write;

use folio::{EnrichmentState, RenderUnit, UnitKind};

use crate::session::EnrichmentReport;

pub const LOADING_LABEL: &str = "Summarizing...";
pub const SUMMARY_HEADING: &str = "AI Summary:";

/// Render units as indented lines.
pub fn render_units(units: &[RenderUnit], indent: &str) -> String {
    let mut out = String::new();
    for unit in units {
        for (i, item) in unit.items.iter().enumerate() {
            let _ = match unit.kind {
                UnitKind::Ordered => writeln!(out, "{indent}{}. {item}", i + 1),
                UnitKind::Unordered => writeln!(out, "{indent}\u{2022} {item}"),
                UnitKind::Paragraph => writeln!(out, "{indent}{item}"),
            };
        }
    }
    out
}

/// One-line status label for a state.
pub fn status_label(state: &EnrichmentState) -> &str {
    match state {
        EnrichmentState::Idle => "not requested",
        EnrichmentState::InFlight => LOADING_LABEL,
        EnrichmentState::Succeeded { .. } => "ready",
        EnrichmentState::Failed { error_message } => error_message,
    }
}

/// Render a full report block for one entity.
pub fn render_report(report: &EnrichmentReport) -> String {
    let mut out = format!("{} ({})\n", report.title, report.key);
    match &report.state {
        EnrichmentState::Succeeded { .. } => {
            let _ = writeln!(out, "  {SUMMARY_HEADING}");
            out.push_str(&render_units(&report.units, "    "));
        }
        other => {
            let _ = writeln!(out, "  {}", status_label(other));
        }
    }
    out
}
