//! Console rendering for records, summaries and AI analyses

use std::fmt::Write;

use anyhow::Result;
use chrono::SecondsFormat;
use crossterm::style::{StyledContent, Stylize};
use serde::Serialize;

use kubeai_ai::{LogAnalysis, Severity};
use kubeai_logs::{CollectError, LevelCounts, LogLevel, LogRecord, LogSummary, SourceFailure};
use kubeai_types::format_duration;

fn level_style(level: LogLevel) -> StyledContent<&'static str> {
    let text = level.as_str();
    match level {
        LogLevel::Fatal => text.red().bold(),
        LogLevel::Error => text.red(),
        LogLevel::Warn => text.yellow(),
        LogLevel::Info => text.green(),
        LogLevel::Debug => text.dark_grey(),
    }
}

fn severity_style(severity: Severity) -> StyledContent<&'static str> {
    let text = severity.as_str();
    match severity {
        Severity::Critical => text.red().bold(),
        Severity::High => text.red(),
        Severity::Medium => text.yellow(),
        Severity::Low => text.green(),
    }
}

/// `YYYY-MM-DD HH:MM:SS [LEVEL] [container] content`
pub fn record_line(record: &LogRecord) -> String {
    let mut line = format!(
        "{} [{}]",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        level_style(record.level)
    );
    if !record.source_container.is_empty() {
        let _ = write!(line, " [{}]", record.source_container);
    }
    let _ = write!(line, " {}", record.content);
    line
}

/// Same as [`record_line`], prefixed with the pod for multi-pod streams
pub fn live_record_line(record: &LogRecord) -> String {
    format!("{} {}", format!("{}:", record.source_name).cyan(), record_line(record))
}

/// First `max` records; 0 shows every record
pub fn render_records(records: &[LogRecord], max: usize) -> String {
    let shown = if max == 0 { records.len() } else { records.len().min(max) };
    let mut out = String::from("\n====== LOG ENTRIES ======\n");
    let _ = writeln!(out, "Showing {} of {} log entries:\n", shown, records.len());
    for record in &records[..shown] {
        let _ = writeln!(out, "{}", record_line(record));
    }
    if records.len() > shown {
        let _ = writeln!(out, "\n... and {} more log entries", records.len() - shown);
    }
    out
}

pub fn render_failures(failures: &[SourceFailure]) -> String {
    let mut out = String::new();
    for failure in failures {
        let _ = writeln!(
            out,
            "{} skipped {}: {}",
            "warning:".yellow().bold(),
            failure.source,
            error_chain(&failure.error)
        );
    }
    out
}

pub fn render_stream_error(error: &CollectError) -> String {
    format!("{} {}", "stream error:".red().bold(), error_chain(error))
}

/// Error message followed by its sources, `a: b: c`
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(message, ": {}", cause);
        source = cause.source();
    }
    message
}

pub fn render_summary(summary: &LogSummary) -> String {
    let range = &summary.time_range;
    let mut out = String::from("\n====== LOG SUMMARY ======\n");
    let _ = writeln!(
        out,
        "Total Entries: {} ({} errors, {} warnings)",
        summary.total_entries, summary.error_count, summary.warning_count
    );
    let _ = writeln!(
        out,
        "Time Range: {} to {} ({})",
        range.start.to_rfc3339_opts(SecondsFormat::Secs, true),
        range.end.to_rfc3339_opts(SecondsFormat::Secs, true),
        format_duration(range.duration)
    );

    if !summary.error_hotspots.is_empty() {
        out.push_str("\n=== Error Hotspots ===\n");
        for hotspot in &summary.error_hotspots {
            let _ = writeln!(out, "- {}: {} errors", hotspot.source_name, hotspot.error_count);
        }
    }

    for (title, patterns) in [
        ("Common Errors", &summary.common_errors),
        ("Common Warnings", &summary.common_warnings),
    ] {
        if patterns.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n=== {} ===", title);
        for pattern in patterns {
            let _ = writeln!(out, "- ({}x) {}", pattern.count, pattern.pattern);
        }
    }

    if !summary.potential_issues.is_empty() {
        out.push_str("\n=== Potential Issues ===\n");
        for issue in &summary.potential_issues {
            let _ = writeln!(out, "- {}", issue.as_str().yellow());
        }
    }
    out
}

pub fn render_level_counts(counts: &LevelCounts) -> String {
    format!(
        "Buffered {} records: {} {}, {} {}, {} {}, {} {}, {} {}",
        counts.total(),
        counts.fatal,
        level_style(LogLevel::Fatal),
        counts.error,
        level_style(LogLevel::Error),
        counts.warn,
        level_style(LogLevel::Warn),
        counts.info,
        level_style(LogLevel::Info),
        counts.debug,
        level_style(LogLevel::Debug),
    )
}

fn numbered(out: &mut String, title: &str, items: &[String]) {
    let _ = writeln!(out, "\n=== {} ===", title);
    for (i, item) in items.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, item);
    }
}

pub fn render_analysis(analysis: &LogAnalysis) -> String {
    let mut out = String::from("\n====== AI ANALYSIS ======\n");
    let _ = writeln!(out, "Severity: {}\n", severity_style(analysis.severity));
    out.push_str("=== Summary ===\n");
    let _ = writeln!(out, "{}", analysis.summary);

    numbered(&mut out, "Root Causes", &analysis.root_causes);
    numbered(&mut out, "Recommended Solutions", &analysis.solutions);
    if !analysis.additional_info.is_empty() {
        numbered(&mut out, "Additional Information", &analysis.additional_info);
    }
    out
}

#[derive(Serialize)]
struct Report<'a> {
    summary: &'a LogSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<&'a LogAnalysis>,
}

/// `{"summary": ..., "analysis": ...}`, pretty printed
pub fn render_json(summary: &LogSummary, analysis: Option<&LogAnalysis>) -> Result<String> {
    Ok(serde_json::to_string_pretty(&Report { summary, analysis })?)
}
