use std::fmt::Write;

use chrono::SecondsFormat;
use tracing::{debug, info};

use crate::analysis::{LogAnalysis, Severity, parse_response};
use crate::error::AiError;
use crate::provider::Provider;
use kubeai_types::{LogLevel, LogRecord, LogSummary, format_duration};

const ERROR_SAMPLES: usize = 10;
const WARNING_SAMPLES: usize = 5;
const INFO_SAMPLES: usize = 5;
const ERROR_ONLY_SAMPLES: usize = 20;

const RESPONSE_FORMAT: &str = "\
Format your response as JSON with the following structure:
```json
{
  \"summary\": \"Brief description of the issues\",
  \"rootCauses\": [\"Cause 1\", \"Cause 2\", ...],
  \"solutions\": [\"Solution 1\", \"Solution 2\", ...],
  \"additionalInfo\": [\"Info 1\", \"Info 2\", ...],
  \"severity\": \"Low|Medium|High|Critical\"
}
```
";

/// Asks an AI provider to explain a batch of logs
pub struct LogAdvisor {
    provider: Box<dyn Provider>,
}

impl LogAdvisor {
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Full analysis of `records`, guided by their local `summary`
    pub async fn analyze_logs(&self, records: &[LogRecord], summary: &LogSummary) -> Result<LogAnalysis, AiError> {
        let prompt = build_logs_prompt(records, summary);
        self.ask(&prompt).await
    }

    /// Analysis restricted to ERROR and FATAL records.
    ///
    /// `summarize` builds the summary of the error subset. When there are no
    /// errors the provider is not called.
    pub async fn analyze_errors(
        &self,
        records: &[LogRecord],
        summarize: impl FnOnce(&[LogRecord]) -> LogSummary,
    ) -> Result<LogAnalysis, AiError> {
        let errors: Vec<LogRecord> = records.iter().filter(|r| r.level.is_error()).cloned().collect();

        if errors.is_empty() {
            info!("no error records, skipping AI error analysis");
            return Ok(LogAnalysis {
                summary: "No error logs found".to_string(),
                root_causes: vec!["No errors detected in logs".to_string()],
                solutions: vec!["No action needed".to_string()],
                additional_info: vec!["The logs contain no error or fatal level entries".to_string()],
                severity: Severity::Low,
            });
        }

        let summary = summarize(&errors);
        let prompt = build_errors_prompt(&errors, &summary);
        self.ask(&prompt).await
    }

    async fn ask(&self, prompt: &str) -> Result<LogAnalysis, AiError> {
        info!(
            provider = self.provider.name(),
            model = self.provider.model(),
            "requesting AI analysis"
        );
        let answer = self.provider.query(prompt).await?;
        debug!(answer_len = answer.len(), "AI answered");
        parse_response(&answer)
    }
}

fn timestamp(record: &LogRecord) -> String {
    record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn write_time_range(prompt: &mut String, summary: &LogSummary) {
    let range = &summary.time_range;
    let _ = writeln!(
        prompt,
        "- Time range: {} to {} ({})\n",
        range.start.to_rfc3339_opts(SecondsFormat::Secs, true),
        range.end.to_rfc3339_opts(SecondsFormat::Secs, true),
        format_duration(range.duration)
    );
}

fn write_hotspots_and_patterns(prompt: &mut String, summary: &LogSummary) {
    if !summary.error_hotspots.is_empty() {
        prompt.push_str("## Error Hotspots\n");
        for hotspot in &summary.error_hotspots {
            let _ = writeln!(prompt, "- {}: {} errors", hotspot.source_name, hotspot.error_count);
        }
        prompt.push('\n');
    }

    if !summary.common_errors.is_empty() {
        prompt.push_str("## Common Errors\n");
        for pattern in &summary.common_errors {
            let _ = writeln!(prompt, "- Pattern: {} (count: {})", pattern.pattern, pattern.count);
            if let Some(example) = pattern.examples.first() {
                let _ = writeln!(prompt, "  Example: {}", example.content);
            }
        }
        prompt.push('\n');
    }
}

fn write_samples(prompt: &mut String, records: &[LogRecord], limit: usize, keep: impl Fn(LogLevel) -> bool) {
    for record in records.iter().filter(|r| keep(r.level)).take(limit) {
        let _ = writeln!(prompt, "[{}] [{}] {}", timestamp(record), record.level, record.content);
    }
}

fn write_request(prompt: &mut String, subject: &str) {
    prompt.push_str("## Analysis Request\n");
    let _ = writeln!(prompt, "Based on the {} provided, please analyze the following:", subject);
    prompt.push_str("1. Provide a brief summary of the issues observed\n");
    prompt.push_str("2. Identify the most likely root causes of the issues\n");
    prompt.push_str("3. Suggest specific solutions to address the problems\n");
    prompt.push_str("4. Add any additional information or context that might be helpful\n");
    prompt.push_str("5. Assess the severity (Low, Medium, High, Critical)\n\n");
    prompt.push_str(RESPONSE_FORMAT);
}

pub(crate) fn build_logs_prompt(records: &[LogRecord], summary: &LogSummary) -> String {
    let mut prompt = String::from(
        "You are an expert Kubernetes troubleshooter. Analyze these logs to identify issues, \
         determine root causes, and suggest solutions.\n\n",
    );

    prompt.push_str("## Log Summary\n");
    let _ = writeln!(prompt, "- Total log entries: {}", summary.total_entries);
    let _ = writeln!(prompt, "- Error count: {}", summary.error_count);
    let _ = writeln!(prompt, "- Warning count: {}", summary.warning_count);
    write_time_range(&mut prompt, summary);
    write_hotspots_and_patterns(&mut prompt, summary);

    if !summary.potential_issues.is_empty() {
        prompt.push_str("## Detected Issues\n");
        for issue in &summary.potential_issues {
            let _ = writeln!(prompt, "- {}", issue);
        }
        prompt.push('\n');
    }

    prompt.push_str("## Log Samples\n");
    write_samples(&mut prompt, records, ERROR_SAMPLES, |level| level.is_error());
    write_samples(&mut prompt, records, WARNING_SAMPLES, |level| level.is_warning());
    write_samples(&mut prompt, records, INFO_SAMPLES, |level| level == LogLevel::Info);
    prompt.push('\n');

    write_request(&mut prompt, "logs and summary");
    prompt
}

pub(crate) fn build_errors_prompt(errors: &[LogRecord], summary: &LogSummary) -> String {
    let mut prompt = String::from(
        "You are an expert Kubernetes troubleshooter. Analyze these error logs to identify issues, \
         determine root causes, and suggest solutions. Focus specifically on the errors.\n\n",
    );

    prompt.push_str("## Error Log Summary\n");
    let _ = writeln!(prompt, "- Total error entries: {}", summary.total_entries);
    write_time_range(&mut prompt, summary);
    write_hotspots_and_patterns(&mut prompt, summary);

    prompt.push_str("## Error Log Samples\n");
    for record in errors.iter().take(ERROR_ONLY_SAMPLES) {
        let _ = writeln!(
            prompt,
            "[{}] [{}] [{}] {}",
            timestamp(record),
            record.source_name,
            record.level,
            record.content
        );
    }
    prompt.push('\n');

    write_request(&mut prompt, "error logs");
    prompt
}
