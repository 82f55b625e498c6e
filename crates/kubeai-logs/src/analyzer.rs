use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use kubeai_types::{ErrorHotspot, LogPattern, LogRecord, LogSummary, SummaryTimeRange};

const MAX_PATTERNS: usize = 10;
const MAX_HOTSPOTS: usize = 5;
const MAX_EXAMPLES: usize = 3;
const PATTERN_TOKENS: usize = 10;

const HIGH_ERROR_RATE: f64 = 0.10;
const SPIKE_MIN_ENTRIES: usize = 100;
const SPIKE_MIN_BINS: usize = 3;
const SPIKE_MIN_COUNT: usize = 5;
const RESTART_THRESHOLD: usize = 3;

pub const ISSUE_HIGH_ERROR_RATE: &str = "High error rate detected in logs";
pub const ISSUE_ERROR_SPIKE: &str = "Error spikes detected - possible service disruption";
pub const ISSUE_RESTART_LOOP: &str = "Pod restart pattern detected - possible crash loop";
pub const ISSUE_RESOURCE: &str = "Resource constraint issues detected (OOM, CPU throttling)";
pub const ISSUE_NETWORK: &str = "Network connectivity issues detected";
pub const ISSUE_AUTH: &str = "Authentication or authorization issues detected";

const RESTART_MARKERS: [&str; 3] = [
    "started container",
    "starting container",
    "restarting container",
];
const RESOURCE_MARKERS: [&str; 4] = ["out of memory", "oom killed", "memory limit", "cpu throttling"];
const NETWORK_MARKERS: [&str; 4] = [
    "connection refused",
    "connection timeout",
    "unable to connect",
    "network error",
];
const AUTH_MARKERS: [&str; 4] = ["unauthorized", "forbidden", "permission denied", "access denied"];

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
        .expect("valid timestamp regex")
});
static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
        .expect("valid uuid regex")
});
static IPV4_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("valid ipv4 regex"));
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\b").expect("valid number regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static ERROR_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(error|exception|failed|failure|fatal|panic)").expect("valid error keyword regex")
});
static WARNING_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(warning|warn|deprecated)").expect("valid warning keyword regex")
});

/// Summarize a batch of records: counts, time range, recurring error and
/// warning messages, noisiest pods and heuristic issue flags.
pub fn analyze(records: &[LogRecord]) -> LogSummary {
    let Some(first) = records.first() else {
        return LogSummary::default();
    };

    let mut start = first.timestamp;
    let mut end = first.timestamp;
    let mut error_count = 0;
    let mut warning_count = 0;
    let mut errors = PatternCounter::default();
    let mut warnings = PatternCounter::default();
    let mut hotspots: HashMap<&str, usize> = HashMap::new();

    for record in records {
        start = start.min(record.timestamp);
        end = end.max(record.timestamp);

        if record.level.is_error() {
            error_count += 1;
            *hotspots.entry(record.source_name.as_str()).or_default() += 1;
            errors.add(pattern_key(&record.content, &ERROR_KEYWORD_RE), record);
        } else if record.level.is_warning() {
            warning_count += 1;
            warnings.add(pattern_key(&record.content, &WARNING_KEYWORD_RE), record);
        }
    }

    let mut error_hotspots: Vec<ErrorHotspot> = hotspots
        .into_iter()
        .map(|(source_name, error_count)| ErrorHotspot {
            source_name: source_name.to_string(),
            error_count,
        })
        .collect();
    error_hotspots.sort_by(|a, b| {
        b.error_count
            .cmp(&a.error_count)
            .then_with(|| a.source_name.cmp(&b.source_name))
    });
    error_hotspots.truncate(MAX_HOTSPOTS);

    let mut summary = LogSummary {
        total_entries: records.len(),
        error_count,
        warning_count,
        time_range: SummaryTimeRange {
            start,
            end,
            duration: end - start,
        },
        common_errors: errors.into_top(),
        common_warnings: warnings.into_top(),
        error_hotspots,
        potential_issues: Vec::new(),
    };
    summary.potential_issues = detect_issues(records, &summary);
    summary
}

#[derive(Default)]
struct PatternCounter {
    patterns: HashMap<String, LogPattern>,
}

impl PatternCounter {
    fn add(&mut self, key: String, record: &LogRecord) {
        let pattern = self.patterns.entry(key).or_insert_with_key(|key| LogPattern {
            pattern: key.clone(),
            count: 0,
            examples: Vec::new(),
        });
        pattern.count += 1;
        if pattern.examples.len() < MAX_EXAMPLES {
            pattern.examples.push(record.clone());
        }
    }

    fn into_top(self) -> Vec<LogPattern> {
        let mut patterns: Vec<LogPattern> = self.patterns.into_values().collect();
        patterns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.pattern.cmp(&b.pattern)));
        patterns.truncate(MAX_PATTERNS);
        patterns
    }
}

/// Replace volatile tokens with placeholders and collapse whitespace
fn normalize(content: &str) -> String {
    let text = TIMESTAMP_RE.replace_all(content, "TIMESTAMP");
    let text = UUID_RE.replace_all(&text, "UUID");
    let text = IPV4_RE.replace_all(&text, "IP_ADDR");
    let text = NUMBER_RE.replace_all(&text, "N");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Normalized content from the first keyword on, limited to a few tokens
fn pattern_key(content: &str, keywords: &Regex) -> String {
    let normalized = normalize(content);
    let from = keywords.find(&normalized).map_or(0, |m| m.start());
    normalized[from..]
        .split_whitespace()
        .take(PATTERN_TOKENS)
        .collect::<Vec<_>>()
        .join(" ")
}

fn detect_issues(records: &[LogRecord], summary: &LogSummary) -> Vec<String> {
    let mut issues = Vec::new();

    if summary.error_rate() > HIGH_ERROR_RATE {
        issues.push(ISSUE_HIGH_ERROR_RATE.to_string());
    }

    if summary.total_entries >= SPIKE_MIN_ENTRIES && has_error_spike(records) {
        issues.push(ISSUE_ERROR_SPIKE.to_string());
    }

    let lowered: Vec<String> = records.iter().map(|r| r.content.to_lowercase()).collect();
    let mentions = |markers: &[&str]| {
        lowered
            .iter()
            .any(|content| markers.iter().any(|m| content.contains(m)))
    };

    let restarts = lowered
        .iter()
        .filter(|content| RESTART_MARKERS.iter().any(|m| content.contains(m)))
        .count();
    if restarts > RESTART_THRESHOLD {
        issues.push(ISSUE_RESTART_LOOP.to_string());
    }

    if mentions(&RESOURCE_MARKERS[..]) {
        issues.push(ISSUE_RESOURCE.to_string());
    }
    if mentions(&NETWORK_MARKERS[..]) {
        issues.push(ISSUE_NETWORK.to_string());
    }
    if mentions(&AUTH_MARKERS[..]) {
        issues.push(ISSUE_AUTH.to_string());
    }

    issues
}

/// Whether any one-minute bin holds far more errors than the others.
///
/// Bins are minute offsets from the first record; only bins with at least
/// one error take part.
fn has_error_spike(records: &[LogRecord]) -> bool {
    let Some(first) = records.first() else {
        return false;
    };

    let mut bins: BTreeMap<i64, usize> = BTreeMap::new();
    for record in records.iter().filter(|r| r.level.is_error()) {
        let offset_ms = (record.timestamp - first.timestamp).num_milliseconds();
        *bins.entry(offset_ms.div_euclid(60_000)).or_default() += 1;
    }

    if bins.len() < SPIKE_MIN_BINS {
        return false;
    }

    let n = bins.len() as f64;
    let mean = bins.values().sum::<usize>() as f64 / n;
    let variance = bins
        .values()
        .map(|&count| (count as f64 - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let threshold = mean + 2.0 * variance.sqrt();

    bins.values()
        .any(|&count| count as f64 > threshold && count > SPIKE_MIN_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, Utc};
    use kubeai_types::LogLevel;

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn record(pod: &str, level: LogLevel, content: &str, offset_secs: i64) -> LogRecord {
        let mut record = LogRecord::new(
            pod.to_string(),
            String::new(),
            base_time() + TimeDelta::seconds(offset_secs),
        );
        record.level = level;
        record.content = content.to_string();
        record
    }

    fn info(n: usize) -> Vec<LogRecord> {
        (0..n)
            .map(|i| record("api-0", LogLevel::Info, "request served", i as i64))
            .collect()
    }

    /// `per_minute[i]` errors placed in minute `i`, padded with INFO to 100 records
    fn binned_errors(per_minute: &[usize]) -> Vec<LogRecord> {
        let mut records = vec![record("api-0", LogLevel::Info, "boot", 0)];
        for (minute, &count) in per_minute.iter().enumerate() {
            for i in 0..count {
                records.push(record(
                    "api-0",
                    LogLevel::Error,
                    "upstream failed",
                    minute as i64 * 60 + i as i64 % 60,
                ));
            }
        }
        while records.len() < 100 {
            records.push(record("api-0", LogLevel::Info, "ok", 1));
        }
        records
    }

    #[test]
    fn test_empty_input() {
        let summary = analyze(&[]);
        assert_eq!(summary.total_entries, 0);
        assert_eq!(summary.error_count, 0);
        assert_eq!(summary.warning_count, 0);
        assert!(summary.common_errors.is_empty());
        assert!(summary.common_warnings.is_empty());
        assert!(summary.error_hotspots.is_empty());
        assert!(summary.potential_issues.is_empty());
        assert_eq!(summary.time_range, SummaryTimeRange::default());
    }

    #[test]
    fn test_counts_and_time_range() {
        let records = vec![
            record("api-0", LogLevel::Info, "ready", 30),
            record("api-0", LogLevel::Warn, "slow query", -10),
            record("api-1", LogLevel::Error, "db failed", 90),
            record("api-1", LogLevel::Fatal, "panic: nil map", 5),
            record("api-1", LogLevel::Debug, "tick", 0),
        ];
        let summary = analyze(&records);

        assert_eq!(summary.total_entries, 5);
        assert_eq!(summary.error_count, 2);
        assert_eq!(summary.warning_count, 1);
        assert!(summary.error_count + summary.warning_count <= summary.total_entries);
        assert_eq!(summary.time_range.start, base_time() - TimeDelta::seconds(10));
        assert_eq!(summary.time_range.end, base_time() + TimeDelta::seconds(90));
        assert_eq!(summary.time_range.duration, TimeDelta::seconds(100));
    }

    #[test]
    fn test_normalize_placeholders() {
        assert_eq!(
            normalize("2024-05-01T12:00:00.123Z request 550E8400-e29b-41d4-a716-446655440000 from 10.0.0.12 took   35 ms"),
            "TIMESTAMP request UUID from IP_ADDR took N ms"
        );
        assert_eq!(normalize("  retry\t#3\n"), "retry #N");
    }

    #[test]
    fn test_pattern_key_starts_at_keyword() {
        let key = pattern_key(
            "handler=users id=42 Error: failed to fetch user 42 from db at 10.1.2.3 after 3 retries giving up now",
            &ERROR_KEYWORD_RE,
        );
        assert_eq!(key, "Error: failed to fetch user N from db at IP_ADDR");

        let key = pattern_key("one two three four five six seven eight nine ten eleven", &ERROR_KEYWORD_RE);
        assert_eq!(key, "one two three four five six seven eight nine ten");

        let key = pattern_key("config flag is DEPRECATED since v2", &WARNING_KEYWORD_RE);
        // Digits glued to letters are not bare integers
        assert_eq!(key, "DEPRECATED since v2");
    }

    #[test]
    fn test_pattern_grouping() {
        let mut records = Vec::new();
        for i in 0..15 {
            records.push(record(
                "api-0",
                LogLevel::Error,
                &format!("request {} failed: connection reset by 10.0.0.{}", i, i),
                i,
            ));
        }
        records.push(record("api-0", LogLevel::Error, "panic: index out of range", 20));

        let summary = analyze(&records);
        assert_eq!(summary.common_errors.len(), 2);

        let top = &summary.common_errors[0];
        assert_eq!(top.pattern, "failed: connection reset by IP_ADDR");
        assert_eq!(top.count, 15);
        assert_eq!(top.examples.len(), 3);
        assert_eq!(top.examples[0].content, "request 0 failed: connection reset by 10.0.0.0");
        assert_eq!(top.examples[2].content, "request 2 failed: connection reset by 10.0.0.2");

        let total: usize = summary.common_errors.iter().map(|p| p.count).sum();
        assert_eq!(total, summary.error_count);
    }

    #[test]
    fn test_top_patterns_truncated_with_ordered_ties() {
        let mut records = Vec::new();
        for i in 0..12 {
            // Pattern i occurs i+1 times, except two ties at the bottom of the cut
            let repeats = if i < 2 { 3 } else { i + 1 };
            for _ in 0..repeats {
                records.push(record("api-0", LogLevel::Error, &format!("error in module_{}", (b'a' + i as u8) as char), 0));
            }
        }

        let summary = analyze(&records);
        assert_eq!(summary.common_errors.len(), 10);
        assert_eq!(summary.common_errors[0].pattern, "error in module_l");
        assert_eq!(summary.common_errors[0].count, 12);

        let counts: Vec<usize> = summary.common_errors.iter().map(|p| p.count).collect();
        assert!(counts.windows(2).all(|w| w[0] >= w[1]));

        // Three patterns tie at count 3 for the last slot
        assert_eq!(summary.common_errors[8].pattern, "error in module_d");
        assert_eq!(summary.common_errors[9].pattern, "error in module_a");
        assert_eq!(summary.common_errors[9].count, 3);

        let total: usize = summary.common_errors.iter().map(|p| p.count).sum();
        assert!(total <= summary.error_count);
    }

    #[test]
    fn test_warning_patterns() {
        let records = vec![
            record("api-0", LogLevel::Warn, "WARNING: cache miss ratio 91%", 0),
            record("api-0", LogLevel::Warn, "WARNING: cache miss ratio 97%", 1),
            record("api-0", LogLevel::Warn, "flag --legacy is deprecated", 2),
        ];
        let summary = analyze(&records);
        assert_eq!(summary.common_warnings.len(), 2);
        assert_eq!(summary.common_warnings[0].pattern, "WARNING: cache miss ratio N%");
        assert_eq!(summary.common_warnings[0].count, 2);
        assert_eq!(summary.common_warnings[1].pattern, "deprecated");
        assert!(summary.common_errors.is_empty());
    }

    #[test]
    fn test_hotspots() {
        let mut records = Vec::new();
        for (pod, n) in [("a", 1), ("b", 4), ("c", 2), ("d", 4), ("e", 3), ("f", 1), ("g", 5)] {
            for _ in 0..n {
                records.push(record(pod, LogLevel::Error, "boom", 0));
            }
        }

        let summary = analyze(&records);
        let hotspots: Vec<(&str, usize)> = summary
            .error_hotspots
            .iter()
            .map(|h| (h.source_name.as_str(), h.error_count))
            .collect();
        assert_eq!(hotspots, vec![("g", 5), ("b", 4), ("d", 4), ("e", 3), ("c", 2)]);
    }

    #[test]
    fn test_high_error_rate_threshold() {
        // Exactly 10% is not enough
        let mut records = info(9);
        records.push(record("api-0", LogLevel::Error, "boom", 0));
        assert!(!analyze(&records).potential_issues.contains(&ISSUE_HIGH_ERROR_RATE.to_string()));

        records.push(record("api-0", LogLevel::Error, "boom", 0));
        assert!(analyze(&records).potential_issues.contains(&ISSUE_HIGH_ERROR_RATE.to_string()));
    }

    #[test]
    fn test_error_spike_detected() {
        // mean 2.9, sample stddev ~6.0, threshold ~14.9
        let records = binned_errors(&[1, 1, 1, 1, 1, 1, 1, 1, 1, 20]);
        assert!(records.len() >= 100);
        let summary = analyze(&records);
        assert!(summary.potential_issues.contains(&ISSUE_ERROR_SPIKE.to_string()));
    }

    #[test]
    fn test_error_spike_needs_volume_above_five() {
        let records = binned_errors(&[1, 1, 1, 1, 1, 1, 1, 1, 1, 4]);
        let summary = analyze(&records);
        assert!(!summary.potential_issues.contains(&ISSUE_ERROR_SPIKE.to_string()));
    }

    #[test]
    fn test_error_spike_with_five_bins_stays_quiet() {
        // With five populated bins a single outlier sits at most 1.79 sample
        // standard deviations above the mean
        let records = binned_errors(&[1, 1, 1, 1, 20]);
        let summary = analyze(&records);
        assert!(!summary.potential_issues.contains(&ISSUE_ERROR_SPIKE.to_string()));
    }

    #[test]
    fn test_error_spike_needs_hundred_entries() {
        let mut records = binned_errors(&[1, 1, 1, 1, 1, 1, 1, 1, 1, 20]);
        records.truncate(29);
        let summary = analyze(&records);
        assert!(!summary.potential_issues.contains(&ISSUE_ERROR_SPIKE.to_string()));
    }

    #[test]
    fn test_error_spike_needs_three_bins() {
        let records = binned_errors(&[1, 40]);
        let summary = analyze(&records);
        assert!(!summary.potential_issues.contains(&ISSUE_ERROR_SPIKE.to_string()));
    }

    #[test]
    fn test_restart_loop() {
        let mut records: Vec<LogRecord> = (0..3)
            .map(|i| record("api-0", LogLevel::Info, "Started container app", i))
            .collect();
        assert!(!analyze(&records).potential_issues.contains(&ISSUE_RESTART_LOOP.to_string()));

        records.push(record("api-0", LogLevel::Info, "Back-off restarting container app", 4));
        assert!(analyze(&records).potential_issues.contains(&ISSUE_RESTART_LOOP.to_string()));
    }

    #[test]
    fn test_signal_detectors() {
        let mut records = info(50);
        records.push(record("api-0", LogLevel::Info, "Container was OOM Killed", 0));
        records.push(record("api-0", LogLevel::Warn, "dial tcp: Connection Refused", 0));
        let summary = analyze(&records);

        assert_eq!(
            summary.potential_issues,
            vec![ISSUE_RESOURCE.to_string(), ISSUE_NETWORK.to_string()]
        );

        let records = vec![record("api-0", LogLevel::Info, "403 Forbidden for user bob", 0)];
        assert_eq!(analyze(&records).potential_issues, vec![ISSUE_AUTH.to_string()]);
    }
}
