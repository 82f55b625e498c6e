use chrono::{DateTime, Utc};

use kubeai_types::{LogLevel, LogRecord};

/// Explicit level tokens, scanned in this order. The first one found anywhere
/// in the content wins, so `WARN` shadows `ERROR` on a line containing both.
const LEVEL_TOKENS: [(&str, LogLevel); 6] = [
    ("DEBUG", LogLevel::Debug),
    ("INFO", LogLevel::Info),
    ("WARN", LogLevel::Warn),
    ("WARNING", LogLevel::Warn),
    ("ERROR", LogLevel::Error),
    ("FATAL", LogLevel::Fatal),
];

/// Log parser for extracting structure from raw log lines
pub struct LogParser;

impl LogParser {
    /// Parse a raw log line into a LogRecord.
    ///
    /// Never fails: a line with no recognizable structure becomes an INFO
    /// record stamped with the current time.
    pub fn parse(raw: &str, source_name: &str, source_container: &str) -> LogRecord {
        Self::parse_at(raw, source_name, source_container, Utc::now())
    }

    /// Like [`LogParser::parse`], with `now` used when the line carries no timestamp
    pub fn parse_at(
        raw: &str,
        source_name: &str,
        source_container: &str,
        now: DateTime<Utc>,
    ) -> LogRecord {
        let line = raw.strip_suffix('\n').unwrap_or(raw);
        let line = line.strip_suffix('\r').unwrap_or(line);

        let (timestamp, content) = match Self::extract_timestamp(line) {
            Some((ts, rest)) => (ts, rest),
            None => (now, line),
        };

        let mut record =
            LogRecord::new(source_name.to_string(), source_container.to_string(), timestamp);
        record.level = Self::detect_level(content);
        record.fields = Self::extract_fields(content);
        record.content = content.to_string();
        record
    }

    /// Split off a leading RFC 3339 timestamp terminated by a space
    fn extract_timestamp(line: &str) -> Option<(DateTime<Utc>, &str)> {
        let end = line.find(' ').filter(|&end| end > 0)?;
        let ts = DateTime::parse_from_rfc3339(&line[..end]).ok()?;
        Some((ts.with_timezone(&Utc), &line[end + 1..]))
    }

    /// Explicit level token if present, otherwise a keyword heuristic
    fn detect_level(content: &str) -> LogLevel {
        if let Some((_, level)) = LEVEL_TOKENS
            .iter()
            .find(|(token, _)| content.contains(token))
        {
            return *level;
        }

        let lower = content.to_lowercase();
        if lower.contains("error") || lower.contains("exception") || lower.contains("fail") {
            LogLevel::Error
        } else if lower.contains("warn") {
            LogLevel::Warn
        } else {
            LogLevel::Info
        }
    }

    /// Collect `key=value` tokens; later duplicates overwrite earlier ones
    fn extract_fields(content: &str) -> std::collections::HashMap<String, String> {
        content
            .split_whitespace()
            .filter_map(|token| token.split_once('='))
            .map(|(key, value)| {
                (
                    key.trim_matches(|c| c == '"' || c == '\'').to_string(),
                    value.trim_matches(|c| c == '"' || c == '\'').to_string(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339_prefix() {
        let line = "2024-01-15T10:30:00.123456789Z some log message\n";
        let record = LogParser::parse(line, "api-0", "app");
        assert_eq!(
            record.timestamp,
            DateTime::parse_from_rfc3339("2024-01-15T10:30:00.123456789Z").unwrap()
        );
        assert_eq!(record.content, "some log message");
        assert_eq!(record.source_name, "api-0");
        assert_eq!(record.source_container, "app");
    }

    #[test]
    fn test_parse_offset_timestamp() {
        let record = LogParser::parse("2024-01-15T12:30:00+02:00 ready", "api-0", "");
        assert_eq!(record.timestamp.to_rfc3339(), "2024-01-15T10:30:00+00:00");
        assert_eq!(record.content, "ready");
    }

    #[test]
    fn test_unparseable_timestamp_uses_now() {
        let now = DateTime::parse_from_rfc3339("2025-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = LogParser::parse_at("yesterday something happened", "api-0", "", now);
        assert_eq!(record.timestamp, now);
        assert_eq!(record.content, "yesterday something happened");
    }

    #[test]
    fn test_timestamp_without_rest_is_not_consumed() {
        let now = Utc::now();
        let record = LogParser::parse_at("2024-01-15T10:30:00Z", "api-0", "", now);
        assert_eq!(record.timestamp, now);
        assert_eq!(record.content, "2024-01-15T10:30:00Z");
    }

    #[test]
    fn test_empty_line() {
        let record = LogParser::parse("", "api-0", "");
        assert_eq!(record.level, LogLevel::Info);
        assert!(record.content.is_empty());
        assert!(record.fields.is_empty());

        let record = LogParser::parse("\n", "api-0", "");
        assert!(record.content.is_empty());
    }

    #[test]
    fn test_explicit_level_tokens() {
        assert_eq!(LogParser::parse("DEBUG cache warmed", "p", "").level, LogLevel::Debug);
        assert_eq!(LogParser::parse("level=ERROR boom", "p", "").level, LogLevel::Error);
        assert_eq!(LogParser::parse("[FATAL] disk gone", "p", "").level, LogLevel::Fatal);
        assert_eq!(LogParser::parse("WARNING: low disk", "p", "").level, LogLevel::Warn);
    }

    #[test]
    fn test_level_scan_follows_candidate_order() {
        // WARN is scanned before ERROR, so it wins even though ERROR is more severe
        let record = LogParser::parse("ERROR while handling WARN threshold", "p", "");
        assert_eq!(record.level, LogLevel::Warn);

        // INFO precedes ERROR in the list as well
        let record = LogParser::parse("ERROR: INFO endpoint unavailable", "p", "");
        assert_eq!(record.level, LogLevel::Info);

        // Lowercase "warn" is not a token, so the explicit ERROR wins
        let record = LogParser::parse("ERROR retrying, warn threshold hit", "p", "");
        assert_eq!(record.level, LogLevel::Error);
    }

    #[test]
    fn test_level_tokens_are_case_sensitive() {
        // "info" in lowercase is not a token; the heuristic sees "failed"
        let record = LogParser::parse("info: request failed", "p", "");
        assert_eq!(record.level, LogLevel::Error);
    }

    #[test]
    fn test_inferred_levels() {
        assert_eq!(LogParser::parse("NullPointerException at line 4", "p", "").level, LogLevel::Error);
        assert_eq!(LogParser::parse("connection failed", "p", "").level, LogLevel::Error);
        assert_eq!(LogParser::parse("deprecated flag, please Warn users", "p", "").level, LogLevel::Warn);
        assert_eq!(LogParser::parse("listening on :8080", "p", "").level, LogLevel::Info);
    }

    #[test]
    fn test_key_value_fields() {
        let record = LogParser::parse(
            r#"2024-01-15T10:30:00Z msg="started" user='bob' attempt=1 attempt=2 url=http://x/?a=b"#,
            "p",
            "",
        );
        assert_eq!(record.fields.get("msg").map(String::as_str), Some("started"));
        assert_eq!(record.fields.get("user").map(String::as_str), Some("bob"));
        assert_eq!(record.fields.get("attempt").map(String::as_str), Some("2"));
        assert_eq!(record.fields.get("url").map(String::as_str), Some("http://x/?a=b"));
        assert_eq!(record.fields.len(), 4);
    }

    #[test]
    fn test_crlf_line() {
        let record = LogParser::parse("2024-01-15T10:30:00Z done\r\n", "p", "");
        assert_eq!(record.content, "done");
    }

    #[test]
    fn test_parse_multibyte_utf8_no_panic() {
        let record = LogParser::parse("─────────────────────────────────────────", "p", "");
        assert_eq!(record.level, LogLevel::Info);

        let record = LogParser::parse("2024-01-15T10:30:00Z ╭──── café=ok ────╮", "p", "");
        assert_eq!(record.content, "╭──── café=ok ────╮");
        assert_eq!(record.fields.get("café").map(String::as_str), Some("ok"));
    }
}
