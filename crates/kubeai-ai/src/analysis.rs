use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AiError;

const NO_SUMMARY: &str = "No summary provided by AI analysis.";
const NO_ROOT_CAUSES: &str = "No root causes identified in AI analysis.";
const NO_SOLUTIONS: &str = "No solutions provided by AI analysis.";
const UNSTRUCTURED_SUMMARY: &str = "The AI provided an unstructured response.";

/// How urgently the findings need attention
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    /// Most severe keyword mentioned in `text`, if any
    pub fn mentioned_in(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        [Self::Critical, Self::High, Self::Medium, Self::Low]
            .into_iter()
            .find(|severity| lower.contains(&severity.as_str().to_lowercase()))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::mentioned_in(&raw).unwrap_or_default())
    }
}

/// Structured findings produced by the AI
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub root_causes: Vec<String>,
    #[serde(default)]
    pub solutions: Vec<String>,
    #[serde(default)]
    pub additional_info: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
}

/// Turn a model's answer into a [`LogAnalysis`].
///
/// A JSON object anywhere in the text (first `{` to last `}`) is decoded and
/// missing fields are filled in. Without one, markdown sections are scanned
/// instead and the full answer is kept in `additional_info`.
pub fn parse_response(text: &str) -> Result<LogAnalysis, AiError> {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => parse_json(&text[start..=end]),
        _ => Ok(parse_sections(text)),
    }
}

fn parse_json(json: &str) -> Result<LogAnalysis, AiError> {
    let mut analysis: LogAnalysis = serde_json::from_str(json).map_err(AiError::MalformedAnalysis)?;

    if analysis.summary.trim().is_empty() {
        analysis.summary = NO_SUMMARY.to_string();
    }
    if analysis.root_causes.is_empty() {
        analysis.root_causes = vec![NO_ROOT_CAUSES.to_string()];
    }
    if analysis.solutions.is_empty() {
        analysis.solutions = vec![NO_SOLUTIONS.to_string()];
    }
    Ok(analysis)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Summary,
    RootCauses,
    Solutions,
    AdditionalInfo,
    Severity,
}

impl Section {
    fn from_header(header: &str) -> Self {
        let header = header.to_lowercase();
        if header.contains("summar") {
            Self::Summary
        } else if header.contains("root") || header.contains("cause") {
            Self::RootCauses
        } else if header.contains("solution") || header.contains("recommend") {
            Self::Solutions
        } else if header.contains("additional") || header.contains("info") {
            Self::AdditionalInfo
        } else if header.contains("sever") {
            Self::Severity
        } else {
            Self::None
        }
    }
}

fn parse_sections(text: &str) -> LogAnalysis {
    let mut analysis = LogAnalysis {
        additional_info: vec![text.to_string()],
        ..Default::default()
    };
    let mut summary = Vec::new();
    let mut section = Section::None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with('#') {
            section = Section::from_header(line.trim_start_matches(['#', ' ']));
            continue;
        }

        let bullet = line
            .strip_prefix(['-', '*'])
            .map(|item| item.trim_start_matches(['-', '*', ' ']).to_string());

        match section {
            Section::Summary => summary.push(line),
            Section::RootCauses => analysis.root_causes.extend(bullet),
            Section::Solutions => analysis.solutions.extend(bullet),
            Section::AdditionalInfo => analysis.additional_info.extend(bullet),
            Section::Severity => {
                if let Some(severity) = Severity::mentioned_in(line) {
                    analysis.severity = severity;
                }
            }
            Section::None => {}
        }
    }

    analysis.summary = if summary.is_empty() {
        UNSTRUCTURED_SUMMARY.to_string()
    } else {
        summary.join(" ")
    };
    analysis
}
