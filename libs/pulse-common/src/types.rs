use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Number of leading test cases exercised by a `run` request
pub const RUN_PREFIX_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Go,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Python, Language::JavaScript, Language::Go];

    /// Canonical lowercase identifier, also used in image and container names
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Go => "go",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a language identifier is not part of the supported set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLanguage(pub String);

impl fmt::Display for UnknownLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported language: {}", self.0)
    }
}

impl std::error::Error for UnknownLanguage {}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "go" | "golang" => Ok(Language::Go),
            _ => Err(UnknownLanguage(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fast feedback on the first few cases
    #[default]
    Run,
    /// Full case list; the only mode whose outcome may be persisted
    Submit,
}

impl Mode {
    /// Test cases in scope for this mode, always a prefix of `cases`
    pub fn select<'a>(&self, cases: &'a [TestCase]) -> &'a [TestCase] {
        match self {
            Mode::Run => &cases[..cases.len().min(RUN_PREFIX_LEN)],
            Mode::Submit => cases,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Run => f.write_str("run"),
            Mode::Submit => f.write_str("submit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// `name=value` assignments joined by `;`
    pub input: String,
    /// Expected output as text
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl TestCase {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            explanation: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Kept as text so unknown identifiers surface as an unsupported-language outcome
    pub language: String,
    pub code: String,
    /// Starter code shown to the user; preferred source for the entry point name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVerdict {
    pub input: String,
    pub output: String,
    pub expected: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Timeout,
    BuildError,
    RunError,
    UnsupportedLanguage,
    OutputParseError,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::BuildError => "build_error",
            ExecutionStatus::RunError => "run_error",
            ExecutionStatus::UnsupportedLanguage => "unsupported_language",
            ExecutionStatus::OutputParseError => "output_parse_error",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing outcome of one execution: verdicts on success, a stage error otherwise
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub id: Uuid,
    pub language: String,
    pub mode: Mode,
    pub status: ExecutionStatus,
    pub results: Vec<TestVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// True only for a successful execution where every verdict passed
    pub fn all_passed(&self) -> bool {
        self.status == ExecutionStatus::Success && self.results.iter().all(|r| r.passed)
    }
}
