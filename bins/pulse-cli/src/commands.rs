// CLI commands for running and maintaining the CodePulse sandbox
use anyhow::{bail, Context, Result};
use pulse_common::config::SandboxConfig;
use pulse_common::types::{ExecutionRequest, ExecutionStatus, Language, Mode, TestCase};
use pulse_sandbox::harness;
use pulse_sandbox::language::LanguageProfile;
use pulse_sandbox::Sandbox;
use std::fs;
use std::path::Path;
use std::time::Duration;

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Test cases from a JSON array of `{input, output}` objects
fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = read_source(path)?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse test cases in {}", path.display()))
}

fn read_snippet(path: Option<&Path>) -> Result<Option<String>> {
    path.map(read_source).transpose()
}

/// Run a source file in a fresh sandbox and print the report
pub async fn run(
    language: &str,
    code_file: &Path,
    snippet_file: Option<&Path>,
    tests: &Path,
    submit: bool,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let request = ExecutionRequest {
        language: language.to_string(),
        code: read_source(code_file)?,
        snippet: read_snippet(snippet_file)?,
        test_cases: load_test_cases(tests)?,
        mode: if submit { Mode::Submit } else { Mode::Run },
    };

    let mut config = SandboxConfig::from_env();
    if let Some(secs) = timeout_secs {
        config.execution_timeout = Duration::from_secs(secs);
    }

    let sandbox = Sandbox::connect_local(config).context("Failed to connect to Docker")?;

    println!("🚀 Running {} ({} mode)...", language, request.mode);
    let report = sandbox.report(&request).await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.status != ExecutionStatus::Success {
        bail!(
            "execution failed ({}): {}",
            report.status,
            report.error.as_deref().unwrap_or("no details")
        );
    }

    let total = report.results.len();
    let passed = report.passed_count();
    if passed == total {
        println!("\n✅ {}/{} test cases passed in {} ms", passed, total, report.duration_ms);
    } else {
        println!("\n❌ {}/{} test cases passed in {} ms", passed, total, report.duration_ms);
    }

    Ok(())
}

/// Harness program the sandbox would build for these inputs
pub fn render(language: &str, code_file: &Path, snippet_file: Option<&Path>, tests: &Path) -> Result<String> {
    let language: Language = language.parse()?;
    let code = read_source(code_file)?;
    let snippet = read_snippet(snippet_file)?;
    let cases = load_test_cases(tests)?;

    let entry_point = snippet
        .as_deref()
        .and_then(|s| harness::extract_entry_point(language, s))
        .or_else(|| harness::extract_entry_point(language, &code));
    if entry_point.is_none() {
        eprintln!("⚠️  No {} function declaration found; the harness will not run", language);
    }

    Ok(harness::generate(language, &cases, snippet.as_deref(), &code))
}

pub fn list_languages() {
    println!("📋 Supported languages:");
    for language in Language::ALL {
        println!("  {:<12} {}", language, LanguageProfile::of(language).entry_file);
    }
}

/// Remove stale sandbox containers and dangling sandbox images
pub async fn sweep() -> Result<()> {
    let sandbox = Sandbox::connect_local(SandboxConfig::from_env()).context("Failed to connect to Docker")?;

    println!("🗑️  Sweeping sandbox leftovers...");
    let report = sandbox.sweep().await;

    for removed in &report.removed {
        println!("  removed {}", removed);
    }
    for failure in &report.failures {
        println!("  ⚠️  {}", failure);
    }

    println!(
        "✅ Removed {} object(s), {} failure(s)",
        report.removed.len(),
        report.failures.len()
    );
    Ok(())
}
