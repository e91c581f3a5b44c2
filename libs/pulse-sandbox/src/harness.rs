/// Harness Template Engine
///
/// Wraps the user's function in a self-contained program that embeds the test
/// cases, calls the entry point once per case in order, and prints a single
/// line holding an array of `{input, output, expected, result}` records.
///
/// Pure text generation: nothing here touches the filesystem or the runtime.

use crate::language::{CaseLiteral, LanguageProfile};
use pulse_common::types::{Language, TestCase};
use tracing::debug;

/// Generate the harness program for `language`.
///
/// The entry point is taken from `snippet` when it declares one, otherwise
/// from `user_code`. When neither declares one the placeholder stays empty and
/// the program fails to build or run.
pub fn generate(
    language: Language,
    test_cases: &[TestCase],
    snippet: Option<&str>,
    user_code: &str,
) -> String {
    let profile = LanguageProfile::of(language);

    let entry_point = snippet
        .and_then(|s| extract_entry_point(language, s))
        .or_else(|| extract_entry_point(language, user_code))
        .unwrap_or_default();

    if entry_point.is_empty() {
        debug!(language = %language, "No entry point declaration found");
    }

    let cases = render_cases(profile.case_literal, test_cases);

    render(
        profile.template,
        &[
            ("USER_CODE", user_code),
            ("TEST_CASES", &cases),
            ("ENTRY_POINT", &entry_point),
        ],
    )
}

/// First declared callable name matching one of the language's patterns
pub fn extract_entry_point(language: Language, code: &str) -> Option<String> {
    let patterns = LanguageProfile::of(language).entry_patterns();

    // Earliest declaration in the text wins, regardless of pattern order
    patterns
        .iter()
        .filter_map(|re| re.captures(code))
        .filter_map(|caps| caps.get(1))
        .min_by_key(|m| m.start())
        .map(|m| m.as_str().to_string())
}

/// Escaped double-quoted literal, valid in Python, JavaScript and Go
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn render_cases(style: CaseLiteral, cases: &[TestCase]) -> String {
    let items: Vec<String> = cases
        .iter()
        .map(|tc| {
            let input = quote(&tc.input);
            let output = quote(&tc.output);
            match style {
                CaseLiteral::PythonDicts => format!("{{\"input\": {}, \"output\": {}}}", input, output),
                CaseLiteral::JsObjects => format!("{{ input: {}, output: {} }}", input, output),
                CaseLiteral::GoStructs => format!("{{Input: {}, Output: {}}}", input, output),
            }
        })
        .collect();

    match style {
        CaseLiteral::GoStructs => format!("[]pulseCase{{{}}}", items.join(", ")),
        CaseLiteral::PythonDicts | CaseLiteral::JsObjects => format!("[{}]", items.join(", ")),
    }
}

/// Single-pass placeholder substitution over the template only, so
/// placeholder-like text inside substituted values is left alone.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + values.iter().map(|(_, v)| v.len()).sum::<usize>());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match values.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
