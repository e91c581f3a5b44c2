/// Result Normalizer
///
/// Turns the raw bytes a harness printed into one verdict per test case.
/// Harness output differs by language: Python prints its own literal syntax
/// (single quotes, `True`, `None`), JavaScript and Go print JSON. Everything
/// is repaired into JSON first, then each value is rendered as canonical text
/// so `3` and `"3"` compare equal.

use crate::error::SandboxError;
use lazy_static::lazy_static;
use pulse_common::types::TestVerdict;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    // CSI sequences (colors, cursor movement)
    static ref CSI: Regex = Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").unwrap();
    // OSC sequences, terminated by BEL or ST
    static ref OSC: Regex = Regex::new(r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)").unwrap();
    static ref SHORT_ESCAPE: Regex = Regex::new(r"\x1b[@-Z\\-_]").unwrap();
}

/// Verdicts for every record on the program's result line, in printed order
pub fn normalize(raw: &[u8]) -> Result<Vec<TestVerdict>, SandboxError> {
    let text = String::from_utf8_lossy(raw);
    let cleaned = strip_control(&text);

    let line = result_line(&cleaned)
        .ok_or_else(|| SandboxError::OutputParse("no result line in program output".to_string()))?;

    let repaired = repair_literals(line);
    let parsed: Value = serde_json::from_str(&repaired)
        .map_err(|e| SandboxError::OutputParse(format!("{}: {}", e, truncate(line))))?;

    let Value::Array(records) = parsed else {
        return Err(SandboxError::OutputParse("result line is not a list".to_string()));
    };

    records
        .iter()
        .enumerate()
        .map(|(index, record)| verdict(index, record))
        .collect()
}

/// Canonical single-line text form of [`normalize`]'s result
pub fn normalize_text(raw: &[u8]) -> Result<String, SandboxError> {
    let verdicts = normalize(raw)?;
    serde_json::to_string(&verdicts).map_err(|e| SandboxError::OutputParse(e.to_string()))
}

fn verdict(index: usize, record: &Value) -> Result<TestVerdict, SandboxError> {
    let field = |name: &str| {
        record
            .get(name)
            .map(canonical_text)
            .ok_or_else(|| SandboxError::OutputParse(format!("record {} has no `{}` field", index, name)))
    };

    let input = field("input")?;
    let output = field("output")?;
    let expected = field("expected")?;

    // The harness's own `result` field is a per-language string comparison; ignored
    let passed = comparable(&output) == comparable(&expected);

    Ok(TestVerdict {
        input,
        output,
        expected,
        passed,
    })
}

/// Remove terminal escapes and control bytes other than newline and tab
pub fn strip_control(text: &str) -> String {
    let text = OSC.replace_all(text, "");
    let text = CSI.replace_all(&text, "");
    let text = SHORT_ESCAPE.replace_all(&text, "");
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// List printed on the last line holding one; earlier user prints are ignored.
/// Output the program wrote without a trailing newline can share that line,
/// so the list starts at the line's first `[`.
fn result_line(text: &str) -> Option<&str> {
    let line = text.lines().map(str::trim).rev().find(|line| line.contains('['))?;
    line.find('[').map(|start| &line[start..])
}

/// Rewrite Python and JavaScript literal syntax into JSON.
///
/// String literals are re-emitted double-quoted. Outside of them the bare
/// words `True`, `False`, `None`, `undefined` and `nil` become JSON keywords.
/// Bare numbers and keywords used as object keys become strings.
pub fn repair_literals(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut brackets: Vec<char> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' || c == '"' {
            i = copy_string(&chars, i, &mut out);
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if is_object_key(&chars, i, &brackets) {
                out.push_str(&serde_json::Value::String(word).to_string());
            } else {
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" | "undefined" | "nil" => "null",
                    other => other,
                });
            }
        } else if starts_number(&chars, i) {
            let start = i;
            i = number_end(&chars, i);
            let number: String = chars[start..i].iter().collect();
            if is_object_key(&chars, i, &brackets) {
                out.push('"');
                out.push_str(&number);
                out.push('"');
            } else {
                out.push_str(&number);
            }
        } else {
            match c {
                '[' | '{' => brackets.push(c),
                ']' | '}' => {
                    brackets.pop();
                }
                _ => {}
            }
            out.push(c);
            i += 1;
        }
    }

    out
}

fn starts_number(chars: &[char], at: usize) -> bool {
    match chars[at] {
        c if c.is_ascii_digit() => true,
        '-' => chars.get(at + 1).is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Index after the numeric literal starting at `start`, exponent included
fn number_end(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        let signed_exponent = (c == '+' || c == '-') && matches!(chars[i - 1], 'e' | 'E');
        if c.is_ascii_alphanumeric() || c == '.' || signed_exponent {
            i += 1;
        } else {
            break;
        }
    }
    i
}

/// True when the token ending at `end` is followed by `:` inside an object
fn is_object_key(chars: &[char], end: usize, brackets: &[char]) -> bool {
    brackets.last() == Some(&'{')
        && chars[end..]
            .iter()
            .find(|c| !c.is_whitespace())
            .is_some_and(|c| *c == ':')
}

/// Copy the literal opening at `start` as a JSON string; returns the index after it
fn copy_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    out.push('"');
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];

        if c == '\\' && i + 1 < chars.len() {
            let next = chars[i + 1];
            match next {
                '\'' => {
                    out.push('\'');
                    i += 2;
                }
                'x' if is_hex_pair(chars, i + 2) => {
                    out.push_str("\\u00");
                    out.push(chars[i + 2]);
                    out.push(chars[i + 3]);
                    i += 4;
                }
                _ => {
                    out.push('\\');
                    out.push(next);
                    i += 2;
                }
            }
            continue;
        }

        if c == quote {
            out.push('"');
            return i + 1;
        }

        match c {
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
        i += 1;
    }

    // Unterminated: left open so parsing reports it
    i
}

fn is_hex_pair(chars: &[char], at: usize) -> bool {
    chars.get(at).is_some_and(|c| c.is_ascii_hexdigit())
        && chars.get(at + 1).is_some_and(|c| c.is_ascii_hexdigit())
}

/// Text of a value: strings unquoted, everything else in canonical JSON-like form
pub fn canonical_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => nested_text(other),
    }
}

fn nested_text(value: &Value) -> String {
    match value {
        Value::String(s) => Value::String(s.clone()).to_string(),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(nested_text).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", Value::String(k.clone()), nested_text(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

/// Comparison key: literal text is parsed and canonicalized, anything else is trimmed
fn comparable(text: &str) -> String {
    let trimmed = text.trim();
    match serde_json::from_str::<Value>(&repair_literals(trimmed)) {
        Ok(value) => canonical_text(&value),
        Err(_) => trimmed.to_string(),
    }
}

fn truncate(line: &str) -> String {
    const LIMIT: usize = 200;
    match line.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}
