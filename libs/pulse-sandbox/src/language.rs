// Closed lookup table: everything the pipeline needs to know about a language
use lazy_static::lazy_static;
use pulse_common::types::Language;
use regex::Regex;

/// Name of the build recipe inside every build context
pub const RECIPE_FILE: &str = "Dockerfile";

/// How test cases are embedded into the harness source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseLiteral {
    /// `[{"input": "...", "output": "..."}, ...]`
    PythonDicts,
    /// `[{ input: "...", output: "..." }, ...]`
    JsObjects,
    /// `[]pulseCase{{Input: "...", Output: "..."}, ...}`
    GoStructs,
}

#[derive(Debug)]
pub struct LanguageProfile {
    pub language: Language,
    pub entry_file: &'static str,
    pub recipe: &'static str,
    pub template: &'static str,
    pub case_literal: CaseLiteral,
}

impl LanguageProfile {
    pub fn of(language: Language) -> &'static LanguageProfile {
        match language {
            Language::Python => &PYTHON,
            Language::JavaScript => &JAVASCRIPT,
            Language::Go => &GO,
        }
    }

    /// Declaration patterns whose first capture group is the callable's name
    pub fn entry_patterns(&self) -> &'static [Regex] {
        match self.language {
            Language::Python => &PYTHON_ENTRY,
            Language::JavaScript => &JAVASCRIPT_ENTRY,
            Language::Go => &GO_ENTRY,
        }
    }
}

lazy_static! {
    static ref PYTHON_ENTRY: Vec<Regex> = compile(&[r"def\s+(\w+)\s*\("]);
    static ref JAVASCRIPT_ENTRY: Vec<Regex> = compile(&[
        r"function\s+(\w+)\s*\(",
        r"(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s+)?(?:function\b|\(|\w+\s*=>)",
    ]);
    static ref GO_ENTRY: Vec<Regex> = compile(&[r"func\s+(\w+)\s*[\[(]"]);
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

static PYTHON: LanguageProfile = LanguageProfile {
    language: Language::Python,
    entry_file: "main.py",
    recipe: PYTHON_RECIPE,
    template: PYTHON_TEMPLATE,
    case_literal: CaseLiteral::PythonDicts,
};

static JAVASCRIPT: LanguageProfile = LanguageProfile {
    language: Language::JavaScript,
    entry_file: "main.js",
    recipe: JAVASCRIPT_RECIPE,
    template: JAVASCRIPT_TEMPLATE,
    case_literal: CaseLiteral::JsObjects,
};

static GO: LanguageProfile = LanguageProfile {
    language: Language::Go,
    entry_file: "main.go",
    recipe: GO_RECIPE,
    template: GO_TEMPLATE,
    case_literal: CaseLiteral::GoStructs,
};

const PYTHON_RECIPE: &str = r#"FROM python:3.12-slim
WORKDIR /app
COPY . /app
CMD ["python", "-u", "main.py"]
"#;

const JAVASCRIPT_RECIPE: &str = r#"FROM node:20-slim
WORKDIR /app
COPY . /app
CMD ["node", "main.js"]
"#;

const GO_RECIPE: &str = r#"FROM golang:1.22-alpine
ENV CGO_ENABLED=0 GOCACHE=/tmp/go-build GOFLAGS=-buildvcs=false
WORKDIR /app
COPY . /app
CMD ["go", "run", "main.go"]
"#;

const PYTHON_TEMPLATE: &str = r#"{{USER_CODE}}

import ast as __pulse_ast
import json as __pulse_json


def __pulse_parse(raw):
    raw = raw.strip()
    try:
        return __pulse_json.loads(raw)
    except Exception:
        pass
    try:
        return __pulse_ast.literal_eval(raw)
    except Exception:
        return raw


def __pulse_args(encoded):
    args = []
    for part in encoded.split(";"):
        if not part.strip():
            continue
        _, sep, value = part.partition("=")
        args.append(__pulse_parse(value if sep else part))
    return args


def __pulse_plain(value):
    if isinstance(value, (tuple, set, frozenset)):
        return [__pulse_plain(v) for v in value]
    if isinstance(value, list):
        return [__pulse_plain(v) for v in value]
    if isinstance(value, dict):
        return {k: __pulse_plain(v) for k, v in value.items()}
    return value


__pulse_cases = {{TEST_CASES}}
__pulse_results = []

for __pulse_tc in __pulse_cases:
    __pulse_output = __pulse_plain({{ENTRY_POINT}}(*__pulse_args(__pulse_tc["input"])))
    __pulse_results.append({
        "input": __pulse_tc["input"],
        "output": __pulse_output,
        "expected": __pulse_tc["output"],
        "result": f"{__pulse_output}" == __pulse_tc["output"],
    })

print()
print(__pulse_results)
"#;

const JAVASCRIPT_TEMPLATE: &str = r#"{{USER_CODE}}

const __pulseCases = {{TEST_CASES}};

function __pulseParse(raw) {
  const text = raw.trim();
  try {
    return JSON.parse(text);
  } catch (_) {
    return text;
  }
}

function __pulseArgs(encoded) {
  return encoded
    .split(";")
    .filter((part) => part.trim() !== "")
    .map((part) => {
      const idx = part.indexOf("=");
      return __pulseParse(idx >= 0 ? part.slice(idx + 1) : part);
    });
}

const __pulseResults = [];
for (const tc of __pulseCases) {
  const output = {{ENTRY_POINT}}(...__pulseArgs(tc.input));
  __pulseResults.push({
    input: tc.input,
    output: output === undefined ? null : output,
    expected: tc.output,
    result: String(output) === tc.output,
  });
}

process.stdout.write("\n");
console.log(JSON.stringify(__pulseResults));
"#;

const GO_TEMPLATE: &str = r#"package main

import (
	pulsejson "encoding/json"
	pulsefmt "fmt"
	pulsereflect "reflect"
	pulsestrings "strings"
)

{{USER_CODE}}

type pulseCase struct {
	Input  string
	Output string
}

func pulseArgs(fnType pulsereflect.Type, encoded string) ([]pulsereflect.Value, error) {
	parts := []string{}
	for _, part := range pulsestrings.Split(encoded, ";") {
		if pulsestrings.TrimSpace(part) != "" {
			parts = append(parts, part)
		}
	}
	if len(parts) != fnType.NumIn() {
		return nil, pulsefmt.Errorf("expected %d arguments, got %d", fnType.NumIn(), len(parts))
	}
	args := make([]pulsereflect.Value, len(parts))
	for i, part := range parts {
		raw := part
		if idx := pulsestrings.Index(raw, "="); idx >= 0 {
			raw = raw[idx+1:]
		}
		raw = pulsestrings.TrimSpace(raw)
		ptr := pulsereflect.New(fnType.In(i))
		if err := pulsejson.Unmarshal([]byte(raw), ptr.Interface()); err != nil {
			if fnType.In(i).Kind() != pulsereflect.String {
				return nil, err
			}
			ptr.Elem().SetString(raw)
		}
		args[i] = ptr.Elem()
	}
	return args, nil
}

func main() {
	cases := {{TEST_CASES}}
	fn := pulsereflect.ValueOf({{ENTRY_POINT}})
	results := make([]map[string]interface{}, 0, len(cases))
	for _, tc := range cases {
		args, err := pulseArgs(fn.Type(), tc.Input)
		if err != nil {
			panic(err)
		}
		out := fn.Call(args)
		var value interface{}
		if len(out) > 0 {
			value = out[0].Interface()
		}
		results = append(results, map[string]interface{}{
			"input":    tc.Input,
			"output":   value,
			"expected": tc.Output,
			"result":   pulsefmt.Sprint(value) == tc.Output,
		})
	}
	encoded, err := pulsejson.Marshal(results)
	if err != nil {
		panic(err)
	}
	pulsefmt.Println()
	pulsefmt.Println(string(encoded))
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_files_are_distinct() {
        assert_eq!(LanguageProfile::of(Language::Python).entry_file, "main.py");
        assert_eq!(LanguageProfile::of(Language::JavaScript).entry_file, "main.js");
        assert_eq!(LanguageProfile::of(Language::Go).entry_file, "main.go");
    }

    #[test]
    fn test_recipes_run_their_entry_file() {
        for language in Language::ALL {
            let profile = LanguageProfile::of(language);
            assert!(profile.recipe.starts_with("FROM "));
            assert!(profile.recipe.contains("WORKDIR /app"));
            assert!(
                profile.recipe.contains(profile.entry_file),
                "{} recipe does not reference {}",
                language,
                profile.entry_file
            );
        }
    }

    #[test]
    fn test_templates_have_all_placeholders() {
        for language in Language::ALL {
            let template = LanguageProfile::of(language).template;
            for placeholder in ["{{USER_CODE}}", "{{TEST_CASES}}", "{{ENTRY_POINT}}"] {
                assert!(template.contains(placeholder), "{} lacks {}", language, placeholder);
            }
        }
    }

    #[test]
    fn test_every_language_has_entry_patterns() {
        for language in Language::ALL {
            assert!(!LanguageProfile::of(language).entry_patterns().is_empty());
        }
    }
}
