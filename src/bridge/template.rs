//! Script templates
//!
//! `build_script` is the only way a value reaches script text. Every
//! parameter is JSON-encoded, so names and notes containing quotes, newlines
//! or control characters arrive in the script as inert literals.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::ScriptBuildError;

/// Named parameters for a template
pub type ScriptParams = BTreeMap<String, Value>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex")
});

/// Placeholder names a template references, in sorted order
pub fn placeholders(template: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Encode a value as a JavaScript literal.
///
/// JSON is a JavaScript subset except for U+2028/U+2029 inside strings on
/// older engines, so those are escaped too.
pub fn js_literal(value: &Value) -> Result<String, serde_json::Error> {
    let encoded = serde_json::to_string(value)?;
    Ok(encoded
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029"))
}

/// Substitute `{{name}}` placeholders with JSON-encoded parameters.
///
/// Fails listing every placeholder with no supplied value. Substitution is a
/// single pass, so placeholder-like text inside a value is never expanded.
pub fn build_script(template: &str, params: &ScriptParams) -> Result<String, ScriptBuildError> {
    let missing: Vec<String> = placeholders(template)
        .into_iter()
        .filter(|name| !params.contains_key(name))
        .collect();
    if !missing.is_empty() {
        return Err(ScriptBuildError::MissingParameters { names: missing });
    }

    let mut encoded = BTreeMap::new();
    for (name, value) in params {
        let literal = js_literal(value).map_err(|source| ScriptBuildError::Encode {
            name: name.clone(),
            source,
        })?;
        encoded.insert(name.as_str(), literal);
    }

    Ok(PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            encoded.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> ScriptParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_values_are_json_encoded() {
        let script = build_script(
            "const name = {{name}}; const n = {{ limit }}; const f = {{filters}};",
            &params(&[
                ("name", json!("O'Brien \"quoted\"\nnext line")),
                ("limit", json!(25)),
                ("filters", json!({"flagged": true})),
            ]),
        )
        .unwrap();

        assert_eq!(
            script,
            r#"const name = "O'Brien \"quoted\"\nnext line"; const n = 25; const f = {"flagged":true};"#
        );
    }

    #[test]
    fn test_missing_parameters_are_all_reported() {
        let err = build_script("{{a}} {{b}} {{c}}", &params(&[("b", json!(1))])).unwrap_err();
        match err {
            ScriptBuildError::MissingParameters { names } => {
                assert_eq!(names, vec!["a".to_string(), "c".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_placeholder_text_in_values_is_not_expanded() {
        let script = build_script(
            "{{a}} {{b}}",
            &params(&[("a", json!("{{b}}")), ("b", json!("x"))]),
        )
        .unwrap();
        assert_eq!(script, r#""{{b}}" "x""#);
    }

    #[test]
    fn test_line_separators_escaped() {
        let script = build_script("{{s}}", &params(&[("s", json!("a\u{2028}b"))])).unwrap();
        assert_eq!(script, r#""a\u2028b""#);
    }

    #[test]
    fn test_unused_params_are_allowed() {
        let script = build_script("x", &params(&[("unused", json!(1))])).unwrap();
        assert_eq!(script, "x");
    }
}
