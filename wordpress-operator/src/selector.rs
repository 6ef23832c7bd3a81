//! Label selectors.
//!
//! Selectors are [`kube::core::Selector`] values. This module adds what kube
//! leaves to callers: validation of keys and values, and parsing of the
//! textual selector grammar:
//!
//! ```text
//! env=prod            env==prod           env!=prod
//! tier in (gold,silver)                   tier notin (bronze)
//! managed             !managed
//! ```
//!
//! Requirements are separated by commas. The `Display` form of a selector is
//! what the API server expects in `labelSelector` query parameters.

use crate::error::{OperatorError, OperatorResult};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

pub use kube::core::{Expression, Selector, SelectorExt};

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$").expect("valid label name regex")
});

static DNS_SUBDOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("valid dns subdomain regex")
});

/// Compile an optional `LabelSelector`; `None` and an empty selector match
/// everything.
///
/// # Errors
///
/// `InvalidSelector` for unknown operators, `In`/`NotIn` without values,
/// `Exists`/`DoesNotExist` with values, and malformed keys or values.
pub fn compile(selector: Option<&LabelSelector>) -> OperatorResult<Selector> {
    let Some(selector) = selector else {
        return Ok(Selector::default());
    };

    for expr in selector.match_expressions.iter().flatten() {
        let has_values = expr.values.as_ref().is_some_and(|v| !v.is_empty());
        if matches!(expr.operator.as_str(), "Exists" | "DoesNotExist") && has_values {
            return Err(OperatorError::InvalidSelector(format!(
                "values must be empty for operator {} on key {}",
                expr.operator, expr.key
            )));
        }
    }

    let compiled = Selector::try_from(selector.clone())
        .map_err(|e| OperatorError::InvalidSelector(e.to_string()))?;
    validated(compiled)
}

/// Parse the textual selector grammar.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use wordpress_operator::selector::{SelectorExt, parse};
///
/// let selector = parse("env=prod,tier in (gold,silver)").unwrap();
/// let labels = BTreeMap::from([
///     ("env".to_string(), "prod".to_string()),
///     ("tier".to_string(), "gold".to_string()),
/// ]);
/// assert!(selector.matches(&labels));
/// assert_eq!(selector.to_string(), "env=prod,tier in (gold,silver)");
/// ```
pub fn parse(input: &str) -> OperatorResult<Selector> {
    let selector = split_top_level(input)?
        .into_iter()
        .map(parse_expression)
        .collect::<OperatorResult<Selector>>()?;
    validated(selector)
}

fn validated(selector: Selector) -> OperatorResult<Selector> {
    for expr in selector.clone() {
        validate(&expr)?;
    }
    Ok(selector)
}

fn validate(expr: &Expression) -> OperatorResult<()> {
    match expr {
        Expression::Equal(key, value) | Expression::NotEqual(key, value) => {
            validate_key(key)?;
            validate_value(value)
        }
        Expression::In(key, values) | Expression::NotIn(key, values) => {
            validate_key(key)?;
            if values.is_empty() {
                return Err(OperatorError::InvalidSelector(format!(
                    "set requirement for {} needs at least one value",
                    key
                )));
            }
            values.iter().try_for_each(|v| validate_value(v))
        }
        Expression::Exists(key) | Expression::DoesNotExist(key) => validate_key(key),
    }
}

/// Split on commas that are not inside a value set.
fn split_top_level(input: &str) -> OperatorResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    OperatorError::InvalidSelector(format!("unbalanced ')' in {:?}", input))
                })?
            }
            ',' if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(OperatorError::InvalidSelector(format!(
            "unbalanced '(' in {:?}",
            input
        )));
    }

    let last = &input[start..];
    if !(parts.is_empty() && last.trim().is_empty()) {
        parts.push(last);
    }

    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(OperatorError::InvalidSelector(format!(
            "empty requirement in {:?}",
            input
        )));
    }

    Ok(parts)
}

fn parse_expression(raw: &str) -> OperatorResult<Expression> {
    let part = raw.trim();

    if let Some(key) = part.strip_prefix('!') {
        return Ok(Expression::DoesNotExist(key.trim().to_string()));
    }

    if let Some((key, value)) = part.split_once("!=") {
        return Ok(Expression::NotEqual(
            key.trim().to_string(),
            value.trim().to_string(),
        ));
    }

    if let Some((key, value)) = part.split_once("==").or_else(|| part.split_once('=')) {
        return Ok(Expression::Equal(
            key.trim().to_string(),
            value.trim().to_string(),
        ));
    }

    if let Some(open) = part.find('(') {
        let head: Vec<&str> = part[..open].split_whitespace().collect();
        let body = part[open + 1..].strip_suffix(')').ok_or_else(|| {
            OperatorError::InvalidSelector(format!("expected ')' at end of {:?}", part))
        })?;
        let values: BTreeSet<String> = body
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();

        return match head.as_slice() {
            [key, "in"] => Ok(Expression::In(key.to_string(), values)),
            [key, "notin"] => Ok(Expression::NotIn(key.to_string(), values)),
            _ => Err(OperatorError::InvalidSelector(format!(
                "expected 'key in (...)' or 'key notin (...)', got {:?}",
                part
            ))),
        };
    }

    if part.split_whitespace().count() != 1 {
        return Err(OperatorError::InvalidSelector(format!(
            "unexpected requirement {:?}",
            part
        )));
    }

    Ok(Expression::Exists(part.to_string()))
}

fn validate_key(key: &str) -> OperatorResult<()> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > 253 || !DNS_SUBDOMAIN_RE.is_match(prefix) {
            return Err(OperatorError::InvalidSelector(format!(
                "invalid label key prefix {:?}",
                prefix
            )));
        }
    }

    if name.is_empty() || name.len() > 63 || !NAME_RE.is_match(name) {
        return Err(OperatorError::InvalidSelector(format!(
            "invalid label key {:?}",
            key
        )));
    }

    Ok(())
}

fn validate_value(value: &str) -> OperatorResult<()> {
    if value.is_empty() {
        return Ok(());
    }
    if value.len() > 63 || !NAME_RE.is_match(value) {
        return Err(OperatorError::InvalidSelector(format!(
            "invalid label value {:?}",
            value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;
    use std::collections::BTreeMap;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_selector_matches_everything() {
        let selector = parse("").unwrap();
        assert!(selector.selects_all());
        assert!(selector.matches(&labels(&[])));

        assert!(compile(Some(&LabelSelector::default())).unwrap().selects_all());
        assert!(compile(None).unwrap().selects_all());
    }

    #[test]
    fn negative_requirements_match_missing_keys() {
        let selector = parse("env!=prod,tier notin (bronze)").unwrap();
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("env", "staging"), ("tier", "gold")])));
        assert!(!selector.matches(&labels(&[("tier", "bronze")])));
    }

    #[test]
    fn parse_set_and_existence() {
        let selector = parse("tier in (gold, silver), managed, !legacy").unwrap();
        assert!(selector.matches(&labels(&[("tier", "silver"), ("managed", "")])));
        assert!(!selector.matches(&labels(&[("tier", "silver")])));
        assert!(!selector.matches(&labels(&[
            ("tier", "gold"),
            ("managed", "yes"),
            ("legacy", "1")
        ])));
        assert_eq!(
            selector.to_string(),
            "tier in (gold,silver),managed,!legacy"
        );
    }

    #[test]
    fn double_equals() {
        let selector = parse("app.kubernetes.io/name==wordpress").unwrap();
        assert_eq!(selector.to_string(), "app.kubernetes.io/name=wordpress");
    }

    #[test]
    fn rejects_malformed_input() {
        for input in [
            "env in ()",
            "env in (a",
            "env)",
            "env=prod,,tier=gold",
            "env between (a,b)",
            "two words",
            "-bad=value",
            "Bad_Prefix/name=value",
            "env=has space",
        ] {
            assert!(
                matches!(parse(input), Err(OperatorError::InvalidSelector(_))),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn compile_label_selector() {
        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([("env".to_string(), "prod".to_string())])),
            match_expressions: Some(vec![
                LabelSelectorRequirement {
                    key: "tier".to_string(),
                    operator: "In".to_string(),
                    values: Some(vec!["gold".to_string(), "silver".to_string()]),
                },
                LabelSelectorRequirement {
                    key: "legacy".to_string(),
                    operator: "DoesNotExist".to_string(),
                    values: None,
                },
            ]),
        };

        let compiled = compile(Some(&selector)).unwrap();
        assert_eq!(
            compiled.to_string(),
            "env=prod,tier in (gold,silver),!legacy"
        );
        assert!(compiled.matches(&labels(&[("env", "prod"), ("tier", "gold")])));
        assert!(!compiled.matches(&labels(&[("env", "prod"), ("tier", "bronze")])));
    }

    #[test]
    fn label_selector_errors() {
        let requirement = |operator: &str, values: Option<Vec<String>>| LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "env".to_string(),
                operator: operator.to_string(),
                values,
            }]),
            ..Default::default()
        };

        for selector in [
            requirement("Matches", None),
            requirement("Exists", Some(vec!["prod".to_string()])),
            requirement("In", Some(vec![])),
            requirement("In", None),
        ] {
            assert!(
                matches!(compile(Some(&selector)), Err(OperatorError::InvalidSelector(_))),
                "{:?} should be rejected",
                selector
            );
        }

        let bad_value = LabelSelector {
            match_labels: Some(BTreeMap::from([("env".to_string(), "not ok".to_string())])),
            ..Default::default()
        };
        assert!(compile(Some(&bad_value)).is_err());
    }
}
