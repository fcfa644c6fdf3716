//! Variable interpolation for strings
//!
//! Replaces `${name}` references in recipe strings. Values may themselves
//! contain references, which are expanded until nothing changes.

use crate::error::{InterpolationError, InterpolationResult};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("variable pattern is valid"));

/// Expansion passes before a value is considered self-referencing
const MAX_DEPTH: usize = 32;

/// Interpolate `${name}` references, leaving unknown names in place
pub fn interpolate<F>(s: &str, lookup: F) -> InterpolationResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = s.to_string();

    for _ in 0..MAX_DEPTH {
        let mut changed = false;

        let next = VAR_PATTERN
            .replace_all(&result, |caps: &regex::Captures<'_>| match lookup(&caps[1]) {
                Some(value) => {
                    changed = true;
                    value
                }
                None => caps[0].to_string(),
            })
            .into_owned();

        if !changed {
            return Ok(next);
        }
        result = next;
    }

    Err(InterpolationError::RecursiveInterpolation)
}

/// Interpolate, failing on the first name that has no value
pub fn interpolate_strict<F>(s: &str, lookup: F) -> InterpolationResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let result = interpolate(s, lookup)?;

    if let Some(caps) = VAR_PATTERN.captures(&result) {
        return Err(InterpolationError::UndefinedVariable(caps[1].to_string()));
    }

    Ok(result)
}

/// Lookup over a plain map
pub fn from_map(vars: &HashMap<String, String>) -> impl Fn(&str) -> Option<String> + '_ {
    move |name| vars.get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_simple_interpolation() {
        let vars = vars(&[("version", "1.2.11")]);
        let result = interpolate("zlib-${version}.tar.gz", from_map(&vars)).unwrap();
        assert_eq!(result, "zlib-1.2.11.tar.gz");
    }

    #[test]
    fn test_multiple_variables() {
        let vars = vars(&[("prefix", "C:/dev"), ("arch", "x64")]);
        let result = interpolate("${prefix}/build/${arch}", from_map(&vars)).unwrap();
        assert_eq!(result, "C:/dev/build/x64");
    }

    #[test]
    fn test_undefined_variable_lenient() {
        let vars = HashMap::new();
        let result = interpolate("Hello, ${undefined}!", from_map(&vars)).unwrap();
        assert_eq!(result, "Hello, ${undefined}!");
    }

    #[test]
    fn test_undefined_variable_strict() {
        let vars = HashMap::new();
        let result = interpolate_strict("Hello, ${undefined}!", from_map(&vars));
        assert!(matches!(
            result,
            Err(InterpolationError::UndefinedVariable(name)) if name == "undefined"
        ));
    }

    #[test]
    fn test_nested_interpolation() {
        let vars = vars(&[("prefix", "C:/dev"), ("build", "${prefix}/build")]);
        let result = interpolate("${build}/zlib", from_map(&vars)).unwrap();
        assert_eq!(result, "C:/dev/build/zlib");
    }

    #[test]
    fn test_self_reference_is_an_error() {
        let vars = vars(&[("loop", "x${loop}")]);
        let result = interpolate("${loop}", from_map(&vars));
        assert!(matches!(
            result,
            Err(InterpolationError::RecursiveInterpolation)
        ));
    }

    #[test]
    fn test_empty_reference_left_alone() {
        let vars = HashMap::new();
        let result = interpolate("Value: ${}", from_map(&vars)).unwrap();
        assert_eq!(result, "Value: ${}");
    }
}
