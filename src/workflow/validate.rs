//! Validation rules for workflow_dispatch inputs
//!
//! Rules travel as structured comments in the workflow file
//! (`# lazydispatch:validate:<rule>[:<arg>]`) and are evaluated
//! against the value the user typed before anything is dispatched.
//! Evaluation is pure: no I/O, no globals.

use regex::Regex;

/// One validation rule attached to a workflow input
#[derive(Debug, Clone)]
pub enum ValidationRule {
    /// Trimmed value must be non-empty
    Required,
    /// Value must match the pattern
    Regex(Regex),
    /// Value must parse as an integer in `[min, max]`; empty passes
    Range { min: i64, max: i64 },
    /// Value must start with the prefix; empty passes
    Prefix(String),
    /// Value must end with the suffix; empty passes
    Suffix(String),
    /// Value length must lie in `[min, max]`; empty passes
    Length { min: usize, max: usize },
}

impl ValidationRule {
    /// Parse a rule from its comment form, e.g. `("range", Some("1-10"))`.
    ///
    /// Returns a human-readable reason on failure; the caller turns
    /// that into a parse error for the whole workflow file.
    pub fn parse(kind: &str, arg: Option<&str>) -> std::result::Result<Self, String> {
        match kind {
            "required" => Ok(Self::Required),
            "regex" => {
                let pattern = arg.ok_or("regex rule needs a pattern argument")?;
                let re = Regex::new(pattern).map_err(|e| format!("invalid regex: {e}"))?;
                Ok(Self::Regex(re))
            }
            "range" => {
                let (min, max) = parse_bounds::<i64>(arg, "range")?;
                Ok(Self::Range { min, max })
            }
            "prefix" => {
                let s = arg.ok_or("prefix rule needs an argument")?;
                Ok(Self::Prefix(s.to_string()))
            }
            "suffix" => {
                let s = arg.ok_or("suffix rule needs an argument")?;
                Ok(Self::Suffix(s.to_string()))
            }
            "length" => {
                let (min, max) = parse_bounds::<usize>(arg, "length")?;
                Ok(Self::Length { min, max })
            }
            other => Err(format!("unknown rule kind '{other}'")),
        }
    }

    /// Evaluate the rule, returning a failure message or `None` on pass.
    pub fn validate(&self, value: &str) -> Option<String> {
        match self {
            Self::Required => {
                if value.trim().is_empty() {
                    Some("value is required".to_string())
                } else {
                    None
                }
            }
            Self::Regex(re) => {
                if re.is_match(value) {
                    None
                } else {
                    Some(format!("value must match pattern '{re}'"))
                }
            }
            Self::Range { min, max } => {
                if value.is_empty() {
                    return None;
                }
                match value.parse::<i64>() {
                    Ok(n) if (*min..=*max).contains(&n) => None,
                    Ok(n) => Some(format!("value {n} is outside the range {min}-{max}")),
                    Err(_) => Some(format!("'{value}' is not a number")),
                }
            }
            Self::Prefix(prefix) => {
                if value.is_empty() || value.starts_with(prefix) {
                    None
                } else {
                    Some(format!("value must start with '{prefix}'"))
                }
            }
            Self::Suffix(suffix) => {
                if value.is_empty() || value.ends_with(suffix) {
                    None
                } else {
                    Some(format!("value must end with '{suffix}'"))
                }
            }
            Self::Length { min, max } => {
                if value.is_empty() {
                    return None;
                }
                let len = value.chars().count();
                if (*min..=*max).contains(&len) {
                    None
                } else {
                    Some(format!("length {len} is outside {min}-{max} characters"))
                }
            }
        }
    }
}

/// Parse `min-max` bounds with `min <= max`.
fn parse_bounds<T>(arg: Option<&str>, kind: &str) -> std::result::Result<(T, T), String>
where
    T: std::str::FromStr + PartialOrd + Copy,
{
    let arg = arg.ok_or_else(|| format!("{kind} rule needs a min-max argument"))?;
    let (lo, hi) = arg
        .split_once('-')
        .ok_or_else(|| format!("{kind} argument '{arg}' is not of the form min-max"))?;
    let min = lo
        .trim()
        .parse::<T>()
        .map_err(|_| format!("{kind} minimum '{lo}' is not a number"))?;
    let max = hi
        .trim()
        .parse::<T>()
        .map_err(|_| format!("{kind} maximum '{hi}' is not a number"))?;
    if min > max {
        return Err(format!("{kind} bounds '{arg}' have min > max"));
    }
    Ok((min, max))
}

/// Evaluate all rules against a value, concatenating failure messages.
///
/// An empty result means the value is valid.
pub fn validate_value(value: &str, rules: &[ValidationRule]) -> Vec<String> {
    rules.iter().filter_map(|r| r.validate(value)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(specs: &[(&str, Option<&str>)]) -> Vec<ValidationRule> {
        specs
            .iter()
            .map(|(kind, arg)| ValidationRule::parse(kind, *arg).unwrap())
            .collect()
    }

    #[test]
    fn test_required() {
        let rs = rules(&[("required", None)]);
        assert_eq!(validate_value("x", &rs).len(), 0);
        assert_eq!(validate_value("", &rs).len(), 1);
        assert_eq!(validate_value("   ", &rs).len(), 1);
    }

    #[test]
    fn test_regex() {
        let rs = rules(&[("regex", Some(r"^v\d+\.\d+$"))]);
        assert_eq!(validate_value("v1.2", &rs).len(), 0);
        assert_eq!(validate_value("1.2", &rs).len(), 1);
    }

    #[test]
    fn test_regex_invalid_pattern_fails_parse() {
        assert!(ValidationRule::parse("regex", Some("[unclosed")).is_err());
    }

    #[test]
    fn test_range() {
        let rs = rules(&[("range", Some("1-10"))]);
        assert_eq!(validate_value("5", &rs).len(), 0);
        assert_eq!(validate_value("10", &rs).len(), 0);
        assert_eq!(validate_value("11", &rs).len(), 1);
        assert_eq!(validate_value("abc", &rs).len(), 1);
        // Empty is treated as unset
        assert_eq!(validate_value("", &rs).len(), 0);
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        assert!(ValidationRule::parse("range", Some("10-1")).is_err());
    }

    #[test]
    fn test_prefix_and_suffix() {
        let rs = rules(&[("prefix", Some("release-"))]);
        assert_eq!(validate_value("release-1.0", &rs).len(), 0);
        assert_eq!(validate_value("hotfix-1.0", &rs).len(), 1);
        assert_eq!(validate_value("", &rs).len(), 0);

        let rs = rules(&[("suffix", Some(".yml"))]);
        assert_eq!(validate_value("ci.yml", &rs).len(), 0);
        assert_eq!(validate_value("ci.yaml", &rs).len(), 1);
        assert_eq!(validate_value("", &rs).len(), 0);
    }

    #[test]
    fn test_length() {
        let rs = rules(&[("length", Some("2-5"))]);
        assert_eq!(validate_value("abc", &rs).len(), 0);
        assert_eq!(validate_value("a", &rs).len(), 1);
        assert_eq!(validate_value("abcdef", &rs).len(), 1);
    }

    #[test]
    fn test_unknown_kind() {
        assert!(ValidationRule::parse("maximum", Some("3")).is_err());
    }

    // Composition scenario: required + prefix + length
    #[test]
    fn test_composed_rules() {
        let rs = rules(&[
            ("required", None),
            ("prefix", Some("release-")),
            ("length", Some("5-50")),
        ]);

        assert_eq!(validate_value("", &rs).len(), 1); // required only
        assert_eq!(validate_value("feature-x", &rs).len(), 1); // prefix only
        assert_eq!(validate_value("release-1", &rs).len(), 0);

        let long = format!("release-{}", "x".repeat(60));
        assert_eq!(validate_value(&long, &rs).len(), 1); // length only
    }

    #[test]
    fn test_validation_is_deterministic() {
        let rs = rules(&[("range", Some("0-100")), ("length", Some("1-3"))]);
        for _ in 0..3 {
            assert_eq!(validate_value("42", &rs), validate_value("42", &rs));
        }
    }
}
