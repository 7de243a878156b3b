//! Template interpolation for chain step inputs
//!
//! Supports `{{ var.X }}`, `{{ previous.inputs.X }}`, and
//! `{{ steps.N.inputs.X }}`. Unknown paths and missing keys leave the
//! placeholder untouched; substituted text is never re-scanned.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::chain::executor::StepResult;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("invalid placeholder pattern")
});

/// Values visible to a step's templates
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpolationContext<'a> {
    /// Chain variables (`var.<key>`)
    pub vars: Option<&'a BTreeMap<String, String>>,
    /// Results of all earlier steps, by index (`steps.<N>.inputs.<key>`)
    pub steps: &'a [StepResult],
    /// Result of the immediately preceding step (`previous.inputs.<key>`)
    pub previous: Option<&'a StepResult>,
}

impl<'a> InterpolationContext<'a> {
    fn resolve(&self, path: &str) -> Option<String> {
        let mut parts = path.splitn(2, '.');
        match (parts.next()?, parts.next()) {
            ("var", Some(key)) => self.vars?.get(key).cloned(),
            ("previous", Some(rest)) => {
                let key = rest.strip_prefix("inputs.")?;
                self.previous?.inputs.get(key).cloned()
            }
            ("steps", Some(rest)) => {
                let (index, key_part) = rest.split_once('.')?;
                let index: usize = index.parse().ok()?;
                let key = key_part.strip_prefix("inputs.")?;
                self.steps.get(index)?.inputs.get(key).cloned()
            }
            _ => None,
        }
    }
}

/// Substitute every recognized placeholder in `input`.
///
/// `Regex::replace_all` walks the source string once, so replacement
/// text containing `{{ ... }}` is not expanded again.
pub fn interpolate(input: &str, ctx: &InterpolationContext<'_>) -> String {
    PLACEHOLDER
        .replace_all(input, |caps: &Captures<'_>| match ctx.resolve(&caps[1]) {
            Some(value) => value,
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Placeholders left in `value` whose path uses the recognized grammar.
///
/// These are variable typos or references to steps that produced
/// nothing; the chain executor refuses to dispatch with them. Other
/// `{{ ... }}` text is left alone, since it may be meaningful to the
/// target workflow.
pub fn unresolved_refs(value: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(value)
        .filter_map(|caps| {
            let path = &caps[1];
            let recognized = path.starts_with("var.")
                || path.starts_with("previous.inputs.")
                || (path.starts_with("steps.") && {
                    let mut it = path.split('.');
                    it.next();
                    matches!(
                        (it.next(), it.next()),
                        (Some(n), Some("inputs")) if n.chars().all(|c| c.is_ascii_digit())
                    )
                });
            recognized.then(|| caps[0].to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::executor::StepStatus;

    fn step(inputs: &[(&str, &str)]) -> StepResult {
        StepResult {
            workflow: "ci.yml".into(),
            inputs: inputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            run_id: None,
            run_url: None,
            status: StepStatus::Completed,
            conclusion: None,
        }
    }

    #[test]
    fn test_var_substitution() {
        let vars = BTreeMap::from([("env".to_string(), "production".to_string())]);
        let ctx = InterpolationContext {
            vars: Some(&vars),
            ..Default::default()
        };
        assert_eq!(interpolate("{{ var.env }}", &ctx), "production");
        assert_eq!(interpolate("{{var.env}}", &ctx), "production");
        assert_eq!(
            interpolate("deploy-{{  var.env  }}-eu", &ctx),
            "deploy-production-eu"
        );
    }

    #[test]
    fn test_previous_and_steps_paths() {
        let steps = vec![step(&[("tag", "v1.0")]), step(&[("region", "eu")])];
        let ctx = InterpolationContext {
            vars: None,
            steps: &steps,
            previous: steps.last(),
        };
        assert_eq!(interpolate("{{ previous.inputs.region }}", &ctx), "eu");
        assert_eq!(interpolate("{{ steps.0.inputs.tag }}", &ctx), "v1.0");
        assert_eq!(interpolate("{{ steps.1.inputs.region }}", &ctx), "eu");
    }

    #[test]
    fn test_miss_leaves_placeholder() {
        let vars = BTreeMap::new();
        let ctx = InterpolationContext {
            vars: Some(&vars),
            ..Default::default()
        };
        assert_eq!(interpolate("{{ var.missing }}", &ctx), "{{ var.missing }}");
        assert_eq!(
            interpolate("{{ previous.inputs.x }}", &ctx),
            "{{ previous.inputs.x }}"
        );
        assert_eq!(
            interpolate("{{ steps.9.inputs.x }}", &ctx),
            "{{ steps.9.inputs.x }}"
        );
        assert_eq!(interpolate("{{ unknown.path }}", &ctx), "{{ unknown.path }}");
    }

    #[test]
    fn test_no_rescan_of_substituted_text() {
        let vars = BTreeMap::from([
            ("a".to_string(), "{{ var.b }}".to_string()),
            ("b".to_string(), "boom".to_string()),
        ]);
        let ctx = InterpolationContext {
            vars: Some(&vars),
            ..Default::default()
        };
        // The substituted value contains a placeholder but must not be
        // expanded further.
        assert_eq!(interpolate("{{ var.a }}", &ctx), "{{ var.b }}");
    }

    #[test]
    fn test_idempotent_when_values_are_plain() {
        let vars = BTreeMap::from([("env".to_string(), "prod".to_string())]);
        let ctx = InterpolationContext {
            vars: Some(&vars),
            ..Default::default()
        };
        let once = interpolate("x-{{ var.env }}-{{ var.gone }}", &ctx);
        assert_eq!(interpolate(&once, &ctx), once);
    }

    #[test]
    fn test_unresolved_refs_detects_recognized_grammar_only() {
        let left = unresolved_refs("a {{ var.x }} b {{ matrix.os }} c {{ steps.2.inputs.k }}");
        assert_eq!(left, vec!["{{ var.x }}", "{{ steps.2.inputs.k }}"]);

        assert!(unresolved_refs("{{ steps.x.inputs.k }}").is_empty());
        assert!(unresolved_refs("plain text").is_empty());
        assert_eq!(
            unresolved_refs("{{ previous.inputs.thing }}"),
            vec!["{{ previous.inputs.thing }}"]
        );
    }
}
