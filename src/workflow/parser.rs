//! Workflow file parsing
//!
//! Extracts the `workflow_dispatch` input schema from workflow YAML,
//! together with validation rules embedded as structured comments
//! (`# lazydispatch:validate:<rule>[:<arg>]`). Structure comes from
//! serde_yaml; comments are recovered with a line scan over the raw
//! text, attributed to the input key they sit on or directly above.

use std::path::Path;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use crate::error::{DispatchError, Result};
use crate::workflow::validate::ValidationRule;

/// Type of a workflow_dispatch input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputType {
    #[default]
    String,
    Boolean,
    Choice,
    Number,
    Environment,
}

impl InputType {
    fn parse(s: &str) -> Self {
        match s {
            "boolean" => Self::Boolean,
            "choice" => Self::Choice,
            "number" => Self::Number,
            "environment" => Self::Environment,
            _ => Self::String,
        }
    }
}

/// One input declared under `workflow_dispatch.inputs`
#[derive(Debug, Clone, Default)]
pub struct WorkflowInput {
    pub description: String,
    pub required: bool,
    pub default: Option<String>,
    pub input_type: InputType,
    pub options: Vec<String>,
    pub validation_rules: Vec<ValidationRule>,
}

/// The `workflow_dispatch` trigger and its inputs, in declaration order
#[derive(Debug, Clone, Default)]
pub struct WorkflowDispatch {
    pub inputs: IndexMap<String, WorkflowInput>,
}

/// A parsed workflow file
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    /// Workflow `name`, falling back to the filename
    pub name: String,
    /// Filename within `.github/workflows`
    pub filename: String,
    /// Present iff the workflow can be dispatched manually
    pub dispatch: Option<WorkflowDispatch>,
}

impl WorkflowFile {
    /// A workflow is dispatchable iff it declares `workflow_dispatch`.
    pub fn is_dispatchable(&self) -> bool {
        self.dispatch.is_some()
    }
}

/// Parse one workflow file.
///
/// `on` is accepted as a scalar (`on: push`), a sequence
/// (`on: [push, pull_request]`), or a mapping; only the mapping form
/// can carry `workflow_dispatch` inputs. An invalid validation rule
/// fails the whole file.
pub fn parse_workflow(filename: &str, content: &str) -> Result<WorkflowFile> {
    let doc: Value = serde_yaml::from_str(content).map_err(|source| DispatchError::Yaml {
        file: filename.to_string(),
        source,
    })?;

    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(filename)
        .to_string();

    let dispatch = match doc.get("on") {
        // Scalar and sequence forms can name the trigger but never
        // carry inputs.
        Some(Value::String(s)) if s == "workflow_dispatch" => Some(WorkflowDispatch::default()),
        Some(Value::Sequence(triggers))
            if triggers
                .iter()
                .any(|t| t.as_str() == Some("workflow_dispatch")) =>
        {
            Some(WorkflowDispatch::default())
        }
        Some(on @ Value::Mapping(_)) => match on.get("workflow_dispatch") {
            Some(wd) => Some(parse_dispatch(filename, wd, content)?),
            None => None,
        },
        _ => None,
    };

    Ok(WorkflowFile {
        name,
        filename: filename.to_string(),
        dispatch,
    })
}

fn parse_dispatch(filename: &str, wd: &Value, content: &str) -> Result<WorkflowDispatch> {
    let mut inputs = IndexMap::new();

    if let Some(Value::Mapping(input_map)) = wd.get("inputs") {
        for (key, fields) in input_map {
            let Some(input_name) = key.as_str() else {
                continue;
            };
            inputs.insert(input_name.to_string(), parse_input(fields));
        }
    }

    // Attach comment-embedded validation rules.
    for (input_name, specs) in scan_validation_comments(content) {
        let Some(input) = inputs.get_mut(&input_name) else {
            continue;
        };
        for (kind, arg) in specs {
            let rule = ValidationRule::parse(&kind, arg.as_deref()).map_err(|reason| {
                DispatchError::InvalidValidationRule {
                    file: filename.to_string(),
                    rule: match &arg {
                        Some(a) => format!("{kind}:{a}"),
                        None => kind.clone(),
                    },
                    reason,
                }
            })?;
            input.validation_rules.push(rule);
        }
    }

    Ok(WorkflowDispatch { inputs })
}

fn parse_input(fields: &Value) -> WorkflowInput {
    let mut input = WorkflowInput::default();
    let Value::Mapping(_) = fields else {
        return input;
    };

    if let Some(desc) = fields.get("description") {
        input.description = scalar_to_string(desc).unwrap_or_default();
    }
    input.required = fields
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    input.default = fields.get("default").and_then(scalar_to_string);
    input.input_type = fields
        .get("type")
        .and_then(Value::as_str)
        .map(InputType::parse)
        .unwrap_or_default();
    if let Some(Value::Sequence(opts)) = fields.get("options") {
        input.options = opts.iter().filter_map(scalar_to_string).collect();
    }
    input
}

/// YAML scalars arrive as strings, bools, or numbers; inputs carry
/// them all as strings.
fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

static VALIDATE_COMMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"#\s*lazydispatch:validate:([a-z]+)(?::(.*?))?\s*$")
        .expect("invalid validation comment pattern")
});

static INPUT_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)([A-Za-z0-9_-]+):").expect("invalid input key pattern"));

/// Scan raw workflow text for validation comments inside the
/// `workflow_dispatch.inputs` block.
///
/// A comment belongs to an input if it sits on the input key line, on
/// one of its field lines, or directly above either (head comments; a
/// blank line breaks the association). Returns
/// `input name -> [(kind, arg)]` in source order.
fn scan_validation_comments(content: &str) -> Vec<(String, Vec<(String, Option<String>)>)> {
    let mut out: IndexMap<String, Vec<(String, Option<String>)>> = IndexMap::new();

    let mut inputs_indent: Option<usize> = None;
    let mut key_indent: Option<usize> = None;
    let mut in_dispatch = false;
    let mut dispatch_indent = 0usize;
    let mut current: Option<String> = None;
    let mut pending: Vec<(String, Option<String>)> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if trimmed.is_empty() {
            pending.clear();
            continue;
        }

        if !in_dispatch {
            if trimmed.starts_with("workflow_dispatch:") {
                in_dispatch = true;
                dispatch_indent = indent;
            }
            continue;
        }

        // Pure comment line. At field depth it belongs to the input
        // being read; at key depth it is a head comment for the next
        // input key.
        if trimmed.starts_with('#') {
            if let Some(spec) = extract_rule(trimmed) {
                match (key_indent, &current) {
                    (Some(k), Some(name)) if indent > k => {
                        out.entry(name.clone()).or_default().push(spec);
                    }
                    _ => pending.push(spec),
                }
            }
            continue;
        }

        // Leaving the workflow_dispatch block ends the scan.
        if indent <= dispatch_indent {
            break;
        }

        match inputs_indent {
            None => {
                if trimmed.starts_with("inputs:") {
                    inputs_indent = Some(indent);
                }
                pending.clear();
                continue;
            }
            Some(inp) if indent <= inp => break,
            Some(_) => {}
        }

        let is_key = match key_indent {
            // The first content line under inputs fixes the key level.
            None => {
                key_indent = Some(indent);
                true
            }
            Some(k) => indent == k,
        };

        if is_key {
            if let Some(caps) = INPUT_KEY.captures(line) {
                let name = caps[2].to_string();
                let rules = out.entry(name.clone()).or_default();
                rules.append(&mut pending);
                if let Some(spec) = extract_rule(line) {
                    rules.push(spec);
                }
                current = Some(name);
                continue;
            }
        }

        // Field line of the current input.
        if let Some(name) = &current {
            let rules = out.entry(name.clone()).or_default();
            rules.append(&mut pending);
            if let Some(spec) = extract_rule(line) {
                rules.push(spec);
            }
        } else {
            pending.clear();
        }
    }

    out.into_iter().collect()
}

fn extract_rule(line: &str) -> Option<(String, Option<String>)> {
    let caps = VALIDATE_COMMENT.captures(line)?;
    let kind = caps[1].to_string();
    let arg = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    Some((kind, arg))
}

/// Enumerate and parse `.github/workflows/*.yml|yaml` under `root`.
///
/// Unparseable files are skipped with a warning on the log; results
/// come back sorted by filename for deterministic listings.
pub fn discover_workflows(root: &Path) -> Result<Vec<WorkflowFile>> {
    let dir = root.join(".github").join("workflows");
    let mut workflows = Vec::new();

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(workflows),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if ext != "yml" && ext != "yaml" {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };
        let content = std::fs::read_to_string(&path)?;
        match parse_workflow(filename, &content) {
            Ok(wf) => workflows.push(wf),
            Err(e) => tracing::warn!(file = filename, error = %e, "skipping unparseable workflow"),
        }
    }

    workflows.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(workflows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_as_scalar() {
        let wf = parse_workflow("ci.yml", "name: CI\non: push\njobs: {}\n").unwrap();
        assert_eq!(wf.name, "CI");
        assert!(!wf.is_dispatchable());
    }

    #[test]
    fn test_on_as_sequence() {
        let wf = parse_workflow("ci.yml", "on: [push, pull_request]\njobs: {}\n").unwrap();
        assert!(!wf.is_dispatchable());
    }

    #[test]
    fn test_scalar_and_sequence_dispatch_without_inputs() {
        let wf = parse_workflow("x.yml", "on: workflow_dispatch\n").unwrap();
        assert!(wf.is_dispatchable());
        assert!(wf.dispatch.unwrap().inputs.is_empty());

        let wf = parse_workflow("y.yml", "on: [push, workflow_dispatch]\n").unwrap();
        assert!(wf.is_dispatchable());
    }

    #[test]
    fn test_on_mapping_without_dispatch() {
        let wf = parse_workflow("ci.yml", "on:\n  push:\n    branches: [main]\n").unwrap();
        assert!(!wf.is_dispatchable());
    }

    #[test]
    fn test_name_falls_back_to_filename() {
        let wf = parse_workflow("deploy.yml", "on: push\n").unwrap();
        assert_eq!(wf.name, "deploy.yml");
    }

    #[test]
    fn test_dispatch_with_typed_inputs() {
        let yaml = r#"
name: Deploy
on:
  workflow_dispatch:
    inputs:
      environment:
        description: Target environment
        type: choice
        required: true
        options:
          - staging
          - production
      dry_run:
        type: boolean
        default: false
      tag:
        description: Release tag
"#;
        let wf = parse_workflow("deploy.yml", yaml).unwrap();
        let dispatch = wf.dispatch.unwrap();
        assert_eq!(dispatch.inputs.len(), 3);

        // Declaration order is preserved.
        let names: Vec<_> = dispatch.inputs.keys().cloned().collect();
        assert_eq!(names, vec!["environment", "dry_run", "tag"]);

        let env = &dispatch.inputs["environment"];
        assert_eq!(env.input_type, InputType::Choice);
        assert!(env.required);
        assert_eq!(env.options, vec!["staging", "production"]);

        let dry = &dispatch.inputs["dry_run"];
        assert_eq!(dry.input_type, InputType::Boolean);
        assert_eq!(dry.default.as_deref(), Some("false"));

        // No explicit type defaults to string.
        assert_eq!(dispatch.inputs["tag"].input_type, InputType::String);
    }

    #[test]
    fn test_dispatch_with_no_inputs() {
        let wf = parse_workflow("x.yml", "on:\n  workflow_dispatch:\n").unwrap();
        assert!(wf.is_dispatchable());
        assert!(wf.dispatch.unwrap().inputs.is_empty());
    }

    #[test]
    fn test_validation_comments_attach_to_inputs() {
        let yaml = r#"
on:
  workflow_dispatch:
    inputs:
      # lazydispatch:validate:required
      version:
        description: Version to release # lazydispatch:validate:regex:^v\d+
        # lazydispatch:validate:length:2-20
        default: v1
      count:
        description: Parallel shards
        # lazydispatch:validate:range:1-16
"#;
        let wf = parse_workflow("release.yml", yaml).unwrap();
        let dispatch = wf.dispatch.unwrap();

        let version = &dispatch.inputs["version"];
        assert_eq!(version.validation_rules.len(), 3);

        let count = &dispatch.inputs["count"];
        assert_eq!(count.validation_rules.len(), 1);

        // The rules actually evaluate.
        let errs = crate::workflow::validate_value("v2", &version.validation_rules);
        assert!(errs.is_empty());
        // Empty fails both `required` and the regex; `length` treats
        // empty as unset.
        let errs = crate::workflow::validate_value("", &version.validation_rules);
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn test_invalid_rule_fails_the_file() {
        let yaml = r#"
on:
  workflow_dispatch:
    inputs:
      version:
        description: x # lazydispatch:validate:regex:[unclosed
"#;
        let err = parse_workflow("bad.yml", yaml).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidValidationRule { .. }
        ));
    }

    #[test]
    fn test_ordinary_comments_are_ignored() {
        let yaml = r#"
on:
  workflow_dispatch:
    inputs:
      # just a human note
      version:
        description: plain  # another note
"#;
        let wf = parse_workflow("ok.yml", yaml).unwrap();
        assert!(wf.dispatch.unwrap().inputs["version"]
            .validation_rules
            .is_empty());
    }

    #[test]
    fn test_blank_line_breaks_head_comment_association() {
        let yaml = r#"
on:
  workflow_dispatch:
    inputs:
      # lazydispatch:validate:required

      version:
        description: x
"#;
        let wf = parse_workflow("gap.yml", yaml).unwrap();
        assert!(wf.dispatch.unwrap().inputs["version"]
            .validation_rules
            .is_empty());
    }

    #[test]
    fn test_discover_workflows_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let wf_dir = dir.path().join(".github").join("workflows");
        std::fs::create_dir_all(&wf_dir).unwrap();
        std::fs::write(wf_dir.join("b.yml"), "on: push\n").unwrap();
        std::fs::write(wf_dir.join("a.yaml"), "on:\n  workflow_dispatch:\n").unwrap();
        std::fs::write(wf_dir.join("notes.txt"), "ignored").unwrap();

        let wfs = discover_workflows(dir.path()).unwrap();
        let names: Vec<_> = wfs.iter().map(|w| w.filename.as_str()).collect();
        assert_eq!(names, vec!["a.yaml", "b.yml"]);
        assert!(wfs[0].is_dispatchable());
        assert!(!wfs[1].is_dispatchable());
    }

    #[test]
    fn test_discover_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_workflows(dir.path()).unwrap().is_empty());
    }
}
