//! Chain definition file parsing
//!
//! Chains live in `.github/lazydispatch.yml`: named sequences of
//! workflow dispatches with wait conditions, failure policies, and
//! (from version 2) user-supplied variables.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::error::{DispatchError, Result};

/// Repo-relative location of the chain config file
pub const CHAIN_CONFIG_PATH: &str = ".github/lazydispatch.yml";

/// Wait condition between a step's dispatch and the next step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WaitFor {
    /// Wait for completion and require a `success` conclusion
    #[default]
    Success,
    /// Wait for completion, accept any conclusion
    Completion,
    /// Continue immediately after dispatch
    None,
}

/// What the chain does when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    /// Stop the chain and mark it failed
    #[default]
    Abort,
    /// Record the step as skipped and move on
    Skip,
    /// Record the step as failed and move on
    Continue,
}

/// Type of a chain variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    #[default]
    String,
    Choice,
    Boolean,
}

/// A user-supplied variable referenced by step inputs as `{{ var.name }}`
#[derive(Debug, Clone, Deserialize)]
pub struct ChainVariable {
    pub name: String,
    #[serde(default, rename = "type")]
    pub variable_type: VariableType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, deserialize_with = "scalar_opt_string")]
    pub default: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// One step of a chain
#[derive(Debug, Clone, Deserialize)]
pub struct ChainStep {
    /// Workflow filename to dispatch
    pub workflow: String,
    #[serde(default, rename = "waitFor")]
    pub wait_for: WaitFor,
    /// Input values, possibly templated
    #[serde(default, deserialize_with = "scalar_string_map")]
    pub inputs: BTreeMap<String, String>,
    #[serde(default, rename = "onFailure")]
    pub on_failure: OnFailure,
}

/// A named pipeline of workflow dispatches
#[derive(Debug, Clone, Deserialize)]
pub struct ChainDefinition {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub variables: Vec<ChainVariable>,
    pub steps: Vec<ChainStep>,
}

#[derive(Debug, Deserialize)]
struct ChainConfigFile {
    version: u64,
    #[serde(default)]
    chains: BTreeMap<String, ChainDefinition>,
}

/// All chains defined for a repository
#[derive(Debug, Clone, Default)]
pub struct ChainConfig {
    pub version: u64,
    chains: BTreeMap<String, ChainDefinition>,
}

impl ChainConfig {
    /// Parse chain config YAML.
    ///
    /// `version` must be 1 or 2; variables require version 2.
    pub fn parse(content: &str) -> Result<Self> {
        let file: ChainConfigFile =
            serde_yaml::from_str(content).map_err(|source| DispatchError::Yaml {
                file: CHAIN_CONFIG_PATH.to_string(),
                source,
            })?;

        if !(1..=2).contains(&file.version) {
            return Err(DispatchError::UnsupportedConfigVersion(file.version));
        }

        if file.version == 1 {
            if let Some((name, _)) = file
                .chains
                .iter()
                .find(|(_, chain)| !chain.variables.is_empty())
            {
                return Err(DispatchError::Config(format!(
                    "chain '{name}' declares variables, which need 'version: 2'"
                )));
            }
        }

        Ok(Self {
            version: file.version,
            chains: file.chains,
        })
    }

    /// Chain names, sorted for deterministic enumeration.
    pub fn chain_names(&self) -> Vec<String> {
        self.chains.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&ChainDefinition> {
        self.chains.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

/// Load `.github/lazydispatch.yml` under `root`; a missing file is an
/// empty config, not an error.
pub fn load_chain_config(root: &Path) -> Result<ChainConfig> {
    let path = root.join(CHAIN_CONFIG_PATH);
    if !path.exists() {
        return Ok(ChainConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    ChainConfig::parse(&content)
}

/// Accept YAML scalars (strings, bools, numbers) as string values.
fn scalar_string_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    for (k, v) in raw {
        out.insert(k, scalar_to_string::<D>(v)?);
    }
    Ok(out)
}

fn scalar_opt_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        None => Ok(None),
        Some(v) => scalar_to_string::<D>(v).map(Some),
    }
}

fn scalar_to_string<'de, D>(v: serde_yaml::Value) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match v {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a scalar value, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version: 2
chains:
  release:
    description: Build, then deploy
    variables:
      - name: env
        type: choice
        options: [staging, production]
        default: staging
        required: true
    steps:
      - workflow: ci.yml
        waitFor: success
      - workflow: deploy.yml
        waitFor: completion
        onFailure: continue
        inputs:
          environment: "{{ var.env }}"
          shards: 4
  nightly:
    steps:
      - workflow: nightly.yml
        waitFor: none
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = ChainConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.version, 2);

        let release = config.get("release").unwrap();
        assert_eq!(release.description.as_deref(), Some("Build, then deploy"));
        assert_eq!(release.variables.len(), 1);
        assert_eq!(release.variables[0].variable_type, VariableType::Choice);

        // Explicit values
        assert_eq!(release.steps[0].wait_for, WaitFor::Success);
        assert_eq!(release.steps[1].wait_for, WaitFor::Completion);
        assert_eq!(release.steps[1].on_failure, OnFailure::Continue);

        // Defaults
        assert_eq!(release.steps[0].on_failure, OnFailure::Abort);
        let nightly = config.get("nightly").unwrap();
        assert_eq!(nightly.steps[0].wait_for, WaitFor::None);

        // Scalar inputs become strings
        assert_eq!(release.steps[1].inputs["shards"], "4");
    }

    #[test]
    fn test_chain_names_sorted() {
        let config = ChainConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.chain_names(), vec!["nightly", "release"]);
    }

    #[test]
    fn test_variable_type_defaults_to_string() {
        let yaml = r#"
version: 2
chains:
  c:
    variables:
      - name: tag
    steps:
      - workflow: x.yml
"#;
        let config = ChainConfig::parse(yaml).unwrap();
        let var = &config.get("c").unwrap().variables[0];
        assert_eq!(var.variable_type, VariableType::String);
        assert!(!var.required);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let err = ChainConfig::parse("version: 3\nchains: {}\n").unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedConfigVersion(3)));
    }

    #[test]
    fn test_version_1_rejects_variables() {
        let yaml = r#"
version: 1
chains:
  c:
    variables:
      - name: env
    steps:
      - workflow: x.yml
"#;
        let err = ChainConfig::parse(yaml).unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[test]
    fn test_version_1_without_variables_is_fine() {
        let yaml = r#"
version: 1
chains:
  c:
    steps:
      - workflow: x.yml
"#;
        assert!(ChainConfig::parse(yaml).is_ok());
    }

    #[test]
    fn test_missing_file_is_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_chain_config(dir.path()).unwrap();
        assert!(config.is_empty());
    }
}
