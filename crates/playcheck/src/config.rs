use anyhow::{bail, Context, Result};
use invocation::{ConfigMap, ConfigValue};
use serde::Deserialize;
use serde_yaml::Value;
use std::path::Path;

/// Project file looked up when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "molecule.yml";

/// Playbook used when the `ansible` section names none
pub const DEFAULT_PLAYBOOK: &str = "playbook.yml";

/// The only verifier strategy implemented so far
pub const DEFAULT_VERIFIER: &str = "testinfra";

/// Top-level project configuration (`molecule.yml`).
///
/// `ansible` and `verifier.options` stay raw YAML here; they are converted
/// into typed [`ConfigMap`]s on access so conversion errors name the key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub ansible: Value,
    #[serde(default)]
    pub verifier: VerifierSection,
    #[serde(default)]
    pub driver: DriverSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifierSection {
    #[serde(default = "default_verifier_name")]
    pub name: String,
    #[serde(default)]
    pub testdir: Option<String>,
    #[serde(default)]
    pub options: Value,
}

impl Default for VerifierSection {
    fn default() -> Self {
        Self {
            name: default_verifier_name(),
            testdir: None,
            options: Value::Null,
        }
    }
}

fn default_verifier_name() -> String {
    DEFAULT_VERIFIER.to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverSection {
    #[serde(default)]
    pub name: Option<String>,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to find {}. Exiting.", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).context("Invalid project configuration")
    }

    /// The `ansible` section as typed configuration
    pub fn ansible(&self) -> Result<ConfigMap> {
        Ok(ConfigMap::from_yaml("ansible", &self.ansible)?)
    }

    /// The `ansible` section with the default playbook filled in
    pub fn playbook_config(&self) -> Result<ConfigMap> {
        let mut config = self.ansible()?;
        if !config.contains_key("playbook") {
            config.insert("playbook", DEFAULT_PLAYBOOK);
        }
        Ok(config)
    }

    /// The user override layer for verifier options (`testdir`, `options`)
    pub fn verifier_layer(&self) -> Result<ConfigMap> {
        if self.verifier.name != DEFAULT_VERIFIER {
            bail!(
                "Unsupported verifier '{}'; only '{}' is available",
                self.verifier.name,
                DEFAULT_VERIFIER
            );
        }

        let mut layer = ConfigMap::new();
        if let Some(testdir) = &self.verifier.testdir {
            layer.insert("testdir", testdir.as_str());
        }
        let options = ConfigMap::from_yaml("verifier.options", &self.verifier.options)?;
        if !options.is_empty() {
            layer.insert("options", ConfigValue::Map(options));
        }
        Ok(layer)
    }
}
