//! External tools and where to find them

use crate::compiler::EnvMap;
use serde::Serialize;

/// The external tools this crate drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    AnsiblePlaybook,
    Flake8,
    Testinfra,
}

impl Tool {
    /// Binary name looked up on `PATH` when no override is set
    pub fn default_binary(&self) -> &'static str {
        match self {
            Self::AnsiblePlaybook => "ansible-playbook",
            Self::Flake8 => "flake8",
            Self::Testinfra => "testinfra",
        }
    }

    /// Environment variable that overrides the binary path
    pub fn override_var(&self) -> &'static str {
        match self {
            Self::AnsiblePlaybook => "PLAYCHECK_ANSIBLE_PLAYBOOK",
            Self::Flake8 => "PLAYCHECK_FLAKE8",
            Self::Testinfra => "PLAYCHECK_TESTINFRA",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.default_binary())
    }
}

/// Resolved binary for each tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ansible_playbook: String,
    pub flake8: String,
    pub testinfra: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ansible_playbook: Tool::AnsiblePlaybook.default_binary().to_string(),
            flake8: Tool::Flake8.default_binary().to_string(),
            testinfra: Tool::Testinfra.default_binary().to_string(),
        }
    }
}

impl ToolPaths {
    /// Apply `PLAYCHECK_*` overrides found in `env`
    pub fn from_env(env: &EnvMap) -> Self {
        let pick = |tool: Tool| {
            env.get(tool.override_var())
                .filter(|path| !path.is_empty())
                .cloned()
                .unwrap_or_else(|| tool.default_binary().to_string())
        };
        Self {
            ansible_playbook: pick(Tool::AnsiblePlaybook),
            flake8: pick(Tool::Flake8),
            testinfra: pick(Tool::Testinfra),
        }
    }

    pub fn binary(&self, tool: Tool) -> &str {
        match tool {
            Tool::AnsiblePlaybook => &self.ansible_playbook,
            Tool::Flake8 => &self.flake8,
            Tool::Testinfra => &self.testinfra,
        }
    }
}
