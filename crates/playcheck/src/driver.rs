//! Drivers supply the testinfra connection backend for their instances.

use invocation::ConfigMap;

/// Inventory written by the create step when `ansible.inventory_file` is unset
pub const DEFAULT_INVENTORY: &str = ".molecule/ansible_inventory";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Driver {
    /// Containers, reached through testinfra's docker backend
    Docker,
    /// Any inventory-backed driver (vagrant, openstack, ...)
    Inventory { name: String },
}

impl Default for Driver {
    fn default() -> Self {
        Self::Inventory {
            name: "vagrant".to_string(),
        }
    }
}

impl Driver {
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("docker") => Self::Docker,
            Some(other) => Self::Inventory {
                name: other.to_string(),
            },
            None => Self::default(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Docker => "docker",
            Self::Inventory { name } => name,
        }
    }

    /// Driver-specific testinfra options
    pub fn testinfra_args(&self, ansible: &ConfigMap) -> ConfigMap {
        let mut args = ConfigMap::new();
        match self {
            Self::Docker => {
                args.insert("connection", "docker");
            }
            Self::Inventory { .. } => {
                let inventory = ansible
                    .get("inventory_file")
                    .and_then(|v| v.as_str())
                    .unwrap_or(DEFAULT_INVENTORY);
                args.insert("ansible-inventory", inventory);
                args.insert("connection", "ansible");
            }
        }
        args
    }
}
