//! Rewrite Rule Table
//!
//! ansible-playbook takes some settings as CLI flags and others only through
//! environment variables. This table lists the keys that do not map to a
//! plain flag; every other key becomes `--<key>=<value>`.
//!
//! | Key | Effect |
//! |---|---|
//! | `requirements_file` | ignored (ansible-galaxy only) |
//! | `raw_env_vars` | one environment variable per entry |
//! | `host_key_checking` | `ANSIBLE_HOST_KEY_CHECKING`, lower-cased |
//! | `raw_ssh_args` | `ANSIBLE_SSH_ARGS`, space-joined |
//! | `config_file` | `ANSIBLE_CONFIG` |
//! | `playbook` | the playbook path |
//! | `host_vars`, `group_vars` | ignored (written to the inventory) |
//! | `verbose` | positional `-<value>`, `true` meaning `-vvvv` |

use crate::error::{ConfigResult, ConfigurationError};
use crate::value::ConfigValue;

pub const ENV_HOST_KEY_CHECKING: &str = "ANSIBLE_HOST_KEY_CHECKING";
pub const ENV_SSH_ARGS: &str = "ANSIBLE_SSH_ARGS";
pub const ENV_CONFIG: &str = "ANSIBLE_CONFIG";
pub const ENV_UNBUFFERED: &str = "PYTHONUNBUFFERED";
pub const ENV_FORCE_COLOR: &str = "ANSIBLE_FORCE_COLOR";

/// Verbosity used for `verbose: true`
pub const DEFAULT_VERBOSITY: &str = "vvvv";

/// How a configuration key is translated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Ignore,
    RawEnvVars,
    HostKeyChecking,
    RawSshArgs,
    ConfigFile,
    Playbook,
    Verbose,
    /// Fallback: the key is passed through as a named flag
    Flag,
}

/// Special-cased keys in priority order. First match wins.
const TABLE: &[(&str, Rule)] = &[
    ("requirements_file", Rule::Ignore),
    ("raw_env_vars", Rule::RawEnvVars),
    ("host_key_checking", Rule::HostKeyChecking),
    ("raw_ssh_args", Rule::RawSshArgs),
    ("config_file", Rule::ConfigFile),
    ("playbook", Rule::Playbook),
    ("host_vars", Rule::Ignore),
    ("group_vars", Rule::Ignore),
    ("verbose", Rule::Verbose),
];

impl Rule {
    pub fn for_key(key: &str) -> Self {
        TABLE
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, rule)| *rule)
            .unwrap_or(Rule::Flag)
    }
}

/// The effect of applying one configuration entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    Nothing,
    Environment(Vec<(String, String)>),
    Subject(String),
    Positional(String),
    Flag(String, ConfigValue),
}

/// Translate one configuration entry into its effect.
///
/// Values of a kind the matching rule does not accept are rejected rather
/// than coerced.
pub fn rewrite(key: &str, value: &ConfigValue) -> ConfigResult<Rewrite> {
    match Rule::for_key(key) {
        Rule::Ignore => Ok(Rewrite::Nothing),

        Rule::RawEnvVars => {
            let map = value
                .as_map()
                .ok_or_else(|| ConfigurationError::unexpected(key, "a mapping", value.kind()))?;
            let mut vars = Vec::with_capacity(map.len());
            for (name, v) in map {
                let rendered = v.scalar_string().ok_or_else(|| {
                    ConfigurationError::unexpected(
                        format!("{key}.{name}"),
                        "a scalar",
                        v.kind(),
                    )
                })?;
                vars.push((name.to_string(), rendered));
            }
            Ok(Rewrite::Environment(vars))
        }

        Rule::HostKeyChecking => {
            let rendered = match value {
                ConfigValue::Bool(b) => b.to_string(),
                ConfigValue::Str(s) => s.to_lowercase(),
                other => {
                    return Err(ConfigurationError::unexpected(
                        key,
                        "a boolean or string",
                        other.kind(),
                    ))
                }
            };
            Ok(env(ENV_HOST_KEY_CHECKING, rendered))
        }

        Rule::RawSshArgs => {
            let joined = match value {
                ConfigValue::List(items) => items.join(" "),
                ConfigValue::Str(s) => s.clone(),
                other => {
                    return Err(ConfigurationError::unexpected(key, "a list", other.kind()))
                }
            };
            Ok(env(ENV_SSH_ARGS, joined))
        }

        Rule::ConfigFile => {
            let path = value
                .as_str()
                .ok_or_else(|| ConfigurationError::unexpected(key, "a string", value.kind()))?;
            Ok(env(ENV_CONFIG, path))
        }

        Rule::Playbook => {
            let path = value
                .as_str()
                .ok_or_else(|| ConfigurationError::unexpected(key, "a string", value.kind()))?;
            Ok(Rewrite::Subject(path.to_string()))
        }

        Rule::Verbose => {
            if !value.is_retained() {
                return Ok(Rewrite::Nothing);
            }
            let level = match value {
                ConfigValue::Bool(true) => DEFAULT_VERBOSITY,
                ConfigValue::Str(s) => s.as_str(),
                other => {
                    return Err(ConfigurationError::unexpected(
                        key,
                        "a boolean or string",
                        other.kind(),
                    ))
                }
            };
            Ok(Rewrite::Positional(format!("-{level}")))
        }

        Rule::Flag => Ok(Rewrite::Flag(key.to_string(), value.clone())),
    }
}

fn env(name: &str, value: impl Into<String>) -> Rewrite {
    Rewrite::Environment(vec![(name.to_string(), value.into())])
}
