//! Verifier Option Resolver
//!
//! Verifier options are built from three layers, later layers winning:
//!
//! ```text
//! built-in defaults  ←  driver defaults  ←  user overrides (verifier section)
//! ```
//!
//! The merge is one level deep: a nested mapping such as `options` is merged
//! key by key, but anything nested below it (`options.env`) is replaced
//! whole.

use crate::compiler::{EnvMap, InvocationCompiler};
use crate::error::{ConfigResult, ConfigurationError};
use crate::value::{ConfigMap, ConfigValue};
use serde::Serialize;

pub const DEFAULT_TESTDIR: &str = "tests";

pub const KEY_TESTDIR: &str = "testdir";
pub const KEY_OPTIONS: &str = "options";
pub const KEY_ENV: &str = "env";
pub const KEY_DEBUG: &str = "debug";
pub const KEY_SUDO: &str = "sudo";

/// Effective verifier configuration after merging all layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedOptions {
    pub testdir: String,
    pub options: ConfigMap,
}

impl ResolvedOptions {
    /// Validate a merged mapping: `testdir` must be a string and `options`
    /// a mapping.
    pub fn from_map(map: &ConfigMap) -> ConfigResult<Self> {
        let testdir = match map.get(KEY_TESTDIR) {
            None => DEFAULT_TESTDIR.to_string(),
            Some(ConfigValue::Str(dir)) if !dir.is_empty() => dir.clone(),
            Some(other) => {
                return Err(ConfigurationError::unexpected(
                    KEY_TESTDIR,
                    "a non-empty string",
                    other.kind(),
                ))
            }
        };
        let options = match map.get(KEY_OPTIONS) {
            None => ConfigMap::new(),
            Some(ConfigValue::Map(options)) => options.clone(),
            Some(other) => {
                return Err(ConfigurationError::unexpected(
                    KEY_OPTIONS,
                    "a mapping",
                    other.kind(),
                ))
            }
        };
        Ok(Self { testdir, options })
    }

    pub fn to_map(&self) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert(KEY_TESTDIR, self.testdir.as_str());
        map.insert(KEY_OPTIONS, self.options.clone());
        map
    }

    /// `options.env` as a process environment (empty when unset)
    pub fn env(&self) -> ConfigResult<EnvMap> {
        let Some(value) = self.options.get(KEY_ENV) else {
            return Ok(EnvMap::new());
        };
        let map = value.as_map().ok_or_else(|| {
            ConfigurationError::unexpected("options.env", "a mapping", value.kind())
        })?;

        let mut env = EnvMap::new();
        for (name, v) in map {
            let rendered = v.scalar_string().ok_or_else(|| {
                ConfigurationError::unexpected(format!("options.env.{name}"), "a scalar", v.kind())
            })?;
            env.insert(name.to_string(), rendered);
        }
        Ok(env)
    }

    /// Every option except `env`, in option order
    pub fn flags(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.options.iter().filter(|(key, _)| *key != KEY_ENV)
    }

    pub fn debug(&self) -> bool {
        self.options
            .get(KEY_DEBUG)
            .is_some_and(ConfigValue::is_retained)
    }
}

/// Overlay `layer` onto `base`, one level deep
pub fn merge_layer(base: &mut ConfigMap, layer: &ConfigMap) {
    for (key, value) in layer {
        let merged = match (base.get(key), value) {
            (Some(ConfigValue::Map(existing)), ConfigValue::Map(incoming)) => {
                let mut combined = existing.clone();
                for (k, v) in incoming {
                    combined.insert(k, v.clone());
                }
                ConfigValue::Map(combined)
            }
            _ => value.clone(),
        };
        base.insert(key, merged);
    }
}

/// Merge built-in defaults, driver defaults and user overrides
pub fn resolve(
    defaults: &ConfigMap,
    driver_overrides: &ConfigMap,
    user_overrides: &ConfigMap,
) -> ConfigResult<ResolvedOptions> {
    let mut merged = defaults.clone();
    merge_layer(&mut merged, driver_overrides);
    merge_layer(&mut merged, user_overrides);
    ResolvedOptions::from_map(&merged)
}

/// Build the built-in defaults layer.
///
/// `options.env` is the environment ansible-playbook would get for the
/// `ansible` section, so testinfra's ansible backend sees the same
/// `ANSIBLE_*` settings. No playbook is required.
pub fn default_options(
    ambient_environment: &EnvMap,
    ansible: &ConfigMap,
    debug: bool,
    sudo: bool,
    driver_extra: &ConfigMap,
) -> ConfigResult<ConfigMap> {
    let mut compiler = InvocationCompiler::new(ambient_environment.clone());
    compiler.apply_all(ansible)?;

    let env: ConfigMap = compiler
        .into_environment()
        .into_iter()
        .map(|(name, value)| (name, ConfigValue::Str(value)))
        .collect();

    let mut options = ConfigMap::new();
    options.insert(KEY_ENV, env);
    options.insert(KEY_DEBUG, debug);
    options.insert(KEY_SUDO, sudo);
    for (key, value) in driver_extra {
        options.insert(key, value.clone());
    }

    let mut defaults = ConfigMap::new();
    defaults.insert(KEY_TESTDIR, DEFAULT_TESTDIR);
    defaults.insert(KEY_OPTIONS, options);
    Ok(defaults)
}

/// Wrap option entries as a `{options: ...}` layer
pub fn options_layer(options: ConfigMap) -> ConfigMap {
    let mut layer = ConfigMap::new();
    layer.insert(KEY_OPTIONS, options);
    layer
}
