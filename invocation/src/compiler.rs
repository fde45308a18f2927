//! Invocation Compiler
//!
//! Turns an `ansible` configuration section into a ready-to-run
//! ansible-playbook [`Invocation`]. Each entry is routed through the
//! [rewrite rules](crate::rules) into environment variables, named flags,
//! positional tokens or the playbook path.
//!
//! # Usage
//!
//! ```rust,ignore
//! use invocation::{ConfigMap, InvocationCompiler};
//!
//! let mut compiler = InvocationCompiler::new(std::env::vars().collect());
//! compiler.apply_all(&ansible_section)?;
//! compiler.add_environment("ANSIBLE_ROLES_PATH", "../roles");
//! let invocation = compiler.compile()?;
//! ```

use crate::error::{ConfigResult, ConfigurationError};
use crate::rules::{self, Rewrite, ENV_FORCE_COLOR, ENV_UNBUFFERED};
use crate::tool::Tool;
use crate::value::{ConfigMap, ConfigValue};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Environment handed to a child process
pub type EnvMap = BTreeMap<String, String>;

/// A fully-compiled external process invocation.
///
/// Immutable once built. The command line is
/// `<program> [subject] <positional...> <flags...>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    tool: Tool,
    program: String,
    environment: EnvMap,
    flags: BTreeMap<String, ConfigValue>,
    positional: Vec<String>,
    subject: Option<String>,
    working_dir: Option<PathBuf>,
}

impl Invocation {
    /// Start a bare invocation (no subject, no flags)
    pub fn new(tool: Tool, program: impl Into<String>, environment: EnvMap) -> Self {
        Self {
            tool,
            program: program.into(),
            environment,
            flags: BTreeMap::new(),
            positional: Vec::new(),
            subject: None,
            working_dir: None,
        }
    }

    pub fn with_positional<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.positional.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a flag; values that are not retained are dropped
    pub fn with_flag(mut self, name: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        let value = value.into();
        if value.is_retained() {
            self.flags.insert(name.into(), value);
        }
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn environment(&self) -> &EnvMap {
        &self.environment
    }

    pub fn flags(&self) -> &BTreeMap<String, ConfigValue> {
        &self.flags
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Argument vector: subject first, then positionals, then rendered flags
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        args.extend(self.subject.iter().cloned());
        args.extend(self.positional.iter().cloned());
        for (name, value) in &self.flags {
            args.extend(render_flag(name, value));
        }
        args
    }

    /// Shell-quoted command line, for logs and error messages
    pub fn command_line(&self) -> String {
        let args = self.args();
        let words = std::iter::once(self.program.as_str()).chain(args.iter().map(String::as_str));
        shlex::try_join(words.clone()).unwrap_or_else(|_| words.collect::<Vec<_>>().join(" "))
    }
}

/// Render one flag in the tools' native syntax.
///
/// Single-character names become `-k value`; longer names become
/// `--long-name=value` with underscores turned into dashes. `true` renders
/// the bare flag. Lists repeat the flag per item and mappings repeat it per
/// `key=value` entry.
pub fn render_flag(name: &str, value: &ConfigValue) -> Vec<String> {
    if !value.is_retained() {
        return Vec::new();
    }

    let single = name.chars().count() == 1;
    let bare = if single {
        format!("-{name}")
    } else {
        format!("--{}", name.replace('_', "-"))
    };
    let with_value = |v: &str| {
        if single {
            vec![bare.clone(), v.to_string()]
        } else {
            vec![format!("{bare}={v}")]
        }
    };

    match value {
        ConfigValue::Bool(_) => vec![bare.clone()],
        ConfigValue::Int(i) => with_value(&i.to_string()),
        ConfigValue::Str(s) => with_value(s),
        ConfigValue::List(items) => items.iter().flat_map(|item| with_value(item)).collect(),
        ConfigValue::Map(map) => map
            .iter()
            .map(|(k, v)| {
                let rendered = v
                    .scalar_string()
                    .unwrap_or_else(|| serde_json::to_string(v).unwrap_or_default());
                format!("{k}={rendered}")
            })
            .flat_map(|pair| with_value(&pair))
            .collect(),
    }
}

/// What one `apply` call changed, so re-applying the same key can undo it.
///
/// `written` is the value this key stored. A revert only touches an entry
/// that still holds it; a later write by another key or by
/// `add_environment`/`add_flag` wins.
#[derive(Debug, Clone)]
enum Undo {
    Environment {
        name: String,
        written: String,
        previous: Option<String>,
    },
    Flag {
        name: String,
        written: ConfigValue,
        previous: Option<ConfigValue>,
    },
    Positional,
    Subject {
        previous: Option<String>,
    },
}

/// Builds an ansible-playbook [`Invocation`] from configuration entries
#[derive(Debug, Clone)]
pub struct InvocationCompiler {
    program: String,
    environment: EnvMap,
    flags: BTreeMap<String, ConfigValue>,
    /// (source key, token) in call order
    positional: Vec<(String, String)>,
    subject: Option<String>,
    applied: HashMap<String, Vec<Undo>>,
}

impl InvocationCompiler {
    /// Seed from a copy of `base_environment`.
    ///
    /// `PYTHONUNBUFFERED=1` and `ANSIBLE_FORCE_COLOR=true` are always added;
    /// later `apply`/`add_environment` calls may override them.
    pub fn new(base_environment: EnvMap) -> Self {
        let mut compiler = Self {
            program: Tool::AnsiblePlaybook.default_binary().to_string(),
            environment: base_environment,
            flags: BTreeMap::new(),
            positional: Vec::new(),
            subject: None,
            applied: HashMap::new(),
        };
        compiler.add_environment(ENV_UNBUFFERED, "1");
        compiler.add_environment(ENV_FORCE_COLOR, "true");
        compiler
    }

    /// Run a different ansible-playbook binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Apply one configuration entry.
    ///
    /// Re-applying a key first undoes whatever the previous value of that
    /// key did. An invalid value leaves the compiler untouched.
    pub fn apply(&mut self, key: &str, value: &ConfigValue) -> ConfigResult<()> {
        let rewrite = rules::rewrite(key, value)?;
        self.revert(key);

        let mut undo = Vec::new();
        match rewrite {
            Rewrite::Nothing => {}
            Rewrite::Environment(vars) => {
                for (name, value) in vars {
                    let previous = self.environment.insert(name.clone(), value.clone());
                    undo.push(Undo::Environment {
                        name,
                        written: value,
                        previous,
                    });
                }
            }
            Rewrite::Subject(path) => {
                let previous = self.subject.replace(path);
                undo.push(Undo::Subject { previous });
            }
            Rewrite::Positional(token) => {
                self.positional.push((key.to_string(), token));
                undo.push(Undo::Positional);
            }
            Rewrite::Flag(name, value) => {
                if value.is_retained() {
                    let previous = self.flags.insert(name.clone(), value.clone());
                    undo.push(Undo::Flag {
                        name,
                        written: value,
                        previous,
                    });
                }
            }
        }

        if !undo.is_empty() {
            self.applied.insert(key.to_string(), undo);
        }
        Ok(())
    }

    /// Apply every entry of `config` in iteration order
    pub fn apply_all(&mut self, config: &ConfigMap) -> ConfigResult<()> {
        for (key, value) in config {
            self.apply(key, value)?;
        }
        Ok(())
    }

    fn revert(&mut self, key: &str) {
        let Some(undo) = self.applied.remove(key) else {
            return;
        };
        for step in undo.into_iter().rev() {
            match step {
                Undo::Environment {
                    name,
                    written,
                    previous,
                } => {
                    if self.environment.get(&name) != Some(&written) {
                        continue;
                    }
                    match previous {
                        Some(value) => {
                            self.environment.insert(name, value);
                        }
                        None => {
                            self.environment.remove(&name);
                        }
                    }
                }
                Undo::Flag {
                    name,
                    written,
                    previous,
                } => {
                    if self.flags.get(&name) != Some(&written) {
                        continue;
                    }
                    match previous {
                        Some(value) => {
                            self.flags.insert(name, value);
                        }
                        None => {
                            self.flags.remove(&name);
                        }
                    }
                }
                Undo::Positional => self.positional.retain(|(source, _)| source != key),
                Undo::Subject { previous } => self.subject = previous,
            }
        }
    }

    pub fn add_environment(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.environment.insert(name.into(), value.into());
    }

    /// Removing an absent variable is a no-op
    pub fn remove_environment(&mut self, name: &str) {
        self.environment.remove(name);
    }

    /// Add a named flag; a value that is not retained leaves flags unchanged
    pub fn add_flag(&mut self, name: impl Into<String>, value: impl Into<ConfigValue>) {
        let value = value.into();
        if value.is_retained() {
            self.flags.insert(name.into(), value);
        }
    }

    /// Removing an absent flag is a no-op
    pub fn remove_flag(&mut self, name: &str) {
        self.flags.remove(name);
    }

    pub fn environment(&self) -> &EnvMap {
        &self.environment
    }

    pub fn flags(&self) -> &BTreeMap<String, ConfigValue> {
        &self.flags
    }

    pub fn positional(&self) -> Vec<&str> {
        self.positional.iter().map(|(_, token)| token.as_str()).collect()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn into_environment(self) -> EnvMap {
        self.environment
    }

    /// Build the invocation; fails when no playbook was set
    pub fn compile(&self) -> ConfigResult<Invocation> {
        let subject = self
            .subject
            .clone()
            .ok_or(ConfigurationError::MissingSubject)?;

        Ok(Invocation {
            tool: Tool::AnsiblePlaybook,
            program: self.program.clone(),
            environment: self.environment.clone(),
            flags: self.flags.clone(),
            positional: self.positional.iter().map(|(_, t)| t.clone()).collect(),
            subject: Some(subject),
            working_dir: None,
        })
    }
}
