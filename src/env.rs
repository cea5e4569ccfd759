use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::{CString, NulError};
use std::path::PathBuf;

/// Name of the variable holding the user's home directory.
pub const HOME_VAR: &str = "HOME";

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: the variables passed to every launched command.
/// - `current_dir`: the working directory, kept in sync with the process by `cd`.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// An environment with no variables, rooted at `current_dir`.
    pub fn empty(current_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars: HashMap::new(),
            current_dir: current_dir.into(),
        }
    }

    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Set or override a variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    pub fn home(&self) -> Option<String> {
        self.get_var(HOME_VAR)
    }

    /// All variables, sorted by name.
    pub fn sorted_vars(&self) -> Vec<(&str, &str)> {
        let mut vars: Vec<_> = self
            .vars
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        vars.sort_unstable();
        vars
    }

    /// The variables as `NAME=value` C strings, ready for `execve`.
    pub fn to_envp(&self) -> Result<Vec<CString>, NulError> {
        self.sorted_vars()
            .into_iter()
            .map(|(k, v)| CString::new(format!("{k}={v}")))
            .collect()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
