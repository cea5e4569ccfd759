use crate::env::Environment;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Name of the variable holding the colon-delimited executable search list.
pub const PATH_VAR: &str = "PATH";

/// Ordered list of directories used to locate executables by name.
///
/// Order determines precedence: the first directory containing a matching
/// file wins. The list is built once and never re-read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a search path from a colon-delimited list such as `$PATH`.
    ///
    /// Empty entries are skipped; the order of the rest is preserved.
    pub fn from_var(value: &str) -> Self {
        Self {
            dirs: std::env::split_paths(OsStr::new(value))
                .filter(|dir| !dir.as_os_str().is_empty())
                .collect(),
        }
    }

    /// Build the search path from the shell environment's `PATH`, or an empty
    /// one if it is unset.
    pub fn from_env(env: &Environment) -> Self {
        env.get_var(PATH_VAR)
            .map(|value| Self::from_var(&value))
            .unwrap_or_default()
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Resolve a command name the way the shell launches it.
    ///
    /// - Empty name: never resolves.
    /// - Name containing `/`: used as-is, returned if it exists.
    /// - Plain name: each directory is tried in order and the first existing
    ///   file is returned.
    ///
    /// Only existence is checked. A file that is found but not executable is
    /// reported later, when the launch fails.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }
        if name.contains('/') {
            let path = Path::new(name);
            return is_candidate(path).then(|| path.to_path_buf());
        }
        self.dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|path| is_candidate(path))
    }
}

fn is_candidate(path: &Path) -> bool {
    path.is_file()
}
