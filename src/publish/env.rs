//! Environment composition for publisher commands.
//!
//! Publisher commands never inherit the host environment wholesale. They get
//! the variables in [`PASSTHROUGH_ENV_VARS`] that are set on the host, then
//! the project environment, then the publisher's own entries. A later entry
//! for an existing key replaces the earlier value.

use std::collections::BTreeMap;
use std::env;

/// Host variables forwarded to publisher commands when set.
pub const PASSTHROUGH_ENV_VARS: &[&str] = &[
    "HOME",
    "USER",
    "USERPROFILE",
    "TMPDIR",
    "TMP",
    "TEMP",
    "PATH",
    "SYSTEMROOT",
    "SSH_AUTH_SOCK",
    "GNUPGHOME",
];

/// Read-only access to an environment.
pub trait EnvLookup: Send + Sync {
    /// Returns the value of `key`, if set.
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the environment of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostEnv;

impl EnvLookup for HostEnv {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

/// A fixed set of variables.
///
/// # Examples
///
/// ```
/// use shipwright::publish::env::{EnvLookup, FixedEnv};
///
/// let env = FixedEnv::from_pairs([("PATH", "/usr/bin")]);
/// assert_eq!(env.var("PATH").as_deref(), Some("/usr/bin"));
/// assert_eq!(env.var("HOME"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedEnv {
    vars: BTreeMap<String, String>,
}

impl FixedEnv {
    /// Builds a lookup from key/value pairs.
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl EnvLookup for FixedEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// An ordered list of variables with replace-in-place semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct EnvList {
    entries: Vec<(String, String)>,
}

impl EnvList {
    /// Starts from the passthrough variables that are set and non-empty.
    pub(crate) fn passthrough(lookup: &dyn EnvLookup) -> Self {
        let mut list = Self::default();
        for key in PASSTHROUGH_ENV_VARS {
            if let Some(value) = lookup.var(key).filter(|value| !value.is_empty()) {
                list.set(key, &value);
            }
        }
        list
    }

    pub(crate) fn set(&mut self, key: &str, value: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| existing == key) {
            value.clone_into(&mut entry.1);
            return;
        }
        self.entries.push((key.to_owned(), value.to_owned()));
    }

    pub(crate) fn into_entries(self) -> Vec<(String, String)> {
        self.entries
    }
}
