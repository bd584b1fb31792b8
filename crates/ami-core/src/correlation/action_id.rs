//! Action ID generation

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Correlation tag sent in the `ActionID` header
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(String);

impl ActionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ActionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Issues action IDs of the form `<prefix>-<command>-<n>`
///
/// The counter never repeats for the lifetime of the generator, so an ID
/// is unique among everything this generator has issued. The random default
/// prefix keeps IDs from two generators talking to the same Asterisk apart.
#[derive(Debug)]
pub struct ActionIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl Default for ActionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionIdGenerator {
    /// Generator with a random 8 character prefix
    pub fn new() -> Self {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Self::with_prefix(&nonce[..8])
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Next ID for a command named `command`
    pub fn next(&self, command: &str) -> ActionId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        ActionId(format!("{}-{}-{}", self.prefix, command, n))
    }
}
