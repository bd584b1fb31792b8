//! Channel name parsing
//!
//! Asterisk names channels `<Tech>/<resource>-<uniquifier>`, e.g.
//! `SIP/214-0000012`. For phone technologies the resource is the extension
//! that owns the channel. Local channels are `Local/<exten>@<context>-<n>;<leg>`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Extension identifier extracted from a channel or device name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtensionId(String);

impl ExtensionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExtensionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Extract the owning extension from a channel (`SIP/214-0000012`) or
/// device (`SIP/214`) name
///
/// Returns `None` when the name has no technology prefix, an empty
/// resource, or a resource that is itself a path (`DAHDI/i1/5551234-1`).
pub fn extract_extension(channel: &str) -> Option<ExtensionId> {
    let (tech, rest) = channel.trim().split_once('/')?;
    if tech.is_empty() || rest.is_empty() {
        return None;
    }

    let resource = if tech.eq_ignore_ascii_case("local") {
        rest.split_once('@').map(|(exten, _)| exten)?
    } else {
        match rest.rsplit_once('-') {
            Some((resource, suffix)) if is_uniquifier(suffix) => resource,
            _ => rest,
        }
    };

    if resource.is_empty() || !resource.chars().all(is_extension_char) {
        return None;
    }
    Some(ExtensionId(resource.to_string()))
}

fn is_uniquifier(suffix: &str) -> bool {
    // Local legs carry ";1"/";2" after the counter
    let counter = suffix.split(';').next().unwrap_or_default();
    !counter.is_empty() && counter.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_extension_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '*' | '#' | '-')
}
