//! Compatibility mode selection
//!
//! The mode is chosen once at runtime construction and is immutable
//! afterwards. `Base` is the engine as-is; `Extended` additionally runs a
//! small prelude installing the CommonJS-style globals older scripts
//! expect (`global`, `module`, `exports`).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Source-compatibility transform applied before execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityMode {
    /// Plain engine semantics
    #[default]
    Base,
    /// Engine semantics plus the CommonJS-style prelude
    Extended,
}

impl CompatibilityMode {
    /// All valid modes, in declaration order
    pub const VALUES: [CompatibilityMode; 2] =
        [CompatibilityMode::Base, CompatibilityMode::Extended];
}

impl fmt::Display for CompatibilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompatibilityMode::Base => write!(f, "base"),
            CompatibilityMode::Extended => write!(f, "extended"),
        }
    }
}

impl FromStr for CompatibilityMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(CompatibilityMode::Base),
            "extended" => Ok(CompatibilityMode::Extended),
            _ => Err(invalid_mode(s)),
        }
    }
}

fn invalid_mode(value: &str) -> BridgeError {
    let valid = CompatibilityMode::VALUES
        .iter()
        .map(|v| format!("\"{v}\""))
        .collect::<Vec<_>>()
        .join(", ");
    BridgeError::InvalidCompatibilityMode {
        value: value.to_string(),
        valid,
    }
}

/// Checks if `value` names a valid compatibility mode.
///
/// The empty string selects the default mode, so an unset configuration
/// key is not an error.
pub fn validate_compatibility_mode(value: &str) -> Result<CompatibilityMode, BridgeError> {
    if value.is_empty() {
        return Ok(CompatibilityMode::default());
    }
    value.parse()
}

/// Prelude evaluated at construction in extended mode
pub(crate) const EXTENDED_PRELUDE: &str = r#"
var global = globalThis;
var exports = {};
var module = { exports: exports };
"#;

/// Settings passed onto the embedded runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeOptions {
    /// Compatibility mode name: "extended" or "base". Empty selects "base".
    #[serde(rename = "compatibilityMode", default)]
    pub compatibility_mode: String,

    /// Environment variables exposed to scripts as `__ENV`
    #[serde(default)]
    pub env: HashMap<String, String>,
}
