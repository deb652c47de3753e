//! Flag definitions and their wire format.
use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::{rules::Rule, Error, Result};

/// Name of the canonical "off" variant.
pub const OFF_VARIANT: &str = "off";

/// Name of the canonical "on" variant.
pub const ON_VARIANT: &str = "on";

fn default_off_variant() -> String {
    OFF_VARIANT.to_owned()
}

/// Response format of the features endpoint: flag key to definition.
///
/// Values are wrapped in `TryParse` so that if we fail to parse one flag (e.g., new server
/// format), we can still serve other flags.
pub type FlagSet = HashMap<String, TryParse<FlagDefinition>>;

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// The payload a variant resolves to.
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum FlagValue {
    /// A boolean payload. `false` is the canonical "off" value.
    Boolean(bool),
    /// A numeric payload.
    Number(f64),
    /// A string payload.
    String(String),
    /// Any other JSON payload (objects, arrays, null).
    Json(serde_json::Value),
}

impl FlagValue {
    /// Returns the boolean payload, if any.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FlagValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the numeric payload, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FlagValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the structured payload, if any.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            FlagValue::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// A complete flag definition. Definitions are immutable and replaced wholesale on update.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FlagDefinition {
    /// Unique flag key. Always taken from the key of the enclosing map on the wire.
    #[serde(default)]
    pub key: String,
    /// Master switch. A disabled flag always serves its off-variant.
    pub enabled: bool,
    /// Declared variants with their payloads.
    #[serde(default)]
    pub variants: HashMap<String, FlagValue>,
    /// Variant served when no rule matches.
    pub default_variant: String,
    /// Variant served while the flag is disabled.
    #[serde(default = "default_off_variant")]
    pub off_variant: String,
    /// Targeting rules, evaluated in order.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl FlagDefinition {
    /// Payload of the named variant. Undeclared variants resolve to their own name.
    pub fn value_of(&self, variant: &str) -> FlagValue {
        self.variants
            .get(variant)
            .cloned()
            .unwrap_or_else(|| FlagValue::String(variant.to_owned()))
    }

    /// Check that every variant referenced by the default variant and the rules is declared.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidFlag {
            flag_key: self.key.clone(),
            reason,
        };

        if !self.variants.contains_key(&self.default_variant) {
            return Err(invalid(format!(
                "default variant {:?} is not declared",
                self.default_variant
            )));
        }

        for (index, rule) in self.rules.iter().enumerate() {
            if let Some(variant) = rule
                .variants()
                .find(|variant| !self.variants.contains_key(*variant))
            {
                return Err(invalid(format!(
                    "rule {index} serves undeclared variant {variant:?}"
                )));
            }
        }

        Ok(())
    }
}

/// Turn a wire [`FlagSet`] into valid definitions, dropping (and logging) flags that failed to
/// parse or validate.
pub(crate) fn into_definitions(flags: FlagSet) -> HashMap<String, FlagDefinition> {
    flags
        .into_iter()
        .filter_map(|(flag_key, flag)| {
            let Some(mut flag) = Option::<FlagDefinition>::from(flag) else {
                log::warn!(
                    target: "featureflow",
                    flag_key:display;
                    "failed to parse flag definition, skipping"
                );
                return None;
            };
            // The map key is authoritative.
            flag.key.clone_from(&flag_key);
            if let Err(err) = flag.validate() {
                log::warn!(target: "featureflow", flag_key:display; "skipping flag: {}", err);
                return None;
            }
            Some((flag_key, flag))
        })
        .collect()
}
