//! Locally declared features.
use std::collections::HashMap;

use crate::{
    flag::{OFF_VARIANT, ON_VARIANT},
    FlagDefinition, FlagValue,
};

/// Builder for a flag declared in code.
///
/// Local features seed the registry before (or instead of) any remote fetch. Without an API key
/// they allow the client to run fully offline.
///
/// ```
/// # use featureflow::Feature;
/// let always_on = Feature::new("feature-one").variant("on").build();
/// let default_off = Feature::new("feature-two").build();
/// assert_eq!(default_off.default_variant, "off");
/// ```
#[derive(Debug, Clone)]
pub struct Feature {
    key: String,
    variant: String,
    value: Option<FlagValue>,
}

impl Feature {
    /// Declare a feature that serves `"off"` unless told otherwise.
    pub fn new(key: impl Into<String>) -> Feature {
        Feature {
            key: key.into(),
            variant: OFF_VARIANT.to_owned(),
            value: None,
        }
    }

    /// Serve the given variant.
    pub fn variant(mut self, variant: impl Into<String>) -> Feature {
        self.variant = variant.into();
        self
    }

    /// Attach a payload to the served variant. By default the payload is the variant name.
    pub fn value(mut self, value: impl Into<FlagValue>) -> Feature {
        self.value = Some(value.into());
        self
    }

    /// Build the flag definition.
    pub fn build(self) -> FlagDefinition {
        let value = self
            .value
            .unwrap_or_else(|| FlagValue::String(self.variant.clone()));

        let mut variants = HashMap::from([(OFF_VARIANT.to_owned(), FlagValue::from(OFF_VARIANT))]);
        variants.insert(self.variant.clone(), value);

        FlagDefinition {
            key: self.key,
            enabled: true,
            variants,
            default_variant: self.variant,
            off_variant: OFF_VARIANT.to_owned(),
            rules: Vec::new(),
        }
    }

    /// Shorthand for a feature that is always on.
    pub fn on(key: impl Into<String>) -> FlagDefinition {
        Feature::new(key).variant(ON_VARIANT).build()
    }
}

#[cfg(test)]
mod tests {
    use super::Feature;
    use crate::FlagValue;

    #[test]
    fn defaults_to_off() {
        let flag = Feature::new("feature-two").build();
        assert!(flag.enabled);
        assert_eq!(flag.default_variant, "off");
        assert_eq!(flag.value_of("off"), FlagValue::from("off"));
        assert!(flag.validate().is_ok());
    }

    #[test]
    fn custom_variant_with_payload() {
        let flag = Feature::new("feature-three")
            .variant("custom")
            .value(serde_json::json!({ "color": "teal" }))
            .build();
        assert_eq!(flag.default_variant, "custom");
        assert_eq!(
            flag.value_of("custom").as_json(),
            Some(&serde_json::json!({ "color": "teal" }))
        );
        assert_eq!(flag.variants.len(), 2);
    }

    #[test]
    fn always_on() {
        let flag = Feature::on("feature-one");
        assert_eq!(flag.default_variant, "on");
        assert_eq!(flag.value_of("on"), FlagValue::from("on"));
    }
}
