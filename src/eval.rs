//! Flag evaluation.
//!
//! Evaluation is a pure function of a [`Snapshot`], a flag key and an optional [`Context`]. It
//! never fails: unknown flags and malformed rules resolve to a fallback variant.
use std::collections::HashMap;

use serde::Serialize;

use crate::{
    flag::OFF_VARIANT,
    registry::Snapshot,
    rules::{match_rules, CustomOperators},
    Context, FlagDefinition, FlagValue,
};

/// Why an evaluation resolved to its variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EvaluationReason {
    /// The flag is not in the registry; the caller's fallback variant was served.
    FlagNotFound,
    /// The flag is disabled; its off-variant was served.
    Disabled,
    /// A targeting rule matched.
    #[serde(rename_all = "camelCase")]
    RuleMatch {
        /// Position of the matching rule.
        rule_index: usize,
    },
    /// No rule matched (or no context was supplied); the default variant was served.
    Default,
}

/// The outcome of evaluating a flag.
///
/// # On and off
///
/// An evaluation is *off* if its variant is named `"off"` or its value is the boolean `false`.
/// Every other evaluation is *on*.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    feature_key: String,
    variant: String,
    value: FlagValue,
    reason: EvaluationReason,
}

impl Evaluation {
    /// Evaluated flag key.
    pub fn feature_key(&self) -> &str {
        &self.feature_key
    }

    /// Name of the served variant.
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Payload of the served variant.
    pub fn value(&self) -> &FlagValue {
        &self.value
    }

    /// Why the variant was served.
    pub fn reason(&self) -> EvaluationReason {
        self.reason
    }

    /// Returns `true` unless the variant is `"off"` or its value is `false`.
    pub fn is_on(&self) -> bool {
        self.variant != OFF_VARIANT && self.value != FlagValue::Boolean(false)
    }

    /// Returns `true` if the served variant has the given name.
    pub fn is(&self, variant: &str) -> bool {
        self.variant == variant
    }

    fn fallback(flag_key: &str, variant: &str) -> Evaluation {
        Evaluation {
            feature_key: flag_key.to_owned(),
            variant: variant.to_owned(),
            value: FlagValue::String(variant.to_owned()),
            reason: EvaluationReason::FlagNotFound,
        }
    }
}

impl FlagDefinition {
    /// Evaluate this flag for `context`.
    ///
    /// Precedence: a disabled flag serves its off-variant; otherwise the first matching rule
    /// wins; otherwise the default variant is served. Rules are skipped without a context.
    pub fn evaluate(&self, context: Option<&Context>, custom: &CustomOperators) -> Evaluation {
        let (variant, reason) = if !self.enabled {
            (self.off_variant.as_str(), EvaluationReason::Disabled)
        } else if let Some(matched) =
            context.and_then(|context| match_rules(&self.rules, context, &self.key, custom))
        {
            (
                matched.variant,
                EvaluationReason::RuleMatch {
                    rule_index: matched.rule_index,
                },
            )
        } else {
            (self.default_variant.as_str(), EvaluationReason::Default)
        };

        Evaluation {
            feature_key: self.key.clone(),
            variant: variant.to_owned(),
            value: self.value_of(variant),
            reason,
        }
    }
}

impl Snapshot {
    /// Evaluate `flag_key` against this snapshot.
    ///
    /// Unknown flags resolve to `fallback`, or `"off"` if no fallback is given.
    pub fn evaluate(
        &self,
        flag_key: &str,
        context: Option<&Context>,
        fallback: Option<&str>,
        custom: &CustomOperators,
    ) -> Evaluation {
        match self.get(flag_key) {
            Some(flag) => flag.evaluate(context, custom),
            None => Evaluation::fallback(flag_key, fallback.unwrap_or(OFF_VARIANT)),
        }
    }

    /// Evaluate every flag of this snapshot.
    ///
    /// All results come from the same snapshot, so they are consistent with each other.
    pub fn evaluate_all(
        &self,
        context: Option<&Context>,
        custom: &CustomOperators,
    ) -> HashMap<String, Evaluation> {
        self.flags()
            .iter()
            .map(|(flag_key, flag)| (flag_key.clone(), flag.evaluate(context, custom)))
            .collect()
    }
}
