//! Targeting rules and the rule matcher.
use std::{cmp::Ordering, collections::HashMap, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::{
    sharder::{Md5Sharder, Sharder},
    AttributeValue, Context,
};

/// A targeting rule: conditions combined with AND, and what to serve when they all hold.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Conditions that must all be satisfied. An empty list matches every context.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Variant (or split) served on match.
    pub serve: Serve,
}

/// What a matching rule serves.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Serve {
    /// A single variant.
    Variant(String),
    /// A weighted split between variants, bucketed by context key.
    Split(Vec<VariantSplit>),
}

/// One arm of a weighted split.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VariantSplit {
    /// Variant served to this bucket.
    pub variant: String,
    /// Relative weight of the bucket.
    pub weight: u32,
}

/// A single condition: `attribute <operator> values`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Context attribute the condition inspects.
    pub attribute: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Values the attribute is compared against.
    #[serde(default)]
    pub values: Vec<ConditionValue>,
}

/// A value a condition compares against.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ConditionValue {
    /// Boolean value.
    Boolean(bool),
    /// Number value (also epoch milliseconds for date operators).
    Number(f64),
    /// String value (also RFC 3339 timestamps for date operators).
    String(String),
    /// Anything else. Never matches.
    Other(serde_json::Value),
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}
impl From<f64> for ConditionValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}
impl From<bool> for ConditionValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// Comparison operator of a [`Condition`].
///
/// Operator names that are not built in deserialize to [`Operator::Custom`] and are resolved
/// against [`CustomOperators`] at evaluation time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
#[allow(missing_docs)]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    In,
    NotIn,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Before,
    After,
    Custom(String),
}

impl Operator {
    /// Wire name of the operator.
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "notEquals",
            Operator::Contains => "contains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
            Operator::Matches => "matches",
            Operator::In => "in",
            Operator::NotIn => "notIn",
            Operator::GreaterThan => "greaterThan",
            Operator::GreaterThanOrEqual => "greaterThanOrEqual",
            Operator::LessThan => "lessThan",
            Operator::LessThanOrEqual => "lessThanOrEqual",
            Operator::Before => "before",
            Operator::After => "after",
            Operator::Custom(name) => name,
        }
    }

    /// For negated operators, the operator they negate.
    fn negates(&self) -> Option<Operator> {
        match self {
            Operator::NotEquals => Some(Operator::Equals),
            Operator::NotIn => Some(Operator::In),
            _ => None,
        }
    }

    /// Try applying a built-in operator to a single attribute value. Returns `None` if the
    /// operator cannot be applied (type mismatch or malformed condition value).
    fn try_eval(&self, attribute: &AttributeValue, values: &[ConditionValue]) -> Option<bool> {
        match self {
            Operator::Equals => equals(attribute, values.first()?),
            Operator::In => {
                let mut result = None;
                for value in values {
                    match equals(attribute, value) {
                        Some(true) => return Some(true),
                        Some(false) => result = Some(false),
                        None => {}
                    }
                }
                result
            }
            Operator::Contains | Operator::StartsWith | Operator::EndsWith => {
                let s = attribute.as_str()?;
                let needle = match values.first()? {
                    ConditionValue::String(needle) => needle,
                    _ => return None,
                };
                Some(match self {
                    Operator::Contains => s.contains(needle.as_str()),
                    Operator::StartsWith => s.starts_with(needle.as_str()),
                    _ => s.ends_with(needle.as_str()),
                })
            }
            Operator::Matches => {
                let s = attribute.as_str()?;
                let regex = match values.first()? {
                    ConditionValue::String(pattern) => match Regex::new(pattern) {
                        Ok(regex) => regex,
                        Err(err) => {
                            log::warn!(
                                target: "featureflow",
                                pattern:display;
                                "invalid regex in condition: {}",
                                err
                            );
                            return None;
                        }
                    },
                    _ => return None,
                };
                Some(regex.is_match(s))
            }
            Operator::GreaterThan
            | Operator::GreaterThanOrEqual
            | Operator::LessThan
            | Operator::LessThanOrEqual => {
                let ordering = compare(attribute, values.first()?)?;
                Some(match self {
                    Operator::GreaterThan => ordering == Ordering::Greater,
                    Operator::GreaterThanOrEqual => ordering != Ordering::Less,
                    Operator::LessThan => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                })
            }
            Operator::Before | Operator::After => {
                let attribute = attribute_date(attribute)?;
                let value = condition_date(values.first()?)?;
                Some(if *self == Operator::Before {
                    attribute < value
                } else {
                    attribute > value
                })
            }
            Operator::NotEquals | Operator::NotIn | Operator::Custom(_) => None,
        }
    }
}

impl From<String> for Operator {
    fn from(value: String) -> Self {
        match value.as_str() {
            "equals" => Operator::Equals,
            "notEquals" => Operator::NotEquals,
            "contains" => Operator::Contains,
            "startsWith" => Operator::StartsWith,
            "endsWith" => Operator::EndsWith,
            "matches" => Operator::Matches,
            "in" => Operator::In,
            "notIn" => Operator::NotIn,
            "greaterThan" => Operator::GreaterThan,
            "greaterThanOrEqual" => Operator::GreaterThanOrEqual,
            "lessThan" => Operator::LessThan,
            "lessThanOrEqual" => Operator::LessThanOrEqual,
            "before" => Operator::Before,
            "after" => Operator::After,
            _ => Operator::Custom(value),
        }
    }
}

impl From<&str> for Operator {
    fn from(value: &str) -> Self {
        Operator::from(value.to_owned())
    }
}

impl From<Operator> for String {
    fn from(value: Operator) -> Self {
        match value {
            Operator::Custom(name) => name,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn equals(attribute: &AttributeValue, value: &ConditionValue) -> Option<bool> {
    match (attribute, value) {
        (AttributeValue::String(a), ConditionValue::String(b)) => Some(a == b),
        (AttributeValue::Number(a), ConditionValue::Number(b)) => Some(a == b),
        (AttributeValue::Boolean(a), ConditionValue::Boolean(b)) => Some(a == b),
        (AttributeValue::Date(a), value) => Some(*a == condition_date(value)?),
        _ => None,
    }
}

fn compare(attribute: &AttributeValue, value: &ConditionValue) -> Option<Ordering> {
    if let (AttributeValue::String(a), ConditionValue::String(b)) = (attribute, value) {
        if let (Ok(a), Ok(b)) = (Version::parse(a), Version::parse(b)) {
            return Some(a.cmp(&b));
        }
    }

    let a = match attribute {
        AttributeValue::Number(n) => *n,
        AttributeValue::String(s) => s.parse().ok()?,
        _ => return None,
    };
    let b = match value {
        ConditionValue::Number(n) => *n,
        ConditionValue::String(s) => s.parse().ok()?,
        _ => return None,
    };
    a.partial_cmp(&b)
}

fn attribute_date(attribute: &AttributeValue) -> Option<DateTime<Utc>> {
    match attribute {
        AttributeValue::Date(date) => Some(*date),
        AttributeValue::String(s) => parse_rfc3339(s),
        _ => None,
    }
}

fn condition_date(value: &ConditionValue) -> Option<DateTime<Utc>> {
    match value {
        ConditionValue::String(s) => parse_rfc3339(s),
        ConditionValue::Number(millis) => DateTime::from_timestamp_millis(*millis as i64),
        _ => None,
    }
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// A caller-supplied condition operator.
///
/// Registered with [`ClientConfig::operator`](crate::ClientConfig::operator) under the wire name
/// used in flag definitions. The operator is applied to each value of the attribute in turn and
/// the condition holds if any of them matches. Returning `None` means "not applicable" and counts
/// as a non-match.
pub trait CustomOperator: Send + Sync {
    /// Apply the operator to one attribute value.
    fn eval(&self, attribute: &AttributeValue, values: &[ConditionValue]) -> Option<bool>;
}

impl<F> CustomOperator for F
where
    F: Fn(&AttributeValue, &[ConditionValue]) -> Option<bool> + Send + Sync,
{
    fn eval(&self, attribute: &AttributeValue, values: &[ConditionValue]) -> Option<bool> {
        self(attribute, values)
    }
}

/// Registry of caller-supplied operators, keyed by wire name.
#[derive(Clone, Default)]
pub struct CustomOperators {
    operators: HashMap<String, Arc<dyn CustomOperator>>,
}

impl CustomOperators {
    /// Create an empty registry.
    pub fn new() -> CustomOperators {
        CustomOperators::default()
    }

    /// Register `operator` under `name`, replacing any previous registration.
    pub fn register(&mut self, name: impl Into<String>, operator: impl CustomOperator + 'static) {
        self.operators.insert(name.into(), Arc::new(operator));
    }

    fn get(&self, name: &str) -> Option<&dyn CustomOperator> {
        self.operators.get(name).map(|op| op.as_ref())
    }
}

impl fmt::Debug for CustomOperators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.operators.keys()).finish()
    }
}

impl Condition {
    /// Returns `true` if the context satisfies the condition. Missing attributes, type mismatches
    /// and malformed conditions never match.
    pub fn eval(&self, context: &Context, custom: &CustomOperators) -> bool {
        let Some(attribute_values) = context.get(&self.attribute).filter(|v| !v.is_empty()) else {
            return false;
        };

        if let Some(malformed) = self
            .values
            .iter()
            .find(|v| matches!(v, ConditionValue::Other(_)))
        {
            log::warn!(target: "featureflow",
                       attribute:display = self.attribute,
                       operator:display = self.operator,
                       value:serde = malformed;
                       "malformed condition value, treating condition as non-matching");
            return false;
        }

        match &self.operator {
            Operator::Custom(name) => {
                let Some(operator) = custom.get(name) else {
                    log::warn!(target: "featureflow",
                               attribute:display = self.attribute,
                               operator:display = name;
                               "unsupported operator, treating condition as non-matching");
                    return false;
                };
                attribute_values
                    .iter()
                    .any(|value| operator.eval(value, &self.values) == Some(true))
            }
            operator => match operator.negates() {
                // Every value must be comparable and none may satisfy the positive operator.
                Some(positive) => attribute_values
                    .iter()
                    .all(|value| positive.try_eval(value, &self.values) == Some(false)),
                None => attribute_values
                    .iter()
                    .any(|value| operator.try_eval(value, &self.values) == Some(true)),
            },
        }
    }
}

impl Rule {
    /// Returns `true` if the context satisfies every condition of the rule.
    pub fn eval(&self, context: &Context, custom: &CustomOperators) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.eval(context, custom))
    }

    /// All variant names this rule may serve.
    pub fn variants(&self) -> impl Iterator<Item = &str> {
        let (single, split) = match &self.serve {
            Serve::Variant(variant) => (Some(variant.as_str()), &[][..]),
            Serve::Split(splits) => (None, splits.as_slice()),
        };
        single
            .into_iter()
            .chain(split.iter().map(|split| split.variant.as_str()))
    }
}

impl Serve {
    /// Resolve the served variant for the given context key.
    fn resolve(&self, flag_key: &str, context_key: &str, sharder: &impl Sharder) -> Option<&str> {
        match self {
            Serve::Variant(variant) => Some(variant.as_str()),
            Serve::Split(splits) => {
                let total: u64 = splits.iter().map(|split| u64::from(split.weight)).sum();
                if total == 0 {
                    log::warn!(
                        target: "featureflow",
                        flag_key;
                        "split with zero total weight, skipping rule"
                    );
                    return None;
                }
                let bucket = sharder.get_shard(&format!("{flag_key}-{context_key}"), total);
                let mut upper = 0;
                splits.iter().find_map(|split| {
                    upper += u64::from(split.weight);
                    (bucket < upper).then_some(split.variant.as_str())
                })
            }
        }
    }
}

/// A successful rule match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch<'a> {
    /// Position of the matching rule.
    pub rule_index: usize,
    /// Variant served by the rule.
    pub variant: &'a str,
}

/// Find the first rule matching `context` and return the variant it serves.
///
/// Returns `None` when no rule matches. The result depends only on the arguments.
pub fn match_rules<'a>(
    rules: &'a [Rule],
    context: &Context,
    flag_key: &str,
    custom: &CustomOperators,
) -> Option<RuleMatch<'a>> {
    rules.iter().enumerate().find_map(|(rule_index, rule)| {
        if !rule.eval(context, custom) {
            return None;
        }
        let variant = rule.serve.resolve(flag_key, context.key(), &Md5Sharder)?;
        Some(RuleMatch {
            rule_index,
            variant,
        })
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{
        match_rules, Condition, ConditionValue, CustomOperators, Operator, Rule, RuleMatch, Serve,
        VariantSplit,
    };
    use crate::{AttributeValue, Context};

    fn condition(attribute: &str, operator: &str, values: Vec<ConditionValue>) -> Condition {
        Condition {
            attribute: attribute.into(),
            operator: operator.into(),
            values,
        }
    }

    fn rule(conditions: Vec<Condition>, variant: &str) -> Rule {
        Rule {
            conditions,
            serve: Serve::Variant(variant.into()),
        }
    }

    fn jimmy_matches(attribute: &str, operator: &str, values: Vec<ConditionValue>) -> bool {
        condition(attribute, operator, values).eval(&jimmy(), &CustomOperators::new())
    }

    fn jimmy() -> Context {
        Context::builder("jimmy@example.com")
            .with_attribute("subscription", "premium")
            .with_attribute("age", 32)
            .with_attribute("appVersion", "1.13.0")
            .with_attribute(
                "signupDate",
                Utc.with_ymd_and_hms(2017, 11, 28, 0, 0, 0).unwrap(),
            )
            .with_attributes("hobbies", ["swimming", "skiing", "rowing"])
            .with_attribute("betaTester", true)
            .build()
            .unwrap()
    }

    #[test]
    fn operator_wire_names() {
        let operator: Operator = serde_json::from_str(r#""greaterThanOrEqual""#).unwrap();
        assert_eq!(operator, Operator::GreaterThanOrEqual);
        let operator: Operator = serde_json::from_str(r#""semverCompatible""#).unwrap();
        assert_eq!(operator, Operator::Custom("semverCompatible".into()));
        assert_eq!(serde_json::to_string(&Operator::NotIn).unwrap(), r#""notIn""#);
    }

    #[test]
    fn equality() {
        assert!(jimmy_matches("subscription", "equals", vec!["premium".into()]));
        assert!(!jimmy_matches("subscription", "equals", vec!["free".into()]));
        assert!(jimmy_matches("betaTester", "equals", vec![true.into()]));
        assert!(jimmy_matches("age", "equals", vec![32.0.into()]));
        assert!(jimmy_matches("subscription", "notEquals", vec!["free".into()]));
        assert!(!jimmy_matches("subscription", "notEquals", vec!["premium".into()]));
    }

    #[test]
    fn type_mismatch_never_matches() {
        assert!(!jimmy_matches("age", "equals", vec!["32".into()]));
        assert!(!jimmy_matches("age", "notEquals", vec!["33".into()]));
        assert!(!jimmy_matches("betaTester", "greaterThan", vec![0.0.into()]));
        assert!(!jimmy_matches("subscription", "before", vec!["2020-01-01T00:00:00Z".into()]));
    }

    #[test]
    fn missing_attribute_never_matches() {
        assert!(!jimmy_matches("country", "equals", vec!["US".into()]));
        assert!(!jimmy_matches("country", "notEquals", vec!["US".into()]));
        assert!(!jimmy_matches("country", "notIn", vec!["US".into()]));
    }

    #[test]
    fn set_membership() {
        assert!(jimmy_matches("subscription", "in", vec!["beta".into(), "premium".into()]));
        assert!(!jimmy_matches("subscription", "in", vec!["beta".into(), "free".into()]));
        assert!(jimmy_matches("subscription", "notIn", vec!["beta".into(), "free".into()]));
        assert!(!jimmy_matches("subscription", "notIn", vec!["premium".into()]));
    }

    #[test]
    fn multi_valued_attributes() {
        assert!(jimmy_matches("hobbies", "equals", vec!["skiing".into()]));
        assert!(jimmy_matches("hobbies", "in", vec!["gaming".into(), "rowing".into()]));
        // One of the hobbies is "skiing", so "not equal to skiing" does not hold.
        assert!(!jimmy_matches("hobbies", "notEquals", vec!["skiing".into()]));
        assert!(jimmy_matches("hobbies", "notIn", vec!["gaming".into()]));
    }

    #[test]
    fn string_operators() {
        assert!(jimmy_matches("key", "endsWith", vec!["@example.com".into()]));
        assert!(jimmy_matches("key", "startsWith", vec!["jimmy".into()]));
        assert!(jimmy_matches("subscription", "contains", vec!["emi".into()]));
        assert!(!jimmy_matches("subscription", "contains", vec!["free".into()]));
        assert!(jimmy_matches("key", "matches", vec!["^j.*@example\\.com$".into()]));
        assert!(!jimmy_matches("key", "matches", vec!["^bob".into()]));
        assert!(!jimmy_matches("key", "matches", vec!["([".into()]));
    }

    #[test]
    fn numeric_comparisons() {
        assert!(jimmy_matches("age", "greaterThan", vec![18.0.into()]));
        assert!(!jimmy_matches("age", "greaterThan", vec![32.0.into()]));
        assert!(jimmy_matches("age", "greaterThanOrEqual", vec![32.0.into()]));
        assert!(jimmy_matches("age", "lessThan", vec!["40".into()]));
        assert!(jimmy_matches("age", "lessThanOrEqual", vec![32.0.into()]));
        assert!(!jimmy_matches("age", "lessThanOrEqual", vec![31.0.into()]));
    }

    #[test]
    fn version_comparisons() {
        assert!(jimmy_matches("appVersion", "greaterThan", vec!["1.5.0".into()]));
        assert!(!jimmy_matches("appVersion", "lessThan", vec!["1.5.0".into()]));
        assert!(jimmy_matches("appVersion", "greaterThanOrEqual", vec!["1.13.0".into()]));
    }

    #[test]
    fn date_comparisons() {
        assert!(jimmy_matches("signupDate", "before", vec!["2018-01-01T00:00:00Z".into()]));
        assert!(!jimmy_matches("signupDate", "after", vec!["2018-01-01T00:00:00+00:00".into()]));
        // 2017-01-01T00:00:00Z in epoch milliseconds.
        assert!(jimmy_matches("signupDate", "after", vec![1_483_228_800_000.0.into()]));
        assert!(!jimmy_matches("signupDate", "after", vec!["yesterday".into()]));
    }

    #[test]
    fn malformed_values_never_match() {
        let malformed = ConditionValue::Other(serde_json::json!({ "nested": true }));
        assert!(!jimmy_matches("subscription", "equals", vec![malformed.clone()]));
        assert!(!jimmy_matches("subscription", "notEquals", vec![malformed]));
        assert!(!jimmy_matches("subscription", "equals", vec![]));
    }

    #[test]
    fn custom_operators() {
        let context = jimmy();
        let mut custom = CustomOperators::new();
        custom.register(
            "lengthAtLeast",
            |attribute: &AttributeValue, values: &[ConditionValue]| match (
                attribute,
                values.first()?,
            ) {
                (AttributeValue::String(s), ConditionValue::Number(n)) => {
                    Some(s.len() as f64 >= *n)
                }
                _ => None,
            },
        );

        let known = condition("subscription", "lengthAtLeast", vec![7.0.into()]);
        assert!(known.eval(&context, &custom));
        let longer = condition("subscription", "lengthAtLeast", vec![8.0.into()]);
        assert!(!longer.eval(&context, &custom));

        // Without a registration the operator is unsupported.
        assert!(!known.eval(&context, &CustomOperators::new()));
    }

    #[test]
    fn empty_rule_matches_everything() {
        let rules = vec![rule(vec![], "on")];
        assert_eq!(
            match_rules(&rules, &Context::anonymous(), "flag", &CustomOperators::new()),
            Some(RuleMatch {
                rule_index: 0,
                variant: "on"
            })
        );
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = vec![
            rule(vec![condition("subscription", "equals", vec!["free".into()])], "red"),
            rule(vec![condition("subscription", "equals", vec!["premium".into()])], "blue"),
            rule(vec![condition("age", "greaterThan", vec![18.0.into()])], "green"),
        ];
        let matched = match_rules(&rules, &jimmy(), "flag", &CustomOperators::new()).unwrap();
        assert_eq!(matched.variant, "blue");
        assert_eq!(matched.rule_index, 1);
    }

    #[test]
    fn rule_conditions_are_combined_with_and() {
        let rules = vec![rule(
            vec![
                condition("age", "greaterThan", vec![18.0.into()]),
                condition("age", "lessThan", vec![30.0.into()]),
            ],
            "on",
        )];
        assert_eq!(match_rules(&rules, &jimmy(), "flag", &CustomOperators::new()), None);
    }

    #[test]
    fn splits_are_deterministic() {
        let rules = vec![Rule {
            conditions: vec![],
            serve: Serve::Split(vec![
                VariantSplit { variant: "on".into(), weight: 30 },
                VariantSplit { variant: "off".into(), weight: 70 },
            ]),
        }];
        let custom = CustomOperators::new();
        // md5("new-dashboard-premium@example.com") lands in bucket 29 of 100.
        let premium = Context::builder("premium@example.com").build().unwrap();
        let first = match_rules(&rules, &premium, "new-dashboard", &custom).unwrap();
        assert_eq!(first.variant, "on");
        for _ in 0..10 {
            assert_eq!(match_rules(&rules, &premium, "new-dashboard", &custom), Some(first));
        }
    }

    #[test]
    fn zero_weight_split_is_skipped() {
        let rules = vec![
            Rule {
                conditions: vec![],
                serve: Serve::Split(vec![VariantSplit { variant: "on".into(), weight: 0 }]),
            },
            rule(vec![], "fallthrough"),
        ];
        let matched = match_rules(&rules, &jimmy(), "flag", &CustomOperators::new()).unwrap();
        assert_eq!(matched.variant, "fallthrough");
    }

    #[test]
    fn parse_rule() {
        let rule: Rule = serde_json::from_str(
            r#"{
                "conditions": [
                    { "attribute": "tier", "operator": "equals", "values": ["gold"] }
                ],
                "serve": [ { "variant": "on", "weight": 10 }, { "variant": "off", "weight": 90 } ]
            }"#,
        )
        .unwrap();
        assert_eq!(rule.variants().collect::<Vec<_>>(), vec!["on", "off"]);
        assert_eq!(rule.conditions[0].operator, Operator::Equals);
    }
}
