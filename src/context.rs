//! Evaluation contexts: the identity and attributes of whoever a flag is evaluated for.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use derive_more::From;
use serde::Serialize;

use crate::{Error, Result};

/// Key used for contexts that carry no identity.
pub const ANONYMOUS_KEY: &str = "anonymous";

/// Attribute name under which the context key is visible to rules.
pub const KEY_ATTRIBUTE: &str = "key";

/// A single primitive value of a context attribute.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `f64`, integers, `bool`, and
/// `DateTime<Utc>`.
///
/// ```
/// # use featureflow::AttributeValue;
/// let string_attr: AttributeValue = "premium".into();
/// let number_attr: AttributeValue = 32.into();
/// let bool_attr: AttributeValue = true.into();
/// ```
#[derive(Debug, Serialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A numerical value.
    Number(f64),
    /// A boolean value.
    Boolean(bool),
    /// A point in time.
    Date(DateTime<Utc>),
}

impl AttributeValue {
    /// Returns the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

/// The subject a flag is evaluated for: a non-empty key plus attributes, each holding one or more
/// values.
///
/// A `Context` is immutable. Build one with [`ContextBuilder`]:
///
/// ```
/// # use featureflow::Context;
/// let context = Context::builder("jimmy@example.com")
///     .with_attribute("subscription", "premium")
///     .with_attribute("age", 32)
///     .with_attributes("hobbies", ["swimming", "skiing"])
///     .build()
///     .unwrap();
/// assert_eq!(context.key(), "jimmy@example.com");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    key: String,
    attributes: HashMap<String, Vec<AttributeValue>>,
}

impl Context {
    /// Start building a context with the given key.
    pub fn builder(key: impl Into<String>) -> ContextBuilder {
        ContextBuilder::new(key)
    }

    /// A context with no identity.
    pub fn anonymous() -> Context {
        Context::from_parts(ANONYMOUS_KEY.to_owned(), HashMap::new())
    }

    fn from_parts(key: String, mut attributes: HashMap<String, Vec<AttributeValue>>) -> Context {
        // Rules can target the key like any other attribute unless the caller shadowed it.
        attributes
            .entry(KEY_ATTRIBUTE.to_owned())
            .or_insert_with(|| vec![AttributeValue::String(key.clone())]);
        Context { key, attributes }
    }

    /// The identity key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Values of the named attribute. Returns `None` if the attribute is not set.
    pub fn get(&self, attribute: &str) -> Option<&[AttributeValue]> {
        self.attributes.get(attribute).map(Vec::as_slice)
    }

    /// All attributes, including the implicit `key` attribute.
    pub fn attributes(&self) -> &HashMap<String, Vec<AttributeValue>> {
        &self.attributes
    }
}

/// Accumulates attributes before finalizing them into an immutable [`Context`].
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    key: String,
    attributes: HashMap<String, Vec<AttributeValue>>,
}

impl ContextBuilder {
    /// Create a new builder for a context with the given key.
    pub fn new(key: impl Into<String>) -> ContextBuilder {
        ContextBuilder {
            key: key.into(),
            attributes: HashMap::new(),
        }
    }

    /// Set a single-valued attribute, replacing any previous values.
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> ContextBuilder {
        self.attributes.insert(name.into(), vec![value.into()]);
        self
    }

    /// Set a multi-valued attribute, replacing any previous values.
    pub fn with_attributes<V: Into<AttributeValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> ContextBuilder {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Finalize the context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContext`] if the key is empty.
    pub fn build(self) -> Result<Context> {
        if self.key.is_empty() {
            return Err(Error::InvalidContext);
        }
        Ok(Context::from_parts(self.key, self.attributes))
    }
}
