//! The Rust SDK for Featureflow, a feature flag management platform.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that evaluates feature flags for a [`Context`], where each
//! context has a unique key and attributes associated with it. Evaluating a flag results in an
//! [`Evaluation`] holding the variant served to the context, its value, and the reason it was
//! chosen.
//!
//! Flag definitions are synchronized from the Featureflow API in a background thread, by polling
//! or over a streaming connection. Features can also be declared locally with [`Feature`], which
//! lets the client run without any network access.
//!
//! ```
//! # use featureflow::{ClientConfig, Context, Feature};
//! # fn test() -> featureflow::Result<()> {
//! let mut config = ClientConfig::offline();
//! config.with_features([
//!     Feature::new("feature-one").variant("on").build(),
//!     Feature::new("feature-two").build(),
//! ]);
//! let client = config.to_client()?;
//! client.start()?;
//!
//! let context = Context::builder("user@example.com").build()?;
//! assert!(client.evaluate("feature-one", Some(&context)).is_on());
//! assert!(!client.evaluate("feature-two", Some(&context)).is_on());
//! # Ok(())
//! # }
//! # test().unwrap();
//! ```
//!
//! An [`EvaluationLogger`] can be provided to send evaluation events to your analytics pipeline.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Flag evaluation never fails: unknown flags and malformed rules resolve to a fallback variant.
//! Errors surface while configuring the client and while synchronizing definitions, through
//! [`Client::wait_for_ready`], [`Client::on_ready`] and [`ClientConfig::error_handler`].
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages. Consider integrating a `log`-compatible logger implementation for better visibility
//! into SDK operations.
//!
//! # Examples
//!
//! Examples can be found in the `demos` directory of the `featureflow` crate repository.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod client;
mod config;
mod context;
mod error;
mod eval;
mod evaluation_logger;
mod feature;
mod fetcher;
mod flag;
mod poller;
mod readiness;
mod registry;
mod rules;
mod sharder;
mod sse;

pub use client::Client;
pub use config::ClientConfig;
pub use context::{AttributeValue, Context, ContextBuilder, ANONYMOUS_KEY};
pub use error::{Error, Result};
pub use eval::{Evaluation, EvaluationReason};
pub use evaluation_logger::{EvaluationEvent, EvaluationLogger};
pub use feature::Feature;
pub use fetcher::{EventIter, FetchOutcome, FlagSource, HttpFlagSource, HttpFlagSourceConfig};
pub use flag::{FlagDefinition, FlagSet, FlagValue, TryParse, OFF_VARIANT, ON_VARIANT};
pub use poller::SyncState;
pub use registry::{FlagRegistry, Snapshot};
pub use rules::{
    match_rules, Condition, ConditionValue, CustomOperator, CustomOperators, Operator, Rule,
    RuleMatch, Serve, VariantSplit,
};
pub use sse::{EventStream, StreamEvent};
