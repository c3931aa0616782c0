//! Option schemas declared by data sources
//!
//! A data source describes the configuration fields it needs (labels, input
//! types, validation rules). The schema is pure data: a settings UI renders
//! it, and the registry validates option bundles against it before an
//! adapter is constructed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Option key → specification
pub type OptionSchema = BTreeMap<String, OptionSpec>;

/// Input widget hint for a settings UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    /// Single-line text
    Text,
    /// Masked text
    Password,
}

/// Validation rule attached to an option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRule {
    /// Value must be present and non-blank
    Required,
}

/// Specification of one configuration field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    /// Human label
    pub label: String,
    /// Input widget hint
    pub input: InputType,
    /// Help text
    pub description: String,
    /// Validation rules
    #[serde(default)]
    pub rules: Vec<OptionRule>,
}

impl OptionSpec {
    /// Text option without rules
    pub fn text(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            input: InputType::Text,
            description: description.into(),
            rules: Vec::new(),
        }
    }

    /// Masked option without rules
    pub fn password(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            input: InputType::Password,
            ..Self::text(label, description)
        }
    }

    /// Mark the option as required
    pub fn required(mut self) -> Self {
        if !self.rules.contains(&OptionRule::Required) {
            self.rules.push(OptionRule::Required);
        }
        self
    }

    /// Whether the `required` rule is attached
    pub fn is_required(&self) -> bool {
        self.rules.contains(&OptionRule::Required)
    }
}

/// Validate an option bundle against a schema
///
/// Every option carrying the `required` rule must be present and non-blank.
/// Keys the schema does not declare are accepted (shared options such as
/// `timeout_secs` are not part of every adapter's schema).
pub fn validate_options(
    source: &str,
    schema: &OptionSchema,
    options: &BTreeMap<String, String>,
) -> Result<()> {
    let missing: Vec<&str> = schema
        .iter()
        .filter(|(_, spec)| spec.is_required())
        .filter(|(key, _)| {
            options
                .get(key.as_str())
                .is_none_or(|value| value.trim().is_empty())
        })
        .map(|(key, _)| key.as_str())
        .collect();

    if !missing.is_empty() {
        return Err(Error::config(format!(
            "{}: missing required option(s): {}",
            source,
            missing.join(", ")
        )));
    }

    for key in options.keys() {
        if !schema.contains_key(key) {
            tracing::debug!(source = source, option = %key, "option not declared by schema");
        }
    }

    Ok(())
}
