// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Deprecated `DD_TRACE_RESOURCE_URI_MAPPING` normalization.
//!
//! Kept for backward compatibility only. It is selected when the legacy list
//! is the only resource URI setting present, see
//! [`crate::config::NormalizationMode`].

use regex::{NoExpand, Regex};
use tracing::warn;

use crate::error::RuleError;
use crate::normalizer::is_default_variable_fragment;

/// Normalizes paths when legacy mode is selected.
///
/// Receives the sanitized path, already prefixed with `/` unless it is a full
/// URL. Whatever it returns is used as is.
pub trait LegacyNormalizer: Send + Sync {
    fn normalize(&self, path: &str) -> String;
}

/// Default legacy normalizer.
///
/// Each rule is either `old=new` or a bare pattern, where `*` stands for a
/// single path segment. A bare pattern is replaced with itself, `*` turned
/// into `?`. The first rule found in the path is applied once, then integer,
/// UUID and hexadecimal segments are replaced with `?`.
///
/// ```
/// use datadog_resource_normalizer::legacy::{LegacyNormalizer, WildcardLegacyNormalizer};
///
/// let normalizer = WildcardLegacyNormalizer::new(&["/user/*/profile".to_string()]);
/// assert_eq!(normalizer.normalize("/user/alice/profile/42"), "/user/?/profile/?");
/// ```
pub struct WildcardLegacyNormalizer {
    rules: Vec<LegacyRule>,
}

struct LegacyRule {
    pattern: Regex,
    replacement: String,
}

impl LegacyRule {
    fn compile(rule: &str) -> Result<Self, RuleError> {
        let (old, new) = match rule.split_once('=') {
            Some((old, new)) => (old.trim(), new.trim().to_string()),
            None => (rule, rule.replace('*', "?")),
        };

        if old.is_empty() {
            return Err(RuleError::InvalidLegacyRule {
                rule: rule.to_string(),
                reason: "empty pattern".to_string(),
            });
        }

        let pattern = regex::escape(old).replace(r"\*", "[^/?#]+");
        let pattern = Regex::new(&pattern).map_err(|source| RuleError::InvalidLegacyRule {
            rule: rule.to_string(),
            reason: source.to_string(),
        })?;

        Ok(Self {
            pattern,
            replacement: new,
        })
    }
}

impl WildcardLegacyNormalizer {
    /// Compiles `rules`, logging and skipping the invalid ones.
    #[must_use]
    pub fn new(rules: &[String]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| rule.trim())
            .filter(|rule| !rule.is_empty())
            .filter_map(|rule| match LegacyRule::compile(rule) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!("{}, ignoring", e);
                    None
                }
            })
            .collect();

        Self { rules }
    }
}

impl LegacyNormalizer for WildcardLegacyNormalizer {
    fn normalize(&self, path: &str) -> String {
        let mapped = self
            .rules
            .iter()
            .find(|rule| rule.pattern.is_match(path))
            .map_or_else(
                || path.to_string(),
                |rule| {
                    rule.pattern
                        .replacen(path, 1, NoExpand(&rule.replacement))
                        .into_owned()
                },
            );

        mapped
            .split('/')
            .map(|fragment| {
                if is_default_variable_fragment(fragment) {
                    "?"
                } else {
                    fragment
                }
            })
            .collect::<Vec<&str>>()
            .join("/")
    }
}
