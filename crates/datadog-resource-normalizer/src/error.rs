// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while compiling a single configured rule.
///
/// These never escape a normalization call. The rule is logged and dropped,
/// and the remaining rules keep working.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Invalid fragment regex '{pattern}': {source}")]
    InvalidFragmentRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid URI mapping '{mapping}': {source}")]
    InvalidMapping {
        mapping: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid legacy URI mapping '{rule}': {reason}")]
    InvalidLegacyRule { rule: String, reason: String },
}

/// Errors raised by a single configuration source.
#[derive(Debug, PartialEq, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}
