// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration Module
//!
//! Resource URI normalization is driven by four comma-separated lists:
//!
//! | Environment variable                        | YAML key                              |
//! |---------------------------------------------|---------------------------------------|
//! | `DD_TRACE_RESOURCE_URI_FRAGMENT_REGEX`      | `trace.resource_uri_fragment_regex`   |
//! | `DD_TRACE_RESOURCE_URI_MAPPING_INCOMING`    | `trace.resource_uri_mapping_incoming` |
//! | `DD_TRACE_RESOURCE_URI_MAPPING_OUTGOING`    | `trace.resource_uri_mapping_outgoing` |
//! | `DD_TRACE_RESOURCE_URI_MAPPING` (deprecated)| `trace.resource_uri_mapping`          |
//!
//! ## Configuration Priority
//!
//! Sources are applied in the order they are added to the [`ConfigBuilder`],
//! later sources overriding earlier ones. [`get_config`] loads the YAML file
//! first and the environment last.
//!
//! ## Whitespace Handling
//!
//! Every list entry is trimmed and empty entries are dropped, so `" a, ,b "`
//! yields `["a", "b"]`.
//!
//! ## Legacy Mode
//!
//! The deprecated `DD_TRACE_RESOURCE_URI_MAPPING` list is only honored when
//! none of the three other lists is set. See [`NormalizationMode`].

pub mod env;
pub mod yaml;

use std::fmt;
use std::path::Path;

use serde::de::{Deserializer, SeqAccess, Visitor};
use tracing::{debug, error};

pub use crate::error::ConfigError;
use crate::config::{env::EnvConfigSource, yaml::YamlConfigSource};

/// Helper macro to merge `Vec` fields when `Vec` is not empty
///
/// Providing one field argument will merge the value from the source config field into the config
/// field.
///
/// Providing two field arguments will merge the value from the source config field into the config
/// field if the value is not empty.
#[macro_export]
macro_rules! merge_vec {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if !$source.$source_field.is_empty() {
            $config.$config_field.clone_from(&$source.$source_field);
        }
    };
    ($config:expr, $source:expr, $field:ident) => {
        if !$source.$field.is_empty() {
            $config.$field.clone_from(&$source.$field);
        }
    };
}

#[allow(clippy::module_name_repetitions)]
pub trait ConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError>;
}

#[derive(Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    config: Config,
}

#[allow(clippy::module_name_repetitions)]
impl ConfigBuilder {
    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn build(&mut self) -> Config {
        let mut failed_sources = 0;
        for source in &self.sources {
            match source.load(&mut self.config) {
                Ok(()) => (),
                Err(e) => {
                    error!("Failed to load config: {}", e);
                    failed_sources += 1;
                }
            }
        }

        if !self.sources.is_empty() && failed_sources == self.sources.len() {
            debug!("All sources failed to load config, using default config.");
        }

        self.config.clone()
    }
}

/// Resource URI normalization settings, as read from the configuration sources.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Config {
    /// Regexes classifying a path fragment as variable, on top of the defaults.
    pub trace_resource_uri_fragment_regex: Vec<String>,
    /// Wildcard mappings for requests received by the traced service.
    pub trace_resource_uri_mapping_incoming: Vec<String>,
    /// Wildcard mappings for requests sent by the traced service.
    pub trace_resource_uri_mapping_outgoing: Vec<String>,
    /// Deprecated mapping list, only used when nothing above is configured.
    pub trace_resource_uri_mapping: Vec<String>,
}

impl Config {
    /// Decides between legacy and modern normalization.
    ///
    /// Legacy normalization is selected only when the three modern lists are
    /// empty and the legacy list is not. Everything else, including an empty
    /// configuration, is modern normalization.
    #[must_use]
    pub fn normalization_mode(&self) -> NormalizationMode {
        if self.trace_resource_uri_fragment_regex.is_empty()
            && self.trace_resource_uri_mapping_incoming.is_empty()
            && self.trace_resource_uri_mapping_outgoing.is_empty()
            && !self.trace_resource_uri_mapping.is_empty()
        {
            debug!("Only DD_TRACE_RESOURCE_URI_MAPPING is set, using legacy URI normalization");
            return NormalizationMode::Legacy(self.trace_resource_uri_mapping.clone());
        }

        NormalizationMode::Modern {
            fragment_regexes: self.trace_resource_uri_fragment_regex.clone(),
            incoming_mappings: self.trace_resource_uri_mapping_incoming.clone(),
            outgoing_mappings: self.trace_resource_uri_mapping_outgoing.clone(),
        }
    }
}

/// Raw rules for one of the two URI normalization strategies.
#[derive(Debug, PartialEq, Clone)]
pub enum NormalizationMode {
    /// Deprecated rules, handed as is to a legacy normalizer.
    Legacy(Vec<String>),
    Modern {
        fragment_regexes: Vec<String>,
        incoming_mappings: Vec<String>,
        outgoing_mappings: Vec<String>,
    },
}

impl Default for NormalizationMode {
    fn default() -> Self {
        NormalizationMode::Modern {
            fragment_regexes: Vec::new(),
            incoming_mappings: Vec::new(),
            outgoing_mappings: Vec::new(),
        }
    }
}

/// Loads `datadog.yaml` from `config_directory`, then the environment.
#[must_use]
pub fn get_config(config_directory: &Path) -> Config {
    let path = config_directory.join("datadog.yaml");
    ConfigBuilder::default()
        .add_source(Box::new(YamlConfigSource { path }))
        .add_source(Box::new(EnvConfigSource))
        .build()
}

/// Splits a comma-separated list, trimming entries and dropping empty ones.
#[must_use]
pub fn parse_comma_separated_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect()
}

struct StringOrSequenceVisitor;

impl<'de> Visitor<'de> for StringOrSequenceVisitor {
    type Value = Vec<String>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a comma-separated string or a sequence of strings")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(parse_comma_separated_list(value))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut values = Vec::new();
        while let Some(value) = seq.next_element::<String>()? {
            let value = value.trim();
            if !value.is_empty() {
                values.push(value.to_string());
            }
        }
        Ok(values)
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Vec::new())
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Vec::new())
    }
}

/// Deserializes a list given either as `"a, b"` or as a sequence of strings.
pub fn deserialize_comma_separated_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(StringOrSequenceVisitor)
}
