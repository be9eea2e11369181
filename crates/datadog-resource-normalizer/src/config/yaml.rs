// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! YAML file-based configuration.
//!
//! Settings live under the `trace` section of `datadog.yaml`. Lists can be
//! written either as a comma-separated string or as a YAML sequence:
//!
//! ```yaml
//! trace:
//!   resource_uri_fragment_regex: '^[a-z]{2}-[0-9]+$'
//!   resource_uri_mapping_incoming:
//!     - user/*/profile
//!     - orders/*
//!   resource_uri_mapping_outgoing: 'api/*, v1/*/items'
//! ```
//!
//! A missing file is not an error and loads nothing.

use std::path::PathBuf;

use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde::Deserialize;

use crate::{
    config::{deserialize_comma_separated_list, Config, ConfigError, ConfigSource},
    merge_vec,
};

/// `YamlConfig` is a struct that represents the fields of `datadog.yaml` used
/// by resource URI normalization.
#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct YamlConfig {
    pub trace: TraceConfig,
}

/// Trace Config
#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TraceConfig {
    #[serde(deserialize_with = "deserialize_comma_separated_list")]
    pub resource_uri_fragment_regex: Vec<String>,
    #[serde(deserialize_with = "deserialize_comma_separated_list")]
    pub resource_uri_mapping_incoming: Vec<String>,
    #[serde(deserialize_with = "deserialize_comma_separated_list")]
    pub resource_uri_mapping_outgoing: Vec<String>,
    #[serde(deserialize_with = "deserialize_comma_separated_list")]
    pub resource_uri_mapping: Vec<String>,
}

#[allow(clippy::module_name_repetitions)]
pub struct YamlConfigSource {
    pub path: PathBuf,
}

impl ConfigSource for YamlConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Yaml::file(self.path.clone()));

        let yaml_config: YamlConfig = figment
            .extract()
            .map_err(|err| ConfigError::ParseError(err.to_string()))?;

        let trace = yaml_config.trace;
        merge_vec!(
            config,
            trace_resource_uri_fragment_regex,
            trace,
            resource_uri_fragment_regex
        );
        merge_vec!(
            config,
            trace_resource_uri_mapping_incoming,
            trace,
            resource_uri_mapping_incoming
        );
        merge_vec!(
            config,
            trace_resource_uri_mapping_outgoing,
            trace,
            resource_uri_mapping_outgoing
        );
        merge_vec!(config, trace_resource_uri_mapping, trace, resource_uri_mapping);

        Ok(())
    }
}
