// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Environment variable configuration.
//!
//! Each variable holds a comma-separated list. Unset variables leave the
//! current value alone, so they never erase what an earlier source loaded.

use std::env;

use crate::{
    config::{parse_comma_separated_list, Config, ConfigError, ConfigSource},
    merge_vec,
};

pub const FRAGMENT_REGEX_ENV: &str = "DD_TRACE_RESOURCE_URI_FRAGMENT_REGEX";
pub const MAPPING_INCOMING_ENV: &str = "DD_TRACE_RESOURCE_URI_MAPPING_INCOMING";
pub const MAPPING_OUTGOING_ENV: &str = "DD_TRACE_RESOURCE_URI_MAPPING_OUTGOING";
/// Deprecated, see [`crate::config::NormalizationMode::Legacy`].
pub const LEGACY_MAPPING_ENV: &str = "DD_TRACE_RESOURCE_URI_MAPPING";

/// Resource URI settings found in the process environment.
#[derive(Debug, PartialEq, Clone, Default)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfig {
    pub trace_resource_uri_fragment_regex: Vec<String>,
    pub trace_resource_uri_mapping_incoming: Vec<String>,
    pub trace_resource_uri_mapping_outgoing: Vec<String>,
    pub trace_resource_uri_mapping: Vec<String>,
}

impl EnvConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            trace_resource_uri_fragment_regex: read_list(FRAGMENT_REGEX_ENV),
            trace_resource_uri_mapping_incoming: read_list(MAPPING_INCOMING_ENV),
            trace_resource_uri_mapping_outgoing: read_list(MAPPING_OUTGOING_ENV),
            trace_resource_uri_mapping: read_list(LEGACY_MAPPING_ENV),
        }
    }
}

fn read_list(name: &str) -> Vec<String> {
    env::var(name)
        .map(|value| parse_comma_separated_list(&value))
        .unwrap_or_default()
}

#[allow(clippy::module_name_repetitions)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let env_config = EnvConfig::from_env();

        merge_vec!(config, env_config, trace_resource_uri_fragment_regex);
        merge_vec!(config, env_config, trace_resource_uri_mapping_incoming);
        merge_vec!(config, env_config, trace_resource_uri_mapping_outgoing);
        merge_vec!(config, env_config, trace_resource_uri_mapping);

        Ok(())
    }
}
