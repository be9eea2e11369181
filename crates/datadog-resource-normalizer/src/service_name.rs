// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref INVALID_SERVICE_CHARACTERS_REGEX: Regex =
        Regex::new(r"[^a-zA-Z0-9._]+").expect("failed creating regex");
}

/// Turns a host name (optionally with a scheme) or a unix domain socket path
/// into a string usable as a service name.
///
/// `tcp://my host!.sock` becomes `my-host.sock`. A missing value yields an
/// empty string.
#[must_use]
pub fn normalize_host_or_socket(host_or_socket: Option<&str>) -> String {
    let Some(host_or_socket) = host_or_socket else {
        return String::new();
    };

    // Not parsed as a URL: socket file names would not survive it.
    let without_scheme = host_or_socket
        .rsplit("://")
        .next()
        .unwrap_or(host_or_socket);
    let without_spaces = without_scheme.replace(' ', "");

    INVALID_SERVICE_CHARACTERS_REGEX
        .replace_all(&without_spaces, "-")
        .trim_matches(&['-', ' '][..])
        .to_string()
}
