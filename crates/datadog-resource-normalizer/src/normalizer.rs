// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Resource URI normalization.
//!
//! Turns a raw path or URL such as `/user/123/edit?token=abc` into a low
//! cardinality resource name such as `/user/?/edit`:
//!
//! 1. The URL is sanitized: credentials are obfuscated and the query string
//!    is removed (see [`crate::sanitizer`]).
//! 2. Pure paths get a leading `/`. Full URLs with a scheme are preserved.
//! 3. Wildcard mappings for the request [`Direction`] are applied in order.
//!    `user/*` rewrites `/user/alice/edit` into `/user/?/edit`. Each mapping
//!    rewrites the output of the previous one.
//! 4. Every `/` separated fragment (empty ones included) matching one of the
//!    fragment regexes is replaced with `?`. Integers, UUIDs and 8 to 128
//!    character hexadecimal tokens are always matched. Configured regexes run
//!    after those.
//!
//! When the deprecated `DD_TRACE_RESOURCE_URI_MAPPING` is the only setting
//! present, steps 3 and 4 are delegated to a [`LegacyNormalizer`] instead.

use std::sync::OnceLock;

use lazy_static::lazy_static;
use regex::{NoExpand, Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::config::{env::EnvConfigSource, Config, ConfigBuilder, NormalizationMode};
use crate::error::RuleError;
use crate::legacy::{LegacyNormalizer, WildcardLegacyNormalizer};
use crate::sanitizer::sanitize_url;

/// Upper bound on the compiled size of a configured regex.
///
/// Patterns are evaluated on every request, anything bigger is rejected when
/// the configuration is loaded.
const USER_REGEX_SIZE_LIMIT: usize = 1 << 20;

lazy_static! {
    /// RFC 3986 scheme followed by `://`.
    static ref SCHEME_REGEX: Regex =
        Regex::new(r"^[a-z][a-zA-Z0-9+\-.]+://").expect("failed creating regex");

    /// Fragments that always identify a variable path segment.
    ///
    /// Integers, UUIDs (hyphens optional) and 32 to 512 bit hex tokens.
    static ref DEFAULT_FRAGMENT_REGEXES: [Regex; 3] = [
        Regex::new(r"^[0-9]+$").expect("failed creating regex"),
        Regex::new(
            r"^[0-9a-fA-F]{8}-?[0-9a-fA-F]{4}-?[1-5][0-9a-fA-F]{3}-?[89abAB][0-9a-fA-F]{3}-?[0-9a-fA-F]{12}$"
        )
        .expect("failed creating regex"),
        Regex::new(r"^[0-9a-fA-F]{8,128}$").expect("failed creating regex"),
    ];
}

/// Replacement for a variable path fragment.
const VARIABLE_FRAGMENT: &str = "?";

/// Whether the request is received or sent by the traced service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Returns whether one of the default fragment regexes matches `fragment`.
pub(crate) fn is_default_variable_fragment(fragment: &str) -> bool {
    DEFAULT_FRAGMENT_REGEXES
        .iter()
        .any(|regex| regex.is_match(fragment))
}

/// A compiled `resource_uri_mapping_*` entry.
///
/// `*` matches a single path segment. The mapping is searched with a leading
/// `/` anywhere in the path and the matched part is replaced with the mapping
/// itself, `*` turned into `?`. Other characters keep their regex meaning.
#[derive(Debug, Clone)]
pub struct UriMapping {
    regex: Regex,
    replacement: String,
}

impl UriMapping {
    pub fn new(mapping: &str) -> Result<Self, RuleError> {
        let pattern = format!("/{}", mapping.replace('*', "[^/?#]+"));
        let regex = RegexBuilder::new(&pattern)
            .size_limit(USER_REGEX_SIZE_LIMIT)
            .build()
            .map_err(|source| RuleError::InvalidMapping {
                mapping: mapping.to_string(),
                source,
            })?;

        Ok(Self {
            regex,
            replacement: format!("/{}", mapping.replace('*', VARIABLE_FRAGMENT)),
        })
    }

    /// Replaces every occurrence of the mapping in `path`.
    #[must_use]
    pub fn apply(&self, path: &str) -> String {
        self.regex
            .replace_all(path, NoExpand(&self.replacement))
            .into_owned()
    }
}

/// Compiles a configured fragment regex.
///
/// Surrounding `/` and spaces are optional and stripped, `/^[a-z]+$/` and
/// `^[a-z]+$` are the same pattern.
///
/// Classes are Unicode aware: `\d` also matches digits such as `٣`. Use
/// `(?-u:\d)` or `[0-9]` to match ASCII digits only.
pub fn compile_fragment_regex(pattern: &str) -> Result<Option<Regex>, RuleError> {
    let trimmed = pattern.trim_matches(&['/', ' '][..]);
    if trimmed.is_empty() {
        return Ok(None);
    }

    RegexBuilder::new(trimmed)
        .size_limit(USER_REGEX_SIZE_LIMIT)
        .build()
        .map(Some)
        .map_err(|source| RuleError::InvalidFragmentRegex {
            pattern: pattern.to_string(),
            source,
        })
}

fn compile_mappings(mappings: &[String]) -> Vec<UriMapping> {
    mappings
        .iter()
        .map(|mapping| mapping.trim())
        .filter(|mapping| !mapping.is_empty())
        .filter_map(|mapping| match UriMapping::new(mapping) {
            Ok(mapping) => Some(mapping),
            Err(e) => {
                warn!("{}, ignoring", e);
                None
            }
        })
        .collect()
}

struct ModernRules {
    fragment_regexes: Vec<Regex>,
    incoming_mappings: Vec<UriMapping>,
    outgoing_mappings: Vec<UriMapping>,
}

impl ModernRules {
    fn new(
        fragment_regexes: &[String],
        incoming_mappings: &[String],
        outgoing_mappings: &[String],
    ) -> Self {
        let mut regexes = DEFAULT_FRAGMENT_REGEXES.to_vec();
        for pattern in fragment_regexes {
            match compile_fragment_regex(pattern) {
                Ok(Some(regex)) => regexes.push(regex),
                Ok(None) => debug!("Empty fragment regex '{}', ignoring", pattern),
                Err(e) => warn!("{}, ignoring", e),
            }
        }

        Self {
            fragment_regexes: regexes,
            incoming_mappings: compile_mappings(incoming_mappings),
            outgoing_mappings: compile_mappings(outgoing_mappings),
        }
    }

    fn mappings(&self, direction: Direction) -> &[UriMapping] {
        match direction {
            Direction::Incoming => &self.incoming_mappings,
            Direction::Outgoing => &self.outgoing_mappings,
        }
    }

    fn apply(&self, path: &str, direction: Direction) -> String {
        let mapped = self
            .mappings(direction)
            .iter()
            .fold(path.to_string(), |path, mapping| mapping.apply(&path));

        // `/some//path/123/` => ["", "some", "", "path", "123", ""]
        let mut fragments: Vec<&str> = mapped.split('/').collect();
        for regex in &self.fragment_regexes {
            for fragment in &mut fragments {
                if regex.is_match(*fragment) {
                    *fragment = VARIABLE_FRAGMENT;
                }
            }
        }

        fragments.join("/")
    }
}

enum Rules {
    Legacy(Box<dyn LegacyNormalizer>),
    Modern(ModernRules),
}

/// Resource URI normalizer built from a resolved configuration.
///
/// Rules are compiled once. The normalizer is immutable and can be shared
/// across threads.
pub struct UriNormalizer {
    rules: Rules,
}

impl Default for UriNormalizer {
    fn default() -> Self {
        Self::new(&NormalizationMode::default())
    }
}

impl UriNormalizer {
    /// Compiles the rules of `mode`. Invalid rules are logged and skipped.
    #[must_use]
    pub fn new(mode: &NormalizationMode) -> Self {
        match mode {
            NormalizationMode::Legacy(rules) => {
                Self::with_legacy_normalizer(Box::new(WildcardLegacyNormalizer::new(rules)))
            }
            NormalizationMode::Modern {
                fragment_regexes,
                incoming_mappings,
                outgoing_mappings,
            } => Self {
                rules: Rules::Modern(ModernRules::new(
                    fragment_regexes,
                    incoming_mappings,
                    outgoing_mappings,
                )),
            },
        }
    }

    /// Delegates all normalization, past sanitization, to `legacy`.
    #[must_use]
    pub fn with_legacy_normalizer(legacy: Box<dyn LegacyNormalizer>) -> Self {
        Self {
            rules: Rules::Legacy(legacy),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.normalization_mode())
    }

    /// Builds a normalizer from the `DD_TRACE_RESOURCE_URI_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let config = ConfigBuilder::default()
            .add_source(Box::new(EnvConfigSource))
            .build();
        Self::from_config(&config)
    }

    /// Normalizes a path or full URL with the rules of `direction`.
    ///
    /// ```
    /// use datadog_resource_normalizer::{Direction, UriNormalizer};
    ///
    /// let normalizer = UriNormalizer::default();
    /// assert_eq!(normalizer.normalize_path("/user/123/edit?token=abc", Direction::Incoming), "/user/?/edit");
    /// assert_eq!(
    ///     normalizer.normalize_path("http://example.com/int/123", Direction::Outgoing),
    ///     "http://example.com/int/?"
    /// );
    /// ```
    #[must_use]
    pub fn normalize_path(&self, path: &str, direction: Direction) -> String {
        if path.is_empty() || path == "/" {
            return "/".to_string();
        }

        let mut path = sanitize_url(path, false);

        // Pure paths always get a leading slash, URLs with an RFC 3986 scheme are preserved.
        if !path.starts_with('/') && !SCHEME_REGEX.is_match(&path) {
            path.insert(0, '/');
        }

        match &self.rules {
            Rules::Legacy(legacy) => legacy.normalize(&path),
            Rules::Modern(rules) => rules.apply(&path, direction),
        }
    }

    #[must_use]
    pub fn normalize_incoming(&self, path: &str) -> String {
        self.normalize_path(path, Direction::Incoming)
    }

    #[must_use]
    pub fn normalize_outgoing(&self, path: &str) -> String {
        self.normalize_path(path, Direction::Outgoing)
    }

    /// Resource name of an incoming HTTP request, e.g. `GET /user/?`.
    ///
    /// The method is trimmed and upper-cased, so `get` and `GET` name the same
    /// resource. Without a method only the normalized path is returned.
    #[must_use]
    pub fn http_resource_name(&self, method: &str, uri: &str) -> String {
        let path = self.normalize_incoming(uri);
        let method = method.trim();
        if method.is_empty() {
            path
        } else {
            format!("{} {}", method.to_ascii_uppercase(), path)
        }
    }
}

static GLOBAL_NORMALIZER: OnceLock<UriNormalizer> = OnceLock::new();

/// Process-wide normalizer, built from the environment on first use.
pub fn global() -> &'static UriNormalizer {
    GLOBAL_NORMALIZER.get_or_init(UriNormalizer::from_env)
}

/// Normalizes the path of a request received by the traced service.
#[must_use]
pub fn normalize_incoming(path: &str) -> String {
    global().normalize_incoming(path)
}

/// Normalizes the path or URL of a request sent by the traced service.
#[must_use]
pub fn normalize_outgoing(path: &str) -> String {
    global().normalize_outgoing(path)
}

/// See [`UriNormalizer::http_resource_name`].
#[must_use]
pub fn http_resource_name(method: &str, uri: &str) -> String {
    global().http_resource_name(method, uri)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use duplicate::duplicate_item;
    use std::sync::{Arc, Mutex};
    use tracing_test::traced_test;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn modern(fragment_regexes: &[&str], incoming: &[&str], outgoing: &[&str]) -> UriNormalizer {
        UriNormalizer::new(&NormalizationMode::Modern {
            fragment_regexes: strings(fragment_regexes),
            incoming_mappings: strings(incoming),
            outgoing_mappings: strings(outgoing),
        })
    }

    #[duplicate_item(
        test_name                           input                                                       expected;
        [test_empty_path]                   [""]                                                        ["/"];
        [test_root_path]                    ["/"]                                                       ["/"];
        [test_only_query_string]            ["?a=1"]                                                    ["/"];
        [test_plain_path]                   ["/some/path/Name"]                                         ["/some/path/Name"];
        [test_integer]                      ["/user/12345/x"]                                           ["/user/?/x"];
        [test_integer_trailing_slash]       ["/int/123/"]                                               ["/int/?/"];
        [test_integer_like_word]            ["/int-123/abc"]                                            ["/int-123/abc"];
        [test_uuid]                         ["/item/550e8400-e29b-41d4-a716-446655440000"]              ["/item/?"];
        [test_uuid_without_hyphens]         ["/item/550e8400e29b41d4a716446655440000"]                  ["/item/?"];
        [test_uuid_invalid_version]         ["/item/550e8400-e29b-61d4-a716-446655440000"]              ["/item/550e8400-e29b-61d4-a716-446655440000"];
        [test_hex_token]                    ["/token/deadBEEF00"]                                       ["/token/?"];
        [test_hex_too_short]                ["/token/dead00"]                                           ["/token/dead00"];
        [test_empty_fragments_preserved]    ["/a//123//b/"]                                             ["/a//?//b/"];
        [test_missing_leading_slash]        ["user/123"]                                                ["/user/?"];
        [test_query_string_removed]         ["/user/123/edit?token=abc"]                                ["/user/?/edit"];
        [test_full_url_preserved]           ["http://example.com/int/123"]                              ["http://example.com/int/?"];
        [test_full_url_credentials]         ["https://user:pw@example.com/u/42?x=1"]                    ["https://?:?@example.com/u/?"];
        [test_scheme_must_be_lowercase]     ["Http://example.com/1"]                                    ["/Http://example.com/?"];
    )]
    #[test]
    fn test_name() {
        let normalizer = UriNormalizer::default();
        assert_eq!(normalizer.normalize_incoming(input), expected);
        assert_eq!(normalizer.normalize_outgoing(input), expected);
    }

    #[test]
    fn test_incoming_mapping() {
        let normalizer = modern(&[], &["user/*"], &[]);
        assert_eq!(
            normalizer.normalize_incoming("/user/alice/edit"),
            "/user/?/edit"
        );
        assert_eq!(
            normalizer.normalize_incoming("/api/user/bob"),
            "/api/user/?"
        );
    }

    #[test]
    fn test_mapping_wildcard_in_the_middle() {
        let normalizer = modern(&[], &["*/profile"], &[]);
        assert_eq!(
            normalizer.normalize_incoming("/user/alice/profile"),
            "/user/?/profile"
        );
    }

    #[test]
    fn test_mapping_stops_at_query_and_fragment_characters() {
        let normalizer = modern(&[], &["page/*"], &[]);
        assert_eq!(
            normalizer.normalize_incoming("/page/intro#top"),
            "/page/?#top"
        );
    }

    #[test]
    fn test_mapping_is_applied_globally() {
        let normalizer = modern(&[], &["name/*"], &[]);
        assert_eq!(
            normalizer.normalize_incoming("/name/a/name/b"),
            "/name/?/name/?"
        );
    }

    #[test]
    fn test_mappings_are_applied_sequentially() {
        // `b/*` no longer matches once `a/*` rewrote `/a/b`.
        let normalizer = modern(&[], &["a/*", "b/*"], &[]);
        assert_eq!(normalizer.normalize_incoming("/a/b/c"), "/a/?/c");

        let normalizer = modern(&[], &["b/*", "a/*"], &[]);
        assert_eq!(normalizer.normalize_incoming("/a/b/c"), "/a/?/?");
    }

    #[test]
    fn test_mapping_directions_are_isolated() {
        let normalizer = modern(&[], &["in/*"], &["out/*"]);
        assert_eq!(normalizer.normalize_incoming("/in/x/out/y"), "/in/?/out/y");
        assert_eq!(normalizer.normalize_outgoing("/in/x/out/y"), "/in/x/out/?");
    }

    #[test]
    fn test_blank_mappings_are_skipped() {
        let normalizer = modern(&[], &["  ", "", "user/*"], &[]);
        assert_eq!(normalizer.normalize_incoming("/user/bob"), "/user/?");
    }

    #[test]
    fn test_mapping_characters_keep_regex_meaning() {
        let normalizer = modern(&[], &["v1.0/*"], &[]);
        assert_eq!(normalizer.normalize_incoming("/v1x0/abc"), "/v1.0/?");
    }

    #[test]
    fn test_mapping_replacement_is_literal() {
        let normalizer = modern(&[], &["cost/*"], &[]);
        assert_eq!(normalizer.normalize_incoming("/cost/$5"), "/cost/?");
    }

    #[test]
    fn test_mapping_on_full_url() {
        let normalizer = modern(&[], &[], &["repos/*"]);
        assert_eq!(
            normalizer.normalize_outgoing("https://api.github.com/repos/datadog/issues"),
            "https://api.github.com/repos/?/issues"
        );
    }

    #[test]
    fn test_custom_fragment_regex() {
        let normalizer = modern(&["^[a-z]{2}-[0-9a-z]+$"], &[], &[]);
        assert_eq!(
            normalizer.normalize_incoming("/orders/eu-a1b2/items/Name"),
            "/orders/?/items/Name"
        );
    }

    #[test]
    fn test_custom_fragment_regex_delimiters_are_optional() {
        for pattern in ["/^sku-[0-9]+$/", " ^sku-[0-9]+$ ", "^sku-[0-9]+$"] {
            let normalizer = modern(&[pattern], &[], &[]);
            assert_eq!(normalizer.normalize_incoming("/p/sku-99/x"), "/p/?/x");
        }
    }

    #[test]
    fn test_custom_fragment_regex_unicode_classes() {
        let normalizer = modern(&[r"^\d+$"], &[], &[]);
        assert_eq!(normalizer.normalize_incoming("/a/٣٤/b"), "/a/?/b");

        let normalizer = modern(&[r"^(?-u:\d)+$"], &[], &[]);
        assert_eq!(normalizer.normalize_incoming("/a/٣٤/b"), "/a/٣٤/b");
    }

    #[test]
    fn test_custom_fragment_regex_is_not_anchored() {
        let normalizer = modern(&["secret"], &[], &[]);
        assert_eq!(
            normalizer.normalize_incoming("/a/my-secret-thing/b"),
            "/a/?/b"
        );
    }

    #[test]
    fn test_custom_fragment_regex_runs_after_mappings() {
        let normalizer = modern(&["^[A-Z]+$"], &["user/*"], &[]);
        assert_eq!(
            normalizer.normalize_incoming("/user/bob/ADMIN"),
            "/user/?/?"
        );
    }

    #[test]
    fn test_empty_custom_fragment_regex_is_ignored() {
        let normalizer = modern(&["//", " / "], &[], &[]);
        assert_eq!(normalizer.normalize_incoming("/a/b"), "/a/b");
    }

    #[test]
    #[traced_test]
    fn test_invalid_fragment_regex_does_not_break_defaults() {
        let normalizer = modern(&["(unclosed", "^abc$"], &[], &[]);
        assert!(logs_contain("Invalid fragment regex '(unclosed'"));
        assert_eq!(normalizer.normalize_incoming("/abc/123/x"), "/?/?/x");
    }

    #[test]
    #[traced_test]
    fn test_unsupported_fragment_regex_syntax_is_ignored() {
        // Look-arounds are not supported, the pattern never matches.
        let normalizer = modern(&["^(?=foo)"], &[], &[]);
        assert!(logs_contain("Invalid fragment regex"));
        assert_eq!(normalizer.normalize_incoming("/foo/42"), "/foo/?");
    }

    #[test]
    #[traced_test]
    fn test_oversized_fragment_regex_is_rejected() {
        let normalizer = modern(&[r"(?:\w{500}){500}"], &[], &[]);
        assert!(logs_contain("Invalid fragment regex"));
        assert_eq!(normalizer.normalize_incoming("/w/1"), "/w/?");
    }

    #[test]
    #[traced_test]
    fn test_invalid_mapping_is_skipped() {
        let normalizer = modern(&[], &["bad(/*", "user/*"], &[]);
        assert!(logs_contain("Invalid URI mapping 'bad(/*'"));
        assert_eq!(normalizer.normalize_incoming("/user/bob"), "/user/?");
    }

    #[test]
    fn test_legacy_mode_uses_wildcard_legacy_normalizer() {
        let normalizer = UriNormalizer::new(&NormalizationMode::Legacy(strings(&[
            "/user/*/profile",
        ])));
        assert_eq!(
            normalizer.normalize_incoming("/user/alice/profile?tab=1"),
            "/user/?/profile"
        );
    }

    struct RecordingLegacyNormalizer {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl LegacyNormalizer for RecordingLegacyNormalizer {
        fn normalize(&self, path: &str) -> String {
            self.seen.lock().unwrap().push(path.to_string());
            format!("legacy:{path}")
        }
    }

    #[test]
    fn test_legacy_normalizer_gets_sanitized_path() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let normalizer = UriNormalizer::with_legacy_normalizer(Box::new(
            RecordingLegacyNormalizer { seen: seen.clone() },
        ));

        assert_eq!(
            normalizer.normalize_outgoing("user/123?q=1"),
            "legacy:/user/123"
        );
        assert_eq!(normalizer.normalize_incoming("/"), "/");
        assert_eq!(*seen.lock().unwrap(), vec!["/user/123".to_string()]);
    }

    #[test]
    fn test_from_config_resolves_mode() {
        let config = Config {
            trace_resource_uri_mapping: strings(&["/legacy/*"]),
            ..Default::default()
        };
        let normalizer = UriNormalizer::from_config(&config);
        assert_eq!(normalizer.normalize_incoming("/legacy/x/y"), "/legacy/?/y");

        let config = Config {
            trace_resource_uri_mapping_outgoing: strings(&["other/*"]),
            trace_resource_uri_mapping: strings(&["/legacy/*"]),
            ..Default::default()
        };
        let normalizer = UriNormalizer::from_config(&config);
        assert_eq!(normalizer.normalize_incoming("/legacy/x/y"), "/legacy/x/y");
    }

    #[duplicate_item(
        test_name                           method      uri                         expected;
        [test_resource_name_get]            ["GET"]     ["/user/42?x=1"]            ["GET /user/?"];
        [test_resource_name_lowercase]      [" post "]  ["/orders/deadbeef01"]      ["POST /orders/?"];
        [test_resource_name_no_method]      [""]        ["/health"]                 ["/health"];
        [test_resource_name_root]           ["HEAD"]    [""]                        ["HEAD /"];
    )]
    #[test]
    fn test_name() {
        assert_eq!(
            UriNormalizer::default().http_resource_name(method, uri),
            expected
        );
    }

    #[test]
    fn test_normalizer_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<UriNormalizer>();
    }
}
