use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "./devpx.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub(crate) path: PathBuf,
    // Address the dev server binds to
    #[serde(deserialize_with = "listen_or_default", default = "default_listen")]
    pub(crate) listen: String,
    // Directory served for requests no rule matches
    #[serde(deserialize_with = "static_dir_or_default", default = "default_static_dir")]
    pub(crate) static_dir: String,
    #[serde(deserialize_with = "index_file_or_default", default = "default_index_file")]
    pub(crate) index_file: String,
    #[serde(deserialize_with = "bool_or_true", default = "default_true")]
    pub(crate) spa_fallback: bool,
    // Checked in order, first match wins
    #[serde(default)]
    pub(crate) rules: Vec<ProxyRule>,
}

/// One forwarding rule: requests whose path starts with `prefix` go to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRule {
    pub(crate) prefix: String,

    pub(crate) target: String,

    #[serde(default)]
    pub(crate) rewrite: Rewrite,

    #[serde(deserialize_with = "bool_or_true", default = "default_true")]
    pub(crate) change_origin: bool,

    #[serde(deserialize_with = "bool_or_true", default = "default_true")]
    pub(crate) secure: bool,

    #[serde(deserialize_with = "bool_or_default", default)]
    pub(crate) xfwd: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) headers: BTreeMap<String, String>,

    #[serde(deserialize_with = "bool_or_default", default)]
    pub(crate) override_headers: bool,
}

/// Path transformation applied to a matched request before forwarding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rewrite {
    /// Remove the matched prefix once (`/api/list` -> `/list`)
    #[default]
    StripPrefix,
    /// Forward the path as received
    Keep,
    /// Swap the matched prefix for another (`/api/list` -> `/v2/list`)
    ReplacePrefix(String),
}

impl Rewrite {
    /// Apply the rewrite to `path`, which must start with `prefix`.
    pub fn apply(&self, prefix: &str, path: &str) -> String {
        let rest = path.strip_prefix(prefix).unwrap_or(path);
        match self {
            Rewrite::StripPrefix => rest.to_string(),
            Rewrite::Keep => path.to_string(),
            Rewrite::ReplacePrefix(replacement) => format!("{}{}", replacement, rest),
        }
    }
}

impl Display for Rewrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rewrite::StripPrefix => write!(f, "strip prefix"),
            Rewrite::Keep => write!(f, "keep"),
            Rewrite::ReplacePrefix(with) => write!(f, "replace prefix with '{}'", with),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH)
    }
}

impl Config {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().with_extension("json");
        Self {
            path,
            listen: default_listen(),
            static_dir: default_static_dir(),
            index_file: default_index_file(),
            spa_fallback: true,
            rules: builtin_rules(),
        }
    }

    pub fn get_path(&self) -> &PathBuf {
        &self.path
    }

    pub fn get_listen(&self) -> &str {
        &self.listen
    }

    pub fn set_listen(&mut self, listen: String) {
        self.listen = listen;
    }

    pub fn get_static_dir(&self) -> &str {
        &self.static_dir
    }

    pub fn set_static_dir(&mut self, static_dir: String) {
        self.static_dir = static_dir;
    }

    pub fn get_index_file(&self) -> &str {
        &self.index_file
    }

    pub fn is_spa_fallback(&self) -> bool {
        self.spa_fallback
    }

    pub fn get_rules(&self) -> &[ProxyRule] {
        &self.rules
    }

    pub fn with_rules(mut self, rules: Vec<ProxyRule>) -> Self {
        self.rules = rules;
        self
    }
}

impl ProxyRule {
    /// A rule with the dev-server defaults: strip the prefix, rewrite Host, verify TLS.
    pub fn new(prefix: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            target: target.into(),
            rewrite: Rewrite::StripPrefix,
            change_origin: true,
            secure: true,
            xfwd: false,
            headers: BTreeMap::new(),
            override_headers: false,
        }
    }

    pub fn rewrite(mut self, rewrite: Rewrite) -> Self {
        self.rewrite = rewrite;
        self
    }

    pub fn change_origin(mut self, change_origin: bool) -> Self {
        self.change_origin = change_origin;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn xfwd(mut self, xfwd: bool) -> Self {
        self.xfwd = xfwd;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn override_headers(mut self, override_headers: bool) -> Self {
        self.override_headers = override_headers;
        self
    }

    pub fn get_prefix(&self) -> &str {
        &self.prefix
    }

    pub fn get_target(&self) -> &str {
        &self.target
    }

    pub fn get_rewrite(&self) -> &Rewrite {
        &self.rewrite
    }

    pub fn is_change_origin(&self) -> bool {
        self.change_origin
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_xfwd(&self) -> bool {
        self.xfwd
    }

    pub fn get_headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn is_override_headers(&self) -> bool {
        self.override_headers
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(self.prefix.as_str())
    }
}

/// The three upstreams the front-end talks to during development.
///
/// Credentials are placeholders resolved from the environment at startup.
pub fn builtin_rules() -> Vec<ProxyRule> {
    vec![
        ProxyRule::new("/api", "https://apis.data.go.kr").secure(false),
        ProxyRule::new("/kepco", "https://bigdata.kepco.co.kr").secure(false),
        ProxyRule::new("/naver-api", "https://naveropenapi.apigw.ntruss.com")
            .secure(false)
            .header("X-NCP-APIGW-API-KEY-ID", "${NAVER_CLIENT_ID}")
            .header("X-NCP-APIGW-API-KEY", "${NAVER_CLIENT_SECRET}")
            .header("Accept", "application/json")
            .override_headers(true),
    ]
}

impl Display for Config {
    // Header values are redacted since they usually carry credentials
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut redacted = self.clone();
        for rule in redacted.rules.iter_mut() {
            for value in rule.headers.values_mut() {
                *value = redact(value);
            }
        }
        let json = serde_json::to_string_pretty(&redacted).map_err(|_| std::fmt::Error)?;
        writeln!(f, "{}", json)
    }
}

/// Placeholders are shown as-is, literal values are masked
pub(crate) fn redact(value: &str) -> String {
    if value.starts_with("${") && value.ends_with('}') {
        value.to_string()
    } else {
        "********".to_string()
    }
}

// Helper functions for deserialization
fn string_or<'de, D>(deserializer: D, fallback: fn() -> String) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match String::deserialize(deserializer) {
        Ok(s) => Ok(s),
        Err(e) => {
            let fallback = fallback();
            warn!("Failed to deserialize string value: {}, using '{}'", e, fallback);
            Ok(fallback)
        }
    }
}

fn listen_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    string_or(deserializer, default_listen)
}

fn static_dir_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    string_or(deserializer, default_static_dir)
}

fn index_file_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    string_or(deserializer, default_index_file)
}

// Forgiving bool: non-bool types fall back to false.
fn bool_or_default<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match bool::deserialize(deserializer) {
        Ok(b) => Ok(b),
        Err(e) => {
            warn!("Failed to deserialize bool value: {}, using false", e);
            Ok(false)
        }
    }
}

// Same as above for flags that default to on.
fn bool_or_true<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match bool::deserialize(deserializer) {
        Ok(b) => Ok(b),
        Err(e) => {
            warn!("Failed to deserialize bool value: {}, using true", e);
            Ok(true)
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:5173".to_string()
}

fn default_static_dir() -> String {
    "./dist".to_string()
}

fn default_index_file() -> String {
    "index.html".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = Config::new("./test_config.json");
        assert_eq!(config.get_listen(), "127.0.0.1:5173");
        assert_eq!(config.get_static_dir(), "./dist");
        assert_eq!(config.get_index_file(), "index.html");
        assert!(config.is_spa_fallback());
        assert_eq!(config.get_rules().len(), 3);
    }

    #[test]
    fn test_builtin_rules_order_and_shape() {
        let rules = builtin_rules();
        let prefixes: Vec<&str> = rules.iter().map(|r| r.get_prefix()).collect();
        assert_eq!(prefixes, vec!["/api", "/kepco", "/naver-api"]);

        for rule in &rules {
            assert!(rule.is_change_origin());
            assert!(!rule.is_secure());
            assert_eq!(rule.get_rewrite(), &Rewrite::StripPrefix);
        }

        assert!(!rules[0].is_override_headers());
        assert!(!rules[1].is_override_headers());
        assert!(rules[2].is_override_headers());
        assert!(rules[0].get_headers().is_empty());
        assert!(rules[1].get_headers().is_empty());
        let naver = rules[2].get_headers();
        assert_eq!(naver.get("X-NCP-APIGW-API-KEY-ID").unwrap(), "${NAVER_CLIENT_ID}");
        assert_eq!(naver.get("X-NCP-APIGW-API-KEY").unwrap(), "${NAVER_CLIENT_SECRET}");
        assert_eq!(naver.get("Accept").unwrap(), "application/json");
    }

    #[test]
    fn test_rewrite_apply() {
        assert_eq!(Rewrite::StripPrefix.apply("/api", "/api/festival/list?page=1"), "/festival/list?page=1");
        assert_eq!(Rewrite::StripPrefix.apply("/api", "/api"), "");
        assert_eq!(Rewrite::Keep.apply("/api", "/api/list"), "/api/list");
        assert_eq!(Rewrite::ReplacePrefix("/v2".to_string()).apply("/api", "/api/list"), "/v2/list");
    }

    #[test]
    fn test_rewrite_strips_prefix_only_once() {
        assert_eq!(Rewrite::StripPrefix.apply("/api", "/api/api/list"), "/api/list");
    }

    #[test]
    fn test_rule_deserialize_defaults() {
        let rule: ProxyRule = serde_json::from_str(r#"{"prefix": "/api", "target": "https://example.com"}"#).unwrap();
        assert_eq!(rule, ProxyRule::new("/api", "https://example.com"));
    }

    #[test]
    fn test_rule_deserialize_rewrite_variants() {
        let keep: ProxyRule = serde_json::from_str(r#"{"prefix": "/a", "target": "http://x", "rewrite": "keep"}"#).unwrap();
        assert_eq!(keep.get_rewrite(), &Rewrite::Keep);

        let replace: ProxyRule =
            serde_json::from_str(r#"{"prefix": "/a", "target": "http://x", "rewrite": {"replace_prefix": "/b"}}"#).unwrap();
        assert_eq!(replace.get_rewrite(), &Rewrite::ReplacePrefix("/b".to_string()));
    }

    #[test]
    fn test_malformed_strings_fall_back_to_field_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"listen": 5, "static_dir": false, "index_file": [], "rules": []}"#).unwrap();
        assert_eq!(config.get_listen(), "127.0.0.1:5173");
        assert_eq!(config.get_static_dir(), "./dist");
        assert_eq!(config.get_index_file(), "index.html");
        assert!(config.listen_addr().is_ok());
    }

    #[test]
    fn test_forgiving_bool_fields() {
        let rule: ProxyRule =
            serde_json::from_str(r#"{"prefix": "/a", "target": "http://x", "secure": "no", "xfwd": 3}"#).unwrap();
        assert!(rule.is_secure());
        assert!(!rule.is_xfwd());
    }

    #[test]
    fn test_rules_keep_declaration_order() {
        let json = r#"{"rules": [
            {"prefix": "/z", "target": "http://z"},
            {"prefix": "/a", "target": "http://a"},
            {"prefix": "/m", "target": "http://m"}
        ]}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let prefixes: Vec<&str> = config.get_rules().iter().map(|r| r.get_prefix()).collect();
        assert_eq!(prefixes, vec!["/z", "/a", "/m"]);
    }

    #[test]
    fn test_display_redacts_literal_header_values() {
        let config = Config::default().with_rules(vec![
            ProxyRule::new("/a", "http://x").header("X-Key", "super-secret").header("X-Id", "${KEY_ID}"),
        ]);
        let shown = config.to_string();
        assert!(!shown.contains("super-secret"));
        assert!(shown.contains("********"));
        assert!(shown.contains("${KEY_ID}"));
    }

    #[test]
    fn test_rule_matches_is_literal_prefix() {
        let rule = ProxyRule::new("/api", "http://x");
        assert!(rule.matches("/api"));
        assert!(rule.matches("/api/list"));
        assert!(rule.matches("/apis"));
        assert!(!rule.matches("/static/api"));
    }
}
