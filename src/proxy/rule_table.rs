//! Ordered prefix rules and the per-request forwarding decision.
//!
//! The table is built once at startup and never mutated afterwards, so it can be
//! shared between connections behind an `Arc` without locking. [`ProxyRuleTable::forward`]
//! is pure: it only computes the [`UpstreamRequest`] descriptor, and sending it is left
//! to [`crate::proxy::upstream::UpstreamClient`].

use crate::config::secrets::{SecretSource, expand_placeholders, placeholder_names};
use crate::config::types::{Config, ProxyRule};
use crate::utils::path::{join_base_path, normalize_request_path};
use anyhow::{Context, Result, anyhow};
use hyper::Uri;
use hyper::header::{HOST, HeaderMap, HeaderName, HeaderValue};
use std::fmt::Display;

const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

#[derive(Debug, Clone)]
pub struct ProxyRuleTable {
    rules: Vec<CompiledRule>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: ProxyRule,
    // scheme://authority of the target, without base path
    origin: String,
    host: HeaderValue,
    base_path: String,
    static_headers: HeaderMap,
}

/// Outcome of matching one inbound request against the table
#[derive(Debug, Clone, PartialEq)]
pub enum Forward {
    Upstream(UpstreamRequest),
    /// No rule matched; the caller serves the request itself
    NoMatch,
}

/// Fully specified request for an upstream host
#[derive(Clone, PartialEq)]
pub struct UpstreamRequest {
    /// Prefix of the rule that matched
    pub prefix: String,
    /// `scheme://authority` of the upstream
    pub origin: String,
    /// Rewritten path and query, including the target's base path
    pub path: String,
    pub headers: HeaderMap,
    pub verify_tls: bool,
    pub xfwd: bool,
}

impl UpstreamRequest {
    pub fn url(&self) -> String {
        format!("{}{}", self.origin, self.path)
    }
}

// Header values are left out, they may be credentials
impl std::fmt::Debug for UpstreamRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamRequest")
            .field("prefix", &self.prefix)
            .field("origin", &self.origin)
            .field("path", &self.path)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("verify_tls", &self.verify_tls)
            .field("xfwd", &self.xfwd)
            .finish()
    }
}

impl ProxyRuleTable {
    /// Build the table, resolving header placeholders from `secrets`.
    ///
    /// Fails on invalid or duplicate rules and on any placeholder the source cannot resolve.
    pub fn new(rules: Vec<ProxyRule>, secrets: &dyn SecretSource) -> Result<Self> {
        Config::validate_rules(&rules)?;
        let rules = rules.into_iter().map(|rule| CompiledRule::compile(rule, secrets)).collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn from_config(config: &Config, secrets: &dyn SecretSource) -> Result<Self> {
        Self::new(config.get_rules().to_vec(), secrets)
    }

    /// Decide where a request goes. `path_and_query` is the request target as received.
    pub fn forward(&self, path_and_query: &str, headers: &HeaderMap) -> Forward {
        match self.find(path_and_query) {
            Some(compiled) => Forward::Upstream(compiled.build(path_and_query, headers)),
            None => Forward::NoMatch,
        }
    }

    /// First rule whose prefix matches `path`
    pub fn lookup(&self, path: &str) -> Option<&ProxyRule> {
        self.find(path).map(|c| &c.rule)
    }

    pub fn rules(&self) -> impl Iterator<Item = &ProxyRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn find(&self, path: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|c| c.rule.matches(path))
    }
}

impl CompiledRule {
    fn compile(rule: ProxyRule, secrets: &dyn SecretSource) -> Result<Self> {
        let uri = rule.target.parse::<Uri>().with_context(|| format!("Invalid target URL: {}", rule.target))?;
        let scheme = uri.scheme_str().ok_or_else(|| anyhow!("Target must be an absolute URL: {}", rule.target))?;
        let authority = uri.authority().ok_or_else(|| anyhow!("Target is missing a host: {}", rule.target))?;

        // Userinfo never goes into the Host header
        let host = match authority.port_u16() {
            Some(port) => format!("{}:{}", authority.host(), port),
            None => authority.host().to_string(),
        };
        let origin = format!("{}://{}", scheme, host);
        let base_path = uri.path().trim_end_matches('/').to_string();

        let mut static_headers = HeaderMap::new();
        for (name, value) in &rule.headers {
            let resolved =
                expand_placeholders(value, secrets).with_context(|| format!("Cannot resolve header {} for rule {}", name, rule.prefix))?;
            let header_name = HeaderName::from_bytes(name.as_bytes()).with_context(|| format!("Invalid header name: {}", name))?;
            let mut header_value = HeaderValue::from_str(&resolved).with_context(|| format!("Invalid value for header {}", name))?;
            if !placeholder_names(value).is_empty() {
                header_value.set_sensitive(true);
            }
            static_headers.insert(header_name, header_value);
        }

        Ok(Self { host: HeaderValue::from_str(&host)?, origin, base_path, static_headers, rule })
    }

    fn build(&self, path_and_query: &str, inbound: &HeaderMap) -> UpstreamRequest {
        let rewritten = normalize_request_path(self.rule.rewrite.apply(&self.rule.prefix, path_and_query));
        let path = join_base_path(&self.base_path, &rewritten);

        let mut headers = inbound.clone();
        if self.rule.xfwd {
            // Taken before the Host rewrite so the upstream sees what the browser asked for
            if let Some(host) = inbound.get(HOST) {
                headers.entry(X_FORWARDED_HOST).or_insert_with(|| host.clone());
            }
            headers.entry(X_FORWARDED_PROTO).or_insert_with(|| HeaderValue::from_static("http"));
        }
        if self.rule.change_origin {
            headers.insert(HOST, self.host.clone());
        }
        for (name, value) in self.static_headers.iter() {
            if self.rule.override_headers || !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }

        UpstreamRequest {
            prefix: self.rule.prefix.clone(),
            origin: self.origin.clone(),
            path,
            headers,
            verify_tls: self.rule.secure,
            xfwd: self.rule.xfwd,
        }
    }
}

impl Display for ProxyRuleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for c in &self.rules {
            let rule = &c.rule;
            write!(
                f,
                "{prefix} -> {target} ({rewrite}, tls {tls}, host {host})",
                prefix = rule.prefix,
                target = rule.target,
                rewrite = rule.rewrite,
                tls = if rule.secure { "verified" } else { "unverified" },
                host = if rule.change_origin { "rewritten" } else { "kept" },
            )?;
            if !c.static_headers.is_empty() {
                let names: Vec<&str> = c.static_headers.keys().map(|k| k.as_str()).collect();
                write!(f, " + headers [{}]", names.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
