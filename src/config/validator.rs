use crate::config::secrets::placeholder_names;
use crate::config::types::{Config, ProxyRule};
use crate::utils::validation::{is_valid_secret_name, validate_prefix};
use anyhow::{Context, Result, anyhow, bail};
use hyper::Uri;
use hyper::header::{HeaderName, HeaderValue};
use log::warn;
use std::collections::HashSet;
use std::net::SocketAddr;

impl Config {
    /// Validate the whole configuration before the server starts
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if self.rules.is_empty() {
            warn!("No proxy rules configured, every request will be served from {}", self.static_dir);
        }
        Self::validate_rules(&self.rules)
    }

    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse::<SocketAddr>().with_context(|| format!("Invalid listen address: {}", self.listen))
    }

    /// Check every rule and the table as a whole.
    ///
    /// Duplicate prefixes are an error. A rule shadowed by an earlier, shorter prefix
    /// can never match and is only reported.
    pub fn validate_rules(rules: &[ProxyRule]) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for (index, rule) in rules.iter().enumerate() {
            validate_prefix(&rule.prefix).map_err(|e| anyhow!(e))?;
            if !seen.insert(rule.prefix.as_str()) {
                bail!("Duplicate proxy prefix: {}", rule.prefix);
            }
            rule.validate().with_context(|| format!("Invalid rule for prefix {}", rule.prefix))?;

            if let Some(earlier) = rules[..index].iter().find(|r| rule.prefix.starts_with(r.prefix.as_str())) {
                warn!("Rule '{}' is unreachable, every matching path is taken by earlier rule '{}'", rule.prefix, earlier.prefix);
            }
        }
        Ok(())
    }
}

impl ProxyRule {
    /// Validate a single rule in isolation
    pub fn validate(&self) -> Result<()> {
        let uri = self.target.parse::<Uri>().with_context(|| format!("Invalid target URL: {}", self.target))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            Some(other) => bail!("Unsupported target scheme '{}', expected http or https", other),
            None => bail!("Target must be an absolute URL: {}", self.target),
        }
        if uri.authority().is_none() {
            bail!("Target is missing a host: {}", self.target);
        }
        if uri.query().is_some() {
            bail!("Target cannot carry a query string: {}", self.target);
        }

        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes()).with_context(|| format!("Invalid header name: {}", name))?;
            let names = placeholder_names(value);
            if let Some(bad) = names.iter().find(|n| !is_valid_secret_name(n)) {
                bail!("Invalid placeholder '{}' in header {}", bad, name);
            }
            if names.is_empty() {
                HeaderValue::from_str(value).with_context(|| format!("Invalid value for header {}", name))?;
            }
        }

        if !self.secure && uri.scheme_str() == Some("https") {
            warn!("TLS certificate validation is disabled for {} -> {}", self.prefix, self.target);
        }
        Ok(())
    }
}
