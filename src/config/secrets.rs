//! Secret lookup for `${NAME}` placeholders in rule header values.
//!
//! Credentials never live in the config file itself. A header such as
//! `"X-NCP-APIGW-API-KEY": "${NAVER_CLIENT_SECRET}"` is resolved once, when the
//! rule table is built, from whatever [`SecretSource`] the caller supplies.
//! The binary uses [`EnvSecrets`]; tests hand in a plain map of fake values.

use crate::utils::validation::is_valid_secret_name;
use anyhow::{Result, anyhow, bail};
use log::{debug, trace, warn};
use std::collections::HashMap;

pub trait SecretSource {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Reads secrets from the process environment, after loading `.env` if present.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl EnvSecrets {
    pub fn load() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => trace!("No .env file found"),
            Err(e) => warn!("Failed to load .env file: {}", e),
        }
        Self
    }
}

impl SecretSource for EnvSecrets {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl SecretSource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Replace every `${NAME}` in `value`. Text outside placeholders is kept verbatim.
pub fn expand_placeholders(value: &str, source: &dyn SecretSource) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| anyhow!("Unterminated placeholder in '{}'", value))?;
        let name = &after[..end];
        if !is_valid_secret_name(name) {
            bail!("Invalid placeholder name '{}'", name);
        }
        let secret = source.lookup(name).ok_or_else(|| anyhow!("Missing secret '{}'", name))?;
        out.push_str(&secret);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Names referenced by `value`, in order of appearance.
pub fn placeholder_names(value: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}
