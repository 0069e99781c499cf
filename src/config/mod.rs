// Configuration module
//
// This module contains all configuration-related functionality split into focused submodules:
// - types: Core configuration structures and the built-in rule set
// - loader: Configuration file loading and saving
// - secrets: Placeholder expansion for credential headers
// - validator: Configuration validation logic

pub mod loader;
pub mod secrets;
pub mod types;
pub mod validator;

pub use secrets::{EnvSecrets, SecretSource};
pub use types::{Config, ProxyRule, Rewrite};
