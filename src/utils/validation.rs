//! Common validation utilities shared across modules

/// Check if a string is empty or only whitespace
pub fn is_empty_or_whitespace(s: &str) -> bool {
    s.trim().is_empty()
}

/// Validate a rule prefix: non-empty, starts with '/', no whitespace or query part
pub fn validate_prefix(prefix: &str) -> Result<(), String> {
    if prefix.is_empty() {
        return Err("Prefix cannot be empty".to_string());
    }
    if !prefix.starts_with('/') {
        return Err(format!("Prefix must start with '/': {}", prefix));
    }
    if prefix.chars().any(|c| c.is_whitespace() || c == '?' || c == '#') {
        return Err(format!("Prefix cannot contain whitespace, '?' or '#': {}", prefix));
    }
    Ok(())
}

/// Environment variable names usable in `${NAME}` placeholders
pub fn is_valid_secret_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
