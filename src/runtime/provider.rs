//! Provider-qualified names.
//!
//! Entities are named `name@provider`. A bare reference is resolved in the
//! referrer's provider; a qualified one is used as is.

/// Separator between an entity name and its provider.
pub const PROVIDER_SEPARATOR: char = '@';

/// Provider tag of a qualified name, if any.
pub fn provider_name(name: &str) -> Option<&str> {
    name.rsplit_once(PROVIDER_SEPARATOR)
        .map(|(_, provider)| provider)
        .filter(|provider| !provider.is_empty())
}

/// Qualify `name` with `provider` unless it already carries one.
pub fn qualified_name(provider: Option<&str>, name: &str) -> String {
    match provider {
        Some(provider) if !name.contains(PROVIDER_SEPARATOR) => {
            format!("{name}{PROVIDER_SEPARATOR}{provider}")
        }
        _ => name.to_string(),
    }
}
