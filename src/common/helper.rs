//! Helper utilities and common functions

/// Normalize an identifier for case-insensitive lookups
pub fn normalize_identifier(name: &str) -> String {
    name.to_lowercase()
}

/// Quote an identifier for the local SQL dialect, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for the local SQL dialect
pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
