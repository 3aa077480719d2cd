/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Normalize a human-entered key for matching: lowercase with all whitespace removed. Used for both catalog item
/// lookups and intent keyword comparisons, so "Green Hug" and "greenhug" collide on purpose.
pub fn normalize_key(value: &str) -> String {
    value.to_lowercase().split_whitespace().collect()
}
