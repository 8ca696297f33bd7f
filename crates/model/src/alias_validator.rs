//! Alias validation
//!
//! Stateless checks that a proposed alias name, routing, and filter are
//! well-formed and non-conflicting. The name rule is shared with concrete
//! indices and data streams; the functions here are the single home of that
//! rule.

use clustermeta_core::error::{MetadataError, Result};

use crate::lookup::IndexAbstraction;

/// Maximum byte length of an index, alias, or data-stream name
pub const MAX_NAME_BYTES: usize = 255;

const FORBIDDEN_CHARS: &[char] = &[
    '\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#', ':',
];

/// Shared index-or-alias name rule
///
/// `kind` names the entity in error messages ("alias", "index",
/// "data stream").
pub fn validate_index_or_alias_name(kind: &str, name: &str) -> Result<()> {
    let fail = |reason: String| {
        Err(MetadataError::InvalidInput(format!(
            "invalid {} name [{}]: {}",
            kind, name, reason
        )))
    };
    if name.is_empty() {
        return fail("must not be empty".to_string());
    }
    if name == "." || name == ".." {
        return fail("must not be '.' or '..'".to_string());
    }
    if name.starts_with('_') || name.starts_with('-') || name.starts_with('+') {
        return fail("must not start with '_', '-', or '+'".to_string());
    }
    if name.chars().any(|c| c.is_uppercase()) {
        return fail("must be lowercase".to_string());
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return fail(format!("must not contain [{}]", c));
    }
    if name.len() > MAX_NAME_BYTES {
        return fail(format!("name is too long, ({} > {})", name.len(), MAX_NAME_BYTES));
    }
    Ok(())
}

/// Checks that do not need the indices lookup
///
/// The alias name must satisfy the shared name rule; index routing, if set,
/// must not contain commas (a routing list would silently fan writes out).
pub fn validate_alias_standalone(alias: &str, index_routing: Option<&str>) -> Result<()> {
    if alias.is_empty() {
        return Err(MetadataError::InvalidAliasName {
            name: alias.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    validate_index_or_alias_name("alias", alias).map_err(|e| match e {
        MetadataError::InvalidInput(msg) => MetadataError::InvalidAliasName {
            name: alias.to_string(),
            reason: msg,
        },
        other => other,
    })?;
    if let Some(routing) = index_routing {
        if routing.contains(',') {
            return Err(MetadataError::InvalidInput(format!(
                "alias [{}] has several index routing values associated with it",
                alias
            )));
        }
    }
    Ok(())
}

/// Full alias validation against the indices lookup
///
/// Runs the standalone checks, requires a non-empty index name, and rejects
/// an alias whose name resolves to a concrete index.
pub fn validate_alias<'a, F>(
    alias: &str,
    index_name: &str,
    index_routing: Option<&str>,
    lookup: F,
) -> Result<()>
where
    F: Fn(&str) -> Option<&'a IndexAbstraction>,
{
    validate_alias_standalone(alias, index_routing)?;
    if index_name.is_empty() {
        return Err(MetadataError::InvalidInput(format!(
            "index name is required for alias [{}]",
            alias
        )));
    }
    if let Some(IndexAbstraction::ConcreteIndex { .. }) = lookup(alias) {
        return Err(MetadataError::InvalidAliasName {
            name: alias.to_string(),
            reason: "an index or data stream exists with the same name as the alias".to_string(),
        });
    }
    Ok(())
}

/// Validate an alias filter
///
/// The filter must parse as a JSON query object. Any failure is reported as
/// an alias-filter error naming the alias. Query compilation belongs to the
/// search layer; this core only guarantees the document is structurally a
/// query.
pub fn validate_alias_filter(alias: &str, filter: &serde_json::Value) -> Result<()> {
    match filter {
        serde_json::Value::Object(map) if !map.is_empty() => Ok(()),
        _ => Err(MetadataError::InvalidInput(format!(
            "failed to parse filter for alias [{}]: filter must be a non-empty query object",
            alias
        ))),
    }
}

/// Parse and validate an alias filter from raw bytes
pub fn validate_alias_filter_bytes(alias: &str, filter: &[u8]) -> Result<serde_json::Value> {
    let parsed: serde_json::Value = serde_json::from_slice(filter).map_err(|e| {
        MetadataError::InvalidInput(format!("failed to parse filter for alias [{}]: {}", alias, e))
    })?;
    validate_alias_filter(alias, &parsed)?;
    Ok(parsed)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["logs", "logs-2024.01.01", "a", ".hidden", "x.y_z-1"] {
            validate_index_or_alias_name("index", name).unwrap();
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in [
            "",
            ".",
            "..",
            "_leading",
            "-leading",
            "+leading",
            "Upper",
            "with space",
            "with,comma",
            "with#hash",
            "with:colon",
            "slash/ed",
            "star*",
        ] {
            assert!(
                validate_index_or_alias_name("index", name).is_err(),
                "expected [{}] to be rejected",
                name
            );
        }
    }

    #[test]
    fn test_name_length_cap() {
        let long = "a".repeat(MAX_NAME_BYTES);
        validate_index_or_alias_name("index", &long).unwrap();
        let too_long = "a".repeat(MAX_NAME_BYTES + 1);
        assert!(validate_index_or_alias_name("index", &too_long).is_err());
    }

    #[test]
    fn test_standalone_rejects_comma_routing() {
        let err = validate_alias_standalone("logs", Some("a,b")).unwrap_err();
        assert!(err
            .to_string()
            .contains("several index routing values"));
    }

    #[test]
    fn test_standalone_accepts_plain_routing() {
        validate_alias_standalone("logs", Some("shard-7")).unwrap();
    }

    #[test]
    fn test_standalone_empty_alias() {
        let err = validate_alias_standalone("", None).unwrap_err();
        assert!(matches!(err, MetadataError::InvalidAliasName { .. }));
    }

    #[test]
    fn test_validate_alias_rejects_concrete_index_name() {
        let abstraction = IndexAbstraction::concrete_index("logs".to_string(), None);
        let err = validate_alias("logs", "some-index", None, |name| {
            if name == "logs" {
                Some(&abstraction)
            } else {
                None
            }
        })
        .unwrap_err();
        assert!(matches!(err, MetadataError::InvalidAliasName { .. }));
    }

    #[test]
    fn test_validate_alias_requires_index_name() {
        let err = validate_alias("logs", "", None, |_| None).unwrap_err();
        assert!(err.to_string().contains("index name is required"));
    }

    #[test]
    fn test_filter_must_be_object() {
        assert!(validate_alias_filter("a", &serde_json::json!({"term": {"x": 1}})).is_ok());
        assert!(validate_alias_filter("a", &serde_json::json!([])).is_err());
        assert!(validate_alias_filter("a", &serde_json::json!({})).is_err());
        assert!(validate_alias_filter("a", &serde_json::json!("str")).is_err());
    }

    #[test]
    fn test_filter_bytes_parse_error_names_alias() {
        let err = validate_alias_filter_bytes("my-alias", b"{notjson").unwrap_err();
        assert!(err.to_string().contains("my-alias"));
    }
}
