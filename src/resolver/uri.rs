//! `op://` URI parsing.

use crate::errors::{Error, Result};

const OP_SCHEME: &str = "op://";

/// A parsed `op://vault/item/field` reference.
///
/// All four fields are non-empty and `raw` is always the exact
/// `op://` + vault + `/` + item + `/` + field form the reference was parsed
/// from. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    pub vault: String,
    pub item: String,
    pub field: String,
    pub raw: String,
}

impl SecretRef {
    /// Canonical cache key for this reference: `vault/item/field`.
    pub fn cache_key(&self) -> String {
        format!("{}/{}/{}", self.vault, self.item, self.field)
    }
}

impl std::fmt::Display for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Returns true if the value starts with `op://`.
pub fn is_op_uri(value: &str) -> bool {
    value.starts_with(OP_SCHEME)
}

/// Parse an `op://` URI into vault, item, and field components.
///
/// Format: `op://VaultName/ItemName/FieldName`. Fails with
/// [`Error::InvalidUri`] unless the path splits into exactly three non-empty
/// segments.
pub fn parse_op_uri(uri: &str) -> Result<SecretRef> {
    let path = uri.strip_prefix(OP_SCHEME).ok_or_else(|| Error::InvalidUri { uri: uri.to_string() })?;
    let mut parts = path.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(vault), Some(item), Some(field))
            if !vault.is_empty() && !item.is_empty() && !field.is_empty() =>
        {
            Ok(SecretRef {
                vault: vault.to_string(),
                item: item.to_string(),
                field: field.to_string(),
                raw: uri.to_string(),
            })
        }
        _ => Err(Error::InvalidUri { uri: uri.to_string() }),
    }
}
