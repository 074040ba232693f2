//! # Item Provisioning
//!
//! Write-side counterpart to resolution: create (or upsert) items in the
//! upstream vault so their fields can be referenced by `op://` URIs. The
//! Connect-backed provisioner is preferred — it carries write access without
//! the hosted API's rate limits — with the service-account token as the
//! fallback transport.

mod account;
mod connect;

use std::collections::BTreeMap;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;

use crate::errors::Result;

pub use account::AccountProvisioner;
pub use connect::ConnectProvisioner;

const GENERATED_SECRET_LEN: usize = 24;

/// A field to create in a vault item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldSpec {
    /// Literal value; empty = generate a uniform-random secret
    #[serde(default)]
    pub value: String,
    /// Store as a concealed (password) field
    #[serde(default)]
    pub concealed: bool,
}

/// Input to [`Provision::provision`].
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub vault: String,
    pub item: String,
    /// `login`, `api_credentials`, or `secure_note`; anything else = login
    pub category: String,
    pub fields: BTreeMap<String, FieldSpec>,
}

/// Result of a successful provision.
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub vault_id: String,
    pub item_id: String,
    /// field name → `op://` URI
    pub refs: BTreeMap<String, String>,
}

/// A backend capable of creating vault items.
#[async_trait]
pub trait Provision: Send + Sync {
    /// Short transport label for the health response (`connect` or `sdk`).
    fn kind(&self) -> &'static str;

    /// Create the item, or add any missing fields to an existing item with
    /// the same title (upsert).
    async fn provision(&self, req: &ProvisionRequest) -> Result<ProvisionOutcome>;
}

/// Uniform-random alphanumeric secret for fields provisioned without a value.
pub(crate) fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LEN)
        .map(char::from)
        .collect()
}

/// Field names that suggest the value should be concealed.
pub(crate) fn is_likely_secret(name: &str) -> bool {
    let lower = name.to_lowercase();
    ["password", "passwd", "secret", "token", "key", "credential", "private"]
        .iter()
        .any(|w| lower.contains(w))
}

/// Map a user-supplied category to the upstream constant.
pub(crate) fn upstream_category(category: &str) -> &'static str {
    match category.to_lowercase().as_str() {
        "api_credentials" | "api-credentials" | "apicredentials" => "API_CREDENTIAL",
        "secure_note" | "secure-note" | "securenote" | "note" => "SECURE_NOTE",
        _ => "LOGIN",
    }
}

pub(crate) fn op_uri(vault: &str, item: &str, field: &str) -> String {
    format!("op://{vault}/{item}/{field}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret_is_alphanumeric() {
        let s = generate_secret();
        assert_eq!(s.len(), GENERATED_SECRET_LEN);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_secret(), generate_secret());
    }

    #[test]
    fn test_is_likely_secret() {
        assert!(is_likely_secret("password"));
        assert!(is_likely_secret("API_KEY"));
        assert!(is_likely_secret("db_credential"));
        assert!(!is_likely_secret("username"));
        assert!(!is_likely_secret("hostname"));
    }

    #[test]
    fn test_upstream_category() {
        assert_eq!(upstream_category("api_credentials"), "API_CREDENTIAL");
        assert_eq!(upstream_category("secure-note"), "SECURE_NOTE");
        assert_eq!(upstream_category("login"), "LOGIN");
        assert_eq!(upstream_category(""), "LOGIN");
        assert_eq!(upstream_category("anything"), "LOGIN");
    }
}
