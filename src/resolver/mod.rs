//! # Secret Reference Resolution
//!
//! Parsing of `op://vault/item/field` references and env-template scanning /
//! substitution. The scanner and substitutor share one URI pattern so that a
//! reference found by [`scan_env`] is always replaceable by [`substitute`].

mod env;
mod uri;

pub use env::{scan_env, substitute};
pub use uri::{is_op_uri, parse_op_uri, SecretRef};
