//! Strongly-typed identifier newtypes for the fal queue.
//!
//! All types implement `From<&str>`, `From<String>`, and `Into<String>` and
//! serialize/deserialize as plain strings.
//!
//! ```ignore
//! use fal_queue::{ModelId, RequestId};
//!
//! let model: ModelId = "fal-ai/flux/dev".into();
//! let request: RequestId = "764cabcf-b745-4b3e-ae38-1200304cf45b".into();
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declares trimmed string newtypes that round-trip through serde as plain strings.
macro_rules! string_id_type {
    ($($(#[$meta:meta])* $name:ident;)+) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.len() == value.len() {
                    Self(value)
                } else {
                    Self(trimmed.to_string())
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when nothing but whitespace was supplied.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    )+};
}

string_id_type! {
    /// Model endpoint identifier such as `fal-ai/flux/dev`.
    ModelId;
    /// Opaque queue request identifier issued by fal on submit.
    RequestId;
}

/// Endpoint namespaces whose app root spans `namespace/owner/alias`.
const NAMESPACES: &[&str] = &["workflows", "comfy"];

impl ModelId {
    /// The `owner/alias` prefix of the endpoint, or `namespace/owner/alias` for
    /// namespaced endpoints such as `workflows/...` and `comfy/...`.
    ///
    /// Queue status and result routes live under the app root, not under the
    /// full endpoint path: `fal-ai/flux/dev` polls `fal-ai/flux/requests/...`.
    /// Shorter identifiers are returned unchanged.
    pub fn app_root(&self) -> &str {
        let trimmed = self.0.trim_matches('/');
        let segments = match trimmed.split('/').next() {
            Some(ns) if NAMESPACES.contains(&ns) => 3,
            _ => 2,
        };
        match trimmed.match_indices('/').nth(segments - 1) {
            Some((idx, _)) => &trimmed[..idx],
            None => trimmed,
        }
    }
}
