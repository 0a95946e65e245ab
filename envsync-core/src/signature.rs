//! Change-detection signatures.
//!
//! A [`Signature`] is the SHA-256 of a canonical JSON rendering of a
//! template's signed content (`buildSpec`, `restrictions`,
//! `workspaceTools`). Canonical means: object keys sorted bytewise at every
//! depth, no insignificant whitespace, arrays kept in order. The result only
//! depends on the normalized definition, never on source key order, memory
//! layout or the clock.
//!
//! Signatures are stored on the platform as a revision tag:
//! `envsync-sig-v1-<64 hex>`.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::{BuildSpec, Restrictions, TemplateDefinition, WorkspaceTool};

/// Prefix reserved for signature tags. Bumping the version invalidates every
/// stored signature, which makes the next run revise all environments.
pub const TAG_PREFIX: &str = "envsync-sig-v1-";

/// Domain separator hashed ahead of the canonical document.
const DIGEST_DOMAIN: &[u8] = b"envsync.signature.v1\n";

/// Hex-encoded SHA-256 digest of a template's signed content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    /// Compute the signature of a definition. Pure: no I/O, no randomness.
    pub fn compute(def: &TemplateDefinition) -> Self {
        let content = SignedContent {
            build_spec: &def.build_spec,
            restrictions: &def.restrictions,
            workspace_tools: &def.workspace_tools,
        };
        // Serializing plain structs, strings, bools and integers cannot fail.
        let value = serde_json::to_value(&content).unwrap_or(Value::Null);

        let mut canonical = String::new();
        write_canonical(&value, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(DIGEST_DOMAIN);
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Parse a signature from its revision tag form.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let digest = tag.strip_prefix(TAG_PREFIX)?;
        let valid = digest.len() == 64
            && digest
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        valid.then(|| Self(digest.to_string()))
    }

    /// First signature tag found in `tags`, if any.
    pub fn find_in_tags<'a, I>(tags: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a String>,
    {
        tags.into_iter().find_map(|t| Self::from_tag(t))
    }

    /// Revision tag carrying this signature.
    pub fn to_tag(&self) -> String {
        format!("{TAG_PREFIX}{}", self.0)
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines and summaries.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedContent<'a> {
    build_spec: &'a BuildSpec,
    restrictions: &'a Restrictions,
    workspace_tools: &'a std::collections::BTreeMap<String, WorkspaceTool>,
}

/// Render `value` with sorted keys and no whitespace. Keys are sorted here,
/// independent of the `serde_json::Map` ordering feature.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnvironmentVariable, TemplateDefinition};
    use serde_json::json;

    fn def(image: &str) -> TemplateDefinition {
        TemplateDefinition::new("test_env", BuildSpec::from_image(image))
    }

    #[test]
    fn canonical_form_sorts_nested_keys() {
        let mut out = String::new();
        write_canonical(&json!({"b": {"z": 1, "a": [2, {"y": true, "x": null}]}, "a": "s"}), &mut out);
        assert_eq!(out, r#"{"a":"s","b":{"a":[2,{"x":null,"y":true}],"z":1}}"#);
    }

    #[test]
    fn signature_is_deterministic() {
        assert_eq!(Signature::compute(&def("A")), Signature::compute(&def("A")));
        assert_eq!(Signature::compute(&def("A")).as_hex().len(), 64);
    }

    #[test]
    fn build_spec_change_changes_signature() {
        assert_ne!(Signature::compute(&def("A")), Signature::compute(&def("B")));
    }

    #[test]
    fn name_and_source_are_not_signed() {
        let a = def("A");
        let mut b = def("A");
        b.name = "other".into();
        b.source = "elsewhere/environment.yaml".into();
        b.description = Some("docs".into());
        assert_eq!(Signature::compute(&a), Signature::compute(&b));
    }

    #[test]
    fn environment_variable_order_is_significant() {
        let var = |n: &str| EnvironmentVariable {
            name: n.into(),
            value: "1".into(),
        };
        let mut a = def("A");
        a.build_spec.environment_variables = vec![var("X"), var("Y")];
        let mut b = def("A");
        b.build_spec.environment_variables = vec![var("Y"), var("X")];
        assert_ne!(Signature::compute(&a), Signature::compute(&b));
    }

    #[test]
    fn restriction_change_changes_signature() {
        let a = def("A");
        let mut b = def("A");
        b.restrictions.is_restricted = true;
        assert_ne!(Signature::compute(&a), Signature::compute(&b));
    }

    #[test]
    fn tag_roundtrip() {
        let sig = Signature::compute(&def("A"));
        let tag = sig.to_tag();
        assert!(tag.starts_with(TAG_PREFIX));
        assert_eq!(Signature::from_tag(&tag), Some(sig));
    }

    #[test]
    fn from_tag_rejects_foreign_tags() {
        assert_eq!(Signature::from_tag("gpu"), None);
        assert_eq!(Signature::from_tag(&format!("{TAG_PREFIX}abc")), None);
        assert_eq!(Signature::from_tag(&format!("{TAG_PREFIX}{}", "G".repeat(64))), None);
    }

    #[test]
    fn find_in_tags_skips_user_tags() {
        let sig = Signature::compute(&def("A"));
        let tags = vec!["python".to_string(), sig.to_tag(), "gpu".to_string()];
        assert_eq!(Signature::find_in_tags(&tags), Some(sig));
        assert_eq!(Signature::find_in_tags(&vec!["x".to_string()]), None);
    }

    #[test]
    fn short_form_is_twelve_chars() {
        assert_eq!(Signature::compute(&def("A")).short().len(), 12);
    }
}
