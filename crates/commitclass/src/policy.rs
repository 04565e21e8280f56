//! Typed CommitClass model and decoding
//!
//! Objects arrive from the policy source as loosely typed JSON. They are
//! decoded into [`CommitClass`] only at resolution time, so the replica
//! never has to know what it is storing.

use k8s_openapi::api::core::v1::NodeSelectorTerm;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// API group of the CommitClass resource
pub const API_GROUP: &str = "node.k8s.io";
/// API version of the CommitClass resource
pub const API_VERSION: &str = "v1alpha1";
/// Kind of the CommitClass resource
pub const KIND: &str = "CommitClass";
/// Plural resource name used in API paths
pub const PLURAL: &str = "commitclasses";

/// Errors raised while turning snapshot objects into commit settings
#[derive(Debug, Error)]
pub enum CommitClassError {
    /// The stored object is not a JSON object at all
    #[error("unexpected CommitClass type: expected object, found {found}")]
    TypeMismatch { found: &'static str },

    /// The object is a JSON object but does not have the CommitClass shape
    #[error("invalid CommitClass JSON for {name:?}: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Over- or under-commit level for a set of resources on a group of nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitClass {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, deserialize_with = "null_as_default")]
    pub spec: CommitClassSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitClassSpec {
    /// Nodes this class applies to
    #[serde(default, deserialize_with = "null_as_default")]
    pub selector: NodeSelectorTerm,
    /// Resources with their commit percentages, in authored order
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources: Vec<ResourceCommitPercent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCommitPercent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub percent: i32,
}

/// Absent and `null` fields both decode to the zero value
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl CommitClass {
    /// Name used for ordering; unnamed objects sort first
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

/// Decode a snapshot object into a typed CommitClass
pub fn decode(object: &Value) -> Result<CommitClass, CommitClassError> {
    if !object.is_object() {
        return Err(CommitClassError::TypeMismatch {
            found: json_kind(object),
        });
    }

    CommitClass::deserialize(object).map_err(|source| CommitClassError::Decode {
        name: object
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>")
            .to_string(),
        source,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
