//! Node selector term matching
//!
//! Follows Kubernetes node affinity semantics: every label requirement of a
//! term must hold against the node labels and every field requirement
//! against the node fields. Invalid requirements never raise an error, they
//! simply make the term select nothing.

use k8s_openapi::api::core::v1::{NodeSelectorRequirement, NodeSelectorTerm};
use std::collections::BTreeMap;

/// String map used for both node labels and node fields
pub type LabelSet = BTreeMap<String, String>;

/// Check whether a single term selects a node with the given labels and fields
pub fn matches_term(term: &NodeSelectorTerm, labels: &LabelSet, fields: &LabelSet) -> bool {
    let expressions = term.match_expressions.as_deref().unwrap_or_default();
    let field_requirements = term.match_fields.as_deref().unwrap_or_default();

    // An empty term selects no objects
    if expressions.is_empty() && field_requirements.is_empty() {
        return false;
    }

    let labels_match = expressions
        .iter()
        .all(|req| label_requirement_matches(req, labels).unwrap_or(false));
    if !labels_match {
        return false;
    }

    field_requirements
        .iter()
        .all(|req| field_requirement_matches(req, fields).unwrap_or(false))
}

/// Evaluate one label requirement; `None` marks an invalid requirement
fn label_requirement_matches(req: &NodeSelectorRequirement, labels: &LabelSet) -> Option<bool> {
    let values = req.values.as_deref().unwrap_or_default();
    let current = labels.get(&req.key);

    match req.operator.as_str() {
        "In" => {
            if values.is_empty() {
                return None;
            }
            Some(current.is_some_and(|v| values.contains(v)))
        }
        "NotIn" => {
            if values.is_empty() {
                return None;
            }
            Some(current.map_or(true, |v| !values.contains(v)))
        }
        "Exists" => {
            if !values.is_empty() {
                return None;
            }
            Some(current.is_some())
        }
        "DoesNotExist" => {
            if !values.is_empty() {
                return None;
            }
            Some(current.is_none())
        }
        "Gt" | "Lt" => {
            let [bound] = values else {
                return None;
            };
            let bound: i64 = bound.parse().ok()?;
            let Some(current) = current else {
                return Some(false);
            };
            let Ok(current) = current.parse::<i64>() else {
                return Some(false);
            };
            if req.operator == "Gt" {
                Some(current > bound)
            } else {
                Some(current < bound)
            }
        }
        _ => None,
    }
}

/// Evaluate one field requirement; only single-valued In/NotIn are valid
fn field_requirement_matches(req: &NodeSelectorRequirement, fields: &LabelSet) -> Option<bool> {
    let [value] = req.values.as_deref().unwrap_or_default() else {
        return None;
    };
    let current = fields.get(&req.key).map(String::as_str).unwrap_or("");

    match req.operator.as_str() {
        "In" => Some(current == value.as_str()),
        "NotIn" => Some(current != value.as_str()),
        _ => None,
    }
}
