//! Evaluates a single condition block against a resource and the caller's identity.

use crate::{
    identity::{check_roles, check_subjects},
    kind::check_kind,
    Request,
};
use admission_policy_k8s_api::{
    labels::InvalidSelector, wildcard, DynamicObject, Labels, ResourceDescription, UserInfo,
};
use std::collections::BTreeMap;

const NAMESPACE_KIND: &str = "Namespace";

/// A reason a resource does not match a condition block (or a rule).
///
/// The display strings double as user-facing diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Mismatch {
    #[error("operation does not match")]
    Operation,

    #[error("kind does not match [{}]", .0.join(" "))]
    Kind(Vec<String>),

    #[error("name does not match")]
    Name,

    #[error("none of the names match")]
    Names,

    #[error("namespace does not match")]
    Namespace,

    #[error("annotations does not match")]
    Annotations,

    #[error("failed to parse selector: {0}")]
    InvalidSelector(InvalidSelector),

    #[error("selector does not match")]
    Selector,

    #[error("failed to parse namespace selector: {0}")]
    InvalidNamespaceSelector(InvalidSelector),

    #[error("namespace selector does not match labels")]
    NamespaceSelector,

    #[error("user info does not match roles for the given conditionBlock")]
    Roles,

    #[error("user info does not match clustersRoles for the given conditionBlock")]
    ClusterRoles,

    #[error("user info does not match subject for the given conditionBlock")]
    Subjects,

    #[error("no resource matched")]
    NoneMatched,

    #[error("match cannot be empty")]
    EmptyMatch,

    #[error("resource excluded since one of the criteria excluded it")]
    Excluded,

    #[error("resource excluded since the combination of all criteria exclude it")]
    ExcludedByAll,
}

/// Checks a resource against one condition block, returning every reason it does not match.
///
/// An empty result means the block matches. Resource attributes are ANDed, with list-valued
/// attributes ORed internally. Each non-empty caller constraint (roles, cluster roles,
/// subjects) is checked independently and contributes its own reason when unsatisfied, so a
/// caller must satisfy all of the constraints a block declares.
pub fn check_condition_block(
    description: &ResourceDescription,
    user_info: &UserInfo,
    resource: &DynamicObject,
    request: &Request,
) -> Vec<Mismatch> {
    if !description.operations.is_empty() {
        let matches = request
            .operation
            .map(|op| description.operations.contains(&op))
            .unwrap_or(false);
        if !matches {
            return vec![Mismatch::Operation];
        }
    }

    let mut reasons = Vec::new();
    let kind = resource_kind(resource);

    // Ephemeral containers are matched implicitly for backward compatibility.
    if !description.kinds.is_empty()
        && !check_kind(&description.kinds, &request.gvk, &request.subresource, true)
    {
        reasons.push(Mismatch::Kind(description.kinds.clone()));
    }

    let name = resource_name(resource);
    if let Some(pattern) = description.name.as_deref().filter(|n| !n.is_empty()) {
        if !wildcard::matches(pattern, name) {
            reasons.push(Mismatch::Name);
        }
    }

    if !description.names.is_empty()
        && !description
            .names
            .iter()
            .any(|pattern| wildcard::matches(pattern, name))
    {
        reasons.push(Mismatch::Names);
    }

    if !description.namespaces.is_empty() {
        // A namespace's own name stands in for its namespace.
        let namespace = if kind == NAMESPACE_KIND {
            name
        } else {
            resource.metadata.namespace.as_deref().unwrap_or_default()
        };
        if !description
            .namespaces
            .iter()
            .any(|pattern| wildcard::matches(pattern, namespace))
        {
            reasons.push(Mismatch::Namespace);
        }
    }

    if !description.annotations.is_empty() {
        let annotations = resource.metadata.annotations.as_ref();
        if !check_annotations(&description.annotations, annotations) {
            reasons.push(Mismatch::Annotations);
        }
    }

    if let Some(selector) = description.selector.as_ref() {
        let labels = Labels::from(resource.metadata.labels.as_ref());
        match selector.try_matches(&labels) {
            Ok(true) => {}
            Ok(false) => reasons.push(Mismatch::Selector),
            Err(error) => reasons.push(Mismatch::InvalidSelector(error)),
        }
    }

    if let Some(selector) = description.namespace_selector.as_ref() {
        // Namespaces have no namespace to select, and kindless resources can only be
        // namespace-selected by a wildcard kind.
        let applicable = kind != NAMESPACE_KIND
            && (!kind.is_empty() || description.kinds.iter().any(|k| k == "*"));
        if applicable {
            match selector.try_matches(&request.namespace_labels) {
                Ok(true) => {}
                Ok(false) => reasons.push(Mismatch::NamespaceSelector),
                Err(error) => reasons.push(Mismatch::InvalidNamespaceSelector(error)),
            }
        }
    }

    let identity = &request.identity;
    if !user_info.roles.is_empty() && !check_roles(&user_info.roles, &identity.roles) {
        reasons.push(Mismatch::Roles);
    }

    if !user_info.cluster_roles.is_empty()
        && !check_roles(&user_info.cluster_roles, &identity.cluster_roles)
    {
        reasons.push(Mismatch::ClusterRoles);
    }

    if !user_info.subjects.is_empty() && !check_subjects(&user_info.subjects, &identity.user) {
        reasons.push(Mismatch::Subjects);
    }

    reasons
}

/// Every expected annotation glob pair must match some annotation on the resource.
fn check_annotations(
    expected: &BTreeMap<String, String>,
    actual: Option<&BTreeMap<String, String>>,
) -> bool {
    expected.iter().all(|(key, value)| {
        actual.into_iter().flatten().any(|(k, v)| {
            wildcard::matches(key, k) && wildcard::matches(value, v)
        })
    })
}

pub(crate) fn resource_kind(resource: &DynamicObject) -> &str {
    resource
        .types
        .as_ref()
        .map(|t| t.kind.as_str())
        .unwrap_or_default()
}

/// The resource's name, falling back to its generate-name prefix.
fn resource_name(resource: &DynamicObject) -> &str {
    match resource.metadata.name.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => resource
            .metadata
            .generate_name
            .as_deref()
            .unwrap_or_default(),
    }
}
