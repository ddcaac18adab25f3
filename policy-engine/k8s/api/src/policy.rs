use crate::labels::Selector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

/// Describes the resources a match or exclude block applies to.
///
/// Attributes are ANDed together; list-valued attributes are ORed internally. An empty
/// description matches every resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescription {
    /// Kind selectors, e.g. `Pod`, `apps/v1/Deployment`, or `Pod/status`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<String>,

    /// A name glob. Deprecated in favor of `names`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,

    /// Annotation key/value globs. Every entry must be satisfied.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<Selector>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<Operation>,
}

/// The admission operations a block may be restricted to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

/// Describes the callers a match or exclude block applies to. Empty means any caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<Subject>,
}

/// An RBAC subject.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub kind: SubjectKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum SubjectKind {
    User,
    Group,
    ServiceAccount,
}

/// One condition block: a resource description paired with caller constraints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ResourceFilter {
    #[serde(flatten)]
    pub user_info: UserInfo,

    #[serde(default)]
    pub resources: ResourceDescription,
}

/// A set of condition blocks combined with `any` (OR) or `all` (AND) semantics.
///
/// When neither list is populated, the inline `resources` and user fields form a single
/// implicit block. `any` and `all` are not expected to be populated together; `any` wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct MatchResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any: Vec<ResourceFilter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all: Vec<ResourceFilter>,

    #[serde(flatten)]
    pub user_info: UserInfo,

    #[serde(default)]
    pub resources: ResourceDescription,
}

/// The combinator a [`MatchResources`] resolves to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filters<'a> {
    Any(&'a [ResourceFilter]),
    All(&'a [ResourceFilter]),
    Single(ResourceFilter),
}

/// A single match/exclude unit of a policy. Rule bodies are evaluated elsewhere.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub name: String,

    #[serde(rename = "match", default)]
    pub match_resources: MatchResources,

    #[serde(rename = "exclude", default)]
    pub exclude_resources: MatchResources,
}

/// Kyverno's namespaced policy.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kyverno.io",
    version = "v1",
    kind = "Policy",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(default)]
    pub rules: Vec<Rule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,
}

/// Kyverno's cluster-wide policy. Shares its spec with [`Policy`].
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kyverno.io",
    version = "v1",
    kind = "ClusterPolicy",
    derive = "PartialEq"
)]
pub struct ClusterPolicySpec {
    #[serde(flatten)]
    pub policy: PolicySpec,
}

/// A policy of either scope, reduced to a shared spec and a scope tag.
#[derive(Clone, Debug, PartialEq)]
pub struct AnyPolicy {
    pub name: String,
    pub scope: PolicyScope,
    pub spec: Arc<PolicySpec>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyScope {
    Cluster,
    Namespaced(String),
}

// === impl ResourceDescription ===

impl ResourceDescription {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// === impl UserInfo ===

impl UserInfo {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.cluster_roles.is_empty() && self.subjects.is_empty()
    }
}

// === impl ResourceFilter ===

impl ResourceFilter {
    pub fn new(resources: ResourceDescription, user_info: UserInfo) -> Self {
        Self {
            user_info,
            resources,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.user_info.is_empty()
    }
}

impl From<ResourceDescription> for ResourceFilter {
    fn from(resources: ResourceDescription) -> Self {
        Self::new(resources, UserInfo::default())
    }
}

// === impl MatchResources ===

impl MatchResources {
    pub fn any(filters: impl IntoIterator<Item = ResourceFilter>) -> Self {
        Self {
            any: filters.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn all(filters: impl IntoIterator<Item = ResourceFilter>) -> Self {
        Self {
            all: filters.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn filters(&self) -> Filters<'_> {
        if !self.any.is_empty() {
            return Filters::Any(&self.any);
        }
        if !self.all.is_empty() {
            return Filters::All(&self.all);
        }
        Filters::Single(ResourceFilter::new(
            self.resources.clone(),
            self.user_info.clone(),
        ))
    }
}

// === impl AnyPolicy ===

impl AnyPolicy {
    /// The namespace a namespaced policy is confined to.
    pub fn namespace(&self) -> Option<&str> {
        match &self.scope {
            PolicyScope::Cluster => None,
            PolicyScope::Namespaced(ns) => Some(ns),
        }
    }

    /// The name exceptions use to reference this policy: `<namespace>/<name>` for namespaced
    /// policies and the bare name for cluster policies.
    pub fn exception_key(&self) -> String {
        match &self.scope {
            PolicyScope::Cluster => self.name.clone(),
            PolicyScope::Namespaced(ns) => format!("{}/{}", ns, self.name),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.spec.rules
    }
}

impl From<Policy> for AnyPolicy {
    fn from(policy: Policy) -> Self {
        Self {
            name: policy.metadata.name.unwrap_or_default(),
            scope: PolicyScope::Namespaced(policy.metadata.namespace.unwrap_or_default()),
            spec: Arc::new(policy.spec),
        }
    }
}

impl From<ClusterPolicy> for AnyPolicy {
    fn from(policy: ClusterPolicy) -> Self {
        Self {
            name: policy.metadata.name.unwrap_or_default(),
            scope: PolicyScope::Cluster,
            spec: Arc::new(policy.spec.policy),
        }
    }
}
