use crate::{policy::MatchResources, wildcard};
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Exempts matching resources from one or more named policy rules.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kyverno.io",
    version = "v2",
    kind = "PolicyException",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct PolicyExceptionSpec {
    /// Whether the exception applies to background scans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,

    /// The resources (and callers) the exception applies to.
    #[serde(rename = "match", default)]
    pub match_resources: MatchResources,

    /// Pre-conditions that must hold for the exception to apply. These are opaque to the
    /// matcher and are evaluated by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,

    /// After this instant the exception no longer applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    pub exceptions: Vec<Exception>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Conditions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all: Vec<serde_json::Value>,
}

/// A reference to the rules of a single policy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Exception {
    /// `<namespace>/<name>` for namespaced policies, `<name>` for cluster policies.
    pub policy_name: String,

    /// Rule name globs.
    pub rule_names: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageException>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ValueException>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_mode: Option<ExceptionReportMode>,
}

/// Narrows an exception to requests carrying a matching container image.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageException {
    pub image_references: Vec<String>,
}

/// Narrows an exception to resources whose value at `path` satisfies `operator`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ValueException {
    pub path: String,

    #[serde(default)]
    pub operator: ValueOperator,

    pub values: Vec<String>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ValueOperator {
    #[default]
    Equals,
    In,
    StartsWith,
    EndsWith,
    Contains,
}

/// How a matched fine-grained exception is surfaced in policy reports.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ExceptionReportMode {
    #[default]
    Skip,
    Warn,
    Pass,
}

// === impl PolicyException ===

impl PolicyException {
    /// Returns true if any of the exception's records covers the policy rule.
    pub fn contains(&self, policy: &str, rule: &str) -> bool {
        self.spec.exceptions.iter().any(|e| e.contains(policy, rule))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.spec.expires_at.map(|t| t <= now).unwrap_or(false)
    }

    pub fn has_conditions(&self) -> bool {
        self.spec
            .conditions
            .as_ref()
            .map(|c| !c.any.is_empty() || !c.all.is_empty())
            .unwrap_or(false)
    }
}

// === impl Exception ===

impl Exception {
    pub fn new(
        policy_name: impl ToString,
        rule_names: impl IntoIterator<Item = impl ToString>,
    ) -> Self {
        Self {
            policy_name: policy_name.to_string(),
            rule_names: rule_names.into_iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Returns true if the record names the policy exactly and one of its rule globs matches.
    pub fn contains(&self, policy: &str, rule: &str) -> bool {
        self.policy_name == policy
            && self
                .rule_names
                .iter()
                .any(|pattern| wildcard::matches(pattern, rule))
    }

    /// Returns true if the record carries image or value criteria.
    pub fn is_finegrained(&self) -> bool {
        !self.images.is_empty() || !self.values.is_empty()
    }

    pub fn report_mode(&self) -> ExceptionReportMode {
        self.report_mode.unwrap_or_default()
    }
}
