//! Combines condition blocks into rule match and exclude decisions.

use crate::{matcher::check_condition_block, Mismatch, Request};
use admission_policy_k8s_api::{
    policy::Filters, DynamicObject, MatchResources, ResourceFilter, Rule, UserInfo,
};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("resource is empty")]
    EmptyResource,

    #[error("policy and resource namespaces mismatch")]
    NamespaceMismatch,

    #[error("{}", DisplayReasons::new(.rule, .reasons))]
    NotMatched { rule: String, reasons: Vec<Mismatch> },
}

struct DisplayReasons<'a> {
    rule: &'a str,
    reasons: &'a [Mismatch],
}

/// Determines whether a rule applies to a resource.
///
/// `policy_namespace` is set for namespaced policies, which only apply to resources in their
/// own namespace. Exclusions are only consulted once the rule's `match` section is satisfied.
pub fn matches_rule(
    rule: &Rule,
    resource: Option<&DynamicObject>,
    request: &Request,
    policy_namespace: Option<&str>,
) -> Result<(), MatchError> {
    let resource = resource.ok_or(MatchError::EmptyResource)?;

    if let Some(ns) = policy_namespace.filter(|ns| !ns.is_empty()) {
        if resource.metadata.namespace.as_deref() != Some(ns) {
            return Err(MatchError::NamespaceMismatch);
        }
    }

    let mut reasons = matches_resources(&rule.match_resources, resource, request);
    if reasons.is_empty() {
        reasons = excluded_by(&rule.exclude_resources, resource, request);
    }

    if reasons.is_empty() {
        tracing::trace!(rule = %rule.name, "Rule matched");
        return Ok(());
    }

    tracing::trace!(rule = %rule.name, reasons = reasons.len(), "Rule not matched");
    Err(MatchError::NotMatched {
        rule: rule.name.clone(),
        reasons,
    })
}

/// Evaluates a `match` section, returning the reasons it does not select the resource.
///
/// With `any` filters the first clean filter wins; when none is clean the only reason is
/// [`Mismatch::NoneMatched`]. With `all` filters the reasons of every filter are collected.
pub fn matches_resources(
    match_resources: &MatchResources,
    resource: &DynamicObject,
    request: &Request,
) -> Vec<Mismatch> {
    match match_resources.filters() {
        Filters::Any(filters) => {
            if filters
                .iter()
                .any(|filter| check_match_filter(filter, resource, request).is_empty())
            {
                return vec![];
            }
            vec![Mismatch::NoneMatched]
        }

        Filters::All(filters) => filters
            .iter()
            .flat_map(|filter| check_match_filter(filter, resource, request))
            .collect(),

        Filters::Single(filter) => check_match_filter(&filter, resource, request),
    }
}

fn check_match_filter(
    filter: &ResourceFilter,
    resource: &DynamicObject,
    request: &Request,
) -> Vec<Mismatch> {
    // Without caller information there is nothing to compare user constraints to.
    let empty = UserInfo::default();
    let user_info = if request.identity.is_empty() {
        &empty
    } else {
        &filter.user_info
    };

    if filter.resources.is_empty() && user_info.is_empty() {
        return vec![Mismatch::EmptyMatch];
    }

    check_condition_block(&filter.resources, user_info, resource, request)
}

/// Evaluates an `exclude` section, returning reasons only when the resource is excluded.
fn excluded_by(
    exclude: &MatchResources,
    resource: &DynamicObject,
    request: &Request,
) -> Vec<Mismatch> {
    match exclude.filters() {
        Filters::Any(filters) => filters
            .iter()
            .flat_map(|filter| check_exclude_filter(filter, resource, request))
            .collect(),

        Filters::All(filters) => {
            let excluded = filters
                .iter()
                .all(|filter| !check_exclude_filter(filter, resource, request).is_empty());
            if excluded {
                vec![Mismatch::ExcludedByAll]
            } else {
                vec![]
            }
        }

        Filters::Single(filter) => check_exclude_filter(&filter, resource, request),
    }
}

/// A filter excludes the resource when it is non-empty and matches cleanly.
fn check_exclude_filter(
    filter: &ResourceFilter,
    resource: &DynamicObject,
    request: &Request,
) -> Vec<Mismatch> {
    if filter.is_empty() {
        return vec![];
    }

    if check_condition_block(&filter.resources, &filter.user_info, resource, request).is_empty() {
        return vec![Mismatch::Excluded];
    }

    vec![]
}

// === impl DisplayReasons ===

impl<'a> DisplayReasons<'a> {
    fn new(rule: &'a str, reasons: &'a [Mismatch]) -> Self {
        Self { rule, reasons }
    }
}

impl fmt::Display for DisplayReasons<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule {} not matched:", self.rule)?;
        for (i, reason) in self.reasons.iter().enumerate() {
            write!(f, "\n {}. {}", i + 1, reason)?;
        }
        Ok(())
    }
}
