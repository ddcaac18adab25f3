use crate::{
    core::{exception::select_exception, finegrained, Evaluation, Request},
    index::{Index, SharedIndex},
    k8s::{AnyPolicy, DynamicObject, PolicyException},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Resolves the policy exceptions that apply to an admitted resource.
#[derive(Clone, Debug)]
pub struct Exceptions {
    index: SharedIndex,
    enabled: bool,
}

/// How exceptions affect a policy rule for a single resource.
#[derive(Clone, Debug, Default)]
pub enum Resolution {
    /// The rule applies as usual.
    #[default]
    None,

    /// The exception exempts the resource from the rule.
    Exempt(Arc<PolicyException>),

    /// Fine-grained exceptions matched the resource's images or field values.
    FineGrained(Evaluation),
}

// === impl Exceptions ===

impl Exceptions {
    pub fn new(exception_namespace: Option<String>, enabled: bool) -> Self {
        Self {
            index: Index::shared(exception_namespace),
            enabled,
        }
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Resolves the exceptions that reference `rule` of `policy` against the resource.
    ///
    /// An exception applies only when it has not expired and its own `match` section covers
    /// the request. A coarse exception that applies exempts the resource outright; otherwise
    /// fine-grained exceptions are narrowed by `images` and field values.
    pub fn resolve(
        &self,
        policy: &AnyPolicy,
        rule: &str,
        resource: &DynamicObject,
        request: &Request,
        images: &[String],
        now: DateTime<Utc>,
        mut conditions: impl FnMut(&PolicyException) -> bool,
    ) -> Resolution {
        if !self.enabled {
            return Resolution::None;
        }

        let key = policy.exception_key();
        let Some(candidates) = self.index.read().get(&key, rule) else {
            return Resolution::None;
        };

        let applicable = candidates
            .iter()
            .filter(|exception| {
                select_exception(
                    std::slice::from_ref(*exception),
                    resource,
                    request,
                    now,
                    &mut conditions,
                )
                .is_some()
            })
            .cloned()
            .collect::<Vec<_>>();

        let coarse = applicable.iter().find(|exception| {
            exception
                .spec
                .exceptions
                .iter()
                .any(|record| !record.is_finegrained() && record.contains(&key, rule))
        });
        if let Some(exception) = coarse {
            tracing::debug!(
                policy = %key,
                %rule,
                exception = %exception.metadata.name.as_deref().unwrap_or_default(),
                "Resource exempted",
            );
            return Resolution::Exempt(exception.clone());
        }

        let evaluation = finegrained::evaluate(&applicable, &key, rule, images, resource);
        if evaluation.matched.is_empty() {
            return Resolution::None;
        }
        tracing::debug!(
            policy = %key,
            %rule,
            matched = evaluation.matched.len(),
            mode = ?evaluation.report_mode,
            "Fine-grained exceptions matched",
        );
        Resolution::FineGrained(evaluation)
    }
}
