use crate::{rule::matches_resources, Request};
use admission_policy_k8s_api::{DynamicObject, PolicyException};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Selects the first candidate exception whose own `match` section covers the request.
///
/// Candidates are expected to already reference the policy rule being evaluated. Expired
/// exceptions are skipped, as are exceptions that opt out of background processing when the
/// request carries no caller identity. Exception pre-conditions are opaque here: when an
/// exception declares them, `conditions` decides whether they hold.
pub fn select_exception<'c>(
    candidates: &'c [Arc<PolicyException>],
    resource: &DynamicObject,
    request: &Request,
    now: DateTime<Utc>,
    mut conditions: impl FnMut(&PolicyException) -> bool,
) -> Option<&'c Arc<PolicyException>> {
    let background = request.identity.is_empty();

    candidates.iter().find(|exception| {
        let name = exception.metadata.name.as_deref().unwrap_or_default();
        if exception.is_expired(now) {
            tracing::trace!(%name, "Skipping expired exception");
            return false;
        }

        if background && exception.spec.background == Some(false) {
            tracing::trace!(%name, "Skipping exception during background processing");
            return false;
        }

        let reasons = matches_resources(&exception.spec.match_resources, resource, request);
        if !reasons.is_empty() {
            tracing::trace!(%name, reasons = reasons.len(), "Exception does not match");
            return false;
        }

        !exception.has_conditions() || conditions(exception)
    })
}
