use crate::SharedIndex;
use admission_policy_k8s_api::{
    labels::{InvalidSelector, Selector},
    Labels, PolicyException,
};
use std::sync::Arc;

/// Lists the exceptions visible to a caller whose labels match a selector.
///
/// The default selector lists every exception.
pub trait ListExceptions {
    type Error;

    fn list(&self, selector: &Selector) -> Result<Vec<Arc<PolicyException>>, Self::Error>;
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    #[error("policy exceptions have not been synced")]
    NotSynced,

    #[error(transparent)]
    InvalidSelector(#[from] InvalidSelector),
}

/// Lists exceptions from the shared index, optionally restricted to a namespace.
#[derive(Clone, Debug)]
pub struct Lister {
    index: SharedIndex,
    namespace: Option<String>,
}

/// Resolves the exceptions referencing a policy rule by scanning every listed exception.
///
/// This is an alternative to [`Index::get`](crate::Index::get) for callers that do not need an
/// index lookup.
#[derive(Clone, Debug)]
pub struct ExceptionSelector<L> {
    lister: L,
    selector: Selector,
}

// === impl Lister ===

impl Lister {
    pub fn new(index: SharedIndex) -> Self {
        Self {
            index,
            namespace: None,
        }
    }

    pub fn namespaced(index: SharedIndex, namespace: impl ToString) -> Self {
        Self {
            index,
            namespace: Some(namespace.to_string()),
        }
    }
}

impl ListExceptions for Lister {
    type Error = ListError;

    fn list(&self, selector: &Selector) -> Result<Vec<Arc<PolicyException>>, ListError> {
        let index = self.index.read();
        if !index.is_synced() {
            return Err(ListError::NotSynced);
        }
        let exceptions = select(index.list(self.namespace.as_deref()), selector)?;
        Ok(exceptions)
    }
}

impl ListExceptions for Vec<Arc<PolicyException>> {
    type Error = InvalidSelector;

    fn list(&self, selector: &Selector) -> Result<Vec<Arc<PolicyException>>, InvalidSelector> {
        select(self.clone(), selector)
    }
}

fn select(
    exceptions: Vec<Arc<PolicyException>>,
    selector: &Selector,
) -> Result<Vec<Arc<PolicyException>>, InvalidSelector> {
    let mut selected = Vec::with_capacity(exceptions.len());
    for exception in exceptions {
        let labels = Labels::from(exception.metadata.labels.as_ref());
        if selector.try_matches(&labels)? {
            selected.push(exception);
        }
    }
    Ok(selected)
}

// === impl ExceptionSelector ===

impl<L: ListExceptions> ExceptionSelector<L> {
    pub fn new(lister: L) -> Self {
        Self {
            lister,
            selector: Selector::default(),
        }
    }

    /// Restricts the selector to exceptions whose labels match `selector`.
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    /// Returns the exceptions that reference the rule of the named policy.
    ///
    /// Lister failures are returned as-is; an empty list means nothing references the rule.
    pub fn find(&self, policy: &str, rule: &str) -> Result<Vec<Arc<PolicyException>>, L::Error> {
        let mut exceptions = self.lister.list(&self.selector)?;
        exceptions.retain(|exception| exception.contains(policy, rule));
        Ok(exceptions)
    }
}
