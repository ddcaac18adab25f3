//! Indexes policy exceptions by the policy rules they reference.
//!
//! Every exception record names a policy and a list of rule-name patterns. The index keeps one
//! [`ExceptionTrie`] per policy name so that resolving the exceptions for a `(policy, rule)` pair
//! only walks the patterns recorded for that policy.
//!
//! Indexed exceptions are immutable snapshots: an update replaces the previous snapshot by
//! removing it from every trie it was indexed in before inserting the new one.

use crate::{trie::ExceptionTrie, ResourceId};
use admission_policy_k8s_api::{AnyPolicy, PolicyException, ResourceExt};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use futures::prelude::*;
use kube::runtime::watcher;
use kubert::index::IndexNamespacedResource;
use parking_lot::RwLock;
use std::sync::Arc;

pub type SharedIndex = Arc<RwLock<Index>>;

#[derive(Debug, Default)]
pub struct Index {
    /// When set, only exceptions in this namespace are indexed.
    exception_namespace: Option<String>,

    /// The indexed snapshot of each exception.
    exceptions: HashMap<ResourceId, Arc<PolicyException>>,

    /// Rule-name patterns by policy name.
    policies: HashMap<String, ExceptionTrie>,

    synced: bool,
}

// === impl Index ===

impl Index {
    pub fn new(exception_namespace: Option<String>) -> Self {
        Self {
            exception_namespace,
            ..Default::default()
        }
    }

    pub fn shared(exception_namespace: Option<String>) -> SharedIndex {
        Arc::new(RwLock::new(Self::new(exception_namespace)))
    }

    /// Indexes an exception, replacing any previous snapshot of it.
    ///
    /// Returns false if the exception is outside of the configured exception namespace.
    pub fn add(&mut self, exception: PolicyException) -> bool {
        let namespace = exception.namespace().unwrap_or_default();
        if let Some(ns) = self.exception_namespace.as_deref() {
            if namespace != ns {
                tracing::debug!(
                    %namespace,
                    name = %exception.name_any(),
                    "Ignoring exception outside of the exception namespace",
                );
                return false;
            }
        }

        let id = ResourceId::new(namespace, exception.name_any());
        self.remove(&id);

        let exception = Arc::new(exception);
        for record in exception.spec.exceptions.iter() {
            let trie = self.policies.entry(record.policy_name.clone()).or_default();
            for pattern in record.rule_names.iter() {
                trie.insert(pattern, id.clone(), exception.clone());
            }
        }
        tracing::debug!(%id, "Indexed exception");
        self.exceptions.insert(id, exception);
        true
    }

    /// Removes an exception from the index. Removing an unknown exception is a no-op.
    pub fn delete(&mut self, namespace: &str, name: &str) -> Option<Arc<PolicyException>> {
        let id = ResourceId::new(namespace.to_string(), name.to_string());
        let removed = self.remove(&id);
        if removed.is_some() {
            tracing::debug!(%id, "Removed exception");
        }
        removed
    }

    fn remove(&mut self, id: &ResourceId) -> Option<Arc<PolicyException>> {
        let exception = self.exceptions.remove(id)?;
        for record in exception.spec.exceptions.iter() {
            let Some(trie) = self.policies.get_mut(&record.policy_name) else {
                continue;
            };
            for pattern in record.rule_names.iter() {
                trie.remove(pattern, id);
            }
            if trie.is_empty() {
                self.policies.remove(&record.policy_name);
            }
        }
        Some(exception)
    }

    /// Returns the exceptions referencing a rule of the named policy, ordered by name.
    ///
    /// Returns `None` when no exception references the rule.
    pub fn get(&self, policy: &str, rule: &str) -> Option<Vec<Arc<PolicyException>>> {
        let found = self.policies.get(policy)?.search(rule);
        if found.is_empty() {
            return None;
        }
        Some(found)
    }

    /// Returns the exceptions referencing a rule of `policy`.
    pub fn get_for_policy(
        &self,
        policy: &AnyPolicy,
        rule: &str,
    ) -> Option<Vec<Arc<PolicyException>>> {
        self.get(&policy.exception_key(), rule)
    }

    /// Lists indexed exceptions, optionally restricted to a namespace, ordered by namespace and
    /// name.
    pub fn list(&self, namespace: Option<&str>) -> Vec<Arc<PolicyException>> {
        let mut exceptions = self
            .exceptions
            .iter()
            .filter(|(id, _)| namespace.map(|ns| id.namespace == ns).unwrap_or(true))
            .collect::<Vec<_>>();
        exceptions.sort_by(|(a, _), (b, _)| a.cmp(b));
        exceptions.into_iter().map(|(_, e)| e.clone()).collect()
    }

    /// Returns true once the index has observed a complete listing of exceptions.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub(crate) fn exceptions_by_namespace(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::default();
        for id in self.exceptions.keys() {
            *counts.entry(id.namespace.as_str()).or_default() += 1;
        }
        counts
    }

    pub(crate) fn policy_count(&self) -> usize {
        self.policies.len()
    }

    /// Replaces the index's contents with a complete listing.
    pub(crate) fn reset(&mut self, exceptions: Vec<PolicyException>) {
        let live = exceptions
            .iter()
            .map(|e| ResourceId::new(e.namespace().unwrap_or_default(), e.name_any()))
            .collect::<HashSet<_>>();
        let stale = self
            .exceptions
            .keys()
            .filter(|id| !live.contains(*id))
            .cloned()
            .collect::<Vec<_>>();
        for id in stale {
            self.delete(&id.namespace, &id.name);
        }

        for exception in exceptions {
            self.add(exception);
        }
        self.synced = true;
    }
}

impl IndexNamespacedResource<PolicyException> for Index {
    fn apply(&mut self, exception: PolicyException) {
        self.add(exception);
    }

    fn delete(&mut self, namespace: String, name: String) {
        Index::delete(self, &namespace, &name);
    }
}

/// Drives the index from a stream of exception watch events.
///
/// A listing that starts with `Init` is buffered until `InitDone` and then replaces the index's
/// contents, after which the index reports itself synced.
pub async fn watch(
    index: SharedIndex,
    events: impl Stream<Item = watcher::Event<PolicyException>>,
) {
    futures::pin_mut!(events);

    let mut listing = Vec::new();
    while let Some(event) = events.next().await {
        match event {
            watcher::Event::Apply(exception) => index.write().apply(exception),
            watcher::Event::Delete(exception) => {
                let namespace = exception.namespace().unwrap_or_default();
                index.write().delete(&namespace, &exception.name_any());
            }
            watcher::Event::Init => listing.clear(),
            watcher::Event::InitApply(exception) => listing.push(exception),
            watcher::Event::InitDone => {
                let exceptions = std::mem::take(&mut listing);
                tracing::debug!(exceptions = exceptions.len(), "Exception listing complete");
                index.write().reset(exceptions);
            }
        }
    }

    tracing::debug!("Exception watch ended");
}
