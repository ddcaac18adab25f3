//! A prefix index over rule-name patterns.
//!
//! Each pattern is inserted literally, byte by byte. `*` and `?` share a single wildcard edge
//! per node. Searching a rule name walks literal edges for matching bytes and, wherever a
//! wildcard edge exists, explores it three ways:
//!
//! - descend the wildcard edge without consuming input;
//! - stay at the current node and consume one byte, leaving the wildcard pending;
//! - descend the wildcard edge and consume one byte.
//!
//! A pending wildcard lets literal siblings match after skipped bytes: with `ab` and `a*d`
//! indexed, `axb` resolves to the exceptions under `ab`.

use crate::ResourceId;
use admission_policy_k8s_api::PolicyException;
use ahash::AHashMap as HashMap;
use std::{collections::hash_map::Entry, sync::Arc};

#[derive(Debug, Default)]
pub struct ExceptionTrie {
    root: Node,
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<Edge, Node>,
    exceptions: Vec<Indexed>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum Edge {
    Byte(u8),
    /// `*` or `?`
    Wildcard,
}

#[derive(Clone, Debug)]
struct Indexed {
    id: ResourceId,
    exception: Arc<PolicyException>,
}

// === impl ExceptionTrie ===

impl ExceptionTrie {
    /// Indexes an exception under a rule-name pattern, replacing a previous entry for the same
    /// exception under that pattern.
    pub fn insert(&mut self, pattern: &str, id: ResourceId, exception: Arc<PolicyException>) {
        let node = pattern
            .bytes()
            .fold(&mut self.root, |node, b| {
                node.children.entry(Edge::from(b)).or_default()
            });
        node.exceptions.retain(|e| e.id != id);
        node.exceptions.push(Indexed { id, exception });
    }

    /// Removes an exception from the exact pattern it was inserted under.
    ///
    /// Returns false if the pattern or the exception is not indexed.
    pub fn remove(&mut self, pattern: &str, id: &ResourceId) -> bool {
        self.root.remove(pattern.as_bytes(), id)
    }

    /// Returns the exceptions indexed under any pattern that matches `rule`, each at most once,
    /// ordered by name.
    pub fn search(&self, rule: &str) -> Vec<Arc<PolicyException>> {
        let mut found = HashMap::default();
        self.root.search(rule.as_bytes(), &mut found);

        let mut found = found.into_iter().collect::<Vec<_>>();
        found.sort_by(|(a, _), (b, _)| (&a.name, &a.namespace).cmp(&(&b.name, &b.namespace)));
        found.into_iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

// === impl Node ===

impl Node {
    fn search<'n>(
        &'n self,
        key: &[u8],
        found: &mut HashMap<&'n ResourceId, &'n Arc<PolicyException>>,
    ) {
        let wildcard = self.children.get(&Edge::Wildcard);
        match key.split_first() {
            None => {
                for Indexed { id, exception } in &self.exceptions {
                    found.entry(id).or_insert(exception);
                }
                if let Some(wildcard) = wildcard {
                    wildcard.search(key, found);
                }
            }
            Some((b, rest)) => {
                if let Some(child) = self.children.get(&Edge::Byte(*b)) {
                    child.search(rest, found);
                }
                if let Some(wildcard) = wildcard {
                    wildcard.search(key, found);
                    self.search(rest, found);
                    wildcard.search(rest, found);
                }
            }
        }
    }

    fn remove(&mut self, pattern: &[u8], id: &ResourceId) -> bool {
        let Some((b, rest)) = pattern.split_first() else {
            let before = self.exceptions.len();
            self.exceptions.retain(|e| e.id != *id);
            return self.exceptions.len() != before;
        };

        let Entry::Occupied(mut entry) = self.children.entry(Edge::from(*b)) else {
            return false;
        };
        let removed = entry.get_mut().remove(rest, id);
        if entry.get().is_empty() {
            entry.remove();
        }
        removed
    }

    fn is_empty(&self) -> bool {
        self.exceptions.is_empty() && self.children.is_empty()
    }
}

// === impl Edge ===

impl From<u8> for Edge {
    fn from(b: u8) -> Self {
        match b {
            b'*' | b'?' => Self::Wildcard,
            b => Self::Byte(b),
        }
    }
}
