//! Policy exception index
//!
//! Policy exceptions are watched from the cluster and indexed by the policy rules they
//! reference, so that admission requests can resolve the candidate exceptions for a
//! `(policy, rule)` pair without scanning every exception:
//!
//! ```text
//! [ PolicyException ] -> policy name -> [ ExceptionTrie ] <- rule name
//! ```
//!
//! Each exception record's rule names are globs. The per-policy [`ExceptionTrie`] stores those
//! patterns literally and resolves a concrete rule name against all of them in a single walk.
//!
//! The index is shared between the watch task, which is its only writer, and request handlers,
//! which only read from it.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod index;
pub mod metrics;
mod resource_id;
pub mod selector;
pub mod trie;


pub use self::{
    index::{watch, Index, SharedIndex},
    resource_id::ResourceId,
    selector::{ExceptionSelector, ListError, ListExceptions, Lister},
    trie::ExceptionTrie,
};
