//! Admission policy matching.
//!
//! Decides whether a policy rule applies to an admitted resource and whether a policy exception
//! exempts it:
//!
//! - [`matcher`] evaluates a single condition block (resource description + caller constraints)
//!   and reports every reason it does not match.
//! - [`rule`] combines condition blocks with the `any`/`all` semantics of a rule's `match` and
//!   `exclude` sections.
//! - [`finegrained`] narrows exceptions that reference a rule by image and field-value criteria.
//! - [`exception`] selects the exception (if any) whose own `match` section covers a request.
//!
//! Everything here is synchronous and free of I/O: namespace labels, resolved images, and
//! candidate exceptions are resolved by callers.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod exception;
pub mod finegrained;
mod identity;
pub mod kind;
pub mod matcher;
mod request;
pub mod rule;

#[cfg(test)]
mod test_util;

pub use self::{
    finegrained::Evaluation,
    identity::{check_subjects, AdmissionIdentity, UserIdentity},
    matcher::{check_condition_block, Mismatch},
    request::Request,
    rule::{matches_resources, matches_rule, MatchError},
};
pub use admission_policy_k8s_api::wildcard;
