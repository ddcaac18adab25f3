#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use admission_policy_core as core;
pub use admission_policy_k8s_api as k8s;
pub use admission_policy_k8s_index as index;

mod args;
mod exceptions;

pub use self::{
    args::Args,
    exceptions::{Exceptions, Resolution},
};
