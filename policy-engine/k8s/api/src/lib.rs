#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod exception;
pub mod labels;
pub mod policy;
pub mod wildcard;

pub use self::{
    exception::{
        Exception, ExceptionReportMode, ImageException, PolicyException, PolicyExceptionSpec,
        ValueException, ValueOperator,
    },
    labels::Labels,
    policy::{
        AnyPolicy, ClusterPolicy, MatchResources, Operation, Policy, PolicyScope, PolicySpec,
        ResourceDescription, ResourceFilter, Rule, Subject, SubjectKind, UserInfo,
    },
};
pub use k8s_openapi::api::{self, core::v1::Namespace};
pub use kube::{
    core::{DynamicObject, GroupVersionKind, ObjectMeta, TypeMeta},
    ResourceExt,
};
