use crate::identity::AdmissionIdentity;
use admission_policy_k8s_api::{GroupVersionKind, Labels, Operation};

/// The per-request inputs to matching, other than the resource itself.
#[derive(Clone, Debug)]
pub struct Request {
    pub gvk: GroupVersionKind,

    /// The subresource being admitted, or empty for the main resource.
    pub subresource: String,

    /// Unset for background scans.
    pub operation: Option<Operation>,

    /// Labels of the resource's namespace.
    pub namespace_labels: Labels,

    pub identity: AdmissionIdentity,
}

// === impl Request ===

impl Request {
    pub fn new(gvk: GroupVersionKind) -> Self {
        Self {
            gvk,
            subresource: String::new(),
            operation: None,
            namespace_labels: Labels::default(),
            identity: AdmissionIdentity::default(),
        }
    }

    pub fn with_subresource(mut self, subresource: impl ToString) -> Self {
        self.subresource = subresource.to_string();
        self
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn with_namespace_labels(mut self, labels: Labels) -> Self {
        self.namespace_labels = labels;
        self
    }

    pub fn with_identity(mut self, identity: AdmissionIdentity) -> Self {
        self.identity = identity;
        self
    }
}
