use admission_policy_k8s_api::{wildcard, Subject, SubjectKind};
use k8s_openapi::api::authentication::v1 as authn;

/// The resolved identity of the caller making an admission request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdmissionIdentity {
    /// Namespaced roles bound to the caller, as `<namespace>:<name>`.
    pub roles: Vec<String>,

    /// Cluster roles bound to the caller.
    pub cluster_roles: Vec<String>,

    pub user: UserIdentity,
}

/// The authenticated user as reported by the API server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserIdentity {
    pub username: String,
    pub uid: String,
    pub groups: Vec<String>,
}

// === impl AdmissionIdentity ===

impl AdmissionIdentity {
    /// An empty identity carries no caller information, as in background scans.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// === impl UserIdentity ===

impl From<&authn::UserInfo> for UserIdentity {
    fn from(info: &authn::UserInfo) -> Self {
        Self {
            username: info.username.clone().unwrap_or_default(),
            uid: info.uid.clone().unwrap_or_default(),
            groups: info.groups.clone().unwrap_or_default(),
        }
    }
}

/// Returns true if any of the caller's roles appears in `expected`.
pub(crate) fn check_roles(expected: &[String], actual: &[String]) -> bool {
    actual.iter().any(|role| expected.contains(role))
}

/// Returns true if the user is described by any of the subjects.
///
/// Subject names may be globs. Service accounts are compared by their
/// `system:serviceaccount:<namespace>:<name>` username.
pub fn check_subjects(subjects: &[Subject], user: &UserIdentity) -> bool {
    subjects.iter().any(|subject| match subject.kind {
        SubjectKind::User => wildcard::matches(&subject.name, &user.username),
        SubjectKind::Group => user
            .groups
            .iter()
            .any(|group| wildcard::matches(&subject.name, group)),
        SubjectKind::ServiceAccount => {
            let username = format!(
                "system:serviceaccount:{}:{}",
                subject.namespace.as_deref().unwrap_or_default(),
                subject.name
            );
            wildcard::matches(&username, &user.username)
        }
    })
}
