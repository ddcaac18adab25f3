//! Kind selectors.
//!
//! A selector names a resource type with optional group, version, and subresource components:
//!
//! ```text
//! Kind
//! Kind/subresource
//! version/Kind
//! version/Kind/subresource
//! group/version/Kind
//! group/version/Kind/subresource
//! ```
//!
//! Every component may be a glob; omitted group and version components match anything, while an
//! omitted subresource only matches the main resource. `*/*` matches every resource and
//! subresource.

use admission_policy_k8s_api::{wildcard, GroupVersionKind};

const EPHEMERAL_CONTAINERS: &str = "ephemeralcontainers";

#[derive(Clone, Debug, PartialEq, Eq)]
struct KindSelector<'s> {
    group: &'s str,
    version: &'s str,
    kind: &'s str,
    subresource: &'s str,
}

/// Returns true if the GVK and subresource are selected by any of `kinds`.
///
/// When `allow_ephemeral_containers` is set, a selector for `Pod` also selects the pod's
/// `ephemeralcontainers` subresource.
pub fn check_kind(
    kinds: &[String],
    gvk: &GroupVersionKind,
    subresource: &str,
    allow_ephemeral_containers: bool,
) -> bool {
    kinds.iter().any(|k| {
        let selector = KindSelector::parse(k);
        if !selector.selects(gvk) {
            return false;
        }

        wildcard::matches(selector.subresource, subresource)
            || (allow_ephemeral_containers
                && subresource == EPHEMERAL_CONTAINERS
                && is_pod(gvk))
    })
}

fn is_pod(gvk: &GroupVersionKind) -> bool {
    gvk.group.is_empty() && gvk.version == "v1" && gvk.kind == "Pod"
}

// === impl KindSelector ===

impl<'s> KindSelector<'s> {
    fn parse(selector: &'s str) -> Self {
        let parts = selector.split('/').collect::<Vec<_>>();
        let (group, version, kind, subresource) = match parts[..] {
            [kind] => ("*", "*", kind, ""),
            ["*", "*"] => ("*", "*", "*", "*"),
            [kind, sub] if kind == "*" || is_kind(kind) => ("*", "*", kind, sub),
            [version, kind] => ("*", version, kind, ""),
            [version, kind, sub] if is_kind(kind) => ("*", version, kind, sub),
            [group, version, kind] => (group, version, kind, ""),
            [group, version, kind, sub] => (group, version, kind, sub),
            // Unparseable selectors select nothing.
            _ => ("", "", "", ""),
        };
        Self {
            group,
            version,
            kind,
            subresource,
        }
    }

    fn selects(&self, gvk: &GroupVersionKind) -> bool {
        !self.kind.is_empty()
            && wildcard::matches(self.group, &gvk.group)
            && wildcard::matches(self.version, &gvk.version)
            && wildcard::matches(self.kind, &gvk.kind)
    }
}

/// Kinds are capitalized; versions and groups are not.
fn is_kind(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn gvk(group: &str, version: &str, kind: &str) -> GroupVersionKind {
        GroupVersionKind::gvk(group, version, kind)
    }

    #[rstest]
    #[case("Pod", "", "v1", "Pod", "", true)]
    #[case("Pod", "apps", "v1", "Deployment", "", false)]
    #[case("Pod", "", "v1", "Pod", "status", false)]
    #[case("Pod/status", "", "v1", "Pod", "status", true)]
    #[case("Pod/*", "", "v1", "Pod", "exec", true)]
    #[case("v1/Pod", "", "v1", "Pod", "", true)]
    #[case("v2/Pod", "", "v1", "Pod", "", false)]
    #[case("apps/v1/Deployment", "apps", "v1", "Deployment", "", true)]
    #[case("batch/*/Job", "batch", "v1", "Job", "", true)]
    #[case("apps/v1/Deployment/scale", "apps", "v1", "Deployment", "scale", true)]
    #[case("v1/Pod/status", "", "v1", "Pod", "status", true)]
    #[case("*", "apps", "v1", "StatefulSet", "", true)]
    #[case("*", "", "v1", "Pod", "status", false)]
    #[case("*/*", "", "v1", "Pod", "status", true)]
    #[case("Config*", "", "v1", "ConfigMap", "", true)]
    #[case("*/status", "apps", "v1", "Deployment", "status", true)]
    fn selects(
        #[case] selector: &str,
        #[case] group: &str,
        #[case] version: &str,
        #[case] kind: &str,
        #[case] subresource: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(
            check_kind(
                &[selector.to_string()],
                &gvk(group, version, kind),
                subresource,
                false
            ),
            expected,
            "{selector} against {group}/{version}/{kind}/{subresource}"
        );
    }

    #[test]
    fn pods_select_ephemeral_containers() {
        let kinds = ["Pod".to_string()];
        let pod = gvk("", "v1", "Pod");
        assert!(check_kind(&kinds, &pod, EPHEMERAL_CONTAINERS, true));
        assert!(!check_kind(&kinds, &pod, EPHEMERAL_CONTAINERS, false));
        assert!(!check_kind(&kinds, &pod, "status", true));
    }

    #[test]
    fn any_selector_suffices() {
        let kinds = ["Deployment".to_string(), "Pod".to_string()];
        assert!(check_kind(&kinds, &gvk("", "v1", "Pod"), "", true));
        assert!(!check_kind(&[], &gvk("", "v1", "Pod"), "", true));
    }
}
