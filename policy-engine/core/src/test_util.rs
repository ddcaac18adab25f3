use admission_policy_k8s_api::{DynamicObject, GroupVersionKind, ObjectMeta, TypeMeta};
use std::collections::BTreeMap;

pub fn mk_resource(
    api_version: &str,
    kind: &str,
    namespace: Option<&str>,
    name: &str,
) -> DynamicObject {
    DynamicObject {
        types: Some(TypeMeta {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        }),
        metadata: ObjectMeta {
            namespace: namespace.map(Into::into),
            name: Some(name.to_string()),
            ..Default::default()
        },
        data: serde_json::json!({}),
    }
}

pub fn mk_pod(namespace: &str, name: &str) -> DynamicObject {
    mk_resource("v1", "Pod", Some(namespace), name)
}

pub fn with_labels(
    mut resource: DynamicObject,
    labels: impl IntoIterator<Item = (&'static str, &'static str)>,
) -> DynamicObject {
    resource.metadata.labels = Some(
        labels
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    );
    resource
}

pub fn pod_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("", "v1", "Pod")
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
