//! Fine-grained exceptions.
//!
//! An exception record that carries image or value criteria only exempts a resource when one
//! of those criteria holds. Records without such criteria are resolved by coarse matching and
//! are ignored here.
//!
//! Value paths support two forms only: a dotted lookup through nested objects (e.g.
//! `metadata.labels.environment`), and the container image listing `spec.containers[*].image`.
//! Other array traversals are not evaluated and never match.

use admission_policy_k8s_api::{
    wildcard, DynamicObject, Exception, ExceptionReportMode, ImageException, PolicyException,
    ValueException, ValueOperator,
};
use serde_json::Value;
use std::sync::Arc;

const CONTAINER_IMAGES_PATH: &str = "spec.containers[*].image";

/// The outcome of evaluating candidate exceptions for a policy rule.
#[derive(Clone, Debug, Default)]
pub struct Evaluation {
    pub matched: Vec<Arc<PolicyException>>,

    /// The report mode of the last matching record that does not skip, or
    /// [`ExceptionReportMode::Skip`].
    pub report_mode: ExceptionReportMode,
}

/// Narrows `candidates` to the exceptions whose fine-grained criteria hold for the resource.
///
/// `images` are the container images resolved for the request.
pub fn evaluate(
    candidates: &[Arc<PolicyException>],
    policy: &str,
    rule: &str,
    images: &[String],
    resource: &DynamicObject,
) -> Evaluation {
    let mut evaluation = Evaluation::default();
    let mut document = None;

    for candidate in candidates {
        let mut matched = false;
        for exception in candidate.spec.exceptions.iter() {
            if !exception.is_finegrained() || !exception.contains(policy, rule) {
                continue;
            }

            let doc = document.get_or_insert_with(|| to_document(resource));
            if !record_matches(exception, images, doc) {
                continue;
            }

            matched = true;
            // Later matches override earlier ones.
            let mode = exception.report_mode();
            if mode != ExceptionReportMode::Skip {
                evaluation.report_mode = mode;
            }
        }

        if matched {
            tracing::debug!(
                exception = %candidate.metadata.name.as_deref().unwrap_or_default(),
                %policy,
                %rule,
                "Fine-grained exception matched",
            );
            evaluation.matched.push(candidate.clone());
        }
    }

    evaluation
}

fn to_document(resource: &DynamicObject) -> Value {
    serde_json::to_value(resource).unwrap_or_else(|error| {
        tracing::warn!(%error, "Failed to serialize resource");
        Value::Null
    })
}

fn record_matches(exception: &Exception, images: &[String], document: &Value) -> bool {
    exception
        .images
        .iter()
        .any(|image| matches_images(image, images))
        || exception
            .values
            .iter()
            .any(|value| matches_value(value, document))
}

fn matches_images(exception: &ImageException, images: &[String]) -> bool {
    images.iter().any(|image| {
        exception
            .image_references
            .iter()
            .any(|pattern| wildcard::matches(pattern, image))
    })
}

fn matches_value(exception: &ValueException, document: &Value) -> bool {
    extract(document, &exception.path)
        .iter()
        .any(|actual| matches_operator(exception.operator, actual, &exception.values))
}

fn matches_operator(operator: ValueOperator, actual: &str, expected: &[String]) -> bool {
    match operator {
        ValueOperator::Equals | ValueOperator::In => expected.iter().any(|v| v == actual),
        ValueOperator::StartsWith => expected.iter().any(|v| actual.starts_with(v.as_str())),
        ValueOperator::EndsWith => expected.iter().any(|v| actual.ends_with(v.as_str())),
        ValueOperator::Contains => expected.iter().any(|v| actual.contains(v.as_str())),
    }
}

/// Extracts the scalar values at `path`, rendered as strings.
fn extract(document: &Value, path: &str) -> Vec<String> {
    if path == CONTAINER_IMAGES_PATH {
        return lookup(document, "spec.containers")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|container| container.get("image"))
            .filter_map(scalar)
            .collect();
    }

    if path.contains('[') {
        tracing::debug!(%path, "Unsupported value path");
        return vec![];
    }

    match lookup(document, path) {
        Some(Value::Array(values)) => values.iter().filter_map(scalar).collect(),
        Some(value) => scalar(value).into_iter().collect(),
        None => vec![],
    }
}

fn lookup<'v>(document: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(document, |value, segment| value.as_object()?.get(segment))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{mk_pod, with_labels};
    use admission_policy_k8s_api::PolicyExceptionSpec;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn mk_exception(name: &str, exceptions: Vec<Exception>) -> Arc<PolicyException> {
        let mut polex = PolicyException::new(
            name,
            PolicyExceptionSpec {
                exceptions,
                ..Default::default()
            },
        );
        polex.metadata.namespace = Some("kyverno".to_string());
        Arc::new(polex)
    }

    fn images(patterns: &[&str]) -> Exception {
        Exception {
            images: vec![ImageException {
                image_references: patterns.iter().map(|p| p.to_string()).collect(),
            }],
            ..Exception::new("disallow-latest", ["*"])
        }
    }

    fn value(path: &str, operator: ValueOperator, values: &[&str]) -> Exception {
        Exception {
            values: vec![ValueException {
                path: path.to_string(),
                operator,
                values: values.iter().map(|v| v.to_string()).collect(),
            }],
            ..Exception::new("disallow-latest", ["*"])
        }
    }

    fn with_report_mode(exception: Exception, mode: ExceptionReportMode) -> Exception {
        Exception {
            report_mode: Some(mode),
            ..exception
        }
    }

    fn names(evaluation: &Evaluation) -> Vec<&str> {
        evaluation
            .matched
            .iter()
            .map(|e| e.metadata.name.as_deref().unwrap_or_default())
            .collect()
    }

    #[test]
    fn image_references() {
        let candidates = [mk_exception("allow-nginx", vec![images(&["nginx:*"])])];
        let pod = mk_pod("default", "pod-0");

        let nginx = ["nginx:1.25".to_string()];
        let evaluation = evaluate(&candidates, "disallow-latest", "check-tag", &nginx, &pod);
        assert_eq!(names(&evaluation), vec!["allow-nginx"]);
        assert_eq!(evaluation.report_mode, ExceptionReportMode::Skip);

        let redis = ["redis:1.0".to_string()];
        let evaluation = evaluate(&candidates, "disallow-latest", "check-tag", &redis, &pod);
        assert!(evaluation.matched.is_empty());
    }

    #[test]
    fn label_values() {
        let candidates = [mk_exception(
            "allow-debug",
            vec![value(
                "metadata.labels.environment",
                ValueOperator::Equals,
                &["debug"],
            )],
        )];

        let debug = with_labels(mk_pod("default", "pod-0"), [("environment", "debug")]);
        let evaluation = evaluate(&candidates, "disallow-latest", "check-tag", &[], &debug);
        assert_eq!(names(&evaluation), vec!["allow-debug"]);

        let prod = with_labels(mk_pod("default", "pod-0"), [("environment", "production")]);
        let evaluation = evaluate(&candidates, "disallow-latest", "check-tag", &[], &prod);
        assert!(evaluation.matched.is_empty());
    }

    #[rstest]
    #[case(ValueOperator::Equals, &["web"], true)]
    #[case(ValueOperator::Equals, &["we"], false)]
    #[case(ValueOperator::In, &["db", "web"], true)]
    #[case(ValueOperator::StartsWith, &["w"], true)]
    #[case(ValueOperator::StartsWith, &["eb"], false)]
    #[case(ValueOperator::EndsWith, &["eb"], true)]
    #[case(ValueOperator::Contains, &["e"], true)]
    #[case(ValueOperator::Contains, &["x"], false)]
    fn value_operators(
        #[case] operator: ValueOperator,
        #[case] values: &[&str],
        #[case] expected: bool,
    ) {
        let candidates = [mk_exception(
            "allow-web",
            vec![value("metadata.labels.app", operator, values)],
        )];
        let pod = with_labels(mk_pod("default", "pod-0"), [("app", "web")]);
        let evaluation = evaluate(&candidates, "disallow-latest", "check-tag", &[], &pod);
        assert_eq!(!evaluation.matched.is_empty(), expected);
    }

    #[test]
    fn container_images_path() {
        let mut pod = mk_pod("default", "pod-0");
        pod.data = serde_json::json!({
            "spec": {
                "containers": [
                    {"name": "app", "image": "ghcr.io/acme/app:1.0"},
                    {"name": "proxy", "image": "envoy:1.30"},
                ],
                "replicas": 3,
            },
        });

        let candidates = [mk_exception(
            "allow-envoy",
            vec![value(
                "spec.containers[*].image",
                ValueOperator::StartsWith,
                &["envoy:"],
            )],
        )];
        let evaluation = evaluate(&candidates, "disallow-latest", "check-tag", &[], &pod);
        assert_eq!(names(&evaluation), vec!["allow-envoy"]);

        // Only the container image listing is traversed.
        let candidates = [mk_exception(
            "allow-app",
            vec![value(
                "spec.containers[*].name",
                ValueOperator::Equals,
                &["app"],
            )],
        )];
        let evaluation = evaluate(&candidates, "disallow-latest", "check-tag", &[], &pod);
        assert!(evaluation.matched.is_empty());

        let candidates = [mk_exception(
            "allow-replicas",
            vec![value("spec.replicas", ValueOperator::Equals, &["3"])],
        )];
        let evaluation = evaluate(&candidates, "disallow-latest", "check-tag", &[], &pod);
        assert_eq!(names(&evaluation), vec!["allow-replicas"]);
    }

    #[test]
    fn ignores_coarse_and_unrelated_records() {
        let candidates = [
            mk_exception("coarse", vec![Exception::new("disallow-latest", ["*"])]),
            mk_exception(
                "other-policy",
                vec![Exception {
                    policy_name: "require-labels".to_string(),
                    ..images(&["*"])
                }],
            ),
            mk_exception(
                "other-rule",
                vec![Exception {
                    rule_names: vec!["check-registry".to_string()],
                    ..images(&["*"])
                }],
            ),
        ];
        let nginx = ["nginx:1.25".to_string()];
        let evaluation = evaluate(
            &candidates,
            "disallow-latest",
            "check-tag",
            &nginx,
            &mk_pod("default", "pod-0"),
        );
        assert!(evaluation.matched.is_empty());
        assert_eq!(evaluation.report_mode, ExceptionReportMode::Skip);
    }

    #[test]
    fn last_reporting_match_wins() {
        let candidates = [
            mk_exception(
                "warn",
                vec![with_report_mode(
                    images(&["nginx:*"]),
                    ExceptionReportMode::Warn,
                )],
            ),
            mk_exception(
                "pass",
                vec![with_report_mode(
                    images(&["nginx:*"]),
                    ExceptionReportMode::Pass,
                )],
            ),
            mk_exception(
                "skip",
                vec![with_report_mode(
                    images(&["nginx:*"]),
                    ExceptionReportMode::Skip,
                )],
            ),
        ];
        let nginx = ["nginx:1.25".to_string()];
        let evaluation = evaluate(
            &candidates,
            "disallow-latest",
            "check-tag",
            &nginx,
            &mk_pod("default", "pod-0"),
        );
        assert_eq!(names(&evaluation), vec!["warn", "pass", "skip"]);
        assert_eq!(evaluation.report_mode, ExceptionReportMode::Pass);
    }
}
