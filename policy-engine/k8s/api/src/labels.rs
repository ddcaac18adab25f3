use crate::wildcard;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Expression {
    key: String,
    operator: Operator,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    values: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Selects resources (or namespaces) by label.
///
/// Keys and values in `matchLabels` may be globs, so `{"app.kubernetes.io/*": "*"}` selects any
/// resource carrying at least one label under that prefix. `{"*": "*"}` matches any label but
/// never an empty label set.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_labels: Option<Map>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    match_expressions: Option<Expressions>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSelector {
    #[error("label key must not be empty")]
    EmptyKey,

    #[error("values must be specified for operator {operator:?} on key {key}")]
    MissingValues { key: String, operator: Operator },

    #[error("values must not be specified for operator {operator:?} on key {key}")]
    UnexpectedValues { key: String, operator: Operator },
}

// === Selector ===

impl Selector {
    pub fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(exprs),
        }
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    /// Evaluates the selector against a label set, failing if the selector is malformed.
    pub fn try_matches(&self, labels: &Labels) -> Result<bool, InvalidSelector> {
        for expr in self.match_expressions.iter().flatten() {
            expr.validate()?;
        }
        for key in self.match_labels.iter().flat_map(|m| m.keys()) {
            if key.is_empty() {
                return Err(InvalidSelector::EmptyKey);
            }
        }

        for expr in self.match_expressions.iter().flatten() {
            if !expr.matches(labels.as_ref()) {
                return Ok(false);
            }
        }

        if let Some(match_labels) = self.match_labels.as_ref() {
            for (k, v) in match_labels.iter() {
                if !matches_label(labels.as_ref(), k, v) {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Like [`Selector::try_matches`], treating malformed selectors as non-matching.
    pub fn matches(&self, labels: &Labels) -> bool {
        self.try_matches(labels).unwrap_or(false)
    }
}

fn matches_label(labels: &Map, key: &str, value: &str) -> bool {
    if !wildcard::contains_wildcard(key) {
        return labels
            .get(key)
            .map(|v| wildcard::matches(value, v))
            .unwrap_or(false);
    }

    labels
        .iter()
        .any(|(k, v)| wildcard::matches(key, k) && wildcard::matches(value, v))
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

// === Labels ===

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl From<Option<&Map>> for Labels {
    #[inline]
    fn from(labels: Option<&Map>) -> Self {
        labels.cloned().unwrap_or_default().into()
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// === Expression ===

impl Expression {
    pub fn new(
        key: impl ToString,
        operator: Operator,
        values: impl IntoIterator<Item = impl ToString>,
    ) -> Self {
        Self {
            key: key.to_string(),
            operator,
            values: values.into_iter().map(|v| v.to_string()).collect(),
        }
    }

    fn validate(&self) -> Result<(), InvalidSelector> {
        if self.key.is_empty() {
            return Err(InvalidSelector::EmptyKey);
        }
        match self.operator {
            Operator::In | Operator::NotIn if self.values.is_empty() => {
                Err(InvalidSelector::MissingValues {
                    key: self.key.clone(),
                    operator: self.operator.clone(),
                })
            }
            Operator::Exists | Operator::DoesNotExist if !self.values.is_empty() => {
                Err(InvalidSelector::UnexpectedValues {
                    key: self.key.clone(),
                    operator: self.operator.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn matches(&self, labels: &Map) -> bool {
        match self.operator {
            Operator::In => labels
                .get(&self.key)
                .map(|v| self.values.contains(v))
                .unwrap_or(false),
            Operator::NotIn => labels
                .get(&self.key)
                .map(|v| !self.values.contains(v))
                .unwrap_or(true),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter::FromIterator;

    #[test]
    fn test_matches() {
        for (selector, labels, matches, msg) in &[
            (Selector::default(), Labels::default(), true, "empty match"),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(Some(("foo", "bar"))),
                true,
                "exact label match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "sufficient label match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(Some(("foo", "baz"))),
                false,
                "value mismatch",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::In, ["bar"]))),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "expression match",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::NotIn, ["bar"]))),
                Labels::from_iter(Some(("foo", "bar"))),
                false,
                "not-in excludes listed value",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::NotIn, ["bar"]))),
                Labels::default(),
                true,
                "not-in matches absent key",
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "foo",
                    Operator::Exists,
                    None::<String>,
                ))),
                Labels::from_iter(Some(("foo", "anything"))),
                true,
                "exists",
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "foo",
                    Operator::DoesNotExist,
                    None::<String>,
                ))),
                Labels::from_iter(Some(("foo", "anything"))),
                false,
                "does not exist",
            ),
            (
                Selector::from_iter(Some(("app.kubernetes.io/*", "*"))),
                Labels::from_iter(Some(("app.kubernetes.io/name", "web"))),
                true,
                "wildcard key",
            ),
            (
                Selector::from_iter(Some(("env", "prod-*"))),
                Labels::from_iter(Some(("env", "prod-eu"))),
                true,
                "wildcard value",
            ),
            (
                Selector::from_iter(Some(("*", "*"))),
                Labels::default(),
                false,
                "wildcard never matches an empty label set",
            ),
        ] {
            assert_eq!(selector.matches(labels), *matches, "{}", msg);
        }
    }

    #[test]
    fn rejects_malformed_selectors() {
        let selector = Selector::from_iter(Some(Expression::new(
            "foo",
            Operator::In,
            None::<String>,
        )));
        assert_eq!(
            selector.try_matches(&Labels::default()),
            Err(InvalidSelector::MissingValues {
                key: "foo".to_string(),
                operator: Operator::In,
            })
        );

        let selector = Selector::from_iter(Some(Expression::new("foo", Operator::Exists, ["x"])));
        assert!(selector.try_matches(&Labels::default()).is_err());
        assert!(!selector.matches(&Labels::default()));
    }
}
