use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::BTreeMap;

/// Evaluates a label selector against a label map.
///
/// A `None` selector matches nothing — an explicit policy to avoid a
/// quota whose `namespaceSelector` was left unset silently claiming the
/// whole cluster.
pub fn matches(selector: Option<&LabelSelector>, labels: &BTreeMap<String, String>) -> bool {
    let Some(selector) = selector else {
        return false;
    };
    if let Some(match_labels) = &selector.match_labels {
        for (key, value) in match_labels {
            if labels.get(key) != Some(value) {
                return false;
            }
        }
    }
    if let Some(expressions) = &selector.match_expressions {
        for expr in expressions {
            if !matches_expression(expr, labels) {
                return false;
            }
        }
    }
    true
}

fn matches_expression(
    expr: &k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> bool {
    let values = expr.values.as_deref().unwrap_or(&[]);
    match expr.operator.as_str() {
        "In" => labels.get(&expr.key).is_some_and(|v| values.contains(v)),
        "NotIn" => !labels.get(&expr.key).is_some_and(|v| values.contains(v)),
        "Exists" => labels.contains_key(&expr.key),
        "DoesNotExist" => !labels.contains_key(&expr.key),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn nil_selector_matches_nothing() {
        assert!(!matches(None, &labels(&[("team", "alpha")])));
    }

    #[test]
    fn empty_selector_matches_everything() {
        let selector = LabelSelector::default();
        assert!(matches(Some(&selector), &labels(&[("team", "alpha")])));
    }

    #[test]
    fn match_labels_requires_exact_value() {
        let selector = LabelSelector {
            match_labels: Some([("team".to_owned(), "alpha".to_owned())].into()),
            ..Default::default()
        };
        assert!(matches(Some(&selector), &labels(&[("team", "alpha")])));
        assert!(!matches(Some(&selector), &labels(&[("team", "beta")])));
    }

    #[test]
    fn in_operator() {
        let selector = LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "tier".to_owned(),
                operator: "In".to_owned(),
                values: Some(vec!["backend".to_owned(), "frontend".to_owned()]),
            }]),
            ..Default::default()
        };
        assert!(matches(Some(&selector), &labels(&[("tier", "backend")])));
        assert!(!matches(Some(&selector), &labels(&[("tier", "data")])));
    }

    #[test]
    fn exists_operator() {
        let selector = LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "canary".to_owned(),
                operator: "Exists".to_owned(),
                values: None,
            }]),
            ..Default::default()
        };
        assert!(matches(Some(&selector), &labels(&[("canary", "true")])));
        assert!(!matches(Some(&selector), &labels(&[("team", "alpha")])));
    }
}
