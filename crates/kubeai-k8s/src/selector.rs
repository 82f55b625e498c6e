use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

/// Render a label selector in the string form accepted by the list API,
/// e.g. `app=api,tier in (backend,worker),!canary`
pub fn format_label_selector(selector: &LabelSelector) -> String {
    let mut parts: Vec<String> = selector
        .match_labels
        .iter()
        .flatten()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    for expr in selector.match_expressions.iter().flatten() {
        let values = expr.values.as_deref().unwrap_or_default().join(",");
        let part = match expr.operator.as_str() {
            "In" => format!("{} in ({})", expr.key, values),
            "NotIn" => format!("{} notin ({})", expr.key, values),
            "Exists" => expr.key.clone(),
            "DoesNotExist" => format!("!{}", expr.key),
            // Unknown operators would make the whole selector invalid
            _ => continue,
        };
        parts.push(part);
    }

    parts.join(",")
}
