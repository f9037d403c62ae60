//! The largest value found at a `key=>key` path across a Crossref dump.

use std::cmp::Ordering;
use std::path::Path;

use serde_json::Value;

use crate::IngestError;
use crate::preprocess::{get_all_files, load_json};

/// Split a `key=>key=>…` field expression.
pub fn parse_field_path(expr: &str) -> Vec<String> {
    expr.split("=>")
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

fn lookup<'a>(item: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(item, |value, key| value.get(key.as_str()))
}

/// Numbers compare numerically, strings lexically; anything else is unordered.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Walk every `.json` member of `input` and return the largest value at
/// `path` among its `items` (or `message.items`).
pub fn check_metadata(input: &Path, path: &[String]) -> Result<Option<Value>, IngestError> {
    let (members, handle) = get_all_files(input, ".json")?;
    let total = members.len();
    let mut best: Option<Value> = None;

    for (index, member) in members.iter().enumerate() {
        let json = match load_json(member, handle.as_ref(), index, total) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(member = %member, error = %e, "skipping input file");
                continue;
            }
        };
        let items = json
            .get("items")
            .or_else(|| json.get("message").and_then(|m| m.get("items")))
            .and_then(Value::as_array);
        for item in items.into_iter().flatten() {
            let Some(value) = lookup(item, path).filter(|v| !v.is_null()) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some(current) => compare(value, current) == Some(Ordering::Greater),
            };
            if better {
                tracing::info!(value = %value, member = %member, "new largest value");
                best = Some(value.clone());
            }
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn field_paths_split_on_arrows() {
        assert_eq!(parse_field_path("reference-count"), vec!["reference-count"]);
        assert_eq!(parse_field_path("issued => date-parts"), vec!["issued", "date-parts"]);
    }

    #[test]
    fn finds_the_largest_value() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("1.json"),
            json!({"items": [{"reference-count": 3}, {"reference-count": 12}, {}]}).to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("2.json"),
            json!({"message": {"items": [{"reference-count": 7}]}}).to_string(),
        )
        .unwrap();
        std::fs::write(dir.path().join("3.json"), "not json").unwrap();

        let best = check_metadata(dir.path(), &parse_field_path("reference-count")).unwrap();
        assert_eq!(best, Some(json!(12)));
    }

    #[test]
    fn nested_paths_are_followed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("1.json"),
            json!({"items": [{"a": {"b": "x"}}, {"a": {"b": "z"}}, {"a": 1}]}).to_string(),
        )
        .unwrap();
        let best = check_metadata(dir.path(), &parse_field_path("a=>b")).unwrap();
        assert_eq!(best, Some(json!("z")));
    }
}
