//! `{{dotted.path[0]}}` placeholder resolution over JSON contexts.
//!
//! Templates are authored data, so resolution never fails: an unresolvable
//! placeholder renders as an empty string.

use serde_json::Value;

/// A dotted path that does not lead to a value. Distinct from a path that
/// leads to an explicit `null`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("path {path} not found (stopped at segment {segment})")]
pub struct PathNotFound {
    pub path: String,
    pub segment: String,
}

/// Walks `context` through `dotted`, supporting `prop[n]` array indexing on a
/// segment.
pub fn resolve_path<'a>(context: &'a Value, dotted: &str) -> Result<&'a Value, PathNotFound> {
    let not_found = |segment: &str| PathNotFound {
        path: dotted.to_string(),
        segment: segment.to_string(),
    };

    let mut current = context;
    for segment in dotted.split('.').map(str::trim) {
        if segment.is_empty() {
            return Err(not_found(segment));
        }
        let (property, index) = split_index(segment).ok_or_else(|| not_found(segment))?;

        if !property.is_empty() {
            current = match current {
                Value::Object(map) => map.get(property),
                Value::Array(items) => property.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(|| not_found(segment))?;
        }

        if let Some(index) = index {
            current = current
                .as_array()
                .and_then(|items| items.get(index))
                .ok_or_else(|| not_found(segment))?;
        }
    }
    Ok(current)
}

/// Replaces every `{{path}}` placeholder with the resolved value's text.
pub fn resolve_template(template: &str, context: &Value) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            output.push_str(&rest[start..]);
            return output;
        };
        let path = after_open[..end].trim();
        if let Ok(value) = resolve_path(context, path) {
            output.push_str(&value_text(value));
        }
        rest = &after_open[end + 2..];
    }
    output.push_str(rest);
    output
}

fn split_index(segment: &str) -> Option<(&str, Option<usize>)> {
    match segment.find('[') {
        None => Some((segment, None)),
        Some(open) => {
            let close = segment.rfind(']')?;
            if close != segment.len() - 1 || close < open {
                return None;
            }
            let index = segment[open + 1..close].trim().parse::<usize>().ok()?;
            Some((&segment[..open], Some(index)))
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Value {
        json!({
            "name": "Genesis",
            "data": {
                "year": 1450,
                "authors": [{ "name": "Moses" }, { "name": "Scribe" }],
                "empty": null
            }
        })
    }

    #[test]
    fn resolves_nested_and_indexed_paths() {
        let ctx = context();
        assert_eq!(resolve_path(&ctx, "data.year").expect("year"), &json!(1450));
        assert_eq!(
            resolve_path(&ctx, "data.authors[1].name").expect("author"),
            &json!("Scribe")
        );
    }

    #[test]
    fn distinguishes_missing_from_null() {
        let ctx = context();
        assert_eq!(resolve_path(&ctx, "data.empty").expect("null"), &Value::Null);
        let missing = resolve_path(&ctx, "data.nothing").expect_err("missing");
        assert_eq!(missing.segment, "nothing");
        assert!(resolve_path(&ctx, "data.authors[9]").is_err());
        assert!(resolve_path(&ctx, "data.authors[x]").is_err());
    }

    #[test]
    fn renders_templates_and_blanks_missing_values() {
        let ctx = context();
        assert_eq!(
            resolve_template("{{ name }} ({{data.year}}) by {{data.authors[0].name}}", &ctx),
            "Genesis (1450) by Moses"
        );
        assert_eq!(resolve_template("[{{data.missing}}]", &ctx), "[]");
        assert_eq!(resolve_template("no placeholders", &ctx), "no placeholders");
        assert_eq!(resolve_template("open {{name", &ctx), "open {{name");
    }
}
