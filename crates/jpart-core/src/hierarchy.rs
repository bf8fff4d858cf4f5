//! Hierarchical field lookup - resolves `a.b.0.c` style references

use serde_json::Value;
use thiserror::Error;

/// The reference did not resolve against the record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{reference}' not found")]
pub struct FieldNotFound {
    pub reference: String,
}

impl FieldNotFound {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

/// Splits a reference into path segments.
///
/// `items[1].name` and `items.1.name` produce the same segments. Returns
/// `None` for malformed references (empty segments, unbalanced brackets).
fn segments(reference: &str) -> Option<Vec<&str>> {
    let mut out = Vec::new();

    for part in reference.split('.') {
        let (head, mut rest) = match part.find('[') {
            Some(i) => part.split_at(i),
            None => (part, ""),
        };

        if !head.is_empty() {
            out.push(head);
        } else if rest.is_empty() {
            return None;
        }

        while !rest.is_empty() {
            let close = rest.find(']')?;
            let index = &rest[1..close];
            if index.is_empty() {
                return None;
            }
            out.push(index);
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return None;
            }
        }
    }

    Some(out)
}

/// Resolve `reference` against `record`, descending through objects by key
/// and arrays by index.
pub fn lookup<'a>(record: &'a Value, reference: &str) -> Result<&'a Value, FieldNotFound> {
    let path = segments(reference).ok_or_else(|| FieldNotFound::new(reference))?;

    let mut current = record;
    for segment in path {
        current = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
        .ok_or_else(|| FieldNotFound::new(reference))?;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_field() {
        let record = json!({"aa": 11, "bb": 22, "cc": 33});
        assert_eq!(lookup(&record, "aa").unwrap(), &json!(11));
        assert_eq!(lookup(&record, "bb").unwrap(), &json!(22));
        assert_eq!(lookup(&record, "cc").unwrap(), &json!(33));
    }

    #[test]
    fn test_nested_object() {
        let record = json!({"request": {"headers": {"host": "example.com"}}});
        assert_eq!(
            lookup(&record, "request.headers.host").unwrap(),
            &json!("example.com")
        );
    }

    #[test]
    fn test_array_index_dotted_and_bracketed() {
        let record = json!({"items": [{"sku": "a1"}, {"sku": "b2"}]});
        assert_eq!(lookup(&record, "items.1.sku").unwrap(), &json!("b2"));
        assert_eq!(lookup(&record, "items[1].sku").unwrap(), &json!("b2"));
        assert_eq!(lookup(&record, "items[0]").unwrap(), &json!({"sku": "a1"}));
    }

    #[test]
    fn test_nested_arrays() {
        let record = json!({"grid": [[1, 2], [3, 4]]});
        assert_eq!(lookup(&record, "grid[1][0]").unwrap(), &json!(3));
    }

    #[test]
    fn test_numeric_key_on_object() {
        let record = json!({"codes": {"0": "zero"}});
        assert_eq!(lookup(&record, "codes.0").unwrap(), &json!("zero"));
    }

    #[test]
    fn test_missing_field() {
        let record = json!({"aa": 1});
        let err = lookup(&record, "bb").unwrap_err();
        assert_eq!(err.reference, "bb");
    }

    #[test]
    fn test_missing_nested_segment() {
        let record = json!({"a": {"b": 1}});
        assert!(lookup(&record, "a.c").is_err());
        assert!(lookup(&record, "a.b.c").is_err());
    }

    #[test]
    fn test_index_out_of_bounds() {
        let record = json!({"items": [1]});
        assert!(lookup(&record, "items.3").is_err());
        assert!(lookup(&record, "items.x").is_err());
    }

    #[test]
    fn test_malformed_references() {
        let record = json!({"a": [1]});
        assert!(lookup(&record, "").is_err());
        assert!(lookup(&record, "a..b").is_err());
        assert!(lookup(&record, "a[0").is_err());
        assert!(lookup(&record, "a[]").is_err());
        assert!(lookup(&record, "a[0]x").is_err());
    }

    #[test]
    fn test_null_value_is_found() {
        let record = json!({"a": null});
        assert_eq!(lookup(&record, "a").unwrap(), &Value::Null);
    }
}
