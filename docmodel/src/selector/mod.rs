//! Selector queries over documents.
//!
//! A selector is a JSON object in the Mango dialect:
//! `{"name": "Alice"}`, `{"age": {"$gte": 30}}`,
//! `{"$or": [{"role": "admin"}, {"age": {"$lt": 18}}]}`.
//! Comparisons never coerce between JSON types.

use crate::document::Document;
use crate::error::StoreError;
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A parsed selector, ready to evaluate.
#[derive(Debug, Clone)]
pub enum Selector {
    /// Every sub-selector must match. An empty list matches everything.
    All(Vec<Selector>),
    /// At least one sub-selector must match.
    Any(Vec<Selector>),
    Not(Box<Selector>),
    Field { path: String, condition: Condition },
}

/// A condition on one field value.
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
}

impl Selector {
    /// Selector matching every document.
    pub fn all() -> Self {
        Selector::All(Vec::new())
    }

    /// Shorthand for a single equality condition.
    pub fn eq(path: impl Into<String>, value: Value) -> Self {
        Selector::Field {
            path: path.into(),
            condition: Condition::Eq(value),
        }
    }

    pub fn parse(value: &Value) -> Result<Self, StoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| invalid("selector must be an object"))?;
        parse_object(obj)
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Selector::All(parts) => parts.iter().all(|p| p.matches(doc)),
            Selector::Any(parts) => parts.iter().any(|p| p.matches(doc)),
            Selector::Not(inner) => !inner.matches(doc),
            Selector::Field { path, condition } => condition.matches(lookup(doc, path)),
        }
    }
}

impl TryFrom<&Value> for Selector {
    type Error = StoreError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Selector::parse(value)
    }
}

impl Condition {
    fn matches(&self, actual: Option<&Value>) -> bool {
        let Some(actual) = actual else {
            return matches!(
                self,
                Condition::Exists(false) | Condition::Ne(_) | Condition::Nin(_)
            );
        };

        match self {
            Condition::Eq(expected) => actual == expected,
            Condition::Ne(expected) => actual != expected,
            Condition::Gt(bound) => compare(actual, bound) == Some(Ordering::Greater),
            Condition::Gte(bound) => matches!(
                compare(actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::Lt(bound) => compare(actual, bound) == Some(Ordering::Less),
            Condition::Lte(bound) => {
                matches!(compare(actual, bound), Some(Ordering::Less | Ordering::Equal))
            }
            Condition::In(options) => options.contains(actual),
            Condition::Nin(options) => !options.contains(actual),
            Condition::Exists(expected) => *expected,
            Condition::Regex(re) => actual.as_str().is_some_and(|s| re.is_match(s)),
        }
    }
}

fn parse_object(obj: &Map<String, Value>) -> Result<Selector, StoreError> {
    let mut parts = Vec::with_capacity(obj.len());

    for (key, value) in obj {
        let part = match key.as_str() {
            "$and" => Selector::All(parse_list(key, value)?),
            "$or" => Selector::Any(parse_list(key, value)?),
            "$not" => Selector::Not(Box::new(Selector::parse(value)?)),
            op if op.starts_with('$') => {
                return Err(invalid(format!("unknown combinator '{op}'")));
            }
            path => parse_field(path, value)?,
        };
        parts.push(part);
    }

    Ok(if parts.len() == 1 {
        parts.remove(0)
    } else {
        Selector::All(parts)
    })
}

fn parse_list(key: &str, value: &Value) -> Result<Vec<Selector>, StoreError> {
    value
        .as_array()
        .ok_or_else(|| invalid(format!("'{key}' expects an array of selectors")))?
        .iter()
        .map(Selector::parse)
        .collect()
}

fn parse_field(path: &str, value: &Value) -> Result<Selector, StoreError> {
    let operators = match value {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => map,
        _ => return Ok(Selector::eq(path, value.clone())),
    };

    let mut parts = Vec::with_capacity(operators.len());
    for (op, arg) in operators {
        let condition = match op.as_str() {
            "$eq" => Condition::Eq(arg.clone()),
            "$ne" => Condition::Ne(arg.clone()),
            "$gt" => Condition::Gt(arg.clone()),
            "$gte" => Condition::Gte(arg.clone()),
            "$lt" => Condition::Lt(arg.clone()),
            "$lte" => Condition::Lte(arg.clone()),
            "$in" => Condition::In(expect_array(op, arg)?),
            "$nin" => Condition::Nin(expect_array(op, arg)?),
            "$exists" => Condition::Exists(
                arg.as_bool()
                    .ok_or_else(|| invalid("'$exists' expects a boolean"))?,
            ),
            "$regex" => {
                let pattern = arg
                    .as_str()
                    .ok_or_else(|| invalid("'$regex' expects a string"))?;
                Condition::Regex(
                    Regex::new(pattern).map_err(|e| invalid(format!("bad '$regex': {e}")))?,
                )
            }
            other => return Err(invalid(format!("unknown operator '{other}'"))),
        };
        parts.push(Selector::Field {
            path: path.to_string(),
            condition,
        });
    }

    Ok(if parts.len() == 1 {
        parts.remove(0)
    } else {
        Selector::All(parts)
    })
}

fn expect_array(op: &str, arg: &Value) -> Result<Vec<Value>, StoreError> {
    arg.as_array()
        .cloned()
        .ok_or_else(|| invalid(format!("'{op}' expects an array")))
}

/// Resolve a dotted path inside a document. `null` counts as missing.
fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    (!current.is_null()).then_some(current)
}

fn compare(actual: &Value, bound: &Value) -> Option<Ordering> {
    match (actual, bound) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn invalid(msg: impl Into<String>) -> StoreError {
    StoreError::InvalidSelector(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn people() -> Vec<Document> {
        vec![
            doc(json!({ "_id": "1", "name": "Alice", "age": 25, "role": "admin",
                        "address": { "city": "Lima" } })),
            doc(json!({ "_id": "2", "name": "Bob", "age": 30, "role": "member" })),
            doc(json!({ "_id": "3", "name": "Carol", "age": 41, "nick": null })),
        ]
    }

    fn ids(selector: Value) -> Vec<String> {
        let sel = Selector::parse(&selector).unwrap();
        people()
            .into_iter()
            .filter(|d| sel.matches(d))
            .map(|d| d.id().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_implicit_equality() {
        assert_eq!(ids(json!({ "name": "Alice" })), vec!["1"]);
        assert_eq!(ids(json!({ "name": { "$eq": "Bob" } })), vec!["2"]);
        assert!(ids(json!({ "name": "Zed" })).is_empty());
    }

    #[test]
    fn test_empty_selector_matches_all() {
        assert_eq!(ids(json!({})), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_range_operators() {
        assert_eq!(ids(json!({ "age": { "$gte": 30 } })), vec!["2", "3"]);
        assert_eq!(ids(json!({ "age": { "$gt": 25, "$lt": 41 } })), vec!["2"]);
        assert_eq!(ids(json!({ "age": { "$lte": 25 } })), vec!["1"]);
        assert_eq!(ids(json!({ "name": { "$gt": "B" } })), vec!["2", "3"]);
    }

    #[test]
    fn test_no_type_coercion() {
        assert!(ids(json!({ "age": { "$gt": "20" } })).is_empty());
        assert!(ids(json!({ "age": "25" })).is_empty());
    }

    #[test]
    fn test_membership_and_existence() {
        assert_eq!(ids(json!({ "role": { "$in": ["admin", "member"] } })), vec!["1", "2"]);
        assert_eq!(ids(json!({ "role": { "$nin": ["admin"] } })), vec!["2", "3"]);
        assert_eq!(ids(json!({ "role": { "$exists": false } })), vec!["3"]);
        assert_eq!(ids(json!({ "nick": { "$exists": true } })), Vec::<String>::new());
        assert_eq!(ids(json!({ "role": { "$ne": "admin" } })), vec!["2", "3"]);
    }

    #[test]
    fn test_combinators() {
        assert_eq!(
            ids(json!({ "$or": [{ "role": "admin" }, { "age": { "$gt": 40 } }] })),
            vec!["1", "3"]
        );
        assert_eq!(
            ids(json!({ "$and": [{ "age": { "$gte": 25 } }, { "role": "member" }] })),
            vec!["2"]
        );
        assert_eq!(ids(json!({ "$not": { "role": "admin" } })), vec!["2", "3"]);
    }

    #[test]
    fn test_nested_path_and_regex() {
        assert_eq!(ids(json!({ "address.city": "Lima" })), vec!["1"]);
        assert_eq!(ids(json!({ "name": { "$regex": "^[AB]" } })), vec!["1", "2"]);
    }

    #[test]
    fn test_literal_object_is_equality() {
        let sel = Selector::parse(&json!({ "address": { "city": "Lima" } })).unwrap();
        assert!(sel.matches(&people()[0]));
    }

    #[test]
    fn test_malformed_selectors() {
        for bad in [
            json!([]),
            json!({ "age": { "$between": [1, 2] } }),
            json!({ "$or": { "a": 1 } }),
            json!({ "$where": "x" }),
            json!({ "role": { "$in": "admin" } }),
            json!({ "name": { "$regex": "(" } }),
            json!({ "name": { "$exists": 1 } }),
        ] {
            let err = Selector::parse(&bad).unwrap_err();
            assert_eq!(err.status(), 400, "{bad} should be rejected");
        }
    }
}
