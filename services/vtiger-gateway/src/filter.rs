//! `find` payload shaping
//!
//! Callers send a filter document such as
//! `{"where": {"and": [{"lastname": "Moreau"}, {"mailingcity": "Lyon"}]}}`.
//! The remote `find` operation takes one flat criteria object, so an `and`
//! list is merged left to right (later keys win). A `where` without `and` is
//! forwarded unchanged and a missing `where` becomes `{}`.

use serde_json::{Map, Value};

/// Rejected filter documents.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("filter must be a JSON object")]
    NotAnObject,

    #[error("where.and must be an array of objects")]
    InvalidAnd,
}

pub fn build_data_filter(filter: &Value) -> Result<Value, FilterError> {
    let filter = filter.as_object().ok_or(FilterError::NotAnObject)?;

    let clause = match filter.get("where") {
        None | Some(Value::Null) => return Ok(Value::Object(Map::new())),
        Some(Value::Object(clause)) => clause,
        Some(_) => return Err(FilterError::NotAnObject),
    };

    let Some(and) = clause.get("and") else {
        return Ok(Value::Object(clause.clone()));
    };

    let items = and.as_array().ok_or(FilterError::InvalidAnd)?;
    let mut merged = Map::new();
    for item in items {
        let fields = item.as_object().ok_or(FilterError::InvalidAnd)?;
        merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    Ok(Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_where_is_empty_criteria() {
        assert_eq!(build_data_filter(&json!({})).unwrap(), json!({}));
        assert_eq!(build_data_filter(&json!({"where": null})).unwrap(), json!({}));
    }

    #[test]
    fn plain_where_is_forwarded() {
        let filter = json!({"where": {"email": "a.moreau@example.com"}});
        assert_eq!(
            build_data_filter(&filter).unwrap(),
            json!({"email": "a.moreau@example.com"})
        );
    }

    #[test]
    fn and_list_is_merged() {
        let filter = json!({"where": {"and": [
            {"lastname": "Moreau"},
            {"mailingcity": "Lyon", "lastname": "Martin"}
        ]}});
        assert_eq!(
            build_data_filter(&filter).unwrap(),
            json!({"lastname": "Martin", "mailingcity": "Lyon"})
        );
    }

    #[test]
    fn malformed_filters_are_rejected() {
        assert_eq!(build_data_filter(&json!([])), Err(FilterError::NotAnObject));
        assert_eq!(
            build_data_filter(&json!({"where": "lastname=Moreau"})),
            Err(FilterError::NotAnObject)
        );
        assert_eq!(
            build_data_filter(&json!({"where": {"and": {"lastname": "Moreau"}}})),
            Err(FilterError::InvalidAnd)
        );
        assert_eq!(
            build_data_filter(&json!({"where": {"and": ["lastname"]}})),
            Err(FilterError::InvalidAnd)
        );
    }
}
