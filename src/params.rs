//! Strict method-parameter validation.
//!
//! Each handler declares the full set of fields it recognizes; anything else
//! in `params` is rejected up front. All extraction failures funnel through a
//! single error path that names the offending field, so a client always
//! learns *which* parameter was wrong.

// Rust guideline compliant 2026-02

use serde_json::{Map, Value};

use crate::error::{RpcError, RpcResult};

/// Validated view over a request's `params` object.
///
/// Construct with [`Params::parse`], then pull typed fields. Getters return
/// `InvalidParams` with the field name on absence or type mismatch; the
/// `opt_*` variants return `None` on absence but still reject a present
/// field of the wrong type.
#[derive(Debug)]
pub struct Params {
    map: Map<String, Value>,
}

impl Params {
    /// Validate `raw` against the enumerated set of recognized fields.
    ///
    /// `Null` is accepted as an empty object (params omitted entirely).
    ///
    /// # Errors
    ///
    /// `InvalidParams` naming the first unrecognized field, or `params` when
    /// the value is neither an object nor null.
    pub fn parse(raw: &Value, recognized: &[&str]) -> RpcResult<Self> {
        let map = match raw {
            Value::Null => Map::new(),
            Value::Object(m) => m.clone(),
            _ => return Err(RpcError::bad_param("params")),
        };
        for key in map.keys() {
            if !recognized.contains(&key.as_str()) {
                return Err(RpcError::bad_param(key));
            }
        }
        Ok(Self { map })
    }

    /// Required string field.
    pub fn str(&self, field: &str) -> RpcResult<&str> {
        self.map
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::bad_param(field))
    }

    /// Optional string field.
    pub fn opt_str(&self, field: &str) -> RpcResult<Option<&str>> {
        match self.map.get(field) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(Some)
                .ok_or_else(|| RpcError::bad_param(field)),
        }
    }

    /// Optional non-negative integer field.
    pub fn opt_uint(&self, field: &str) -> RpcResult<Option<u64>> {
        match self.map.get(field) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .map(Some)
                .ok_or_else(|| RpcError::bad_param(field)),
        }
    }

    /// Optional non-negative number field (accepts integers and floats).
    pub fn opt_f64(&self, field: &str) -> RpcResult<Option<f64>> {
        match self.map.get(field) {
            None => Ok(None),
            Some(v) => match v.as_f64() {
                Some(n) if n >= 0.0 && n.is_finite() => Ok(Some(n)),
                _ => Err(RpcError::bad_param(field)),
            },
        }
    }

    /// Optional field of any JSON type, returned by reference.
    #[must_use]
    pub fn opt_value(&self, field: &str) -> Option<&Value> {
        self.map.get(field)
    }

    /// Required array field.
    pub fn list(&self, field: &str) -> RpcResult<&Vec<Value>> {
        self.map
            .get(field)
            .and_then(Value::as_array)
            .ok_or_else(|| RpcError::bad_param(field))
    }

    /// Required object field.
    pub fn object(&self, field: &str) -> RpcResult<&Map<String, Value>> {
        self.map
            .get(field)
            .and_then(Value::as_object)
            .ok_or_else(|| RpcError::bad_param(field))
    }

    /// True if the field is present (any type).
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.map.contains_key(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrKind;
    use serde_json::json;

    #[test]
    fn test_null_params_is_empty() {
        let p = Params::parse(&Value::Null, &[]).unwrap();
        assert!(!p.has("anything"));
    }

    #[test]
    fn test_unrecognized_field_named() {
        let err = Params::parse(&json!({"pipeid": "x", "bogus": 1}), &["pipeid"]).unwrap_err();
        assert_eq!(err.kind, ErrKind::InvalidParams);
        assert_eq!(err.data.as_deref(), Some("bogus"));
    }

    #[test]
    fn test_non_object_params_rejected() {
        let err = Params::parse(&json!([1, 2]), &[]).unwrap_err();
        assert_eq!(err.data.as_deref(), Some("params"));
    }

    #[test]
    fn test_missing_required_field_named() {
        let p = Params::parse(&json!({}), &["pipeid"]).unwrap();
        let err = p.str("pipeid").unwrap_err();
        assert_eq!(err.data.as_deref(), Some("pipeid"));
    }

    #[test]
    fn test_wrong_type_named() {
        let p = Params::parse(&json!({"pipeid": 42}), &["pipeid"]).unwrap();
        let err = p.str("pipeid").unwrap_err();
        assert_eq!(err.data.as_deref(), Some("pipeid"));
    }

    #[test]
    fn test_optional_absent_is_none() {
        let p = Params::parse(&json!({}), &["length"]).unwrap();
        assert_eq!(p.opt_uint("length").unwrap(), None);
    }

    #[test]
    fn test_optional_present_wrong_type_rejected() {
        let p = Params::parse(&json!({"length": "three"}), &["length"]).unwrap();
        assert!(p.opt_uint("length").is_err());
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let p = Params::parse(&json!({"timeout": -1.0}), &["timeout"]).unwrap();
        assert!(p.opt_f64("timeout").is_err());
    }

    #[test]
    fn test_float_timeout_accepted() {
        let p = Params::parse(&json!({"timeout": 0.25}), &["timeout"]).unwrap();
        assert_eq!(p.opt_f64("timeout").unwrap(), Some(0.25));
    }
}
