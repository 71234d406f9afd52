//! Captured host values referenced from query trees.

use serde::Serialize;

use crate::error::{ExqlError, ExqlResult};
use crate::value::Value;

/// A value captured from the calling code, looked up structurally.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Scalar(Value),
    Object {
        type_name: String,
        fields: Vec<(String, HostValue)>,
    },
}

impl HostValue {
    /// An empty object of the given type.
    pub fn object(type_name: impl Into<String>) -> Self {
        HostValue::Object {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a member. Scalars ignore this.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<HostValue>) -> Self {
        if let HostValue::Object { fields, .. } = &mut self {
            fields.push((name.into(), value.into()));
        }
        self
    }

    /// Capture any serializable value, nested structs becoming nested objects.
    pub fn from_serialize<T: Serialize>(type_name: &str, value: &T) -> ExqlResult<Self> {
        let json = serde_json::to_value(value).map_err(|e| ExqlError::InvalidValue(e.to_string()))?;
        Self::from_json(type_name, json)
    }

    fn from_json(type_name: &str, json: serde_json::Value) -> ExqlResult<Self> {
        let value = match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(_) => {
                return Err(ExqlError::InvalidValue(format!(
                    "sequences cannot be captured ({})",
                    type_name
                )));
            }
            serde_json::Value::Object(map) => {
                let fields = map
                    .into_iter()
                    .map(|(name, v)| {
                        let nested = format!("{}.{}", type_name, name);
                        Self::from_json(&nested, v).map(|hv| (name, hv))
                    })
                    .collect::<ExqlResult<Vec<_>>>()?;
                return Ok(HostValue::Object {
                    type_name: type_name.to_string(),
                    fields,
                });
            }
        };
        Ok(HostValue::Scalar(value))
    }

    pub fn type_name(&self) -> String {
        match self {
            HostValue::Scalar(v) => v
                .value_type()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "Null".to_string()),
            HostValue::Object { type_name, .. } => type_name.clone(),
        }
    }

    /// Structural member lookup.
    pub fn member(&self, name: &str) -> ExqlResult<&HostValue> {
        match self {
            HostValue::Object { fields, .. } => fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v)
                .ok_or_else(|| ExqlError::member(name, self.type_name())),
            HostValue::Scalar(_) => Err(ExqlError::member(name, self.type_name())),
        }
    }
}

macro_rules! impl_host_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for HostValue {
                fn from(v: $ty) -> Self {
                    HostValue::Scalar(v.into())
                }
            }
        )*
    };
}

impl_host_scalar!(Value, bool, i32, i64, f64, &str, String, chrono::NaiveDateTime, chrono::NaiveDate);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Range {
        min_age: i64,
        label: String,
    }

    #[test]
    fn test_structural_lookup() {
        let filter = HostValue::object("Filter").with("MinAge", 30).with("City", "Oslo");
        assert_eq!(filter.member("MinAge").unwrap(), &HostValue::Scalar(Value::Int(30)));

        let err = filter.member("MaxAge").unwrap_err();
        assert_eq!(err.to_string(), "Member 'MaxAge' not found on 'Filter'");
    }

    #[test]
    fn test_from_serialize() {
        let range = Range {
            min_age: 21,
            label: "adults".into(),
        };
        let host = HostValue::from_serialize("Range", &range).unwrap();
        assert_eq!(host.member("min_age").unwrap(), &HostValue::Scalar(Value::Int(21)));
        assert_eq!(host.type_name(), "Range");
    }

    #[test]
    fn test_sequences_rejected() {
        assert!(HostValue::from_serialize("Ids", &vec![1, 2]).is_err());
    }
}
