//! Scalar values exchanged between expression trees, SQL text and cursors.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{ExqlError, ExqlResult};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Declared type of a field, column or scalar expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Text,
    DateTime,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::Bool => "Bool",
            ValueType::Int => "Int",
            ValueType::Float => "Float",
            ValueType::Text => "Text",
            ValueType::DateTime => "DateTime",
        };
        f.write_str(name)
    }
}

/// A dynamically typed scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    /// The type of this value, `None` for NULL.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueType::Bool),
            Value::Int(_) => Some(ValueType::Int),
            Value::Float(_) => Some(ValueType::Float),
            Value::Text(_) => Some(ValueType::Text),
            Value::DateTime(_) => Some(ValueType::DateTime),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render this value as a T-SQL literal. Booleans become `1`/`0`;
    /// NaN and infinities have no literal form.
    pub fn to_sql_literal(&self) -> ExqlResult<String> {
        let literal = match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "1".to_string(),
            Value::Bool(false) => "0".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) if !n.is_finite() => {
                return Err(ExqlError::InvalidValue(format!("{} has no SQL literal", n)));
            }
            Value::Float(n) => format!("{:?}", n),
            Value::Text(s) => quote_text(s),
            Value::DateTime(dt) => format!("'{}'", dt.format(DATETIME_FORMAT)),
        };
        Ok(literal)
    }

    /// Coerce into `target`.
    ///
    /// NULL passes through untouched and textual targets accept any value via
    /// stringification. Every other mismatch is an error.
    pub fn coerce(self, target: ValueType) -> ExqlResult<Value> {
        match (self.value_type(), target) {
            (None, _) => Ok(self),
            (Some(found), target) if found == target => Ok(self),
            (Some(_), ValueType::Text) => Ok(Value::Text(self.to_string())),
            (Some(found), expected) => Err(ExqlError::TypeMismatch {
                expected,
                found: found.to_string(),
            }),
        }
    }

    /// Render as JSON for display surfaces.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(_) | Value::DateTime(_) => serde_json::Value::String(self.to_string()),
        }
    }
}

/// Parse a datetime stored as text, as SQLite and the `Any` driver return it.
pub fn parse_datetime(text: &str) -> ExqlResult<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    let text = text.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| ExqlError::TypeMismatch {
            expected: ValueType::DateTime,
            found: format!("Text '{}'", text),
        })
}

/// Quote a string as a SQL text literal.
pub(crate) fn quote_text(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Generic stringification, used by textual coercion.
impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

/// Typed extraction from a [`Value`], coercing first.
pub trait FromValue: Sized {
    /// Declared type used when coercing.
    const TYPE: ValueType;

    fn from_value(value: Value) -> ExqlResult<Self>;
}

fn unexpected(expected: ValueType, value: &Value) -> ExqlError {
    ExqlError::TypeMismatch {
        expected,
        found: value
            .value_type()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "NULL".to_string()),
    }
}

macro_rules! impl_from_value {
    ($ty:ty, $vt:expr, $pat:pat => $out:expr) => {
        impl FromValue for $ty {
            const TYPE: ValueType = $vt;

            fn from_value(value: Value) -> ExqlResult<Self> {
                match value.coerce(Self::TYPE)? {
                    $pat => Ok($out),
                    other => Err(unexpected(Self::TYPE, &other)),
                }
            }
        }
    };
}

impl_from_value!(bool, ValueType::Bool, Value::Bool(b) => b);
impl_from_value!(i64, ValueType::Int, Value::Int(n) => n);
impl_from_value!(f64, ValueType::Float, Value::Float(n) => n);
impl_from_value!(String, ValueType::Text, Value::Text(s) => s);
impl_from_value!(NaiveDateTime, ValueType::DateTime, Value::DateTime(dt) => dt);

impl FromValue for i32 {
    const TYPE: ValueType = ValueType::Int;

    fn from_value(value: Value) -> ExqlResult<Self> {
        let n = i64::from_value(value)?;
        i32::try_from(n).map_err(|_| ExqlError::InvalidValue(format!("{} does not fit in i32", n)))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const TYPE: ValueType = T::TYPE;

    fn from_value(value: Value) -> ExqlResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::DateTime(v.and_hms_opt(0, 0, 0).unwrap_or_default())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_literals() {
        assert_eq!(Value::from("O'Brien").to_sql_literal().unwrap(), "'O''Brien'");
        assert_eq!(Value::Int(42).to_sql_literal().unwrap(), "42");
        assert_eq!(Value::Float(2.5).to_sql_literal().unwrap(), "2.5");
        assert_eq!(Value::Bool(true).to_sql_literal().unwrap(), "1");
        assert_eq!(Value::Bool(false).to_sql_literal().unwrap(), "0");
        assert_eq!(Value::Null.to_sql_literal().unwrap(), "NULL");

        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(Value::from(date).to_sql_literal().unwrap(), "'2024-03-01 00:00:00'");
    }

    #[test]
    fn test_parse_datetime_text() {
        let noon = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(12, 30, 0).unwrap();
        assert_eq!(parse_datetime("2024-03-01 12:30:00").unwrap(), noon);
        assert_eq!(parse_datetime("2024-03-01T12:30:00").unwrap(), noon);
        assert_eq!(
            parse_datetime("2024-03-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert!(matches!(parse_datetime("soon"), Err(ExqlError::TypeMismatch { .. })));
    }

    #[test]
    fn test_non_finite_floats_have_no_literal() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                Value::Float(value).to_sql_literal(),
                Err(ExqlError::InvalidValue(_))
            ));
        }
    }

    #[test]
    fn test_text_coercion_stringifies() {
        assert_eq!(Value::Int(7).coerce(ValueType::Text).unwrap(), Value::from("7"));
        assert_eq!(Value::Bool(false).coerce(ValueType::Text).unwrap(), Value::from("false"));
        assert_eq!(Value::Null.coerce(ValueType::Int).unwrap(), Value::Null);
    }

    #[test]
    fn test_other_mismatches_fail() {
        let err = Value::from("seven").coerce(ValueType::Int).unwrap_err();
        assert!(matches!(err, ExqlError::TypeMismatch { expected: ValueType::Int, .. }));
        assert!(Value::Int(1).coerce(ValueType::Float).is_err());
    }

    #[test]
    fn test_from_value() {
        assert_eq!(i64::from_value(Value::Int(3)).unwrap(), 3);
        assert_eq!(String::from_value(Value::Int(3)).unwrap(), "3");
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
        assert!(i64::from_value(Value::Null).is_err());
        assert!(i32::from_value(Value::Int(i64::MAX)).is_err());
    }
}
