//! Instance method calls: evaluated host-side when every input is known,
//! otherwise translated to SQL functions.

use chrono::{Duration, Months, NaiveDateTime};

use super::{Eval, Fragment, Translator};
use crate::ast::Expr;
use crate::error::{ExqlError, ExqlResult};
use crate::value::{Value, ValueType, quote_text};

/// `DATEADD` datepart for each date method.
const DATE_PARTS: &[(&str, &str)] = &[
    ("AddDays", "day"),
    ("AddHours", "hour"),
    ("AddMinutes", "minute"),
    ("AddSeconds", "second"),
    ("AddMonths", "month"),
    ("AddYears", "year"),
];

impl Translator {
    pub(crate) fn method_call(&mut self, target: &Expr, method: &str, args: &[Expr]) -> ExqlResult<Eval> {
        let receiver = self.evaluate(target)?;
        let arguments = args
            .iter()
            .map(|arg| self.evaluate(arg))
            .collect::<ExqlResult<Vec<_>>>()?;

        if let Eval::Scalar(value) = &receiver {
            let scalars: Option<Vec<Value>> = arguments
                .iter()
                .map(|arg| match arg {
                    Eval::Scalar(v) => Some(v.clone()),
                    _ => None,
                })
                .collect();
            if let Some(scalars) = scalars {
                return invoke_host(method, value, &scalars).map(Eval::Scalar);
            }
        }

        let receiver = self.sql_text(receiver)?;
        let sql = match method {
            "ToString" => self.generator.to_text(&receiver),
            "ToUpper" => format!("UPPER({})", receiver),
            "ToLower" => format!("LOWER({})", receiver),
            "Trim" => format!("LTRIM(RTRIM({}))", receiver),
            "Contains" | "StartsWith" | "EndsWith" => {
                let pattern = self.like_pattern(method, single(method, arguments)?)?;
                format!("({} LIKE {})", receiver, pattern)
            }
            _ => match date_part(method) {
                Some(part) => {
                    let amount = self.sql_text(single(method, arguments)?)?;
                    self.generator.date_add(part, &amount, &receiver)
                }
                None => return Err(ExqlError::unsupported(format!("method '{}'", method))),
            },
        };
        Ok(Eval::Fragment(Fragment::computed(sql)))
    }

    fn like_pattern(&self, method: &str, needle: Eval) -> ExqlResult<String> {
        let (before, after) = match method {
            "StartsWith" => ("", "%"),
            "EndsWith" => ("%", ""),
            _ => ("%", "%"),
        };
        match needle {
            Eval::Scalar(Value::Text(s)) => Ok(quote_text(&format!("{}{}{}", before, s, after))),
            other => {
                let mut parts = Vec::new();
                if !before.is_empty() {
                    parts.push(quote_text(before));
                }
                parts.push(self.sql_text(other)?);
                if !after.is_empty() {
                    parts.push(quote_text(after));
                }
                let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
                Ok(format!("({})", self.generator.string_concat(&parts)))
            }
        }
    }
}

fn single(method: &str, mut arguments: Vec<Eval>) -> ExqlResult<Eval> {
    if arguments.len() != 1 {
        return Err(ExqlError::unsupported(format!(
            "{} with {} arguments",
            method,
            arguments.len()
        )));
    }
    Ok(arguments.remove(0))
}

fn date_part(method: &str) -> Option<&'static str> {
    DATE_PARTS.iter().find(|(name, _)| *name == method).map(|(_, part)| *part)
}

fn text<'a>(method: &str, value: &'a Value) -> ExqlResult<&'a str> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(ExqlError::TypeMismatch {
            expected: ValueType::Text,
            found: format!("{} receiver of {}", describe(other), method),
        }),
    }
}

fn describe(value: &Value) -> String {
    value
        .value_type()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "Null".to_string())
}

/// Run a method on known values.
fn invoke_host(method: &str, receiver: &Value, args: &[Value]) -> ExqlResult<Value> {
    match (method, args) {
        ("ToString", []) => Ok(Value::Text(receiver.to_string())),
        ("ToUpper", []) => Ok(Value::Text(text(method, receiver)?.to_uppercase())),
        ("ToLower", []) => Ok(Value::Text(text(method, receiver)?.to_lowercase())),
        ("Trim", []) => Ok(Value::Text(text(method, receiver)?.trim().to_string())),
        ("Contains", [needle]) => Ok(Value::Bool(text(method, receiver)?.contains(text(method, needle)?))),
        ("StartsWith", [needle]) => Ok(Value::Bool(text(method, receiver)?.starts_with(text(method, needle)?))),
        ("EndsWith", [needle]) => Ok(Value::Bool(text(method, receiver)?.ends_with(text(method, needle)?))),
        (_, [amount]) if date_part(method).is_some() => {
            let Value::DateTime(at) = receiver else {
                return Err(ExqlError::TypeMismatch {
                    expected: ValueType::DateTime,
                    found: describe(receiver),
                });
            };
            shift(method, *at, amount).map(Value::DateTime)
        }
        _ => Err(ExqlError::unsupported(format!(
            "method '{}' with {} arguments",
            method,
            args.len()
        ))),
    }
}

fn shift(method: &str, at: NaiveDateTime, amount: &Value) -> ExqlResult<NaiveDateTime> {
    let amount = match amount {
        Value::Int(n) => *n as f64,
        Value::Float(f) => *f,
        other => {
            return Err(ExqlError::TypeMismatch {
                expected: ValueType::Float,
                found: describe(other),
            });
        }
    };
    let overflow = || ExqlError::InvalidValue(format!("{}({}) overflows", method, amount));

    let millis_per_unit = match method {
        "AddDays" => 86_400_000.0,
        "AddHours" => 3_600_000.0,
        "AddMinutes" => 60_000.0,
        "AddSeconds" => 1_000.0,
        _ => {
            let months = match method {
                "AddYears" => amount.trunc() as i64 * 12,
                _ => amount.trunc() as i64,
            };
            let shifted = if months >= 0 {
                at.checked_add_months(Months::new(months as u32))
            } else {
                at.checked_sub_months(Months::new(months.unsigned_abs() as u32))
            };
            return shifted.ok_or_else(overflow);
        }
    };
    let delta = Duration::try_milliseconds((amount * millis_per_unit) as i64).ok_or_else(overflow)?;
    at.checked_add_signed(delta).ok_or_else(overflow)
}
